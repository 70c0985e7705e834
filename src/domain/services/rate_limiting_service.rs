// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

/// 等待限流许可时任务被取消
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("cancelled while waiting for a rate-limit slot")]
pub struct CancelledError;

/// 空闲域名状态至少保留这么久才会被回收
const IDLE_SLOT_RETENTION: Duration = Duration::from_secs(3600);

/// 每放行这么多次检查一次空闲域名
const PRUNE_EVERY: u64 = 256;

/// 单个域名的节流状态
#[derive(Debug, Default)]
struct DomainSlot {
    /// 最近一次放行的时间
    last_request: Option<Instant>,
    /// 最近一次放行时使用的间隔
    delay: Duration,
}

/// 限流许可
///
/// 持有期间占用一个全局并发名额，释放或丢弃时归还
#[derive(Debug)]
pub struct PolitenessPermit {
    domain: String,
    _permit: OwnedSemaphorePermit,
}

impl PolitenessPermit {
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// 显式归还许可
    pub fn release(self) {
        debug!(domain = %self.domain, "Released rate-limit slot");
    }
}

/// 礼貌访问闸门
///
/// 同时约束同域最小请求间隔和全局并发上限。
/// 同一域名的请求按到达顺序放行；域名间隔等待期间不占用全局名额，
/// 因此慢域名不会饿死其它域名。每个进程构造一次并注入使用者。
#[derive(Debug)]
pub struct PolitenessGate {
    global: Arc<Semaphore>,
    capacity: usize,
    default_delay: Duration,
    domains: DashMap<String, Arc<Mutex<DomainSlot>>>,
    acquisitions: AtomicU64,
}

impl PolitenessGate {
    /// 创建闸门
    ///
    /// # 参数
    ///
    /// * `max_concurrent` - 全局在途抓取上限
    /// * `default_delay` - 站点未配置时的同域请求间隔
    pub fn new(max_concurrent: usize, default_delay: Duration) -> Self {
        let capacity = max_concurrent.max(1);
        Self {
            global: Arc::new(Semaphore::new(capacity)),
            capacity,
            default_delay,
            domains: DashMap::new(),
            acquisitions: AtomicU64::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// 当前空闲的全局名额
    pub fn available_permits(&self) -> usize {
        self.global.available_permits()
    }

    pub fn default_delay(&self) -> Duration {
        self.default_delay
    }

    /// 当前记录了节流状态的域名数
    pub fn tracked_domains(&self) -> usize {
        self.domains.len()
    }

    /// 回收空闲域名的节流状态
    ///
    /// 只回收没有等待者、且上次放行已超过保留期的域名
    ///
    /// # 返回值
    ///
    /// 被回收的域名数
    pub fn prune_idle(&self) -> usize {
        let now = Instant::now();
        let retention = IDLE_SLOT_RETENTION.max(self.default_delay);
        let before = self.domains.len();

        self.domains.retain(|_, slot| {
            // Any clone besides the map's own means an acquire is in progress.
            if Arc::strong_count(slot) > 1 {
                return true;
            }
            match slot.try_lock() {
                Ok(state) => match state.last_request {
                    Some(last) => now.saturating_duration_since(last) < retention.max(state.delay),
                    None => false,
                },
                Err(_) => true,
            }
        });

        let removed = before.saturating_sub(self.domains.len());
        if removed > 0 {
            debug!(removed, "Pruned idle domain slots");
        }
        removed
    }

    fn slot(&self, domain: &str) -> Arc<Mutex<DomainSlot>> {
        self.domains
            .entry(domain.to_string())
            .or_default()
            .clone()
    }

    /// 获取访问某个域名的许可
    ///
    /// # 参数
    ///
    /// * `domain` - 目标域名
    /// * `delay` - 该域名的最小请求间隔，`None` 时使用默认值
    /// * `cancel` - 所属任务的取消令牌
    ///
    /// # 返回值
    ///
    /// * `Ok(PolitenessPermit)` - 已占用全局名额的许可
    /// * `Err(CancelledError)` - 等待期间任务被取消，未占用任何名额
    #[instrument(skip(self, cancel))]
    pub async fn acquire(
        &self,
        domain: &str,
        delay: Option<Duration>,
        cancel: &CancellationToken,
    ) -> Result<PolitenessPermit, CancelledError> {
        let started = Instant::now();
        let delay = delay.unwrap_or(self.default_delay);
        if self.acquisitions.fetch_add(1, Ordering::Relaxed) % PRUNE_EVERY == PRUNE_EVERY - 1 {
            self.prune_idle();
        }
        let slot = self.slot(domain);

        // The tokio mutex queues waiters in FIFO order.
        let mut state = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(CancelledError),
            guard = slot.lock() => guard,
        };

        if let Some(ready_at) = state.last_request.and_then(|last| last.checked_add(delay)) {
            if ready_at > Instant::now() {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(CancelledError),
                    _ = tokio::time::sleep_until(ready_at) => {}
                }
            }
        }

        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(CancelledError),
            permit = self.global.clone().acquire_owned() => permit.map_err(|_| CancelledError)?,
        };

        state.last_request = Some(Instant::now());
        state.delay = delay;
        drop(state);

        let waited = started.elapsed();
        metrics::histogram!("harvestrs_limiter_wait_seconds").record(waited.as_secs_f64());
        debug!(domain, waited_ms = waited.as_millis() as u64, "Acquired rate-limit slot");

        Ok(PolitenessPermit {
            domain: domain.to_string(),
            _permit: permit,
        })
    }
}
