// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::Client;
use robotstxt::DefaultMatcher;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use url::Url;

/// Robots.txt 判定结果
#[derive(Debug, Clone, PartialEq)]
pub struct RobotsVerdict {
    /// 是否允许访问
    pub allowed: bool,
    /// robots.txt 声明的抓取间隔
    pub crawl_delay: Option<Duration>,
}

impl RobotsVerdict {
    pub fn allow_all() -> Self {
        Self {
            allowed: true,
            crawl_delay: None,
        }
    }
}

/// Robots.txt检查器接口
#[async_trait]
pub trait RobotsCheckerTrait: Send + Sync {
    /// 检查URL是否被允许访问，并返回站点声明的抓取间隔
    async fn check(&self, url: &Url) -> RobotsVerdict;
}

/// 缓存的Robots.txt内容
#[derive(Clone)]
struct CachedRobots {
    content: String,
    expires_at: Instant,
}

/// Robots.txt检查器
///
/// 按主机缓存 robots.txt，获取失败时视为允许访问
#[derive(Clone)]
pub struct RobotsChecker {
    client: Client,
    user_agent: String,
    cache_ttl: Duration,
    memory_cache: Arc<Mutex<HashMap<String, CachedRobots>>>,
}

#[async_trait]
impl RobotsCheckerTrait for RobotsChecker {
    async fn check(&self, url: &Url) -> RobotsVerdict {
        let Some(content) = self.get_robots_content(url).await else {
            return RobotsVerdict::allow_all();
        };

        let mut matcher = DefaultMatcher::default();
        let allowed = matcher.one_agent_allowed_by_robots(&content, &self.user_agent, url.as_str());

        RobotsVerdict {
            allowed,
            crawl_delay: parse_crawl_delay(&content, &self.user_agent),
        }
    }
}

const MAX_CACHE_TTL: Duration = Duration::from_secs(7 * 86400);

impl RobotsChecker {
    /// 创建新的Robots检查器实例
    ///
    /// # 参数
    ///
    /// * `user_agent` - 匹配 robots.txt 规则时使用的代理名
    /// * `cache_ttl` - robots.txt 缓存时间
    pub fn new(user_agent: impl Into<String>, cache_ttl: Duration) -> Self {
        Self {
            client: Client::new(),
            user_agent: user_agent.into(),
            cache_ttl: cache_ttl.min(MAX_CACHE_TTL),
            memory_cache: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn robots_url(url: &Url) -> Option<String> {
        let host = url.host_str()?;
        let port = url.port_or_known_default().unwrap_or(80);
        Some(format!("{}://{}:{}/robots.txt", url.scheme(), host, port))
    }

    /// 获取Robots.txt内容（带缓存）
    async fn get_robots_content(&self, url: &Url) -> Option<String> {
        let robots_url = Self::robots_url(url)?;

        {
            let mut cache = self.memory_cache.lock();
            if let Some(cached) = cache.get(&robots_url) {
                if cached.expires_at > Instant::now() {
                    return Some(cached.content.clone());
                }
                cache.remove(&robots_url);
            }
        }

        let response = self
            .client
            .get(&robots_url)
            .header("User-Agent", self.user_agent.as_str())
            .timeout(Duration::from_secs(5))
            .send()
            .await;

        let content = match response {
            Ok(resp) if resp.status().is_success() => resp.text().await.ok()?,
            // 404/403 and friends mean no usable robots.txt
            Ok(resp) if resp.status().is_client_error() => String::new(),
            Ok(resp) => {
                tracing::warn!("robots.txt at {} returned {}", robots_url, resp.status());
                return None;
            }
            Err(e) => {
                tracing::warn!("Failed to fetch robots.txt from {}: {}", robots_url, e);
                return None;
            }
        };

        self.memory_cache.lock().insert(
            robots_url,
            CachedRobots {
                content: content.clone(),
                expires_at: Instant::now() + self.cache_ttl,
            },
        );

        Some(content)
    }
}

/// 解析Crawl-delay指令
///
/// 优先使用匹配当前 User-Agent 的分组，否则回退到 `*` 分组
pub fn parse_crawl_delay(content: &str, user_agent: &str) -> Option<Duration> {
    let mut current_agent_matched = false;
    let mut delay: Option<f64> = None;
    let mut specific_agent_found = false;
    let user_agent = user_agent.to_lowercase();

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim().to_lowercase();
        let value = value.trim();

        if key == "user-agent" {
            if value == "*" {
                current_agent_matched = !specific_agent_found;
            } else if user_agent.contains(&value.to_lowercase()) {
                current_agent_matched = true;
                if !specific_agent_found {
                    delay = None;
                }
                specific_agent_found = true;
            } else {
                current_agent_matched = false;
            }
        } else if key == "crawl-delay" && current_agent_matched {
            if let Ok(d) = value.parse::<f64>() {
                if d.is_finite() && d >= 0.0 {
                    delay = Some(d);
                }
            }
        }
    }

    delay.map(Duration::from_secs_f64)
}
