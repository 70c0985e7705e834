// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::config::settings::Settings;
use crate::domain::models::job::{FetchMethod, HeaderMap, Job, SelectorMap};
use crate::domain::models::scraped_record::{content_hash, ScrapedRecord};
use crate::domain::models::website_config::WebsiteConfig;
use crate::domain::services::extraction_service::{Extraction, Extractor, PageSummary};
use crate::domain::services::rate_limiting_service::PolitenessGate;
use crate::engines::router::EngineRouter;
use crate::engines::traits::{FetchError, FetchRequest, FetchResult};
use crate::utils::errors::ServiceError;
use crate::utils::retry_policy::RetryPolicy;
use crate::utils::robots::RobotsCheckerTrait;
use crate::utils::validators::{
    ensure_public_host, host_of, parse_http_url, validate_timeout_secs, ValidationError, MAX_TIMEOUT_SECS,
};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

const MAX_TIMEOUT: Duration = Duration::from_secs(MAX_TIMEOUT_SECS);

/// 调用方显式给出的参数，优先于站点配置
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScrapeOverrides {
    pub method: Option<FetchMethod>,
    pub selectors: Option<SelectorMap>,
    pub headers: Option<HeaderMap>,
    pub timeout_secs: Option<u64>,
}

impl From<&Job> for ScrapeOverrides {
    fn from(job: &Job) -> Self {
        Self {
            method: job.method,
            selectors: job.selectors.clone(),
            headers: job.headers.clone(),
            timeout_secs: job.timeout_secs,
        }
    }
}

/// 合并站点配置和显式参数后的有效配置
#[derive(Debug, Clone, PartialEq)]
pub struct EffectiveConfig {
    pub url: Url,
    /// 小写主机名，限流按它分组
    pub domain: String,
    pub method: FetchMethod,
    pub selectors: SelectorMap,
    pub headers: HeaderMap,
    pub timeout: Duration,
    /// 同域请求间隔，`None` 时使用闸门默认值
    pub delay: Option<Duration>,
    pub user_agent: Option<String>,
    pub wait_for_element: Option<String>,
    pub respect_robots: bool,
}

impl EffectiveConfig {
    fn fetch_request(&self) -> FetchRequest {
        FetchRequest {
            url: self.url.to_string(),
            headers: self.headers.clone(),
            timeout: self.timeout,
            user_agent: self.user_agent.clone(),
            wait_for_element: self.wait_for_element.clone(),
        }
    }
}

/// 管道相关的全局配置
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub default_timeout: Duration,
    pub browser_timeout: Duration,
    /// 需要脚本渲染且站点未指定浏览器策略时使用的策略
    pub preferred_browser: FetchMethod,
    pub block_private_networks: bool,
}

impl From<&Settings> for PipelineSettings {
    fn from(settings: &Settings) -> Self {
        Self {
            default_timeout: settings.fetch.default_timeout().min(MAX_TIMEOUT),
            browser_timeout: settings.browser.timeout().min(MAX_TIMEOUT),
            preferred_browser: settings.browser.preferred_engine,
            block_private_networks: settings.fetch.block_private_networks,
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from(&Settings::default())
    }
}

/// 抓取到的页面
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub result: FetchResult,
    pub method: FetchMethod,
    /// 实际尝试次数（含成功的一次）
    pub attempts: u32,
}

/// 一次完整抓取加抽取的输出
#[derive(Debug, Clone)]
pub struct ScrapeOutput {
    pub method: FetchMethod,
    pub attempts: u32,
    pub final_url: String,
    pub status: u16,
    pub fetch_elapsed: Duration,
    pub extraction: Extraction,
    pub summary: PageSummary,
    pub content_length: usize,
    pub content_hash: String,
}

impl ScrapeOutput {
    /// 生成属于某个任务的记录
    pub fn to_record(&self, job_id: Uuid, source_url: &str) -> ScrapedRecord {
        ScrapedRecord {
            id: Uuid::new_v4(),
            job_id,
            fields: self.extraction.fields.clone(),
            source_url: source_url.to_string(),
            final_url: self.final_url.clone(),
            status_code: self.status,
            title: self.summary.title.clone(),
            analysis: self.summary.analysis.clone(),
            content_length: self.content_length,
            content_hash: self.content_hash.clone(),
            extracted_at: Utc::now(),
        }
    }
}

/// 重试观察者
///
/// 每次失败且将要重试时调用，用于把重试次数和退避时间写回任务
#[async_trait]
pub trait RetryObserver: Send + Sync {
    async fn on_retry(&self, attempt: u32, backoff: Duration, error: &FetchError);
}

/// 不记录重试的观察者
pub struct NoRetryObserver;

#[async_trait]
impl RetryObserver for NoRetryObserver {
    async fn on_retry(&self, _attempt: u32, _backoff: Duration, _error: &FetchError) {}
}

/// 选择抓取方式
///
/// 显式方式优先，其次站点默认方式，最后为轻量抓取。
/// 站点标记需要脚本渲染而选中的是轻量抓取时，改用浏览器策略：
/// 站点默认方式是浏览器策略则用它，否则用全局首选的浏览器策略
pub fn select_method(
    explicit: Option<FetchMethod>,
    config: Option<&WebsiteConfig>,
    preferred_browser: FetchMethod,
) -> FetchMethod {
    let chosen = explicit
        .or(config.map(|c| c.default_method))
        .unwrap_or_default();

    match config {
        Some(c) if c.requires_js && !chosen.is_browser() => {
            if c.default_method.is_browser() {
                c.default_method
            } else if preferred_browser.is_browser() {
                preferred_browser
            } else {
                FetchMethod::Playwright
            }
        }
        _ => chosen,
    }
}

/// 抓取执行管道
///
/// 限流闸门、抓取策略、重试策略和抽取器的组合，
/// 编排器、站点配置试运行和一次性抓取共用
pub struct ScrapePipeline {
    router: EngineRouter,
    gate: Arc<PolitenessGate>,
    retry: RetryPolicy,
    robots: Option<Arc<dyn RobotsCheckerTrait>>,
    settings: PipelineSettings,
}

impl ScrapePipeline {
    /// 创建管道
    ///
    /// # 参数
    ///
    /// * `router` - 抓取方式到引擎的映射
    /// * `gate` - 进程内共享的限流闸门
    /// * `retry` - 抓取失败时的重试策略
    /// * `settings` - 超时等全局配置
    pub fn new(
        router: EngineRouter,
        gate: Arc<PolitenessGate>,
        retry: RetryPolicy,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            router,
            gate,
            retry,
            robots: None,
            settings,
        }
    }

    /// 启用 robots.txt 检查，只对标记了遵守的站点生效
    pub fn with_robots(mut self, robots: Arc<dyn RobotsCheckerTrait>) -> Self {
        self.robots = Some(robots);
        self
    }

    pub fn gate(&self) -> &Arc<PolitenessGate> {
        &self.gate
    }

    pub fn router(&self) -> &EngineRouter {
        &self.router
    }

    pub fn block_private_networks(&self) -> bool {
        self.settings.block_private_networks
    }

    /// 解析有效配置
    ///
    /// 显式参数完整替换站点默认值，选择器和请求头不做合并
    ///
    /// # 参数
    ///
    /// * `url` - 目标URL
    /// * `overrides` - 显式参数
    /// * `config` - 匹配到的站点配置
    ///
    /// # 返回值
    ///
    /// * `Ok(EffectiveConfig)` - 有效配置
    /// * `Err(ValidationError)` - URL无效或超时为零
    pub fn resolve(
        &self,
        url: &str,
        overrides: &ScrapeOverrides,
        config: Option<&WebsiteConfig>,
    ) -> Result<EffectiveConfig, ValidationError> {
        let parsed = parse_http_url(url)?;
        let domain = host_of(parsed.as_str())
            .ok_or_else(|| ValidationError::InvalidUrl(format!("'{}' has no host", url)))?;

        let method = select_method(overrides.method, config, self.settings.preferred_browser);

        let selectors = overrides
            .selectors
            .clone()
            .or_else(|| config.map(|c| c.default_selectors.clone()))
            .unwrap_or_default();
        let headers = overrides
            .headers
            .clone()
            .or_else(|| config.map(|c| c.default_headers.clone()))
            .unwrap_or_default();

        let timeout = match overrides.timeout_secs {
            Some(secs) => {
                validate_timeout_secs("timeout", secs)?;
                Duration::from_secs(secs)
            }
            None => {
                let page_load = config
                    .and_then(|c| c.page_load_timeout_secs)
                    .filter(|secs| method.is_browser() && *secs > 0)
                    .map(|secs| secs.min(MAX_TIMEOUT_SECS));
                match page_load {
                    Some(secs) => Duration::from_secs(secs),
                    None if method.is_browser() => self.settings.browser_timeout,
                    None => self.settings.default_timeout,
                }
            }
        };

        Ok(EffectiveConfig {
            url: parsed,
            domain,
            method,
            selectors,
            headers,
            timeout,
            delay: config.and_then(|c| c.rate_limit_delay()),
            user_agent: config.and_then(|c| c.user_agent.clone()),
            wait_for_element: config.and_then(|c| c.wait_for_element.clone()),
            respect_robots: config.map(|c| c.respect_robots_txt).unwrap_or(false),
        })
    }

    /// 抓取前检查：内网地址防护和 robots.txt
    ///
    /// # 返回值
    ///
    /// * `Ok(Option<Duration>)` - robots.txt 声明的抓取间隔
    /// * `Err(ServiceError)` - 目标被拒绝
    async fn preflight(&self, effective: &EffectiveConfig) -> Result<Option<Duration>, ServiceError> {
        if self.settings.block_private_networks {
            ensure_public_host(&effective.url).await?;
        }

        if !effective.respect_robots {
            return Ok(None);
        }
        let Some(robots) = &self.robots else {
            return Ok(None);
        };

        let verdict = robots.check(&effective.url).await;
        if !verdict.allowed {
            info!(url = %effective.url, "Blocked by robots.txt");
            return Err(ServiceError::RobotsDisallowed(effective.url.to_string()));
        }
        Ok(verdict.crawl_delay)
    }

    fn domain_delay(&self, effective: &EffectiveConfig, crawl_delay: Option<Duration>) -> Option<Duration> {
        match crawl_delay {
            Some(robots_delay) => {
                let configured = effective.delay.unwrap_or(self.gate.default_delay());
                Some(configured.max(robots_delay))
            }
            None => effective.delay,
        }
    }

    /// 经过限流闸门抓取页面，按重试策略处理瞬时错误
    ///
    /// # 参数
    ///
    /// * `effective` - 有效配置
    /// * `cancel` - 取消令牌，在闸门等待、抓取和退避期间检查
    /// * `observer` - 重试观察者
    ///
    /// # 返回值
    ///
    /// * `Ok(FetchedPage)` - 抓取成功
    /// * `Err(ServiceError)` - 不可重试的错误、重试耗尽或已取消
    pub async fn fetch_page(
        &self,
        effective: &EffectiveConfig,
        cancel: &CancellationToken,
        observer: &dyn RetryObserver,
    ) -> Result<FetchedPage, ServiceError> {
        let crawl_delay = self.preflight(effective).await?;
        let delay = self.domain_delay(effective, crawl_delay);

        let method = effective.method;
        let engine = self.router.get(method).ok_or_else(|| {
            ServiceError::Internal(format!("no fetch engine registered for '{}'", method))
        })?;
        let request = effective.fetch_request();

        let mut attempt = 0u32;
        loop {
            attempt += 1;

            let permit = self.gate.acquire(&effective.domain, delay, cancel).await?;
            if cancel.is_cancelled() {
                return Err(ServiceError::Cancelled);
            }

            let started = Instant::now();
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                result = engine.fetch(&request) => Some(result),
            };
            permit.release();

            let Some(result) = outcome else {
                debug!(url = %effective.url, "Fetch aborted by cancellation");
                return Err(ServiceError::Cancelled);
            };

            let outcome_label = match &result {
                Ok(_) => "success",
                Err(e) => e.kind().as_str(),
            };
            metrics::counter!(
                "harvestrs_fetch_attempts_total",
                "method" => method.as_str(),
                "outcome" => outcome_label
            )
            .increment(1);
            metrics::histogram!("harvestrs_fetch_duration_seconds", "method" => method.as_str())
                .record(started.elapsed().as_secs_f64());

            match result {
                Ok(result) => {
                    debug!(url = %effective.url, %method, attempt, status = result.status, "Fetch succeeded");
                    return Ok(FetchedPage {
                        result,
                        method,
                        attempts: attempt,
                    });
                }
                Err(error) if self.retry.should_retry(attempt, &error) => {
                    let backoff = self.retry.calculate_backoff(attempt);
                    warn!(
                        url = %effective.url,
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        "Fetch failed, retrying: {}",
                        error
                    );
                    observer.on_retry(attempt, backoff, &error).await;

                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(ServiceError::Cancelled),
                        _ = tokio::time::sleep(backoff) => {}
                    }
                }
                Err(error) => {
                    warn!(url = %effective.url, attempt, "Fetch failed: {}", error);
                    return Err(ServiceError::Fetch(error));
                }
            }
        }
    }

    /// 抓取并抽取
    ///
    /// 抽取在阻塞线程池中执行，抽取前再次检查取消
    pub async fn run(
        &self,
        effective: &EffectiveConfig,
        cancel: &CancellationToken,
        observer: &dyn RetryObserver,
    ) -> Result<ScrapeOutput, ServiceError> {
        let page = self.fetch_page(effective, cancel, observer).await?;

        if cancel.is_cancelled() {
            return Err(ServiceError::Cancelled);
        }

        let FetchedPage {
            result,
            method,
            attempts,
        } = page;
        let FetchResult {
            html,
            final_url,
            status,
            elapsed,
            ..
        } = result;

        let selectors = effective.selectors.clone();
        let (extraction, summary, content_length, content_hash) =
            tokio::task::spawn_blocking(move || {
                let extraction = Extractor::extract(&html, &selectors);
                let summary = Extractor::summarize(&html);
                (extraction, summary, html.len(), content_hash(&html))
            })
            .await
            .map_err(|e| ServiceError::Internal(format!("extraction task failed: {}", e)))?;

        for error in &extraction.errors {
            warn!(url = %effective.url, field = %error.field, "Selector error: {}", error.message);
        }

        Ok(ScrapeOutput {
            method,
            attempts,
            final_url,
            status,
            fetch_elapsed: elapsed,
            extraction,
            summary,
            content_length,
            content_hash,
        })
    }
}

#[cfg(test)]
#[path = "scrape_pipeline_test.rs"]
mod tests;
