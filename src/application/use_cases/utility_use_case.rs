// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::application::dto::utility::{
    ExtractImagesRequest, ExtractLinksRequest, ImagesResponse, LinksResponse, MethodInfo,
    QuickScrapeRequest, QuickScrapeResponse, UrlValidation,
};
use crate::application::use_cases::scrape_pipeline::{
    EffectiveConfig, NoRetryObserver, ScrapeOverrides, ScrapePipeline,
};
use crate::domain::models::job::FetchMethod;
use crate::domain::services::config_resolver::ConfigResolver;
use crate::domain::services::extraction_service::Extractor;
use crate::engines::reqwest_engine::ReqwestEngine;
use crate::utils::errors::ServiceError;
use crate::utils::validators::{ensure_public_host, host_of, parse_http_url};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};
use url::Url;

const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// 工具类用例：URL校验、链接和图片提取、一次性抓取
///
/// 都经过限流闸门，但不创建任务
pub struct UtilityUseCase {
    pipeline: Arc<ScrapePipeline>,
    resolver: ConfigResolver,
    probe: Arc<ReqwestEngine>,
}

impl UtilityUseCase {
    pub fn new(pipeline: Arc<ScrapePipeline>, resolver: ConfigResolver, probe: Arc<ReqwestEngine>) -> Self {
        Self {
            pipeline,
            resolver,
            probe,
        }
    }

    /// 校验URL语法并探测可达性
    ///
    /// 失败信息写入结果的 `error` 字段，不返回错误
    #[instrument(skip(self))]
    pub async fn validate_url(&self, url: &str) -> UrlValidation {
        let mut validation = UrlValidation {
            url: url.to_string(),
            ..UrlValidation::default()
        };

        let parsed = match parse_http_url(url) {
            Ok(parsed) => parsed,
            Err(e) => {
                validation.error = Some(e.to_string());
                return validation;
            }
        };
        validation.is_valid = true;

        if let Err(e) = self.probe_url(&parsed, &mut validation).await {
            validation.error = Some(e.to_string());
        }
        validation
    }

    async fn probe_url(&self, url: &Url, validation: &mut UrlValidation) -> Result<(), ServiceError> {
        if self.pipeline.block_private_networks() {
            ensure_public_host(url).await?;
        }
        let domain = host_of(url.as_str()).unwrap_or_default();
        let delay = self
            .resolver
            .resolve(url.as_str())
            .await?
            .and_then(|config| config.rate_limit_delay());

        let token = CancellationToken::new();
        let permit = self.pipeline.gate().acquire(&domain, delay, &token).await?;
        let probe = self.probe.probe(url.as_str(), PROBE_TIMEOUT).await;
        permit.release();

        let probe = probe?;
        debug!(status = probe.status, "URL probed");
        validation.status_code = Some(probe.status);
        validation.content_type = probe.content_type;
        validation.response_time_ms = Some(probe.elapsed.as_millis() as u64);
        validation.is_reachable = (200..400).contains(&probe.status);
        Ok(())
    }

    /// 提取页面中的链接
    #[instrument(skip(self, request), fields(url = %request.url))]
    pub async fn extract_links(&self, request: ExtractLinksRequest) -> Result<LinksResponse, ServiceError> {
        let (final_url, html) = self.fetch_html(&request.url).await?;
        let base = Url::parse(&final_url).map_err(|e| ServiceError::Internal(e.to_string()))?;

        let internal_only = request.internal_only;
        let limit = request.limit;
        let links = tokio::task::spawn_blocking(move || Extractor::links(&html, &base, internal_only, limit))
            .await
            .map_err(|e| ServiceError::Internal(e.to_string()))?;

        Ok(LinksResponse {
            url: request.url,
            final_url,
            count: links.len(),
            links,
        })
    }

    /// 提取页面中的图片地址
    #[instrument(skip(self, request), fields(url = %request.url))]
    pub async fn extract_images(&self, request: ExtractImagesRequest) -> Result<ImagesResponse, ServiceError> {
        let (final_url, html) = self.fetch_html(&request.url).await?;
        let base = Url::parse(&final_url).map_err(|e| ServiceError::Internal(e.to_string()))?;

        let limit = request.limit;
        let images = tokio::task::spawn_blocking(move || Extractor::images(&html, &base, limit))
            .await
            .map_err(|e| ServiceError::Internal(e.to_string()))?;

        Ok(ImagesResponse {
            url: request.url,
            final_url,
            count: images.len(),
            images,
        })
    }

    /// 一次性抓取
    ///
    /// 执行完整的抓取和抽取流程，但不持久化任务和记录
    #[instrument(skip(self, request), fields(url = %request.url))]
    pub async fn quick_scrape(&self, request: QuickScrapeRequest) -> Result<QuickScrapeResponse, ServiceError> {
        let started = Instant::now();
        let overrides = ScrapeOverrides {
            method: request.method,
            selectors: request.selectors,
            headers: request.headers,
            timeout_secs: request.timeout_secs,
        };
        let effective = self.effective(&request.url, &overrides).await?;

        let token = CancellationToken::new();
        let output = self.pipeline.run(&effective, &token, &NoRetryObserver).await?;

        Ok(QuickScrapeResponse {
            url: request.url,
            final_url: output.final_url,
            method: output.method,
            status_code: output.status,
            fields: output.extraction.fields,
            selector_errors: output.extraction.errors,
            title: output.summary.title,
            analysis: output.summary.analysis,
            content_length: output.content_length,
            content_hash: output.content_hash,
            elapsed_ms: started.elapsed().as_millis() as u64,
        })
    }

    /// 支持的抓取方式
    pub fn supported_methods(&self) -> Vec<MethodInfo> {
        let registered = self.pipeline.router().methods();
        FetchMethod::ALL
            .into_iter()
            .map(|method| MethodInfo {
                method,
                description: describe(method),
                browser: method.is_browser(),
                available: registered.contains(&method),
            })
            .collect()
    }

    async fn effective(&self, url: &str, overrides: &ScrapeOverrides) -> Result<EffectiveConfig, ServiceError> {
        parse_http_url(url)?;
        let config = self.resolver.resolve(url).await?;
        Ok(self.pipeline.resolve(url, overrides, config.as_ref())?)
    }

    async fn fetch_html(&self, url: &str) -> Result<(String, String), ServiceError> {
        let effective = self.effective(url, &ScrapeOverrides::default()).await?;
        let token = CancellationToken::new();
        let page = self
            .pipeline
            .fetch_page(&effective, &token, &NoRetryObserver)
            .await?;
        Ok((page.result.final_url, page.result.html))
    }
}

fn describe(method: FetchMethod) -> &'static str {
    match method {
        FetchMethod::Requests => "Plain HTTP GET, fastest, no script execution",
        FetchMethod::Selenium => "Remote browser driven over the WebDriver protocol",
        FetchMethod::Playwright => "Local or remote Chromium driven over the DevTools protocol",
    }
}
