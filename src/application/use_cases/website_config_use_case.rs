// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::application::dto::config_request::{
    ConfigTestResult, CreateWebsiteConfigRequest, UpdateWebsiteConfigRequest,
};
use crate::application::use_cases::scrape_pipeline::{
    NoRetryObserver, ScrapeOverrides, ScrapePipeline,
};
use crate::domain::models::job::JobError;
use crate::domain::models::website_config::{normalize_domain, WebsiteConfig};
use crate::domain::repositories::job_repository::RepositoryError;
use crate::domain::repositories::website_config_repository::WebsiteConfigRepository;
use crate::utils::errors::ServiceError;
use crate::utils::validators::{parse_http_url, ValidationError};
use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

/// 站点配置用例
///
/// 创建、查询、更新站点配置，以及用配置抓取基础URL做试运行
pub struct WebsiteConfigUseCase {
    repo: Arc<dyn WebsiteConfigRepository>,
    pipeline: Arc<ScrapePipeline>,
}

impl WebsiteConfigUseCase {
    pub fn new(repo: Arc<dyn WebsiteConfigRepository>, pipeline: Arc<ScrapePipeline>) -> Self {
        Self { repo, pipeline }
    }

    /// 创建站点配置
    ///
    /// # 参数
    ///
    /// * `request` - 创建参数，域名取自基础URL
    ///
    /// # 返回值
    ///
    /// * `Ok(WebsiteConfig)` - 已保存的配置
    /// * `Err(ServiceError::InvalidState)` - 同域配置已存在
    #[instrument(skip(self, request), fields(base_url = %request.base_url))]
    pub async fn create(&self, request: CreateWebsiteConfigRequest) -> Result<WebsiteConfig, ServiceError> {
        let mut config = WebsiteConfig::new(request.name, &request.base_url)?;
        if let Some(method) = request.default_method {
            config.default_method = method;
        }
        if let Some(selectors) = request.default_selectors {
            config.default_selectors = selectors;
        }
        if let Some(headers) = request.default_headers {
            config.default_headers = headers;
        }
        config.rate_limit_delay_secs = request.rate_limit_delay_secs;
        config.requires_js = request.requires_js;
        config.respect_robots_txt = request.respect_robots_txt;
        config.wait_for_element = request.wait_for_element;
        config.page_load_timeout_secs = request.page_load_timeout_secs;
        config.user_agent = request.user_agent;
        config.description = request.description;
        config.validate()?;

        match self.repo.create(&config).await {
            Ok(()) => {}
            Err(RepositoryError::AlreadyExists(domain)) => {
                return Err(ServiceError::InvalidState(format!(
                    "a configuration for '{}' already exists",
                    domain
                )))
            }
            Err(e) => return Err(e.into()),
        }

        info!(domain = %config.domain, "Website configuration created");
        Ok(config)
    }

    /// 按域名获取配置
    pub async fn get(&self, domain: &str) -> Result<WebsiteConfig, ServiceError> {
        let domain = normalize_domain(domain);
        self.repo
            .load_by_domain(&domain)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("website config '{}'", domain)))
    }

    pub async fn list(&self) -> Result<Vec<WebsiteConfig>, ServiceError> {
        Ok(self.repo.list().await?)
    }

    /// 更新配置
    ///
    /// 只修改请求中给出的字段；基础URL可以修改但域名必须保持不变
    #[instrument(skip(self, request))]
    pub async fn update(
        &self,
        domain: &str,
        request: UpdateWebsiteConfigRequest,
    ) -> Result<WebsiteConfig, ServiceError> {
        let mut config = self.get(domain).await?;

        if let Some(base_url) = request.base_url {
            let parsed = parse_http_url(&base_url)?;
            let new_domain = normalize_domain(parsed.host_str().unwrap_or_default());
            if new_domain != config.domain {
                return Err(ValidationError::InvalidInput(format!(
                    "base url host '{}' does not match domain '{}'",
                    new_domain, config.domain
                ))
                .into());
            }
            config.base_url = parsed.to_string();
        }
        if let Some(name) = request.name {
            config.name = name;
        }
        if let Some(method) = request.default_method {
            config.default_method = method;
        }
        if let Some(selectors) = request.default_selectors {
            config.default_selectors = selectors;
        }
        if let Some(headers) = request.default_headers {
            config.default_headers = headers;
        }
        if let Some(delay) = request.rate_limit_delay_secs {
            config.rate_limit_delay_secs = Some(delay);
        }
        if let Some(requires_js) = request.requires_js {
            config.requires_js = requires_js;
        }
        if let Some(respect) = request.respect_robots_txt {
            config.respect_robots_txt = respect;
        }
        if let Some(selector) = request.wait_for_element {
            config.wait_for_element = Some(selector);
        }
        if let Some(timeout) = request.page_load_timeout_secs {
            config.page_load_timeout_secs = Some(timeout);
        }
        if let Some(user_agent) = request.user_agent {
            config.user_agent = Some(user_agent);
        }
        if let Some(description) = request.description {
            config.description = Some(description);
        }
        if let Some(active) = request.is_active {
            config.is_active = active;
        }
        config.validate()?;
        config.updated_at = Utc::now();

        self.repo.update(&config).await?;
        info!(domain = %config.domain, "Website configuration updated");
        Ok(config)
    }

    /// 试运行配置
    ///
    /// 按配置抓取基础URL并抽取字段，不创建任务也不写入记录；
    /// 抓取失败记为不成功的结果而不是错误
    ///
    /// # 返回值
    ///
    /// * `Ok(ConfigTestResult)` - 抽取结果或失败原因
    /// * `Err(ServiceError)` - 配置不存在
    #[instrument(skip(self))]
    pub async fn test(&self, domain: &str) -> Result<ConfigTestResult, ServiceError> {
        let config = self.get(domain).await?;
        let started = Instant::now();

        let effective =
            self.pipeline
                .resolve(&config.base_url, &ScrapeOverrides::default(), Some(&config))?;
        let method = effective.method;
        let token = CancellationToken::new();

        let result = match self.pipeline.run(&effective, &token, &NoRetryObserver).await {
            Ok(output) => ConfigTestResult {
                domain: config.domain.clone(),
                url: config.base_url.clone(),
                method,
                success: true,
                fields: output.extraction.fields,
                selector_errors: output.extraction.errors,
                title: output.summary.title,
                analysis: Some(output.summary.analysis),
                final_url: Some(output.final_url),
                status_code: Some(output.status),
                elapsed_ms: started.elapsed().as_millis() as u64,
                error: None,
            },
            Err(e) => ConfigTestResult {
                domain: config.domain.clone(),
                url: config.base_url.clone(),
                method,
                success: false,
                fields: Default::default(),
                selector_errors: Vec::new(),
                title: None,
                analysis: None,
                final_url: None,
                status_code: None,
                elapsed_ms: started.elapsed().as_millis() as u64,
                error: Some(JobError::new(e.kind(), e.to_string())),
            },
        };

        info!(domain = %config.domain, success = result.success, "Website configuration tested");
        Ok(result)
    }
}
