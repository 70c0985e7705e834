// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::website_config::WebsiteConfig;
use crate::domain::repositories::job_repository::RepositoryError;
use crate::domain::repositories::website_config_repository::WebsiteConfigRepository;
use crate::utils::validators::host_of;
use std::sync::Arc;
use tracing::debug;

/// 站点配置解析器
///
/// 按URL主机名精确匹配站点配置，不做子域名继承
#[derive(Clone)]
pub struct ConfigResolver {
    repo: Arc<dyn WebsiteConfigRepository>,
}

impl ConfigResolver {
    pub fn new(repo: Arc<dyn WebsiteConfigRepository>) -> Self {
        Self { repo }
    }

    /// 解析URL对应的站点配置
    ///
    /// # 参数
    ///
    /// * `url` - 目标URL
    ///
    /// # 返回值
    ///
    /// * `Ok(Some(WebsiteConfig))` - 存在启用中的同域配置
    /// * `Ok(None)` - 无匹配配置、配置已停用或URL无主机名
    /// * `Err(RepositoryError)` - 查询失败
    pub async fn resolve(&self, url: &str) -> Result<Option<WebsiteConfig>, RepositoryError> {
        let Some(host) = host_of(url) else {
            return Ok(None);
        };

        let config = self
            .repo
            .load_by_domain(&host)
            .await?
            .filter(|config| config.is_active);

        debug!(%host, matched = config.is_some(), "Resolved website configuration");
        Ok(config)
    }
}
