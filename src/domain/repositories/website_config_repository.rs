// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::website_config::WebsiteConfig;
use crate::domain::repositories::job_repository::RepositoryError;
use async_trait::async_trait;

/// 站点配置仓库特质
///
/// 域名为唯一键
#[async_trait]
pub trait WebsiteConfigRepository: Send + Sync {
    /// 创建配置，域名已存在时返回 AlreadyExists
    async fn create(&self, config: &WebsiteConfig) -> Result<(), RepositoryError>;
    /// 更新已有配置，不存在时返回 NotFound
    async fn update(&self, config: &WebsiteConfig) -> Result<(), RepositoryError>;
    /// 按域名精确查找
    async fn load_by_domain(&self, domain: &str) -> Result<Option<WebsiteConfig>, RepositoryError>;
    /// 按域名排序列出全部配置
    async fn list(&self) -> Result<Vec<WebsiteConfig>, RepositoryError>;
}
