// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::job::{FetchMethod, HeaderMap, SelectorMap};
use crate::utils::validators::{parse_http_url, validate_delay_secs, validate_timeout_secs, ValidationError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// 站点配置
///
/// 按域名复用的抓取默认值，域名唯一且只做精确匹配
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebsiteConfig {
    pub id: Uuid,
    /// 配置名称
    pub name: String,
    /// 小写主机名，唯一键
    pub domain: String,
    pub base_url: String,
    pub default_method: FetchMethod,
    pub default_selectors: SelectorMap,
    pub default_headers: HeaderMap,
    /// 同域请求最小间隔（秒），未设置时使用全局默认值
    pub rate_limit_delay_secs: Option<f64>,
    /// 是否需要脚本渲染
    pub requires_js: bool,
    /// 是否遵守 robots.txt
    pub respect_robots_txt: bool,
    /// 浏览器策略等待出现的元素选择器
    pub wait_for_element: Option<String>,
    /// 页面加载超时（秒）
    pub page_load_timeout_secs: Option<u64>,
    /// 自定义标识请求头
    pub user_agent: Option<String>,
    pub description: Option<String>,
    /// 停用的配置不参与解析
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WebsiteConfig {
    /// 根据名称和基础URL创建配置，域名取自基础URL的主机部分
    ///
    /// # 参数
    ///
    /// * `name` - 配置名称
    /// * `base_url` - 站点基础URL
    ///
    /// # 返回值
    ///
    /// * `Ok(WebsiteConfig)` - 使用默认值初始化的配置
    /// * `Err(ValidationError)` - 基础URL无效
    pub fn new(name: impl Into<String>, base_url: &str) -> Result<Self, ValidationError> {
        let parsed = parse_http_url(base_url)?;
        let domain = normalize_domain(parsed.host_str().unwrap_or_default());
        let now = Utc::now();

        Ok(Self {
            id: Uuid::new_v4(),
            name: name.into(),
            domain,
            base_url: parsed.to_string(),
            default_method: FetchMethod::Requests,
            default_selectors: SelectorMap::new(),
            default_headers: HeaderMap::new(),
            rate_limit_delay_secs: None,
            requires_js: false,
            respect_robots_txt: false,
            wait_for_element: None,
            page_load_timeout_secs: None,
            user_agent: None,
            description: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        })
    }

    /// 校验字段取值
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::InvalidInput(
                "config name cannot be empty".to_string(),
            ));
        }
        if self.domain.is_empty() {
            return Err(ValidationError::InvalidInput(
                "config domain cannot be empty".to_string(),
            ));
        }
        parse_http_url(&self.base_url)?;
        if let Some(delay) = self.rate_limit_delay_secs {
            validate_delay_secs(delay)?;
        }
        if let Some(secs) = self.page_load_timeout_secs {
            validate_timeout_secs("page load timeout", secs)?;
        }
        Ok(())
    }

    /// 同域请求间隔，超出范围的取值视为未设置
    pub fn rate_limit_delay(&self) -> Option<Duration> {
        self.rate_limit_delay_secs
            .filter(|d| validate_delay_secs(*d).is_ok())
            .and_then(|d| Duration::try_from_secs_f64(d).ok())
    }
}

/// 规范化域名：去除空白和末尾的点并转为小写
pub fn normalize_domain(domain: &str) -> String {
    domain.trim().trim_end_matches('.').to_ascii_lowercase()
}
