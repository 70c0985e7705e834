// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::job::{FetchMethod, HeaderMap, JobError, SelectorMap};
use crate::domain::models::scraped_record::{ContentAnalysis, ExtractedFields};
use crate::domain::services::extraction_service::SelectorError;
use serde::{Deserialize, Serialize};

/// 创建站点配置请求
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CreateWebsiteConfigRequest {
    pub name: String,
    /// 域名取自基础URL的主机部分
    pub base_url: String,
    pub default_method: Option<FetchMethod>,
    pub default_selectors: Option<SelectorMap>,
    pub default_headers: Option<HeaderMap>,
    pub rate_limit_delay_secs: Option<f64>,
    #[serde(default)]
    pub requires_js: bool,
    #[serde(default)]
    pub respect_robots_txt: bool,
    pub wait_for_element: Option<String>,
    pub page_load_timeout_secs: Option<u64>,
    pub user_agent: Option<String>,
    pub description: Option<String>,
}

/// 更新站点配置请求，未提供的字段保持不变
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct UpdateWebsiteConfigRequest {
    pub name: Option<String>,
    pub base_url: Option<String>,
    pub default_method: Option<FetchMethod>,
    pub default_selectors: Option<SelectorMap>,
    pub default_headers: Option<HeaderMap>,
    pub rate_limit_delay_secs: Option<f64>,
    pub requires_js: Option<bool>,
    pub respect_robots_txt: Option<bool>,
    pub wait_for_element: Option<String>,
    pub page_load_timeout_secs: Option<u64>,
    pub user_agent: Option<String>,
    pub description: Option<String>,
    pub is_active: Option<bool>,
}

/// 站点配置试运行结果
#[derive(Debug, Clone, Serialize)]
pub struct ConfigTestResult {
    pub domain: String,
    pub url: String,
    pub method: FetchMethod,
    pub success: bool,
    pub fields: ExtractedFields,
    pub selector_errors: Vec<SelectorError>,
    pub title: Option<String>,
    pub analysis: Option<ContentAnalysis>,
    pub final_url: Option<String>,
    pub status_code: Option<u16>,
    pub elapsed_ms: u64,
    pub error: Option<JobError>,
}
