// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::job::{FetchMethod, HeaderMap, SelectorMap};
use crate::domain::models::scraped_record::{ContentAnalysis, ExtractedFields};
use crate::domain::services::extraction_service::SelectorError;
use serde::{Deserialize, Serialize};

fn default_link_limit() -> usize {
    100
}

fn default_image_limit() -> usize {
    50
}

/// URL 校验请求
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ValidateUrlRequest {
    pub url: String,
}

/// URL 校验结果
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UrlValidation {
    pub url: String,
    /// 语法和协议是否合法
    pub is_valid: bool,
    /// HEAD 请求是否得到 2xx/3xx 响应
    pub is_reachable: bool,
    pub status_code: Option<u16>,
    pub content_type: Option<String>,
    pub response_time_ms: Option<u64>,
    pub error: Option<String>,
}

/// 链接抽取请求
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExtractLinksRequest {
    pub url: String,
    #[serde(default)]
    pub internal_only: bool,
    #[serde(default = "default_link_limit")]
    pub limit: usize,
}

/// 链接抽取结果
#[derive(Debug, Clone, Serialize)]
pub struct LinksResponse {
    pub url: String,
    pub final_url: String,
    pub links: Vec<String>,
    pub count: usize,
}

/// 图片抽取请求
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExtractImagesRequest {
    pub url: String,
    #[serde(default = "default_image_limit")]
    pub limit: usize,
}

/// 图片抽取结果
#[derive(Debug, Clone, Serialize)]
pub struct ImagesResponse {
    pub url: String,
    pub final_url: String,
    pub images: Vec<String>,
    pub count: usize,
}

/// 一次性抓取请求，不创建任务
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct QuickScrapeRequest {
    pub url: String,
    pub method: Option<FetchMethod>,
    pub selectors: Option<SelectorMap>,
    pub headers: Option<HeaderMap>,
    pub timeout_secs: Option<u64>,
}

/// 一次性抓取结果
#[derive(Debug, Clone, Serialize)]
pub struct QuickScrapeResponse {
    pub url: String,
    pub final_url: String,
    pub method: FetchMethod,
    pub status_code: u16,
    pub fields: ExtractedFields,
    pub selector_errors: Vec<SelectorError>,
    pub title: Option<String>,
    pub analysis: ContentAnalysis,
    pub content_length: usize,
    pub content_hash: String,
    pub elapsed_ms: u64,
}

/// 抓取方式说明
#[derive(Debug, Clone, Serialize)]
pub struct MethodInfo {
    pub method: FetchMethod,
    pub description: &'static str,
    /// 是否基于浏览器渲染
    pub browser: bool,
    /// 当前进程是否注册了该引擎
    pub available: bool,
}
