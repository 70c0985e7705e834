// Copyright 2025 Kirky.X
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::config::settings::FetchSettings;
use crate::engines::traits::{FetchEngine, FetchError, FetchRequest, FetchResult};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE, USER_AGENT};
use reqwest::redirect::Policy;
use reqwest::Client;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tracing::debug;

/// HEAD 探测结果
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeResult {
    pub status: u16,
    pub content_type: Option<String>,
    pub final_url: String,
    pub elapsed: Duration,
}

/// 轻量抓取引擎
///
/// 基于reqwest实现的单次 HTTP GET 抓取
pub struct ReqwestEngine {
    client: Client,
    user_agent: String,
}

impl ReqwestEngine {
    /// 创建引擎实例
    ///
    /// # 参数
    ///
    /// * `settings` - 抓取配置，提供默认 User-Agent 和重定向上限
    pub fn new(settings: &FetchSettings) -> Result<Self, FetchError> {
        let client = Client::builder()
            .redirect(Policy::limited(settings.max_redirects))
            .cookie_store(true)
            .build()?;

        Ok(Self {
            client,
            user_agent: settings.user_agent.clone(),
        })
    }

    fn build_headers(&self, request: &FetchRequest) -> Result<HeaderMap, FetchError> {
        let mut headers = HeaderMap::new();
        for (k, v) in &request.headers {
            let name = HeaderName::from_bytes(k.as_bytes())
                .map_err(|e| FetchError::InvalidRequest(format!("header name '{}': {}", k, e)))?;
            let value = HeaderValue::from_str(v)
                .map_err(|e| FetchError::InvalidRequest(format!("header '{}': {}", k, e)))?;
            headers.insert(name, value);
        }

        if !headers.contains_key(USER_AGENT) {
            let ua = request.effective_user_agent(&self.user_agent);
            let value = HeaderValue::from_str(ua)
                .map_err(|e| FetchError::InvalidRequest(format!("user agent: {}", e)))?;
            headers.insert(USER_AGENT, value);
        }

        Ok(headers)
    }

    /// 发送 HEAD 请求探测URL可达性
    pub async fn probe(&self, url: &str, timeout: Duration) -> Result<ProbeResult, FetchError> {
        let start = Instant::now();
        let response = self
            .client
            .head(url)
            .header(USER_AGENT, self.user_agent.as_str())
            .timeout(timeout)
            .send()
            .await?;

        Ok(ProbeResult {
            status: response.status().as_u16(),
            content_type: response
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
            final_url: response.url().to_string(),
            elapsed: start.elapsed(),
        })
    }
}

#[async_trait]
impl FetchEngine for ReqwestEngine {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResult, FetchError> {
        let headers = self.build_headers(request)?;
        let start = Instant::now();

        let response = self
            .client
            .get(&request.url)
            .headers(headers)
            .timeout(request.timeout)
            .send()
            .await?;

        let status = response.status();
        let final_url = response.url().to_string();
        debug!(url = %request.url, %final_url, status = status.as_u16(), "HTTP response received");

        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                status: status.as_u16(),
            });
        }

        let mut response_headers = BTreeMap::new();
        for (k, v) in response.headers() {
            if let Ok(v_str) = v.to_str() {
                response_headers.insert(k.as_str().to_string(), v_str.to_string());
            }
        }

        let html = response.text().await?;

        Ok(FetchResult {
            html,
            final_url,
            status: status.as_u16(),
            headers: response_headers,
            elapsed: start.elapsed(),
        })
    }

    fn name(&self) -> &'static str {
        "requests"
    }
}

#[cfg(test)]
#[path = "reqwest_engine_test.rs"]
mod tests;
