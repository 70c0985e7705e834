// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::config::settings::BrowserSettings;
use crate::engines::traits::{FetchEngine, FetchError, FetchRequest, FetchResult};
use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::network::{Headers, SetExtraHttpHeadersParams};
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use std::collections::BTreeMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

const ELEMENT_POLL_INTERVAL: Duration = Duration::from_millis(100);
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

fn browser_error(err: impl std::fmt::Display) -> FetchError {
    FetchError::Browser(err.to_string())
}

/// 单次抓取独占的浏览器会话
///
/// 本地启动的浏览器在结束时关闭进程并清理用户目录；
/// 远程浏览器只关闭本次打开的页面
struct BrowserSession {
    browser: Browser,
    handler: JoinHandle<()>,
    user_data_dir: Option<PathBuf>,
}

impl BrowserSession {
    async fn shutdown(mut self, page: Option<Page>) {
        if !within(SHUTDOWN_TIMEOUT, self.close(page)).await {
            warn!("Browser did not shut down within {:?}, killing it", SHUTDOWN_TIMEOUT);
            if self.user_data_dir.is_some() {
                self.browser.kill().await;
            }
        }

        self.handler.abort();

        if let Some(dir) = self.user_data_dir.take() {
            if let Err(e) = tokio::fs::remove_dir_all(&dir).await {
                debug!("Failed to remove browser profile {}: {}", dir.display(), e);
            }
        }
    }

    async fn close(&mut self, page: Option<Page>) {
        if let Some(page) = page {
            if let Err(e) = page.close().await {
                debug!("Failed to close page: {}", e);
            }
        }

        if self.user_data_dir.is_some() {
            if let Err(e) = self.browser.close().await {
                warn!("Failed to close browser, killing it: {}", e);
                self.browser.kill().await;
            }
            if let Err(e) = self.browser.wait().await {
                debug!("Browser process wait failed: {}", e);
            }
        }
    }
}

/// 在限定时间内运行清理步骤，返回是否按时完成
async fn within(limit: Duration, step: impl Future<Output = ()>) -> bool {
    tokio::time::timeout(limit, step).await.is_ok()
}

impl Drop for BrowserSession {
    // A dropped session (timeout or cancellation) still ends its child process,
    // the browser handle kills the process it launched when dropped.
    fn drop(&mut self) {
        self.handler.abort();
        if let Some(dir) = self.user_data_dir.take() {
            let _ = std::fs::remove_dir_all(dir);
        }
    }
}

/// Playwright引擎
///
/// 基于chromiumoxide的 CDP 浏览器抓取，每次抓取使用独立的浏览器会话
pub struct PlaywrightEngine {
    settings: BrowserSettings,
    user_agent: String,
}

impl PlaywrightEngine {
    /// 创建引擎实例
    ///
    /// # 参数
    ///
    /// * `settings` - 浏览器配置
    /// * `user_agent` - 请求未指定时使用的 User-Agent
    pub fn new(settings: BrowserSettings, user_agent: impl Into<String>) -> Self {
        Self {
            settings,
            user_agent: user_agent.into(),
        }
    }

    fn launch_config(&self, user_data_dir: &Path) -> Result<BrowserConfig, FetchError> {
        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .request_timeout(self.settings.timeout())
            .user_data_dir(user_data_dir)
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage");

        if !self.settings.headless {
            builder = builder.with_head();
        }

        builder.build().map_err(browser_error)
    }

    async fn open_session(&self) -> Result<BrowserSession, FetchError> {
        let (browser, mut handler, user_data_dir) = match &self.settings.remote_cdp_url {
            Some(remote) => {
                debug!("Connecting to remote browser at {}", remote);
                let (browser, handler) = Browser::connect(remote).await.map_err(browser_error)?;
                (browser, handler, None)
            }
            None => {
                let dir = std::env::temp_dir().join(format!("harvestrs-browser-{}", Uuid::new_v4()));
                let config = self.launch_config(&dir)?;
                let (browser, handler) = Browser::launch(config).await.map_err(browser_error)?;
                (browser, handler, Some(dir))
            }
        };

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        Ok(BrowserSession {
            browser,
            handler,
            user_data_dir,
        })
    }

    async fn render(&self, page: &Page, request: &FetchRequest) -> Result<(String, String), FetchError> {
        page.set_user_agent(request.effective_user_agent(&self.user_agent))
            .await
            .map_err(browser_error)?;

        if let Some(headers) = extra_headers(&request.headers) {
            page.execute(SetExtraHttpHeadersParams::new(Headers::new(headers)))
                .await
                .map_err(browser_error)?;
        }

        page.goto(request.url.as_str()).await.map_err(browser_error)?;

        match &request.wait_for_element {
            Some(selector) => {
                while page.find_element(selector.as_str()).await.is_err() {
                    tokio::time::sleep(ELEMENT_POLL_INTERVAL).await;
                }
            }
            None => tokio::time::sleep(self.settings.settle_delay()).await,
        }

        let html = page.content().await.map_err(browser_error)?;
        let final_url = page
            .url()
            .await
            .map_err(browser_error)?
            .unwrap_or_else(|| request.url.clone());

        Ok((html, final_url))
    }
}

/// 用户自定义请求头（不含 User-Agent，后者通过专门接口设置）
fn extra_headers(headers: &BTreeMap<String, String>) -> Option<serde_json::Value> {
    let map: serde_json::Map<String, serde_json::Value> = headers
        .iter()
        .filter(|(name, _)| !name.eq_ignore_ascii_case("user-agent"))
        .map(|(name, value)| (name.clone(), serde_json::Value::String(value.clone())))
        .collect();

    if map.is_empty() {
        None
    } else {
        Some(serde_json::Value::Object(map))
    }
}

#[async_trait]
impl FetchEngine for PlaywrightEngine {
    /// 渲染页面并返回最终文档
    ///
    /// 整个过程（启动、导航、等待）受请求超时约束，
    /// 超时或失败后会话都会被关闭
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResult, FetchError> {
        let start = Instant::now();
        let deadline = request.deadline();

        let session = tokio::time::timeout_at(deadline, self.open_session())
            .await
            .map_err(|_| FetchError::Timeout)??;

        let page = match tokio::time::timeout_at(deadline, session.browser.new_page("about:blank")).await {
            Ok(Ok(page)) => page,
            Ok(Err(e)) => {
                session.shutdown(None).await;
                return Err(browser_error(e));
            }
            Err(_) => {
                session.shutdown(None).await;
                return Err(FetchError::Timeout);
            }
        };

        let outcome = tokio::time::timeout_at(deadline, self.render(&page, request)).await;
        session.shutdown(Some(page)).await;

        let (html, final_url) = outcome.map_err(|_| FetchError::Timeout)??;
        debug!(url = %request.url, %final_url, bytes = html.len(), "Rendered page");

        Ok(FetchResult {
            html,
            final_url,
            status: 200,
            headers: BTreeMap::new(),
            elapsed: start.elapsed(),
        })
    }

    fn name(&self) -> &'static str {
        "playwright"
    }
}

#[cfg(test)]
#[path = "playwright_engine_test.rs"]
mod tests;
