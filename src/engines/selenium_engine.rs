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

use crate::config::settings::BrowserSettings;
use crate::engines::traits::{FetchEngine, FetchError, FetchRequest, FetchResult};
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tracing::{debug, warn};

const ELEMENT_POLL_INTERVAL: Duration = Duration::from_millis(200);
const SESSION_DELETE_TIMEOUT: Duration = Duration::from_secs(5);
const SESSION_CREATE_TIMEOUT: Duration = Duration::from_secs(120);

/// WebDriver 响应外层，所有命令的结果都在 `value` 中
#[derive(Deserialize, Debug)]
struct WebDriverResponse {
    value: Value,
}

#[derive(Deserialize, Debug)]
struct NewSessionValue {
    #[serde(rename = "sessionId")]
    session_id: String,
}

#[derive(Deserialize, Debug)]
struct WebDriverErrorValue {
    error: String,
    #[serde(default)]
    message: String,
}

/// WebDriver 会话
///
/// 显式 `close` 删除会话；未关闭就被丢弃时在后台删除
struct WebDriverSession {
    client: Client,
    endpoint: String,
    closed: bool,
}

impl WebDriverSession {
    async fn close(mut self) {
        self.closed = true;
        let result = self
            .client
            .delete(&self.endpoint)
            .timeout(SESSION_DELETE_TIMEOUT)
            .send()
            .await;
        if let Err(e) = result {
            warn!("Failed to delete WebDriver session {}: {}", self.endpoint, e);
        }
    }
}

impl Drop for WebDriverSession {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("WebDriver session {} leaked outside a runtime", self.endpoint);
            return;
        };
        let client = self.client.clone();
        let endpoint = self.endpoint.clone();
        runtime.spawn(async move {
            let _ = client
                .delete(&endpoint)
                .timeout(SESSION_DELETE_TIMEOUT)
                .send()
                .await;
        });
    }
}

/// Selenium 引擎
///
/// 通过 W3C WebDriver 协议驱动远程浏览器，每次抓取创建并删除一个会话
pub struct SeleniumEngine {
    client: Client,
    base_url: String,
    settings: BrowserSettings,
    user_agent: String,
}

impl SeleniumEngine {
    /// 创建引擎实例
    ///
    /// # 参数
    ///
    /// * `settings` - 浏览器配置，`webdriver_url` 指向 WebDriver 服务
    /// * `user_agent` - 请求未指定时使用的 User-Agent
    pub fn new(settings: BrowserSettings, user_agent: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: settings.webdriver_url.trim_end_matches('/').to_string(),
            settings,
            user_agent: user_agent.into(),
        }
    }

    fn capabilities(&self, user_agent: &str) -> Value {
        let mut args = vec![
            "--no-sandbox".to_string(),
            "--disable-gpu".to_string(),
            "--disable-dev-shm-usage".to_string(),
            format!("--user-agent={}", user_agent),
        ];
        if self.settings.headless {
            args.insert(0, "--headless=new".to_string());
        }

        json!({
            "capabilities": {
                "alwaysMatch": {
                    "browserName": "chrome",
                    "goog:chromeOptions": { "args": args }
                }
            }
        })
    }

    /// 发送一条 WebDriver 命令并返回 `value`
    async fn command(&self, method: Method, url: &str, body: Option<Value>) -> Result<Value, FetchError> {
        let mut builder = self.client.request(method, url);
        if let Some(body) = body {
            builder = builder.json(&body);
        }
        send_command(builder).await
    }

    /// 创建会话
    ///
    /// 创建请求在独立任务中运行到完成；调用方在此之前放弃（超时或取消）时，
    /// 任务会删除服务端已经创建的会话
    async fn start_session(&self, user_agent: &str) -> Result<WebDriverSession, FetchError> {
        let (tx, rx) = oneshot::channel();
        let client = self.client.clone();
        let base_url = self.base_url.clone();
        let capabilities = self.capabilities(user_agent);

        tokio::spawn(async move {
            let outcome = create_session(client, &base_url, capabilities).await;
            if let Err(Ok(orphan)) = tx.send(outcome) {
                debug!("Caller left before session {} was ready, deleting it", orphan.endpoint);
                orphan.close().await;
            }
        });

        rx.await
            .map_err(|_| FetchError::Browser("session creation task ended unexpectedly".to_string()))?
    }

    async fn render(
        &self,
        session: &WebDriverSession,
        request: &FetchRequest,
    ) -> Result<(String, String), FetchError> {
        let endpoint = &session.endpoint;

        self.command(
            Method::POST,
            &format!("{}/timeouts", endpoint),
            Some(json!({ "pageLoad": request.timeout.as_millis() as u64 })),
        )
        .await?;

        self.command(
            Method::POST,
            &format!("{}/url", endpoint),
            Some(json!({ "url": request.url })),
        )
        .await?;

        match &request.wait_for_element {
            Some(selector) => self.wait_for_element(endpoint, selector).await?,
            None => tokio::time::sleep(self.settings.settle_delay()).await,
        }

        let html = self
            .command(Method::GET, &format!("{}/source", endpoint), None)
            .await?
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| FetchError::Browser("page source is not a string".to_string()))?;

        let final_url = self
            .command(Method::GET, &format!("{}/url", endpoint), None)
            .await?
            .as_str()
            .map(str::to_string)
            .unwrap_or_else(|| request.url.clone());

        Ok((html, final_url))
    }

    async fn wait_for_element(&self, endpoint: &str, selector: &str) -> Result<(), FetchError> {
        let body = json!({ "using": "css selector", "value": selector });
        loop {
            match self
                .command(Method::POST, &format!("{}/element", endpoint), Some(body.clone()))
                .await
            {
                Ok(_) => return Ok(()),
                Err(FetchError::Browser(message)) if message.starts_with("no such element") => {
                    tokio::time::sleep(ELEMENT_POLL_INTERVAL).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// 发送请求并解包 WebDriver 响应中的 `value`
async fn send_command(builder: RequestBuilder) -> Result<Value, FetchError> {
    let response = builder.send().await?;
    let status = response.status();
    let payload: WebDriverResponse = response
        .json()
        .await
        .map_err(|e| FetchError::Browser(format!("invalid WebDriver response: {}", e)))?;

    if status.is_success() {
        return Ok(payload.value);
    }
    Err(webdriver_error(status, payload.value))
}

async fn create_session(
    client: Client,
    base_url: &str,
    capabilities: Value,
) -> Result<WebDriverSession, FetchError> {
    let value = send_command(
        client
            .post(format!("{}/session", base_url))
            .timeout(SESSION_CREATE_TIMEOUT)
            .json(&capabilities),
    )
    .await?;

    let created: NewSessionValue = serde_json::from_value(value)
        .map_err(|e| FetchError::Browser(format!("missing session id: {}", e)))?;
    debug!(session_id = %created.session_id, "WebDriver session created");

    Ok(WebDriverSession {
        endpoint: format!("{}/session/{}", base_url, created.session_id),
        client,
        closed: false,
    })
}

fn webdriver_error(status: StatusCode, value: Value) -> FetchError {
    match serde_json::from_value::<WebDriverErrorValue>(value) {
        Ok(err) if err.error == "timeout" => FetchError::Timeout,
        Ok(err) => FetchError::Browser(format!("{}: {}", err.error, err.message)),
        Err(_) => FetchError::Browser(format!("WebDriver returned {}", status)),
    }
}

#[async_trait]
impl FetchEngine for SeleniumEngine {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResult, FetchError> {
        let start = Instant::now();
        let deadline = request.deadline();
        let user_agent = request.effective_user_agent(&self.user_agent).to_string();

        if request.headers.keys().any(|k| !k.eq_ignore_ascii_case("user-agent")) {
            debug!("WebDriver cannot set arbitrary request headers, only User-Agent is applied");
        }

        let session = tokio::time::timeout_at(deadline, self.start_session(&user_agent))
            .await
            .map_err(|_| FetchError::Timeout)??;

        let outcome = tokio::time::timeout_at(deadline, self.render(&session, request)).await;
        session.close().await;

        let (html, final_url) = outcome.map_err(|_| FetchError::Timeout)??;

        Ok(FetchResult {
            html,
            final_url,
            status: 200,
            headers: BTreeMap::new(),
            elapsed: start.elapsed(),
        })
    }

    fn name(&self) -> &'static str {
        "selenium"
    }
}

#[cfg(test)]
#[path = "selenium_engine_test.rs"]
mod tests;
