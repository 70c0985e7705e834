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

use crate::domain::models::job::FetchMethod;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// 应用程序配置设置
///
/// 包含服务器、数据库、抓取、限流、重试、浏览器和执行等所有配置项
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// 服务器配置
    pub server: ServerSettings,
    /// 数据库配置
    pub database: DatabaseSettings,
    /// 抓取配置
    pub fetch: FetchSettings,
    /// 速率限制配置
    pub rate_limiting: RateLimitingSettings,
    /// 重试配置
    pub retry: RetrySettings,
    /// 浏览器引擎配置
    pub browser: BrowserSettings,
    /// 任务执行配置
    pub execution: ExecutionSettings,
    /// robots.txt 配置
    pub robots: RobotsSettings,
    /// Webhook 配置
    pub webhook: WebhookSettings,
    /// 指标导出配置
    pub metrics: MetricsSettings,
}

/// 服务器配置设置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// 服务器监听主机地址
    pub host: String,
    /// 服务器监听端口
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

/// 数据库配置设置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    /// 数据库连接URL，`memory://` 表示使用进程内存储
    pub url: String,
    /// 最大连接数
    pub max_connections: Option<u32>,
    /// 最小连接数
    pub min_connections: Option<u32>,
    /// 连接超时时间（秒）
    pub connect_timeout: Option<u64>,
    /// 空闲连接超时时间（秒）
    pub idle_timeout: Option<u64>,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: "sqlite::memory:".to_string(),
            max_connections: None,
            min_connections: None,
            connect_timeout: Some(10),
            idle_timeout: Some(300),
        }
    }
}

impl DatabaseSettings {
    pub fn is_in_memory_store(&self) -> bool {
        self.url.starts_with("memory://")
    }
}

/// 抓取配置设置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchSettings {
    /// 默认请求超时时间（秒）
    pub default_timeout_secs: u64,
    /// 默认标识请求头
    pub user_agent: String,
    /// 最大重定向次数
    pub max_redirects: usize,
    /// 是否拒绝访问内网地址
    pub block_private_networks: bool,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            default_timeout_secs: 30,
            user_agent: "WebScraperBot/1.0".to_string(),
            max_redirects: 10,
            block_private_networks: false,
        }
    }
}

impl FetchSettings {
    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.default_timeout_secs)
    }
}

/// 速率限制配置设置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitingSettings {
    /// 全局并发抓取上限
    pub max_concurrent_fetches: usize,
    /// 默认同域请求间隔（毫秒）
    pub default_domain_delay_ms: u64,
}

impl Default for RateLimitingSettings {
    fn default() -> Self {
        Self {
            max_concurrent_fetches: 10,
            default_domain_delay_ms: 1000,
        }
    }
}

impl RateLimitingSettings {
    pub fn default_domain_delay(&self) -> Duration {
        Duration::from_millis(self.default_domain_delay_ms)
    }
}

/// 重试配置设置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// 最大尝试次数
    pub max_attempts: u32,
    /// 退避基数（毫秒）
    pub backoff_base_ms: u64,
    /// 退避乘数
    pub backoff_multiplier: f64,
    /// 最大退避时间（毫秒）
    pub max_backoff_ms: u64,
    /// 是否启用抖动
    pub jitter: bool,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base_ms: 1000,
            backoff_multiplier: 2.0,
            max_backoff_ms: 30_000,
            jitter: false,
        }
    }
}

/// 浏览器引擎配置设置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserSettings {
    /// 是否无头模式
    pub headless: bool,
    /// 浏览器操作超时（秒）
    pub timeout_secs: u64,
    /// 页面加载后的固定等待时间（毫秒）
    pub settle_delay_ms: u64,
    /// WebDriver 服务地址
    pub webdriver_url: String,
    /// 远程 CDP 调试地址，设置后不再本地启动浏览器
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_cdp_url: Option<String>,
    /// 需要脚本渲染但未指定浏览器策略时使用的引擎
    pub preferred_engine: FetchMethod,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            headless: true,
            timeout_secs: 30,
            settle_delay_ms: 1000,
            webdriver_url: "http://localhost:4444".to_string(),
            remote_cdp_url: None,
            preferred_engine: FetchMethod::Playwright,
        }
    }
}

impl BrowserSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

/// 任务执行配置设置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionSettings {
    /// 后台抓取 worker 数量
    pub worker_count: usize,
    /// 同步执行的最长等待时间（秒）
    pub sync_timeout_secs: u64,
    /// running 状态超过该时间视为滞留（秒）
    pub stale_after_secs: u64,
    /// 滞留任务对账间隔（秒）
    pub reconcile_interval_secs: u64,
    /// 已结束任务的保留天数
    pub retention_days: i64,
    /// 过期数据清理间隔（秒）
    pub cleanup_interval_secs: u64,
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        Self {
            worker_count: 4,
            sync_timeout_secs: 60,
            stale_after_secs: 900,
            reconcile_interval_secs: 60,
            retention_days: 30,
            cleanup_interval_secs: 3600,
        }
    }
}

impl ExecutionSettings {
    pub fn sync_timeout(&self) -> Duration {
        Duration::from_secs(self.sync_timeout_secs)
    }
}

/// robots.txt 配置设置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RobotsSettings {
    /// 匹配 robots.txt 时使用的代理名
    pub user_agent: String,
    /// 缓存时间（秒）
    pub cache_ttl_secs: u64,
}

impl Default for RobotsSettings {
    fn default() -> Self {
        Self {
            user_agent: "WebScraperBot".to_string(),
            cache_ttl_secs: 3600,
        }
    }
}

/// Webhook配置设置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookSettings {
    /// Webhook签名密钥
    pub secret: String,
    /// 投递超时（秒）
    pub timeout_secs: u64,
}

impl Default for WebhookSettings {
    fn default() -> Self {
        Self {
            secret: "change-me".to_string(),
            timeout_secs: 10,
        }
    }
}

/// 指标导出配置设置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsSettings {
    /// 是否启用 Prometheus 导出
    pub enabled: bool,
    /// 导出端口
    pub port: u16,
}

impl Default for MetricsSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            port: 9000,
        }
    }
}

impl Settings {
    /// 创建新的配置实例
    ///
    /// 依次叠加默认值、`config/default`、`config/{HARVESTRS_ENVIRONMENT}` 和环境变量
    ///
    /// # Returns
    ///
    /// * `Ok(Settings)` - 成功加载的配置
    /// * `Err(ConfigError)` - 配置加载失败
    pub fn new() -> Result<Self, ConfigError> {
        Self::load_from(Path::new("config"))
    }

    /// 从指定目录加载配置文件
    pub fn load_from(config_dir: &Path) -> Result<Self, ConfigError> {
        let env = std::env::var("HARVESTRS_ENVIRONMENT").unwrap_or_else(|_| "default".to_string());
        let builder = Config::builder()
            .add_source(Config::try_from(&Settings::default())?)
            .add_source(File::from(config_dir.join("default")).required(false))
            .add_source(File::from(config_dir.join(&env)).required(false))
            .add_source(
                Environment::with_prefix("HARVESTRS")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }
}

#[cfg(test)]
#[path = "settings_test.rs"]
mod tests;
