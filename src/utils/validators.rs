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

use std::net::IpAddr;
use thiserror::Error;
use tokio::net::lookup_host;
use url::Url;

/// 验证错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// URL 语法无效
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    /// 不支持的协议
    #[error("Unsupported URL scheme '{0}', only http and https are allowed")]
    UnsupportedScheme(String),
    /// 目标指向内网地址
    #[error("SSRF protection: {0}")]
    SsrfDetected(String),
    /// 其他输入错误
    #[error("{0}")]
    InvalidInput(String),
}

/// 校验 URL 语法与协议
///
/// # 参数
///
/// * `url` - URL字符串
///
/// # 返回值
///
/// * `Ok(Url)` - 解析后的URL
/// * `Err(ValidationError)` - URL 无效或协议不是 http/https
pub fn parse_http_url(url: &str) -> Result<Url, ValidationError> {
    let parsed = Url::parse(url.trim()).map_err(|e| ValidationError::InvalidUrl(e.to_string()))?;

    match parsed.scheme() {
        "http" | "https" => {}
        other => return Err(ValidationError::UnsupportedScheme(other.to_string())),
    }

    if parsed.host_str().map(str::is_empty).unwrap_or(true) {
        return Err(ValidationError::InvalidUrl("missing host".to_string()));
    }

    Ok(parsed)
}

/// 单次抓取允许的最长超时（秒）
pub const MAX_TIMEOUT_SECS: u64 = 3600;

/// 同域请求间隔的上限（秒）
pub const MAX_DOMAIN_DELAY_SECS: f64 = 3600.0;

/// 校验超时秒数位于 `1..=MAX_TIMEOUT_SECS`
pub fn validate_timeout_secs(field: &str, secs: u64) -> Result<(), ValidationError> {
    if secs == 0 || secs > MAX_TIMEOUT_SECS {
        return Err(ValidationError::InvalidInput(format!(
            "{} must be between 1 and {} seconds, got {}",
            field, MAX_TIMEOUT_SECS, secs
        )));
    }
    Ok(())
}

/// 校验同域间隔秒数为有限值且位于 `0..=MAX_DOMAIN_DELAY_SECS`
pub fn validate_delay_secs(secs: f64) -> Result<(), ValidationError> {
    if !secs.is_finite() || !(0.0..=MAX_DOMAIN_DELAY_SECS).contains(&secs) {
        return Err(ValidationError::InvalidInput(format!(
            "rate limit delay must be between 0 and {} seconds, got {}",
            MAX_DOMAIN_DELAY_SECS, secs
        )));
    }
    Ok(())
}

/// 提取 URL 的主机名（小写）
pub fn host_of(url: &str) -> Option<String> {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_ascii_lowercase()))
}

/// 验证 URL 是否指向公网地址 (防止 SSRF)
///
/// 解析主机名并拒绝环回、私有和链路本地地址
pub async fn ensure_public_host(url: &Url) -> Result<(), ValidationError> {
    let host = url
        .host_str()
        .ok_or_else(|| ValidationError::InvalidUrl("missing host".to_string()))?;

    if host.eq_ignore_ascii_case("localhost") {
        return Err(ValidationError::SsrfDetected(
            "localhost is not allowed".to_string(),
        ));
    }

    let port = url.port_or_known_default().unwrap_or(80);
    let addrs = lookup_host((host.trim_matches(|c| c == '[' || c == ']'), port))
        .await
        .map_err(|e| ValidationError::InvalidUrl(format!("cannot resolve {}: {}", host, e)))?;

    for addr in addrs {
        if is_private_ip(addr.ip()) {
            return Err(ValidationError::SsrfDetected(format!(
                "private address {} is not allowed",
                addr.ip()
            )));
        }
    }

    Ok(())
}

/// 判断 IP 是否属于内网或保留地址
pub fn is_private_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(ipv4) => {
            ipv4.is_loopback()
                || ipv4.is_private()
                || ipv4.is_link_local()
                || ipv4.is_broadcast()
                || ipv4.is_multicast()
                || ipv4.is_unspecified()
        }
        IpAddr::V6(ipv6) => {
            let first = ipv6.segments()[0];
            ipv6.is_loopback()
                || ipv6.is_unspecified()
                // fc00::/7
                || (first & 0xfe00) == 0xfc00
                // fe80::/10
                || (first & 0xffc0) == 0xfe80
                // ff00::/8
                || (first & 0xff00) == 0xff00
        }
    }
}
