// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::config::settings::RetrySettings;
use crate::engines::traits::FetchError;
use std::time::Duration;

/// 重试策略配置
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// 最大尝试次数（含首次请求）
    pub max_attempts: u32,
    /// 初始退避时间
    pub initial_backoff: Duration,
    /// 最大退避时间
    pub max_backoff: Duration,
    /// 退避乘数
    pub backoff_multiplier: f64,
    /// 抖动因子 (0.0-1.0)
    pub jitter_factor: f64,
    /// 是否启用抖动
    pub enable_jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,
            enable_jitter: false,
        }
    }
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(settings: &RetrySettings) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            initial_backoff: Duration::from_millis(settings.backoff_base_ms),
            max_backoff: Duration::from_millis(settings.max_backoff_ms),
            backoff_multiplier: sanitize_multiplier(settings.backoff_multiplier),
            jitter_factor: 0.1,
            enable_jitter: settings.jitter,
        }
    }
}

/// 退避乘数必须是不小于 1 的有限值，否则退化为固定间隔
fn sanitize_multiplier(multiplier: f64) -> f64 {
    if multiplier.is_finite() && multiplier >= 1.0 {
        multiplier
    } else {
        tracing::warn!("Invalid backoff multiplier {}, using 1.0", multiplier);
        1.0
    }
}

impl RetryPolicy {
    /// 不做任何重试的策略
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// 计算第 `retry` 次重试前的退避时间（从 1 开始计数）
    pub fn calculate_backoff(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(i32::MAX as u32) as i32;
        let backoff_secs =
            self.initial_backoff.as_secs_f64() * self.backoff_multiplier.powi(exponent);

        let capped_backoff = backoff_secs.min(self.max_backoff.as_secs_f64()).max(0.0);

        let jitter_range = capped_backoff * self.jitter_factor;
        let final_backoff = if self.enable_jitter && jitter_range > 0.0 {
            let jitter = rand::random_range(-jitter_range..jitter_range);
            (capped_backoff + jitter).max(0.0)
        } else {
            capped_backoff
        };

        Duration::try_from_secs_f64(final_backoff).unwrap_or(self.max_backoff)
    }

    /// 已完成 `attempt` 次尝试后是否还允许继续
    pub fn has_attempts_left(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// 根据错误类型判断是否应该重试
    pub fn should_retry(&self, attempt: u32, error: &FetchError) -> bool {
        self.has_attempts_left(attempt) && error.is_retryable()
    }
}
