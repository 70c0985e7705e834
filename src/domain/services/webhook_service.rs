// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::job::Job;
use anyhow::Result;
use async_trait::async_trait;

/// 任务结束通知特质
///
/// 任务进入终态后调用，通知失败只记录日志，不影响任务状态
#[async_trait]
pub trait JobNotifier: Send + Sync {
    /// 发送任务结束通知
    ///
    /// # 参数
    ///
    /// * `job` - 已进入终态的任务，`webhook_url` 为空时不发送
    ///
    /// # 返回值
    ///
    /// * `Ok(())` - 发送成功或无需发送
    /// * `Err(anyhow::Error)` - 发送失败
    async fn notify(&self, job: &Job) -> Result<()>;
}

/// 不发送任何通知的实现
pub struct NoopNotifier;

#[async_trait]
impl JobNotifier for NoopNotifier {
    async fn notify(&self, _job: &Job) -> Result<()> {
        Ok(())
    }
}
