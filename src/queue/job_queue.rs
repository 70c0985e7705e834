// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;

/// 队列错误类型
#[derive(Error, Debug)]
pub enum QueueError {
    /// 接收端已关闭，任务无法投递
    #[error("Job queue is closed")]
    Closed,
}

/// 后台任务传输特质
///
/// 至少一次投递：同一任务ID可能被多次取出，消费方需自行判重
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// 投递待执行的任务ID
    async fn enqueue(&self, job_id: Uuid) -> Result<(), QueueError>;

    /// 取出下一个任务ID，等待直到有任务
    ///
    /// # 返回值
    ///
    /// * `Ok(Some(Uuid))` - 取到任务
    /// * `Ok(None)` - 队列已关闭且为空
    async fn dequeue(&self) -> Result<Option<Uuid>, QueueError>;
}

/// 进程内任务队列
///
/// 基于无界 mpsc 通道，多个工作器共享同一个接收端
pub struct InMemoryJobQueue {
    sender: mpsc::UnboundedSender<Uuid>,
    receiver: Mutex<mpsc::UnboundedReceiver<Uuid>>,
}

impl InMemoryJobQueue {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            sender,
            receiver: Mutex::new(receiver),
        }
    }

    /// 关闭队列，已投递的任务仍可被取出
    pub async fn close(&self) {
        self.receiver.lock().await.close();
    }
}

impl Default for InMemoryJobQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobQueue for InMemoryJobQueue {
    async fn enqueue(&self, job_id: Uuid) -> Result<(), QueueError> {
        self.sender.send(job_id).map_err(|_| QueueError::Closed)
    }

    async fn dequeue(&self) -> Result<Option<Uuid>, QueueError> {
        let mut receiver = self.receiver.lock().await;
        Ok(receiver.recv().await)
    }
}
