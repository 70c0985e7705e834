// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::application::use_cases::job_orchestrator::JobOrchestrator;
use crate::queue::job_queue::JobQueue;
use crate::workers::scrape_worker::ScrapeWorker;
use crate::workers::worker::Worker;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// 工作管理器
///
/// 启动后台工作器，并通过共享的关闭令牌统一停止它们
pub struct WorkerManager {
    shutdown: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerManager {
    pub fn new(shutdown: CancellationToken) -> Self {
        Self {
            shutdown,
            handles: Vec::new(),
        }
    }

    /// 在独立任务中运行一个工作器
    pub fn spawn(&mut self, worker: Arc<dyn Worker>) {
        let shutdown = self.shutdown.child_token();
        let handle = tokio::spawn(async move {
            if let Err(e) = worker.run(shutdown).await {
                error!(worker = worker.name(), "Worker exited with error: {}", e);
            }
        });
        self.handles.push(handle);
    }

    /// 启动工作进程
    ///
    /// 创建并启动指定数量的抓取工作器
    ///
    /// # 参数
    ///
    /// * `count` - 要启动的工作进程数量
    /// * `orchestrator` - 执行任务的编排器
    /// * `queue` - 任务队列
    pub fn start_scrape_workers(
        &mut self,
        count: usize,
        orchestrator: Arc<JobOrchestrator>,
        queue: Arc<dyn JobQueue>,
    ) {
        for index in 0..count {
            let worker = ScrapeWorker::new(index, orchestrator.clone(), queue.clone());
            self.spawn(Arc::new(worker));
        }
        info!(count, "Scrape workers started");
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// 触发关闭令牌并等待工作器退出
    ///
    /// # 参数
    ///
    /// * `grace` - 等待正在执行的任务结束的最长时间，超时后强制中止
    pub async fn shutdown(self, grace: Duration) {
        info!("Shutting down workers...");
        self.shutdown.cancel();

        for mut handle in self.handles {
            match tokio::time::timeout(grace, &mut handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("Worker task failed: {}", e),
                Err(_) => {
                    warn!("Worker did not stop in time, aborting");
                    handle.abort();
                }
            }
        }

        info!("Workers shut down successfully");
    }
}
