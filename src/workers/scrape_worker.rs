// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::application::use_cases::job_orchestrator::JobOrchestrator;
use crate::queue::job_queue::JobQueue;
use crate::utils::errors::ServiceError;
use crate::workers::worker::Worker;
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// 抓取工作器
///
/// 从队列取出任务ID并交给编排器执行
pub struct ScrapeWorker {
    name: String,
    orchestrator: Arc<JobOrchestrator>,
    queue: Arc<dyn JobQueue>,
}

impl ScrapeWorker {
    pub fn new(index: usize, orchestrator: Arc<JobOrchestrator>, queue: Arc<dyn JobQueue>) -> Self {
        Self {
            name: format!("scrape-worker-{}", index),
            orchestrator,
            queue,
        }
    }
}

#[async_trait]
impl Worker for ScrapeWorker {
    async fn run(&self, shutdown: CancellationToken) -> anyhow::Result<()> {
        info!(worker = %self.name, "Worker started");

        loop {
            let next = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                next = self.queue.dequeue() => next,
            };

            let job_id = match next {
                Ok(Some(job_id)) => job_id,
                Ok(None) => {
                    info!(worker = %self.name, "Queue closed");
                    break;
                }
                Err(e) => {
                    warn!(worker = %self.name, "Failed to dequeue: {}", e);
                    break;
                }
            };

            match self.orchestrator.run_job(job_id).await {
                Ok(result) => {
                    debug!(worker = %self.name, %job_id, status = %result.status, "Job processed");
                }
                // Duplicate deliveries and jobs cancelled while queued end up here.
                Err(ServiceError::InvalidState(reason)) => {
                    debug!(worker = %self.name, %job_id, "Skipping job: {}", reason);
                }
                Err(e) => {
                    warn!(worker = %self.name, %job_id, "Job execution failed: {}", e);
                }
            }
        }

        info!(worker = %self.name, "Worker stopped");
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}
