// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::application::use_cases::job_orchestrator::JobOrchestrator;
use crate::config::settings::ExecutionSettings;
use crate::workers::worker::Worker;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// 维护工作器
///
/// 定期重新排队滞留的运行中任务，并清理超过保留期的已结束任务
pub struct MaintenanceWorker {
    orchestrator: Arc<JobOrchestrator>,
    stale_after: Duration,
    reconcile_interval: Duration,
    retention_days: i64,
    cleanup_interval: Duration,
}

impl MaintenanceWorker {
    pub fn new(orchestrator: Arc<JobOrchestrator>, settings: &ExecutionSettings) -> Self {
        Self {
            orchestrator,
            stale_after: Duration::from_secs(settings.stale_after_secs),
            reconcile_interval: Duration::from_secs(settings.reconcile_interval_secs.max(1)),
            retention_days: settings.retention_days,
            cleanup_interval: Duration::from_secs(settings.cleanup_interval_secs.max(1)),
        }
    }

    async fn reconcile(&self) {
        match self.orchestrator.reconcile_stale_jobs(self.stale_after).await {
            Ok(0) => {}
            Ok(count) => info!("Requeued {} stale jobs", count),
            Err(e) => error!("Failed to reconcile stale jobs: {}", e),
        }
    }

    async fn cleanup(&self) {
        match self.orchestrator.purge_expired(self.retention_days).await {
            Ok(0) => {}
            Ok(count) => info!("Cleaned up {} expired jobs", count),
            Err(e) => error!("Failed to cleanup expired jobs: {}", e),
        }
    }
}

#[async_trait]
impl Worker for MaintenanceWorker {
    async fn run(&self, shutdown: CancellationToken) -> anyhow::Result<()> {
        info!("Maintenance worker started");

        let mut reconcile = tokio::time::interval(self.reconcile_interval);
        reconcile.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut cleanup = tokio::time::interval(self.cleanup_interval);
        cleanup.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = reconcile.tick() => self.reconcile().await,
                _ = cleanup.tick() => self.cleanup().await,
            }
        }

        info!("Maintenance worker stopped");
        Ok(())
    }

    fn name(&self) -> &str {
        "maintenance-worker"
    }
}
