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

use crate::application::dto::job_request::{CreateJobRequest, ExecutionMode, ExportFormat, JobListQuery};
use crate::application::dto::job_response::{BulkCreateItem, BulkCreateResponse, JobResult};
use crate::application::use_cases::record_export::records_to_csv;
use crate::application::use_cases::scrape_pipeline::{
    EffectiveConfig, RetryObserver, ScrapeOverrides, ScrapePipeline,
};
use crate::domain::models::job::{Job, JobError, JobStatus};
use crate::domain::models::scraped_record::ScrapedRecord;
use crate::domain::repositories::job_repository::{JobRepository, JobStatistics, Page};
use crate::domain::repositories::scraped_record_repository::ScrapedRecordRepository;
use crate::domain::services::config_resolver::ConfigResolver;
use crate::domain::services::webhook_service::JobNotifier;
use crate::engines::traits::FetchError;
use crate::queue::job_queue::JobQueue;
use crate::utils::errors::{ErrorKind, ServiceError};
use crate::utils::validators::{parse_http_url, validate_timeout_secs, ValidationError};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

/// 编排器的协作者
pub struct OrchestratorDeps {
    pub jobs: Arc<dyn JobRepository>,
    pub records: Arc<dyn ScrapedRecordRepository>,
    pub resolver: ConfigResolver,
    pub pipeline: Arc<ScrapePipeline>,
    pub queue: Arc<dyn JobQueue>,
    pub notifier: Arc<dyn JobNotifier>,
}

/// 已认领、等待执行的任务
struct ClaimedJob {
    job: Job,
    effective: EffectiveConfig,
    token: CancellationToken,
    _active: ActiveGuard,
}

/// 执行结束（包括被丢弃）时把任务从活跃表中移除
struct ActiveGuard {
    active: Arc<DashMap<Uuid, CancellationToken>>,
    job_id: Uuid,
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.active.remove(&self.job_id);
        metrics::gauge!("harvestrs_active_jobs").set(self.active.len() as f64);
    }
}

/// 把重试次数和退避时间写回任务记录
struct JobRetryRecorder<'a> {
    orchestrator: &'a JobOrchestrator,
    job_id: Uuid,
}

#[async_trait]
impl RetryObserver for JobRetryRecorder<'_> {
    async fn on_retry(&self, _attempt: u32, backoff: Duration, error: &FetchError) {
        let job_error = JobError::new(error.kind(), error.to_string());
        if let Err(e) = self
            .orchestrator
            .record_retry(self.job_id, backoff, job_error)
            .await
        {
            warn!(job_id = %self.job_id, "Failed to persist retry state: {}", e);
        }
    }
}

/// 任务编排器
///
/// 负责任务生命周期：创建、认领、经限流闸门抓取、抽取、重试和记录结果。
/// 所有状态写入都在生命周期锁内完成（加载、校验、转换、保存），
/// 同一个任务不会被重复执行
pub struct JobOrchestrator {
    jobs: Arc<dyn JobRepository>,
    records: Arc<dyn ScrapedRecordRepository>,
    resolver: ConfigResolver,
    pipeline: Arc<ScrapePipeline>,
    queue: Arc<dyn JobQueue>,
    notifier: Arc<dyn JobNotifier>,
    active: Arc<DashMap<Uuid, CancellationToken>>,
    lifecycle: Mutex<()>,
    sync_timeout: Duration,
}

impl JobOrchestrator {
    /// 创建编排器
    ///
    /// # 参数
    ///
    /// * `deps` - 仓库、配置解析、执行管道、队列和通知等协作者
    /// * `sync_timeout` - 同步执行时最长等待时间
    pub fn new(deps: OrchestratorDeps, sync_timeout: Duration) -> Self {
        Self {
            jobs: deps.jobs,
            records: deps.records,
            resolver: deps.resolver,
            pipeline: deps.pipeline,
            queue: deps.queue,
            notifier: deps.notifier,
            active: Arc::new(DashMap::new()),
            lifecycle: Mutex::new(()),
            sync_timeout,
        }
    }

    pub fn pipeline(&self) -> &Arc<ScrapePipeline> {
        &self.pipeline
    }

    /// 当前进程内正在执行的任务数
    pub fn active_jobs(&self) -> usize {
        self.active.len()
    }

    /// 创建任务
    ///
    /// # 参数
    ///
    /// * `request` - 创建参数，URL 必须是 http/https
    ///
    /// # 返回值
    ///
    /// * `Ok(Job)` - 已持久化的 Pending 任务
    /// * `Err(ServiceError)` - 参数校验或持久化失败
    #[instrument(skip(self, request), fields(url = %request.url))]
    pub async fn create_job(&self, request: CreateJobRequest) -> Result<Job, ServiceError> {
        let job = build_job(request)?;
        self.jobs.save(&job).await?;

        metrics::counter!("harvestrs_jobs_total", "status" => JobStatus::Pending.as_str()).increment(1);
        info!(job_id = %job.id, "Job created");
        Ok(job)
    }

    /// 批量创建任务，每个条目独立成功或失败
    pub async fn create_jobs(&self, requests: Vec<CreateJobRequest>) -> BulkCreateResponse {
        let mut items = Vec::with_capacity(requests.len());
        for request in requests {
            let url = request.url.clone();
            match self.create_job(request).await {
                Ok(job) => items.push(BulkCreateItem {
                    url,
                    job: Some(job),
                    error: None,
                }),
                Err(e) => items.push(BulkCreateItem {
                    url,
                    job: None,
                    error: Some(e.to_string()),
                }),
            }
        }
        BulkCreateResponse::new(items)
    }

    /// 获取任务
    pub async fn get_job(&self, id: Uuid) -> Result<Job, ServiceError> {
        self.jobs
            .load(id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("job {}", id)))
    }

    /// 条件查询任务
    pub async fn list_jobs(&self, query: JobListQuery) -> Result<Page<Job>, ServiceError> {
        let (filter, pagination) = query.into_filter()?;
        Ok(self.jobs.list(&filter, pagination).await?)
    }

    /// 执行任务
    ///
    /// # 参数
    ///
    /// * `id` - 任务ID
    /// * `mode` - `Sync` 阻塞到终态或同步超时；`Async` 投递到后台队列后立即返回
    ///
    /// # 返回值
    ///
    /// * `Ok(JobResult)` - 状态、记录数和耗时；同步超时时返回此刻的状态
    /// * `Err(ServiceError)` - 任务不存在、已在执行或已结束
    #[instrument(skip(self), fields(job_id = %id))]
    pub async fn execute_job(
        self: &Arc<Self>,
        id: Uuid,
        mode: ExecutionMode,
    ) -> Result<JobResult, ServiceError> {
        let started = Instant::now();

        match mode {
            ExecutionMode::Async => {
                let job = self.get_job(id).await?;
                ensure_pending(&job)?;
                self.queue.enqueue(id).await?;
                info!("Job enqueued");
                Ok(JobResult::from_job(&job, elapsed_ms(started)))
            }
            ExecutionMode::Sync => {
                let claimed = self.claim(id).await?;
                let orchestrator = Arc::clone(self);
                // The execution outlives the caller if the sync wait times out.
                let handle = tokio::spawn(async move { orchestrator.execute_claimed(claimed).await });

                match tokio::time::timeout(self.sync_timeout, handle).await {
                    Ok(Ok(result)) => {
                        let job = result?;
                        Ok(JobResult::from_job(&job, elapsed_ms(started)))
                    }
                    Ok(Err(join_error)) => Err(ServiceError::Internal(format!(
                        "job execution task failed: {}",
                        join_error
                    ))),
                    Err(_) => {
                        info!("Sync wait timed out, job continues in background");
                        let job = self.get_job(id).await?;
                        Ok(JobResult::from_job(&job, elapsed_ms(started)))
                    }
                }
            }
        }
    }

    /// 后台工作器入口：认领并执行一个 Pending 任务
    ///
    /// 重复投递的任务在认领时以 InvalidState 拒绝，不会被执行两次
    #[instrument(skip(self), fields(job_id = %id))]
    pub async fn run_job(&self, id: Uuid) -> Result<JobResult, ServiceError> {
        let started = Instant::now();
        let claimed = self.claim(id).await?;
        let job = self.execute_claimed(claimed).await?;
        Ok(JobResult::from_job(&job, elapsed_ms(started)))
    }

    /// 取消任务
    ///
    /// Pending 任务直接进入 Cancelled；正在本进程执行的任务触发取消令牌，
    /// 在下一个挂起点转入 Cancelled；终态任务返回 InvalidState
    ///
    /// # 返回值
    ///
    /// * `Ok(Job)` - 取消后的任务（执行中的任务此刻仍为 Running）
    #[instrument(skip(self), fields(job_id = %id))]
    pub async fn cancel_job(&self, id: Uuid) -> Result<Job, ServiceError> {
        let _guard = self.lifecycle.lock().await;
        let job = self.get_job(id).await?;

        match job.status {
            JobStatus::Running => {
                if let Some(token) = self.active.get(&id) {
                    token.cancel();
                    info!("Cancellation requested for running job");
                    return Ok(job);
                }
                // A running job with no local execution was orphaned by a previous process.
                let job = job.cancel()?;
                self.jobs.save(&job).await?;
                self.finished(&job);
                Ok(job)
            }
            JobStatus::Pending => {
                let job = job.cancel()?;
                self.jobs.save(&job).await?;
                info!("Pending job cancelled");
                self.finished(&job);
                Ok(job)
            }
            status => Err(ServiceError::InvalidState(format!(
                "job {} is already {}",
                id, status
            ))),
        }
    }

    /// 获取任务的抽取记录
    pub async fn job_records(&self, id: Uuid) -> Result<Vec<ScrapedRecord>, ServiceError> {
        self.get_job(id).await?;
        Ok(self.records.find_by_job(id).await?)
    }

    /// 导出任务记录
    ///
    /// # 返回值
    ///
    /// * `Ok((content_type, body))` - JSON 数组或扁平 CSV 表格
    pub async fn export_records(
        &self,
        id: Uuid,
        format: ExportFormat,
    ) -> Result<(&'static str, String), ServiceError> {
        let records = self.job_records(id).await?;
        match format {
            ExportFormat::Json => {
                let body = serde_json::to_string(&records)
                    .map_err(|e| ServiceError::Internal(e.to_string()))?;
                Ok(("application/json", body))
            }
            ExportFormat::Csv => Ok(("text/csv; charset=utf-8", records_to_csv(&records)?)),
        }
    }

    /// 任务统计，最近 24 小时创建的任务计入 recent_jobs
    pub async fn statistics(&self) -> Result<JobStatistics, ServiceError> {
        let since = Utc::now() - chrono::Duration::hours(24);
        Ok(self.jobs.statistics(since).await?)
    }

    /// 删除终态任务及其记录
    #[instrument(skip(self), fields(job_id = %id))]
    pub async fn delete_job(&self, id: Uuid) -> Result<(), ServiceError> {
        let _guard = self.lifecycle.lock().await;
        let job = self.get_job(id).await?;
        if !job.is_terminal() {
            return Err(ServiceError::InvalidState(format!(
                "job {} is {} and cannot be deleted",
                id, job.status
            )));
        }
        self.jobs.delete(id).await?;
        info!("Job deleted");
        Ok(())
    }

    /// 重新排队长时间停留在 Running 且不在本进程执行的任务
    ///
    /// # 返回值
    ///
    /// 重新排队的任务数
    pub async fn reconcile_stale_jobs(&self, stale_after: Duration) -> Result<usize, ServiceError> {
        let stale_after = chrono::Duration::from_std(stale_after)
            .map_err(|e| ServiceError::Internal(e.to_string()))?;
        let before = Utc::now() - stale_after;

        let mut requeued = Vec::new();
        {
            let _guard = self.lifecycle.lock().await;
            for job in self.jobs.find_stale_running(before).await? {
                if self.active.contains_key(&job.id) {
                    continue;
                }
                let job = job.requeue()?;
                self.jobs.save(&job).await?;
                requeued.push(job.id);
            }
        }

        for id in &requeued {
            self.queue.enqueue(*id).await?;
        }
        if !requeued.is_empty() {
            warn!(count = requeued.len(), "Requeued stale running jobs");
        }
        Ok(requeued.len())
    }

    /// 清理超过保留期的终态任务
    pub async fn purge_expired(&self, retention_days: i64) -> Result<u64, ServiceError> {
        let before = Utc::now() - chrono::Duration::days(retention_days.max(0));
        let removed = self.jobs.delete_finished_before(before).await?;
        if removed > 0 {
            info!(removed, "Purged expired jobs");
        }
        Ok(removed)
    }

    /// 认领任务：解析有效配置并转入 Running
    async fn claim(&self, id: Uuid) -> Result<ClaimedJob, ServiceError> {
        let _guard = self.lifecycle.lock().await;

        let job = self.get_job(id).await?;
        ensure_pending(&job)?;

        let config = self.resolver.resolve(&job.url).await?;
        let overrides = ScrapeOverrides::from(&job);
        let effective = match self.pipeline.resolve(&job.url, &overrides, config.as_ref()) {
            Ok(effective) => effective,
            Err(e) => {
                let method = overrides.method.unwrap_or_default();
                let job = job.start(method)?.fail(JobError::new(ErrorKind::Validation, e.to_string()))?;
                self.jobs.save(&job).await?;
                self.finished(&job);
                return Err(ServiceError::Validation(e));
            }
        };

        let job = job.start(effective.method)?;
        self.jobs.save(&job).await?;

        let token = CancellationToken::new();
        self.active.insert(id, token.clone());
        metrics::gauge!("harvestrs_active_jobs").set(self.active.len() as f64);
        info!(method = %effective.method, domain = %effective.domain, "Job started");

        Ok(ClaimedJob {
            job,
            effective,
            token,
            _active: ActiveGuard {
                active: Arc::clone(&self.active),
                job_id: id,
            },
        })
    }

    /// 执行已认领的任务并提交结果
    ///
    /// 任务状态和记录在同一次写入中提交；提交失败时任务保持 Running，
    /// 由维护任务重新排队
    async fn execute_claimed(&self, claimed: ClaimedJob) -> Result<Job, ServiceError> {
        let ClaimedJob {
            job,
            effective,
            token,
            _active,
        } = claimed;
        let job_id = job.id;

        let recorder = JobRetryRecorder {
            orchestrator: self,
            job_id,
        };
        let outcome = self.pipeline.run(&effective, &token, &recorder).await;

        let _guard = self.lifecycle.lock().await;
        let current = self.jobs.load(job_id).await?.unwrap_or(job);

        let finished = match outcome {
            Ok(_) | Err(ServiceError::Cancelled) if token.is_cancelled() => {
                let job = current.cancel()?;
                self.jobs.save(&job).await?;
                job
            }
            Ok(output) => {
                let record = output.to_record(job_id, &current.url);
                let job = current.succeed(1)?;
                self.jobs.save_with_records(&job, &[record]).await?;
                job
            }
            Err(ServiceError::Cancelled) => {
                let job = current.cancel()?;
                self.jobs.save(&job).await?;
                job
            }
            Err(e) => {
                error!(job_id = %job_id, kind = %e.kind(), "Job failed: {}", e);
                let job = current.fail(JobError::new(e.kind(), e.to_string()))?;
                self.jobs.save(&job).await?;
                job
            }
        };

        self.finished(&finished);
        Ok(finished)
    }

    async fn record_retry(
        &self,
        id: Uuid,
        backoff: Duration,
        error: JobError,
    ) -> Result<(), ServiceError> {
        let _guard = self.lifecycle.lock().await;
        let job = self.get_job(id).await?;
        if job.status != JobStatus::Running {
            return Ok(());
        }
        let job = job.record_retry(backoff.as_millis() as u64, error)?;
        self.jobs.save(&job).await?;
        Ok(())
    }

    /// 终态后的指标和通知，通知在后台发送
    fn finished(&self, job: &Job) {
        metrics::counter!("harvestrs_jobs_total", "status" => job.status.as_str()).increment(1);
        info!(job_id = %job.id, status = %job.status, records = job.record_count, "Job finished");

        if job.webhook_url.is_none() {
            return;
        }
        let notifier = Arc::clone(&self.notifier);
        let job = job.clone();
        tokio::spawn(async move {
            if let Err(e) = notifier.notify(&job).await {
                warn!(job_id = %job.id, "Webhook delivery failed: {}", e);
            }
        });
    }
}

fn build_job(request: CreateJobRequest) -> Result<Job, ValidationError> {
    let url = parse_http_url(&request.url)?;

    if let Some(secs) = request.timeout_secs {
        validate_timeout_secs("timeout", secs)?;
    }
    if let Some(selectors) = &request.selectors {
        if selectors.keys().any(|name| name.trim().is_empty()) {
            return Err(ValidationError::InvalidInput(
                "selector field names cannot be empty".to_string(),
            ));
        }
    }
    if let Some(webhook) = &request.webhook_url {
        parse_http_url(webhook)?;
    }

    let mut job = Job::new(url.to_string());
    job.method = request.method;
    job.selectors = request.selectors;
    job.headers = request.headers;
    job.timeout_secs = request.timeout_secs;
    job.webhook_url = request.webhook_url;
    Ok(job)
}

fn ensure_pending(job: &Job) -> Result<(), ServiceError> {
    match job.status {
        JobStatus::Pending => Ok(()),
        JobStatus::Running => Err(ServiceError::InvalidState(format!(
            "job {} is already running",
            job.id
        ))),
        status => Err(ServiceError::InvalidState(format!(
            "job {} is already {}",
            job.id, status
        ))),
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}
