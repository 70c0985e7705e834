// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::job::{FetchMethod, Job, JobStatus};
use crate::domain::models::scraped_record::ScrapedRecord;
use crate::domain::repositories::job_repository::{
    JobFilter, JobRepository, JobStatistics, Page, Pagination, RepositoryError,
};
use crate::infrastructure::database::entities::job as job_entity;
use crate::infrastructure::database::entities::scraped_record as record_entity;
use crate::infrastructure::repositories::scraped_record_repo_impl::to_active_model as record_active_model;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{
    sea_query::{Expr, OnConflict},
    ColumnTrait, Condition, ConnectionTrait, DatabaseConnection, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use std::sync::Arc;
use uuid::Uuid;

const TERMINAL_STATUSES: [JobStatus; 3] = [
    JobStatus::Succeeded,
    JobStatus::Failed,
    JobStatus::Cancelled,
];

/// 任务仓库实现
///
/// 基于SeaORM实现的任务数据访问层
#[derive(Clone)]
pub struct JobRepositoryImpl {
    /// 数据库连接
    db: Arc<DatabaseConnection>,
}

impl JobRepositoryImpl {
    /// 创建新的任务仓库实例
    ///
    /// # 参数
    ///
    /// * `db` - 数据库连接
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

impl TryFrom<job_entity::Model> for Job {
    type Error = RepositoryError;

    fn try_from(model: job_entity::Model) -> Result<Self, Self::Error> {
        let status = model
            .status
            .parse::<JobStatus>()
            .map_err(|_| RepositoryError::Serialization(format!("unknown job status '{}'", model.status)))?;

        Ok(Self {
            id: model.id,
            url: model.url,
            method: parse_method(model.method.as_deref())?,
            selectors: model.selectors.map(serde_json::from_value).transpose()?,
            headers: model.headers.map(serde_json::from_value).transpose()?,
            timeout_secs: model.timeout_secs.map(|secs| secs.max(0) as u64),
            webhook_url: model.webhook_url,
            status,
            executed_method: parse_method(model.executed_method.as_deref())?,
            retry_count: model.retry_count.max(0) as u32,
            last_backoff_ms: model.last_backoff_ms.map(|ms| ms.max(0) as u64),
            last_error: model.last_error.map(serde_json::from_value).transpose()?,
            record_count: model.record_count.max(0) as u32,
            created_at: model.created_at,
            started_at: model.started_at,
            finished_at: model.finished_at,
            updated_at: model.updated_at,
        })
    }
}

fn parse_method(value: Option<&str>) -> Result<Option<FetchMethod>, RepositoryError> {
    value
        .map(str::parse::<FetchMethod>)
        .transpose()
        .map_err(|e| RepositoryError::Serialization(e.to_string()))
}

fn to_active_model(job: &Job) -> Result<job_entity::ActiveModel, RepositoryError> {
    Ok(job_entity::ActiveModel {
        id: Set(job.id),
        url: Set(job.url.clone()),
        domain: Set(job.domain().unwrap_or_default()),
        method: Set(job.method.map(|m| m.as_str().to_string())),
        selectors: Set(job.selectors.as_ref().map(serde_json::to_value).transpose()?),
        headers: Set(job.headers.as_ref().map(serde_json::to_value).transpose()?),
        timeout_secs: Set(job.timeout_secs.map(|secs| secs as i64)),
        webhook_url: Set(job.webhook_url.clone()),
        status: Set(job.status.as_str().to_string()),
        executed_method: Set(job.executed_method.map(|m| m.as_str().to_string())),
        retry_count: Set(job.retry_count as i32),
        last_backoff_ms: Set(job.last_backoff_ms.map(|ms| ms as i64)),
        last_error: Set(job.last_error.as_ref().map(serde_json::to_value).transpose()?),
        record_count: Set(job.record_count as i32),
        created_at: Set(job.created_at),
        started_at: Set(job.started_at),
        finished_at: Set(job.finished_at),
        updated_at: Set(job.updated_at),
    })
}

async fn upsert<C: ConnectionTrait>(conn: &C, job: &Job) -> Result<(), RepositoryError> {
    use job_entity::Column;

    let conflict = OnConflict::column(Column::Id)
        .update_columns([
            Column::Url,
            Column::Domain,
            Column::Method,
            Column::Selectors,
            Column::Headers,
            Column::TimeoutSecs,
            Column::WebhookUrl,
            Column::Status,
            Column::ExecutedMethod,
            Column::RetryCount,
            Column::LastBackoffMs,
            Column::LastError,
            Column::RecordCount,
            Column::StartedAt,
            Column::FinishedAt,
            Column::UpdatedAt,
        ])
        .to_owned();

    job_entity::Entity::insert(to_active_model(job)?)
        .on_conflict(conflict)
        .exec_without_returning(conn)
        .await?;
    Ok(())
}

fn filter_condition(filter: &JobFilter) -> Condition {
    use job_entity::Column;

    let mut condition = Condition::all();
    if let Some(statuses) = &filter.statuses {
        condition = condition.add(Column::Status.is_in(statuses.iter().map(|s| s.as_str())));
    }
    if let Some(domain) = &filter.domain {
        condition = condition.add(Column::Domain.eq(domain.as_str()));
    }
    if let Some(after) = filter.created_after {
        condition = condition.add(Column::CreatedAt.gte(after));
    }
    if let Some(before) = filter.created_before {
        condition = condition.add(Column::CreatedAt.lte(before));
    }
    condition
}

async fn grouped_counts(
    db: &DatabaseConnection,
    column: job_entity::Column,
) -> Result<Vec<(Option<String>, i64)>, RepositoryError> {
    let rows = job_entity::Entity::find()
        .select_only()
        .column(column)
        .column_as(Expr::col(job_entity::Column::Id).count(), "count")
        .group_by(column)
        .into_tuple::<(Option<String>, i64)>()
        .all(db)
        .await?;
    Ok(rows)
}

#[async_trait]
impl JobRepository for JobRepositoryImpl {
    async fn save(&self, job: &Job) -> Result<(), RepositoryError> {
        upsert(self.db.as_ref(), job).await
    }

    async fn save_with_records(
        &self,
        job: &Job,
        records: &[ScrapedRecord],
    ) -> Result<(), RepositoryError> {
        let txn = self.db.begin().await?;

        upsert(&txn, job).await?;
        if !records.is_empty() {
            let models = records
                .iter()
                .map(record_active_model)
                .collect::<Result<Vec<_>, _>>()?;
            record_entity::Entity::insert_many(models)
                .exec_without_returning(&txn)
                .await?;
        }

        txn.commit().await?;
        Ok(())
    }

    async fn load(&self, id: Uuid) -> Result<Option<Job>, RepositoryError> {
        job_entity::Entity::find_by_id(id)
            .one(self.db.as_ref())
            .await?
            .map(Job::try_from)
            .transpose()
    }

    async fn list(&self, filter: &JobFilter, page: Pagination) -> Result<Page<Job>, RepositoryError> {
        let query = job_entity::Entity::find().filter(filter_condition(filter));
        let total = query.clone().count(self.db.as_ref()).await?;

        let items = query
            .order_by_desc(job_entity::Column::CreatedAt)
            .limit(page.limit)
            .offset(page.offset)
            .all(self.db.as_ref())
            .await?
            .into_iter()
            .map(Job::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Page {
            items,
            total,
            limit: page.limit,
            offset: page.offset,
        })
    }

    async fn statistics(&self, since: DateTime<Utc>) -> Result<JobStatistics, RepositoryError> {
        let db = self.db.as_ref();
        let mut stats = JobStatistics {
            total_jobs: job_entity::Entity::find().count(db).await?,
            recent_jobs: job_entity::Entity::find()
                .filter(job_entity::Column::CreatedAt.gte(since))
                .count(db)
                .await?,
            total_records: record_entity::Entity::find().count(db).await?,
            ..JobStatistics::default()
        };

        for (status, count) in grouped_counts(db, job_entity::Column::Status).await? {
            if let Some(status) = status {
                stats.status_counts.insert(status, count.max(0) as u64);
            }
        }
        for (method, count) in grouped_counts(db, job_entity::Column::ExecutedMethod).await? {
            if let Some(method) = method {
                stats.method_counts.insert(method, count.max(0) as u64);
            }
        }
        Ok(stats)
    }

    async fn delete(&self, id: Uuid) -> Result<bool, RepositoryError> {
        let txn = self.db.begin().await?;

        record_entity::Entity::delete_many()
            .filter(record_entity::Column::JobId.eq(id))
            .exec(&txn)
            .await?;
        let result = job_entity::Entity::delete_by_id(id).exec(&txn).await?;

        txn.commit().await?;
        Ok(result.rows_affected > 0)
    }

    async fn find_stale_running(&self, before: DateTime<Utc>) -> Result<Vec<Job>, RepositoryError> {
        job_entity::Entity::find()
            .filter(job_entity::Column::Status.eq(JobStatus::Running.as_str()))
            .filter(job_entity::Column::StartedAt.lt(before))
            .order_by_asc(job_entity::Column::StartedAt)
            .all(self.db.as_ref())
            .await?
            .into_iter()
            .map(Job::try_from)
            .collect()
    }

    async fn delete_finished_before(&self, before: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let txn = self.db.begin().await?;

        let ids: Vec<Uuid> = job_entity::Entity::find()
            .select_only()
            .column(job_entity::Column::Id)
            .filter(job_entity::Column::Status.is_in(TERMINAL_STATUSES.iter().map(|s| s.as_str())))
            .filter(job_entity::Column::FinishedAt.lt(before))
            .into_tuple::<Uuid>()
            .all(&txn)
            .await?;

        if ids.is_empty() {
            txn.commit().await?;
            return Ok(0);
        }

        record_entity::Entity::delete_many()
            .filter(record_entity::Column::JobId.is_in(ids.clone()))
            .exec(&txn)
            .await?;
        let result = job_entity::Entity::delete_many()
            .filter(job_entity::Column::Id.is_in(ids))
            .exec(&txn)
            .await?;

        txn.commit().await?;
        Ok(result.rows_affected)
    }
}
