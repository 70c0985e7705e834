// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::job::{Job, JobStatus};
use crate::domain::models::scraped_record::ScrapedRecord;
use crate::domain::models::website_config::WebsiteConfig;
use crate::domain::repositories::job_repository::{
    JobFilter, JobRepository, JobStatistics, Page, Pagination, RepositoryError,
};
use crate::domain::repositories::scraped_record_repository::ScrapedRecordRepository;
use crate::domain::repositories::website_config_repository::WebsiteConfigRepository;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use uuid::Uuid;

/// 进程内抽取记录仓库
///
/// 克隆共享同一份数据
#[derive(Clone, Default)]
pub struct MemoryScrapedRecordRepository {
    records: Arc<DashMap<Uuid, Vec<ScrapedRecord>>>,
}

impl MemoryScrapedRecordRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn remove_job(&self, job_id: Uuid) {
        self.records.remove(&job_id);
    }

    fn append(&self, job_id: Uuid, records: &[ScrapedRecord]) {
        if records.is_empty() {
            return;
        }
        self.records
            .entry(job_id)
            .or_default()
            .extend(records.iter().cloned().map(|mut record| {
                record.job_id = job_id;
                record
            }));
    }

    fn total(&self) -> u64 {
        self.records.iter().map(|entry| entry.value().len() as u64).sum()
    }
}

#[async_trait]
impl ScrapedRecordRepository for MemoryScrapedRecordRepository {
    async fn save_records(
        &self,
        job_id: Uuid,
        records: &[ScrapedRecord],
    ) -> Result<(), RepositoryError> {
        self.append(job_id, records);
        Ok(())
    }

    async fn find_by_job(&self, job_id: Uuid) -> Result<Vec<ScrapedRecord>, RepositoryError> {
        let mut records = self
            .records
            .get(&job_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default();
        records.sort_by_key(|record| record.extracted_at);
        Ok(records)
    }

    async fn count(&self) -> Result<u64, RepositoryError> {
        Ok(self.total())
    }
}

/// 进程内任务仓库
///
/// 与 `record_repository()` 返回的记录仓库共享记录数据，删除任务时一并删除记录
#[derive(Clone, Default)]
pub struct MemoryJobRepository {
    jobs: Arc<DashMap<Uuid, Job>>,
    records: MemoryScrapedRecordRepository,
}

impl MemoryJobRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// 与本仓库共享数据的记录仓库
    pub fn record_repository(&self) -> MemoryScrapedRecordRepository {
        self.records.clone()
    }

    fn snapshot(&self) -> Vec<Job> {
        self.jobs.iter().map(|entry| entry.value().clone()).collect()
    }
}

#[async_trait]
impl JobRepository for MemoryJobRepository {
    async fn save(&self, job: &Job) -> Result<(), RepositoryError> {
        self.jobs.insert(job.id, job.clone());
        Ok(())
    }

    async fn save_with_records(
        &self,
        job: &Job,
        records: &[ScrapedRecord],
    ) -> Result<(), RepositoryError> {
        self.records.append(job.id, records);
        self.jobs.insert(job.id, job.clone());
        Ok(())
    }

    async fn load(&self, id: Uuid) -> Result<Option<Job>, RepositoryError> {
        Ok(self.jobs.get(&id).map(|entry| entry.value().clone()))
    }

    async fn list(&self, filter: &JobFilter, page: Pagination) -> Result<Page<Job>, RepositoryError> {
        let mut matching: Vec<Job> = self
            .snapshot()
            .into_iter()
            .filter(|job| filter.matches(job))
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = matching.len() as u64;
        let items = matching
            .into_iter()
            .skip(page.offset as usize)
            .take(page.limit as usize)
            .collect();

        Ok(Page {
            items,
            total,
            limit: page.limit,
            offset: page.offset,
        })
    }

    async fn statistics(&self, since: DateTime<Utc>) -> Result<JobStatistics, RepositoryError> {
        let jobs = self.snapshot();
        let mut stats = JobStatistics {
            total_jobs: jobs.len() as u64,
            total_records: self.records.total(),
            ..JobStatistics::default()
        };

        for job in &jobs {
            *stats
                .status_counts
                .entry(job.status.as_str().to_string())
                .or_default() += 1;
            if let Some(method) = job.executed_method {
                *stats
                    .method_counts
                    .entry(method.as_str().to_string())
                    .or_default() += 1;
            }
            if job.created_at >= since {
                stats.recent_jobs += 1;
            }
        }
        Ok(stats)
    }

    async fn delete(&self, id: Uuid) -> Result<bool, RepositoryError> {
        self.records.remove_job(id);
        Ok(self.jobs.remove(&id).is_some())
    }

    async fn find_stale_running(&self, before: DateTime<Utc>) -> Result<Vec<Job>, RepositoryError> {
        let mut stale: Vec<Job> = self
            .snapshot()
            .into_iter()
            .filter(|job| job.status == JobStatus::Running)
            .filter(|job| job.started_at.is_some_and(|started| started < before))
            .collect();
        stale.sort_by_key(|job| job.started_at);
        Ok(stale)
    }

    async fn delete_finished_before(&self, before: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let expired: Vec<Uuid> = self
            .snapshot()
            .into_iter()
            .filter(|job| job.is_terminal())
            .filter(|job| job.finished_at.is_some_and(|finished| finished < before))
            .map(|job| job.id)
            .collect();

        for id in &expired {
            self.records.remove_job(*id);
            self.jobs.remove(id);
        }
        Ok(expired.len() as u64)
    }
}

/// 进程内站点配置仓库
#[derive(Clone, Default)]
pub struct MemoryWebsiteConfigRepository {
    configs: Arc<DashMap<String, WebsiteConfig>>,
}

impl MemoryWebsiteConfigRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WebsiteConfigRepository for MemoryWebsiteConfigRepository {
    async fn create(&self, config: &WebsiteConfig) -> Result<(), RepositoryError> {
        match self.configs.entry(config.domain.clone()) {
            Entry::Occupied(_) => Err(RepositoryError::AlreadyExists(config.domain.clone())),
            Entry::Vacant(slot) => {
                slot.insert(config.clone());
                Ok(())
            }
        }
    }

    async fn update(&self, config: &WebsiteConfig) -> Result<(), RepositoryError> {
        let existing = self
            .configs
            .iter()
            .find(|entry| entry.value().id == config.id)
            .map(|entry| entry.key().clone())
            .ok_or(RepositoryError::NotFound)?;

        if existing != config.domain {
            if self.configs.contains_key(&config.domain) {
                return Err(RepositoryError::AlreadyExists(config.domain.clone()));
            }
            self.configs.remove(&existing);
        }
        self.configs.insert(config.domain.clone(), config.clone());
        Ok(())
    }

    async fn load_by_domain(&self, domain: &str) -> Result<Option<WebsiteConfig>, RepositoryError> {
        Ok(self.configs.get(domain).map(|entry| entry.value().clone()))
    }

    async fn list(&self) -> Result<Vec<WebsiteConfig>, RepositoryError> {
        let mut configs: Vec<WebsiteConfig> =
            self.configs.iter().map(|entry| entry.value().clone()).collect();
        configs.sort_by(|a, b| a.domain.cmp(&b.domain));
        Ok(configs)
    }
}
