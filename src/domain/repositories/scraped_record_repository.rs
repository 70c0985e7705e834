// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::scraped_record::ScrapedRecord;
use crate::domain::repositories::job_repository::RepositoryError;
use async_trait::async_trait;
use uuid::Uuid;

/// 抽取记录仓库特质
#[async_trait]
pub trait ScrapedRecordRepository: Send + Sync {
    /// 保存属于某个任务的记录
    async fn save_records(
        &self,
        job_id: Uuid,
        records: &[ScrapedRecord],
    ) -> Result<(), RepositoryError>;
    /// 按抽取时间顺序返回任务的记录
    async fn find_by_job(&self, job_id: Uuid) -> Result<Vec<ScrapedRecord>, RepositoryError>;
    /// 记录总数
    async fn count(&self) -> Result<u64, RepositoryError>;
}
