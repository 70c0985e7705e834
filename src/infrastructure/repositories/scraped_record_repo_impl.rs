// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::scraped_record::ScrapedRecord;
use crate::domain::repositories::job_repository::RepositoryError;
use crate::domain::repositories::scraped_record_repository::ScrapedRecordRepository;
use crate::infrastructure::database::entities::scraped_record as record_entity;
use async_trait::async_trait;
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set,
};
use std::sync::Arc;
use uuid::Uuid;

/// 抽取记录仓库实现
#[derive(Clone)]
pub struct ScrapedRecordRepositoryImpl {
    db: Arc<DatabaseConnection>,
}

impl ScrapedRecordRepositoryImpl {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

impl TryFrom<record_entity::Model> for ScrapedRecord {
    type Error = RepositoryError;

    fn try_from(model: record_entity::Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: model.id,
            job_id: model.job_id,
            fields: serde_json::from_value(model.fields)?,
            source_url: model.source_url,
            final_url: model.final_url,
            status_code: model.status_code.clamp(0, u16::MAX as i32) as u16,
            title: model.title,
            analysis: serde_json::from_value(model.analysis)?,
            content_length: model.content_length.max(0) as usize,
            content_hash: model.content_hash,
            extracted_at: model.extracted_at,
        })
    }
}

pub(crate) fn to_active_model(record: &ScrapedRecord) -> Result<record_entity::ActiveModel, RepositoryError> {
    Ok(record_entity::ActiveModel {
        id: Set(record.id),
        job_id: Set(record.job_id),
        fields: Set(serde_json::to_value(&record.fields)?),
        source_url: Set(record.source_url.clone()),
        final_url: Set(record.final_url.clone()),
        status_code: Set(record.status_code as i32),
        title: Set(record.title.clone()),
        analysis: Set(serde_json::to_value(&record.analysis)?),
        content_length: Set(record.content_length as i64),
        content_hash: Set(record.content_hash.clone()),
        extracted_at: Set(record.extracted_at),
    })
}

#[async_trait]
impl ScrapedRecordRepository for ScrapedRecordRepositoryImpl {
    async fn save_records(
        &self,
        job_id: Uuid,
        records: &[ScrapedRecord],
    ) -> Result<(), RepositoryError> {
        if records.is_empty() {
            return Ok(());
        }
        let models = records
            .iter()
            .map(|record| {
                let mut model = to_active_model(record)?;
                model.job_id = Set(job_id);
                Ok(model)
            })
            .collect::<Result<Vec<_>, RepositoryError>>()?;

        record_entity::Entity::insert_many(models)
            .exec_without_returning(self.db.as_ref())
            .await?;
        Ok(())
    }

    async fn find_by_job(&self, job_id: Uuid) -> Result<Vec<ScrapedRecord>, RepositoryError> {
        record_entity::Entity::find()
            .filter(record_entity::Column::JobId.eq(job_id))
            .order_by_asc(record_entity::Column::ExtractedAt)
            .all(self.db.as_ref())
            .await?
            .into_iter()
            .map(ScrapedRecord::try_from)
            .collect()
    }

    async fn count(&self) -> Result<u64, RepositoryError> {
        Ok(record_entity::Entity::find().count(self.db.as_ref()).await?)
    }
}
