// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use sea_orm::entity::prelude::*;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "jobs")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub url: String,
    #[sea_orm(indexed)]
    pub domain: String,
    pub method: Option<String>,
    pub selectors: Option<Json>,
    pub headers: Option<Json>,
    pub timeout_secs: Option<i64>,
    pub webhook_url: Option<String>,
    #[sea_orm(indexed)]
    pub status: String,
    pub executed_method: Option<String>,
    pub retry_count: i32,
    pub last_backoff_ms: Option<i64>,
    pub last_error: Option<Json>,
    pub record_count: i32,
    pub created_at: ChronoDateTimeUtc,
    pub started_at: Option<ChronoDateTimeUtc>,
    pub finished_at: Option<ChronoDateTimeUtc>,
    pub updated_at: ChronoDateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::scraped_record::Entity")]
    ScrapedRecord,
}

impl Related<super::scraped_record::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ScrapedRecord.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
