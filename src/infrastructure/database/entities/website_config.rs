// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use sea_orm::entity::prelude::*;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "website_configs")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub name: String,
    #[sea_orm(unique)]
    pub domain: String,
    pub base_url: String,
    pub default_method: String,
    pub default_selectors: Json,
    pub default_headers: Json,
    pub rate_limit_delay_secs: Option<f64>,
    pub requires_js: bool,
    pub respect_robots_txt: bool,
    pub wait_for_element: Option<String>,
    pub page_load_timeout_secs: Option<i64>,
    pub user_agent: Option<String>,
    pub description: Option<String>,
    pub is_active: bool,
    pub created_at: ChronoDateTimeUtc,
    pub updated_at: ChronoDateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
