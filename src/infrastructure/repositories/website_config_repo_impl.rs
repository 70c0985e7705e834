// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::job::FetchMethod;
use crate::domain::models::website_config::WebsiteConfig;
use crate::domain::repositories::job_repository::RepositoryError;
use crate::domain::repositories::website_config_repository::WebsiteConfigRepository;
use crate::infrastructure::database::entities::website_config as config_entity;
use async_trait::async_trait;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter,
    QueryOrder, Set, SqlErr,
};
use std::sync::Arc;

/// 站点配置仓库实现
#[derive(Clone)]
pub struct WebsiteConfigRepositoryImpl {
    db: Arc<DatabaseConnection>,
}

impl WebsiteConfigRepositoryImpl {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

impl TryFrom<config_entity::Model> for WebsiteConfig {
    type Error = RepositoryError;

    fn try_from(model: config_entity::Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: model.id,
            name: model.name,
            domain: model.domain,
            base_url: model.base_url,
            default_method: model
                .default_method
                .parse::<FetchMethod>()
                .map_err(|e| RepositoryError::Serialization(e.to_string()))?,
            default_selectors: serde_json::from_value(model.default_selectors)?,
            default_headers: serde_json::from_value(model.default_headers)?,
            rate_limit_delay_secs: model.rate_limit_delay_secs,
            requires_js: model.requires_js,
            respect_robots_txt: model.respect_robots_txt,
            wait_for_element: model.wait_for_element,
            page_load_timeout_secs: model.page_load_timeout_secs.map(|secs| secs.max(0) as u64),
            user_agent: model.user_agent,
            description: model.description,
            is_active: model.is_active,
            created_at: model.created_at,
            updated_at: model.updated_at,
        })
    }
}

fn to_active_model(config: &WebsiteConfig) -> Result<config_entity::ActiveModel, RepositoryError> {
    Ok(config_entity::ActiveModel {
        id: Set(config.id),
        name: Set(config.name.clone()),
        domain: Set(config.domain.clone()),
        base_url: Set(config.base_url.clone()),
        default_method: Set(config.default_method.as_str().to_string()),
        default_selectors: Set(serde_json::to_value(&config.default_selectors)?),
        default_headers: Set(serde_json::to_value(&config.default_headers)?),
        rate_limit_delay_secs: Set(config.rate_limit_delay_secs),
        requires_js: Set(config.requires_js),
        respect_robots_txt: Set(config.respect_robots_txt),
        wait_for_element: Set(config.wait_for_element.clone()),
        page_load_timeout_secs: Set(config.page_load_timeout_secs.map(|secs| secs as i64)),
        user_agent: Set(config.user_agent.clone()),
        description: Set(config.description.clone()),
        is_active: Set(config.is_active),
        created_at: Set(config.created_at),
        updated_at: Set(config.updated_at),
    })
}

fn map_unique_violation(err: DbErr, domain: &str) -> RepositoryError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(_)) => RepositoryError::AlreadyExists(domain.to_string()),
        _ => RepositoryError::Database(err),
    }
}

#[async_trait]
impl WebsiteConfigRepository for WebsiteConfigRepositoryImpl {
    async fn create(&self, config: &WebsiteConfig) -> Result<(), RepositoryError> {
        if self.load_by_domain(&config.domain).await?.is_some() {
            return Err(RepositoryError::AlreadyExists(config.domain.clone()));
        }

        to_active_model(config)?
            .insert(self.db.as_ref())
            .await
            .map_err(|e| map_unique_violation(e, &config.domain))?;
        Ok(())
    }

    async fn update(&self, config: &WebsiteConfig) -> Result<(), RepositoryError> {
        let result = config_entity::Entity::update_many()
            .set(to_active_model(config)?)
            .filter(config_entity::Column::Id.eq(config.id))
            .exec(self.db.as_ref())
            .await
            .map_err(|e| map_unique_violation(e, &config.domain))?;

        if result.rows_affected == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn load_by_domain(&self, domain: &str) -> Result<Option<WebsiteConfig>, RepositoryError> {
        config_entity::Entity::find()
            .filter(config_entity::Column::Domain.eq(domain))
            .one(self.db.as_ref())
            .await?
            .map(WebsiteConfig::try_from)
            .transpose()
    }

    async fn list(&self) -> Result<Vec<WebsiteConfig>, RepositoryError> {
        config_entity::Entity::find()
            .order_by_asc(config_entity::Column::Domain)
            .all(self.db.as_ref())
            .await?
            .into_iter()
            .map(WebsiteConfig::try_from)
            .collect()
    }
}
