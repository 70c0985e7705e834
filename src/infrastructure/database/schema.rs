// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::infrastructure::database::entities::{job, scraped_record, website_config};
use sea_orm::{ConnectionTrait, DatabaseConnection, DbErr, EntityTrait, Schema};
use tracing::info;

/// 根据实体定义建表，已存在的表和索引保持不变
///
/// # 参数
///
/// * `db` - 数据库连接
pub async fn ensure_schema(db: &DatabaseConnection) -> Result<(), DbErr> {
    create_table(db, job::Entity).await?;
    create_table(db, scraped_record::Entity).await?;
    create_table(db, website_config::Entity).await?;
    info!("Database schema ready");
    Ok(())
}

async fn create_table<E>(db: &DatabaseConnection, entity: E) -> Result<(), DbErr>
where
    E: EntityTrait + Copy,
{
    let backend = db.get_database_backend();
    let schema = Schema::new(backend);

    let mut table = schema.create_table_from_entity(entity);
    table.if_not_exists();
    db.execute(backend.build(&table)).await?;

    for mut index in schema.create_index_from_entity(entity) {
        index.if_not_exists();
        db.execute(backend.build(&index)).await?;
    }
    Ok(())
}
