// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::scraped_record::ScrapedRecord;
use crate::utils::errors::ServiceError;
use std::collections::BTreeSet;

const FIXED_COLUMNS: [&str; 4] = ["record_id", "source_url", "extracted_at", "content_hash"];

/// 导出为扁平 CSV 表格
///
/// 固定列之后每个字段名一列，按名称排序；某条记录缺少的字段留空
pub fn records_to_csv(records: &[ScrapedRecord]) -> Result<String, ServiceError> {
    let field_names: BTreeSet<&str> = records
        .iter()
        .flat_map(|r| r.fields.keys().map(String::as_str))
        .collect();

    let mut writer = csv::Writer::from_writer(Vec::new());
    let header = FIXED_COLUMNS
        .iter()
        .copied()
        .chain(field_names.iter().copied());
    writer.write_record(header).map_err(csv_error)?;

    for record in records {
        let mut row = vec![
            record.id.to_string(),
            record.source_url.clone(),
            record.extracted_at.to_rfc3339(),
            record.content_hash.clone(),
        ];
        row.extend(
            field_names
                .iter()
                .map(|name| record.fields.get(*name).map(|v| v.to_cell()).unwrap_or_default()),
        );
        writer.write_record(&row).map_err(csv_error)?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| ServiceError::Internal(format!("csv export failed: {}", e)))?;
    String::from_utf8(bytes).map_err(|e| ServiceError::Internal(format!("csv export failed: {}", e)))
}

fn csv_error(err: csv::Error) -> ServiceError {
    ServiceError::Internal(format!("csv export failed: {}", err))
}
