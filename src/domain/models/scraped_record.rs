// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use uuid::Uuid;

/// 单个字段的抽取结果
///
/// 区分单值、多值、无匹配和选择器错误四种情况
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    /// 恰好匹配一个节点
    Value(String),
    /// 匹配多个节点，按文档顺序排列
    List(Vec<String>),
    /// 选择器有效但没有匹配
    Empty,
    /// 选择器语法错误
    Error(String),
}

impl FieldValue {
    pub fn is_empty(&self) -> bool {
        matches!(self, FieldValue::Empty)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, FieldValue::Error(_))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Value(v) => Some(v.as_str()),
            _ => None,
        }
    }

    /// 导出为扁平表格单元格
    pub fn to_cell(&self) -> String {
        match self {
            FieldValue::Value(v) => v.clone(),
            FieldValue::List(values) => values.join(" | "),
            FieldValue::Empty => String::new(),
            FieldValue::Error(message) => format!("ERROR: {}", message),
        }
    }
}

/// 字段名到抽取结果的映射
pub type ExtractedFields = BTreeMap<String, FieldValue>;

/// 页面内容分析
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentAnalysis {
    pub meta_description: Option<String>,
    pub meta_keywords: Vec<String>,
    /// 主体内容的单词数
    pub word_count: usize,
    pub image_count: usize,
    pub link_count: usize,
    pub main_content_length: usize,
}

/// 一次抽取产生的记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrapedRecord {
    pub id: Uuid,
    /// 所属任务
    pub job_id: Uuid,
    pub fields: ExtractedFields,
    pub source_url: String,
    /// 重定向后的最终URL
    pub final_url: String,
    pub status_code: u16,
    pub title: Option<String>,
    pub analysis: ContentAnalysis,
    /// 原始内容字节数
    pub content_length: usize,
    /// 原始内容的 SHA-256 十六进制摘要
    pub content_hash: String,
    pub extracted_at: DateTime<Utc>,
}

/// 计算内容摘要
pub fn content_hash(content: &str) -> String {
    hex::encode(Sha256::digest(content.as_bytes()))
}
