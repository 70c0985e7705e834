// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::job::SelectorMap;
use crate::domain::models::scraped_record::{ContentAnalysis, ExtractedFields, FieldValue};
use crate::utils::url_utils::{is_followable_href, resolve_url, same_host};
use scraper::{ElementRef, Html, Selector};
use serde::Serialize;
use std::collections::HashSet;
use thiserror::Error;
use url::Url;

/// 选择器语法错误，指明出错的字段
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[error("invalid selector for field '{field}': {message}")]
pub struct SelectorError {
    pub field: String,
    pub message: String,
}

/// 一次抽取的结果
///
/// 每个字段都有对应的结果，语法错误的字段同时出现在 `errors` 中
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extraction {
    pub fields: ExtractedFields,
    pub errors: Vec<SelectorError>,
}

/// 页面概览信息
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageSummary {
    pub title: Option<String>,
    pub analysis: ContentAnalysis,
}

/// 解析后的选择器规则：CSS 表达式加可选的属性名
#[derive(Debug, Clone, PartialEq, Eq)]
struct SelectorRule<'a> {
    css: &'a str,
    attr: Option<&'a str>,
}

// Candidate containers for the main content, tried in order.
const CONTENT_SELECTORS: [&str; 7] = [
    "article",
    "main",
    ".content",
    "#content",
    ".post-content",
    ".entry-content",
    ".article-content",
];

const NON_CONTENT_TAGS: [&str; 5] = ["script", "style", "nav", "header", "footer"];

/// 抽取器
///
/// 对抓取到的文档应用命名选择器，产出字段到值的扁平映射
pub struct Extractor;

impl Extractor {
    /// 按选择器映射抽取字段
    ///
    /// # 参数
    ///
    /// * `html` - 文档内容
    /// * `selectors` - 字段名到选择器表达式的映射，`img@src` 形式表示取属性
    ///
    /// # 返回值
    ///
    /// 每个字段一个结果：单个匹配为字符串，多个匹配为有序列表，
    /// 无匹配为 Empty，语法错误为 Error 且不影响其它字段
    pub fn extract(html: &str, selectors: &SelectorMap) -> Extraction {
        let document = Html::parse_document(html);
        let mut extraction = Extraction::default();

        for (field, expression) in selectors {
            let rule = split_attribute(expression);
            let selector = match Selector::parse(rule.css) {
                Ok(selector) => selector,
                Err(e) => {
                    let message = e.to_string();
                    extraction
                        .fields
                        .insert(field.clone(), FieldValue::Error(message.clone()));
                    extraction.errors.push(SelectorError {
                        field: field.clone(),
                        message,
                    });
                    continue;
                }
            };

            let mut values: Vec<String> = document
                .select(&selector)
                .filter_map(|element| node_value(element, rule.attr))
                .collect();

            let value = match values.len() {
                0 => FieldValue::Empty,
                1 => FieldValue::Value(values.remove(0)),
                _ => FieldValue::List(values),
            };
            extraction.fields.insert(field.clone(), value);
        }

        extraction
    }

    /// 分析页面标题、元信息和主体内容
    pub fn summarize(html: &str) -> PageSummary {
        let document = Html::parse_document(html);

        let title = first_text(&document, "title").filter(|t| !t.is_empty());
        let meta_description = first_attr(&document, r#"meta[name="description"]"#, "content")
            .filter(|d| !d.is_empty());
        let meta_keywords = first_attr(&document, r#"meta[name="keywords"]"#, "content")
            .map(|k| {
                k.split(',')
                    .map(|kw| kw.trim().to_string())
                    .filter(|kw| !kw.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let main_content = main_content(&document);

        PageSummary {
            title,
            analysis: ContentAnalysis {
                meta_description,
                meta_keywords,
                word_count: main_content.split_whitespace().count(),
                image_count: count(&document, "img"),
                link_count: count(&document, "a[href]"),
                main_content_length: main_content.chars().count(),
            },
        }
    }

    /// 抽取页面链接
    ///
    /// 跳过锚点和伪协议链接，按文档顺序去重，可限制为同主机链接
    pub fn links(html: &str, base: &Url, internal_only: bool, limit: usize) -> Vec<String> {
        let document = Html::parse_document(html);
        let Ok(selector) = Selector::parse("a[href]") else {
            return Vec::new();
        };

        let mut seen = HashSet::new();
        document
            .select(&selector)
            .filter_map(|a| a.value().attr("href"))
            .filter(|href| is_followable_href(href))
            .filter_map(|href| resolve_url(base, href).ok())
            .filter(|url| matches!(url.scheme(), "http" | "https"))
            .filter(|url| !internal_only || same_host(base, url))
            .map(|mut url| {
                url.set_fragment(None);
                url.to_string()
            })
            .filter(|url| seen.insert(url.clone()))
            .take(limit)
            .collect()
    }

    /// 抽取页面图片地址
    pub fn images(html: &str, base: &Url, limit: usize) -> Vec<String> {
        let document = Html::parse_document(html);
        let Ok(selector) = Selector::parse("img[src]") else {
            return Vec::new();
        };

        let mut seen = HashSet::new();
        document
            .select(&selector)
            .filter_map(|img| img.value().attr("src"))
            .filter(|src| !src.trim().is_empty())
            .filter_map(|src| resolve_url(base, src).ok())
            .map(|url| url.to_string())
            .filter(|url| seen.insert(url.clone()))
            .take(limit)
            .collect()
    }
}

/// 拆分 `css@attr` 形式的表达式
///
/// 只识别方括号和引号之外的最后一个 `@`，且其后必须是合法的属性名
fn split_attribute(expression: &str) -> SelectorRule<'_> {
    let expression = expression.trim();
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    let mut split_at = None;

    for (i, c) in expression.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"') | (None, '\'') => quote = Some(c),
            (None, '[') => depth += 1,
            (None, ']') => depth -= 1,
            (None, '@') if depth == 0 => split_at = Some(i),
            _ => {}
        }
    }

    if let Some(i) = split_at {
        let attr = &expression[i + 1..];
        let valid = !attr.is_empty()
            && attr
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | ':'));
        if valid {
            return SelectorRule {
                css: expression[..i].trim_end(),
                attr: Some(attr),
            };
        }
    }

    SelectorRule {
        css: expression,
        attr: None,
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn element_text(element: ElementRef<'_>) -> String {
    collapse_whitespace(&element.text().collect::<Vec<_>>().join(" "))
}

/// 节点值：显式属性优先；`meta` 取 content，`img` 取 src；其余取文本
fn node_value(element: ElementRef<'_>, attr: Option<&str>) -> Option<String> {
    let implicit = match element.value().name() {
        "meta" => Some("content"),
        "img" => Some("src"),
        _ => None,
    };

    match attr.or(implicit) {
        Some(name) => element.value().attr(name).map(|v| v.trim().to_string()),
        None => Some(element_text(element)),
    }
}

fn count(document: &Html, css: &str) -> usize {
    Selector::parse(css)
        .map(|s| document.select(&s).count())
        .unwrap_or(0)
}

fn first_text(document: &Html, css: &str) -> Option<String> {
    let selector = Selector::parse(css).ok()?;
    document.select(&selector).next().map(element_text)
}

fn first_attr(document: &Html, css: &str, attr: &str) -> Option<String> {
    let selector = Selector::parse(css).ok()?;
    document
        .select(&selector)
        .next()
        .and_then(|e| e.value().attr(attr))
        .map(|v| v.trim().to_string())
}

/// 主体内容：优先常见内容容器，否则取去掉脚本和导航的 body 文本
fn main_content(document: &Html) -> String {
    for css in CONTENT_SELECTORS {
        if let Some(text) = first_text(document, css) {
            return text;
        }
    }

    let Ok(body_selector) = Selector::parse("body") else {
        return String::new();
    };
    let Some(body) = document.select(&body_selector).next() else {
        return String::new();
    };

    let mut parts = Vec::new();
    for node in body.descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let excluded = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .map(|e| NON_CONTENT_TAGS.contains(&e.name()))
                .unwrap_or(false)
        });
        if !excluded {
            parts.push(&**text);
        }
    }

    collapse_whitespace(&parts.join(" "))
}

#[cfg(test)]
#[path = "extraction_service_test.rs"]
mod tests;
