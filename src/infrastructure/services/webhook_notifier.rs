// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::config::settings::WebhookSettings;
use crate::domain::models::job::{Job, JobError, JobStatus};
use crate::domain::services::webhook_service::JobNotifier;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "X-Harvestrs-Signature";

/// 终态通知的负载
#[derive(Debug, Serialize)]
struct JobEvent<'a> {
    event: String,
    job_id: Uuid,
    url: &'a str,
    status: JobStatus,
    record_count: u32,
    retry_count: u32,
    error: Option<&'a JobError>,
    finished_at: Option<DateTime<Utc>>,
}

impl<'a> From<&'a Job> for JobEvent<'a> {
    fn from(job: &'a Job) -> Self {
        Self {
            event: format!("job.{}", job.status),
            job_id: job.id,
            url: &job.url,
            status: job.status,
            record_count: job.record_count,
            retry_count: job.retry_count,
            error: job.last_error.as_ref(),
            finished_at: job.finished_at,
        }
    }
}

/// Webhook 通知实现
///
/// 以 JSON 形式 POST 任务摘要，并附带对请求体的 HMAC-SHA256 签名
pub struct WebhookNotifier {
    /// HTTP 客户端
    client: reqwest::Client,
    /// 签名密钥
    secret: String,
}

impl WebhookNotifier {
    /// 创建新的 Webhook 通知实现
    pub fn new(settings: &WebhookSettings) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .unwrap_or_default();

        Self {
            client,
            secret: settings.secret.clone(),
        }
    }

    /// 为请求体生成签名
    ///
    /// # 返回值
    ///
    /// `sha256=<hex>` 形式的签名
    pub fn sign(&self, body: &[u8]) -> Result<String> {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|e| anyhow!("invalid webhook secret: {}", e))?;
        mac.update(body);
        Ok(format!("sha256={}", hex::encode(mac.finalize().into_bytes())))
    }
}

#[async_trait]
impl JobNotifier for WebhookNotifier {
    async fn notify(&self, job: &Job) -> Result<()> {
        let Some(webhook_url) = &job.webhook_url else {
            return Ok(());
        };

        let body = serde_json::to_vec(&JobEvent::from(job))?;
        let signature = self.sign(&body)?;

        let outcome = self
            .client
            .post(webhook_url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header(SIGNATURE_HEADER, signature)
            .body(body)
            .send()
            .await;

        let response = match outcome {
            Ok(response) => response,
            Err(e) => {
                metrics::counter!("harvestrs_webhook_deliveries_total", "outcome" => "error").increment(1);
                return Err(e.into());
            }
        };

        if response.status().is_success() {
            metrics::counter!("harvestrs_webhook_deliveries_total", "outcome" => "success").increment(1);
            debug!(job_id = %job.id, "Webhook delivered");
            Ok(())
        } else {
            metrics::counter!("harvestrs_webhook_deliveries_total", "outcome" => "rejected").increment(1);
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(anyhow!(
                "Webhook delivery failed with status {}: {}",
                status,
                body
            ))
        }
    }
}
