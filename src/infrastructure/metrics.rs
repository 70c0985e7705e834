// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::config::settings::MetricsSettings;
use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::{Ipv4Addr, SocketAddr};
use tracing::{info, warn};

/// 初始化指标系统
///
/// 启用时安装 Prometheus 导出器并注册指标说明；未启用时指标调用为空操作
pub fn init_metrics(settings: &MetricsSettings) {
    if !settings.enabled {
        return;
    }

    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, settings.port));
    // Ignore error if address is already in use (for development/testing)
    if let Err(e) = PrometheusBuilder::new().with_http_listener(addr).install() {
        warn!("Failed to install Prometheus recorder: {}", e);
        return;
    }
    info!("Metrics exporter listening on {}", addr);

    describe_counter!("harvestrs_jobs_total", "Jobs created and finished, labelled by status");
    describe_counter!(
        "harvestrs_fetch_attempts_total",
        "Fetch attempts labelled by method and outcome"
    );
    describe_histogram!(
        "harvestrs_fetch_duration_seconds",
        "Duration of a single fetch attempt in seconds"
    );
    describe_histogram!(
        "harvestrs_limiter_wait_seconds",
        "Time spent waiting for a politeness permit"
    );
    describe_counter!(
        "harvestrs_webhook_deliveries_total",
        "Webhook deliveries labelled by outcome"
    );
    describe_gauge!("harvestrs_active_jobs", "Jobs currently executing in this process");
}
