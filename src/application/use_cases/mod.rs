// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 用例模块
///
/// 任务编排、站点配置管理、工具类操作以及它们共用的抓取管道
pub mod job_orchestrator;
pub mod record_export;
pub mod scrape_pipeline;
pub mod utility_use_case;
pub mod website_config_use_case;
