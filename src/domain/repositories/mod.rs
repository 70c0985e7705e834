// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 仓库接口模块
///
/// 定义任务、抽取记录和站点配置的持久化契约
pub mod job_repository;
pub mod scraped_record_repository;
pub mod website_config_repository;
