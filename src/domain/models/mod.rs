// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 领域模型模块
///
/// 定义任务、站点配置和抽取记录
pub mod job;
pub mod scraped_record;
pub mod website_config;
