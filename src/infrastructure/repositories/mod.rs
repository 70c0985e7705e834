// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 仓库实现模块
///
/// 基于SeaORM的数据库实现，以及 `memory://` 和测试使用的进程内实现
pub mod job_repo_impl;
pub mod memory;
pub mod scraped_record_repo_impl;
pub mod website_config_repo_impl;
