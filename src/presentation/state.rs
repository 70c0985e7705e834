// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::application::use_cases::job_orchestrator::JobOrchestrator;
use crate::application::use_cases::utility_use_case::UtilityUseCase;
use crate::application::use_cases::website_config_use_case::WebsiteConfigUseCase;
use std::sync::Arc;

/// 路由共享状态
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<JobOrchestrator>,
    pub configs: Arc<WebsiteConfigUseCase>,
    pub utilities: Arc<UtilityUseCase>,
}
