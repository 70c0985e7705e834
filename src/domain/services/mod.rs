// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 领域服务模块
///
/// 包含的服务：
/// - 配置解析（config_resolver）：按域名查找站点默认配置
/// - 抽取服务（extraction_service）：对文档应用命名选择器
/// - 限流服务（rate_limiting_service）：同域间隔与全局并发闸门
/// - 通知服务（webhook_service）：任务结束通知接口
pub mod config_resolver;
pub mod extraction_service;
pub mod rate_limiting_service;
pub mod webhook_service;
