// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::job::FetchMethod;
use crate::engines::traits::FetchEngine;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// 引擎路由器
///
/// 保存抓取方式到引擎实现的映射，选择逻辑由调用方决定
#[derive(Clone, Default)]
pub struct EngineRouter {
    engines: HashMap<FetchMethod, Arc<dyn FetchEngine>>,
}

impl EngineRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册引擎，同一方式重复注册时覆盖旧引擎
    ///
    /// # 参数
    ///
    /// * `method` - 引擎对应的抓取方式
    /// * `engine` - 引擎实现
    pub fn register(mut self, method: FetchMethod, engine: Arc<dyn FetchEngine>) -> Self {
        info!(%method, engine = engine.name(), "Registered fetch engine");
        self.engines.insert(method, engine);
        self
    }

    /// 获取某个抓取方式的引擎
    pub fn get(&self, method: FetchMethod) -> Option<Arc<dyn FetchEngine>> {
        self.engines.get(&method).cloned()
    }

    /// 已注册的抓取方式，按固定顺序返回
    pub fn methods(&self) -> Vec<FetchMethod> {
        FetchMethod::ALL
            .into_iter()
            .filter(|m| self.engines.contains_key(m))
            .collect()
    }
}
