// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use harvestrs::application::use_cases::job_orchestrator::{JobOrchestrator, OrchestratorDeps};
use harvestrs::application::use_cases::scrape_pipeline::{PipelineSettings, ScrapePipeline};
use harvestrs::application::use_cases::utility_use_case::UtilityUseCase;
use harvestrs::application::use_cases::website_config_use_case::WebsiteConfigUseCase;
use harvestrs::config::settings::FetchSettings;
use harvestrs::domain::models::job::{FetchMethod, Job, JobStatus};
use harvestrs::domain::models::website_config::WebsiteConfig;
use harvestrs::domain::repositories::job_repository::JobRepository;
use harvestrs::domain::repositories::website_config_repository::WebsiteConfigRepository;
use harvestrs::domain::services::config_resolver::ConfigResolver;
use harvestrs::domain::services::rate_limiting_service::PolitenessGate;
use harvestrs::domain::services::webhook_service::NoopNotifier;
use harvestrs::engines::reqwest_engine::ReqwestEngine;
use harvestrs::engines::router::EngineRouter;
use harvestrs::engines::traits::{FetchEngine, FetchError, FetchRequest, FetchResult};
use harvestrs::infrastructure::repositories::memory::{
    MemoryJobRepository, MemoryWebsiteConfigRepository,
};
use harvestrs::presentation::state::AppState;
use harvestrs::queue::job_queue::InMemoryJobQueue;
use harvestrs::utils::retry_policy::RetryPolicy;
use parking_lot::Mutex;
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use uuid::Uuid;

pub const PRODUCT_PAGE: &str = r#"<html>
<head>
  <title>Widget</title>
  <meta name="description" content="A fine widget">
</head>
<body>
  <h1 class="name">Widget</h1>
  <span class="price">19.99</span>
  <ul><li class="tag">blue</li><li class="tag">small</li></ul>
  <a href="/about">About</a>
  <img src="/widget.png">
</body>
</html>"#;

/// 按脚本依次返回结果的引擎，脚本用完后返回商品页
pub struct ScriptedEngine {
    script: Mutex<VecDeque<Result<FetchResult, FetchError>>>,
    calls: AtomicU32,
    requests: Mutex<Vec<FetchRequest>>,
}

impl ScriptedEngine {
    pub fn new(script: Vec<Result<FetchResult, FetchError>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            calls: AtomicU32::new(0),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn succeeding() -> Arc<Self> {
        Self::new(Vec::new())
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<FetchRequest> {
        self.requests.lock().last().cloned()
    }
}

#[async_trait]
impl FetchEngine for ScriptedEngine {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResult, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().push(request.clone());
        self.script
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(page(&request.url, PRODUCT_PAGE)))
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// 一直挂起直到被取消的引擎
pub struct HangingEngine {
    pub started: Notify,
}

impl HangingEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            started: Notify::new(),
        })
    }
}

#[async_trait]
impl FetchEngine for HangingEngine {
    async fn fetch(&self, _request: &FetchRequest) -> Result<FetchResult, FetchError> {
        self.started.notify_one();
        futures::future::pending().await
    }

    fn name(&self) -> &'static str {
        "hanging"
    }
}

pub fn page(url: &str, html: &str) -> FetchResult {
    FetchResult {
        html: html.to_string(),
        final_url: url.to_string(),
        status: 200,
        headers: BTreeMap::new(),
        elapsed: Duration::from_millis(3),
    }
}

pub fn fast_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        initial_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(2),
        backoff_multiplier: 1.0,
        jitter_factor: 0.0,
        enable_jitter: false,
    }
}

/// 组装好的测试环境，全部使用内存实现
pub struct TestHarness {
    pub orchestrator: Arc<JobOrchestrator>,
    pub jobs: Arc<MemoryJobRepository>,
    pub configs: Arc<MemoryWebsiteConfigRepository>,
    pub queue: Arc<InMemoryJobQueue>,
    pub gate: Arc<PolitenessGate>,
    pub pipeline: Arc<ScrapePipeline>,
}

impl TestHarness {
    pub fn new(router: EngineRouter) -> Self {
        Self::with_retry(router, fast_retry(3))
    }

    pub fn with_engine(engine: Arc<dyn FetchEngine>) -> Self {
        Self::new(EngineRouter::new().register(FetchMethod::Requests, engine))
    }

    pub fn with_retry(router: EngineRouter, retry: RetryPolicy) -> Self {
        let jobs = Arc::new(MemoryJobRepository::new());
        let records = Arc::new(jobs.record_repository());
        let configs = Arc::new(MemoryWebsiteConfigRepository::new());
        let queue = Arc::new(InMemoryJobQueue::new());
        let gate = Arc::new(PolitenessGate::new(4, Duration::from_millis(1)));
        let pipeline = Arc::new(ScrapePipeline::new(
            router,
            gate.clone(),
            retry,
            PipelineSettings::default(),
        ));

        let orchestrator = Arc::new(JobOrchestrator::new(
            OrchestratorDeps {
                jobs: jobs.clone(),
                records,
                resolver: ConfigResolver::new(configs.clone()),
                pipeline: pipeline.clone(),
                queue: queue.clone(),
                notifier: Arc::new(NoopNotifier),
            },
            Duration::from_secs(5),
        ));

        Self {
            orchestrator,
            jobs,
            configs,
            queue,
            gate,
            pipeline,
        }
    }

    pub async fn add_config(&self, config: WebsiteConfig) {
        self.configs.create(&config).await.unwrap();
    }

    pub async fn job(&self, id: Uuid) -> Job {
        self.jobs.load(id).await.unwrap().unwrap()
    }

    /// 轮询直到任务进入指定状态
    pub async fn wait_for_status(&self, id: Uuid, status: JobStatus) -> Job {
        for _ in 0..200 {
            let job = self.job(id).await;
            if job.status == status {
                return job;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {} never reached {}", id, status);
    }

    pub fn app_state(&self) -> AppState {
        let probe = Arc::new(ReqwestEngine::new(&FetchSettings::default()).unwrap());
        AppState {
            orchestrator: self.orchestrator.clone(),
            configs: Arc::new(WebsiteConfigUseCase::new(
                self.configs.clone(),
                self.pipeline.clone(),
            )),
            utilities: Arc::new(UtilityUseCase::new(
                self.pipeline.clone(),
                ConfigResolver::new(self.configs.clone()),
                probe,
            )),
        }
    }
}
