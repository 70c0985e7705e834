// Copyright 2025 Kirky.X
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use harvestrs::application::use_cases::job_orchestrator::{JobOrchestrator, OrchestratorDeps};
use harvestrs::application::use_cases::scrape_pipeline::{PipelineSettings, ScrapePipeline};
use harvestrs::application::use_cases::utility_use_case::UtilityUseCase;
use harvestrs::application::use_cases::website_config_use_case::WebsiteConfigUseCase;
use harvestrs::config::settings::Settings;
use harvestrs::domain::models::job::FetchMethod;
use harvestrs::domain::repositories::job_repository::JobRepository;
use harvestrs::domain::repositories::scraped_record_repository::ScrapedRecordRepository;
use harvestrs::domain::repositories::website_config_repository::WebsiteConfigRepository;
use harvestrs::domain::services::config_resolver::ConfigResolver;
use harvestrs::domain::services::rate_limiting_service::PolitenessGate;
use harvestrs::engines::playwright_engine::PlaywrightEngine;
use harvestrs::engines::reqwest_engine::ReqwestEngine;
use harvestrs::engines::router::EngineRouter;
use harvestrs::engines::selenium_engine::SeleniumEngine;
use harvestrs::infrastructure::database::{connection, schema};
use harvestrs::infrastructure::metrics;
use harvestrs::infrastructure::repositories::job_repo_impl::JobRepositoryImpl;
use harvestrs::infrastructure::repositories::memory::{MemoryJobRepository, MemoryWebsiteConfigRepository};
use harvestrs::infrastructure::repositories::scraped_record_repo_impl::ScrapedRecordRepositoryImpl;
use harvestrs::infrastructure::repositories::website_config_repo_impl::WebsiteConfigRepositoryImpl;
use harvestrs::infrastructure::services::webhook_notifier::WebhookNotifier;
use harvestrs::presentation::routes;
use harvestrs::presentation::state::AppState;
use harvestrs::queue::job_queue::InMemoryJobQueue;
use harvestrs::utils::retry_policy::RetryPolicy;
use harvestrs::utils::robots::RobotsChecker;
use harvestrs::utils::telemetry;
use harvestrs::workers::maintenance_worker::MaintenanceWorker;
use harvestrs::workers::manager::WorkerManager;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

type Repositories = (
    Arc<dyn JobRepository>,
    Arc<dyn ScrapedRecordRepository>,
    Arc<dyn WebsiteConfigRepository>,
);

async fn build_repositories(settings: &Settings) -> anyhow::Result<Repositories> {
    if settings.database.is_in_memory_store() {
        info!("Using in-process storage");
        let jobs = MemoryJobRepository::new();
        let records: Arc<dyn ScrapedRecordRepository> = Arc::new(jobs.record_repository());
        let jobs: Arc<dyn JobRepository> = Arc::new(jobs);
        let configs: Arc<dyn WebsiteConfigRepository> = Arc::new(MemoryWebsiteConfigRepository::new());
        return Ok((jobs, records, configs));
    }

    let db = Arc::new(connection::create_pool(&settings.database).await?);
    info!("Database connection established");
    schema::ensure_schema(&db).await?;

    let jobs: Arc<dyn JobRepository> = Arc::new(JobRepositoryImpl::new(db.clone()));
    let records: Arc<dyn ScrapedRecordRepository> = Arc::new(ScrapedRecordRepositoryImpl::new(db.clone()));
    let configs: Arc<dyn WebsiteConfigRepository> = Arc::new(WebsiteConfigRepositoryImpl::new(db));
    Ok((jobs, records, configs))
}

async fn shutdown_signal(shutdown: CancellationToken) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(err) => error!("Unable to listen for shutdown signal: {}", err),
    }
    shutdown.cancel();
}

/// 主函数
///
/// 应用程序入口点，负责初始化所有组件并启动服务
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Initialize logging
    telemetry::init_telemetry();
    info!("Starting harvestrs...");

    // 2. Load configuration
    let settings = Settings::new()?;
    info!("Configuration loaded");

    metrics::init_metrics(&settings.metrics);

    // 3. Storage
    let (jobs, records, configs) = build_repositories(&settings).await?;

    // 4. Fetch engines and the shared politeness gate
    let user_agent = settings.fetch.user_agent.clone();
    let http = Arc::new(ReqwestEngine::new(&settings.fetch)?);
    let router = EngineRouter::new()
        .register(FetchMethod::Requests, http.clone())
        .register(
            FetchMethod::Selenium,
            Arc::new(SeleniumEngine::new(settings.browser.clone(), user_agent.clone())),
        )
        .register(
            FetchMethod::Playwright,
            Arc::new(PlaywrightEngine::new(settings.browser.clone(), user_agent)),
        );

    let gate = Arc::new(PolitenessGate::new(
        settings.rate_limiting.max_concurrent_fetches,
        settings.rate_limiting.default_domain_delay(),
    ));
    let robots = Arc::new(RobotsChecker::new(
        settings.robots.user_agent.clone(),
        Duration::from_secs(settings.robots.cache_ttl_secs),
    ));
    let pipeline = Arc::new(
        ScrapePipeline::new(
            router,
            gate,
            RetryPolicy::from(&settings.retry),
            PipelineSettings::from(&settings),
        )
        .with_robots(robots),
    );

    // 5. Use cases
    let resolver = ConfigResolver::new(configs.clone());
    let queue = Arc::new(InMemoryJobQueue::new());
    let orchestrator = Arc::new(JobOrchestrator::new(
        OrchestratorDeps {
            jobs,
            records,
            resolver: resolver.clone(),
            pipeline: pipeline.clone(),
            queue: queue.clone(),
            notifier: Arc::new(WebhookNotifier::new(&settings.webhook)),
        },
        settings.execution.sync_timeout(),
    ));
    let state = AppState {
        orchestrator: orchestrator.clone(),
        configs: Arc::new(WebsiteConfigUseCase::new(configs, pipeline.clone())),
        utilities: Arc::new(UtilityUseCase::new(pipeline, resolver, http)),
    };

    // 6. Start workers
    let shutdown = CancellationToken::new();
    let mut workers = WorkerManager::new(shutdown.clone());
    workers.start_scrape_workers(settings.execution.worker_count, orchestrator.clone(), queue.clone());
    workers.spawn(Arc::new(MaintenanceWorker::new(orchestrator, &settings.execution)));

    // 7. Start HTTP server
    let app = routes::build_router(state);
    let addr = format!("{}:{}", settings.server.host, settings.server.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("Server listening on {}", addr);

    let server_shutdown = shutdown.clone();
    tokio::spawn(shutdown_signal(shutdown.clone()));
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { server_shutdown.cancelled().await })
        .await?;

    workers.shutdown(settings.execution.sync_timeout()).await;
    queue.close().await;

    Ok(())
}
