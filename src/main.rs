use anyhow::Context;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::time::Duration;
use tracing_subscriber::EnvFilter;

use axum_worksheet::{
    app_router,
    generator::WorksheetGenerator,
    services::{ChromiumRenderer, Database, JobQueue, OpenAiClient},
    worker::{self, WorkerContext},
    AppState, Config,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = Config::load().context("Failed to load configuration")?;

    // RUST_LOG wins over the configured level
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.server.log_level)),
        )
        .init();

    let db = Database::connect(&config.database.url)
        .await
        .context("Failed to open database")?;
    tracing::info!("Database ready at {}", config.database.url);

    let provider = Arc::new(OpenAiClient::new(&config.llm).context("Failed to build LLM client")?);
    let renderer = Arc::new(ChromiumRenderer::new(config.storage.chromium_executable.clone()));
    let generator = WorksheetGenerator::from_config(&config, provider, renderer)
        .context("Failed to load worksheet templates")?;

    let (jobs, receiver) = JobQueue::channel();
    let semaphore = Arc::new(Semaphore::new(config.worker.max_concurrent_tasks));
    worker::spawn_workers(
        WorkerContext {
            db: db.clone(),
            generator: Arc::new(generator),
            job_timeout: Duration::from_secs(config.worker.job_timeout_secs),
        },
        receiver,
        config.worker.worker_count,
        semaphore,
    );
    tracing::info!(
        "Started {} workers ({} concurrent jobs)",
        config.worker.worker_count,
        config.worker.max_concurrent_tasks
    );

    let address = config.bind_address();
    let state = AppState::new(config, db, jobs).context("Failed to build application state")?;
    let app = app_router(state);

    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind {}", address))?;
    tracing::info!("Server running on {}", address);

    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}
