use std::sync::Arc;

use clap::Parser;
use faqline::app::{build_event_bus, build_storage, build_vector_index, get_db_connection_pool};
use faqline::config::AppConfig;
use faqline::content::repository::DocumentRepository;
use faqline::ingestion::pipeline::{Pipeline, PipelineConfig};
use faqline::ingestion::worker::Worker;
use faqline::llm::ollama::OllamaClient;
use faqline::llm::EmbeddingClient;
use faqline::telemetry::{build_telemetry, register_telemetry};

/// Entry point for the ingestion worker (spec.md §4.6): separate process
/// from `faqline-api`, consuming `document.uploaded` off the same event
/// bus the API publishes to, mirroring the teacher's single-binary
/// `Application::build` construction but against the worker's own
/// dependency subset.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = AppConfig::parse();

    let telemetry = build_telemetry(
        env!("CARGO_CRATE_NAME").into(),
        config.log_level.clone(),
        std::io::stdout,
    );
    register_telemetry(telemetry);

    let db_pool = get_db_connection_pool(&config);
    let storage = build_storage(&config).await?;
    let bus = build_event_bus(&config)?;
    let vector_index = build_vector_index(&config);

    let http_client = reqwest::Client::builder().build()?;
    let embedding_client: Arc<dyn EmbeddingClient> = Arc::new(OllamaClient::new(
        http_client,
        config.ollama_url.clone(),
        config.ollama_embedding_model.clone(),
        config.ollama_generation_model.clone(),
    ));

    let pipeline = Pipeline {
        documents: DocumentRepository::new(db_pool),
        storage,
        embedding_client,
        vector_index,
        bus: bus.clone(),
        config: PipelineConfig {
            chunk_size: config.chunk_size,
            chunk_overlap: config.chunk_overlap,
            embedding_dimensions: config.embedding_dimensions,
            embedding_batch_size: config.embedding_batch_size,
        },
    };

    let worker = Worker::new(pipeline, bus, config.max_concurrent_jobs);
    tracing::info!(max_concurrent_jobs = config.max_concurrent_jobs, "faqline-worker starting");

    worker.run(shutdown_signal()).await?;
    tracing::info!("faqline-worker stopped");

    Ok(())
}

async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
