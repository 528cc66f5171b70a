use std::sync::Arc;
use std::time::Duration;

use axum::{extract::MatchedPath, http::Request, Router};
use sqlx::{postgres::PgPoolOptions, PgPool};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};
use tower_governor::key_extractor::SmartIpKeyExtractor;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info_span;
use uuid::Uuid;

pub mod error;
pub mod extractor;
pub mod middleware;
pub mod response;
pub mod validated_json;

use crate::config::{AppConfig, StorageType};
use crate::content::service::ContentService;
use crate::conversation::repository::ConversationRepository;
use crate::crypto::token::TokenManager;
use crate::events::outbox::{run_outbox_retry_loop, OutboxRepository};
use crate::events::{memory::InMemoryEventBus, EventBus};
use crate::identity::service::IdentityService;
use crate::llm::{ollama::OllamaClient, EmbeddingClient, GenerationClient};
use crate::rag::orchestrator::RagOrchestrator;
use crate::storage::{local::LocalStorage, s3::S3Storage, ObjectStore};
use crate::vectorstore::{pinecone::PineconeIndex, VectorIndex};

/// Every dependency a route handler might need, constructed once at
/// startup in [`Application::build`] and cloned cheaply (everything
/// expensive is already behind an `Arc`) into each request's extension
/// set. Mirrors the teacher's `ApiContext` (`app/mod.rs`), generalized
/// from one email/storage/redis stack to this crate's identity, content,
/// ingestion, and RAG dependencies.
#[derive(Clone)]
pub struct ApiContext {
    pub config: Arc<AppConfig>,
    pub db_pool: PgPool,
    pub token_manager: Arc<TokenManager>,
    pub identity: IdentityService,
    pub content: ContentService,
    pub conversations: ConversationRepository,
    pub rag: RagOrchestrator,
    pub bus: Arc<dyn EventBus>,
    pub outbox: Arc<OutboxRepository>,
}

pub struct Application {
    listener: TcpListener,
    pub port: u16,
    app: Router,
    outbox_retry: OutboxRetryHandle,
}

struct OutboxRetryHandle {
    outbox: Arc<OutboxRepository>,
    bus: Arc<dyn EventBus>,
}

impl Application {
    pub async fn build(config: AppConfig) -> Result<Self, anyhow::Error> {
        let addr = format!("{}:{}", config.host, config.port);
        let listener = TcpListener::bind(addr).await?;
        let port = listener.local_addr()?.port();

        let db_pool = get_db_connection_pool(&config);
        let token_manager = Arc::new(TokenManager::new(&config.jwt_secret));

        let storage: Arc<dyn ObjectStore> = build_storage(&config).await?;
        let bus: Arc<dyn EventBus> = build_event_bus(&config)?;
        let outbox = Arc::new(OutboxRepository::new(db_pool.clone()));
        let vector_index: Arc<dyn VectorIndex> = build_vector_index(&config);

        let http_client = reqwest::Client::builder().build()?;
        let embedding_client: Arc<dyn EmbeddingClient> = Arc::new(OllamaClient::new(
            http_client.clone(),
            config.ollama_url.clone(),
            config.ollama_embedding_model.clone(),
            config.ollama_generation_model.clone(),
        ));
        let generation_client: Arc<dyn GenerationClient> = Arc::new(OllamaClient::new(
            http_client,
            config.ollama_url.clone(),
            config.ollama_embedding_model.clone(),
            config.ollama_generation_model.clone(),
        ));

        let identity = IdentityService::new(db_pool.clone(), token_manager.clone());
        let content = ContentService::new(
            db_pool.clone(),
            storage,
            bus.clone(),
            outbox.clone(),
            vector_index.clone(),
            config.allowed_file_type_list(),
            config.max_file_size,
        );
        let conversations = ConversationRepository::new(db_pool.clone());
        let rag = RagOrchestrator::new(
            conversations.clone(),
            embedding_client,
            generation_client,
            vector_index,
            config.embedding_dimensions,
        );

        let api_context = ApiContext {
            config: Arc::new(config),
            db_pool,
            token_manager,
            identity,
            content,
            conversations,
            rag,
            bus: bus.clone(),
            outbox: outbox.clone(),
        };

        let app = build_routes(api_context);

        Ok(Application {
            listener,
            port,
            app,
            outbox_retry: OutboxRetryHandle { outbox, bus },
        })
    }

    /// Runs the HTTP listener and the outbox retry loop side by side until
    /// `close_rx` fires, then drains both gracefully (the teacher's
    /// `run_gracefully` pattern, generalized to also own a background
    /// task).
    pub async fn run_gracefully(self, close_rx: tokio::sync::oneshot::Receiver<()>) {
        let retry_task = tokio::spawn(run_outbox_retry_loop(
            self.outbox_retry.outbox,
            self.outbox_retry.bus,
            Duration::from_secs(30),
        ));

        axum::serve(self.listener, self.app)
            .with_graceful_shutdown(async move {
                let _ = close_rx.await;
            })
            .await
            .expect("HTTP server crashed");

        retry_task.abort();
    }

    /// Useful for integration tests; never called from `main`.
    pub async fn run_until_stopped(self) {
        axum::serve(self.listener, self.app)
            .await
            .expect("HTTP server crashed");
    }
}

fn build_routes(api_context: ApiContext) -> Router {
    let cors = CorsLayer::permissive();

    let governor_conf = GovernorConfigBuilder::default()
        .key_extractor(SmartIpKeyExtractor)
        .per_second(2)
        .burst_size(20)
        .finish()
        .expect("static governor config is valid");

    crate::routes::router(api_context.clone())
        .with_state(api_context)
        .layer(
            ServiceBuilder::new()
                .layer(cors)
                .layer(GovernorLayer::new(governor_conf))
                .layer(
                    TraceLayer::new_for_http().make_span_with(|req: &Request<_>| {
                        let request_id = Uuid::new_v4();
                        let matched_path = req
                            .extensions()
                            .get::<MatchedPath>()
                            .map(MatchedPath::as_str);

                        info_span!(
                            "http_request",
                            method = ?req.method(),
                            matched_path,
                            request_id = ?request_id,
                            org_id = tracing::field::Empty,
                            user_id = tracing::field::Empty,
                        )
                    }),
                ),
        )
}

pub fn get_db_connection_pool(config: &AppConfig) -> PgPool {
    PgPoolOptions::new()
        .max_connections(20)
        .connect_lazy_with(config.db_connect_options())
}

/// Shared with `faqline-worker` (`src/bin/ingestion_worker.rs`) so both
/// binaries build the storage/bus/vector-index stack identically.
pub async fn build_storage(config: &AppConfig) -> Result<Arc<dyn ObjectStore>, anyhow::Error> {
    match config.storage_type {
        StorageType::Local => Ok(Arc::new(LocalStorage::new(
            config.storage_path.clone(),
            format!("http://{}:{}/local-storage", config.host, config.port),
        ))),
        StorageType::S3 | StorageType::Minio => {
            let region_provider =
                aws_config::meta::region::RegionProviderChain::default_provider()
                    .or_else(config.aws_region.clone().unwrap_or_else(|| "us-east-1".to_string()));
            let aws_cfg = aws_config::defaults(aws_config::BehaviorVersion::latest())
                .region(region_provider)
                .load()
                .await;
            let client = aws_sdk_s3::Client::new(&aws_cfg);
            let bucket = config
                .aws_s3_bucket
                .clone()
                .ok_or_else(|| anyhow::anyhow!("AWS_S3_BUCKET is required for STORAGE_TYPE=s3/minio"))?;
            Ok(Arc::new(S3Storage::new(client, bucket)))
        }
    }
}

pub fn build_event_bus(config: &AppConfig) -> Result<Arc<dyn EventBus>, anyhow::Error> {
    if config.local_test_mode {
        return Ok(Arc::new(InMemoryEventBus::new()));
    }

    let brokers = config
        .kafka_brokers
        .clone()
        .ok_or_else(|| anyhow::anyhow!("KAFKA_BROKERS is required unless LOCAL_TEST_MODE=true"))?;
    Ok(Arc::new(crate::events::kafka::KafkaEventBus::new(
        &brokers,
        &config.kafka_group_id,
    )?))
}

pub fn build_vector_index(config: &AppConfig) -> Arc<dyn VectorIndex> {
    let http_client = reqwest::Client::new();
    let index_url = config.pinecone_index_url.clone().unwrap_or_default();
    let api_key = config
        .pinecone_api_key
        .clone()
        .unwrap_or_else(|| secrecy::SecretString::from(String::new()));
    Arc::new(PineconeIndex::new(http_client, index_url, api_key))
}
