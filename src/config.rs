use secrecy::SecretString;
use sqlx::postgres::PgConnectOptions;
use std::str::FromStr;

/// Process-wide configuration, parsed from CLI flags or (more commonly in
/// practice) from the environment via `clap`'s `env` attribute. Every key
/// here corresponds to one of the recognized environment options.
#[derive(clap::Parser, Clone, Debug)]
pub struct AppConfig {
    #[clap(long, env, default_value = "dev")]
    pub stage: Stage,

    #[clap(long, env = "PORT", default_value_t = 8080)]
    pub port: u16,

    #[clap(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    #[clap(long, env)]
    pub database_url: SecretString,

    #[clap(long, env)]
    pub jwt_secret: SecretString,

    #[clap(long, env, default_value = "*")]
    pub cors_origin: String,

    #[clap(long, env, default_value = "info")]
    pub log_level: String,

    #[clap(long, env, default_value = "s3")]
    pub storage_type: StorageType,

    #[clap(long, env, default_value = "./storage")]
    pub storage_path: String,

    #[clap(long, env)]
    pub aws_region: Option<String>,

    #[clap(long, env)]
    pub aws_s3_bucket: Option<String>,

    #[clap(long, env)]
    pub aws_access_key_id: Option<String>,

    #[clap(long, env)]
    pub aws_secret_access_key: Option<String>,

    #[clap(long, env)]
    pub kafka_brokers: Option<String>,

    #[clap(long, env, default_value = "faqline-ingestion")]
    pub kafka_group_id: String,

    #[clap(long, env, default_value = "document.uploaded")]
    pub kafka_topic_uploaded: String,

    #[clap(long, env, default_value = "document.processed")]
    pub kafka_topic_processed: String,

    #[clap(long, env, default_value = "document.failed")]
    pub kafka_topic_failed: String,

    #[clap(long, env, default_value = "http://localhost:11434")]
    pub ollama_url: String,

    #[clap(long, env, default_value = "nomic-embed-text")]
    pub ollama_embedding_model: String,

    #[clap(long, env, default_value = "llama3")]
    pub ollama_generation_model: String,

    #[clap(long, env, default_value_t = 768)]
    pub embedding_dimensions: usize,

    #[clap(long, env, default_value_t = 100)]
    pub embedding_batch_size: usize,

    #[clap(long, env, default_value_t = 1000)]
    pub chunk_size: usize,

    #[clap(long, env, default_value_t = 200)]
    pub chunk_overlap: usize,

    #[clap(long, env)]
    pub pinecone_api_key: Option<SecretString>,

    #[clap(long, env)]
    pub pinecone_index_url: Option<String>,

    #[clap(long, env, default_value_t = 5)]
    pub max_concurrent_jobs: usize,

    #[clap(long, env, default_value_t = false)]
    pub local_test_mode: bool,

    #[clap(long, env, default_value_t = 52_428_800)]
    pub max_file_size: i64,

    #[clap(long, env, default_value = "pdf,docx,txt,md")]
    pub allowed_file_types: String,

    #[clap(long, env, default_value_t = 900)]
    pub access_token_ttl_seconds: i64,

    #[clap(long, env, default_value_t = 604_800)]
    pub refresh_token_ttl_seconds: i64,

    #[clap(long, env, default_value_t = 5)]
    pub lockout_attempts: i32,

    #[clap(long, env, default_value_t = 1800)]
    pub lockout_seconds: i64,
}

#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
#[clap(rename_all = "kebab_case")]
pub enum Stage {
    Dev,
    Prod,
}

#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
#[clap(rename_all = "kebab_case")]
pub enum StorageType {
    S3,
    Minio,
    Local,
}

impl AppConfig {
    pub fn db_connect_options(&self) -> PgConnectOptions {
        use secrecy::ExposeSecret;
        PgConnectOptions::from_str(self.database_url.expose_secret())
            .expect("DATABASE_URL must be a valid postgres connection string")
    }

    pub fn allowed_file_type_list(&self) -> Vec<String> {
        self.allowed_file_types
            .split(',')
            .map(|s| s.trim().to_ascii_lowercase())
            .filter(|s| !s.is_empty())
            .collect()
    }
}
