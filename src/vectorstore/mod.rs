//! Vector index abstraction (spec.md §4.6.6, §4.7). Namespaced per-tenant
//! (`org_{org_id}`), batched upserts, top-K similarity query with a
//! minimum score floor.

pub mod pinecone;

use async_trait::async_trait;

use crate::app::error::AppError;
use crate::domain::document::{ChunkMetadata, ChunkVector};

#[derive(Debug, Clone)]
pub struct ScoredMatch {
    pub id: String,
    pub score: f32,
    pub metadata: ChunkMetadata,
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn upsert(&self, namespace: &str, records: &[ChunkVector]) -> Result<(), AppError>;

    async fn query(
        &self,
        namespace: &str,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<ScoredMatch>, AppError>;

    async fn delete_namespace(&self, namespace: &str) -> Result<(), AppError>;
}
