use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::app::error::AppError;
use crate::domain::document::{ChunkMetadata, ChunkVector};

use super::{ScoredMatch, VectorIndex};

/// No official Pinecone Rust SDK exists in the corpus, so this is modeled
/// as a thin typed REST client the same way the embedding/generation
/// clients are — the pack's general pattern for "heterogeneous external AI
/// endpoint" integrations (sum-typed response, normalized at the
/// boundary).
pub struct PineconeIndex {
    http: reqwest::Client,
    index_url: String,
    api_key: SecretString,
}

impl PineconeIndex {
    pub fn new(http: reqwest::Client, index_url: impl Into<String>, api_key: SecretString) -> Self {
        PineconeIndex {
            http,
            index_url: index_url.into(),
            api_key,
        }
    }

    fn request(&self, path: &str) -> reqwest::RequestBuilder {
        self.http
            .post(format!("{}{}", self.index_url, path))
            .header("Api-Key", self.api_key.expose_secret())
            .header("Content-Type", "application/json")
    }
}

#[derive(Serialize)]
struct UpsertVector<'a> {
    id: &'a str,
    values: &'a [f32],
    metadata: &'a ChunkMetadata,
}

#[async_trait]
impl VectorIndex for PineconeIndex {
    async fn upsert(&self, namespace: &str, records: &[ChunkVector]) -> Result<(), AppError> {
        if records.is_empty() {
            return Ok(());
        }

        let vectors: Vec<UpsertVector> = records
            .iter()
            .map(|r| UpsertVector {
                id: &r.id,
                values: &r.values,
                metadata: &r.metadata,
            })
            .collect();

        let response = self
            .request("/vectors/upsert")
            .json(&json!({ "namespace": namespace, "vectors": vectors }))
            .send()
            .await
            .map_err(|_| AppError::VectorUpsertUnreachable)?;

        if !response.status().is_success() {
            return Err(AppError::VectorUpsertUnreachable);
        }

        Ok(())
    }

    async fn query(
        &self,
        namespace: &str,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<ScoredMatch>, AppError> {
        let response = self
            .request("/query")
            .json(&json!({
                "namespace": namespace,
                "vector": vector,
                "topK": top_k,
                "includeMetadata": true,
            }))
            .send()
            .await
            .map_err(|_| AppError::VectorUpsertUnreachable)?;

        if !response.status().is_success() {
            return Err(AppError::VectorUpsertUnreachable);
        }

        let body: QueryResponse = response
            .json()
            .await
            .map_err(|_| AppError::VectorUpsertUnreachable)?;

        Ok(body
            .matches
            .into_iter()
            .filter_map(|m| {
                let metadata: ChunkMetadata = serde_json::from_value(m.metadata).ok()?;
                Some(ScoredMatch {
                    id: m.id,
                    score: m.score,
                    metadata,
                })
            })
            .collect())
    }

    async fn delete_namespace(&self, namespace: &str) -> Result<(), AppError> {
        let response = self
            .request("/vectors/delete")
            .json(&json!({ "namespace": namespace, "deleteAll": true }))
            .send()
            .await
            .map_err(|_| AppError::VectorUpsertUnreachable)?;

        if !response.status().is_success() {
            return Err(AppError::VectorUpsertUnreachable);
        }

        Ok(())
    }
}

#[derive(Deserialize)]
struct QueryResponse {
    matches: Vec<QueryMatch>,
}

#[derive(Deserialize)]
struct QueryMatch {
    id: String,
    score: f32,
    #[serde(default)]
    metadata: Value,
}
