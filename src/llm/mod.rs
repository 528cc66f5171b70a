//! Embedding and generation endpoints (spec.md §4.6.5, §4.7, §9). The
//! external service is Ollama-shaped (`OLLAMA_URL`); the client normalizes
//! whatever shape comes back to a canonical `Vec<Vec<f32>>` at the
//! boundary, per the "heterogeneous embedding response shapes" redesign
//! note.

pub mod ollama;

use async_trait::async_trait;
use serde::Deserialize;

use crate::app::error::AppError;

/// The observed embedding response shapes, normalized at the boundary
/// rather than threaded as ad hoc JSON through the pipeline.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum EmbeddingResponseShape {
    /// `{"embeddings": [[...], [...]]}` — one call for the whole batch.
    BatchMatrix { embeddings: Vec<Vec<f32>> },
    /// `{"embedding": [...]}` — a single item keyed `embedding`.
    SingleEmbedding { embedding: Vec<f32> },
    /// `{"values": [...]}` — a single item keyed `values` (the other
    /// spelling the ingestion worker's per-item fallback tries).
    SingleValues { values: Vec<f32> },
    /// A bare numeric vector with no wrapper object.
    RawVector(Vec<f32>),
}

impl EmbeddingResponseShape {
    pub fn into_vectors(self) -> Vec<Vec<f32>> {
        match self {
            EmbeddingResponseShape::BatchMatrix { embeddings } => embeddings,
            EmbeddingResponseShape::SingleEmbedding { embedding } => vec![embedding],
            EmbeddingResponseShape::SingleValues { values } => vec![values],
            EmbeddingResponseShape::RawVector(values) => vec![values],
        }
    }
}

#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// A single HTTP call attempting to embed every input at once. Callers
    /// (the ingestion worker's embed step) are responsible for validating
    /// the shape/count/dimension of the result and falling back to
    /// `embed_one` per item when it doesn't line up.
    async fn embed_batch(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, AppError>;

    /// A single-item embedding call, tried with each of the two observed
    /// input field spellings in turn by the caller.
    async fn embed_one(&self, input: &str, field_name: &str) -> Result<Vec<f32>, AppError>;
}

#[async_trait]
pub trait GenerationClient: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, AppError>;

    /// Streaming variant used by `chat::query_stream`; yields response
    /// chunks as they arrive.
    async fn generate_stream(
        &self,
        prompt: &str,
    ) -> Result<futures::stream::BoxStream<'static, Result<String, AppError>>, AppError>;
}

/// Validates the robustness contract of spec.md §4.6.5: finite numbers,
/// non-empty, identical length across items, equal to the configured
/// dimension.
pub fn validate_vectors(vectors: &[Vec<f32>], expected_dimensions: usize) -> Result<(), AppError> {
    if vectors.is_empty() {
        return Err(AppError::EmbeddingFailed);
    }

    let first_len = vectors[0].len();
    for vector in vectors {
        if vector.is_empty() || vector.len() != first_len || vector.len() != expected_dimensions {
            return Err(AppError::DimensionMismatch);
        }
        if vector.iter().any(|v| !v.is_finite()) {
            return Err(AppError::EmbeddingFailed);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_mismatched_lengths_across_items() {
        let vectors = vec![vec![0.1, 0.2], vec![0.1, 0.2, 0.3]];
        assert!(matches!(
            validate_vectors(&vectors, 2),
            Err(AppError::DimensionMismatch)
        ));
    }

    #[test]
    fn rejects_non_finite_values() {
        let vectors = vec![vec![f32::NAN, 0.2]];
        assert!(matches!(
            validate_vectors(&vectors, 2),
            Err(AppError::EmbeddingFailed)
        ));
    }

    #[test]
    fn accepts_matching_dimension() {
        let vectors = vec![vec![0.1, 0.2, 0.3]; 3];
        assert!(validate_vectors(&vectors, 3).is_ok());
    }
}
