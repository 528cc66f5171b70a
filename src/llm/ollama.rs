use async_trait::async_trait;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use crate::app::error::AppError;

use super::{EmbeddingClient, EmbeddingResponseShape, GenerationClient};

const EMBEDDING_TIMEOUT: Duration = Duration::from_secs(60);
const GENERATION_TIMEOUT: Duration = Duration::from_secs(60);

pub struct OllamaClient {
    http: reqwest::Client,
    base_url: String,
    embedding_model: String,
    generation_model: String,
}

impl OllamaClient {
    pub fn new(
        http: reqwest::Client,
        base_url: impl Into<String>,
        embedding_model: impl Into<String>,
        generation_model: impl Into<String>,
    ) -> Self {
        OllamaClient {
            http,
            base_url: base_url.into(),
            embedding_model: embedding_model.into(),
            generation_model: generation_model.into(),
        }
    }
}

#[async_trait]
impl EmbeddingClient for OllamaClient {
    async fn embed_batch(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, AppError> {
        let response = self
            .http
            .post(format!("{}/api/embed", self.base_url))
            .timeout(EMBEDDING_TIMEOUT)
            .json(&json!({ "model": self.embedding_model, "input": inputs }))
            .send()
            .await
            .map_err(|_| AppError::EmbeddingFailed)?;

        if !response.status().is_success() {
            return Err(AppError::EmbeddingFailed);
        }

        let shape: EmbeddingResponseShape = response
            .json()
            .await
            .map_err(|_| AppError::EmbeddingFailed)?;

        Ok(shape.into_vectors())
    }

    async fn embed_one(&self, input: &str, field_name: &str) -> Result<Vec<f32>, AppError> {
        let response = self
            .http
            .post(format!("{}/api/embed", self.base_url))
            .timeout(EMBEDDING_TIMEOUT)
            .json(&json!({ "model": self.embedding_model, field_name: input }))
            .send()
            .await
            .map_err(|_| AppError::EmbeddingFailed)?;

        if !response.status().is_success() {
            return Err(AppError::EmbeddingFailed);
        }

        let shape: EmbeddingResponseShape = response
            .json()
            .await
            .map_err(|_| AppError::EmbeddingFailed)?;

        shape
            .into_vectors()
            .into_iter()
            .next()
            .ok_or(AppError::EmbeddingFailed)
    }
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

#[derive(Debug, Deserialize)]
struct GenerateStreamChunk {
    response: String,
    #[serde(default)]
    done: bool,
}

#[async_trait]
impl GenerationClient for OllamaClient {
    async fn generate(&self, prompt: &str) -> Result<String, AppError> {
        let response = self
            .http
            .post(format!("{}/api/generate", self.base_url))
            .timeout(GENERATION_TIMEOUT)
            .json(&json!({
                "model": self.generation_model,
                "prompt": prompt,
                "stream": false,
            }))
            .send()
            .await
            .map_err(|_| AppError::GenerationFailed)?;

        if !response.status().is_success() {
            return Err(AppError::GenerationFailed);
        }

        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|_| AppError::GenerationFailed)?;

        Ok(body.response)
    }

    async fn generate_stream(
        &self,
        prompt: &str,
    ) -> Result<futures::stream::BoxStream<'static, Result<String, AppError>>, AppError> {
        let response = self
            .http
            .post(format!("{}/api/generate", self.base_url))
            .timeout(GENERATION_TIMEOUT)
            .json(&json!({
                "model": self.generation_model,
                "prompt": prompt,
                "stream": true,
            }))
            .send()
            .await
            .map_err(|_| AppError::GenerationFailed)?;

        if !response.status().is_success() {
            return Err(AppError::GenerationFailed);
        }

        let byte_stream = response.bytes_stream();
        let stream = byte_stream.flat_map(|chunk| {
            let lines: Vec<Result<String, AppError>> = match chunk {
                Ok(bytes) => String::from_utf8_lossy(&bytes)
                    .lines()
                    .filter(|line| !line.trim().is_empty())
                    .filter_map(|line| serde_json::from_str::<GenerateStreamChunk>(line).ok())
                    .filter(|chunk| !chunk.done)
                    .map(|chunk| Ok(chunk.response))
                    .collect(),
                Err(_) => vec![Err(AppError::GenerationFailed)],
            };
            futures::stream::iter(lines)
        });

        Ok(Box::pin(stream))
    }
}
