//! OpenAI embedding provider.

use async_openai::config::OpenAIConfig;
use async_openai::types::CreateEmbeddingRequestArgs;
use async_openai::Client;
use async_trait::async_trait;
use tracing::{debug, instrument};

use crate::error::{AnamneseError, Result};

use super::Embedder;

/// Maximum texts per embedding API request.
const BATCH_SIZE: usize = 100;

/// OpenAI embedding provider.
pub struct OpenAIEmbedder {
    client: Client<OpenAIConfig>,
    model: String,
    dimensions: u32,
}

impl OpenAIEmbedder {
    pub fn new() -> Self {
        Self::with_config("text-embedding-3-small", 1536)
    }

    pub fn with_config(model: &str, dimensions: u32) -> Self {
        Self {
            client: crate::openai::create_client(),
            model: model.to_string(),
            dimensions,
        }
    }
}

impl Default for OpenAIEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Embedder for OpenAIEmbedder {
    #[instrument(skip(self, text))]
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut results = self.embed_batch(&[text.to_string()]).await?;
        if results.is_empty() {
            return Err(AnamneseError::Embedding(
                "No embedding returned".to_string(),
            ));
        }
        Ok(results.remove(0))
    }

    #[instrument(skip(self, texts), fields(count = texts.len()))]
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut embeddings = Vec::with_capacity(texts.len());

        for chunk in texts.chunks(BATCH_SIZE) {
            debug!(batch_size = chunk.len(), "Requesting embeddings");

            let request = CreateEmbeddingRequestArgs::default()
                .model(&self.model)
                .input(chunk.to_vec())
                .dimensions(self.dimensions)
                .build()
                .map_err(|e| AnamneseError::Embedding(e.to_string()))?;

            let response = self
                .client
                .embeddings()
                .create(request)
                .await
                .map_err(|e| AnamneseError::OpenAI(format!("Embedding API error: {}", e)))?;

            if response.data.len() != chunk.len() {
                return Err(AnamneseError::Embedding(format!(
                    "Expected {} embeddings, got {}",
                    chunk.len(),
                    response.data.len()
                )));
            }

            let mut data = response.data;
            data.sort_by_key(|d| d.index);
            embeddings.extend(data.into_iter().map(|d| d.embedding));
        }

        Ok(embeddings)
    }

    fn dimensions(&self) -> u32 {
        self.dimensions
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}
