//! Embedding generation for record fragments and queries.

use async_trait::async_trait;

use crate::error::Result;

mod openai;

pub use openai::OpenAIEmbedder;

/// Generates vector embeddings for text.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed multiple texts, preserving input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Dimensionality of the produced vectors.
    fn dimensions(&self) -> u32;

    /// Identifier of the underlying model, recorded with every index build
    /// so a loaded index can be checked against the live configuration.
    fn model_id(&self) -> &str;
}
