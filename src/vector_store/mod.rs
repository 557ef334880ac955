//! Vector storage and retrieval for record fragments.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;

mod memory;
mod sqlite;

pub use memory::MemoryVectorStore;
pub use sqlite::SqliteVectorStore;

/// An embedded fragment of the patient record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fragment {
    pub id: Uuid,
    /// Source document this fragment was cut from.
    pub source_id: String,
    /// Document-order position across the whole build, starting at 0.
    pub position: i64,
    pub content: String,
    /// Character offset range within the source document.
    pub offset_start: i64,
    pub offset_end: i64,
    pub embedding: Vec<f32>,
    pub indexed_at: DateTime<Utc>,
}

impl Fragment {
    pub fn new(
        source_id: impl Into<String>,
        position: i64,
        content: impl Into<String>,
        offset_start: i64,
        offset_end: i64,
        embedding: Vec<f32>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            source_id: source_id.into(),
            position,
            content: content.into(),
            offset_start,
            offset_end,
            embedding,
            indexed_at: Utc::now(),
        }
    }
}

/// A fragment with its similarity score for a query.
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub fragment: Fragment,
    pub score: f32,
}

/// Metadata describing one complete index build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexMeta {
    /// Build identifier, `<record_id>-<yymmdd>`.
    pub build_id: String,
    pub record_id: String,
    pub embedding_model: String,
    pub dimensions: u32,
    pub fragment_count: u32,
    pub built_at: DateTime<Utc>,
}

/// Per-source summary of the index contents.
#[derive(Debug, Clone)]
pub struct IndexedSource {
    pub source_id: String,
    pub fragment_count: u32,
    pub indexed_at: DateTime<Utc>,
}

/// Abstract interface for vector storage backends.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert fragments. Returns the number inserted.
    async fn insert_batch(&self, fragments: &[Fragment]) -> Result<usize>;

    /// Retrieve the top-k fragments most similar to the query embedding.
    /// Ties keep document order.
    async fn retrieve(&self, query_embedding: &[f32], k: usize) -> Result<Vec<SearchResult>>;

    /// Like [`retrieve`](VectorStore::retrieve), but drops results scoring
    /// below `min_score`.
    async fn retrieve_with_threshold(
        &self,
        query_embedding: &[f32],
        k: usize,
        min_score: f32,
    ) -> Result<Vec<SearchResult>>;

    /// Sources represented in the store, in document order.
    async fn list_sources(&self) -> Result<Vec<IndexedSource>>;

    /// Total number of stored fragments.
    async fn fragment_count(&self) -> Result<u32>;

    /// All fragments in position order.
    async fn all_fragments(&self) -> Result<Vec<Fragment>>;

    /// Record build metadata for the store contents.
    async fn write_meta(&self, meta: &IndexMeta) -> Result<()>;

    /// Read back build metadata, if a build completed.
    async fn read_meta(&self) -> Result<Option<IndexMeta>>;
}

/// Compute cosine similarity between two vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

/// Score and rank candidates against a query embedding.
///
/// Candidates must arrive in position order; the sort is stable, so
/// equal-scoring fragments come back in document order.
pub(crate) fn rank_fragments(
    candidates: Vec<Fragment>,
    query_embedding: &[f32],
    k: usize,
    min_score: f32,
) -> Vec<SearchResult> {
    let mut results: Vec<SearchResult> = candidates
        .into_iter()
        .map(|fragment| {
            let score = cosine_similarity(query_embedding, &fragment.embedding);
            SearchResult { fragment, score }
        })
        .filter(|r| r.score >= min_score)
        .collect();

    results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    results.truncate(k);
    results
}
