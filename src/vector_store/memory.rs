//! In-memory vector store, used to stage builds before persisting and as a
//! lightweight backend in tests.

use async_trait::async_trait;
use std::sync::RwLock;

use crate::error::{AnamneseError, Result};

use super::{rank_fragments, Fragment, IndexMeta, IndexedSource, SearchResult, VectorStore};

/// In-memory vector store.
#[derive(Default)]
pub struct MemoryVectorStore {
    fragments: RwLock<Vec<Fragment>>,
    meta: RwLock<Option<IndexMeta>>,
}

impl MemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read_fragments(&self) -> Result<Vec<Fragment>> {
        let fragments = self
            .fragments
            .read()
            .map_err(|e| AnamneseError::VectorStore(format!("Failed to acquire lock: {}", e)))?;
        let mut sorted = fragments.clone();
        sorted.sort_by_key(|f| f.position);
        Ok(sorted)
    }
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    async fn insert_batch(&self, fragments: &[Fragment]) -> Result<usize> {
        let mut store = self
            .fragments
            .write()
            .map_err(|e| AnamneseError::VectorStore(format!("Failed to acquire lock: {}", e)))?;
        store.extend_from_slice(fragments);
        Ok(fragments.len())
    }

    async fn retrieve(&self, query_embedding: &[f32], k: usize) -> Result<Vec<SearchResult>> {
        let candidates = self.read_fragments()?;
        Ok(rank_fragments(candidates, query_embedding, k, f32::NEG_INFINITY))
    }

    async fn retrieve_with_threshold(
        &self,
        query_embedding: &[f32],
        k: usize,
        min_score: f32,
    ) -> Result<Vec<SearchResult>> {
        let candidates = self.read_fragments()?;
        Ok(rank_fragments(candidates, query_embedding, k, min_score))
    }

    async fn list_sources(&self) -> Result<Vec<IndexedSource>> {
        let fragments = self.read_fragments()?;
        let mut sources: Vec<IndexedSource> = Vec::new();
        for fragment in &fragments {
            match sources.iter_mut().find(|s| s.source_id == fragment.source_id) {
                Some(entry) => {
                    entry.fragment_count += 1;
                    if fragment.indexed_at > entry.indexed_at {
                        entry.indexed_at = fragment.indexed_at;
                    }
                }
                None => sources.push(IndexedSource {
                    source_id: fragment.source_id.clone(),
                    fragment_count: 1,
                    indexed_at: fragment.indexed_at,
                }),
            }
        }
        Ok(sources)
    }

    async fn fragment_count(&self) -> Result<u32> {
        let fragments = self
            .fragments
            .read()
            .map_err(|e| AnamneseError::VectorStore(format!("Failed to acquire lock: {}", e)))?;
        Ok(fragments.len() as u32)
    }

    async fn all_fragments(&self) -> Result<Vec<Fragment>> {
        self.read_fragments()
    }

    async fn write_meta(&self, meta: &IndexMeta) -> Result<()> {
        let mut slot = self
            .meta
            .write()
            .map_err(|e| AnamneseError::VectorStore(format!("Failed to acquire lock: {}", e)))?;
        *slot = Some(meta.clone());
        Ok(())
    }

    async fn read_meta(&self) -> Result<Option<IndexMeta>> {
        let slot = self
            .meta
            .read()
            .map_err(|e| AnamneseError::VectorStore(format!("Failed to acquire lock: {}", e)))?;
        Ok(slot.clone())
    }
}
