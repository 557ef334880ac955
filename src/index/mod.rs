//! Index building, persistence, and loading.
//!
//! A build splits source documents into fragments, embeds them, and stages
//! everything in memory. Nothing touches disk until [`BuiltIndex::persist`],
//! which hands the finished build to SQLite in one transaction. Loading
//! checks the recorded build metadata against the live embedder before any
//! retrieval happens, so a stale index fails loudly instead of returning
//! silently wrong similarities.

use chrono::Utc;
use futures::stream::{self, StreamExt};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, instrument};

use crate::embedding::Embedder;
use crate::error::{AnamneseError, Result};
use crate::record::SourceDocument;
use crate::splitting::{FragmentDraft, Splitter};
use crate::vector_store::{
    Fragment, IndexMeta, MemoryVectorStore, SqliteVectorStore, VectorStore,
};

/// Fragments embedded per request during a build.
const EMBED_BATCH: usize = 64;

/// Concurrent embedding requests during a build.
const DEFAULT_MAX_CONCURRENT: usize = 2;

/// Builds a retrieval index from source documents.
pub struct IndexBuilder {
    splitter: Splitter,
    embedder: Arc<dyn Embedder>,
    batch_size: usize,
    max_concurrent: usize,
}

impl IndexBuilder {
    pub fn new(splitter: Splitter, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            splitter,
            embedder,
            batch_size: EMBED_BATCH,
            max_concurrent: DEFAULT_MAX_CONCURRENT,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent.max(1);
        self
    }

    /// Split and embed all documents into a staged, in-memory index.
    ///
    /// Fragment positions run 0..n across all documents in input order.
    /// Any embedding failure aborts the whole build.
    #[instrument(skip(self, documents), fields(record_id = %record_id, documents = documents.len()))]
    pub async fn build(&self, record_id: &str, documents: &[SourceDocument]) -> Result<BuiltIndex> {
        let mut pieces: Vec<(String, FragmentDraft)> = Vec::new();
        for document in documents {
            for draft in self.splitter.split(&document.text) {
                pieces.push((document.source_id.clone(), draft));
            }
        }
        if pieces.is_empty() {
            return Err(AnamneseError::Ingest(
                "Record produced no indexable fragments".to_string(),
            ));
        }
        debug!(fragments = pieces.len(), "Split documents");

        let embeddings = self.embed_all(&pieces).await?;
        if embeddings.len() != pieces.len() {
            return Err(AnamneseError::Embedding(format!(
                "Expected {} embeddings, got {}",
                pieces.len(),
                embeddings.len()
            )));
        }

        let fragments: Vec<Fragment> = pieces
            .into_iter()
            .zip(embeddings)
            .enumerate()
            .map(|(position, ((source_id, draft), embedding))| {
                Fragment::new(
                    source_id,
                    position as i64,
                    draft.content,
                    draft.offset_start as i64,
                    draft.offset_end as i64,
                    embedding,
                )
            })
            .collect();

        let meta = IndexMeta {
            build_id: format!("{}-{}", record_id, Utc::now().format("%y%m%d")),
            record_id: record_id.to_string(),
            embedding_model: self.embedder.model_id().to_string(),
            dimensions: self.embedder.dimensions(),
            fragment_count: fragments.len() as u32,
            built_at: Utc::now(),
        };

        let store = MemoryVectorStore::new();
        store.insert_batch(&fragments).await?;
        store.write_meta(&meta).await?;

        info!(build_id = %meta.build_id, fragments = meta.fragment_count, "Built index");
        Ok(BuiltIndex {
            meta,
            store: Arc::new(store),
        })
    }

    /// Embed all fragment contents, a few batches in flight at a time.
    async fn embed_all(&self, pieces: &[(String, FragmentDraft)]) -> Result<Vec<Vec<f32>>> {
        let batches: Vec<Vec<String>> = pieces
            .chunks(self.batch_size)
            .map(|chunk| chunk.iter().map(|(_, draft)| draft.content.clone()).collect())
            .collect();

        let results: Vec<Result<(usize, Vec<Vec<f32>>)>> =
            stream::iter(batches.into_iter().enumerate())
                .map(|(idx, texts)| {
                    let embedder = Arc::clone(&self.embedder);
                    async move {
                        let embeddings = embedder.embed_batch(&texts).await?;
                        Ok::<_, AnamneseError>((idx, embeddings))
                    }
                })
                .buffer_unordered(self.max_concurrent)
                .collect()
                .await;

        let mut completed: Vec<(usize, Vec<Vec<f32>>)> = Vec::with_capacity(results.len());
        for result in results {
            completed.push(result?);
        }
        completed.sort_by_key(|(idx, _)| *idx);

        Ok(completed.into_iter().flat_map(|(_, e)| e).collect())
    }
}

/// A finished build staged in memory, ready to query or persist.
pub struct BuiltIndex {
    meta: IndexMeta,
    store: Arc<MemoryVectorStore>,
}

impl std::fmt::Debug for BuiltIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuiltIndex")
            .field("meta", &self.meta)
            .finish_non_exhaustive()
    }
}

impl BuiltIndex {
    pub fn meta(&self) -> &IndexMeta {
        &self.meta
    }

    pub fn store(&self) -> Arc<dyn VectorStore> {
        Arc::clone(&self.store) as Arc<dyn VectorStore>
    }

    /// Write the build to disk, replacing any previous index in a single
    /// transaction.
    pub async fn persist(&self, path: &Path) -> Result<()> {
        let fragments = self.store.all_fragments().await?;
        let target = SqliteVectorStore::create(path)?;
        target.store_build(&self.meta, &fragments)?;
        info!(path = %path.display(), build_id = %self.meta.build_id, "Persisted index");
        Ok(())
    }
}

/// A persisted index opened for retrieval.
pub struct LoadedIndex {
    pub meta: IndexMeta,
    store: Arc<dyn VectorStore>,
}

impl std::fmt::Debug for LoadedIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedIndex")
            .field("meta", &self.meta)
            .finish_non_exhaustive()
    }
}

impl LoadedIndex {
    pub fn store(&self) -> Arc<dyn VectorStore> {
        Arc::clone(&self.store)
    }
}

/// Open a persisted index and verify it against the live embedder.
pub async fn load_index(path: &Path, embedder: &dyn Embedder) -> Result<LoadedIndex> {
    let store = SqliteVectorStore::open(path)?;

    let meta = store.read_meta().await?.ok_or_else(|| {
        AnamneseError::IndexLoad(format!(
            "Index at {} has no build metadata (corrupt or never completed)",
            path.display()
        ))
    })?;

    if meta.embedding_model != embedder.model_id() {
        return Err(AnamneseError::Config(format!(
            "Index was built with embedding model {} but {} is configured; \
             rebuild with `anamnese build --force`",
            meta.embedding_model,
            embedder.model_id()
        )));
    }
    if meta.dimensions != embedder.dimensions() {
        return Err(AnamneseError::Config(format!(
            "Index embeddings have {} dimensions but {} are configured; \
             rebuild with `anamnese build --force`",
            meta.dimensions,
            embedder.dimensions()
        )));
    }

    let stored = store.fragment_count().await?;
    if stored != meta.fragment_count {
        return Err(AnamneseError::IndexLoad(format!(
            "Index holds {} fragments but metadata records {}",
            stored, meta.fragment_count
        )));
    }

    info!(build_id = %meta.build_id, fragments = stored, "Loaded index");
    Ok(LoadedIndex {
        meta,
        store: Arc::new(store),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::testing::{pseudo_embedding, MockEmbedder};
    use crate::splitting::{SplitStrategy, SplitterConfig};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FailingEmbedder {
        calls_before_failure: usize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Embedder for FailingEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Err(AnamneseError::Embedding("mock failure".to_string()))
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call >= self.calls_before_failure {
                return Err(AnamneseError::Embedding("mock failure".to_string()));
            }
            Ok(texts.iter().map(|t| pseudo_embedding(t, 8)).collect())
        }

        fn dimensions(&self) -> u32 {
            8
        }

        fn model_id(&self) -> &str {
            "mock-embedder"
        }
    }

    fn paragraph_splitter() -> Splitter {
        Splitter::new(
            SplitStrategy::Paragraph,
            SplitterConfig {
                target_chars: 40,
                overlap_chars: 0,
                min_chars: 1,
            },
        )
    }

    fn documents() -> Vec<SourceDocument> {
        vec![
            SourceDocument {
                source_id: "encounters".to_string(),
                text: "Visit one, hypertension noted.\n\nVisit two, blood pressure improved.\n\nVisit three, stable.".to_string(),
            },
            SourceDocument {
                source_id: "labs".to_string(),
                text: "HbA1c 6.1 percent on 2025-03-02.\n\nLDL 98 mg/dL, within target.".to_string(),
            },
        ]
    }

    #[tokio::test]
    async fn build_assigns_global_positions_in_document_order() {
        let builder = IndexBuilder::new(paragraph_splitter(), Arc::new(MockEmbedder::new()));
        let built = builder.build("sarah-brown", &documents()).await.unwrap();

        let fragments = built.store().all_fragments().await.unwrap();
        let positions: Vec<i64> = fragments.iter().map(|f| f.position).collect();
        assert_eq!(positions, (0..fragments.len() as i64).collect::<Vec<_>>());

        let first_labs = fragments
            .iter()
            .position(|f| f.source_id == "labs")
            .unwrap();
        assert!(fragments[..first_labs]
            .iter()
            .all(|f| f.source_id == "encounters"));
        assert!(fragments[first_labs..].iter().all(|f| f.source_id == "labs"));
    }

    #[tokio::test]
    async fn build_records_metadata_from_the_embedder() {
        let builder = IndexBuilder::new(paragraph_splitter(), Arc::new(MockEmbedder::new()));
        let built = builder.build("sarah-brown", &documents()).await.unwrap();

        let meta = built.meta();
        assert!(meta.build_id.starts_with("sarah-brown-"));
        assert_eq!(meta.record_id, "sarah-brown");
        assert_eq!(meta.embedding_model, "mock-embedder");
        assert_eq!(meta.dimensions, 8);
        assert_eq!(
            meta.fragment_count as usize,
            built.store().all_fragments().await.unwrap().len()
        );
    }

    #[tokio::test]
    async fn empty_documents_fail_the_build() {
        let builder = IndexBuilder::new(paragraph_splitter(), Arc::new(MockEmbedder::new()));
        let err = builder.build("sarah-brown", &[]).await.unwrap_err();
        assert!(matches!(err, AnamneseError::Ingest(_)));
    }

    #[tokio::test]
    async fn embedding_failure_aborts_the_build() {
        let embedder = FailingEmbedder {
            calls_before_failure: 1,
            calls: AtomicUsize::new(0),
        };
        let builder = IndexBuilder::new(paragraph_splitter(), Arc::new(embedder))
            .with_batch_size(2)
            .with_max_concurrent(1);

        let err = builder.build("sarah-brown", &documents()).await.unwrap_err();
        assert!(matches!(err, AnamneseError::Embedding(_)));
    }

    #[tokio::test]
    async fn persisted_index_loads_and_retrieves_identically() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.db");
        let embedder = MockEmbedder::new();

        let builder = IndexBuilder::new(paragraph_splitter(), Arc::new(MockEmbedder::new()));
        let built = builder.build("sarah-brown", &documents()).await.unwrap();
        built.persist(&path).await.unwrap();

        let loaded = load_index(&path, &embedder).await.unwrap();
        assert_eq!(&loaded.meta, built.meta());

        let query = embedder.embed("HbA1c 6.1 percent on 2025-03-02.").await.unwrap();
        let staged = built.store().retrieve(&query, 3).await.unwrap();
        let persisted = loaded.store().retrieve(&query, 3).await.unwrap();
        assert_eq!(staged.len(), persisted.len());
        for (a, b) in staged.iter().zip(persisted.iter()) {
            assert_eq!(a.fragment.content, b.fragment.content);
            assert_eq!(a.fragment.position, b.fragment.position);
        }
        assert!(persisted[0].fragment.content.contains("HbA1c"));
    }

    #[tokio::test]
    async fn loading_with_a_different_model_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.db");

        let builder = IndexBuilder::new(paragraph_splitter(), Arc::new(MockEmbedder::new()));
        let built = builder.build("sarah-brown", &documents()).await.unwrap();
        built.persist(&path).await.unwrap();

        let other = MockEmbedder::with_model("other-embedder", 8);
        let err = load_index(&path, &other).await.unwrap_err();
        assert!(matches!(err, AnamneseError::Config(_)));
        assert!(err.to_string().contains("mock-embedder"));
    }

    #[tokio::test]
    async fn loading_with_different_dimensions_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.db");

        let builder = IndexBuilder::new(paragraph_splitter(), Arc::new(MockEmbedder::new()));
        let built = builder.build("sarah-brown", &documents()).await.unwrap();
        built.persist(&path).await.unwrap();

        let other = MockEmbedder::with_model("mock-embedder", 16);
        let err = load_index(&path, &other).await.unwrap_err();
        assert!(matches!(err, AnamneseError::Config(_)));
    }

    #[tokio::test]
    async fn loading_a_missing_index_fails_cleanly() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_index(&dir.path().join("missing.db"), &MockEmbedder::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AnamneseError::IndexLoad(_)));
    }

    #[tokio::test]
    async fn fragment_count_mismatch_is_detected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.db");

        let store = SqliteVectorStore::create(&path).unwrap();
        let fragment = Fragment::new("notes", 0, "only one", 0, 8, pseudo_embedding("only one", 8));
        let meta = IndexMeta {
            build_id: "sarah-brown-250825".to_string(),
            record_id: "sarah-brown".to_string(),
            embedding_model: "mock-embedder".to_string(),
            dimensions: 8,
            fragment_count: 5,
            built_at: Utc::now(),
        };
        store.store_build(&meta, &[fragment]).unwrap();
        drop(store);

        let err = load_index(&path, &MockEmbedder::new()).await.unwrap_err();
        assert!(matches!(err, AnamneseError::IndexLoad(_)));
    }
}
