//! SQLite-backed vector store.
//!
//! Fragments and build metadata live in one database file. Embeddings are
//! stored as little-endian f32 blobs; similarity is computed in process
//! after loading candidates in position order.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::error::{AnamneseError, Result};

use super::{rank_fragments, Fragment, IndexMeta, IndexedSource, SearchResult, VectorStore};

/// SQLite-backed vector store.
#[derive(Debug)]
pub struct SqliteVectorStore {
    conn: Mutex<Connection>,
}

impl SqliteVectorStore {
    /// Create or open a store at the given path, initializing the schema.
    pub fn create(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(db_path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Open an existing store. The file must already exist; building writes
    /// it, loading only reads.
    pub fn open(db_path: &Path) -> Result<Self> {
        if !db_path.exists() {
            return Err(AnamneseError::IndexLoad(format!(
                "No index at {}",
                db_path.display()
            )));
        }
        let conn = Connection::open(db_path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        // Idempotent; a file without tables then reads as an empty,
        // metadata-less index instead of a query error.
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory store, useful for staging and tests.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| AnamneseError::VectorStore(format!("Failed to acquire lock: {}", e)))
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.conn()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS fragments (
                id TEXT PRIMARY KEY,
                source_id TEXT NOT NULL,
                position INTEGER NOT NULL,
                content TEXT NOT NULL,
                offset_start INTEGER NOT NULL,
                offset_end INTEGER NOT NULL,
                embedding BLOB NOT NULL,
                indexed_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_fragments_source ON fragments(source_id);
            CREATE INDEX IF NOT EXISTS idx_fragments_position ON fragments(position);

            CREATE TABLE IF NOT EXISTS index_meta (
                key INTEGER PRIMARY KEY CHECK (key = 0),
                build_id TEXT NOT NULL,
                record_id TEXT NOT NULL,
                embedding_model TEXT NOT NULL,
                dimensions INTEGER NOT NULL,
                fragment_count INTEGER NOT NULL,
                built_at TEXT NOT NULL
            );
            "#,
        )?;
        Ok(())
    }

    /// Replace the store contents with a finished build, atomically.
    ///
    /// Existing fragments, the new ones, and the metadata row all move in a
    /// single transaction. A crash mid-write leaves the previous build
    /// intact rather than a half-written index.
    #[instrument(skip(self, meta, fragments), fields(count = fragments.len()))]
    pub fn store_build(&self, meta: &IndexMeta, fragments: &[Fragment]) -> Result<()> {
        let conn = self.conn()?;
        let tx = conn.unchecked_transaction()?;

        tx.execute("DELETE FROM fragments", [])?;
        tx.execute("DELETE FROM index_meta", [])?;

        {
            let mut stmt = tx.prepare(
                "INSERT INTO fragments
                 (id, source_id, position, content, offset_start, offset_end, embedding, indexed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )?;
            for fragment in fragments {
                stmt.execute(params![
                    fragment.id.to_string(),
                    fragment.source_id,
                    fragment.position,
                    fragment.content,
                    fragment.offset_start,
                    fragment.offset_end,
                    embedding_to_bytes(&fragment.embedding),
                    fragment.indexed_at.to_rfc3339(),
                ])?;
            }
        }

        tx.execute(
            "INSERT INTO index_meta
             (key, build_id, record_id, embedding_model, dimensions, fragment_count, built_at)
             VALUES (0, ?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                meta.build_id,
                meta.record_id,
                meta.embedding_model,
                meta.dimensions,
                meta.fragment_count,
                meta.built_at.to_rfc3339(),
            ],
        )?;

        tx.commit()?;
        debug!(build_id = %meta.build_id, "Stored index build");
        Ok(())
    }
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn insert_batch(&self, fragments: &[Fragment]) -> Result<usize> {
        let conn = self.conn()?;
        let tx = conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO fragments
                 (id, source_id, position, content, offset_start, offset_end, embedding, indexed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )?;
            for fragment in fragments {
                stmt.execute(params![
                    fragment.id.to_string(),
                    fragment.source_id,
                    fragment.position,
                    fragment.content,
                    fragment.offset_start,
                    fragment.offset_end,
                    embedding_to_bytes(&fragment.embedding),
                    fragment.indexed_at.to_rfc3339(),
                ])?;
            }
        }
        tx.commit()?;
        Ok(fragments.len())
    }

    async fn retrieve(&self, query_embedding: &[f32], k: usize) -> Result<Vec<SearchResult>> {
        let candidates = self.all_fragments().await?;
        Ok(rank_fragments(candidates, query_embedding, k, f32::NEG_INFINITY))
    }

    async fn retrieve_with_threshold(
        &self,
        query_embedding: &[f32],
        k: usize,
        min_score: f32,
    ) -> Result<Vec<SearchResult>> {
        let candidates = self.all_fragments().await?;
        Ok(rank_fragments(candidates, query_embedding, k, min_score))
    }

    async fn list_sources(&self) -> Result<Vec<IndexedSource>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT source_id, COUNT(*), MAX(indexed_at)
             FROM fragments GROUP BY source_id ORDER BY MIN(position)",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(IndexedSource {
                source_id: row.get(0)?,
                fragment_count: row.get(1)?,
                indexed_at: parse_timestamp(&row.get::<_, String>(2)?),
            })
        })?;
        let mut sources = Vec::new();
        for row in rows {
            sources.push(row?);
        }
        Ok(sources)
    }

    async fn fragment_count(&self) -> Result<u32> {
        let conn = self.conn()?;
        let count: u32 = conn.query_row("SELECT COUNT(*) FROM fragments", [], |row| row.get(0))?;
        Ok(count)
    }

    async fn all_fragments(&self) -> Result<Vec<Fragment>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, source_id, position, content, offset_start, offset_end, embedding, indexed_at
             FROM fragments ORDER BY position",
        )?;
        let rows = stmt.query_map([], fragment_from_row)?;
        let mut fragments = Vec::new();
        for row in rows {
            fragments.push(row?);
        }
        Ok(fragments)
    }

    async fn write_meta(&self, meta: &IndexMeta) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO index_meta
             (key, build_id, record_id, embedding_model, dimensions, fragment_count, built_at)
             VALUES (0, ?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                meta.build_id,
                meta.record_id,
                meta.embedding_model,
                meta.dimensions,
                meta.fragment_count,
                meta.built_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    async fn read_meta(&self) -> Result<Option<IndexMeta>> {
        let conn = self.conn()?;
        let result = conn.query_row(
            "SELECT build_id, record_id, embedding_model, dimensions, fragment_count, built_at
             FROM index_meta WHERE key = 0",
            [],
            |row| {
                Ok(IndexMeta {
                    build_id: row.get(0)?,
                    record_id: row.get(1)?,
                    embedding_model: row.get(2)?,
                    dimensions: row.get(3)?,
                    fragment_count: row.get(4)?,
                    built_at: parse_timestamp(&row.get::<_, String>(5)?),
                })
            },
        );
        match result {
            Ok(meta) => Ok(Some(meta)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

fn fragment_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Fragment> {
    let id: String = row.get(0)?;
    let embedding: Vec<u8> = row.get(6)?;
    let indexed_at: String = row.get(7)?;
    Ok(Fragment {
        id: Uuid::parse_str(&id).unwrap_or_default(),
        source_id: row.get(1)?,
        position: row.get(2)?,
        content: row.get(3)?,
        offset_start: row.get(4)?,
        offset_end: row.get(5)?,
        embedding: bytes_to_embedding(&embedding),
        indexed_at: parse_timestamp(&indexed_at),
    })
}

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

fn bytes_to_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}
