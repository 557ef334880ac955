//! Error types for Anamnese.

use thiserror::Error;

/// Library-level error type for Anamnese operations.
///
/// Variants carry the phase that failed, so callers can tell a record
/// fetch problem from an index problem from a model problem.
#[derive(Error, Debug)]
pub enum AnamneseError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Patient record unavailable: {0}")]
    RecordUnavailable(String),

    #[error("Document ingestion failed: {0}")]
    Ingest(String),

    #[error("Embedding generation failed: {0}")]
    Embedding(String),

    #[error("Vector store error: {0}")]
    VectorStore(String),

    #[error("Index load failed: {0}")]
    IndexLoad(String),

    #[error("Chat generation failed: {0}")]
    Chat(String),

    #[error("Transcript does not match its grounding mode: {0}")]
    ModeInconsistency(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("OpenAI API error: {0}")]
    OpenAI(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Result type alias for Anamnese operations.
pub type Result<T> = std::result::Result<T, AnamneseError>;
