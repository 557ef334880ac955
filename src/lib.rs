//! Anamnese - Conversational Access to a Patient Record
//!
//! A CLI tool and library for answering questions about a single patient's
//! health record, grounded either by placing the full record in the model
//! context or by retrieving relevant fragments from a vector index.
//!
//! The name "Anamnese" is the clinical term for a patient's own account of
//! their medical history.
//!
//! # Overview
//!
//! Anamnese allows you to:
//! - Fetch a patient record from a FHIR endpoint or a local file
//! - Build a searchable vector index over the record
//! - Chat with the record as a clinician of a chosen specialty
//! - Ask one-shot questions and get answers with cited excerpts
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - `config` - Configuration and prompt management
//! - `record` - Patient record sources (FHIR endpoint, local files)
//! - `splitting` - Record splitting into indexable fragments
//! - `embedding` - Embedding generation
//! - `vector_store` - Vector index abstraction and SQLite persistence
//! - `index` - Index building, persistence, and loading
//! - `chat` - Grounded chat sessions and the orchestrator
//!
//! # Example
//!
//! ```rust,no_run
//! use anamnese::chat::{ChatOrchestrator, ChatSession, SessionDefaults};
//! use anamnese::config::{GroundingMethod, Settings};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = Settings::load()?;
//!     let orchestrator = ChatOrchestrator::from_settings(&settings)?;
//!
//!     let mut session = ChatSession::new(SessionDefaults {
//!         grounding: Some(GroundingMethod::LongContext),
//!         ..Default::default()
//!     });
//!
//!     if let Some(summary) = orchestrator.start(&mut session).await? {
//!         println!("{}", summary);
//!     }
//!     let reply = orchestrator
//!         .handle_turn(&mut session, "What medications is the patient on?")
//!         .await?;
//!     println!("{}", reply);
//!
//!     Ok(())
//! }
//! ```

pub mod chat;
pub mod cli;
pub mod config;
pub mod embedding;
pub mod error;
pub mod index;
pub mod openai;
pub mod record;
pub mod splitting;
pub mod vector_store;

pub use error::{AnamneseError, Result};
