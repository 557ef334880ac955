//! Conversational interface over the patient record.
//!
//! A session is grounded in exactly one of two ways, fixed at
//! initialization: long-context (the whole record rides in the first turn)
//! or rag (excerpts are retrieved from the index per question). The
//! [`ChatOrchestrator`] owns the shared machinery; [`ChatSession`] holds
//! per-conversation state and can back a CLI loop or an HTTP session alike.

mod grounding;
mod model;
mod orchestrator;
mod session;
mod transcript;

pub use grounding::select_mode;
pub use model::{ChatModel, OpenAIChatModel};
pub use orchestrator::{Answer, ChatOrchestrator};
pub use session::{ChatSession, SessionDefaults};
pub use transcript::{Role, Transcript, Turn};

use serde::{Deserialize, Serialize};

use crate::vector_store::SearchResult;

/// A retrieved record excerpt, as handed to prompts and API clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Excerpt {
    pub source_id: String,
    pub position: i64,
    pub score: f32,
    pub content: String,
    pub offset_start: i64,
    pub offset_end: i64,
}

impl From<SearchResult> for Excerpt {
    fn from(result: SearchResult) -> Self {
        Self {
            source_id: result.fragment.source_id,
            position: result.fragment.position,
            score: result.score,
            content: result.fragment.content,
            offset_start: result.fragment.offset_start,
            offset_end: result.fragment.offset_end,
        }
    }
}
