//! Per-conversation state.

use std::sync::Arc;

use crate::config::{GroundingMethod, ProviderSpecialty};
use crate::error::{AnamneseError, Result};
use crate::index::LoadedIndex;

use super::transcript::{Transcript, Turn};

/// Defaults a session falls back to when it has no transcript yet.
#[derive(Debug, Clone, Default)]
pub struct SessionDefaults {
    /// Grounding method for a fresh session. `None` means none configured,
    /// which makes initialization fail rather than silently pick one.
    pub grounding: Option<GroundingMethod>,
    pub specialty: ProviderSpecialty,
}

/// The retrieval half of an initialized rag session.
#[derive(Clone)]
pub(crate) struct RagBinding {
    pub(crate) index: Arc<LoadedIndex>,
}

/// One conversation with one patient record.
///
/// A session starts blank and becomes mode-bound at initialization. After
/// that, its transcript only ever grows; `reset` is the one way back to a
/// blank session.
pub struct ChatSession {
    defaults: SessionDefaults,
    transcript: Option<Transcript>,
    retrieval: Option<RagBinding>,
}

impl ChatSession {
    pub fn new(defaults: SessionDefaults) -> Self {
        Self {
            defaults,
            transcript: None,
            retrieval: None,
        }
    }

    pub fn defaults(&self) -> &SessionDefaults {
        &self.defaults
    }

    pub fn transcript(&self) -> Option<&Transcript> {
        self.transcript.as_ref()
    }

    pub fn is_initialized(&self) -> bool {
        self.transcript.is_some()
    }

    /// Turns meant for display, empty before initialization.
    pub fn visible_turns(&self) -> &[Turn] {
        self.transcript
            .as_ref()
            .map(|t| t.visible_turns())
            .unwrap_or(&[])
    }

    /// Drop all conversation state and adopt new defaults. The next turn
    /// or explicit start initializes from scratch, possibly in a different
    /// mode.
    pub fn reset(&mut self, defaults: SessionDefaults) {
        self.defaults = defaults;
        self.transcript = None;
        self.retrieval = None;
    }

    pub(crate) fn install(&mut self, transcript: Transcript, retrieval: Option<RagBinding>) {
        self.transcript = Some(transcript);
        self.retrieval = retrieval;
    }

    pub(crate) fn require_transcript_mut(&mut self) -> Result<&mut Transcript> {
        self.transcript
            .as_mut()
            .ok_or_else(|| AnamneseError::Chat("Session has no transcript".to_string()))
    }

    pub(crate) fn retrieval(&self) -> Option<&RagBinding> {
        self.retrieval.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_clears_transcript_and_adopts_new_defaults() {
        let mut session = ChatSession::new(SessionDefaults {
            grounding: Some(GroundingMethod::LongContext),
            specialty: ProviderSpecialty::GeneralPractitioner,
        });
        let mut transcript = Transcript::new(GroundingMethod::LongContext);
        transcript.push(Turn::user("record"));
        session.install(transcript, None);
        assert!(session.is_initialized());

        session.reset(SessionDefaults {
            grounding: Some(GroundingMethod::Rag),
            specialty: ProviderSpecialty::Cardiologist,
        });

        assert!(!session.is_initialized());
        assert!(session.visible_turns().is_empty());
        assert_eq!(session.defaults().grounding, Some(GroundingMethod::Rag));
        assert_eq!(
            session.defaults().specialty,
            ProviderSpecialty::Cardiologist
        );
    }
}
