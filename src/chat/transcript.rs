//! Conversation transcripts.

use serde::{Deserialize, Serialize};

use crate::config::GroundingMethod;

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// One conversation turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// An append-only conversation transcript, tagged with the grounding
/// method it was built under. Turns are never trimmed or reordered; every
/// model call in long-context mode resends the whole transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transcript {
    mode: GroundingMethod,
    turns: Vec<Turn>,
}

impl Transcript {
    pub fn new(mode: GroundingMethod) -> Self {
        Self {
            mode,
            turns: Vec::new(),
        }
    }

    pub fn mode(&self) -> GroundingMethod {
        self.mode
    }

    pub fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    /// Turns meant for display. In long-context mode the first turn is the
    /// synthetic record carrier and stays hidden.
    pub fn visible_turns(&self) -> &[Turn] {
        match self.mode {
            GroundingMethod::LongContext if !self.turns.is_empty() => &self.turns[1..],
            _ => &self.turns,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn turns_append_in_order() {
        let mut transcript = Transcript::new(GroundingMethod::Rag);
        transcript.push(Turn::assistant("summary"));
        transcript.push(Turn::user("question"));
        transcript.push(Turn::assistant("answer"));

        assert_eq!(transcript.len(), 3);
        assert_eq!(transcript.turns()[0].role, Role::Assistant);
        assert_eq!(transcript.last().map(|t| t.content.as_str()), Some("answer"));
    }

    #[test]
    fn long_context_hides_the_record_turn() {
        let mut transcript = Transcript::new(GroundingMethod::LongContext);
        transcript.push(Turn::user("record and summary request"));
        transcript.push(Turn::assistant("summary"));
        transcript.push(Turn::user("question"));

        let visible = transcript.visible_turns();
        assert_eq!(visible.len(), 2);
        assert_eq!(visible[0].role, Role::Assistant);
    }

    #[test]
    fn rag_transcript_is_fully_visible() {
        let mut transcript = Transcript::new(GroundingMethod::Rag);
        transcript.push(Turn::assistant("summary"));

        assert_eq!(transcript.visible_turns().len(), 1);
    }

    #[test]
    fn empty_long_context_transcript_is_safely_visible() {
        let transcript = Transcript::new(GroundingMethod::LongContext);
        assert!(transcript.visible_turns().is_empty());
    }
}
