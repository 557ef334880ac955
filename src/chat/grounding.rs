//! Grounding mode selection and prompt assembly.

use std::collections::HashMap;

use crate::config::{GroundingMethod, Prompts, ProviderSpecialty};
use crate::error::{AnamneseError, Result};
use crate::record::PatientRecord;

use super::transcript::{Role, Transcript, Turn};
use super::Excerpt;

/// Decide how a session is grounded.
///
/// A transcript that already has turns dictates the mode for the rest of
/// its life; the configured default only applies to fresh sessions. With
/// neither, there is no mode to fall back to and starting is an error.
pub fn select_mode(
    existing: Option<&Transcript>,
    default_choice: Option<GroundingMethod>,
) -> Result<GroundingMethod> {
    match existing {
        Some(transcript) if !transcript.is_empty() => {
            validate_shape(transcript)?;
            Ok(transcript.mode())
        }
        _ => default_choice.ok_or_else(|| {
            AnamneseError::Config(
                "No grounding method configured; set chat.grounding to \"longcontext\" or \"rag\""
                    .to_string(),
            )
        }),
    }
}

/// A transcript's first turn betrays its grounding method: long-context
/// opens with the synthetic user turn carrying the record, rag with the
/// assistant's opening summary.
fn validate_shape(transcript: &Transcript) -> Result<()> {
    let first = match transcript.turns().first() {
        Some(turn) => turn,
        None => return Ok(()),
    };
    let expected = match transcript.mode() {
        GroundingMethod::LongContext => Role::User,
        GroundingMethod::Rag => Role::Assistant,
    };
    if first.role != expected {
        return Err(AnamneseError::ModeInconsistency(format!(
            "{} transcript opens with a {} turn",
            transcript.mode(),
            first.role
        )));
    }
    Ok(())
}

/// Render the specialty framing line used in every system prompt and in
/// the long-context opening turn.
pub(crate) fn specialty_directive(prompts: &Prompts, specialty: ProviderSpecialty) -> String {
    let mut vars = HashMap::new();
    vars.insert("specialty".to_string(), specialty.title().to_string());
    vars.insert("focus".to_string(), specialty.focus().to_string());
    prompts.render_with_custom(&prompts.grounding.directive, &vars)
}

/// Build the long-context opening turn: directive, the full record, and
/// the request for an opening summary, all in one user turn.
pub(crate) fn assemble_record_context(
    prompts: &Prompts,
    record: &PatientRecord,
    specialty: ProviderSpecialty,
) -> Turn {
    let mut vars = HashMap::new();
    vars.insert(
        "directive".to_string(),
        specialty_directive(prompts, specialty),
    );
    vars.insert("record".to_string(), record.text.clone());
    let context = prompts.render_with_custom(&prompts.grounding.record_context, &vars);
    let summary = prompts.render_with_custom(&prompts.grounding.summary_request, &HashMap::new());
    Turn::user(format!("{}\n\n{}", context, summary))
}

/// Build the outgoing user turn for a rag call, folding retrieved excerpts
/// around the question. The transcript keeps the clean question; only the
/// outgoing message carries excerpts.
pub(crate) fn ground_user_turn(prompts: &Prompts, question: &str, excerpts: &[Excerpt]) -> Turn {
    let mut vars = HashMap::new();
    vars.insert("question".to_string(), question.to_string());
    if excerpts.is_empty() {
        return Turn::user(prompts.render_with_custom(&prompts.chat.retrieval_empty_user, &vars));
    }
    vars.insert("context".to_string(), format_excerpts(excerpts));
    Turn::user(prompts.render_with_custom(&prompts.chat.retrieval_user, &vars))
}

fn format_excerpts(excerpts: &[Excerpt]) -> String {
    excerpts
        .iter()
        .enumerate()
        .map(|(i, excerpt)| {
            format!(
                "---\n[{}] {} (fragment {})\n{}\n---",
                i + 1,
                excerpt.source_id,
                excerpt.position,
                excerpt.content
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}
