//! One-shot question answering over the index.

use crate::chat::ChatOrchestrator;
use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::{ProviderSpecialty, Settings};
use crate::error::Result;

/// Answer a single question against the index without keeping a session.
pub async fn run_ask(
    settings: &Settings,
    question: &str,
    specialty: Option<ProviderSpecialty>,
    top_k: Option<usize>,
    model: Option<String>,
) -> Result<()> {
    preflight::check(Operation::Ask, settings)?;

    let mut settings = settings.clone();
    if let Some(model) = model {
        settings.chat.model = model;
    }
    if let Some(top_k) = top_k {
        settings.chat.top_k = top_k;
    }
    let specialty = specialty.unwrap_or(settings.chat.specialty);

    let orchestrator = ChatOrchestrator::from_settings(&settings)?;

    let spinner = Output::spinner("Retrieving and answering...");
    let answer = orchestrator.answer_once(question, specialty).await;
    spinner.finish_and_clear();
    let answer = answer?;

    println!("{}", answer.text);

    if !answer.sources.is_empty() {
        println!();
        Output::header("Sources");
        for excerpt in &answer.sources {
            Output::search_result(
                &excerpt.source_id,
                &format!("chars {}..{}", excerpt.offset_start, excerpt.offset_end),
                excerpt.score,
                &excerpt.content,
            );
        }
    }

    Ok(())
}
