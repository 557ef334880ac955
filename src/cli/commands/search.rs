//! Direct index search without a model call.

use crate::chat::ChatOrchestrator;
use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::error::Result;

/// Query the index directly and print the ranked fragments.
pub async fn run_search(
    settings: &Settings,
    query: &str,
    limit: usize,
    min_score: Option<f32>,
) -> Result<()> {
    preflight::check(Operation::Search, settings)?;

    let orchestrator = ChatOrchestrator::from_settings(settings)?;

    let spinner = Output::spinner("Searching...");
    let results = orchestrator.search(query, limit, min_score).await;
    spinner.finish_and_clear();
    let results = results?;

    if results.is_empty() {
        Output::warning("No results");
        return Ok(());
    }

    Output::header(&format!("Results for \"{}\"", query));
    for excerpt in &results {
        Output::search_result(
            &excerpt.source_id,
            &format!("chars {}..{}", excerpt.offset_start, excerpt.offset_end),
            excerpt.score,
            &excerpt.content,
        );
    }

    Ok(())
}
