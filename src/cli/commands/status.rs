//! Status command: index, record, and chat configuration at a glance.

use crate::cli::Output;
use crate::config::Settings;
use crate::error::Result;
use crate::vector_store::{SqliteVectorStore, VectorStore};

/// Show the state of the index and the configured record and chat setup.
pub async fn run_status(settings: &Settings) -> Result<()> {
    let db_path = settings.index_db_path();

    Output::header("Index");
    if !db_path.exists() {
        Output::info("No index built yet. Run `anamnese build` to create one.");
    } else {
        let store = SqliteVectorStore::open(&db_path)?;
        match store.read_meta().await? {
            Some(meta) => {
                Output::kv("Build", &meta.build_id);
                Output::kv("Record", &meta.record_id);
                Output::kv(
                    "Embedding model",
                    &format!("{} ({} dims)", meta.embedding_model, meta.dimensions),
                );
                Output::kv("Fragments", &meta.fragment_count.to_string());
                Output::kv("Built at", &meta.built_at.format("%Y-%m-%d %H:%M UTC").to_string());
            }
            None => {
                Output::warning(
                    "Index file exists but has no build metadata; rebuild with `anamnese build --force`",
                );
            }
        }

        let sources = store.list_sources().await?;
        if !sources.is_empty() {
            println!();
            Output::header("Sources");
            for source in &sources {
                Output::source_info(&source.source_id, source.fragment_count);
            }
        }
    }

    println!();
    Output::header("Record");
    match (&settings.record.endpoint, &settings.record.patient_id) {
        (Some(endpoint), Some(patient_id)) => {
            Output::kv("Endpoint", endpoint);
            Output::kv("Patient", patient_id);
        }
        _ => Output::kv("Endpoint", "not configured"),
    }
    if let Some(fallback) = settings.fallback_file() {
        Output::kv("Fallback file", &fallback.display().to_string());
    }

    println!();
    Output::header("Chat");
    match settings.chat.grounding {
        Some(grounding) => Output::kv("Grounding", &grounding.to_string()),
        None => Output::kv("Grounding", "not configured (required before chatting)"),
    }
    Output::kv("Specialty", &settings.chat.specialty.to_string());
    Output::kv("Model", &settings.chat.model);
    Output::kv("Top-k", &settings.chat.top_k.to_string());

    Ok(())
}
