//! Build command: split, embed, and persist the retrieval index.

use std::path::PathBuf;
use std::sync::Arc;

use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::embedding::OpenAIEmbedder;
use crate::error::Result;
use crate::index::IndexBuilder;
use crate::record::{read_documents, HttpRecordSource, RecordSource, SourceDocument};
use crate::splitting::Splitter;

pub async fn run_build(settings: &Settings, input: Vec<PathBuf>, force: bool) -> Result<()> {
    preflight::check(Operation::Build, settings)?;

    let index_path = settings.index_db_path();
    if index_path.exists() && !force {
        Output::warning(&format!("Index already exists at {}", index_path.display()));
        Output::info("Use --force to rebuild");
        return Ok(());
    }

    let spinner = Output::spinner("Reading record...");
    let gathered = gather_documents(settings, input).await;
    spinner.finish_and_clear();
    let (record_id, documents) = gathered?;

    let splitter = Splitter::from_settings(&settings.splitting)?;
    let embedder = Arc::new(OpenAIEmbedder::with_config(
        &settings.embedding.model,
        settings.embedding.dimensions,
    ));
    let builder = IndexBuilder::new(splitter, embedder);

    let spinner = Output::spinner("Splitting and embedding...");
    let built = builder.build(&record_id, &documents).await;
    spinner.finish_and_clear();
    let built = built?;

    let spinner = Output::spinner("Persisting index...");
    let persisted = built.persist(&index_path).await;
    spinner.finish_and_clear();
    persisted?;

    let meta = built.meta();
    Output::success(&format!("Built index {}", meta.build_id));
    Output::kv("Record", &meta.record_id);
    Output::kv("Fragments", &meta.fragment_count.to_string());
    Output::kv(
        "Embedding model",
        &format!("{} ({} dims)", meta.embedding_model, meta.dimensions),
    );
    Output::kv("Path", &index_path.display().to_string());
    Ok(())
}

/// Either the configured record or explicitly given files.
async fn gather_documents(
    settings: &Settings,
    input: Vec<PathBuf>,
) -> Result<(String, Vec<SourceDocument>)> {
    if input.is_empty() {
        let source = HttpRecordSource::from_settings(&settings.record)?;
        let record = source.fetch().await?;
        let record_id = record.patient_id.clone();
        let documents = vec![SourceDocument {
            source_id: record.patient_id,
            text: record.text,
        }];
        Ok((record_id, documents))
    } else {
        let documents = read_documents(&input)?;
        let record_id = settings
            .record
            .patient_id
            .clone()
            .or_else(|| documents.first().map(|d| d.source_id.clone()))
            .unwrap_or_else(|| "record".to_string());
        Ok((record_id, documents))
    }
}
