//! Patient record acquisition.
//!
//! A record arrives either from a FHIR endpoint or from local files. Either
//! way the rest of the pipeline sees plain text: the full record for
//! long-context grounding, or per-file documents for indexing.

use async_trait::async_trait;
use std::path::PathBuf;

use crate::error::{AnamneseError, Result};

mod http;

pub use http::HttpRecordSource;

/// A complete patient record as one block of text.
#[derive(Debug, Clone)]
pub struct PatientRecord {
    pub patient_id: String,
    pub text: String,
}

/// One input document destined for the index.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    /// Stable identifier, carried into every fragment cut from this document.
    pub source_id: String,
    pub text: String,
}

/// Something that can produce the patient record.
#[async_trait]
pub trait RecordSource: Send + Sync {
    /// Fetch the full record text.
    async fn fetch(&self) -> Result<PatientRecord>;

    /// Identifier of the record this source serves.
    fn record_id(&self) -> &str;
}

/// Record source backed by a single local file.
pub struct FileRecordSource {
    path: PathBuf,
    record_id: String,
}

impl FileRecordSource {
    pub fn new(path: PathBuf) -> Self {
        let record_id = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "record".to_string());
        Self { path, record_id }
    }
}

#[async_trait]
impl RecordSource for FileRecordSource {
    async fn fetch(&self) -> Result<PatientRecord> {
        let text = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            AnamneseError::RecordUnavailable(format!(
                "Failed to read record file {}: {}",
                self.path.display(),
                e
            ))
        })?;
        Ok(PatientRecord {
            patient_id: self.record_id.clone(),
            text,
        })
    }

    fn record_id(&self) -> &str {
        &self.record_id
    }
}

/// Read a set of input files into source documents, in the given order.
/// Each document's `source_id` is the file stem.
pub fn read_documents(paths: &[PathBuf]) -> Result<Vec<SourceDocument>> {
    let mut documents = Vec::with_capacity(paths.len());
    for path in paths {
        let text = std::fs::read_to_string(path).map_err(|e| {
            AnamneseError::RecordUnavailable(format!(
                "Failed to read input file {}: {}",
                path.display(),
                e
            ))
        })?;
        let source_id = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "document".to_string());
        documents.push(SourceDocument { source_id, text });
    }
    Ok(documents)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_documents_uses_file_stems() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("encounters.txt");
        let b = dir.path().join("labs.txt");
        std::fs::write(&a, "encounter notes").unwrap();
        std::fs::write(&b, "lab values").unwrap();

        let docs = read_documents(&[a, b]).unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].source_id, "encounters");
        assert_eq!(docs[1].source_id, "labs");
        assert_eq!(docs[1].text, "lab values");
    }

    #[test]
    fn read_documents_reports_missing_file() {
        let err = read_documents(&[PathBuf::from("/nonexistent/bundle.json")]).unwrap_err();
        assert!(matches!(err, AnamneseError::RecordUnavailable(_)));
        assert!(err.to_string().contains("bundle.json"));
    }

    #[tokio::test]
    async fn file_record_source_fetches_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sarah-brown-bundle.json");
        std::fs::write(&path, "{\"resourceType\":\"Bundle\"}").unwrap();

        let source = FileRecordSource::new(path);
        assert_eq!(source.record_id(), "sarah-brown-bundle");
        let record = source.fetch().await.unwrap();
        assert!(record.text.contains("Bundle"));
    }
}
