//! FHIR endpoint record source with local file fallback.

use async_trait::async_trait;
use regex::Regex;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use crate::config::RecordSettings;
use crate::error::{AnamneseError, Result};

use super::{PatientRecord, RecordSource};

const FETCH_TIMEOUT_SECS: u64 = 30;

/// Fetches a patient's `$everything` bundle from a FHIR endpoint.
///
/// When the endpoint is unreachable (or not configured at all), the
/// configured fallback file serves the record instead, so a previously
/// exported bundle keeps the assistant usable offline.
#[derive(Debug)]
pub struct HttpRecordSource {
    client: reqwest::Client,
    endpoint: Option<Url>,
    patient_id: String,
    token_env: String,
    fallback: Option<PathBuf>,
}

impl HttpRecordSource {
    /// Build a record source from configuration.
    ///
    /// Requires either an endpoint with a patient id, or a fallback file.
    pub fn from_settings(settings: &RecordSettings) -> Result<Self> {
        let endpoint = settings
            .endpoint
            .as_deref()
            .map(|raw| {
                Url::parse(raw).map_err(|e| {
                    AnamneseError::Config(format!("Invalid record endpoint URL {}: {}", raw, e))
                })
            })
            .transpose()?;

        let patient_id = settings.patient_id.clone().unwrap_or_default();
        if !patient_id.is_empty() {
            validate_patient_id(&patient_id)?;
        }

        let fallback = settings
            .fallback_file
            .as_deref()
            .map(crate::config::Settings::expand_path);

        if (endpoint.is_none() || patient_id.is_empty()) && fallback.is_none() {
            return Err(AnamneseError::Config(
                "No record source configured. Set record.endpoint and record.patient_id, \
                 or record.fallback_file"
                    .to_string(),
            ));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(FETCH_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            endpoint,
            patient_id,
            token_env: settings.token_env.clone(),
            fallback,
        })
    }

    async fn fetch_remote(&self, endpoint: &Url) -> Result<String> {
        let url = format!(
            "{}/Patient/{}/$everything",
            endpoint.as_str().trim_end_matches('/'),
            self.patient_id
        );
        debug!(url = %url, "Fetching patient record");

        let mut request = self
            .client
            .get(&url)
            .header("Accept", "application/fhir+json");
        if let Ok(token) = std::env::var(&self.token_env) {
            if !token.is_empty() {
                request = request.bearer_auth(token);
            }
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(AnamneseError::RecordUnavailable(format!(
                "FHIR endpoint returned {} for {}",
                response.status(),
                url
            )));
        }
        Ok(response.text().await?)
    }

    async fn fetch_fallback(&self, path: &PathBuf) -> Result<String> {
        tokio::fs::read_to_string(path).await.map_err(|e| {
            AnamneseError::RecordUnavailable(format!(
                "Failed to read fallback record {}: {}",
                path.display(),
                e
            ))
        })
    }
}

#[async_trait]
impl RecordSource for HttpRecordSource {
    async fn fetch(&self) -> Result<PatientRecord> {
        let text = match (&self.endpoint, &self.fallback) {
            (Some(endpoint), fallback) => match self.fetch_remote(endpoint).await {
                Ok(text) => text,
                Err(e) => match fallback {
                    Some(path) => {
                        warn!(error = %e, "Endpoint fetch failed, using fallback file");
                        self.fetch_fallback(path).await?
                    }
                    None => return Err(e),
                },
            },
            (None, Some(path)) => self.fetch_fallback(path).await?,
            (None, None) => {
                return Err(AnamneseError::RecordUnavailable(
                    "No record source configured".to_string(),
                ))
            }
        };

        Ok(PatientRecord {
            patient_id: self.record_id().to_string(),
            text,
        })
    }

    fn record_id(&self) -> &str {
        if self.patient_id.is_empty() {
            self.fallback
                .as_deref()
                .and_then(|p| p.file_stem())
                .and_then(|s| s.to_str())
                .unwrap_or("record")
        } else {
            &self.patient_id
        }
    }
}

/// FHIR ids allow letters, digits, hyphens, and dots, up to 64 characters.
fn validate_patient_id(id: &str) -> Result<()> {
    let pattern = Regex::new(r"^[A-Za-z0-9\-\.]{1,64}$").expect("Invalid patient id regex");
    if pattern.is_match(id) {
        Ok(())
    } else {
        Err(AnamneseError::Config(format!(
            "Invalid FHIR patient id: {}",
            id
        )))
    }
}
