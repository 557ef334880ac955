//! Configuration settings for Anamnese.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub general: GeneralSettings,
    pub record: RecordSettings,
    pub splitting: SplittingSettings,
    pub embedding: EmbeddingSettings,
    pub index: IndexSettings,
    pub chat: ChatSettings,
    pub prompts: PromptSettings,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralSettings {
    /// Directory for storing application data.
    pub data_dir: String,
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            data_dir: "~/.anamnese".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// How a conversation is grounded in the patient record.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GroundingMethod {
    /// The full record is placed in the model context at session start.
    LongContext,
    /// Relevant record fragments are retrieved from a vector index per turn.
    Rag,
}

impl std::str::FromStr for GroundingMethod {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "longcontext" | "long-context" | "long_context" | "lc" => {
                Ok(GroundingMethod::LongContext)
            }
            "rag" | "retrieval" => Ok(GroundingMethod::Rag),
            _ => Err(format!("Unknown grounding method: {}", s)),
        }
    }
}

impl std::fmt::Display for GroundingMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GroundingMethod::LongContext => write!(f, "longcontext"),
            GroundingMethod::Rag => write!(f, "rag"),
        }
    }
}

/// Clinician role that shapes how the assistant reads the record.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderSpecialty {
    #[default]
    GeneralPractitioner,
    Cardiologist,
    Endocrinologist,
    Neurologist,
    Oncologist,
    Pharmacist,
}

impl ProviderSpecialty {
    /// Human-readable role name used in prompts.
    pub fn title(&self) -> &'static str {
        match self {
            ProviderSpecialty::GeneralPractitioner => "general practitioner",
            ProviderSpecialty::Cardiologist => "cardiologist",
            ProviderSpecialty::Endocrinologist => "endocrinologist",
            ProviderSpecialty::Neurologist => "neurologist",
            ProviderSpecialty::Oncologist => "oncologist",
            ProviderSpecialty::Pharmacist => "pharmacist",
        }
    }

    /// What this role looks for first when reading a chart.
    pub fn focus(&self) -> &'static str {
        match self {
            ProviderSpecialty::GeneralPractitioner => {
                "Weigh the whole record: history, active conditions, medications, and recent results."
            }
            ProviderSpecialty::Cardiologist => {
                "Pay particular attention to cardiovascular findings, blood pressure history, lipid panels, and cardiac medications."
            }
            ProviderSpecialty::Endocrinologist => {
                "Pay particular attention to metabolic and hormonal findings, glucose and HbA1c values, and related medications."
            }
            ProviderSpecialty::Neurologist => {
                "Pay particular attention to neurological findings, imaging reports, and medications acting on the nervous system."
            }
            ProviderSpecialty::Oncologist => {
                "Pay particular attention to tumor-related findings, staging, pathology reports, and treatment history."
            }
            ProviderSpecialty::Pharmacist => {
                "Pay particular attention to the medication list, dosages, potential interactions, and adherence signals."
            }
        }
    }
}

impl std::str::FromStr for ProviderSpecialty {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "general-practitioner" | "general_practitioner" | "gp" => {
                Ok(ProviderSpecialty::GeneralPractitioner)
            }
            "cardiologist" => Ok(ProviderSpecialty::Cardiologist),
            "endocrinologist" => Ok(ProviderSpecialty::Endocrinologist),
            "neurologist" => Ok(ProviderSpecialty::Neurologist),
            "oncologist" => Ok(ProviderSpecialty::Oncologist),
            "pharmacist" => Ok(ProviderSpecialty::Pharmacist),
            _ => Err(format!("Unknown provider specialty: {}", s)),
        }
    }
}

impl std::fmt::Display for ProviderSpecialty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderSpecialty::GeneralPractitioner => write!(f, "general-practitioner"),
            ProviderSpecialty::Cardiologist => write!(f, "cardiologist"),
            ProviderSpecialty::Endocrinologist => write!(f, "endocrinologist"),
            ProviderSpecialty::Neurologist => write!(f, "neurologist"),
            ProviderSpecialty::Oncologist => write!(f, "oncologist"),
            ProviderSpecialty::Pharmacist => write!(f, "pharmacist"),
        }
    }
}

/// Where the patient record comes from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordSettings {
    /// FHIR patient identifier.
    pub patient_id: Option<String>,
    /// Base URL of the FHIR endpoint (e.g. "https://fhir.example.org/r4").
    /// When unset, only the local fallback file is used.
    pub endpoint: Option<String>,
    /// Environment variable holding the bearer token for the endpoint.
    pub token_env: String,
    /// Local bundle file used when the endpoint is unavailable or unset.
    pub fallback_file: Option<String>,
}

impl Default for RecordSettings {
    fn default() -> Self {
        Self {
            patient_id: None,
            endpoint: None,
            token_env: "FHIR_ACCESS_TOKEN".to_string(),
            fallback_file: None,
        }
    }
}

/// How record text is split into index fragments.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SplittingSettings {
    /// Splitting strategy (paragraph, fixed).
    pub strategy: String,
    /// Target fragment length in characters.
    pub target_chars: usize,
    /// Overlap between adjacent fixed-window fragments, in characters.
    pub overlap_chars: usize,
    /// Minimum fragment length in characters.
    pub min_chars: usize,
}

impl Default for SplittingSettings {
    fn default() -> Self {
        Self {
            strategy: "paragraph".to_string(),
            target_chars: 1200,
            overlap_chars: 200,
            min_chars: 64,
        }
    }
}

/// Embedding generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    /// Embedding provider (openai).
    pub provider: String,
    /// Embedding model to use.
    pub model: String,
    /// Embedding dimensions.
    pub dimensions: u32,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "text-embedding-3-small".to_string(),
            dimensions: 1536,
        }
    }
}

/// Persisted index settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexSettings {
    /// Path to the SQLite index database.
    pub db_path: String,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            db_path: "~/.anamnese/index.db".to_string(),
        }
    }
}

/// Conversation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatSettings {
    /// Default grounding method for new sessions. Sessions cannot start
    /// without one, either here or as a per-session override.
    pub grounding: Option<GroundingMethod>,
    /// Clinician role shaping the assistant's reading of the record.
    pub specialty: ProviderSpecialty,
    /// LLM model for response generation.
    pub model: String,
    /// Number of record fragments retrieved per question in rag mode.
    pub top_k: usize,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            grounding: None,
            specialty: ProviderSpecialty::GeneralPractitioner,
            model: "gpt-4o-mini".to_string(),
            top_k: 30,
        }
    }
}

/// Prompt customization settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptSettings {
    /// Directory for custom prompts (overrides defaults).
    pub custom_dir: Option<String>,
    /// Custom variables available in all prompts as {{variable_name}}.
    pub variables: std::collections::HashMap<String, String>,
}

impl Settings {
    /// Load settings from the default configuration file.
    pub fn load() -> crate::error::Result<Self> {
        Self::load_from(None)
    }

    /// Load settings from a specific path, or default location if None.
    pub fn load_from(path: Option<&PathBuf>) -> crate::error::Result<Self> {
        let config_path = match path {
            Some(p) => p.clone(),
            None => Self::default_config_path(),
        };

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let settings: Settings = toml::from_str(&content)?;
            Ok(settings)
        } else {
            Ok(Settings::default())
        }
    }

    /// Save settings to the default configuration file.
    pub fn save(&self) -> crate::error::Result<()> {
        self.save_to(&Self::default_config_path())
    }

    /// Save settings to a specific path.
    pub fn save_to(&self, path: &PathBuf) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::AnamneseError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the default configuration file path.
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("anamnese")
            .join("config.toml")
    }

    /// Expand shell variables in paths (e.g., ~).
    pub fn expand_path(path: &str) -> PathBuf {
        PathBuf::from(shellexpand::tilde(path).to_string())
    }

    /// Get the expanded data directory path.
    pub fn data_dir(&self) -> PathBuf {
        Self::expand_path(&self.general.data_dir)
    }

    /// Get the expanded index database path.
    pub fn index_db_path(&self) -> PathBuf {
        Self::expand_path(&self.index.db_path)
    }

    /// Get the expanded fallback bundle path, if configured.
    pub fn fallback_file(&self) -> Option<PathBuf> {
        self.record.fallback_file.as_deref().map(Self::expand_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grounding_method_parses_common_spellings() {
        assert_eq!(
            "longcontext".parse::<GroundingMethod>(),
            Ok(GroundingMethod::LongContext)
        );
        assert_eq!(
            "long-context".parse::<GroundingMethod>(),
            Ok(GroundingMethod::LongContext)
        );
        assert_eq!("rag".parse::<GroundingMethod>(), Ok(GroundingMethod::Rag));
        assert_eq!(
            "retrieval".parse::<GroundingMethod>(),
            Ok(GroundingMethod::Rag)
        );
        assert!("vibes".parse::<GroundingMethod>().is_err());
    }

    #[test]
    fn specialty_parses_short_form() {
        assert_eq!(
            "gp".parse::<ProviderSpecialty>(),
            Ok(ProviderSpecialty::GeneralPractitioner)
        );
        assert_eq!(
            "cardiologist".parse::<ProviderSpecialty>(),
            Ok(ProviderSpecialty::Cardiologist)
        );
    }

    #[test]
    fn default_chat_settings_have_no_grounding_method() {
        let settings = Settings::default();
        assert!(settings.chat.grounding.is_none());
        assert_eq!(settings.chat.top_k, 30);
    }

    #[test]
    fn settings_roundtrip_through_toml() {
        let mut settings = Settings::default();
        settings.chat.grounding = Some(GroundingMethod::Rag);
        settings.record.patient_id = Some("sarah-brown".to_string());

        let text = toml::to_string_pretty(&settings).unwrap();
        let parsed: Settings = toml::from_str(&text).unwrap();

        assert_eq!(parsed.chat.grounding, Some(GroundingMethod::Rag));
        assert_eq!(parsed.record.patient_id.as_deref(), Some("sarah-brown"));
    }
}
