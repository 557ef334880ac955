//! Prompt templates used for chat grounding and response generation.
//!
//! Defaults are compiled in. Any of them can be overridden by TOML files
//! in `prompts.custom_dir` (`chat.toml`, `grounding.toml`), and templates
//! may reference `{{variables}}` defined in `prompts.variables`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::error::Result;

/// All prompt templates, resolved from defaults plus any custom overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Prompts {
    pub chat: ChatPrompts,
    pub grounding: GroundingPrompts,
    /// Custom variables usable in any template.
    #[serde(skip)]
    pub variables: HashMap<String, String>,
}

impl Default for Prompts {
    fn default() -> Self {
        Self {
            chat: ChatPrompts::default(),
            grounding: GroundingPrompts::default(),
            variables: HashMap::new(),
        }
    }
}

/// Templates for response generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatPrompts {
    /// System prompt shared by every model call.
    pub system: String,
    /// Final user message in rag mode. Variables: {{question}}, {{context}}.
    pub retrieval_user: String,
    /// Final user message in rag mode when no excerpts matched.
    /// Variables: {{question}}.
    pub retrieval_empty_user: String,
}

impl Default for ChatPrompts {
    fn default() -> Self {
        Self {
            system: "You are a medical expert who can answer questions on a patient's \
health history and provide analysis based on it.

Guidelines:
- Ground every statement in the patient record provided in this conversation
- Quote concrete values (dates, doses, lab results) when they support an answer
- If the record does not contain the information asked for, say so clearly
- Never invent findings, diagnoses, or medications that are not in the record
- Be concise but thorough"
                .to_string(),
            retrieval_user: "Question: {{question}}

Relevant excerpts from the patient record:

{{context}}

Answer the question using the excerpts above."
                .to_string(),
            retrieval_empty_user: "Question: {{question}}

(No matching excerpts were found in the patient record index.)"
                .to_string(),
        }
    }
}

/// Templates that bind a session to the patient record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GroundingPrompts {
    /// Specialty framing line. Variables: {{specialty}}, {{focus}}.
    pub directive: String,
    /// Long-context opening turn carrying the full record.
    /// Variables: {{directive}}, {{record}}.
    pub record_context: String,
    /// Opening summary instruction, used by both grounding methods.
    pub summary_request: String,
}

impl Default for GroundingPrompts {
    fn default() -> Self {
        Self {
            directive: "You are advising as a {{specialty}}. {{focus}}".to_string(),
            record_context: "{{directive}}

The patient's complete health record follows. Treat it as the sole source of \
truth for this conversation; later questions refer to this record.

--- PATIENT RECORD ---
{{record}}
--- END PATIENT RECORD ---"
                .to_string(),
            summary_request: "Give a brief opening summary of this patient in three parts:
1. A one-paragraph overview of the patient.
2. Active conditions and current medications.
3. Notable results from the most recent encounters."
                .to_string(),
        }
    }
}

impl Prompts {
    /// Load prompts, applying overrides from the custom directory if present.
    pub fn load(custom_dir: Option<&str>, variables: HashMap<String, String>) -> Result<Self> {
        let mut prompts = Prompts::default();

        if let Some(dir) = custom_dir {
            let dir = crate::config::Settings::expand_path(dir);
            if dir.is_dir() {
                if let Some(custom) = load_section::<ChatPrompts>(&dir, "chat.toml")? {
                    prompts.chat = custom;
                }
                if let Some(custom) = load_section::<GroundingPrompts>(&dir, "grounding.toml")? {
                    prompts.grounding = custom;
                }
            }
        }

        prompts.variables = variables;
        Ok(prompts)
    }

    /// Render a template, substituting {{variable}} placeholders.
    pub fn render(template: &str, variables: &HashMap<String, String>) -> String {
        let mut result = template.to_string();
        for (key, value) in variables {
            result = result.replace(&format!("{{{{{}}}}}", key), value);
        }
        result
    }

    /// Render with the loaded custom variables merged in.
    /// Explicitly provided variables win over custom ones.
    pub fn render_with_custom(&self, template: &str, variables: &HashMap<String, String>) -> String {
        let mut merged = self.variables.clone();
        for (key, value) in variables {
            merged.insert(key.clone(), value.clone());
        }
        Self::render(template, &merged)
    }
}

fn load_section<T: serde::de::DeserializeOwned>(dir: &Path, file: &str) -> Result<Option<T>> {
    let path = dir.join(file);
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(&path)?;
    let section: T = toml::from_str(&content)?;
    Ok(Some(section))
}
