//! Doctor command - verify configuration, record source, and index health.

use crate::cli::Output;
use crate::config::Settings;
use crate::error::Result;
use crate::vector_store::{SqliteVectorStore, VectorStore};
use console::style;

/// Check result for a single item.
#[derive(Debug)]
pub struct CheckResult {
    pub name: String,
    pub status: CheckStatus,
    pub message: String,
    pub hint: Option<String>,
}

#[derive(Debug, PartialEq)]
pub enum CheckStatus {
    Ok,
    Warning,
    Error,
}

impl CheckResult {
    fn ok(name: &str, message: &str) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Ok,
            message: message.to_string(),
            hint: None,
        }
    }

    fn warning(name: &str, message: &str, hint: &str) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Warning,
            message: message.to_string(),
            hint: Some(hint.to_string()),
        }
    }

    fn error(name: &str, message: &str, hint: &str) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Error,
            message: message.to_string(),
            hint: Some(hint.to_string()),
        }
    }

    fn print(&self) {
        let icon = match self.status {
            CheckStatus::Ok => style("✓").green(),
            CheckStatus::Warning => style("!").yellow(),
            CheckStatus::Error => style("✗").red(),
        };

        println!("  {} {} - {}", icon, style(&self.name).bold(), self.message);

        if let Some(hint) = &self.hint {
            println!("    {} {}", style("→").dim(), style(hint).dim());
        }
    }
}

/// Run all diagnostic checks.
pub async fn run_doctor(settings: &Settings) -> Result<()> {
    Output::header("Anamnese Doctor");
    println!();
    println!("Checking configuration and index health...\n");

    let mut checks = Vec::new();

    println!("{}", style("API Configuration").bold());
    let api_check = check_openai_api_key();
    api_check.print();
    checks.push(api_check);

    println!();

    println!("{}", style("Record Source").bold());
    let record_checks = check_record_source(settings);
    for check in &record_checks {
        check.print();
    }
    checks.extend(record_checks);

    println!();

    println!("{}", style("Index").bold());
    let index_check = check_index(settings).await;
    index_check.print();
    checks.push(index_check);

    println!();

    println!("{}", style("Configuration").bold());
    let config_checks = check_configuration(settings);
    for check in &config_checks {
        check.print();
    }
    checks.extend(config_checks);

    println!();

    let errors = checks.iter().filter(|c| c.status == CheckStatus::Error).count();
    let warnings = checks.iter().filter(|c| c.status == CheckStatus::Warning).count();

    if errors > 0 {
        Output::error(&format!(
            "{} error(s) found. Please fix them before using Anamnese.",
            errors
        ));
        std::process::exit(1);
    } else if warnings > 0 {
        Output::warning(&format!("All checks passed with {} warning(s).", warnings));
    } else {
        Output::success("All checks passed! Anamnese is ready to use.");
    }

    Ok(())
}

/// Check if OpenAI API key is configured.
fn check_openai_api_key() -> CheckResult {
    match std::env::var("OPENAI_API_KEY") {
        Ok(key) if key.starts_with("sk-") && key.len() > 20 => {
            let masked = format!("{}...{}", &key[..7], &key[key.len() - 4..]);
            CheckResult::ok("OPENAI_API_KEY", &format!("configured ({})", masked))
        }
        Ok(key) if key.is_empty() => CheckResult::error(
            "OPENAI_API_KEY",
            "empty",
            "Set with: export OPENAI_API_KEY='sk-...'",
        ),
        Ok(_) => CheckResult::warning(
            "OPENAI_API_KEY",
            "set but format looks unusual",
            "Expected format: sk-... (OpenAI API key)",
        ),
        Err(_) => CheckResult::error(
            "OPENAI_API_KEY",
            "not set",
            "Set with: export OPENAI_API_KEY='sk-...'",
        ),
    }
}

/// Check where the patient record can come from.
fn check_record_source(settings: &Settings) -> Vec<CheckResult> {
    let mut results = Vec::new();

    let endpoint = settings.record.endpoint.as_deref();
    let patient_id = settings.record.patient_id.as_deref();

    match (endpoint, patient_id) {
        (Some(endpoint), Some(patient_id)) => {
            results.push(CheckResult::ok(
                "FHIR endpoint",
                &format!("{} (patient {})", endpoint, patient_id),
            ));
        }
        (Some(_), None) | (None, Some(_)) => {
            results.push(CheckResult::error(
                "FHIR endpoint",
                "partially configured",
                "Set both record.endpoint and record.patient_id",
            ));
        }
        (None, None) => {}
    }

    if let Some(fallback) = settings.fallback_file() {
        if fallback.exists() {
            let size = std::fs::metadata(&fallback)
                .map(|m| format_size(m.len()))
                .unwrap_or_else(|_| "unknown size".to_string());
            results.push(CheckResult::ok(
                "Fallback file",
                &format!("{} ({})", fallback.display(), size),
            ));
        } else {
            results.push(CheckResult::error(
                "Fallback file",
                &format!("{} (not found)", fallback.display()),
                "Point record.fallback_file at a readable file",
            ));
        }
    }

    if results.is_empty() {
        results.push(CheckResult::warning(
            "Record source",
            "not configured",
            "Set record.endpoint and record.patient_id, or record.fallback_file",
        ));
    }

    results
}

/// Check the persisted index against the current embedding configuration.
async fn check_index(settings: &Settings) -> CheckResult {
    let db_path = settings.index_db_path();
    if !db_path.exists() {
        return CheckResult::warning(
            "Index",
            "not built yet",
            "Build with: anamnese build",
        );
    }

    let store = match SqliteVectorStore::open(&db_path) {
        Ok(store) => store,
        Err(e) => {
            return CheckResult::error(
                "Index",
                &format!("unreadable: {}", e),
                "Rebuild with: anamnese build --force",
            );
        }
    };

    let meta = match store.read_meta().await {
        Ok(Some(meta)) => meta,
        Ok(None) => {
            return CheckResult::error(
                "Index",
                "no build metadata (corrupt or never completed)",
                "Rebuild with: anamnese build --force",
            );
        }
        Err(e) => {
            return CheckResult::error(
                "Index",
                &format!("unreadable: {}", e),
                "Rebuild with: anamnese build --force",
            );
        }
    };

    if meta.embedding_model != settings.embedding.model
        || meta.dimensions != settings.embedding.dimensions
    {
        return CheckResult::error(
            "Index",
            &format!(
                "built with {} ({} dims), config wants {} ({} dims)",
                meta.embedding_model,
                meta.dimensions,
                settings.embedding.model,
                settings.embedding.dimensions
            ),
            "Rebuild with: anamnese build --force",
        );
    }

    let size = std::fs::metadata(&db_path)
        .map(|m| format_size(m.len()))
        .unwrap_or_else(|_| "unknown size".to_string());
    CheckResult::ok(
        "Index",
        &format!("{} fragments, build {} ({})", meta.fragment_count, meta.build_id, size),
    )
}

/// Check the config file, the data directory, and the grounding setting.
fn check_configuration(settings: &Settings) -> Vec<CheckResult> {
    let mut results = Vec::new();

    let config_path = Settings::default_config_path();
    if config_path.exists() {
        results.push(CheckResult::ok(
            "Config file",
            &format!("{}", config_path.display()),
        ));
    } else {
        results.push(CheckResult::warning(
            "Config file",
            "using defaults",
            "Create with: anamnese init (or anamnese config edit)",
        ));
    }

    let data_dir = settings.data_dir();
    if data_dir.exists() {
        results.push(CheckResult::ok(
            "Data directory",
            &format!("{}", data_dir.display()),
        ));
    } else {
        results.push(CheckResult::warning(
            "Data directory",
            &format!("{} (will be created)", data_dir.display()),
            "Directory will be created on first use",
        ));
    }

    match settings.chat.grounding {
        Some(grounding) => {
            results.push(CheckResult::ok("Grounding", &grounding.to_string()));
        }
        None => {
            results.push(CheckResult::warning(
                "Grounding",
                "not configured",
                "Set chat.grounding to \"longcontext\" or \"rag\"",
            ));
        }
    }

    results
}

/// Format file size in human-readable format.
fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
