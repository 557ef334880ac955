//! Pre-run checks so commands fail with a clear message instead of half
//! way through an API call.

use crate::config::Settings;
use crate::error::{AnamneseError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Build,
    Chat,
    Ask,
    Search,
}

pub fn check(operation: Operation, settings: &Settings) -> Result<()> {
    match operation {
        Operation::Build | Operation::Chat => check_api_key(),
        Operation::Ask | Operation::Search => {
            check_api_key()?;
            check_index(settings)
        }
    }
}

fn check_api_key() -> Result<()> {
    match std::env::var("OPENAI_API_KEY") {
        Ok(key) if !key.trim().is_empty() => Ok(()),
        _ => Err(AnamneseError::Config(
            "OPENAI_API_KEY is not set. Export it first:\n  export OPENAI_API_KEY=sk-..."
                .to_string(),
        )),
    }
}

fn check_index(settings: &Settings) -> Result<()> {
    let path = settings.index_db_path();
    if path.exists() {
        Ok(())
    } else {
        Err(AnamneseError::IndexLoad(format!(
            "No index at {}. Run `anamnese build` first",
            path.display()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_index_is_reported_with_the_path() {
        let mut settings = Settings::default();
        settings.index.db_path = "/nonexistent/anamnese/index.db".to_string();

        let err = check_index(&settings).unwrap_err();
        assert!(matches!(err, AnamneseError::IndexLoad(_)));
        assert!(err.to_string().contains("/nonexistent/anamnese/index.db"));
    }

    #[test]
    fn existing_index_passes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.db");
        std::fs::write(&path, b"").unwrap();

        let mut settings = Settings::default();
        settings.index.db_path = path.to_string_lossy().to_string();

        assert!(check_index(&settings).is_ok());
    }
}
