//! Anamnese CLI entry point.

use anamnese::cli::{commands, Cli, Commands};
use anamnese::config::Settings;
use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| format!("anamnese={}", log_level)),
        ))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    // Load configuration
    let settings = Settings::load_from(cli.config.as_ref())?;

    // Ensure the data directory exists
    std::fs::create_dir_all(settings.data_dir())?;

    // Execute command
    match &cli.command {
        Commands::Init => {
            commands::run_init(&settings)?;
        }

        Commands::Doctor => {
            commands::run_doctor(&settings).await?;
        }

        Commands::Build { input, force } => {
            commands::run_build(&settings, input.clone(), *force).await?;
        }

        Commands::Chat {
            grounding,
            specialty,
            model,
        } => {
            commands::run_chat(&settings, *grounding, *specialty, model.clone()).await?;
        }

        Commands::Ask {
            question,
            specialty,
            top_k,
            model,
        } => {
            commands::run_ask(&settings, question, *specialty, *top_k, model.clone()).await?;
        }

        Commands::Search {
            query,
            limit,
            min_score,
        } => {
            commands::run_search(&settings, query, *limit, *min_score).await?;
        }

        Commands::Status => {
            commands::run_status(&settings).await?;
        }

        Commands::Config { action } => {
            commands::run_config(action, &settings)?;
        }

        Commands::Serve { host, port } => {
            commands::run_serve(&settings, host, *port).await?;
        }
    }

    Ok(())
}
