//! Command-line interface.

pub mod commands;
mod output;
mod preflight;

pub use output::Output;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::{GroundingMethod, ProviderSpecialty};

#[derive(Parser)]
#[command(name = "anamnese", version, about = "Converse with a patient's health record")]
pub struct Cli {
    /// Increase output verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Set up configuration and data directories
    Init,

    /// Check environment and configuration
    Doctor,

    /// Build the retrieval index from the patient record
    Build {
        /// Index these files instead of fetching the configured record
        #[arg(short, long)]
        input: Vec<PathBuf>,

        /// Rebuild even if an index already exists
        #[arg(short, long)]
        force: bool,
    },

    /// Chat with the patient record
    Chat {
        /// Grounding method for this session (longcontext, rag)
        #[arg(short, long)]
        grounding: Option<GroundingMethod>,

        /// Provider specialty shaping the answers
        #[arg(short, long)]
        specialty: Option<ProviderSpecialty>,

        /// Override the chat model
        #[arg(short, long)]
        model: Option<String>,
    },

    /// Ask a single question against the index
    Ask {
        /// The question to answer
        question: String,

        /// Provider specialty shaping the answer
        #[arg(short, long)]
        specialty: Option<ProviderSpecialty>,

        /// Number of excerpts to retrieve
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Override the chat model
        #[arg(short, long)]
        model: Option<String>,
    },

    /// Search the index without calling the model
    Search {
        /// Search query
        query: String,

        /// Maximum number of results
        #[arg(short, long, default_value = "5")]
        limit: usize,

        /// Drop results scoring below this similarity
        #[arg(long)]
        min_score: Option<f32>,
    },

    /// Show index and configuration status
    Status,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Run the HTTP API server
    Serve {
        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Port to bind to
        #[arg(short, long, default_value = "3000")]
        port: u16,
    },
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Show current configuration
    Show,
    /// Set a configuration value
    Set { key: String, value: String },
    /// Open the configuration in $EDITOR
    Edit,
    /// Print the configuration file path
    Path,
}
