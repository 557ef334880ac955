//! Interactive chat command.

use console::style;
use std::io::{self, Write};

use crate::chat::{ChatOrchestrator, ChatSession, SessionDefaults};
use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::{GroundingMethod, ProviderSpecialty, Settings};
use crate::error::Result;

pub async fn run_chat(
    settings: &Settings,
    grounding: Option<GroundingMethod>,
    specialty: Option<ProviderSpecialty>,
    model: Option<String>,
) -> Result<()> {
    preflight::check(Operation::Chat, settings)?;

    let mut settings = settings.clone();
    if let Some(model) = model {
        settings.chat.model = model;
    }

    let defaults = SessionDefaults {
        grounding: grounding.or(settings.chat.grounding),
        specialty: specialty.unwrap_or(settings.chat.specialty),
    };

    let orchestrator = ChatOrchestrator::from_settings(&settings)?;
    let mut session = ChatSession::new(defaults.clone());

    Output::header("Anamnese");

    let spinner = Output::spinner("Reading the patient record...");
    let opening = orchestrator.start(&mut session).await;
    spinner.finish_and_clear();
    let opening = opening?;

    if let Some(transcript) = session.transcript() {
        Output::kv("Grounding", &transcript.mode().to_string());
        Output::kv("Specialty", &defaults.specialty.to_string());
        Output::kv("Model", &settings.chat.model);
    }
    Output::info("Type a question, /reset to start over, exit to leave");

    if let Some(summary) = opening {
        print_reply(&summary);
    }

    loop {
        print!("{} ", style("You:").cyan().bold());
        io::stdout().flush()?;

        let mut line = String::new();
        if io::stdin().read_line(&mut line)? == 0 {
            break;
        }
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if input == "exit" || input == "quit" {
            break;
        }

        if input == "/reset" {
            session.reset(defaults.clone());
            let spinner = Output::spinner("Starting over...");
            let restarted = orchestrator.start(&mut session).await;
            spinner.finish_and_clear();
            match restarted {
                Ok(Some(summary)) => print_reply(&summary),
                Ok(None) => {}
                Err(e) => Output::error(&e.to_string()),
            }
            continue;
        }

        let spinner = Output::spinner("Thinking...");
        let reply = orchestrator.handle_turn(&mut session, input).await;
        spinner.finish_and_clear();
        match reply {
            Ok(answer) => print_reply(&answer),
            Err(e) => Output::error(&e.to_string()),
        }
    }

    Output::info("\nGoodbye");
    Ok(())
}

fn print_reply(text: &str) {
    println!("\n{} {}\n", style("Anamnese:").green().bold(), text);
}
