use std::io::Write;
use std::sync::Arc;

use anyhow::{bail, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

use living_archive::config::{Args, Config, StorageTarget, API_KEY_ENV};
use living_archive::conversation::{ConversationController, RejectReason, SubmitOutcome, TurnState};
use living_archive::llm::{GeminiProvider, LlmProvider};
use living_archive::logging::init_logging;
use living_archive::repl::{render_graph, render_merge, render_turn, Command, HELP};
use living_archive::storage::{KeyValueStore, MemoryStore, SqliteStore};

fn prompt() -> Result<()> {
    print!("archive> ");
    std::io::stdout().flush()?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_args(Args::parse())?;
    init_logging(config.log_mode, config.log_file.clone())?;

    let store: Arc<dyn KeyValueStore> = match &config.storage {
        StorageTarget::Sqlite(path) => {
            info!(path = %path.display(), "opening archive database");
            Arc::new(SqliteStore::open(path)?)
        }
        StorageTarget::Memory => Arc::new(MemoryStore::new()),
    };

    let Some(api_key) = config.api_key.clone() else {
        bail!("No API key found: set {} before starting the archive", API_KEY_ENV);
    };
    let provider = LlmProvider::Gemini(GeminiProvider::new(
        config.api_base_url.clone(),
        config.model.clone(),
        api_key,
        config.timeout_seconds,
    )?);

    let controller = ConversationController::load(provider, store, config.temperature);

    println!("PROJECT: THE LIVING ARCHIVE");
    let graph = controller.snapshot();
    println!("{} nodes, {} links. Type /help for commands.", graph.nodes.len(), graph.links.len());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        prompt()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };

        match Command::parse(&line) {
            Command::Empty => {}
            Command::Quit => break,
            Command::Help => println!("{HELP}"),
            Command::Graph => print!("{}", render_graph(&controller.snapshot())),
            Command::History => {
                for turn in controller.turns() {
                    print!("{}", render_turn(&turn));
                }
            }
            Command::Clear => {
                controller.clear_conversation();
                println!("Conversation cleared.");
            }
            Command::Merge(id) => match id.or_else(|| controller.latest_merge_candidate()) {
                Some(id) => println!("{}", render_merge(controller.merge_turn(&id))),
                None => println!("Nothing to merge."),
            },
            Command::Dismiss(id) => match id.or_else(|| controller.latest_merge_candidate()) {
                Some(id) if controller.dismiss_turn(&id) => println!("Suggestions dismissed."),
                _ => println!("Nothing to dismiss."),
            },
            Command::Unknown(name) => println!("Unknown command /{name}. Type /help."),
            Command::Query(text) => {
                let outcome = controller
                    .submit_query(&text, |turn| match turn.state {
                        TurnState::Submitted => println!("{}", turn.explanation),
                        TurnState::Streaming => {}
                        TurnState::Complete => print!("{}", render_turn(turn)),
                    })
                    .await;
                if outcome == SubmitOutcome::Rejected(RejectReason::Busy) {
                    println!("The swarm is still answering the previous query.");
                }
            }
        }
    }

    Ok(())
}
