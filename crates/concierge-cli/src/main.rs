use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use console::style;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use concierge::agent::Agent;
use concierge::capabilities::standard_registry;
use concierge::coordinator::Coordinator;
use concierge::models::conversation::Conversation;
use concierge::models::message::Message;
use concierge::providers::openai::OpenAiProvider;
use concierge::settings::Settings;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Print the whole conversation as JSON instead of formatted text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start a new conversation: generates a title and the first reply
    Ask {
        /// The opening message
        message: String,
    },
    /// Answer the last turn of an existing transcript
    Reply {
        /// JSON array of {"role": "user"|"assistant", "content": "..."}; "-" reads stdin
        transcript: PathBuf,
    },
}

#[derive(Debug, Deserialize)]
struct Turn {
    role: String,
    content: String,
}

fn load_transcript(path: &Path) -> Result<Vec<Message>> {
    let raw = if path.as_os_str() == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        std::fs::read_to_string(path)
            .with_context(|| format!("reading transcript {}", path.display()))?
    };

    let turns: Vec<Turn> = serde_json::from_str(&raw).context("parsing transcript")?;
    turns
        .into_iter()
        .map(|turn| match turn.role.as_str() {
            "user" => Ok(Message::user().with_text(turn.content)),
            "assistant" => Ok(Message::assistant().with_text(turn.content)),
            other => bail!("unsupported role in transcript: {}", other),
        })
        .collect()
}

fn build_coordinator(settings: Settings) -> Result<Coordinator> {
    let (reply_config, title_config) = settings.provider.into_configs()?;
    let registry = standard_registry(
        settings.capabilities.weather.into_config(),
        settings.capabilities.holidays.into_config(),
    )?;

    tracing::info!(
        model = %reply_config.model,
        title_model = %title_config.model,
        capabilities = registry.len(),
        "starting concierge"
    );

    let agent = Agent::new(Arc::new(OpenAiProvider::new(reply_config)?), registry)
        .with_title_provider(Arc::new(OpenAiProvider::new(title_config)?))
        .with_max_round_trips(settings.agent.max_round_trips)
        .with_system_prompt(settings.agent.system_prompt);

    Ok(Coordinator::new(Arc::new(agent)))
}

/// Token cancelled on ctrl-c or when the deadline passes
fn cancellation(timeout: Option<std::time::Duration>) -> CancellationToken {
    let cancel = CancellationToken::new();

    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted, cancelling");
            on_signal.cancel();
        }
    });

    if let Some(timeout) = timeout {
        let on_deadline = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            tracing::warn!(timeout_secs = timeout.as_secs(), "deadline reached, cancelling");
            on_deadline.cancel();
        });
    }

    cancel
}

fn print_conversation(conversation: &Conversation, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(conversation)?);
        return Ok(());
    }

    if let Some(title) = &conversation.title {
        println!("{}\n", style(title).bold());
    }
    if let Some(reply) = conversation.messages.last() {
        println!("{}", reply.text());
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = Settings::new()?;
    let cancel = cancellation(settings.agent.timeout());
    let coordinator = build_coordinator(settings)?;

    match cli.command {
        Command::Ask { message } => {
            let conversation = coordinator.start(&message, &cancel).await?;
            print_conversation(&conversation, cli.json)?;
        }
        Command::Reply { transcript } => {
            let messages = load_transcript(&transcript)?;
            let mut conversation = Conversation::from_messages("transcript", messages);
            coordinator.follow_up(&mut conversation, &cancel).await?;
            print_conversation(&conversation, cli.json)?;
        }
    }

    Ok(())
}
