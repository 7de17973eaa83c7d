mod chat;
mod commands;
mod profile;
mod prompt;
mod session;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use commands::chat::handle_chat;
use commands::login::handle_login;
use commands::sessions::handle_sessions;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Sign in to Taiga through the assistant server and save the profile
    Login,

    /// Chat with the assistant
    Chat {
        /// Resume a saved conversation
        #[arg(short, long)]
        session: Option<String>,

        /// Start a new conversation
        #[arg(short, long, conflicts_with = "session")]
        new: bool,
    },

    /// Manage saved conversations
    Sessions {
        #[command(subcommand)]
        command: SessionsCommand,
    },
}

#[derive(Subcommand)]
pub enum SessionsCommand {
    /// List conversations, most recent first
    List,
    /// Delete a conversation
    Delete { id: String },
    /// Rename a conversation
    Rename {
        id: String,
        #[arg(required = true)]
        title: Vec<String>,
    },
    /// Remove every message from the active conversation
    Clear,
}

#[tokio::main]
async fn main() -> Result<()> {
    // stdout belongs to the conversation
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Some(Command::Login) => handle_login().await,
        Some(Command::Chat { session, new }) => handle_chat(session, new).await,
        Some(Command::Sessions { command }) => handle_sessions(command),
        None => handle_chat(None, false).await,
    }
}
