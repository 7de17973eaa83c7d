use anyhow::Result;
use console::style;

use crate::session::store::{transcript_path, TranscriptStore};
use crate::SessionsCommand;

pub fn print_sessions(store: &TranscriptStore) {
    if store.sessions().is_empty() {
        println!("{}", style("No saved conversations").dim());
        return;
    }
    for session in store.sessions() {
        let marker = if store.active_id() == Some(session.id.as_str()) {
            style("*").green().bold()
        } else {
            style(" ")
        };
        println!(
            "{} {}  {}  {}",
            marker,
            style(&session.id).dim(),
            session.title,
            style(format!(
                "{} messages, {}",
                session.messages.len(),
                session.updated_at.format("%Y-%m-%d %H:%M")
            ))
            .dim()
        );
    }
}

pub fn handle_sessions(command: SessionsCommand) -> Result<()> {
    let mut store = TranscriptStore::open(&transcript_path()?)?;
    match command {
        SessionsCommand::List => print_sessions(&store),
        SessionsCommand::Delete { id } => {
            store.delete(&id)?;
            println!("Deleted {}", id);
        }
        SessionsCommand::Rename { id, title } => {
            store.rename(&id, &title.join(" "))?;
            println!("Renamed {}", id);
        }
        SessionsCommand::Clear => {
            store.clear_active()?;
            println!("Cleared the active conversation");
        }
    }
    Ok(())
}
