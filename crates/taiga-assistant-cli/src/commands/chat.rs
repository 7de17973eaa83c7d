use anyhow::Result;

use crate::chat::{ChatClient, ChatContext};
use crate::profile::{profile_path, Profile};
use crate::prompt::rustyline::RustylinePrompt;
use crate::session::store::{transcript_path, TranscriptStore};
use crate::session::Session;

pub async fn handle_chat(session_id: Option<String>, new: bool) -> Result<()> {
    let profile = Profile::require(&profile_path()?)?;
    let mut store = TranscriptStore::open(&transcript_path()?)?;

    if new {
        store.create_session()?;
    } else if let Some(id) = session_id {
        store.select(&id)?;
    }

    let messages = store
        .active()
        .map(|session| session.messages.clone())
        .unwrap_or_default();
    let client = ChatClient::new(
        &profile.server_url,
        ChatContext {
            credential: profile.token,
            backend_url: profile.backend_url,
            session_id: store.active_id().map(str::to_string),
        },
    )
    .with_messages(messages);

    let prompt = RustylinePrompt::new()?;
    let mut session = Session::new(client, Box::new(prompt), store);
    session.start().await
}
