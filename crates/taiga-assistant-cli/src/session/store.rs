use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use taiga_assistant::models::chat::ChatMessage;
use taiga_assistant::models::role::Role;

use crate::profile::config_dir;

pub const DEFAULT_TITLE: &str = "New conversation";
const TITLE_LENGTH: usize = 40;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSession {
    pub id: String,
    pub title: String,
    pub messages: Vec<ChatMessage>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ChatSession {
    fn new() -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            title: DEFAULT_TITLE.to_string(),
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoreState {
    sessions: Vec<ChatSession>,
    active_session_id: Option<String>,
}

/// Title for a conversation, taken from its first user message
pub fn generate_title(messages: &[ChatMessage]) -> String {
    match messages.iter().find(|m| m.role == Role::User) {
        Some(message) if message.content.chars().count() > TITLE_LENGTH => {
            let head: String = message.content.chars().take(TITLE_LENGTH).collect();
            format!("{}...", head)
        }
        Some(message) => message.content.clone(),
        None => DEFAULT_TITLE.to_string(),
    }
}

pub fn transcript_path() -> Result<PathBuf> {
    Ok(config_dir()?.join("sessions.json"))
}

/// Local record of past conversations.
///
/// Sessions are kept most recently updated first and every change is written
/// straight back to disk. Only finished turns are ever appended.
pub struct TranscriptStore {
    path: PathBuf,
    state: StoreState,
}

impl TranscriptStore {
    pub fn open(path: &Path) -> Result<Self> {
        let state = if path.exists() {
            serde_json::from_str(&fs::read_to_string(path)?)?
        } else {
            StoreState::default()
        };
        Ok(Self {
            path: path.to_path_buf(),
            state,
        })
    }

    fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_string_pretty(&self.state)?)?;
        Ok(())
    }

    pub fn sessions(&self) -> &[ChatSession] {
        &self.state.sessions
    }

    pub fn active_id(&self) -> Option<&str> {
        self.state.active_session_id.as_deref()
    }

    pub fn active(&self) -> Option<&ChatSession> {
        self.active_id().and_then(|id| self.get(id))
    }

    pub fn get(&self, id: &str) -> Option<&ChatSession> {
        self.state.sessions.iter().find(|s| s.id == id)
    }

    fn position(&self, id: &str) -> Result<usize> {
        match self.state.sessions.iter().position(|s| s.id == id) {
            Some(index) => Ok(index),
            None => bail!("No session with id {}", id),
        }
    }

    /// Bump `updated_at` and move the session to the front
    fn touch(&mut self, index: usize) {
        let mut session = self.state.sessions.remove(index);
        session.updated_at = Utc::now();
        self.state.sessions.insert(0, session);
    }

    pub fn create_session(&mut self) -> Result<&ChatSession> {
        let session = ChatSession::new();
        self.state.active_session_id = Some(session.id.clone());
        self.state.sessions.insert(0, session);
        self.save()?;
        Ok(&self.state.sessions[0])
    }

    pub fn select(&mut self, id: &str) -> Result<()> {
        self.position(id)?;
        self.state.active_session_id = Some(id.to_string());
        self.save()
    }

    /// Add a finished message to the active session, creating one when none is active
    pub fn append(&mut self, message: ChatMessage) -> Result<&ChatSession> {
        let index = match self.active_id().map(|id| self.position(id)) {
            Some(Ok(index)) => index,
            _ => {
                self.create_session()?;
                0
            }
        };

        let session = &mut self.state.sessions[index];
        let first = session.messages.is_empty();
        session.messages.push(message);
        if first {
            session.title = generate_title(&session.messages);
        }
        self.touch(index);
        self.save()?;
        Ok(&self.state.sessions[0])
    }

    /// Remove a session. When it was active, the next most recent one takes over.
    pub fn delete(&mut self, id: &str) -> Result<()> {
        let index = self.position(id)?;
        self.state.sessions.remove(index);
        if self.active_id() == Some(id) {
            self.state.active_session_id = self.state.sessions.first().map(|s| s.id.clone());
        }
        self.save()
    }

    pub fn rename(&mut self, id: &str, title: &str) -> Result<()> {
        let index = self.position(id)?;
        self.state.sessions[index].title = title.to_string();
        self.touch(index);
        self.save()
    }

    /// Drop every message of the active session and reset its title
    pub fn clear_active(&mut self) -> Result<()> {
        let Some(id) = self.state.active_session_id.clone() else {
            bail!("No active session");
        };
        let index = self.position(&id)?;
        let session = &mut self.state.sessions[index];
        session.messages.clear();
        session.title = DEFAULT_TITLE.to_string();
        self.touch(index);
        self.save()
    }

    /// Cut the session back to just before its most recent user message
    pub fn truncate_before_last_user(&mut self, id: &str) -> Result<()> {
        let index = self.position(id)?;
        let session = &mut self.state.sessions[index];
        if let Some(last_user) = session.messages.iter().rposition(|m| m.role == Role::User) {
            session.messages.truncate(last_user);
            self.touch(index);
            self.save()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::{tempdir, TempDir};

    fn store() -> (TempDir, TranscriptStore) {
        let dir = tempdir().unwrap();
        let store = TranscriptStore::open(&dir.path().join("sessions.json")).unwrap();
        (dir, store)
    }

    fn reply(text: &str) -> ChatMessage {
        let mut message = ChatMessage::assistant();
        message.append_text(text);
        message
    }

    #[test]
    fn test_append_creates_session_and_title() {
        let (_dir, mut store) = store();
        assert!(store.active().is_none());

        store.append(ChatMessage::user("List my projects")).unwrap();
        store.append(reply("You have two projects.")).unwrap();

        let session = store.active().unwrap();
        assert_eq!(session.title, "List my projects");
        assert_eq!(session.messages.len(), 2);
        assert_eq!(store.sessions().len(), 1);
    }

    #[test]
    fn test_long_title_is_truncated() {
        let long = "Create a story for the new onboarding flow in project Atlas";
        let title = generate_title(&[ChatMessage::user(long)]);
        assert_eq!(title, format!("{}...", &long[..40]));
        assert_eq!(title.chars().count(), 43);

        assert_eq!(generate_title(&[reply("hi")]), DEFAULT_TITLE);
        assert_eq!(generate_title(&[]), DEFAULT_TITLE);
    }

    #[test]
    fn test_title_kept_after_first_message() {
        let (_dir, mut store) = store();
        store.append(ChatMessage::user("first")).unwrap();
        store.append(ChatMessage::user("second")).unwrap();
        assert_eq!(store.active().unwrap().title, "first");
    }

    #[test]
    fn test_append_bumps_updated_at_and_order() {
        let (_dir, mut store) = store();
        let older = store.create_session().unwrap().id.clone();
        store.append(ChatMessage::user("older")).unwrap();
        let newer = store.create_session().unwrap().id.clone();
        assert_eq!(store.sessions()[0].id, newer);

        store.select(&older).unwrap();
        let before = store.get(&older).unwrap().updated_at;
        store.append(reply("again")).unwrap();

        assert_eq!(store.sessions()[0].id, older);
        assert!(store.get(&older).unwrap().updated_at >= before);
    }

    #[test]
    fn test_delete_reassigns_active() {
        let (_dir, mut store) = store();
        let first = store.create_session().unwrap().id.clone();
        let second = store.create_session().unwrap().id.clone();
        let third = store.create_session().unwrap().id.clone();
        assert_eq!(store.active_id(), Some(third.as_str()));

        store.delete(&third).unwrap();
        assert_eq!(store.active_id(), Some(second.as_str()));

        // deleting an inactive session leaves the active one alone
        store.delete(&first).unwrap();
        assert_eq!(store.active_id(), Some(second.as_str()));

        store.delete(&second).unwrap();
        assert_eq!(store.active_id(), None);
        assert!(store.delete("missing").is_err());
    }

    #[test]
    fn test_rename_clear_and_truncate() {
        let (_dir, mut store) = store();
        store.append(ChatMessage::user("one")).unwrap();
        store.append(reply("uno")).unwrap();
        store.append(ChatMessage::user("two")).unwrap();
        store.append(reply("dos")).unwrap();
        let id = store.active_id().unwrap().to_string();

        store.truncate_before_last_user(&id).unwrap();
        let contents: Vec<_> = store
            .active()
            .unwrap()
            .messages
            .iter()
            .map(|m| m.content.as_str())
            .collect();
        assert_eq!(contents, vec!["one", "uno"]);

        store.rename(&id, "Numbers").unwrap();
        assert_eq!(store.active().unwrap().title, "Numbers");

        store.clear_active().unwrap();
        let session = store.active().unwrap();
        assert!(session.messages.is_empty());
        assert_eq!(session.title, DEFAULT_TITLE);
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sessions.json");
        {
            let mut store = TranscriptStore::open(&path).unwrap();
            store.append(ChatMessage::user("remember me")).unwrap();
        }

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert!(raw.get("activeSessionId").is_some());
        assert_eq!(raw["sessions"][0]["title"], "remember me");
        assert!(raw["sessions"][0].get("updatedAt").is_some());

        let store = TranscriptStore::open(&path).unwrap();
        assert_eq!(store.active().unwrap().messages[0].content, "remember me");
    }
}
