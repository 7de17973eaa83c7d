pub mod store;

use anyhow::Result;
use taiga_assistant::models::chat::ChatMessage;

use crate::chat::{ChatClient, ChatError, ChatStatus, TurnOutcome};
use crate::commands::sessions::print_sessions;
use crate::prompt::{InputType, Prompt};
use store::TranscriptStore;

/// Resolves on Ctrl-C, used to stop a streaming reply
async fn interrupted() {
    let _ = tokio::signal::ctrl_c().await;
}

enum Turn {
    Send(String),
    Retry,
}

pub struct Session<'a> {
    client: ChatClient,
    prompt: Box<dyn Prompt + 'a>,
    store: TranscriptStore,
}

impl<'a> Session<'a> {
    pub fn new(client: ChatClient, prompt: Box<impl Prompt + 'a>, store: TranscriptStore) -> Self {
        Session {
            client,
            prompt,
            store,
        }
    }

    pub async fn start(&mut self) -> Result<()> {
        match self.store.active() {
            Some(session) if !session.messages.is_empty() => self.prompt.notice(&format!(
                "Resuming \"{}\" ({} messages)",
                session.title,
                session.messages.len()
            )),
            _ => self.prompt.notice("Starting a new conversation"),
        }
        self.prompt.ready();

        loop {
            let input = self.prompt.get_input()?;
            let turn = match input.input_type {
                InputType::Message => match input.content {
                    Some(content) => Turn::Send(content),
                    None => continue,
                },
                InputType::Retry => Turn::Retry,
                InputType::NewSession => {
                    let id = self.store.create_session()?.id.clone();
                    self.client.reset(Vec::new(), Some(id));
                    self.prompt.notice("Started a new conversation");
                    continue;
                }
                InputType::ListSessions => {
                    print_sessions(&self.store);
                    continue;
                }
                InputType::AskAgain => continue,
                InputType::Exit => break,
            };
            self.process_turn(turn).await?;
        }
        self.prompt.close();
        Ok(())
    }

    async fn process_turn(&mut self, turn: Turn) -> Result<()> {
        let Session {
            client,
            prompt,
            store,
        } = self;

        // a retry of a finished turn replaces it once the new one finishes
        let regenerating = matches!(turn, Turn::Retry) && client.failed_prompt().is_none();

        prompt.show_busy();
        let result = match turn {
            Turn::Send(text) => {
                client
                    .send(&text, interrupted(), |event, _| prompt.render_event(event))
                    .await
            }
            Turn::Retry => {
                client
                    .reload(interrupted(), |event, _| prompt.render_event(event))
                    .await
            }
        };
        prompt.hide_busy();

        match result {
            Ok(TurnOutcome::Finished(reply)) => {
                prompt.render(&reply);
                if regenerating {
                    if let Some(id) = store.active_id().map(str::to_string) {
                        store.truncate_before_last_user(&id)?;
                    }
                }
                let user = last_user(client.messages());
                if let Some(user) = user {
                    store.append(user)?;
                }
                store.append(reply)?;
            }
            Ok(TurnOutcome::Aborted) => {
                prompt.notice("Interrupted: the last message was not sent");
            }
            Err(ChatError::NothingToRetry) => prompt.notice("Nothing to retry yet"),
            Err(e) => prompt.error(&e.to_string()),
        }
        if client.status() == ChatStatus::Error {
            prompt.notice("Type /retry to try again");
        }
        Ok(())
    }
}

/// The user message that opened the most recent finished turn
fn last_user(messages: &[ChatMessage]) -> Option<ChatMessage> {
    match messages {
        [.., user, _reply] => Some(user.clone()),
        _ => None,
    }
}
