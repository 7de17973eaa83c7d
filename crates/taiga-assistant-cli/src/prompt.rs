use anyhow::Result;
use taiga_assistant::models::chat::ChatMessage;
use taiga_assistant::protocol::StreamEvent;

pub mod rustyline;

pub trait Prompt {
    /// Render a finished assistant message
    fn render(&mut self, message: &ChatMessage);
    /// Render one event while a reply is streaming
    fn render_event(&mut self, event: &StreamEvent);
    fn notice(&self, text: &str);
    fn error(&self, text: &str);
    fn get_input(&mut self) -> Result<Input>;
    fn show_busy(&mut self);
    fn hide_busy(&self);
    fn close(&self);
    fn ready(&self) {
        println!();
        println!("Connected to Taiga. Ask about your projects, or type /help for commands.");
        println!();
    }
}

pub struct Input {
    pub input_type: InputType,
    pub content: Option<String>, // Optional content as sometimes the user may be issuing a command eg. (Exit)
}

#[derive(Debug, PartialEq, Eq)]
pub enum InputType {
    AskAgain,     // Ask the user for input again. Control flow command.
    Message,      // User sent a message
    Retry,        // Regenerate the last reply
    NewSession,   // Start a fresh conversation
    ListSessions, // Show saved conversations
    Exit,         // User wants to exit the session
}

pub enum Theme {
    Light,
    Dark,
}
