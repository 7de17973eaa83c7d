//! The wire protocol between the chat endpoint and its clients.
//!
//! A turn is streamed as server-sent events, one JSON payload per `data:` line.
//! [`event`] defines the payloads, [`decoder`] splits a byte stream into complete
//! lines and [`fold`] rebuilds a [`ChatMessage`](crate::models::chat::ChatMessage)
//! from the decoded events.
pub mod decoder;
pub mod event;
pub mod fold;

use thiserror::Error;

pub use decoder::{EventDecoder, LineDecoder};
pub use event::StreamEvent;
pub use fold::{FoldOutcome, MessageAssembler};

#[derive(Error, Debug)]
pub enum ProtocolError {
    /// A complete line whose payload is not valid JSON
    #[error("Malformed stream payload {line:?}: {source}")]
    Malformed {
        line: String,
        #[source]
        source: serde_json::Error,
    },

    /// The server reported a terminal error for the turn
    #[error("{0}")]
    Remote(String),
}
