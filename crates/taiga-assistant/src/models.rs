//! These models represent the objects passed around by the assistant
//!
//! There are several different related formats we need to interact with:
//! - chat transcripts posted by the client, converted into conversation history
//! - stream payloads sent from the server to the client during a turn
//! - openai messages/tools, sent from the agent to the LLM
//! - tool calls dispatched to the tool registry
//!
//! We always immediately convert those data models into the internal structs using
//! to/from helpers. [`message`] holds what the model sees, [`chat`] holds what the
//! client rebuilds from the stream.
pub mod chat;
pub mod message;
pub mod role;
pub mod tool;
