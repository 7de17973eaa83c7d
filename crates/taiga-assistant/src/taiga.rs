//! A typed client for the Taiga REST API.
pub mod client;
pub mod types;

pub use client::{TaigaClient, TaigaError};
