//! HTTP and WebSocket request handlers.

pub mod chat;
pub mod prompts;
pub mod session;
pub mod ws;
