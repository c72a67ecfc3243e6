//! Conversation state and turn orchestration.

pub mod chunker;
pub mod history;
pub mod relay;
pub mod reply;
pub mod store;
