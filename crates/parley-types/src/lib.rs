//! Shared domain types for Parley.
//!
//! This crate contains the types exchanged between the relay core, the
//! infrastructure adapters and the HTTP/WebSocket surface: LLM messages and
//! stream events, session identifiers, structured replies, wire messages,
//! configuration and error types.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod chat;
pub mod config;
pub mod error;
pub mod event;
pub mod llm;
