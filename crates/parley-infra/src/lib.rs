//! Infrastructure implementations for Parley.
//!
//! Concrete implementations of the ports defined in `parley-core`: the
//! Ollama chat provider, in-memory and SQLite session stores, and the
//! Postgres turn log, plus config file loading and startup diagnostics.

pub mod config;
pub mod diagnostics;
pub mod llm;
pub mod postgres;
pub mod session;
pub mod sqlite;
