//! SQLite storage layer.
//!
//! A shared session store for deployments that run more than one relay
//! process against the same database file.

pub mod pool;
pub mod session;
