//! Process-local session storage.

pub mod memory;

pub use memory::InMemorySessionStore;
