//! SQLite persistence for Avacyn.
//!
//! One database file holds chats, messages, votes, document versions,
//! suggestions, and the authoring surface (tools, agents, executions).

pub mod sqlite;

pub use sqlite::SqliteStore;
