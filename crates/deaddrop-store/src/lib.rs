//! # deaddrop-store
//!
//! Persistence for the relay: per-recipient mailboxes behind the
//! [`MessageStore`] trait (memory, flat-file and SQLite backends) and the
//! SQLite-backed [`KeyRegistry`].

pub mod database;
pub mod mailbox;
pub mod migrations;
pub mod registry;

mod error;

pub use database::Database;
pub use error::{Result, StoreError};
pub use mailbox::{FileStore, MemoryStore, MessageStore, SqliteStore, StoreBackend};
pub use registry::{check_self_or_parent, KeyRegistry};
