//! Per-recipient mailboxes with lazy TTL eviction.
//!
//! Every backend keys entries by `(recipient fingerprint, content hash)`, so
//! saving a byte-identical message twice keeps one copy; a copy that has
//! expired but not yet been purged is refreshed instead. Reads first purge the
//! recipient's expired entries; there is no background sweep.
//!
//! Backends give no cross-call reservation: two concurrent `get_next` calls
//! for the same recipient may return the same message. Delivery is
//! at-most-once per stored copy only under a single receiver.

pub mod file;
pub mod memory;
pub mod sqlite;

use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use deaddrop_shared::envelope::Message;
use deaddrop_shared::identity::PublicKey;

use crate::error::{Result, StoreError};

pub use file::FileStore;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

pub trait MessageStore: Send + Sync {
    /// Store `message` for `recipient`. Saving an identical live message again
    /// is a no-op; an expired copy is restamped as freshly saved.
    fn save(&self, message: &Message, recipient: &PublicKey) -> Result<()>;

    /// One pending message, or `None` when the mailbox is empty. Order is unspecified.
    fn get_next(&self, recipient: &PublicKey) -> Result<Option<Message>>;

    /// All pending, non-expired messages.
    fn get_all(&self, recipient: &PublicKey) -> Result<Vec<Message>>;

    /// Delete one stored copy. Absent or expired entries are not an error.
    fn remove(&self, message: &Message, recipient: &PublicKey) -> Result<()>;
}

/// An entry is expired once its age strictly exceeds `max_age`.
pub(crate) fn is_expired(saved_at: SystemTime, now: SystemTime, max_age: Duration) -> bool {
    now.duration_since(saved_at)
        .map(|age| age > max_age)
        .unwrap_or(false)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Memory,
    File,
    Sqlite,
}

impl FromStr for StoreBackend {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" | "mem" => Ok(StoreBackend::Memory),
            "file" | "fs" => Ok(StoreBackend::File),
            "sqlite" | "kv" => Ok(StoreBackend::Sqlite),
            other => Err(StoreError::Invalid(format!("unknown store backend '{other}'"))),
        }
    }
}

impl std::fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            StoreBackend::Memory => "memory",
            StoreBackend::File => "file",
            StoreBackend::Sqlite => "sqlite",
        };
        f.write_str(name)
    }
}

/// Open the configured backend. `path` is a directory for the file backend,
/// a database file for SQLite, and ignored for memory.
pub fn open(backend: StoreBackend, path: &Path, max_age: Duration) -> Result<Arc<dyn MessageStore>> {
    let store: Arc<dyn MessageStore> = match backend {
        StoreBackend::Memory => Arc::new(MemoryStore::new(max_age)),
        StoreBackend::File => Arc::new(FileStore::open(path, max_age)?),
        StoreBackend::Sqlite => Arc::new(SqliteStore::open(path, max_age)?),
    };
    tracing::info!(backend = %backend, max_age_secs = max_age.as_secs(), "Message store ready");
    Ok(store)
}

// ---------------------------------------------------------------------------
// Shared property suite, run against every backend
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod harness {
    use super::*;
    use deaddrop_shared::identity::{Curve, KeyPair, Signature};

    pub const LONG_TTL: Duration = Duration::from_secs(3600);
    pub const SHORT_TTL: Duration = Duration::from_millis(50);

    pub fn recipient() -> PublicKey {
        KeyPair::generate(Curve::P256).public_key().clone()
    }

    pub fn message(content: &[u8]) -> Message {
        Message {
            sender: "alice".to_string(),
            receiver: "bob".to_string(),
            content: content.to_vec(),
            signature: Signature {
                r: [1u8; 32],
                s: [2u8; 32],
            },
        }
    }

    pub fn save_is_idempotent(store: &dyn MessageStore) {
        let bob = recipient();
        let msg = message(b"once");
        store.save(&msg, &bob).unwrap();
        store.save(&msg, &bob).unwrap();
        assert_eq!(store.get_all(&bob).unwrap(), vec![msg]);
    }

    pub fn empty_mailbox_is_absent(store: &dyn MessageStore) {
        let bob = recipient();
        assert_eq!(store.get_next(&bob).unwrap(), None);
        assert!(store.get_all(&bob).unwrap().is_empty());
    }

    pub fn get_next_is_stable(store: &dyn MessageStore) {
        let bob = recipient();
        store.save(&message(b"a"), &bob).unwrap();
        store.save(&message(b"b"), &bob).unwrap();
        let first = store.get_next(&bob).unwrap();
        assert!(first.is_some());
        assert_eq!(store.get_next(&bob).unwrap(), first);
    }

    pub fn drain_returns_each_message_once(store: &dyn MessageStore) {
        let bob = recipient();
        let sent: Vec<Message> = [&b"one"[..], &b"two"[..], &b"three"[..]]
            .iter()
            .map(|c| message(c))
            .collect();
        for msg in &sent {
            store.save(msg, &bob).unwrap();
        }

        let mut received = Vec::new();
        while let Some(msg) = store.get_next(&bob).unwrap() {
            store.remove(&msg, &bob).unwrap();
            received.push(msg);
            assert!(received.len() <= sent.len(), "mailbox did not drain");
        }

        received.sort_by(|a, b| a.content.cmp(&b.content));
        let mut expected = sent.clone();
        expected.sort_by(|a, b| a.content.cmp(&b.content));
        assert_eq!(received, expected);
    }

    pub fn recipients_are_partitioned(store: &dyn MessageStore) {
        let bob = recipient();
        let carol = recipient();
        let msg = message(b"shared");
        store.save(&msg, &bob).unwrap();
        store.save(&msg, &carol).unwrap();

        store.remove(&msg, &bob).unwrap();
        assert!(store.get_all(&bob).unwrap().is_empty());
        assert_eq!(store.get_all(&carol).unwrap(), vec![msg]);
    }

    pub fn remove_missing_is_noop(store: &dyn MessageStore) {
        let bob = recipient();
        let msg = message(b"ghost");
        store.remove(&msg, &bob).unwrap();

        store.save(&msg, &bob).unwrap();
        store.remove(&msg, &bob).unwrap();
        store.remove(&msg, &bob).unwrap();
        assert_eq!(store.get_next(&bob).unwrap(), None);
    }

    /// Requires a store opened with [`SHORT_TTL`].
    pub fn expired_messages_are_absent(store: &dyn MessageStore) {
        let bob = recipient();
        let msg = message(b"stale");
        store.save(&msg, &bob).unwrap();
        std::thread::sleep(SHORT_TTL * 4);

        assert_eq!(store.get_next(&bob).unwrap(), None);
        assert!(store.get_all(&bob).unwrap().is_empty());
        store.remove(&msg, &bob).unwrap();
    }

    /// Requires a store opened with [`SHORT_TTL`].
    pub fn resave_after_expiry_is_live(store: &dyn MessageStore) {
        let bob = recipient();
        let msg = message(b"retried");
        store.save(&msg, &bob).unwrap();
        std::thread::sleep(SHORT_TTL * 4);

        // The first copy has expired but has not been read, so it is still stored.
        store.save(&msg, &bob).unwrap();
        assert_eq!(store.get_next(&bob).unwrap(), Some(msg.clone()));
        assert_eq!(store.get_all(&bob).unwrap(), vec![msg]);
    }
}

/// Expands to one `#[test]` per property for a backend. `$open` is a closure
/// taking the max age and returning `(store, guard)`; the guard keeps any
/// temporary directory alive for the duration of the test.
#[cfg(test)]
macro_rules! mailbox_suite {
    ($open:expr) => {
        mod suite {
            use super::*;
            use crate::mailbox::harness;

            #[test]
            fn save_is_idempotent() {
                let (store, _guard) = ($open)(harness::LONG_TTL);
                harness::save_is_idempotent(&store);
            }

            #[test]
            fn empty_mailbox_is_absent() {
                let (store, _guard) = ($open)(harness::LONG_TTL);
                harness::empty_mailbox_is_absent(&store);
            }

            #[test]
            fn get_next_is_stable() {
                let (store, _guard) = ($open)(harness::LONG_TTL);
                harness::get_next_is_stable(&store);
            }

            #[test]
            fn drain_returns_each_message_once() {
                let (store, _guard) = ($open)(harness::LONG_TTL);
                harness::drain_returns_each_message_once(&store);
            }

            #[test]
            fn recipients_are_partitioned() {
                let (store, _guard) = ($open)(harness::LONG_TTL);
                harness::recipients_are_partitioned(&store);
            }

            #[test]
            fn remove_missing_is_noop() {
                let (store, _guard) = ($open)(harness::LONG_TTL);
                harness::remove_missing_is_noop(&store);
            }

            #[test]
            fn expired_messages_are_absent() {
                let (store, _guard) = ($open)(harness::SHORT_TTL);
                harness::expired_messages_are_absent(&store);
            }

            #[test]
            fn resave_after_expiry_is_live() {
                let (store, _guard) = ($open)(harness::SHORT_TTL);
                harness::resave_after_expiry_is_live(&store);
            }
        }
    };
}

#[cfg(test)]
pub(crate) use mailbox_suite;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_parsing() {
        assert_eq!("memory".parse::<StoreBackend>().unwrap(), StoreBackend::Memory);
        assert_eq!(" File ".parse::<StoreBackend>().unwrap(), StoreBackend::File);
        assert_eq!("sqlite".parse::<StoreBackend>().unwrap(), StoreBackend::Sqlite);
        assert!("redis".parse::<StoreBackend>().is_err());
    }

    #[test]
    fn test_expiry_is_strict() {
        let now = SystemTime::now();
        let max_age = Duration::from_secs(10);
        assert!(!is_expired(now - max_age, now, max_age));
        assert!(is_expired(now - max_age - Duration::from_millis(1), now, max_age));
        // Entries stamped in the future are never expired.
        assert!(!is_expired(now + max_age, now, max_age));
    }

    #[test]
    fn test_open_each_backend() {
        let dir = tempfile::tempdir().unwrap();
        for (backend, path) in [
            (StoreBackend::Memory, dir.path().join("unused")),
            (StoreBackend::File, dir.path().join("mailboxes")),
            (StoreBackend::Sqlite, dir.path().join("mailbox.db")),
        ] {
            let store = open(backend, &path, harness::LONG_TTL).unwrap();
            harness::save_is_idempotent(store.as_ref());
        }
    }
}
