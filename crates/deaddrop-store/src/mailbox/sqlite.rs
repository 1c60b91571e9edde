//! Mailboxes in an ordered SQLite key/value table.
//!
//! Entry keys are `<fingerprint hex>/<content hash hex>`, so a recipient's
//! mailbox is the key range `[fp + "/", fp + "0")`.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use deaddrop_shared::envelope::Message;
use deaddrop_shared::identity::PublicKey;
use rusqlite::params;
use tracing::debug;

use super::MessageStore;
use crate::database::Database;
use crate::error::{Result, StoreError};

pub struct SqliteStore {
    db: Mutex<Database>,
    max_age: Duration,
}

fn entry_key(recipient: &PublicKey, message: &Message) -> String {
    format!("{}/{}", recipient.address().to_hex(), message.content_hash_hex())
}

/// Inclusive lower and exclusive upper bound of a recipient's key range.
fn mailbox_range(recipient: &PublicKey) -> (String, String) {
    let fingerprint = recipient.address().to_hex();
    (format!("{fingerprint}/"), format!("{fingerprint}0"))
}

impl SqliteStore {
    pub fn open(path: &Path, max_age: Duration) -> Result<Self> {
        Ok(Self::from_database(Database::open_at(path)?, max_age))
    }

    pub fn in_memory(max_age: Duration) -> Result<Self> {
        Ok(Self::from_database(Database::open_in_memory()?, max_age))
    }

    pub fn from_database(db: Database, max_age: Duration) -> Self {
        Self {
            db: Mutex::new(db),
            max_age,
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Database>> {
        self.db.lock().map_err(|_| StoreError::LockPoisoned)
    }

    /// Entries saved strictly before this instant are expired.
    fn cutoff_ms(&self, now_ms: i64) -> i64 {
        let max_age_ms = i64::try_from(self.max_age.as_millis()).unwrap_or(i64::MAX);
        now_ms.saturating_sub(max_age_ms)
    }

    fn purge_expired(&self, db: &Database, recipient: &PublicKey) -> Result<()> {
        let (low, high) = mailbox_range(recipient);
        let cutoff = self.cutoff_ms(Utc::now().timestamp_millis());
        let evicted = db.conn().execute(
            "DELETE FROM mailbox WHERE entry_key >= ?1 AND entry_key < ?2 AND saved_at_ms < ?3",
            params![low, high, cutoff],
        )?;
        if evicted > 0 {
            debug!(recipient = %recipient.address().short(), evicted, "Evicted expired messages");
        }
        Ok(())
    }

    fn query(&self, recipient: &PublicKey, limit: Option<u32>) -> Result<Vec<Message>> {
        let db = self.lock()?;
        self.purge_expired(&db, recipient)?;

        let (low, high) = mailbox_range(recipient);
        let mut stmt = db.conn().prepare(
            "SELECT message FROM mailbox
             WHERE entry_key >= ?1 AND entry_key < ?2
             ORDER BY entry_key
             LIMIT ?3",
        )?;
        // SQLite treats a negative limit as unbounded.
        let limit = limit.map(i64::from).unwrap_or(-1);
        let rows = stmt.query_map(params![low, high, limit], |row| row.get::<_, Vec<u8>>(0))?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(serde_json::from_slice(&row?)?);
        }
        Ok(messages)
    }
}

impl MessageStore for SqliteStore {
    fn save(&self, message: &Message, recipient: &PublicKey) -> Result<()> {
        let value = serde_json::to_vec(message)?;
        let now = Utc::now().timestamp_millis();
        let db = self.lock()?;
        // Live duplicates are left alone; an expired copy gets a fresh timestamp.
        db.conn().execute(
            "INSERT INTO mailbox (entry_key, saved_at_ms, message) VALUES (?1, ?2, ?3)
             ON CONFLICT(entry_key) DO UPDATE SET saved_at_ms = excluded.saved_at_ms
             WHERE mailbox.saved_at_ms < ?4",
            params![entry_key(recipient, message), now, value, self.cutoff_ms(now)],
        )?;
        Ok(())
    }

    fn get_next(&self, recipient: &PublicKey) -> Result<Option<Message>> {
        Ok(self.query(recipient, Some(1))?.into_iter().next())
    }

    fn get_all(&self, recipient: &PublicKey) -> Result<Vec<Message>> {
        self.query(recipient, None)
    }

    fn remove(&self, message: &Message, recipient: &PublicKey) -> Result<()> {
        let db = self.lock()?;
        db.conn().execute(
            "DELETE FROM mailbox WHERE entry_key = ?1",
            params![entry_key(recipient, message)],
        )?;
        Ok(())
    }
}
