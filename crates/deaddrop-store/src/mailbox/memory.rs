use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::time::{Duration, SystemTime};

use deaddrop_shared::envelope::Message;
use deaddrop_shared::identity::PublicKey;
use deaddrop_shared::types::Address;
use tracing::debug;

use super::{is_expired, MessageStore};
use crate::error::{Result, StoreError};

struct Entry {
    message: Message,
    saved_at: SystemTime,
}

/// In-process mailboxes. Contents are lost on restart.
pub struct MemoryStore {
    max_age: Duration,
    mailboxes: Mutex<HashMap<Address, BTreeMap<[u8; 32], Entry>>>,
}

impl MemoryStore {
    pub fn new(max_age: Duration) -> Self {
        Self {
            max_age,
            mailboxes: Mutex::new(HashMap::new()),
        }
    }

    /// Run `f` on the recipient's mailbox after purging expired entries.
    fn with_live<T>(
        &self,
        recipient: &PublicKey,
        f: impl FnOnce(&BTreeMap<[u8; 32], Entry>) -> T,
    ) -> Result<Option<T>> {
        let address = recipient.address();
        let mut mailboxes = self.mailboxes.lock().map_err(|_| StoreError::LockPoisoned)?;

        let Some(mailbox) = mailboxes.get_mut(&address) else {
            return Ok(None);
        };

        let now = SystemTime::now();
        let before = mailbox.len();
        mailbox.retain(|_, entry| !is_expired(entry.saved_at, now, self.max_age));
        if mailbox.len() != before {
            debug!(recipient = %address.short(), evicted = before - mailbox.len(), "Evicted expired messages");
        }

        if mailbox.is_empty() {
            mailboxes.remove(&address);
            return Ok(None);
        }
        Ok(Some(f(mailbox)))
    }
}

impl MessageStore for MemoryStore {
    fn save(&self, message: &Message, recipient: &PublicKey) -> Result<()> {
        let now = SystemTime::now();
        let mut mailboxes = self.mailboxes.lock().map_err(|_| StoreError::LockPoisoned)?;
        let entry = mailboxes
            .entry(recipient.address())
            .or_default()
            .entry(message.content_hash())
            .or_insert_with(|| Entry {
                message: message.clone(),
                saved_at: now,
            });
        // A copy that has outlived its TTL but not yet been purged is refreshed.
        if is_expired(entry.saved_at, now, self.max_age) {
            entry.saved_at = now;
        }
        Ok(())
    }

    fn get_next(&self, recipient: &PublicKey) -> Result<Option<Message>> {
        let next = self.with_live(recipient, |mailbox| {
            mailbox.values().next().map(|entry| entry.message.clone())
        })?;
        Ok(next.flatten())
    }

    fn get_all(&self, recipient: &PublicKey) -> Result<Vec<Message>> {
        let all = self.with_live(recipient, |mailbox| {
            mailbox.values().map(|entry| entry.message.clone()).collect::<Vec<_>>()
        })?;
        Ok(all.unwrap_or_default())
    }

    fn remove(&self, message: &Message, recipient: &PublicKey) -> Result<()> {
        let address = recipient.address();
        let mut mailboxes = self.mailboxes.lock().map_err(|_| StoreError::LockPoisoned)?;
        if let Some(mailbox) = mailboxes.get_mut(&address) {
            mailbox.remove(&message.content_hash());
            if mailbox.is_empty() {
                mailboxes.remove(&address);
            }
        }
        Ok(())
    }
}
