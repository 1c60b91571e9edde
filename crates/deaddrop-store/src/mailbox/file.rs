//! Flat-file mailboxes.
//!
//! Layout: `<base>/<fp[0..6]>/<fp[6..10]>/<fp[10..]>/<content hash hex>`
//! where `fp` is the recipient fingerprint in hex. Each file holds one
//! JSON-encoded message and its mtime is the save time. Reads delete expired
//! files from disk as a side effect.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use deaddrop_shared::envelope::Message;
use deaddrop_shared::identity::PublicKey;
use tracing::{debug, info, warn};

use super::{is_expired, MessageStore};
use crate::error::Result;

pub struct FileStore {
    base_path: PathBuf,
    max_age: Duration,
}

impl FileStore {
    pub fn open(base_path: &Path, max_age: Duration) -> Result<Self> {
        fs::create_dir_all(base_path)?;
        info!(path = %base_path.display(), "File mailbox store initialized");
        Ok(Self {
            base_path: base_path.to_path_buf(),
            max_age,
        })
    }

    fn mailbox_dir(&self, recipient: &PublicKey) -> PathBuf {
        let fingerprint = recipient.address().to_hex();
        self.base_path
            .join(&fingerprint[..6])
            .join(&fingerprint[6..10])
            .join(&fingerprint[10..])
    }

    /// Paths of non-expired entries, sorted by file name. Expired files are deleted.
    fn live_entries(&self, recipient: &PublicKey) -> Result<Vec<PathBuf>> {
        let dir = self.mailbox_dir(recipient);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let now = SystemTime::now();
        let mut live = Vec::new();
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name();
            // Skip in-flight temp files.
            if name.to_string_lossy().starts_with('.') {
                continue;
            }

            let modified = match entry.metadata().and_then(|m| m.modified()) {
                Ok(modified) => modified,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };

            if is_expired(modified, now, self.max_age) {
                match fs::remove_file(entry.path()) {
                    Ok(()) => debug!(path = %entry.path().display(), "Evicted expired message"),
                    Err(e) if e.kind() == ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                }
                continue;
            }
            live.push(entry.path());
        }

        live.sort();
        Ok(live)
    }

    /// Read one entry. A file removed concurrently reads as `None`; a corrupt
    /// file is logged and skipped.
    fn read_entry(path: &Path) -> Result<Option<Message>> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        match serde_json::from_slice(&bytes) {
            Ok(message) => Ok(Some(message)),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Skipping unreadable mailbox entry");
                Ok(None)
            }
        }
    }
}

impl MessageStore for FileStore {
    fn save(&self, message: &Message, recipient: &PublicKey) -> Result<()> {
        let dir = self.mailbox_dir(recipient);
        let hash = message.content_hash_hex();
        let path = dir.join(&hash);
        match fs::metadata(&path).and_then(|m| m.modified()) {
            Ok(modified) if !is_expired(modified, SystemTime::now(), self.max_age) => {
                return Ok(());
            }
            // Expired copy still on disk: rewrite it with a fresh mtime.
            Ok(_) => debug!(path = %path.display(), "Refreshing expired copy"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        fs::create_dir_all(&dir)?;
        // Write then rename so readers never observe a partial file.
        let tmp = dir.join(format!(".{hash}.tmp"));
        fs::write(&tmp, serde_json::to_vec(message)?)?;
        fs::rename(&tmp, &path)?;

        debug!(recipient = %recipient.address().short(), hash = %hash, "Stored message");
        Ok(())
    }

    fn get_next(&self, recipient: &PublicKey) -> Result<Option<Message>> {
        for path in self.live_entries(recipient)? {
            if let Some(message) = Self::read_entry(&path)? {
                return Ok(Some(message));
            }
        }
        Ok(None)
    }

    fn get_all(&self, recipient: &PublicKey) -> Result<Vec<Message>> {
        let mut messages = Vec::new();
        for path in self.live_entries(recipient)? {
            if let Some(message) = Self::read_entry(&path)? {
                messages.push(message);
            }
        }
        Ok(messages)
    }

    fn remove(&self, message: &Message, recipient: &PublicKey) -> Result<()> {
        let path = self.mailbox_dir(recipient).join(message.content_hash_hex());
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mailbox::harness;

    crate::mailbox::mailbox_suite!(|max_age: std::time::Duration| {
        let dir = tempfile::tempdir().unwrap();
        let store = crate::mailbox::file::FileStore::open(dir.path(), max_age).unwrap();
        (store, dir)
    });

    #[test]
    fn test_fan_out_layout() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path(), harness::LONG_TTL).unwrap();
        let bob = harness::recipient();
        let msg = harness::message(b"layout");
        store.save(&msg, &bob).unwrap();

        let fp = bob.address().to_hex();
        let expected = dir
            .path()
            .join(&fp[..6])
            .join(&fp[6..10])
            .join(&fp[10..])
            .join(msg.content_hash_hex());
        assert!(expected.is_file());
    }

    #[test]
    fn test_expired_file_deleted_on_read() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path(), harness::SHORT_TTL).unwrap();
        let bob = harness::recipient();
        let msg = harness::message(b"old");
        store.save(&msg, &bob).unwrap();

        let path = store.mailbox_dir(&bob).join(msg.content_hash_hex());
        assert!(path.exists());

        std::thread::sleep(harness::SHORT_TTL * 4);
        // Still on disk until something reads the mailbox.
        assert!(path.exists());
        assert!(store.get_all(&bob).unwrap().is_empty());
        assert!(!path.exists());
    }

    #[test]
    fn test_corrupt_entry_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path(), harness::LONG_TTL).unwrap();
        let bob = harness::recipient();
        let good = harness::message(b"good");
        store.save(&good, &bob).unwrap();

        fs::write(store.mailbox_dir(&bob).join("0000garbage"), b"not json").unwrap();
        assert_eq!(store.get_all(&bob).unwrap(), vec![good.clone()]);
        assert_eq!(store.get_next(&bob).unwrap(), Some(good));
    }

    #[test]
    fn test_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let bob = harness::recipient();
        let msg = harness::message(b"persistent");
        FileStore::open(dir.path(), harness::LONG_TTL)
            .unwrap()
            .save(&msg, &bob)
            .unwrap();

        let reopened = FileStore::open(dir.path(), harness::LONG_TTL).unwrap();
        assert_eq!(reopened.get_next(&bob).unwrap(), Some(msg));
    }
}
