//! Durable key registry.
//!
//! Records registered keys, their parent delegation and disablement, plus the
//! name and protocol-address bindings that resolve to them. Callers verify
//! request envelopes; this layer enforces the authorization rules.
//!
//! A key's self-name is its fingerprint hex, bound at registration and never
//! rebindable.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use deaddrop_shared::constants::MAX_PARENT_KEYS;
use deaddrop_shared::error::LookupError;
use deaddrop_shared::identity::PublicKey;
use deaddrop_shared::lookup::{KeyInfo, LookupResult, Resolver};
use deaddrop_shared::protocol::validate_name;
use futures::future::BoxFuture;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

use crate::database::Database;
use crate::error::{Result, StoreError};

/// True when `originator` is `target` itself or one of its registered parents.
pub fn check_self_or_parent(originator: &PublicKey, target: &PublicKey, target_info: &KeyInfo) -> bool {
    originator == target || target_info.parent_keys.contains(originator)
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

// ---------------------------------------------------------------------------
// Row helpers
// ---------------------------------------------------------------------------

fn load_key(conn: &Connection, key: &PublicKey) -> Result<KeyInfo> {
    let key_hex = key.to_hex();
    let row: Option<(i64, bool, Option<i64>, Option<String>)> = conn
        .query_row(
            "SELECT registered_at_ms, disabled, disabled_at_ms, disabled_by
             FROM keys WHERE key_hex = ?1",
            params![key_hex],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
        )
        .optional()?;

    let (registered_at_ms, disabled, disabled_at_ms, disabled_by) = row.ok_or(StoreError::NotFound)?;

    let mut stmt = conn.prepare(
        "SELECT parent_hex FROM key_parents WHERE child_hex = ?1 ORDER BY added_at_ms, parent_hex",
    )?;
    let rows = stmt.query_map(params![key_hex], |row| row.get::<_, String>(0))?;
    let mut parent_keys = Vec::new();
    for row in rows {
        parent_keys.push(PublicKey::from_hex(&row?)?);
    }

    Ok(KeyInfo {
        registered_at_ms,
        disabled,
        disabled_at_ms,
        disabled_by: disabled_by.as_deref().map(PublicKey::from_hex).transpose()?,
        parent_keys,
    })
}

/// Load the originator of a mutation, which must be registered and enabled.
fn require_active(conn: &Connection, originator: &PublicKey) -> Result<KeyInfo> {
    let info = load_key(conn, originator).map_err(|e| match e {
        StoreError::NotFound => StoreError::NotAuthorized("originator key is not registered".into()),
        other => other,
    })?;
    if info.disabled {
        return Err(StoreError::NotAuthorized("originator key is disabled".into()));
    }
    Ok(info)
}

/// Load a mutation target, which must be registered and enabled.
fn require_live_target(conn: &Connection, target: &PublicKey) -> Result<KeyInfo> {
    let info = load_key(conn, target)?;
    if info.disabled {
        return Err(StoreError::NotAuthorized("target key is disabled".into()));
    }
    Ok(info)
}

fn bound_key(conn: &Connection, name: &str) -> Result<Option<PublicKey>> {
    let key_hex: Option<String> = conn
        .query_row(
            "SELECT key_hex FROM names WHERE name = ?1",
            params![name],
            |row| row.get(0),
        )
        .optional()?;
    Ok(key_hex.as_deref().map(PublicKey::from_hex).transpose()?)
}

// ---------------------------------------------------------------------------
// KeyRegistry
// ---------------------------------------------------------------------------

/// Cheap to clone; clones share one connection.
#[derive(Clone)]
pub struct KeyRegistry {
    db: Arc<Mutex<Database>>,
}

impl KeyRegistry {
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self::from_database(Database::open_at(path)?))
    }

    pub fn in_memory() -> Result<Self> {
        Ok(Self::from_database(Database::open_in_memory()?))
    }

    pub fn from_database(db: Database) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Database>> {
        self.db.lock().map_err(|_| StoreError::LockPoisoned)
    }

    /// Create a record for `key` and bind its fingerprint as a self-name.
    pub fn register_key(&self, key: &PublicKey) -> Result<KeyInfo> {
        let mut db = self.lock()?;
        let tx = db.conn_mut().transaction()?;

        let now = now_ms();
        let key_hex = key.to_hex();
        let inserted = tx.execute(
            "INSERT OR IGNORE INTO keys (key_hex, registered_at_ms) VALUES (?1, ?2)",
            params![key_hex, now],
        )?;
        if inserted == 0 {
            return Err(StoreError::AlreadyExists(format!(
                "key {} is already registered",
                key.address()
            )));
        }

        // The fingerprint always belongs to its key, even if squatted earlier.
        let self_name = key.address().to_hex();
        tx.execute("DELETE FROM addresses WHERE name = ?1", params![self_name])?;
        tx.execute(
            "INSERT INTO names (name, key_hex, bound_at_ms) VALUES (?1, ?2, ?3)
             ON CONFLICT(name) DO UPDATE SET key_hex = excluded.key_hex,
                                             bound_at_ms = excluded.bound_at_ms",
            params![self_name, key_hex, now],
        )?;
        tx.commit()?;

        info!(key = %key.address(), curve = ?key.curve(), "Registered key");
        Ok(KeyInfo::new(now))
    }

    /// Append `parent` to `child`'s delegation list. The child is the originator.
    pub fn register_key_parent(&self, child: &PublicKey, parent: &PublicKey) -> Result<()> {
        if child == parent {
            return Err(StoreError::Invalid("a key cannot be its own parent".into()));
        }

        let mut db = self.lock()?;
        let tx = db.conn_mut().transaction()?;

        let child_info = require_active(&tx, child)?;
        load_key(&tx, parent)?;

        if child_info.parent_keys.contains(parent) {
            return Err(StoreError::AlreadyExists(format!(
                "{} is already a parent of {}",
                parent.address(),
                child.address()
            )));
        }
        if child_info.parent_keys.len() >= MAX_PARENT_KEYS {
            return Err(StoreError::CapacityExceeded(format!(
                "a key may have at most {MAX_PARENT_KEYS} parents"
            )));
        }

        tx.execute(
            "INSERT INTO key_parents (child_hex, parent_hex, added_at_ms) VALUES (?1, ?2, ?3)",
            params![child.to_hex(), parent.to_hex(), now_ms()],
        )?;
        tx.commit()?;

        info!(child = %child.address(), parent = %parent.address(), "Registered parent key");
        Ok(())
    }

    /// Disable `target`. Terminal; repeating it on a disabled key by an
    /// authorized originator succeeds and keeps the original record.
    pub fn disable_key(&self, target: &PublicKey, originator: &PublicKey) -> Result<KeyInfo> {
        let mut db = self.lock()?;
        let tx = db.conn_mut().transaction()?;

        let info = load_key(&tx, target)?;
        if !check_self_or_parent(originator, target, &info) {
            return Err(StoreError::NotAuthorized(format!(
                "{} may not disable {}",
                originator.address(),
                target.address()
            )));
        }

        if info.disabled {
            debug!(key = %target.address(), "Key already disabled");
            return Ok(info);
        }

        require_active(&tx, originator)?;

        let now = now_ms();
        tx.execute(
            "UPDATE keys SET disabled = 1, disabled_at_ms = ?2, disabled_by = ?3
             WHERE key_hex = ?1 AND disabled = 0",
            params![target.to_hex(), now, originator.to_hex()],
        )?;
        tx.commit()?;

        info!(key = %target.address(), by = %originator.address(), "Disabled key");
        Ok(KeyInfo {
            disabled: true,
            disabled_at_ms: Some(now),
            disabled_by: Some(originator.clone()),
            ..info
        })
    }

    /// Bind `name` to `target`. Only a parent of `target` may do this, and
    /// taking a name from another key also requires authority over that key.
    pub fn register_name(&self, originator: &PublicKey, target: &PublicKey, name: &str) -> Result<()> {
        let name = validate_name(name)?;

        let mut db = self.lock()?;
        let tx = db.conn_mut().transaction()?;

        require_active(&tx, originator)?;
        let target_info = require_live_target(&tx, target)?;
        if originator == target || !check_self_or_parent(originator, target, &target_info) {
            return Err(StoreError::NotAuthorized(
                "only a parent key may bind a name".into(),
            ));
        }

        match bound_key(&tx, &name)? {
            Some(current) if &current == target => {
                debug!(name = %name, key = %target.address(), "Name already bound");
                return Ok(());
            }
            Some(current) => {
                if current.address().to_hex() == name {
                    return Err(StoreError::NotAuthorized("self-names cannot be rebound".into()));
                }
                let current_info = load_key(&tx, &current)?;
                if !check_self_or_parent(originator, &current, &current_info) {
                    return Err(StoreError::NotAuthorized(format!(
                        "name '{name}' is bound to a key outside the originator's delegation"
                    )));
                }
                tx.execute("DELETE FROM addresses WHERE name = ?1", params![name])?;
                tx.execute(
                    "UPDATE names SET key_hex = ?2, bound_at_ms = ?3 WHERE name = ?1",
                    params![name, target.to_hex(), now_ms()],
                )?;
                info!(name = %name, from = %current.address(), to = %target.address(), "Rebound name");
            }
            None => {
                tx.execute(
                    "INSERT INTO names (name, key_hex, bound_at_ms) VALUES (?1, ?2, ?3)",
                    params![name, target.to_hex(), now_ms()],
                )?;
                info!(name = %name, key = %target.address(), "Registered name");
            }
        }

        tx.commit()?;
        Ok(())
    }

    /// Publish `address` for `(name, protocol)`. `name` must currently resolve to `target`.
    pub fn register_address(
        &self,
        originator: &PublicKey,
        target: &PublicKey,
        name: &str,
        protocol: &str,
        address: &str,
    ) -> Result<()> {
        let name = validate_name(name)?;
        let protocol = validate_name(protocol)?;
        if address.trim().is_empty() {
            return Err(StoreError::Invalid("address must not be empty".into()));
        }

        let mut db = self.lock()?;
        let tx = db.conn_mut().transaction()?;

        require_active(&tx, originator)?;
        let target_info = require_live_target(&tx, target)?;
        if !check_self_or_parent(originator, target, &target_info) {
            return Err(StoreError::NotAuthorized(format!(
                "{} may not publish addresses for {}",
                originator.address(),
                target.address()
            )));
        }
        if bound_key(&tx, &name)?.as_ref() != Some(target) {
            return Err(StoreError::NotAuthorized(format!(
                "name '{name}' is not bound to {}",
                target.address()
            )));
        }

        tx.execute(
            "INSERT INTO addresses (name, protocol, address, updated_at_ms) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(name, protocol) DO UPDATE SET address = excluded.address,
                                                       updated_at_ms = excluded.updated_at_ms",
            params![name, protocol, address, now_ms()],
        )?;
        tx.commit()?;

        info!(name = %name, protocol = %protocol, "Registered address");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Lookups
    // -----------------------------------------------------------------------

    pub fn key_info(&self, key: &PublicKey) -> Result<KeyInfo> {
        let db = self.lock()?;
        load_key(db.conn(), key)
    }

    /// Key bound to `name`. Names bound to disabled keys do not resolve.
    pub fn name_key(&self, name: &str) -> Result<PublicKey> {
        let name = name.to_ascii_lowercase();
        let db = self.lock()?;
        let key_hex: Option<String> = db
            .conn()
            .query_row(
                "SELECT n.key_hex FROM names n JOIN keys k ON k.key_hex = n.key_hex
                 WHERE n.name = ?1 AND k.disabled = 0",
                params![name],
                |row| row.get(0),
            )
            .optional()?;
        let key_hex = key_hex.ok_or(StoreError::NotFound)?;
        Ok(PublicKey::from_hex(&key_hex)?)
    }

    pub fn address(&self, name: &str, protocol: &str) -> Result<String> {
        let name = name.to_ascii_lowercase();
        let protocol = protocol.to_ascii_lowercase();
        let db = self.lock()?;
        db.conn()
            .query_row(
                "SELECT a.address FROM addresses a
                 JOIN names n ON n.name = a.name
                 JOIN keys k ON k.key_hex = n.key_hex
                 WHERE a.name = ?1 AND a.protocol = ?2 AND k.disabled = 0",
                params![name, protocol],
                |row| row.get(0),
            )
            .optional()?
            .ok_or(StoreError::NotFound)
    }
}

impl KeyRegistry {
    /// Run a query on the blocking pool so the connection lock is never held
    /// on an executor thread.
    fn off_executor<T, F>(&self, f: F) -> BoxFuture<'static, LookupResult<T>>
    where
        T: Send + 'static,
        F: FnOnce(&KeyRegistry) -> Result<T> + Send + 'static,
    {
        let registry = self.clone();
        Box::pin(async move {
            tokio::task::spawn_blocking(move || f(&registry))
                .await
                .map_err(|e| LookupError::Internal(format!("registry task failed: {e}")))?
                .map_err(LookupError::from)
        })
    }
}

impl Resolver for KeyRegistry {
    fn lookup_key<'a>(&'a self, key: &'a PublicKey) -> BoxFuture<'a, LookupResult<KeyInfo>> {
        let key = key.clone();
        self.off_executor(move |r| r.key_info(&key))
    }

    fn lookup_name<'a>(&'a self, name: &'a str) -> BoxFuture<'a, LookupResult<PublicKey>> {
        let name = name.to_string();
        self.off_executor(move |r| r.name_key(&name))
    }

    fn lookup_address<'a>(
        &'a self,
        name: &'a str,
        protocol: &'a str,
    ) -> BoxFuture<'a, LookupResult<String>> {
        let (name, protocol) = (name.to_string(), protocol.to_string());
        self.off_executor(move |r| r.address(&name, &protocol))
    }
}
