//! Blockchain-backed name registry tier.
//!
//! The chain RPC client is an external collaborator. It is modeled as the
//! [`ChainClient`] trait with an in-process [`MemoryChain`] for tests and
//! local development. [`ChainResolver`] adapts any client to [`Resolver`].
//!
//! This module is the integration point only. The relay binary ships no RPC
//! client, so its resolver chain never includes a chain tier; an embedder
//! with a real client wraps it in a [`ChainResolver`] and places it ahead of
//! the registry with [`crate::Fallback`]. `register` is the client-side claim
//! operation and is not called by the relay.

use std::collections::HashMap;
use std::sync::Arc;

use deaddrop_shared::error::LookupError;
use deaddrop_shared::identity::PublicKey;
use deaddrop_shared::lookup::{KeyInfo, LookupResult, Resolver};
use futures::future::BoxFuture;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::ChainError;

/// Config entry under which a name publishes its address for a protocol.
pub fn address_config_key(protocol: &str) -> String {
    format!("address:{protocol}")
}

pub trait ChainClient: Send + Sync {
    fn lookup_name<'a>(&'a self, name: &'a str) -> BoxFuture<'a, LookupResult<PublicKey>>;

    /// Free-form configuration value published by the owner of `name`.
    fn lookup_config<'a>(
        &'a self,
        name: &'a str,
        config_key: &'a str,
    ) -> BoxFuture<'a, LookupResult<String>>;

    /// Claim `name` for `key`. Re-registering the same pair succeeds.
    fn register<'a>(
        &'a self,
        name: &'a str,
        key: &'a PublicKey,
    ) -> BoxFuture<'a, Result<(), ChainError>>;
}

// ---------------------------------------------------------------------------
// ChainResolver
// ---------------------------------------------------------------------------

pub struct ChainResolver {
    client: Arc<dyn ChainClient>,
}

impl ChainResolver {
    pub fn new(client: Arc<dyn ChainClient>) -> Self {
        Self { client }
    }
}

impl Resolver for ChainResolver {
    /// The chain keeps no key records; a later tier answers these.
    fn lookup_key<'a>(&'a self, _key: &'a PublicKey) -> BoxFuture<'a, LookupResult<KeyInfo>> {
        Box::pin(futures::future::ready(Err(LookupError::NotFound)))
    }

    fn lookup_name<'a>(&'a self, name: &'a str) -> BoxFuture<'a, LookupResult<PublicKey>> {
        self.client.lookup_name(name)
    }

    fn lookup_address<'a>(
        &'a self,
        name: &'a str,
        protocol: &'a str,
    ) -> BoxFuture<'a, LookupResult<String>> {
        Box::pin(async move {
            let config_key = address_config_key(protocol);
            self.client.lookup_config(name, &config_key).await
        })
    }
}

// ---------------------------------------------------------------------------
// MemoryChain
// ---------------------------------------------------------------------------

struct ChainEntry {
    key: PublicKey,
    config: HashMap<String, String>,
}

#[derive(Default)]
pub struct MemoryChain {
    entries: RwLock<HashMap<String, ChainEntry>>,
}

impl MemoryChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a config value for an already-registered name.
    pub async fn set_config(&self, name: &str, config_key: &str, value: &str) -> LookupResult<()> {
        let mut entries = self.entries.write().await;
        let entry = entries.get_mut(name).ok_or(LookupError::NotFound)?;
        entry.config.insert(config_key.to_string(), value.to_string());
        debug!(name, config_key, "Chain config updated");
        Ok(())
    }
}

impl ChainClient for MemoryChain {
    fn lookup_name<'a>(&'a self, name: &'a str) -> BoxFuture<'a, LookupResult<PublicKey>> {
        Box::pin(async move {
            let entries = self.entries.read().await;
            entries
                .get(name)
                .map(|entry| entry.key.clone())
                .ok_or(LookupError::NotFound)
        })
    }

    fn lookup_config<'a>(
        &'a self,
        name: &'a str,
        config_key: &'a str,
    ) -> BoxFuture<'a, LookupResult<String>> {
        Box::pin(async move {
            let entries = self.entries.read().await;
            entries
                .get(name)
                .and_then(|entry| entry.config.get(config_key).cloned())
                .ok_or(LookupError::NotFound)
        })
    }

    fn register<'a>(
        &'a self,
        name: &'a str,
        key: &'a PublicKey,
    ) -> BoxFuture<'a, Result<(), ChainError>> {
        Box::pin(async move {
            let mut entries = self.entries.write().await;
            match entries.get(name) {
                Some(entry) if &entry.key == key => Ok(()),
                Some(_) => Err(ChainError::NameTaken(name.to_string())),
                None => {
                    entries.insert(
                        name.to_string(),
                        ChainEntry {
                            key: key.clone(),
                            config: HashMap::new(),
                        },
                    );
                    info!(name, key = %key.address(), "Registered name on chain");
                    Ok(())
                }
            }
        })
    }
}
