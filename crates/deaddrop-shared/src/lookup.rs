//! Identity resolution interface.
//!
//! Every tier of the resolution chain (the local registry, a remote relay, a
//! chain client) implements [`Resolver`]. The trait is object-safe so tiers
//! can be composed behind `Arc<dyn Resolver>`.

use std::sync::Arc;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::error::LookupError;
use crate::identity::PublicKey;

pub type LookupResult<T> = Result<T, LookupError>;

/// Registry metadata about a public key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyInfo {
    pub registered_at_ms: i64,
    pub disabled: bool,
    pub disabled_at_ms: Option<i64>,
    /// Key that signed the disable request: the key itself or one of its parents.
    pub disabled_by: Option<PublicKey>,
    pub parent_keys: Vec<PublicKey>,
}

impl KeyInfo {
    pub fn new(registered_at_ms: i64) -> Self {
        Self {
            registered_at_ms,
            disabled: false,
            disabled_at_ms: None,
            disabled_by: None,
            parent_keys: Vec::new(),
        }
    }
}

pub trait Resolver: Send + Sync {
    /// Metadata for a registered key.
    fn lookup_key<'a>(&'a self, key: &'a PublicKey) -> BoxFuture<'a, LookupResult<KeyInfo>>;

    /// Key currently bound to `name`.
    fn lookup_name<'a>(&'a self, name: &'a str) -> BoxFuture<'a, LookupResult<PublicKey>>;

    /// Protocol address published for `name`, e.g. `("alice", "https")`.
    fn lookup_address<'a>(
        &'a self,
        name: &'a str,
        protocol: &'a str,
    ) -> BoxFuture<'a, LookupResult<String>>;
}

impl<R: Resolver + ?Sized> Resolver for Arc<R> {
    fn lookup_key<'a>(&'a self, key: &'a PublicKey) -> BoxFuture<'a, LookupResult<KeyInfo>> {
        (**self).lookup_key(key)
    }

    fn lookup_name<'a>(&'a self, name: &'a str) -> BoxFuture<'a, LookupResult<PublicKey>> {
        (**self).lookup_name(name)
    }

    fn lookup_address<'a>(
        &'a self,
        name: &'a str,
        protocol: &'a str,
    ) -> BoxFuture<'a, LookupResult<String>> {
        (**self).lookup_address(name, protocol)
    }
}
