//! In-memory resolvers for unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use deaddrop_shared::error::LookupError;
use deaddrop_shared::identity::PublicKey;
use deaddrop_shared::lookup::{KeyInfo, LookupResult, Resolver};
use futures::future::{self, BoxFuture};

/// Fixed name and address tables, or a fixed error for every lookup.
#[derive(Default)]
pub struct StaticResolver {
    names: HashMap<String, PublicKey>,
    addresses: HashMap<(String, String), String>,
    keys: HashMap<PublicKey, KeyInfo>,
    error: Option<LookupError>,
}

impl StaticResolver {
    pub fn failing(error: LookupError) -> Self {
        Self {
            error: Some(error),
            ..Default::default()
        }
    }

    pub fn with_name(mut self, name: &str, key: &PublicKey) -> Self {
        self.names.insert(name.to_string(), key.clone());
        self
    }

    pub fn with_address(mut self, name: &str, protocol: &str, address: &str) -> Self {
        self.addresses
            .insert((name.to_string(), protocol.to_string()), address.to_string());
        self
    }

    pub fn with_key(mut self, key: &PublicKey, info: KeyInfo) -> Self {
        self.keys.insert(key.clone(), info);
        self
    }

    fn answer<T: Clone>(&self, found: Option<&T>) -> LookupResult<T> {
        if let Some(e) = &self.error {
            return Err(e.clone());
        }
        found.cloned().ok_or(LookupError::NotFound)
    }
}

impl Resolver for StaticResolver {
    fn lookup_key<'a>(&'a self, key: &'a PublicKey) -> BoxFuture<'a, LookupResult<KeyInfo>> {
        Box::pin(future::ready(self.answer(self.keys.get(key))))
    }

    fn lookup_name<'a>(&'a self, name: &'a str) -> BoxFuture<'a, LookupResult<PublicKey>> {
        Box::pin(future::ready(self.answer(self.names.get(name))))
    }

    fn lookup_address<'a>(
        &'a self,
        name: &'a str,
        protocol: &'a str,
    ) -> BoxFuture<'a, LookupResult<String>> {
        let found = self
            .addresses
            .get(&(name.to_string(), protocol.to_string()));
        Box::pin(future::ready(self.answer(found)))
    }
}

/// Wraps a resolver and counts every lookup it serves.
pub struct CountingResolver<R> {
    inner: R,
    calls: AtomicUsize,
}

impl<R: Resolver> CountingResolver<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl<R: Resolver> Resolver for CountingResolver<R> {
    fn lookup_key<'a>(&'a self, key: &'a PublicKey) -> BoxFuture<'a, LookupResult<KeyInfo>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.lookup_key(key)
    }

    fn lookup_name<'a>(&'a self, name: &'a str) -> BoxFuture<'a, LookupResult<PublicKey>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.lookup_name(name)
    }

    fn lookup_address<'a>(
        &'a self,
        name: &'a str,
        protocol: &'a str,
    ) -> BoxFuture<'a, LookupResult<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.lookup_address(name, protocol)
    }
}
