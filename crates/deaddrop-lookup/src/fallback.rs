//! Ordered fallback between resolver tiers.
//!
//! The secondary tier is consulted only when the primary answers `NotFound`.
//! Any other primary error propagates immediately.

use std::sync::Arc;

use deaddrop_shared::error::LookupError;
use deaddrop_shared::identity::PublicKey;
use deaddrop_shared::lookup::{KeyInfo, LookupResult, Resolver};
use futures::future::BoxFuture;
use tracing::debug;

pub struct Fallback {
    primary: Arc<dyn Resolver>,
    secondary: Arc<dyn Resolver>,
}

impl Fallback {
    pub fn new(primary: Arc<dyn Resolver>, secondary: Arc<dyn Resolver>) -> Self {
        Self { primary, secondary }
    }

    /// Fold an ordered list of tiers into nested two-level fallbacks, so the
    /// first tier is tried first and the last tier answers last.
    pub fn chain(tiers: Vec<Arc<dyn Resolver>>) -> Option<Arc<dyn Resolver>> {
        tiers
            .into_iter()
            .rev()
            .reduce(|rest, tier| Arc::new(Fallback::new(tier, rest)) as Arc<dyn Resolver>)
    }
}

async fn or_on_not_found<'a, T>(
    first: BoxFuture<'a, LookupResult<T>>,
    second: impl FnOnce() -> BoxFuture<'a, LookupResult<T>>,
    what: &str,
) -> LookupResult<T> {
    match first.await {
        Err(LookupError::NotFound) => {
            debug!(lookup = what, "Primary tier has no binding, falling back");
            second().await
        }
        other => other,
    }
}

impl Resolver for Fallback {
    fn lookup_key<'a>(&'a self, key: &'a PublicKey) -> BoxFuture<'a, LookupResult<KeyInfo>> {
        Box::pin(or_on_not_found(
            self.primary.lookup_key(key),
            move || self.secondary.lookup_key(key),
            "key",
        ))
    }

    fn lookup_name<'a>(&'a self, name: &'a str) -> BoxFuture<'a, LookupResult<PublicKey>> {
        Box::pin(or_on_not_found(
            self.primary.lookup_name(name),
            move || self.secondary.lookup_name(name),
            "name",
        ))
    }

    fn lookup_address<'a>(
        &'a self,
        name: &'a str,
        protocol: &'a str,
    ) -> BoxFuture<'a, LookupResult<String>> {
        Box::pin(or_on_not_found(
            self.primary.lookup_address(name, protocol),
            move || self.secondary.lookup_address(name, protocol),
            "address",
        ))
    }
}
