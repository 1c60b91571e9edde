//! Concurrent reads from two identity backends during a migration.
//!
//! Both sources are queried in parallel and joined. Disagreements are logged
//! and the authoritative source's answer wins. No timeout is added here; the
//! join completes when both underlying clients return.

use std::fmt::Debug;
use std::sync::Arc;

use deaddrop_shared::identity::PublicKey;
use deaddrop_shared::lookup::{KeyInfo, LookupResult, Resolver};
use futures::future::BoxFuture;
use tracing::warn;

/// Which side of a [`DualRead`] is returned when both succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Authority {
    #[default]
    Legacy,
    Modern,
}

pub struct DualRead {
    modern: Arc<dyn Resolver>,
    legacy: Arc<dyn Resolver>,
    authority: Authority,
}

impl DualRead {
    pub fn new(modern: Arc<dyn Resolver>, legacy: Arc<dyn Resolver>) -> Self {
        Self {
            modern,
            legacy,
            authority: Authority::Legacy,
        }
    }

    pub fn with_authority(mut self, authority: Authority) -> Self {
        self.authority = authority;
        self
    }
}

/// Combine the two answers.
///
/// - both fail: the modern source's error
/// - one fails: the other's value, with a warning
/// - both succeed: the authoritative value, with a warning if they differ
fn reconcile<T: PartialEq + Debug>(
    authority: Authority,
    lookup: &str,
    subject: &str,
    modern: LookupResult<T>,
    legacy: LookupResult<T>,
) -> LookupResult<T> {
    match (modern, legacy) {
        (Ok(modern), Ok(legacy)) => {
            if modern != legacy {
                warn!(
                    lookup,
                    subject,
                    ?modern,
                    ?legacy,
                    authority = ?authority,
                    "Identity backends disagree"
                );
            }
            match authority {
                Authority::Legacy => Ok(legacy),
                Authority::Modern => Ok(modern),
            }
        }
        (Ok(modern), Err(e)) => {
            warn!(lookup, subject, error = %e, "Legacy backend failed, using modern result");
            Ok(modern)
        }
        (Err(e), Ok(legacy)) => {
            warn!(lookup, subject, error = %e, "Modern backend failed, using legacy result");
            Ok(legacy)
        }
        (Err(e), Err(_)) => Err(e),
    }
}

impl Resolver for DualRead {
    fn lookup_key<'a>(&'a self, key: &'a PublicKey) -> BoxFuture<'a, LookupResult<KeyInfo>> {
        Box::pin(async move {
            let (modern, legacy) =
                futures::join!(self.modern.lookup_key(key), self.legacy.lookup_key(key));
            reconcile(self.authority, "key", &key.address().to_hex(), modern, legacy)
        })
    }

    fn lookup_name<'a>(&'a self, name: &'a str) -> BoxFuture<'a, LookupResult<PublicKey>> {
        Box::pin(async move {
            let (modern, legacy) =
                futures::join!(self.modern.lookup_name(name), self.legacy.lookup_name(name));
            reconcile(self.authority, "name", name, modern, legacy)
        })
    }

    fn lookup_address<'a>(
        &'a self,
        name: &'a str,
        protocol: &'a str,
    ) -> BoxFuture<'a, LookupResult<String>> {
        Box::pin(async move {
            let (modern, legacy) = futures::join!(
                self.modern.lookup_address(name, protocol),
                self.legacy.lookup_address(name, protocol)
            );
            reconcile(self.authority, "address", name, modern, legacy)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::StaticResolver;
    use deaddrop_shared::error::LookupError;
    use deaddrop_shared::identity::{Curve, KeyPair};
    use std::time::Duration;

    fn key() -> PublicKey {
        KeyPair::generate(Curve::P256).public_key().clone()
    }

    #[tokio::test]
    async fn test_agreement() {
        let k = key();
        let dual = DualRead::new(
            Arc::new(StaticResolver::default().with_name("x", &k)),
            Arc::new(StaticResolver::default().with_name("x", &k)),
        );
        assert_eq!(dual.lookup_name("x").await.unwrap(), k);
    }

    #[tokio::test]
    async fn test_disagreement_returns_legacy() {
        let (modern, legacy) = (key(), key());
        let dual = DualRead::new(
            Arc::new(StaticResolver::default().with_name("x", &modern)),
            Arc::new(StaticResolver::default().with_name("x", &legacy)),
        );
        assert_eq!(dual.lookup_name("x").await.unwrap(), legacy);

        let dual = dual.with_authority(Authority::Modern);
        assert_eq!(dual.lookup_name("x").await.unwrap(), modern);
    }

    #[tokio::test]
    async fn test_one_side_failing() {
        let k = key();
        let dual = DualRead::new(
            Arc::new(StaticResolver::failing(LookupError::Unavailable("down".into()))),
            Arc::new(StaticResolver::default().with_address("x", "https", "https://x")),
        );
        assert_eq!(dual.lookup_address("x", "https").await.unwrap(), "https://x");

        let dual = DualRead::new(
            Arc::new(StaticResolver::default().with_name("x", &k)),
            Arc::new(StaticResolver::default()),
        );
        assert_eq!(dual.lookup_name("x").await.unwrap(), k);
    }

    #[tokio::test]
    async fn test_both_failing_returns_modern_error() {
        let dual = DualRead::new(
            Arc::new(StaticResolver::failing(LookupError::Unavailable("chain".into()))),
            Arc::new(StaticResolver::default()),
        );
        assert_eq!(
            dual.lookup_name("x").await,
            Err(LookupError::Unavailable("chain".into()))
        );

        let dual = DualRead::new(
            Arc::new(StaticResolver::default()),
            Arc::new(StaticResolver::default()),
        );
        assert_eq!(dual.lookup_key(&key()).await, Err(LookupError::NotFound));
    }

    /// Resolver that answers after a delay, to observe concurrency.
    struct Slow(Duration, PublicKey);

    impl Resolver for Slow {
        fn lookup_key<'a>(&'a self, _key: &'a PublicKey) -> BoxFuture<'a, LookupResult<KeyInfo>> {
            Box::pin(async { Err(LookupError::NotFound) })
        }

        fn lookup_name<'a>(&'a self, _name: &'a str) -> BoxFuture<'a, LookupResult<PublicKey>> {
            Box::pin(async move {
                tokio::time::sleep(self.0).await;
                Ok(self.1.clone())
            })
        }

        fn lookup_address<'a>(
            &'a self,
            _name: &'a str,
            _protocol: &'a str,
        ) -> BoxFuture<'a, LookupResult<String>> {
            Box::pin(async { Err(LookupError::NotFound) })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_sources_are_queried_concurrently() {
        let k = key();
        let dual = DualRead::new(
            Arc::new(Slow(Duration::from_secs(5), k.clone())),
            Arc::new(Slow(Duration::from_secs(5), k.clone())),
        );

        let started = tokio::time::Instant::now();
        assert_eq!(dual.lookup_name("x").await.unwrap(), k);
        assert!(started.elapsed() < Duration::from_secs(10));
    }
}
