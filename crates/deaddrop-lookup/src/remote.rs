//! Resolver tier backed by another relay's HTTP lookup endpoints.

use std::time::Duration;

use deaddrop_shared::error::LookupError;
use deaddrop_shared::identity::PublicKey;
use deaddrop_shared::lookup::{KeyInfo, LookupResult, Resolver};
use deaddrop_shared::protocol::{validate_name, AddressResponse, NameResponse};
use futures::future::BoxFuture;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use tracing::debug;

/// Request timeout of the default client. It bounds every lookup through
/// this tier, including the remote half of a dual read.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

pub struct RemoteResolver {
    client: reqwest::Client,
    base_url: String,
}

impl RemoteResolver {
    pub fn new(base_url: &str) -> LookupResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| LookupError::Internal(format!("http client: {e}")))?;
        Ok(Self::with_client(base_url, client))
    }

    pub fn with_client(base_url: &str, client: reqwest::Client) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> LookupResult<T> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| LookupError::Unavailable(format!("{url}: {e}")))?;

        match resp.status() {
            StatusCode::NOT_FOUND => {
                debug!(url = %url, "Remote lookup has no binding");
                Err(LookupError::NotFound)
            }
            status if !status.is_success() => Err(LookupError::Unavailable(format!(
                "{url} answered {status}"
            ))),
            _ => resp
                .json()
                .await
                .map_err(|e| LookupError::Internal(format!("invalid response from {url}: {e}"))),
        }
    }
}

impl Resolver for RemoteResolver {
    fn lookup_key<'a>(&'a self, key: &'a PublicKey) -> BoxFuture<'a, LookupResult<KeyInfo>> {
        Box::pin(async move { self.get_json(&format!("/keys/{}", key.to_hex())).await })
    }

    fn lookup_name<'a>(&'a self, name: &'a str) -> BoxFuture<'a, LookupResult<PublicKey>> {
        Box::pin(async move {
            // Invalid names cannot be bound anywhere.
            let name = validate_name(name).map_err(|_| LookupError::NotFound)?;
            let resp: NameResponse = self.get_json(&format!("/names/{name}")).await?;
            Ok(resp.key)
        })
    }

    fn lookup_address<'a>(
        &'a self,
        name: &'a str,
        protocol: &'a str,
    ) -> BoxFuture<'a, LookupResult<String>> {
        Box::pin(async move {
            let name = validate_name(name).map_err(|_| LookupError::NotFound)?;
            let protocol = validate_name(protocol).map_err(|_| LookupError::NotFound)?;
            let resp: AddressResponse = self
                .get_json(&format!("/names/{name}/addresses/{protocol}"))
                .await?;
            Ok(resp.address)
        })
    }
}
