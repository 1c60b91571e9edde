//! Proof-bearing registry mutations.
//!
//! Every request is a [`SignedWithProof`] envelope whose key is the
//! originator. The stamp and signature are checked before the payload is
//! decoded; the registry then applies its authorization rules.

use std::sync::Arc;

use deaddrop_shared::envelope::SignedWithProof;
use deaddrop_shared::identity::PublicKey;
use deaddrop_shared::lookup::KeyInfo;
use deaddrop_shared::protocol::{
    decode, AddressRequest, DisableRequest, KeyRelationshipRequest, NameRequest, Relationship,
};
use deaddrop_store::{KeyRegistry, StoreError};

use crate::error::ServerError;

pub struct Registrar {
    registry: Arc<KeyRegistry>,
    difficulty: u32,
}

impl Registrar {
    pub fn new(registry: Arc<KeyRegistry>, difficulty: u32) -> Self {
        Self {
            registry,
            difficulty,
        }
    }

    /// Run a registry call off the async executor.
    async fn with_registry<T, F>(&self, f: F) -> Result<T, ServerError>
    where
        T: Send + 'static,
        F: FnOnce(&KeyRegistry) -> Result<T, StoreError> + Send + 'static,
    {
        let registry = self.registry.clone();
        Ok(tokio::task::spawn_blocking(move || f(&registry)).await??)
    }

    pub async fn register_key(&self, req: SignedWithProof) -> Result<KeyInfo, ServerError> {
        req.verify(self.difficulty)?;
        let key = PublicKey::from_bytes(&req.content)?;
        if key != req.key {
            return Err(ServerError::BadRequest(
                "registered key must sign its own registration".to_string(),
            ));
        }
        self.with_registry(move |r| r.register_key(&key)).await
    }

    pub async fn register_key_relationship(&self, req: SignedWithProof) -> Result<(), ServerError> {
        req.verify(self.difficulty)?;
        let payload: KeyRelationshipRequest = decode(&req.content)?;
        match payload.relationship {
            Relationship::Parent => {
                let child = req.key;
                self.with_registry(move |r| r.register_key_parent(&child, &payload.target))
                    .await
            }
        }
    }

    pub async fn register_name(&self, req: SignedWithProof) -> Result<(), ServerError> {
        req.verify(self.difficulty)?;
        let payload: NameRequest = decode(&req.content)?;
        let originator = req.key;
        self.with_registry(move |r| r.register_name(&originator, &payload.key, &payload.name))
            .await
    }

    pub async fn register_address(&self, req: SignedWithProof) -> Result<(), ServerError> {
        req.verify(self.difficulty)?;
        let payload: AddressRequest = decode(&req.content)?;
        let originator = req.key;
        self.with_registry(move |r| {
            r.register_address(
                &originator,
                &payload.key,
                &payload.name,
                &payload.protocol,
                &payload.address,
            )
        })
        .await
    }

    pub async fn disable_key(&self, req: SignedWithProof) -> Result<KeyInfo, ServerError> {
        req.verify(self.difficulty)?;
        let payload: DisableRequest = decode(&req.content)?;
        let originator = req.key;
        self.with_registry(move |r| r.disable_key(&payload.key, &originator))
            .await
    }
}
