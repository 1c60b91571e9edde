//! Store-and-forward relay.
//!
//! `send` queues ciphertext under the receiver's resolved key. `receive`
//! authenticates the caller with an identity proof and pops one message. The
//! relay holds no per-connection state.

use std::sync::Arc;

use chrono::Utc;
use deaddrop_shared::auth::ProofPolicy;
use deaddrop_shared::envelope::{Message, Signed};
use deaddrop_shared::error::LookupError;
use deaddrop_shared::identity::PublicKey;
use deaddrop_shared::lookup::Resolver;
use deaddrop_store::MessageStore;
use tracing::debug;

use crate::error::ServerError;

pub struct Relay {
    store: Arc<dyn MessageStore>,
    resolver: Arc<dyn Resolver>,
    proof_policy: ProofPolicy,
}

impl Relay {
    pub fn new(
        store: Arc<dyn MessageStore>,
        resolver: Arc<dyn Resolver>,
        proof_policy: ProofPolicy,
    ) -> Self {
        Self {
            store,
            resolver,
            proof_policy,
        }
    }

    /// Queue `message` for its receiver. The signature is the receiver's to
    /// check; only structure is validated here.
    ///
    /// Returns the key the message was filed under.
    pub async fn send(&self, message: Message) -> Result<PublicKey, ServerError> {
        if !message.is_well_formed() {
            return Err(ServerError::BadRequest("malformed message".to_string()));
        }

        let receiver = self
            .resolver
            .lookup_name(&message.receiver)
            .await
            .map_err(|e| match e {
                LookupError::NotFound => {
                    debug!(receiver = %message.receiver, "Send to unknown receiver");
                    ServerError::NotFound(format!("receiver '{}'", message.receiver))
                }
                other => other.into(),
            })?;

        let store = self.store.clone();
        let key = receiver.clone();
        tokio::task::spawn_blocking(move || store.save(&message, &key)).await??;

        debug!(receiver = %receiver.address().short(), "Message queued");
        Ok(receiver)
    }

    /// Authenticate `proof` and pop the next message for its key.
    ///
    /// Two concurrent receives for the same key may both return the same
    /// message; the store offers no reservation between read and remove.
    pub async fn receive(&self, proof: &Signed) -> Result<Message, ServerError> {
        self.proof_policy.check(proof, Utc::now())?;

        let info = self
            .resolver
            .lookup_key(&proof.key)
            .await
            .map_err(|e| match e {
                LookupError::NotFound => {
                    ServerError::AuthenticationFailure("key is not registered".to_string())
                }
                other => other.into(),
            })?;
        if info.disabled {
            return Err(ServerError::AuthenticationFailure(
                "key is disabled".to_string(),
            ));
        }

        let store = self.store.clone();
        let key = proof.key.clone();
        let next = tokio::task::spawn_blocking(move || {
            let next = store.get_next(&key)?;
            if let Some(message) = &next {
                store.remove(message, &key)?;
            }
            Ok::<_, deaddrop_store::StoreError>(next)
        })
        .await??;

        match next {
            Some(message) => {
                debug!(recipient = %proof.key.address().short(), "Message delivered");
                Ok(message)
            }
            None => {
                debug!(recipient = %proof.key.address().short(), "Mailbox empty");
                Err(ServerError::NotFound("mailbox is empty".to_string()))
            }
        }
    }
}
