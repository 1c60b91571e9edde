//! Signed envelopes and encrypted messages.
//!
//! The relay never sees plaintext. A [`Message`] carries ciphertext produced
//! by ECDH between the sender's private key and the receiver's public key,
//! signed by the sender. The signature is checked against the key the sender
//! *name* resolves to, never against a key embedded in the message.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::constants::{MAX_MESSAGE_SIZE, MESSAGE_HASH_DOMAIN};
use crate::crypto;
use crate::error::{CryptoError, EnvelopeError};
use crate::identity::{KeyPair, PublicKey, Signature};
use crate::lookup::Resolver;
use crate::pow;
use crate::types::hex_bytes;

// ---------------------------------------------------------------------------
// Signed
// ---------------------------------------------------------------------------

/// Content signed by the owner of `key`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signed {
    #[serde(with = "hex_bytes")]
    pub content: Vec<u8>,
    pub signature: Signature,
    pub key: PublicKey,
}

impl Signed {
    pub fn create(key: &KeyPair, content: Vec<u8>) -> Result<Self, CryptoError> {
        let signature = key.sign(&content)?;
        Ok(Self {
            content,
            signature,
            key: key.public_key().clone(),
        })
    }

    pub fn verify(&self) -> Result<(), CryptoError> {
        self.key.verify(&self.content, &self.signature)
    }
}

/// Signed content plus a proof-of-work stamp over the content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedWithProof {
    #[serde(with = "hex_bytes")]
    pub content: Vec<u8>,
    pub signature: Signature,
    pub key: PublicKey,
    pub proof: u64,
}

impl SignedWithProof {
    /// Sign `content` and compute a stamp. Blocks until the stamp is found.
    pub fn create(key: &KeyPair, content: Vec<u8>, difficulty: u32) -> Result<Self, CryptoError> {
        let signature = key.sign(&content)?;
        let proof = pow::compute(&content, difficulty);
        Ok(Self {
            content,
            signature,
            key: key.public_key().clone(),
            proof,
        })
    }

    /// Check the stamp first (one hash), then the signature.
    pub fn verify(&self, difficulty: u32) -> Result<(), EnvelopeError> {
        if !pow::verify(&self.content, self.proof, difficulty) {
            return Err(EnvelopeError::Authentication(format!(
                "proof of work below {difficulty} bits"
            )));
        }
        self.key
            .verify(&self.content, &self.signature)
            .map_err(|e| EnvelopeError::Authentication(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// An encrypted, signed message addressed by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub sender: String,
    pub receiver: String,
    /// ECDH-derived ciphertext (nonce || ciphertext).
    #[serde(with = "hex_bytes")]
    pub content: Vec<u8>,
    /// Sender's signature over `content`.
    pub signature: Signature,
}

impl Message {
    /// Canonical content hash: domain tag, then every field length-prefixed.
    ///
    /// Deduplication and removal key off this value, so it is computed from
    /// an explicit field concatenation rather than any serializer's output.
    pub fn content_hash(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(MESSAGE_HASH_DOMAIN);
        for field in [
            self.sender.as_bytes(),
            self.receiver.as_bytes(),
            self.content.as_slice(),
            &self.signature.r[..],
            &self.signature.s[..],
        ] {
            hasher.update((field.len() as u32).to_be_bytes());
            hasher.update(field);
        }
        let mut out = [0u8; 32];
        out.copy_from_slice(&hasher.finalize());
        out
    }

    pub fn content_hash_hex(&self) -> String {
        hex::encode(self.content_hash())
    }

    /// Structural sanity check; does not verify the signature.
    pub fn is_well_formed(&self) -> bool {
        !self.sender.is_empty()
            && !self.receiver.is_empty()
            && !self.content.is_empty()
            && self.content.len() <= MAX_MESSAGE_SIZE
    }
}

/// Encrypt `plaintext` to `receiver_key` and sign the ciphertext.
pub fn create_message(
    sender_key: &KeyPair,
    plaintext: &[u8],
    sender_name: &str,
    receiver_name: &str,
    receiver_key: &PublicKey,
) -> Result<Message, CryptoError> {
    let content = crypto::encrypt_for(sender_key, receiver_key, plaintext)?;
    let signature = sender_key.sign(&content)?;
    Ok(Message {
        sender: sender_name.to_string(),
        receiver: receiver_name.to_string(),
        content,
        signature,
    })
}

/// Resolve the sender, verify its signature, then decrypt.
///
/// Fails closed: a sender that does not resolve or a signature that does not
/// verify aborts before any decryption is attempted.
pub async fn decrypt_message<R: Resolver + ?Sized>(
    lookup: &R,
    receiver_key: &KeyPair,
    message: &Message,
) -> Result<Vec<u8>, EnvelopeError> {
    let sender_key = lookup.lookup_name(&message.sender).await?;

    sender_key
        .verify(&message.content, &message.signature)
        .map_err(|e| {
            debug!(sender = %message.sender, error = %e, "Message signature rejected");
            EnvelopeError::Authentication(format!("sender signature: {e}"))
        })?;

    let plaintext = crypto::decrypt_from(receiver_key, &sender_key, &message.content)?;
    Ok(plaintext)
}
