//! Registry request payloads and HTTP response bodies.
//!
//! Registry mutations travel as [`SignedWithProof`] envelopes whose content
//! is one of the bincode-encoded payloads below. The envelope key is the
//! originator of the request.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::constants::MAX_NAME_LEN;
use crate::envelope::SignedWithProof;
use crate::error::ProtocolError;
use crate::identity::{KeyPair, PublicKey};

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Relationship {
    /// The target key may act on behalf of the originator.
    Parent,
}

/// Signed by the child key, declaring `target` as its parent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRelationshipRequest {
    pub target: PublicKey,
    pub relationship: Relationship,
}

/// Bind `name` to `key`. Signed by a parent of `key`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameRequest {
    pub key: PublicKey,
    pub name: String,
}

/// Publish `address` for `name` under `protocol`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressRequest {
    pub key: PublicKey,
    pub name: String,
    pub protocol: String,
    pub address: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisableRequest {
    pub key: PublicKey,
}

pub fn encode<T: Serialize>(payload: &T) -> Result<Vec<u8>, ProtocolError> {
    Ok(bincode::serialize(payload)?)
}

pub fn decode<T: DeserializeOwned>(content: &[u8]) -> Result<T, ProtocolError> {
    Ok(bincode::deserialize(content)?)
}

/// Lower-case `name` and check it against `[a-z0-9._-]{1,64}`.
pub fn validate_name(name: &str) -> Result<String, ProtocolError> {
    let normalized = name.to_ascii_lowercase();
    if normalized.is_empty() || normalized.len() > MAX_NAME_LEN {
        return Err(ProtocolError::InvalidName(format!(
            "length must be 1..={MAX_NAME_LEN}"
        )));
    }
    if let Some(c) = normalized
        .chars()
        .find(|c| !(c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '.' | '_' | '-')))
    {
        return Err(ProtocolError::InvalidName(format!(
            "unexpected character {c:?}"
        )));
    }
    Ok(normalized)
}

// ---------------------------------------------------------------------------
// Request builders (client side, computes proof-of-work)
// ---------------------------------------------------------------------------

pub fn register_key_request(
    key: &KeyPair,
    difficulty: u32,
) -> Result<SignedWithProof, ProtocolError> {
    let content = key.public_key().to_bytes();
    Ok(SignedWithProof::create(key, content, difficulty)?)
}

/// Declare `parent` as a parent of `child`.
pub fn register_parent_request(
    child: &KeyPair,
    parent: &PublicKey,
    difficulty: u32,
) -> Result<SignedWithProof, ProtocolError> {
    let payload = KeyRelationshipRequest {
        target: parent.clone(),
        relationship: Relationship::Parent,
    };
    Ok(SignedWithProof::create(child, encode(&payload)?, difficulty)?)
}

pub fn register_name_request(
    originator: &KeyPair,
    key: &PublicKey,
    name: &str,
    difficulty: u32,
) -> Result<SignedWithProof, ProtocolError> {
    let payload = NameRequest {
        key: key.clone(),
        name: validate_name(name)?,
    };
    Ok(SignedWithProof::create(originator, encode(&payload)?, difficulty)?)
}

pub fn register_address_request(
    originator: &KeyPair,
    key: &PublicKey,
    name: &str,
    protocol: &str,
    address: &str,
    difficulty: u32,
) -> Result<SignedWithProof, ProtocolError> {
    let payload = AddressRequest {
        key: key.clone(),
        name: validate_name(name)?,
        protocol: validate_name(protocol)?,
        address: address.to_string(),
    };
    Ok(SignedWithProof::create(originator, encode(&payload)?, difficulty)?)
}

pub fn disable_key_request(
    originator: &KeyPair,
    key: &PublicKey,
    difficulty: u32,
) -> Result<SignedWithProof, ProtocolError> {
    let payload = DisableRequest { key: key.clone() };
    Ok(SignedWithProof::create(originator, encode(&payload)?, difficulty)?)
}

// ---------------------------------------------------------------------------
// Response bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameResponse {
    pub name: String,
    pub key: PublicKey,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressResponse {
    pub name: String,
    pub protocol: String,
    pub address: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}
