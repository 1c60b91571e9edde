use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::constants::FINGERPRINT_SIZE;

// Mailbox partition key and self-name of a public key: truncated SHA-256 of
// the serialized key.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address(pub [u8; FINGERPRINT_SIZE]);

impl Address {
    pub fn from_serialized_key(serialized: &[u8]) -> Self {
        let digest = Sha256::digest(serialized);
        let mut out = [0u8; FINGERPRINT_SIZE];
        out.copy_from_slice(&digest[..FINGERPRINT_SIZE]);
        Self(out)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(s)?;
        if bytes.len() != FINGERPRINT_SIZE {
            return Err(hex::FromHexError::InvalidStringLength);
        }
        let mut arr = [0u8; FINGERPRINT_SIZE];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }

    pub fn short(&self) -> String {
        self.to_hex()[..8].to_string()
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Serde adapter that writes byte vectors as lower-case hex strings.
///
/// Use with `#[serde(with = "deaddrop_shared::types::hex_bytes")]`.
pub mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s.trim()).map_err(serde::de::Error::custom)
    }
}
