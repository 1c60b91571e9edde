//! Elliptic-curve identities.
//!
//! Two curves coexist: secp256k1 is the legacy curve and P-256 the current
//! default. Every serialized public key carries a curve tag in front of its
//! 33-byte compressed point, so verification and ECDH always select the
//! matching curve from the key itself rather than from global configuration.

use k256::ecdsa::signature::hazmat::{PrehashSigner, PrehashVerifier};
use k256::elliptic_curve::scalar::IsHigh;
use rand::rngs::OsRng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

use crate::constants::{COMPRESSED_POINT_SIZE, SCALAR_SIZE, SERIALIZED_KEY_SIZE};
use crate::error::CryptoError;
use crate::types::Address;

// ---------------------------------------------------------------------------
// Curve selection
// ---------------------------------------------------------------------------

/// Supported curves, identified on the wire by a one-byte tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum Curve {
    /// Legacy curve.
    Secp256k1 = 0x01,
    /// Current default curve.
    P256 = 0x02,
}

impl Curve {
    pub fn from_tag(tag: u8) -> Result<Self, CryptoError> {
        match tag {
            0x01 => Ok(Self::Secp256k1),
            0x02 => Ok(Self::P256),
            other => Err(CryptoError::UnsupportedCurve(other)),
        }
    }

    pub fn tag(self) -> u8 {
        self as u8
    }
}

impl Default for Curve {
    fn default() -> Self {
        Self::P256
    }
}

/// Key agreement scheme version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EcdhVersion {
    /// SHA-256 KDF + ChaCha20-Poly1305.
    V1,
    /// BLAKE3 KDF bound to both public keys + XChaCha20-Poly1305.
    V2,
}

/// Signature scheme version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EcdsaVersion {
    /// ECDSA over secp256k1, double SHA-256 prehash.
    V1,
    /// ECDSA over P-256, double SHA-256 prehash.
    V2,
}

/// The full set of algorithm choices implied by a key's curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CryptoContext {
    pub curve: Curve,
    pub ecdh_version: EcdhVersion,
    pub ecdsa_version: EcdsaVersion,
}

impl CryptoContext {
    pub fn for_curve(curve: Curve) -> Self {
        match curve {
            Curve::Secp256k1 => Self {
                curve,
                ecdh_version: EcdhVersion::V1,
                ecdsa_version: EcdsaVersion::V1,
            },
            Curve::P256 => Self {
                curve,
                ecdh_version: EcdhVersion::V2,
                ecdsa_version: EcdsaVersion::V2,
            },
        }
    }
}

/// Double SHA-256, the digest every signature is computed over.
pub fn double_sha256(content: &[u8]) -> [u8; 32] {
    let first = Sha256::digest(content);
    let second = Sha256::digest(first);
    let mut out = [0u8; 32];
    out.copy_from_slice(&second);
    out
}

// ---------------------------------------------------------------------------
// Public key
// ---------------------------------------------------------------------------

/// A validated public key: curve plus compressed SEC1 point.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PublicKey {
    curve: Curve,
    point: [u8; COMPRESSED_POINT_SIZE],
}

impl PublicKey {
    /// Build a key from a curve and compressed point, checking the point is on the curve.
    pub fn from_point(curve: Curve, point: &[u8]) -> Result<Self, CryptoError> {
        if point.len() != COMPRESSED_POINT_SIZE {
            return Err(CryptoError::MalformedKey);
        }
        let valid = match curve {
            Curve::Secp256k1 => k256::ecdsa::VerifyingKey::from_sec1_bytes(point).is_ok(),
            Curve::P256 => p256::ecdsa::VerifyingKey::from_sec1_bytes(point).is_ok(),
        };
        if !valid {
            return Err(CryptoError::MalformedKey);
        }
        let mut arr = [0u8; COMPRESSED_POINT_SIZE];
        arr.copy_from_slice(point);
        Ok(Self { curve, point: arr })
    }

    /// Parse `tag || compressed point`.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() != SERIALIZED_KEY_SIZE {
            return Err(CryptoError::MalformedKey);
        }
        let curve = Curve::from_tag(bytes[0])?;
        Self::from_point(curve, &bytes[1..])
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(SERIALIZED_KEY_SIZE);
        out.push(self.curve.tag());
        out.extend_from_slice(&self.point);
        out
    }

    pub fn from_hex(s: &str) -> Result<Self, CryptoError> {
        let bytes = hex::decode(s.trim()).map_err(|_| CryptoError::MalformedKey)?;
        Self::from_bytes(&bytes)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    pub fn curve(&self) -> Curve {
        self.curve
    }

    pub fn context(&self) -> CryptoContext {
        CryptoContext::for_curve(self.curve)
    }

    /// Compressed point without the curve tag.
    pub fn point(&self) -> &[u8; COMPRESSED_POINT_SIZE] {
        &self.point
    }

    /// Fingerprint used for mailbox partitioning and the self-name.
    pub fn address(&self) -> Address {
        Address::from_serialized_key(&self.to_bytes())
    }

    /// Verify `signature` over the double SHA-256 of `content`.
    pub fn verify(&self, content: &[u8], signature: &Signature) -> Result<(), CryptoError> {
        let digest = double_sha256(content);
        match self.curve {
            Curve::Secp256k1 => {
                let key = k256::ecdsa::VerifyingKey::from_sec1_bytes(&self.point)
                    .map_err(|_| CryptoError::MalformedKey)?;
                let sig = k256::ecdsa::Signature::from_scalars(
                    *k256::FieldBytes::from_slice(&signature.r),
                    *k256::FieldBytes::from_slice(&signature.s),
                )
                .map_err(|_| CryptoError::MalformedSignature)?;
                if bool::from(sig.s().is_high()) {
                    return Err(CryptoError::BadSignature);
                }
                key.verify_prehash(&digest, &sig)
                    .map_err(|_| CryptoError::BadSignature)
            }
            Curve::P256 => {
                let key = p256::ecdsa::VerifyingKey::from_sec1_bytes(&self.point)
                    .map_err(|_| CryptoError::MalformedKey)?;
                let sig = p256::ecdsa::Signature::from_scalars(
                    *p256::FieldBytes::from_slice(&signature.r),
                    *p256::FieldBytes::from_slice(&signature.s),
                )
                .map_err(|_| CryptoError::MalformedSignature)?;
                // Reject any signatures with an `s` value in the upper half of the curve order.
                if bool::from(sig.s().is_high()) {
                    return Err(CryptoError::BadSignature);
                }
                key.verify_prehash(&digest, &sig)
                    .map_err(|_| CryptoError::BadSignature)
            }
        }
    }
}

impl std::fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PublicKey({:?}, {})", self.curve, self.address().short())
    }
}

impl std::fmt::Display for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl Serialize for PublicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        PublicKey::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Deserialize a key and verify `signature` over `content` in one step.
pub fn verify_signature(signature: &Signature, serialized_key: &[u8], content: &[u8]) -> bool {
    match PublicKey::from_bytes(serialized_key) {
        Ok(key) => key.verify(content, signature).is_ok(),
        Err(_) => false,
    }
}

// ---------------------------------------------------------------------------
// Signature
// ---------------------------------------------------------------------------

/// ECDSA signature as its two big-endian scalars.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Signature {
    pub r: [u8; SCALAR_SIZE],
    pub s: [u8; SCALAR_SIZE],
}

impl Signature {
    fn from_rs_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() != SCALAR_SIZE * 2 {
            return Err(CryptoError::MalformedSignature);
        }
        let mut r = [0u8; SCALAR_SIZE];
        let mut s = [0u8; SCALAR_SIZE];
        r.copy_from_slice(&bytes[..SCALAR_SIZE]);
        s.copy_from_slice(&bytes[SCALAR_SIZE..]);
        Ok(Self { r, s })
    }

    pub fn to_hex(&self) -> String {
        let mut out = String::with_capacity(SCALAR_SIZE * 4);
        out.push_str(&hex::encode(self.r));
        out.push_str(&hex::encode(self.s));
        out
    }
}

impl Serialize for Signature {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Signature {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(s.trim()).map_err(serde::de::Error::custom)?;
        Signature::from_rs_bytes(&bytes).map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Key pair
// ---------------------------------------------------------------------------

#[derive(Clone)]
enum SecretKey {
    Secp256k1(k256::ecdsa::SigningKey),
    P256(p256::ecdsa::SigningKey),
}

/// A private key on one of the supported curves.
/// Keys are generated client-side and never leave the client.
#[derive(Clone)]
pub struct KeyPair {
    secret: SecretKey,
    public: PublicKey,
}

impl KeyPair {
    /// Generate a new random key on the given curve
    pub fn generate(curve: Curve) -> Self {
        let secret = match curve {
            Curve::Secp256k1 => SecretKey::Secp256k1(k256::ecdsa::SigningKey::random(&mut OsRng)),
            Curve::P256 => SecretKey::P256(p256::ecdsa::SigningKey::random(&mut OsRng)),
        };
        Self::from_secret(secret)
    }

    /// Restore a key from its 32-byte scalar
    pub fn from_secret_bytes(curve: Curve, secret: &[u8]) -> Result<Self, CryptoError> {
        let secret = match curve {
            Curve::Secp256k1 => SecretKey::Secp256k1(
                k256::ecdsa::SigningKey::from_slice(secret).map_err(|_| CryptoError::MalformedKey)?,
            ),
            Curve::P256 => SecretKey::P256(
                p256::ecdsa::SigningKey::from_slice(secret).map_err(|_| CryptoError::MalformedKey)?,
            ),
        };
        Ok(Self::from_secret(secret))
    }

    fn from_secret(secret: SecretKey) -> Self {
        let (curve, encoded) = match &secret {
            SecretKey::Secp256k1(key) => (
                Curve::Secp256k1,
                key.verifying_key().to_encoded_point(true).as_bytes().to_vec(),
            ),
            SecretKey::P256(key) => (
                Curve::P256,
                key.verifying_key().to_encoded_point(true).as_bytes().to_vec(),
            ),
        };
        let mut point = [0u8; COMPRESSED_POINT_SIZE];
        point.copy_from_slice(&encoded);
        Self {
            secret,
            public: PublicKey { curve, point },
        }
    }

    /// Raw secret scalar bytes
    pub fn secret_bytes(&self) -> [u8; SCALAR_SIZE] {
        let bytes = match &self.secret {
            SecretKey::Secp256k1(key) => key.to_bytes(),
            SecretKey::P256(key) => key.to_bytes(),
        };
        let mut out = [0u8; SCALAR_SIZE];
        out.copy_from_slice(&bytes);
        out
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }

    pub fn curve(&self) -> Curve {
        self.public.curve
    }

    pub fn address(&self) -> Address {
        self.public.address()
    }

    /// Sign the double SHA-256 of `content`. Signatures are low-S normalized.
    pub fn sign(&self, content: &[u8]) -> Result<Signature, CryptoError> {
        let digest = double_sha256(content);
        let bytes = match &self.secret {
            SecretKey::Secp256k1(key) => {
                let sig: k256::ecdsa::Signature = key
                    .sign_prehash(&digest)
                    .map_err(|_| CryptoError::SigningFailed)?;
                sig.normalize_s().unwrap_or(sig).to_bytes()
            }
            SecretKey::P256(key) => {
                let sig: p256::ecdsa::Signature = key
                    .sign_prehash(&digest)
                    .map_err(|_| CryptoError::SigningFailed)?;
                sig.normalize_s().unwrap_or(sig).to_bytes()
            }
        };
        Signature::from_rs_bytes(&bytes)
    }

    /// Raw ECDH shared secret (x-coordinate) with a peer on the same curve.
    pub fn diffie_hellman(&self, peer: &PublicKey) -> Result<[u8; 32], CryptoError> {
        let mut out = [0u8; 32];
        match (&self.secret, peer.curve) {
            (SecretKey::Secp256k1(key), Curve::Secp256k1) => {
                let peer_key = k256::ecdsa::VerifyingKey::from_sec1_bytes(peer.point())
                    .map_err(|_| CryptoError::MalformedKey)?;
                let shared =
                    k256::ecdh::diffie_hellman(key.as_nonzero_scalar(), peer_key.as_affine());
                out.copy_from_slice(shared.raw_secret_bytes());
            }
            (SecretKey::P256(key), Curve::P256) => {
                let peer_key = p256::ecdsa::VerifyingKey::from_sec1_bytes(peer.point())
                    .map_err(|_| CryptoError::MalformedKey)?;
                let shared =
                    p256::ecdh::diffie_hellman(key.as_nonzero_scalar(), peer_key.as_affine());
                out.copy_from_slice(shared.raw_secret_bytes());
            }
            _ => return Err(CryptoError::CurveMismatch),
        }
        Ok(out)
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("public", &self.public)
            .finish_non_exhaustive()
    }
}
