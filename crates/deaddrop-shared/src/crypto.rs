use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce, XChaCha20Poly1305, XNonce,
};
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::constants::{KDF_CONTEXT_MESSAGE_KEY, LEGACY_NONCE_SIZE, NONCE_SIZE, SYMMETRIC_KEY_SIZE};
use crate::error::CryptoError;
use crate::identity::{EcdhVersion, KeyPair, PublicKey};

pub type SymmetricKey = [u8; SYMMETRIC_KEY_SIZE];

fn random_bytes<const N: usize>() -> [u8; N] {
    let mut out = [0u8; N];
    rand::rngs::OsRng.fill_bytes(&mut out);
    out
}

// Returns nonce || ciphertext (24 bytes nonce prepended)
pub fn encrypt(key: &SymmetricKey, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let cipher = XChaCha20Poly1305::new(key.into());
    let nonce_bytes = random_bytes::<NONCE_SIZE>();
    let nonce = XNonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|_| CryptoError::EncryptionFailed)?;

    let mut output = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    output.extend_from_slice(&nonce_bytes);
    output.extend_from_slice(&ciphertext);
    Ok(output)
}

pub fn decrypt(key: &SymmetricKey, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if data.len() < NONCE_SIZE {
        return Err(CryptoError::DecryptionFailed);
    }

    let (nonce_bytes, ciphertext) = data.split_at(NONCE_SIZE);
    let cipher = XChaCha20Poly1305::new(key.into());
    let nonce = XNonce::from_slice(nonce_bytes);

    cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| CryptoError::DecryptionFailed)
}

// Legacy scheme: nonce || ciphertext with a 12-byte nonce
pub fn encrypt_legacy(key: &SymmetricKey, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let cipher = ChaCha20Poly1305::new(key.into());
    let nonce_bytes = random_bytes::<LEGACY_NONCE_SIZE>();
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|_| CryptoError::EncryptionFailed)?;

    let mut output = Vec::with_capacity(LEGACY_NONCE_SIZE + ciphertext.len());
    output.extend_from_slice(&nonce_bytes);
    output.extend_from_slice(&ciphertext);
    Ok(output)
}

pub fn decrypt_legacy(key: &SymmetricKey, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if data.len() < LEGACY_NONCE_SIZE {
        return Err(CryptoError::DecryptionFailed);
    }

    let (nonce_bytes, ciphertext) = data.split_at(LEGACY_NONCE_SIZE);
    let cipher = ChaCha20Poly1305::new(key.into());
    let nonce = Nonce::from_slice(nonce_bytes);

    cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| CryptoError::DecryptionFailed)
}

/// Derive the per-pair message key from an ECDH shared secret.
///
/// V1 hashes the raw x-coordinate. V2 uses BLAKE3 with domain separation and
/// binds both public keys in sender/receiver order.
pub fn derive_message_key(
    version: EcdhVersion,
    shared_secret: &[u8; 32],
    sender: &PublicKey,
    receiver: &PublicKey,
) -> SymmetricKey {
    let mut key = [0u8; 32];
    match version {
        EcdhVersion::V1 => {
            key.copy_from_slice(&Sha256::digest(shared_secret));
        }
        EcdhVersion::V2 => {
            let mut hasher = blake3::Hasher::new_derive_key(KDF_CONTEXT_MESSAGE_KEY);
            hasher.update(shared_secret);
            hasher.update(&sender.to_bytes());
            hasher.update(&receiver.to_bytes());
            key.copy_from_slice(hasher.finalize().as_bytes());
        }
    }
    key
}

/// Encrypt `plaintext` from `sender` to `receiver`; the scheme follows the curve.
pub fn encrypt_for(
    sender: &KeyPair,
    receiver: &PublicKey,
    plaintext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    if sender.curve() != receiver.curve() {
        return Err(CryptoError::CurveMismatch);
    }
    let context = receiver.context();
    let shared = sender.diffie_hellman(receiver)?;
    let key = derive_message_key(context.ecdh_version, &shared, sender.public_key(), receiver);
    match context.ecdh_version {
        EcdhVersion::V1 => encrypt_legacy(&key, plaintext),
        EcdhVersion::V2 => encrypt(&key, plaintext),
    }
}

/// Decrypt a ciphertext produced by [`encrypt_for`] with the receiver's key.
pub fn decrypt_from(
    receiver: &KeyPair,
    sender: &PublicKey,
    ciphertext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    if receiver.curve() != sender.curve() {
        return Err(CryptoError::CurveMismatch);
    }
    let context = sender.context();
    let shared = receiver.diffie_hellman(sender)?;
    let key = derive_message_key(context.ecdh_version, &shared, sender, receiver.public_key());
    match context.ecdh_version {
        EcdhVersion::V1 => decrypt_legacy(&key, ciphertext),
        EcdhVersion::V2 => decrypt(&key, ciphertext),
    }
}
