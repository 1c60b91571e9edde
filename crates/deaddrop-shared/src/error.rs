use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("Encryption failed")]
    EncryptionFailed,

    #[error("Decryption failed: invalid ciphertext or wrong key")]
    DecryptionFailed,

    #[error("Malformed key bytes")]
    MalformedKey,

    #[error("Unsupported curve tag: {0:#04x}")]
    UnsupportedCurve(u8),

    #[error("Curve mismatch between sender and receiver keys")]
    CurveMismatch,

    #[error("Signing failed")]
    SigningFailed,

    #[error("Malformed signature")]
    MalformedSignature,

    #[error("Signature verification failed")]
    BadSignature,
}

/// Result of resolving a name, address or key through a resolver tier.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LookupError {
    /// No current binding. Expected and polled-for; never an anomaly.
    #[error("Not found")]
    NotFound,

    #[error("Resolver unavailable: {0}")]
    Unavailable(String),

    #[error("Resolver internal error: {0}")]
    Internal(String),
}

#[derive(Error, Debug)]
pub enum EnvelopeError {
    /// Signature, proof-of-work or identity proof did not verify.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Lookup failed: {0}")]
    Lookup(#[from] LookupError),

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),
}

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Invalid name: {0}")]
    InvalidName(String),

    #[error("Payload encoding error: {0}")]
    Encoding(#[from] bincode::Error),

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),
}
