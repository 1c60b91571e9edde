/// Compressed SEC1 point size in bytes (parity byte || X)
pub const COMPRESSED_POINT_SIZE: usize = 33;

/// Serialized public key size: curve tag || compressed point
pub const SERIALIZED_KEY_SIZE: usize = 1 + COMPRESSED_POINT_SIZE;

/// ECDSA scalar size in bytes (R and S each)
pub const SCALAR_SIZE: usize = 32;

/// Fingerprint size in bytes (truncated SHA-256 of the serialized key)
pub const FINGERPRINT_SIZE: usize = 20;

/// ChaCha20-Poly1305 nonce size (legacy scheme)
pub const LEGACY_NONCE_SIZE: usize = 12;

/// XChaCha20-Poly1305 nonce size (current scheme)
pub const NONCE_SIZE: usize = 24;

/// Symmetric key size in bytes
pub const SYMMETRIC_KEY_SIZE: usize = 32;

/// Maximum ciphertext accepted by the relay (256 KiB)
pub const MAX_MESSAGE_SIZE: usize = 262_144;

/// Maximum number of parent keys a key may delegate to
pub const MAX_PARENT_KEYS: usize = 16;

/// Maximum length of a registered name
pub const MAX_NAME_LEN: usize = 64;

/// Default proof-of-work difficulty for registry mutations (leading zero bits)
pub const DEFAULT_POW_DIFFICULTY: u32 = 10;

/// Default identity proof acceptance window in seconds
pub const DEFAULT_PROOF_WINDOW_SECS: u64 = 120;

/// Default mailbox TTL in seconds (7 days)
pub const DEFAULT_MESSAGE_MAX_AGE_SECS: u64 = 7 * 24 * 60 * 60;

/// Challenge prefix signed by identity proofs
pub const IDENTITY_CHALLENGE: &str = "deaddrop-identity-proof";

/// Domain tag for the canonical message hash
pub const MESSAGE_HASH_DOMAIN: &[u8] = b"deaddrop-message-v1";

/// Key derivation context for the current ECDH scheme (BLAKE3)
pub const KDF_CONTEXT_MESSAGE_KEY: &str = "deaddrop-message-key-v2";
