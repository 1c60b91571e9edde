//! Proof-of-work stamps.
//!
//! A stamp is a `u64` nonce such that `sha256(data || nonce_be)` starts with
//! at least `difficulty` zero bits. Registry mutations must carry one, which
//! puts a computational price on spam and sybil registrations.
//!
//! [`compute`] is CPU-bound and unbounded. It always runs on the client and is
//! never called from a request handler; wrap it in a cancelable task at the
//! call site if a deadline is needed. [`verify`] is a single hash.

use rand::RngCore;
use sha2::{Digest, Sha256};

fn stamp_hash(data: &[u8], nonce: u64) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.update(nonce.to_be_bytes());
    let mut out = [0u8; 32];
    out.copy_from_slice(&hasher.finalize());
    out
}

/// Check that `hash` starts with `difficulty` zero bits, most significant bit first.
pub fn has_leading_zero_bits(hash: &[u8], difficulty: u32) -> bool {
    let full_bytes = (difficulty / 8) as usize;
    let remaining_bits = difficulty % 8;

    let needed = full_bytes + usize::from(remaining_bits > 0);
    if needed > hash.len() {
        return false;
    }

    if hash[..full_bytes].iter().any(|b| *b != 0) {
        return false;
    }

    if remaining_bits > 0 {
        // Partial final byte: the top `remaining_bits` bits must be clear.
        let mask = 0xffu8 << (8 - remaining_bits);
        if hash[full_bytes] & mask != 0 {
            return false;
        }
    }

    true
}

/// Search for a nonce satisfying `difficulty`, starting from a random seed.
pub fn compute(data: &[u8], difficulty: u32) -> u64 {
    let mut nonce = rand::rngs::OsRng.next_u64();
    loop {
        if has_leading_zero_bits(&stamp_hash(data, nonce), difficulty) {
            return nonce;
        }
        nonce = nonce.wrapping_add(1);
    }
}

/// Recompute the stamp hash and check it against `difficulty`.
pub fn verify(data: &[u8], nonce: u64, difficulty: u32) -> bool {
    has_leading_zero_bits(&stamp_hash(data, nonce), difficulty)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_leading_zero_bits_byte_aligned() {
        assert!(has_leading_zero_bits(&[0x00, 0x00, 0xff], 16));
        assert!(!has_leading_zero_bits(&[0x00, 0x01, 0xff], 16));
        assert!(has_leading_zero_bits(&[0xff], 0));
    }

    #[test]
    fn test_leading_zero_bits_partial_byte() {
        // 0x1f = 0001_1111: three leading zero bits.
        assert!(has_leading_zero_bits(&[0x00, 0x1f], 11));
        assert!(!has_leading_zero_bits(&[0x00, 0x1f], 12));
        assert!(has_leading_zero_bits(&[0x7f], 1));
        assert!(!has_leading_zero_bits(&[0x80], 1));
    }

    #[test]
    fn test_difficulty_beyond_hash_length() {
        assert!(!has_leading_zero_bits(&[0u8; 32], 257));
        assert!(has_leading_zero_bits(&[0u8; 32], 256));
    }

    #[test]
    fn test_compute_verify_roundtrip() {
        for difficulty in [0, 1, 7, 8, 9, 12, 16] {
            let data = format!("payload-{difficulty}");
            let nonce = compute(data.as_bytes(), difficulty);
            assert!(verify(data.as_bytes(), nonce, difficulty));
        }
    }

    #[test]
    fn test_stamp_is_bound_to_data() {
        let nonce = compute(b"registration", 16);
        assert!(verify(b"registration", nonce, 16));

        // Flipping any nonce byte should break a 16-bit stamp except with
        // probability 2^-16 per flip.
        let broken = (0..8)
            .filter(|i| !verify(b"registration", nonce ^ (0xffu64 << (8 * i)), 16))
            .count();
        assert!(broken >= 7);
    }
}
