//! Identity proofs: short-lived signed assertions of key ownership.
//!
//! A client signs `deaddrop-identity-proof:<unix-minute>` with its key. The
//! relay reads the minute back out of the signed content, requires the
//! content to be exactly the canonical challenge for that minute, and
//! compares it against the range its [`ProofPolicy`] accepts.

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::constants::{DEFAULT_PROOF_WINDOW_SECS, IDENTITY_CHALLENGE};
use crate::envelope::Signed;
use crate::error::{CryptoError, EnvelopeError};
use crate::identity::KeyPair;

const SECS_PER_MINUTE: i64 = 60;

/// Challenge string for a given unix minute.
pub fn challenge(minute: i64) -> String {
    format!("{IDENTITY_CHALLENGE}:{minute}")
}

/// Minute encoded in `content`, if it is exactly a canonical challenge.
fn challenge_minute(content: &[u8]) -> Option<i64> {
    let text = std::str::from_utf8(content).ok()?;
    let minute: i64 = text
        .strip_prefix(IDENTITY_CHALLENGE)?
        .strip_prefix(':')?
        .parse()
        .ok()?;
    // Rejects "+5", "007" and other non-canonical spellings of the same minute.
    (challenge(minute) == text).then_some(minute)
}

/// First unix minute that is at most `age_secs` before `now_secs`.
fn oldest_minute(now_secs: i64, age_secs: u64) -> i64 {
    let age = i64::try_from(age_secs).unwrap_or(i64::MAX);
    now_secs.saturating_sub(age).div_euclid(SECS_PER_MINUTE)
}

/// Sign the challenge bound to `now`.
pub fn identity_proof(key: &KeyPair, now: DateTime<Utc>) -> Result<Signed, CryptoError> {
    let minute = now.timestamp().div_euclid(SECS_PER_MINUTE);
    Signed::create(key, challenge(minute).into_bytes())
}

/// How a proof that passed verification was classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    Fresh,
    /// Older than the window but inside the stale grace period.
    Stale,
}

/// Server-side acceptance window for identity proofs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProofPolicy {
    /// Maximum accepted proof age.
    pub window_secs: u64,
    /// Extra age tolerated during migrations. Accepted proofs in this range
    /// are logged; set to zero to disable.
    pub stale_grace_secs: u64,
}

impl Default for ProofPolicy {
    fn default() -> Self {
        Self {
            window_secs: DEFAULT_PROOF_WINDOW_SECS,
            stale_grace_secs: 0,
        }
    }
}

impl ProofPolicy {
    pub fn new(window_secs: u64, stale_grace_secs: u64) -> Self {
        Self {
            window_secs,
            stale_grace_secs,
        }
    }

    /// Verify the signature, then match the content against the recomputed challenges.
    pub fn check(&self, proof: &Signed, now: DateTime<Utc>) -> Result<Freshness, EnvelopeError> {
        proof
            .verify()
            .map_err(|e| EnvelopeError::Authentication(format!("identity proof: {e}")))?;

        let minute = challenge_minute(&proof.content).ok_or_else(|| {
            EnvelopeError::Authentication("identity proof is not a challenge".to_string())
        })?;

        let now_secs = now.timestamp();
        let current = now_secs.div_euclid(SECS_PER_MINUTE);
        let oldest_fresh = oldest_minute(now_secs, self.window_secs);
        let oldest_stale =
            oldest_minute(now_secs, self.window_secs.saturating_add(self.stale_grace_secs));

        // One minute of forward clock skew is tolerated.
        if (oldest_fresh..=current.saturating_add(1)).contains(&minute) {
            return Ok(Freshness::Fresh);
        }

        if self.stale_grace_secs > 0 && (oldest_stale..oldest_fresh).contains(&minute) {
            warn!(
                key = %proof.key.address(),
                window_secs = self.window_secs,
                "Accepting stale identity proof inside grace period"
            );
            return Ok(Freshness::Stale);
        }

        Err(EnvelopeError::Authentication(
            "identity proof outside acceptance window".to_string(),
        ))
    }
}
