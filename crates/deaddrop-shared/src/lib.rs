pub mod auth;
pub mod constants;
pub mod crypto;
pub mod envelope;
pub mod error;
pub mod identity;
pub mod lookup;
pub mod pow;
pub mod protocol;
pub mod types;

pub use envelope::{Message, Signed, SignedWithProof};
pub use error::{CryptoError, EnvelopeError, LookupError, ProtocolError};
pub use identity::{Curve, KeyPair, PublicKey, Signature};
pub use lookup::{KeyInfo, LookupResult, Resolver};
