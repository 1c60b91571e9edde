use deaddrop_shared::error::LookupError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChainError {
    #[error("Name '{0}' is already registered to another key")]
    NameTaken(String),

    #[error("Chain RPC unavailable: {0}")]
    Unavailable(String),
}

impl From<ChainError> for LookupError {
    fn from(e: ChainError) -> Self {
        match e {
            ChainError::Unavailable(msg) => LookupError::Unavailable(msg),
            other => LookupError::Internal(other.to_string()),
        }
    }
}
