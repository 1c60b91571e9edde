use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use deaddrop_shared::error::{CryptoError, EnvelopeError, LookupError, ProtocolError};
use deaddrop_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    /// Expected absence: empty mailbox, unknown name. Never logged above debug.
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Not authorized: {0}")]
    NotAuthorized(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailure(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Capacity exceeded: {0}")]
    CapacityExceeded(String),

    #[error("Upstream resolver unavailable: {0}")]
    Unavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ServerError::NotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),
            ServerError::AlreadyExists(_) => (StatusCode::CONFLICT, self.to_string()),
            ServerError::NotAuthorized(_) => (StatusCode::FORBIDDEN, self.to_string()),
            ServerError::AuthenticationFailure(_) => (StatusCode::UNAUTHORIZED, self.to_string()),
            ServerError::BadRequest(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            ServerError::CapacityExceeded(_) => {
                (StatusCode::UNPROCESSABLE_ENTITY, self.to_string())
            }
            ServerError::Unavailable(_) => {
                tracing::warn!(error = %self, "Resolver tier unavailable");
                (StatusCode::SERVICE_UNAVAILABLE, "Upstream resolver unavailable".to_string())
            }
            ServerError::Internal(_) => {
                tracing::error!(error = %self, "Request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };

        let body = serde_json::json!({
            "error": message,
        });

        (status, axum::Json(body)).into_response()
    }
}

impl From<StoreError> for ServerError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound => ServerError::NotFound("no such record".to_string()),
            StoreError::AlreadyExists(msg) => ServerError::AlreadyExists(msg),
            StoreError::NotAuthorized(msg) => ServerError::NotAuthorized(msg),
            StoreError::CapacityExceeded(msg) => ServerError::CapacityExceeded(msg),
            StoreError::Invalid(msg) => ServerError::BadRequest(msg),
            other => ServerError::Internal(other.to_string()),
        }
    }
}

impl From<LookupError> for ServerError {
    fn from(e: LookupError) -> Self {
        match e {
            LookupError::NotFound => ServerError::NotFound("no current binding".to_string()),
            LookupError::Unavailable(msg) => ServerError::Unavailable(msg),
            LookupError::Internal(msg) => ServerError::Internal(msg),
        }
    }
}

impl From<EnvelopeError> for ServerError {
    fn from(e: EnvelopeError) -> Self {
        match e {
            EnvelopeError::Authentication(msg) => ServerError::AuthenticationFailure(msg),
            EnvelopeError::Lookup(e) => e.into(),
            EnvelopeError::Crypto(e) => ServerError::AuthenticationFailure(e.to_string()),
        }
    }
}

impl From<CryptoError> for ServerError {
    fn from(e: CryptoError) -> Self {
        ServerError::BadRequest(e.to_string())
    }
}

impl From<ProtocolError> for ServerError {
    fn from(e: ProtocolError) -> Self {
        ServerError::BadRequest(e.to_string())
    }
}

impl From<tokio::task::JoinError> for ServerError {
    fn from(e: tokio::task::JoinError) -> Self {
        ServerError::Internal(format!("blocking task failed: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(e: ServerError) -> StatusCode {
        e.into_response().status()
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(status(StoreError::NotFound.into()), StatusCode::NOT_FOUND);
        assert_eq!(
            status(StoreError::AlreadyExists("k".into()).into()),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status(StoreError::NotAuthorized("k".into()).into()),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            status(StoreError::CapacityExceeded("k".into()).into()),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status(EnvelopeError::Authentication("sig".into()).into()),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            status(LookupError::NotFound.into()),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status(StoreError::LockPoisoned.into()),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
