//! Callback Error Types

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use thiserror::Error;
use wx_crypto::CryptoError;

use super::relay::RelayError;
use super::xml::XmlError;
use crate::connections::StoreError;

/// Failures of the callback pipeline.
#[derive(Debug, Error)]
pub enum CallbackError {
    /// `msg_signature`, `timestamp` or `nonce` absent or empty.
    #[error("Missing required parameters")]
    MissingParameters,

    /// No connection registered for the `(corp_id, agent_id)` pair.
    #[error("Connection not found")]
    ConnectionNotFound,

    #[error("Signature verification failed")]
    SignatureMismatch,

    #[error("Message decryption failed: {0}")]
    DecryptionFailed(#[from] CryptoError),

    /// The POST body is not an envelope carrying `<Encrypt>`.
    #[error("Invalid callback envelope: {0}")]
    InvalidEnvelope(XmlError),

    /// Authenticated payload that does not parse. Acknowledged.
    #[error("Failed to parse decrypted message: {0}")]
    XmlParse(XmlError),

    /// Downstream relay failure. Acknowledged.
    #[error("Relay delivery failed: {0}")]
    RelayDeliveryFailed(#[from] RelayError),

    #[error("Connection store error: {0}")]
    Store(#[from] StoreError),
}

impl CallbackError {
    /// HTTP status and plain-text body returned to the platform.
    #[must_use]
    pub const fn status_and_body(&self) -> (StatusCode, &'static str) {
        match self {
            Self::MissingParameters => (StatusCode::BAD_REQUEST, "Missing required parameters"),
            Self::ConnectionNotFound => (StatusCode::NOT_FOUND, "Connection not found"),
            Self::SignatureMismatch => (StatusCode::UNAUTHORIZED, "Signature verification failed"),
            Self::DecryptionFailed(_) | Self::InvalidEnvelope(_) => {
                (StatusCode::BAD_REQUEST, "Message decryption failed")
            }
            Self::XmlParse(_) | Self::RelayDeliveryFailed(_) => (StatusCode::OK, "success"),
            Self::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error"),
        }
    }

    /// Whether the platform still receives `200 success` for this failure.
    #[must_use]
    pub const fn is_acknowledged(&self) -> bool {
        matches!(self, Self::XmlParse(_) | Self::RelayDeliveryFailed(_))
    }

    /// Response for URL verification, where any authentication failure is a 401.
    #[must_use]
    pub fn into_verification_response(self) -> Response {
        match self {
            Self::SignatureMismatch | Self::DecryptionFailed(_) => {
                plain_text(StatusCode::UNAUTHORIZED, "Verification failed")
            }
            other => other.into_response(),
        }
    }
}

impl IntoResponse for CallbackError {
    fn into_response(self) -> Response {
        let (status, body) = self.status_and_body();
        plain_text(status, body)
    }
}

/// A `text/plain` response.
pub fn plain_text(status: StatusCode, body: impl Into<String>) -> Response {
    (status, [(header::CONTENT_TYPE, "text/plain")], body.into()).into_response()
}
