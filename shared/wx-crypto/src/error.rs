//! Crypto Error Types

use thiserror::Error;

/// Errors produced while decoding or encoding a callback payload.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// The `EncodingAESKey` does not decode to a 32-byte AES key.
    #[error("Invalid EncodingAESKey: {0}")]
    InvalidKey(String),

    /// The ciphertext is not valid base64.
    #[error("Base64 decoding failed: {0}")]
    Base64(#[from] base64::DecodeError),

    /// Block alignment or PKCS#7 padding is invalid.
    #[error("Invalid padding: {0}")]
    Padding(String),

    /// The decrypted frame is truncated or its length field is inconsistent.
    #[error("Malformed payload frame: {0}")]
    MalformedFrame(String),

    /// The payload was encrypted for a different organization.
    #[error("Receiver mismatch: expected {expected}, found {found}")]
    TenantMismatch { expected: String, found: String },
}

/// Result type for crypto operations.
pub type Result<T> = std::result::Result<T, CryptoError>;
