//! WeCom Callback Cryptography
//!
//! Primitives for the platform's callback protocol.
//!
//! - **Signature**: SHA-1 over the sorted `token`, `timestamp`, `nonce` and payload
//! - **Payload**: AES-256-CBC framed envelope keyed by the 43-character `EncodingAESKey`

pub mod error;
pub mod payload;
pub mod signature;

pub use error::{CryptoError, Result};
pub use payload::PayloadCodec;
pub use signature::{compute_signature, verify};
