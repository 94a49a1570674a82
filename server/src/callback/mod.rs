//! WeCom Callback Pipeline
//!
//! Verification, decryption, classification and relay of inbound enterprise
//! messaging callbacks.

pub mod classify;
pub mod error;
pub mod handlers;
pub mod relay;
pub mod ssrf;
pub mod xml;

use axum::{routing::get, Router};

use crate::api::AppState;

pub use classify::{classify, ClassificationResult, ProcessAction};
pub use error::CallbackError;
pub use relay::{RelayDispatcher, RelayError, RelayOutcome};
pub use xml::{DecryptedEvent, XmlError};

/// Create the callback router.
pub fn router() -> Router<AppState> {
    Router::new().route(
        "/{corp_id}/{agent_id}",
        get(handlers::verify_url).post(handlers::receive_event),
    )
}
