//! Tenant Connections
//!
//! Read-only access to the WeCom application registrations owned by the
//! configuration store. Each callback re-resolves its connection; nothing is cached.

pub mod store;
pub mod types;

pub use store::{ConnectionStore, InMemoryConnectionStore, PgConnectionStore, StoreError};
pub use types::{Connection, ConnectionSummary};
