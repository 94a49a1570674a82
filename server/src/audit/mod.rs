//! Audit Log
//!
//! Append-only record of every callback pipeline stage, persisted through an
//! [`AuditSink`] and streamed live to WebSocket subscribers.

pub mod broadcast;
pub mod sink;
pub mod types;
pub mod ws;

pub use broadcast::{LogBroadcaster, Subscription};
pub use sink::{AuditError, AuditLog, AuditSink, InMemoryAuditSink, PgAuditSink};
pub use types::{AuditRecord, AuditStatus};
