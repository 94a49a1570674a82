//! Audit Types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Outcome recorded for a pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuditStatus {
    Success,
    Error,
    Processing,
    Info,
}

impl AuditStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "Success",
            Self::Error => "Error",
            Self::Processing => "Processing",
            Self::Info => "Info",
        }
    }
}

impl std::fmt::Display for AuditStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One append-only audit log entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecord {
    pub id: Uuid,
    /// `None` for system-level records written before a connection was resolved.
    pub connection_id: Option<Uuid>,
    pub event_type: String,
    pub status: AuditStatus,
    pub details: String,
    pub metadata: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl AuditRecord {
    /// Create a record stamped with a fresh id and the current time.
    pub fn new(
        connection_id: Option<Uuid>,
        event_type: impl Into<String>,
        status: AuditStatus,
        details: impl Into<String>,
        metadata: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            connection_id,
            event_type: event_type.into(),
            status,
            details: details.into(),
            metadata,
            timestamp: Utc::now(),
        }
    }
}
