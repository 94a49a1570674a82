//! Audit Sink
//!
//! Append-only persistence of audit records. Writing an audit record never
//! changes the outcome of the request that produced it.

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use serde_json::Value;
use sqlx::PgPool;
use thiserror::Error;
use tracing::{debug, error};
use uuid::Uuid;

use super::broadcast::LogBroadcaster;
use super::types::{AuditRecord, AuditStatus};

/// Audit persistence errors.
#[derive(Error, Debug)]
pub enum AuditError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Destination for audit records.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn append(&self, record: &AuditRecord) -> Result<(), AuditError>;
}

/// `PostgreSQL`-backed audit sink writing to `event_logs`.
#[derive(Clone)]
pub struct PgAuditSink {
    pool: PgPool,
}

impl PgAuditSink {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditSink for PgAuditSink {
    async fn append(&self, record: &AuditRecord) -> Result<(), AuditError> {
        sqlx::query(
            r"
            INSERT INTO event_logs (id, connection_id, event_type, status, details, metadata, timestamp)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ",
        )
        .bind(record.id)
        .bind(record.connection_id)
        .bind(&record.event_type)
        .bind(record.status.as_str())
        .bind(&record.details)
        .bind(&record.metadata)
        .bind(record.timestamp)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

/// In-memory audit sink preserving insertion order.
#[derive(Default)]
pub struct InMemoryAuditSink {
    records: Mutex<Vec<AuditRecord>>,
}

impl InMemoryAuditSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all records appended so far.
    pub fn records(&self) -> Vec<AuditRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl AuditSink for InMemoryAuditSink {
    async fn append(&self, record: &AuditRecord) -> Result<(), AuditError> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record.clone());
        Ok(())
    }
}

/// Audit writer: persists each record and fans it out to live subscribers.
#[derive(Clone)]
pub struct AuditLog {
    sink: Arc<dyn AuditSink>,
    broadcaster: LogBroadcaster,
}

impl AuditLog {
    #[must_use]
    pub fn new(sink: Arc<dyn AuditSink>, broadcaster: LogBroadcaster) -> Self {
        Self { sink, broadcaster }
    }

    pub const fn broadcaster(&self) -> &LogBroadcaster {
        &self.broadcaster
    }

    /// Persist a record, then broadcast it. Failures are logged and swallowed.
    pub async fn record(&self, record: AuditRecord) {
        if let Err(e) = self.sink.append(&record).await {
            error!(
                event_type = %record.event_type,
                status = %record.status,
                error = %e,
                "Failed to persist audit record"
            );
            return;
        }

        let delivered = self.broadcaster.broadcast(&record);
        debug!(
            event_type = %record.event_type,
            status = %record.status,
            delivered,
            "Audit record written"
        );
    }

    pub async fn success(
        &self,
        connection_id: Option<Uuid>,
        event_type: &str,
        details: impl Into<String>,
        metadata: Value,
    ) {
        self.record(AuditRecord::new(
            connection_id,
            event_type,
            AuditStatus::Success,
            details,
            metadata,
        ))
        .await;
    }

    pub async fn error(
        &self,
        connection_id: Option<Uuid>,
        event_type: &str,
        details: impl Into<String>,
        metadata: Value,
    ) {
        self.record(AuditRecord::new(
            connection_id,
            event_type,
            AuditStatus::Error,
            details,
            metadata,
        ))
        .await;
    }

    pub async fn processing(
        &self,
        connection_id: Option<Uuid>,
        event_type: &str,
        details: impl Into<String>,
        metadata: Value,
    ) {
        self.record(AuditRecord::new(
            connection_id,
            event_type,
            AuditStatus::Processing,
            details,
            metadata,
        ))
        .await;
    }

    pub async fn info(
        &self,
        connection_id: Option<Uuid>,
        event_type: &str,
        details: impl Into<String>,
        metadata: Value,
    ) {
        self.record(AuditRecord::new(
            connection_id,
            event_type,
            AuditStatus::Info,
            details,
            metadata,
        ))
        .await;
    }
}
