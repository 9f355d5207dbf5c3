//! Append-only audit trail for admin and workflow actions.
//!
//! Auditing never fails the caller: use [`record_quietly`], which logs a
//! sink failure and moves on.

use async_trait::async_trait;
use sqlx::PgPool;
use sqlx::types::Json;
use thiserror::Error;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::context::RequestContext;

#[derive(Debug, Clone, PartialEq)]
pub struct AuditRecord {
    pub action: &'static str,
    pub entity_type: &'static str,
    pub entity_id: String,
    /// `None` for actions taken by background jobs.
    pub actor_id: Option<Uuid>,
    pub reason: Option<String>,
    pub metadata: serde_json::Value,
    pub request_id: String,
    pub created_at: OffsetDateTime,
}

impl AuditRecord {
    pub fn new(
        action: &'static str,
        entity_type: &'static str,
        entity_id: impl ToString,
        ctx: &RequestContext,
    ) -> Self {
        Self {
            action,
            entity_type,
            entity_id: entity_id.to_string(),
            actor_id: None,
            reason: None,
            metadata: serde_json::Value::Object(Default::default()),
            request_id: ctx.request_id().to_string(),
            created_at: OffsetDateTime::now_utc(),
        }
    }

    pub fn actor(mut self, actor_id: Uuid) -> Self {
        self.actor_id = Some(actor_id);
        self
    }

    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, record: AuditRecord) -> Result<(), AuditError>;
}

/// Record `record`, logging instead of propagating a sink failure.
pub async fn record_quietly(sink: &dyn AuditSink, record: AuditRecord) {
    let action = record.action;
    let entity_id = record.entity_id.clone();
    if let Err(err) = sink.record(record).await {
        tracing::warn!(error = %err, action, entity_id, "Failed to write audit record");
    }
}

/// Writes to the `audit_log` table.
#[derive(Debug, Clone)]
pub struct PgAuditSink {
    pool: PgPool,
}

impl PgAuditSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditSink for PgAuditSink {
    #[tracing::instrument(skip_all, err, name = "SQL:InsertAuditRecord")]
    async fn record(&self, record: AuditRecord) -> Result<(), AuditError> {
        sqlx::query(
            r#"
            INSERT INTO audit_log
                (id, action, entity_type, entity_id, actor_id, reason, metadata, request_id, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(record.action)
        .bind(record.entity_type)
        .bind(&record.entity_id)
        .bind(record.actor_id)
        .bind(&record.reason)
        .bind(Json(&record.metadata))
        .bind(&record.request_id)
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

/// Emits each record as a structured log line under the `audit` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, record: AuditRecord) -> Result<(), AuditError> {
        tracing::info!(
            target: "audit",
            action = record.action,
            entity_type = record.entity_type,
            entity_id = %record.entity_id,
            actor_id = ?record.actor_id,
            reason = ?record.reason,
            request_id = %record.request_id,
            metadata = %record.metadata,
            "audit"
        );
        Ok(())
    }
}

/// Keeps records in memory. Used by tests.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    records: Mutex<Vec<AuditRecord>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().await.clone()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn record(&self, record: AuditRecord) -> Result<(), AuditError> {
        self.records.lock().await.push(record);
        Ok(())
    }
}
