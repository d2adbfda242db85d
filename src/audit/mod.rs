use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use tracing::warn;
use uuid::Uuid;

/// One record of a mutating action. Entries are appended after the primary
/// transaction commits; auditing is observational only.
#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub actor_id: Option<String>,
    pub operation_type: String,
    pub operation_module: String,
    pub description: String,
    pub target_type: Option<String>,
    pub target_id: Option<String>,
    pub result: String,
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Best-effort append. Implementations swallow their own failures; a
    /// broken audit trail must never fail the action it describes.
    async fn log_operation(&self, entry: AuditEntry);
}

pub struct DbAuditSink {
    db: SqlitePool,
}

impl DbAuditSink {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl AuditSink for DbAuditSink {
    async fn log_operation(&self, entry: AuditEntry) {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();

        let result = sqlx::query(
            "INSERT INTO admin_operation_logs \
             (id, actor_id, operation_type, operation_module, operation_description, \
              target_type, target_id, result, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(&entry.actor_id)
        .bind(&entry.operation_type)
        .bind(&entry.operation_module)
        .bind(&entry.description)
        .bind(&entry.target_type)
        .bind(&entry.target_id)
        .bind(&entry.result)
        .bind(&now)
        .execute(&self.db)
        .await;

        if let Err(err) = result {
            warn!("audit log write failed: {}", err);
        }
    }
}

/// Sink that discards everything. Used by tests that are not about auditing.
pub struct NoopAuditSink;

#[async_trait]
impl AuditSink for NoopAuditSink {
    async fn log_operation(&self, _entry: AuditEntry) {}
}
