use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::info;

use crate::audit::{AuditEntry, AuditSink};
use crate::db::repository;
use crate::error::AppError;
use crate::models::SelectionStatus;
use crate::services::locks::CourseLocks;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmergencyAction {
    ForceSelect,
    ForceDrop,
    MoveToWaiting,
    RemoveFromWaiting,
}

impl EmergencyAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmergencyAction::ForceSelect => "force_select",
            EmergencyAction::ForceDrop => "force_drop",
            EmergencyAction::MoveToWaiting => "move_to_waiting",
            EmergencyAction::RemoveFromWaiting => "remove_from_waiting",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BatchOperation {
    pub user_id: String,
    pub course_id: String,
    pub action: EmergencyAction,
}

#[derive(Debug, Serialize)]
pub struct BatchOperationResult {
    pub user_id: String,
    pub course_id: String,
    pub action: EmergencyAction,
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub success_count: usize,
    pub failure_count: usize,
    pub results: Vec<BatchOperationResult>,
}

/// Administrator overrides on selection state. These bypass the period gate
/// and the conflict checkers; every action requires a reason and leaves one
/// audit entry. Record mutations here go straight past the student state
/// machine, so each transaction rebuilds the affected course's
/// `enrolled_count` from the selection rows before committing.
pub struct EmergencyService {
    db: SqlitePool,
    locks: Arc<CourseLocks>,
    audit: Arc<dyn AuditSink>,
}

impl EmergencyService {
    pub fn new(db: SqlitePool, locks: Arc<CourseLocks>, audit: Arc<dyn AuditSink>) -> Self {
        Self { db, locks, audit }
    }

    /// Apply one adjustment in its own transaction, under the course lock.
    pub async fn adjust(
        &self,
        admin_id: &str,
        user_id: &str,
        course_id: &str,
        action: EmergencyAction,
        reason: &str,
    ) -> Result<String, AppError> {
        if reason.trim().is_empty() {
            return Err(AppError::BadRequest(
                "a reason is required for emergency adjustments".to_string(),
            ));
        }

        if repository::find_user(&self.db, user_id).await?.is_none()
            || repository::find_course(&self.db, course_id).await?.is_none()
        {
            return Err(AppError::NotFound);
        }

        let lock = self.locks.for_course(course_id);
        let _guard = lock.lock().await;

        let mut tx = self.db.begin().await?;
        let message = apply_action(&mut tx, action, user_id, course_id, reason).await?;
        repository::resync_enrolled_count(&mut *tx, course_id).await?;
        tx.commit().await?;

        info!(
            "emergency adjustment by admin {}: {} on user {} / course {}",
            admin_id,
            action.as_str(),
            user_id,
            course_id
        );

        self.audit
            .log_operation(AuditEntry {
                actor_id: Some(admin_id.to_string()),
                operation_type: "manual_adjust".to_string(),
                operation_module: "emergency_handling".to_string(),
                description: format!(
                    "manual selection adjustment: user {user_id} / course {course_id} ({}) - reason: {reason}",
                    action.as_str()
                ),
                target_type: Some("course_selection".to_string()),
                target_id: Some(format!("{user_id}_{course_id}")),
                result: "success".to_string(),
            })
            .await;

        Ok(message)
    }

    /// Apply a heterogeneous list of adjustments inside ONE outer
    /// transaction, committed once at the end. A failing operation is
    /// recorded in the result list and does not abort the batch; statements
    /// it ran before failing are not rolled back individually.
    pub async fn batch_process(
        &self,
        admin_id: &str,
        operations: &[BatchOperation],
        reason: &str,
    ) -> Result<BatchSummary, AppError> {
        if operations.is_empty() {
            return Err(AppError::BadRequest(
                "operation list must not be empty".to_string(),
            ));
        }
        if reason.trim().is_empty() {
            return Err(AppError::BadRequest(
                "a reason is required for batch processing".to_string(),
            ));
        }

        let mut results = Vec::with_capacity(operations.len());
        let mut success_count = 0;
        let mut failure_count = 0;

        let mut tx = self.db.begin().await?;

        for op in operations {
            match apply_action(&mut tx, op.action, &op.user_id, &op.course_id, reason).await {
                Ok(message) => {
                    success_count += 1;
                    results.push(BatchOperationResult {
                        user_id: op.user_id.clone(),
                        course_id: op.course_id.clone(),
                        action: op.action,
                        success: true,
                        message,
                    });
                }
                Err(err) => {
                    failure_count += 1;
                    results.push(BatchOperationResult {
                        user_id: op.user_id.clone(),
                        course_id: op.course_id.clone(),
                        action: op.action,
                        success: false,
                        message: err.to_string(),
                    });
                }
            }
        }

        // Rebuild the counter of every course the batch touched before the
        // single commit.
        let mut course_ids: Vec<&str> = operations.iter().map(|op| op.course_id.as_str()).collect();
        course_ids.sort_unstable();
        course_ids.dedup();
        for course_id in course_ids {
            repository::resync_enrolled_count(&mut *tx, course_id).await?;
        }

        tx.commit().await?;

        self.audit
            .log_operation(AuditEntry {
                actor_id: Some(admin_id.to_string()),
                operation_type: "batch_adjust".to_string(),
                operation_module: "emergency_handling".to_string(),
                description: format!(
                    "batch selection processing: {success_count} succeeded, {failure_count} failed - reason: {reason}"
                ),
                target_type: None,
                target_id: None,
                result: "success".to_string(),
            })
            .await;

        Ok(BatchSummary {
            total: operations.len(),
            success_count,
            failure_count,
            results,
        })
    }

    /// Cancel every active selection configuration, closing the gate
    /// immediately. Returns how many configurations were stopped.
    pub async fn stop_selection(&self, admin_id: &str, reason: &str) -> Result<u64, AppError> {
        if reason.trim().is_empty() {
            return Err(AppError::BadRequest(
                "a reason is required to stop selection".to_string(),
            ));
        }

        if repository::active_configs(&self.db).await?.is_empty() {
            return Err(AppError::Conflict(
                "no active selection configuration".to_string(),
            ));
        }

        let mut tx = self.db.begin().await?;
        let now = Utc::now().to_rfc3339();
        let stopped = repository::cancel_active_configs(&mut tx, &now).await?;
        tx.commit().await?;

        info!("selection stopped by admin {}: {}", admin_id, reason);

        self.audit
            .log_operation(AuditEntry {
                actor_id: Some(admin_id.to_string()),
                operation_type: "emergency_stop".to_string(),
                operation_module: "emergency_handling".to_string(),
                description: format!("emergency selection stop - reason: {reason}"),
                target_type: Some("course_selection_config".to_string()),
                target_id: None,
                result: "success".to_string(),
            })
            .await;

        Ok(stopped)
    }
}

async fn apply_action(
    conn: &mut SqliteConnection,
    action: EmergencyAction,
    user_id: &str,
    course_id: &str,
    reason: &str,
) -> Result<String, AppError> {
    match action {
        EmergencyAction::ForceSelect => force_select(conn, user_id, course_id, reason).await,
        EmergencyAction::ForceDrop => force_drop(conn, user_id, course_id, reason).await,
        EmergencyAction::MoveToWaiting => move_to_waiting(conn, user_id, course_id, reason).await,
        EmergencyAction::RemoveFromWaiting => remove_from_waiting(conn, user_id, course_id).await,
    }
}

async fn force_select(
    conn: &mut SqliteConnection,
    user_id: &str,
    course_id: &str,
    reason: &str,
) -> Result<String, AppError> {
    if let Some(record) = repository::find_selection(&mut *conn, user_id, course_id).await? {
        if record.status == SelectionStatus::Selected {
            return Err(AppError::Conflict(
                "user has already selected this course".to_string(),
            ));
        }
    }

    let now = Utc::now().to_rfc3339();
    let note = format!("forced selection by administrator: {reason}");
    repository::force_selected(conn, user_id, course_id, &now, &note).await?;
    Ok("forced selection applied".to_string())
}

/// Administrative drop removes the row entirely, unlike the student path
/// which keeps it as `dropped`, then refills from the waiting queue.
async fn force_drop(
    conn: &mut SqliteConnection,
    user_id: &str,
    course_id: &str,
    reason: &str,
) -> Result<String, AppError> {
    let removed =
        repository::delete_selection(conn, user_id, course_id, SelectionStatus::Selected).await?;
    if removed == 0 {
        return Err(AppError::Conflict(
            "user has not selected this course".to_string(),
        ));
    }

    let now = Utc::now().to_rfc3339();
    if let Some(waiting) = repository::oldest_waiting(conn, course_id).await? {
        let note = format!("promoted from waiting list - reason: {reason}");
        repository::promote_selection(conn, &waiting.id, &now, Some(&note)).await?;
        return Ok("forced drop applied, first waiting student promoted".to_string());
    }

    Ok("forced drop applied".to_string())
}

async fn move_to_waiting(
    conn: &mut SqliteConnection,
    user_id: &str,
    course_id: &str,
    reason: &str,
) -> Result<String, AppError> {
    match repository::find_selection(&mut *conn, user_id, course_id).await? {
        Some(record) if record.status == SelectionStatus::Selected => {}
        _ => {
            return Err(AppError::Conflict(
                "user has not selected this course".to_string(),
            ));
        }
    }

    let note = format!("moved to waiting list by administrator: {reason}");
    repository::move_selection_to_waiting(conn, user_id, course_id, &note).await?;
    Ok("moved to the waiting list".to_string())
}

async fn remove_from_waiting(
    conn: &mut SqliteConnection,
    user_id: &str,
    course_id: &str,
) -> Result<String, AppError> {
    let removed =
        repository::delete_selection(conn, user_id, course_id, SelectionStatus::Waiting).await?;
    if removed == 0 {
        return Err(AppError::Conflict(
            "user is not on this course's waiting list".to_string(),
        ));
    }
    Ok("removed from the waiting list".to_string())
}
