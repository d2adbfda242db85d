use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::info;

use crate::audit::{AuditEntry, AuditSink};
use crate::db::repository;
use crate::error::AppError;
use crate::models::{
    FavoriteCourse, SelectionDetail, SelectionHistoryEntry, SelectionStatus,
};
use crate::services::conflicts::{self, ConflictCheck};
use crate::services::gate::{self, SelectionPeriod};
use crate::services::locks::CourseLocks;
use crate::state::Term;

/// Outcome of a selection attempt, decided under the course lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectionOutcome {
    Selected,
    Lottery,
    Pending,
}

impl SelectionOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            SelectionOutcome::Selected => "selected",
            SelectionOutcome::Lottery => "lottery",
            SelectionOutcome::Pending => "pending",
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            SelectionOutcome::Selected => "course selected",
            SelectionOutcome::Lottery => "course is full, added to the lottery queue",
            SelectionOutcome::Pending => "selection request submitted",
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MySelections {
    pub selections: Vec<SelectionDetail>,
    pub status_counts: BTreeMap<String, i64>,
}

/// Student-facing selection state machine. Capacity decisions happen inside
/// a transaction while holding the per-course lock; everything before that
/// is an advisory fast-fail.
pub struct SelectionService {
    db: SqlitePool,
    locks: Arc<CourseLocks>,
    audit: Arc<dyn AuditSink>,
    term: Term,
}

impl SelectionService {
    pub fn new(db: SqlitePool, locks: Arc<CourseLocks>, audit: Arc<dyn AuditSink>, term: Term) -> Self {
        Self {
            db,
            locks,
            audit,
            term,
        }
    }

    pub async fn selection_period(&self) -> Result<SelectionPeriod, AppError> {
        Ok(gate::selection_period(&self.db).await?)
    }

    pub async fn check_time_conflict(
        &self,
        user_id: &str,
        course_id: &str,
        exclude_course_id: Option<&str>,
    ) -> Result<ConflictCheck, AppError> {
        Ok(conflicts::check_time_conflict(&self.db, user_id, course_id, exclude_course_id).await?)
    }

    pub async fn check_credit_conflict(
        &self,
        user_id: &str,
        course_id: &str,
    ) -> Result<ConflictCheck, AppError> {
        Ok(conflicts::check_credit_conflict(&self.db, user_id, course_id).await?)
    }

    pub async fn select_course(
        &self,
        user_id: &str,
        course_id: &str,
    ) -> Result<SelectionOutcome, AppError> {
        let period = gate::selection_period(&self.db).await?;
        if !period.open {
            return Err(AppError::Conflict(period.message));
        }

        let course = repository::find_published_course(&self.db, course_id)
            .await?
            .ok_or(AppError::NotFound)?;

        let now = Utc::now();
        if let Some(start) = course
            .selection_start_time
            .as_deref()
            .and_then(gate::parse_timestamp)
        {
            if now < start {
                return Err(AppError::Conflict(
                    "selection for this course has not started".to_string(),
                ));
            }
        }
        if let Some(end) = course
            .selection_end_time
            .as_deref()
            .and_then(gate::parse_timestamp)
        {
            if now > end {
                return Err(AppError::Conflict(
                    "selection for this course has ended".to_string(),
                ));
            }
        }

        // Fast-fail on a live record; dropped/failed rows are reused below.
        if let Some(record) = repository::find_selection(&self.db, user_id, course_id).await? {
            reject_live_record(record.status)?;
        }

        let time = conflicts::check_time_conflict(&self.db, user_id, course_id, None).await?;
        if time.conflict {
            return Err(AppError::Conflict(
                time.detail.unwrap_or_else(|| "time conflict".to_string()),
            ));
        }

        let credits = conflicts::check_credit_conflict(&self.db, user_id, course_id).await?;
        if credits.conflict {
            return Err(AppError::Conflict(
                credits
                    .detail
                    .unwrap_or_else(|| "credit limit exceeded".to_string()),
            ));
        }

        // Serialization point: all writers against this course queue here
        // for the duration of the read-check-write sequence.
        let lock = self.locks.for_course(course_id);
        let _guard = lock.lock().await;

        let mut tx = self.db.begin().await?;
        let now_ts = Utc::now().to_rfc3339();

        // Re-check under the lock; a duplicate submit may have won the race
        // since the advisory read above.
        if let Some(record) = repository::find_selection(&mut *tx, user_id, course_id).await? {
            reject_live_record(record.status)?;
        }

        let (capacity, enrolled) = repository::course_seats(&mut *tx, course_id)
            .await?
            .ok_or(AppError::NotFound)?;

        repository::upsert_selection_pending(&mut *tx, user_id, course_id, &now_ts).await?;

        let outcome = if enrolled < capacity {
            repository::increment_enrolled(&mut *tx, course_id).await?;
            repository::mark_selected(&mut *tx, user_id, course_id, &now_ts).await?;
            SelectionOutcome::Selected
        } else {
            repository::mark_lottery(&mut *tx, user_id, course_id).await?;
            SelectionOutcome::Lottery
        };

        repository::append_history(&mut *tx, user_id, course_id, "select", &self.term, &now_ts)
            .await?;
        tx.commit().await?;

        info!(
            "user {} selection of course {} -> {}",
            user_id,
            course_id,
            outcome.as_str()
        );

        self.audit
            .log_operation(AuditEntry {
                actor_id: Some(user_id.to_string()),
                operation_type: "select".to_string(),
                operation_module: "course_selection".to_string(),
                description: format!(
                    "selection of course {} ({}) -> {}",
                    course.name,
                    course.course_code,
                    outcome.as_str()
                ),
                target_type: Some("course_selection".to_string()),
                target_id: Some(format!("{user_id}_{course_id}")),
                result: "success".to_string(),
            })
            .await;

        Ok(outcome)
    }

    pub async fn drop_course(&self, user_id: &str, course_id: &str) -> Result<(), AppError> {
        let record = repository::find_selection(&self.db, user_id, course_id)
            .await?
            .ok_or(AppError::NotFound)?;
        reject_undroppable(record.status)?;

        let lock = self.locks.for_course(course_id);
        let _guard = lock.lock().await;

        let mut tx = self.db.begin().await?;
        let now_ts = Utc::now().to_rfc3339();

        // The status read before the lock can be stale; the decrement
        // decision must come from the row as it is now.
        let record = repository::find_selection(&mut *tx, user_id, course_id)
            .await?
            .ok_or(AppError::NotFound)?;
        reject_undroppable(record.status)?;

        repository::mark_dropped(&mut *tx, user_id, course_id, &now_ts).await?;

        if record.status == SelectionStatus::Selected {
            repository::decrement_enrolled(&mut *tx, course_id).await?;

            // Refill the vacated seat from the head of the waiting queue;
            // the promoted record is counted back in so enrolled_count keeps
            // matching the number of selected rows.
            if let Some(waiting) = repository::oldest_waiting(&mut *tx, course_id).await? {
                repository::promote_selection(
                    &mut *tx,
                    &waiting.id,
                    &now_ts,
                    Some("promoted from waiting list after a drop"),
                )
                .await?;
                repository::increment_enrolled(&mut *tx, course_id).await?;
                info!(
                    "promoted user {} from the waiting list of course {}",
                    waiting.user_id, course_id
                );
            }
        }

        repository::append_history(&mut *tx, user_id, course_id, "drop", &self.term, &now_ts)
            .await?;
        tx.commit().await?;

        info!("user {} dropped course {}", user_id, course_id);

        self.audit
            .log_operation(AuditEntry {
                actor_id: Some(user_id.to_string()),
                operation_type: "drop".to_string(),
                operation_module: "course_selection".to_string(),
                description: format!(
                    "dropped course {course_id} (was {})",
                    record.status.as_str()
                ),
                target_type: Some("course_selection".to_string()),
                target_id: Some(format!("{user_id}_{course_id}")),
                result: "success".to_string(),
            })
            .await;

        Ok(())
    }

    pub async fn my_selections(
        &self,
        user_id: &str,
        status: Option<SelectionStatus>,
    ) -> Result<MySelections, AppError> {
        let selections = repository::my_selections(&self.db, user_id, status).await?;
        let status_counts = repository::selection_status_counts(&self.db, user_id)
            .await?
            .into_iter()
            .collect();
        Ok(MySelections {
            selections,
            status_counts,
        })
    }

    pub async fn selection_history(
        &self,
        user_id: &str,
        semester: Option<&str>,
        academic_year: Option<&str>,
    ) -> Result<Vec<SelectionHistoryEntry>, AppError> {
        Ok(repository::selection_history(&self.db, user_id, semester, academic_year).await?)
    }

    pub async fn favorite_course(&self, user_id: &str, course_id: &str) -> Result<(), AppError> {
        if repository::find_published_course(&self.db, course_id)
            .await?
            .is_none()
        {
            return Err(AppError::NotFound);
        }
        if repository::find_favorite(&self.db, user_id, course_id)
            .await?
            .is_some()
        {
            return Err(AppError::Conflict("course already favorited".to_string()));
        }
        repository::insert_favorite(&self.db, user_id, course_id).await?;
        Ok(())
    }

    pub async fn unfavorite_course(&self, user_id: &str, course_id: &str) -> Result<(), AppError> {
        let removed = repository::delete_favorite(&self.db, user_id, course_id).await?;
        if removed == 0 {
            return Err(AppError::NotFound);
        }
        Ok(())
    }

    pub async fn favorite_courses(&self, user_id: &str) -> Result<Vec<FavoriteCourse>, AppError> {
        Ok(repository::favorite_courses(&self.db, user_id).await?)
    }
}

/// A live record for the pair blocks a new attempt; only `dropped` and
/// `failed` rows may be re-selected (reusing the row).
fn reject_live_record(status: SelectionStatus) -> Result<(), AppError> {
    let message = match status {
        SelectionStatus::Dropped | SelectionStatus::Failed => return Ok(()),
        SelectionStatus::Pending => "course already chosen, awaiting processing",
        SelectionStatus::Selected => "course already selected",
        SelectionStatus::Lottery => "course is already in the lottery queue",
        SelectionStatus::Waiting => "already on the waiting list for this course",
    };
    Err(AppError::Conflict(message.to_string()))
}

fn reject_undroppable(status: SelectionStatus) -> Result<(), AppError> {
    match status {
        SelectionStatus::Dropped => Err(AppError::Conflict("course already dropped".to_string())),
        SelectionStatus::Failed => Err(AppError::Conflict(
            "selection already failed, nothing to drop".to_string(),
        )),
        _ => Ok(()),
    }
}
