use chrono::NaiveTime;
use serde::Serialize;
use sqlx::{FromRow, SqlitePool};

use crate::db::repository;

/// Structured checker result. Conflicts are reported back to the caller as
/// data, not errors; the engine converts them at its boundary.
#[derive(Debug, Clone, Serialize)]
pub struct ConflictCheck {
    pub conflict: bool,
    pub detail: Option<String>,
}

impl ConflictCheck {
    pub fn clear() -> Self {
        Self {
            conflict: false,
            detail: None,
        }
    }

    pub fn conflicting(detail: impl Into<String>) -> Self {
        Self {
            conflict: true,
            detail: Some(detail.into()),
        }
    }
}

#[derive(Debug, FromRow)]
struct ScheduledCourse {
    name: String,
    start_time: String,
    end_time: String,
}

/// Half-open overlap: [s1, e1) and [s2, e2) collide iff s1 < e2 && s2 < e1.
/// Back-to-back slots do not conflict.
fn overlaps(s1: NaiveTime, e1: NaiveTime, s2: NaiveTime, e2: NaiveTime) -> bool {
    s1 < e2 && s2 < e1
}

fn parse_time(value: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(value, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M:%S"))
        .ok()
}

/// Does the target course overlap any of the student's `selected`/`pending`
/// courses on the same weekday? The first match is reported with the
/// conflicting course's name.
///
/// Advisory only: a student cannot race against themself, so this runs as
/// an unsynchronized read outside the locking transaction.
pub async fn check_time_conflict(
    db: &SqlitePool,
    user_id: &str,
    course_id: &str,
    exclude_course_id: Option<&str>,
) -> Result<ConflictCheck, sqlx::Error> {
    let Some(target) = repository::find_course(db, course_id).await? else {
        return Ok(ConflictCheck::conflicting("course does not exist"));
    };

    let (Some(target_start), Some(target_end)) = (
        parse_time(&target.start_time),
        parse_time(&target.end_time),
    ) else {
        return Ok(ConflictCheck::conflicting(format!(
            "course \"{}\" has an invalid schedule",
            target.name
        )));
    };

    let mut sql = String::from(
        "SELECT c.name, c.start_time, c.end_time \
         FROM course_selections cs \
         JOIN courses c ON cs.course_id = c.id \
         WHERE cs.user_id = ? AND cs.status IN ('selected', 'pending') AND c.day_of_week = ?",
    );
    if exclude_course_id.is_some() {
        sql.push_str(" AND c.id != ?");
    }

    let mut query = sqlx::query_as::<_, ScheduledCourse>(&sql)
        .bind(user_id)
        .bind(&target.day_of_week);
    if let Some(exclude) = exclude_course_id {
        query = query.bind(exclude);
    }

    for scheduled in query.fetch_all(db).await? {
        let (Some(start), Some(end)) = (
            parse_time(&scheduled.start_time),
            parse_time(&scheduled.end_time),
        ) else {
            continue;
        };

        if overlaps(target_start, target_end, start, end) {
            return Ok(ConflictCheck::conflicting(format!(
                "time conflict with course \"{}\"",
                scheduled.name
            )));
        }
    }

    Ok(ConflictCheck::clear())
}

/// Would the candidate course push the student past their credit limit?
/// Sums credits over `selected`/`pending` selections and reports the
/// numbers on conflict.
pub async fn check_credit_conflict(
    db: &SqlitePool,
    user_id: &str,
    course_id: &str,
) -> Result<ConflictCheck, sqlx::Error> {
    let Some(limit) = repository::credit_limit(db, user_id).await? else {
        return Ok(ConflictCheck::conflicting("user does not exist"));
    };

    let Some(course) = repository::find_course(db, course_id).await? else {
        return Ok(ConflictCheck::conflicting("course does not exist"));
    };

    let current: f64 = sqlx::query_scalar(
        "SELECT COALESCE(SUM(c.credits), 0.0) \
         FROM course_selections cs \
         JOIN courses c ON cs.course_id = c.id \
         WHERE cs.user_id = ? AND cs.status IN ('selected', 'pending')",
    )
    .bind(user_id)
    .fetch_one(db)
    .await?;

    if current + course.credits > limit {
        return Ok(ConflictCheck::conflicting(format!(
            "credit limit exceeded: {current} credits selected, course adds {credits}, limit is {limit}",
            credits = course.credits
        )));
    }

    Ok(ConflictCheck::clear())
}
