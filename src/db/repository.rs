use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use uuid::Uuid;

use crate::models::{
    Course, NewCourse, NewSelectionConfig, NewUser, SelectionConfig, SelectionDetail,
    SelectionHistoryEntry, SelectionRecord, SelectionStatus, User,
};
use crate::state::Term;

const COURSE_COLUMNS: &str = "id, course_code, name, credits, capacity, enrolled_count, \
     day_of_week, start_time, end_time, status, selection_start_time, selection_end_time, \
     created_at, updated_at";

const SELECTION_COLUMNS: &str = "id, user_id, course_id, status, selection_time, result_time, \
     selected_at, admin_notes, created_at";

// ---------------------------------------------------------------------------
// users

pub async fn insert_user(db: &SqlitePool, req: NewUser) -> Result<User, sqlx::Error> {
    let id = Uuid::new_v4().to_string();
    let now = Utc::now().to_rfc3339();

    sqlx::query(
        "INSERT INTO users (id, student_id, name, credit_limit, created_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(&req.student_id)
    .bind(&req.name)
    .bind(req.credit_limit)
    .bind(&now)
    .execute(db)
    .await?;

    Ok(User {
        id,
        student_id: req.student_id,
        name: req.name,
        credit_limit: req.credit_limit,
        created_at: now,
    })
}

pub async fn find_user(db: &SqlitePool, id: &str) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>(
        "SELECT id, student_id, name, credit_limit, created_at FROM users WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(db)
    .await
}

pub async fn credit_limit(db: &SqlitePool, user_id: &str) -> Result<Option<f64>, sqlx::Error> {
    sqlx::query_scalar::<_, f64>("SELECT credit_limit FROM users WHERE id = ?")
        .bind(user_id)
        .fetch_optional(db)
        .await
}

// ---------------------------------------------------------------------------
// courses

pub async fn insert_course(db: &SqlitePool, req: NewCourse) -> Result<Course, sqlx::Error> {
    let id = Uuid::new_v4().to_string();
    let now = Utc::now().to_rfc3339();

    sqlx::query(
        "INSERT INTO courses \
         (id, course_code, name, credits, capacity, enrolled_count, day_of_week, start_time, \
          end_time, status, selection_start_time, selection_end_time, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, 0, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(&req.course_code)
    .bind(&req.name)
    .bind(req.credits)
    .bind(req.capacity)
    .bind(&req.day_of_week)
    .bind(&req.start_time)
    .bind(&req.end_time)
    .bind(req.status)
    .bind(&req.selection_start_time)
    .bind(&req.selection_end_time)
    .bind(&now)
    .bind(&now)
    .execute(db)
    .await?;

    Ok(Course {
        id,
        course_code: req.course_code,
        name: req.name,
        credits: req.credits,
        capacity: req.capacity,
        enrolled_count: 0,
        day_of_week: req.day_of_week,
        start_time: req.start_time,
        end_time: req.end_time,
        status: req.status,
        selection_start_time: req.selection_start_time,
        selection_end_time: req.selection_end_time,
        created_at: now.clone(),
        updated_at: now,
    })
}

pub async fn find_course(db: &SqlitePool, id: &str) -> Result<Option<Course>, sqlx::Error> {
    sqlx::query_as::<_, Course>(&format!(
        "SELECT {COURSE_COLUMNS} FROM courses WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(db)
    .await
}

pub async fn find_published_course(
    db: &SqlitePool,
    id: &str,
) -> Result<Option<Course>, sqlx::Error> {
    sqlx::query_as::<_, Course>(&format!(
        "SELECT {COURSE_COLUMNS} FROM courses WHERE id = ? AND status = 'published'"
    ))
    .bind(id)
    .fetch_optional(db)
    .await
}

/// Capacity and enrolled count, re-read inside the locked transaction. This
/// is the authoritative read the capacity decision is based on.
pub async fn course_seats(
    conn: &mut SqliteConnection,
    course_id: &str,
) -> Result<Option<(i64, i64)>, sqlx::Error> {
    sqlx::query_as::<_, (i64, i64)>("SELECT capacity, enrolled_count FROM courses WHERE id = ?")
        .bind(course_id)
        .fetch_optional(&mut *conn)
        .await
}

pub async fn increment_enrolled(
    conn: &mut SqliteConnection,
    course_id: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE courses SET enrolled_count = enrolled_count + 1 WHERE id = ?")
        .bind(course_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

pub async fn decrement_enrolled(
    conn: &mut SqliteConnection,
    course_id: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE courses SET enrolled_count = enrolled_count - 1 WHERE id = ? AND enrolled_count > 0",
    )
    .bind(course_id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Rebuild the denormalized counter from the selection rows. The emergency
/// paths mutate records directly and run this inside the same transaction.
pub async fn resync_enrolled_count(
    conn: &mut SqliteConnection,
    course_id: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE courses SET enrolled_count = \
         (SELECT COUNT(*) FROM course_selections WHERE course_id = ? AND status = 'selected') \
         WHERE id = ?",
    )
    .bind(course_id)
    .bind(course_id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// selection records

pub async fn find_selection<'e, E>(
    executor: E,
    user_id: &str,
    course_id: &str,
) -> Result<Option<SelectionRecord>, sqlx::Error>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    sqlx::query_as::<_, SelectionRecord>(&format!(
        "SELECT {SELECTION_COLUMNS} FROM course_selections WHERE user_id = ? AND course_id = ?"
    ))
    .bind(user_id)
    .bind(course_id)
    .fetch_optional(executor)
    .await
}

/// Move the pair's record to `pending`, reusing the existing row when one is
/// there (re-selection after `dropped`/`failed` must never insert a
/// duplicate).
pub async fn upsert_selection_pending(
    conn: &mut SqliteConnection,
    user_id: &str,
    course_id: &str,
    now: &str,
) -> Result<(), sqlx::Error> {
    let updated = sqlx::query(
        "UPDATE course_selections \
         SET status = 'pending', selection_time = ?, result_time = NULL, admin_notes = NULL \
         WHERE user_id = ? AND course_id = ?",
    )
    .bind(now)
    .bind(user_id)
    .bind(course_id)
    .execute(&mut *conn)
    .await?
    .rows_affected();

    if updated == 0 {
        let id = Uuid::new_v4().to_string();
        sqlx::query(
            "INSERT INTO course_selections \
             (id, user_id, course_id, status, selection_time, created_at) \
             VALUES (?, ?, ?, 'pending', ?, ?)",
        )
        .bind(&id)
        .bind(user_id)
        .bind(course_id)
        .bind(now)
        .bind(now)
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}

pub async fn mark_selected(
    conn: &mut SqliteConnection,
    user_id: &str,
    course_id: &str,
    now: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE course_selections \
         SET status = 'selected', result_time = ?, selected_at = ? \
         WHERE user_id = ? AND course_id = ?",
    )
    .bind(now)
    .bind(now)
    .bind(user_id)
    .bind(course_id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn mark_lottery(
    conn: &mut SqliteConnection,
    user_id: &str,
    course_id: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE course_selections SET status = 'lottery' WHERE user_id = ? AND course_id = ?",
    )
    .bind(user_id)
    .bind(course_id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn mark_dropped(
    conn: &mut SqliteConnection,
    user_id: &str,
    course_id: &str,
    now: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE course_selections SET status = 'dropped', result_time = ? \
         WHERE user_id = ? AND course_id = ?",
    )
    .bind(now)
    .bind(user_id)
    .bind(course_id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Head of the waiting queue for a course, oldest first.
pub async fn oldest_waiting(
    conn: &mut SqliteConnection,
    course_id: &str,
) -> Result<Option<SelectionRecord>, sqlx::Error> {
    sqlx::query_as::<_, SelectionRecord>(&format!(
        "SELECT {SELECTION_COLUMNS} FROM course_selections \
         WHERE course_id = ? AND status = 'waiting' \
         ORDER BY created_at ASC, id ASC LIMIT 1"
    ))
    .bind(course_id)
    .fetch_optional(&mut *conn)
    .await
}

pub async fn promote_selection(
    conn: &mut SqliteConnection,
    selection_id: &str,
    now: &str,
    note: Option<&str>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE course_selections \
         SET status = 'selected', result_time = ?, selected_at = ?, \
             admin_notes = COALESCE(?, admin_notes) \
         WHERE id = ?",
    )
    .bind(now)
    .bind(now)
    .bind(note)
    .bind(selection_id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Administrative upsert straight to `selected`, bypassing the pending step.
pub async fn force_selected(
    conn: &mut SqliteConnection,
    user_id: &str,
    course_id: &str,
    now: &str,
    note: &str,
) -> Result<(), sqlx::Error> {
    let updated = sqlx::query(
        "UPDATE course_selections \
         SET status = 'selected', selected_at = ?, result_time = ?, admin_notes = ? \
         WHERE user_id = ? AND course_id = ?",
    )
    .bind(now)
    .bind(now)
    .bind(note)
    .bind(user_id)
    .bind(course_id)
    .execute(&mut *conn)
    .await?
    .rows_affected();

    if updated == 0 {
        let id = Uuid::new_v4().to_string();
        sqlx::query(
            "INSERT INTO course_selections \
             (id, user_id, course_id, status, selected_at, result_time, admin_notes, created_at) \
             VALUES (?, ?, ?, 'selected', ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(user_id)
        .bind(course_id)
        .bind(now)
        .bind(now)
        .bind(note)
        .bind(now)
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}

pub async fn move_selection_to_waiting(
    conn: &mut SqliteConnection,
    user_id: &str,
    course_id: &str,
    note: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE course_selections \
         SET status = 'waiting', selected_at = NULL, admin_notes = ? \
         WHERE user_id = ? AND course_id = ?",
    )
    .bind(note)
    .bind(user_id)
    .bind(course_id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Hard delete, administrative paths only. Student-initiated drops keep the
/// row as `dropped`.
pub async fn delete_selection(
    conn: &mut SqliteConnection,
    user_id: &str,
    course_id: &str,
    status: SelectionStatus,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "DELETE FROM course_selections WHERE user_id = ? AND course_id = ? AND status = ?",
    )
    .bind(user_id)
    .bind(course_id)
    .bind(status)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected())
}

pub async fn my_selections(
    db: &SqlitePool,
    user_id: &str,
    status: Option<SelectionStatus>,
) -> Result<Vec<SelectionDetail>, sqlx::Error> {
    let base = "SELECT cs.id, cs.status, cs.selection_time, cs.result_time, \
                c.id AS course_id, c.course_code, c.name AS course_name, c.credits, \
                c.day_of_week, c.start_time, c.end_time \
                FROM course_selections cs \
                JOIN courses c ON cs.course_id = c.id \
                WHERE cs.user_id = ?";

    if let Some(status) = status {
        sqlx::query_as::<_, SelectionDetail>(&format!(
            "{base} AND cs.status = ? ORDER BY cs.selection_time DESC"
        ))
        .bind(user_id)
        .bind(status)
        .fetch_all(db)
        .await
    } else {
        sqlx::query_as::<_, SelectionDetail>(&format!("{base} ORDER BY cs.selection_time DESC"))
            .bind(user_id)
            .fetch_all(db)
            .await
    }
}

pub async fn selection_status_counts(
    db: &SqlitePool,
    user_id: &str,
) -> Result<Vec<(String, i64)>, sqlx::Error> {
    sqlx::query_as::<_, (String, i64)>(
        "SELECT status, COUNT(*) FROM course_selections WHERE user_id = ? GROUP BY status",
    )
    .bind(user_id)
    .fetch_all(db)
    .await
}

// ---------------------------------------------------------------------------
// selection history (append-only, never read by the engine)

pub async fn append_history(
    conn: &mut SqliteConnection,
    user_id: &str,
    course_id: &str,
    action: &str,
    term: &Term,
    now: &str,
) -> Result<(), sqlx::Error> {
    let id = Uuid::new_v4().to_string();
    sqlx::query(
        "INSERT INTO selection_history \
         (id, user_id, course_id, action, action_time, semester, academic_year) \
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(user_id)
    .bind(course_id)
    .bind(action)
    .bind(now)
    .bind(&term.semester)
    .bind(&term.academic_year)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn selection_history(
    db: &SqlitePool,
    user_id: &str,
    semester: Option<&str>,
    academic_year: Option<&str>,
) -> Result<Vec<SelectionHistoryEntry>, sqlx::Error> {
    let mut sql = String::from(
        "SELECT sh.action, sh.action_time, sh.semester, sh.academic_year, \
         c.course_code, c.name AS course_name, c.credits \
         FROM selection_history sh \
         JOIN courses c ON sh.course_id = c.id \
         WHERE sh.user_id = ?",
    );
    if semester.is_some() {
        sql.push_str(" AND sh.semester = ?");
    }
    if academic_year.is_some() {
        sql.push_str(" AND sh.academic_year = ?");
    }
    sql.push_str(" ORDER BY sh.action_time DESC");

    let mut query = sqlx::query_as::<_, SelectionHistoryEntry>(&sql).bind(user_id);
    if let Some(semester) = semester {
        query = query.bind(semester);
    }
    if let Some(academic_year) = academic_year {
        query = query.bind(academic_year);
    }
    query.fetch_all(db).await
}

// ---------------------------------------------------------------------------
// selection period configuration

pub async fn insert_selection_config(
    db: &SqlitePool,
    req: NewSelectionConfig,
) -> Result<SelectionConfig, sqlx::Error> {
    let id = Uuid::new_v4().to_string();
    let now = Utc::now().to_rfc3339();

    sqlx::query(
        "INSERT INTO course_selection_config \
         (id, round_name, semester, academic_year, start_time, end_time, status, description, \
          created_by, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(&req.round_name)
    .bind(&req.semester)
    .bind(&req.academic_year)
    .bind(&req.start_time)
    .bind(&req.end_time)
    .bind(req.status)
    .bind(&req.description)
    .bind(&req.created_by)
    .bind(&now)
    .bind(&now)
    .execute(db)
    .await?;

    Ok(SelectionConfig {
        id,
        round_name: req.round_name,
        semester: req.semester,
        academic_year: req.academic_year,
        start_time: req.start_time,
        end_time: req.end_time,
        status: req.status,
        description: req.description,
        created_by: req.created_by,
        created_at: now.clone(),
        updated_at: now,
    })
}

pub async fn active_configs(db: &SqlitePool) -> Result<Vec<SelectionConfig>, sqlx::Error> {
    sqlx::query_as::<_, SelectionConfig>(
        "SELECT id, round_name, semester, academic_year, start_time, end_time, status, \
         description, created_by, created_at, updated_at \
         FROM course_selection_config \
         WHERE status = 'active' \
         ORDER BY created_at DESC",
    )
    .fetch_all(db)
    .await
}

pub async fn cancel_active_configs(
    conn: &mut SqliteConnection,
    now: &str,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE course_selection_config SET status = 'cancelled', updated_at = ? \
         WHERE status = 'active'",
    )
    .bind(now)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected())
}

// ---------------------------------------------------------------------------
// favorites

pub async fn find_favorite(
    db: &SqlitePool,
    user_id: &str,
    course_id: &str,
) -> Result<Option<String>, sqlx::Error> {
    sqlx::query_scalar::<_, String>(
        "SELECT id FROM course_favorites WHERE user_id = ? AND course_id = ?",
    )
    .bind(user_id)
    .bind(course_id)
    .fetch_optional(db)
    .await
}

pub async fn insert_favorite(
    db: &SqlitePool,
    user_id: &str,
    course_id: &str,
) -> Result<(), sqlx::Error> {
    let id = Uuid::new_v4().to_string();
    let now = Utc::now().to_rfc3339();
    sqlx::query(
        "INSERT INTO course_favorites (id, user_id, course_id, created_at) VALUES (?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(user_id)
    .bind(course_id)
    .bind(&now)
    .execute(db)
    .await?;
    Ok(())
}

pub async fn delete_favorite(
    db: &SqlitePool,
    user_id: &str,
    course_id: &str,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM course_favorites WHERE user_id = ? AND course_id = ?")
        .bind(user_id)
        .bind(course_id)
        .execute(db)
        .await?;
    Ok(result.rows_affected())
}

pub async fn favorite_courses(
    db: &SqlitePool,
    user_id: &str,
) -> Result<Vec<crate::models::FavoriteCourse>, sqlx::Error> {
    sqlx::query_as::<_, crate::models::FavoriteCourse>(
        "SELECT cf.created_at AS favorite_time, c.id AS course_id, c.course_code, \
         c.name AS course_name, c.credits, c.capacity, c.enrolled_count, \
         c.day_of_week, c.start_time, c.end_time \
         FROM course_favorites cf \
         JOIN courses c ON cf.course_id = c.id \
         WHERE cf.user_id = ? AND c.status = 'published' \
         ORDER BY cf.created_at DESC",
    )
    .bind(user_id)
    .fetch_all(db)
    .await
}
