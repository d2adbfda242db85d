use std::sync::Arc;

use chrono::{Duration, Utc};
use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;
use uuid::Uuid;

use pe_backend::audit::NoopAuditSink;
use pe_backend::db::repository;
use pe_backend::error::AppError;
use pe_backend::models::{
    ConfigStatus, Course, CourseStatus, NewCourse, NewSelectionConfig, NewUser, SelectionStatus,
    User,
};
use pe_backend::services::{CourseLocks, SelectionOutcome, SelectionService};
use pe_backend::state::Term;

async fn test_pool() -> SqlitePool {
    // A single connection keeps every task on the same in-memory database.
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to create database");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    pool
}

fn term() -> Term {
    Term {
        semester: "2026-spring".to_string(),
        academic_year: "2025-2026".to_string(),
    }
}

fn service(pool: &SqlitePool) -> SelectionService {
    SelectionService::new(
        pool.clone(),
        Arc::new(CourseLocks::new()),
        Arc::new(NoopAuditSink),
        term(),
    )
}

async fn open_selection(pool: &SqlitePool) {
    let now = Utc::now();
    repository::insert_selection_config(
        pool,
        NewSelectionConfig {
            round_name: Some("first round".to_string()),
            semester: "2026-spring".to_string(),
            academic_year: "2025-2026".to_string(),
            start_time: (now - Duration::hours(1)).to_rfc3339(),
            end_time: (now + Duration::hours(1)).to_rfc3339(),
            status: ConfigStatus::Active,
            description: None,
            created_by: None,
        },
    )
    .await
    .expect("Failed to insert selection config");
}

async fn seed_user(pool: &SqlitePool, student_id: &str, credit_limit: f64) -> User {
    repository::insert_user(
        pool,
        NewUser {
            student_id: student_id.to_string(),
            name: format!("student {student_id}"),
            credit_limit,
        },
    )
    .await
    .expect("Failed to insert user")
}

async fn seed_course(
    pool: &SqlitePool,
    code: &str,
    name: &str,
    credits: f64,
    capacity: i64,
    day_of_week: &str,
    start_time: &str,
    end_time: &str,
) -> Course {
    repository::insert_course(
        pool,
        NewCourse {
            course_code: code.to_string(),
            name: name.to_string(),
            credits,
            capacity,
            day_of_week: day_of_week.to_string(),
            start_time: start_time.to_string(),
            end_time: end_time.to_string(),
            status: CourseStatus::Published,
            selection_start_time: None,
            selection_end_time: None,
        },
    )
    .await
    .expect("Failed to insert course")
}

async fn insert_waiting_record(pool: &SqlitePool, user_id: &str, course_id: &str, created_at: &str) {
    sqlx::query(
        "INSERT INTO course_selections (id, user_id, course_id, status, created_at) \
         VALUES (?, ?, ?, 'waiting', ?)",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(user_id)
    .bind(course_id)
    .bind(created_at)
    .execute(pool)
    .await
    .expect("Failed to insert waiting record");
}

async fn enrolled_count(pool: &SqlitePool, course_id: &str) -> i64 {
    sqlx::query_scalar("SELECT enrolled_count FROM courses WHERE id = ?")
        .bind(course_id)
        .fetch_one(pool)
        .await
        .expect("Failed to read enrolled_count")
}

async fn selected_rows(pool: &SqlitePool, course_id: &str) -> i64 {
    sqlx::query_scalar(
        "SELECT COUNT(*) FROM course_selections WHERE course_id = ? AND status = 'selected'",
    )
    .bind(course_id)
    .fetch_one(pool)
    .await
    .expect("Failed to count selected rows")
}

#[tokio::test]
async fn concurrent_selects_never_exceed_capacity() {
    let pool = test_pool().await;
    open_selection(&pool).await;

    let capacity = 5;
    let course = seed_course(&pool, "PE101", "Badminton", 1.0, capacity, "Mon", "10:00", "11:00").await;

    let mut users = Vec::new();
    for i in 0..20 {
        users.push(seed_user(&pool, &format!("2026{i:04}"), 10.0).await);
    }

    let service = Arc::new(service(&pool));
    let mut handles = Vec::new();
    for user in &users {
        let service = service.clone();
        let user_id = user.id.clone();
        let course_id = course.id.clone();
        handles.push(tokio::spawn(async move {
            service.select_course(&user_id, &course_id).await
        }));
    }

    let mut selected = 0;
    let mut lottery = 0;
    for handle in handles {
        match handle.await.expect("task panicked").expect("select failed") {
            SelectionOutcome::Selected => selected += 1,
            SelectionOutcome::Lottery => lottery += 1,
            SelectionOutcome::Pending => panic!("no attempt should stay pending"),
        }
    }

    assert_eq!(selected, capacity);
    assert_eq!(lottery, 20 - capacity);
    assert_eq!(enrolled_count(&pool, &course.id).await, capacity);
    assert_eq!(selected_rows(&pool, &course.id).await, capacity);
}

#[tokio::test]
async fn drop_is_idempotent() {
    let pool = test_pool().await;
    open_selection(&pool).await;

    let course = seed_course(&pool, "PE102", "Swimming", 2.0, 10, "Tue", "08:00", "09:00").await;
    let user = seed_user(&pool, "20260100", 10.0).await;
    let service = service(&pool);

    let outcome = service.select_course(&user.id, &course.id).await.unwrap();
    assert_eq!(outcome, SelectionOutcome::Selected);
    assert_eq!(enrolled_count(&pool, &course.id).await, 1);

    service.drop_course(&user.id, &course.id).await.unwrap();
    assert_eq!(enrolled_count(&pool, &course.id).await, 0);

    let err = service.drop_course(&user.id, &course.id).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
    assert_eq!(enrolled_count(&pool, &course.id).await, 0);
}

#[tokio::test]
async fn reselection_after_drop_reuses_the_row() {
    let pool = test_pool().await;
    open_selection(&pool).await;

    let course = seed_course(&pool, "PE103", "Basketball", 2.0, 10, "Wed", "14:00", "15:30").await;
    let user = seed_user(&pool, "20260101", 10.0).await;
    let service = service(&pool);

    service.select_course(&user.id, &course.id).await.unwrap();
    service.drop_course(&user.id, &course.id).await.unwrap();
    let outcome = service.select_course(&user.id, &course.id).await.unwrap();
    assert_eq!(outcome, SelectionOutcome::Selected);

    let rows: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM course_selections WHERE user_id = ? AND course_id = ?",
    )
    .bind(&user.id)
    .bind(&course.id)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(rows, 1);

    let record = repository::find_selection(&pool, &user.id, &course.id)
        .await
        .unwrap()
        .expect("record should exist");
    assert_eq!(record.status, SelectionStatus::Selected);
}

#[tokio::test]
async fn duplicate_live_selection_is_rejected() {
    let pool = test_pool().await;
    open_selection(&pool).await;

    let course = seed_course(&pool, "PE104", "Tennis", 2.0, 10, "Thu", "10:00", "11:00").await;
    let user = seed_user(&pool, "20260102", 10.0).await;
    let service = service(&pool);

    service.select_course(&user.id, &course.id).await.unwrap();
    let err = service.select_course(&user.id, &course.id).await.unwrap_err();
    match err {
        AppError::Conflict(message) => assert!(message.contains("already selected")),
        other => panic!("expected conflict, got {other:?}"),
    }
}

#[tokio::test]
async fn overlapping_schedule_is_rejected_and_adjacent_is_not() {
    let pool = test_pool().await;
    open_selection(&pool).await;

    let user = seed_user(&pool, "20260103", 10.0).await;
    let course_a = seed_course(&pool, "PE105", "Volleyball", 1.0, 10, "Mon", "10:00", "11:00").await;
    let course_b = seed_course(&pool, "PE106", "Table Tennis", 1.0, 10, "Mon", "10:30", "11:30").await;
    let course_c = seed_course(&pool, "PE107", "Track", 1.0, 10, "Mon", "11:00", "12:00").await;

    let service = service(&pool);
    service.select_course(&user.id, &course_a.id).await.unwrap();

    let err = service.select_course(&user.id, &course_b.id).await.unwrap_err();
    match err {
        AppError::Conflict(message) => assert!(message.contains("Volleyball")),
        other => panic!("expected conflict, got {other:?}"),
    }

    // Back-to-back slots do not overlap.
    let outcome = service.select_course(&user.id, &course_c.id).await.unwrap();
    assert_eq!(outcome, SelectionOutcome::Selected);
}

#[tokio::test]
async fn credit_limit_boundary() {
    let pool = test_pool().await;
    open_selection(&pool).await;

    let user = seed_user(&pool, "20260104", 4.0).await;
    let course_a = seed_course(&pool, "PE108", "Soccer", 2.0, 10, "Mon", "08:00", "09:00").await;
    let course_b = seed_course(&pool, "PE109", "Fencing", 2.0, 10, "Tue", "08:00", "09:00").await;
    let course_c = seed_course(&pool, "PE110", "Climbing", 3.0, 10, "Wed", "08:00", "09:00").await;

    let service = service(&pool);
    service.select_course(&user.id, &course_a.id).await.unwrap();

    // Reaching the limit exactly is allowed.
    let outcome = service.select_course(&user.id, &course_b.id).await.unwrap();
    assert_eq!(outcome, SelectionOutcome::Selected);

    let err = service.select_course(&user.id, &course_c.id).await.unwrap_err();
    match err {
        AppError::Conflict(message) => assert!(message.contains("credit limit")),
        other => panic!("expected conflict, got {other:?}"),
    }
}

#[tokio::test]
async fn drop_promotes_oldest_waiting_record() {
    let pool = test_pool().await;
    open_selection(&pool).await;

    let course = seed_course(&pool, "PE111", "Yoga", 1.0, 1, "Fri", "16:00", "17:00").await;
    let holder = seed_user(&pool, "20260105", 10.0).await;
    let older = seed_user(&pool, "20260106", 10.0).await;
    let newer = seed_user(&pool, "20260107", 10.0).await;

    let service = service(&pool);
    service.select_course(&holder.id, &course.id).await.unwrap();
    assert_eq!(enrolled_count(&pool, &course.id).await, 1);

    insert_waiting_record(&pool, &older.id, &course.id, "2026-03-01T08:00:00+00:00").await;
    insert_waiting_record(&pool, &newer.id, &course.id, "2026-03-01T09:00:00+00:00").await;

    service.drop_course(&holder.id, &course.id).await.unwrap();

    let promoted = repository::find_selection(&pool, &older.id, &course.id)
        .await
        .unwrap()
        .expect("older waiting record should exist");
    assert_eq!(promoted.status, SelectionStatus::Selected);

    let still_waiting = repository::find_selection(&pool, &newer.id, &course.id)
        .await
        .unwrap()
        .expect("newer waiting record should exist");
    assert_eq!(still_waiting.status, SelectionStatus::Waiting);

    // The vacated seat was refilled; the counter still matches the rows.
    assert_eq!(enrolled_count(&pool, &course.id).await, 1);
    assert_eq!(selected_rows(&pool, &course.id).await, 1);
}

#[tokio::test]
async fn selection_rejected_when_period_closed() {
    let pool = test_pool().await;

    let course = seed_course(&pool, "PE112", "Dance", 1.0, 10, "Mon", "10:00", "11:00").await;
    let user = seed_user(&pool, "20260108", 10.0).await;
    let service = service(&pool);

    let period = service.selection_period().await.unwrap();
    assert!(!period.open);

    let err = service.select_course(&user.id, &course.id).await.unwrap_err();
    match err {
        AppError::Conflict(message) => assert!(message.contains("not open")),
        other => panic!("expected conflict, got {other:?}"),
    }
}

#[tokio::test]
async fn expired_active_config_keeps_the_gate_closed() {
    let pool = test_pool().await;

    let now = Utc::now();
    repository::insert_selection_config(
        &pool,
        NewSelectionConfig {
            round_name: None,
            semester: "2026-spring".to_string(),
            academic_year: "2025-2026".to_string(),
            start_time: (now - Duration::hours(3)).to_rfc3339(),
            end_time: (now - Duration::hours(1)).to_rfc3339(),
            status: ConfigStatus::Active,
            description: None,
            created_by: None,
        },
    )
    .await
    .unwrap();

    let service = service(&pool);
    let period = service.selection_period().await.unwrap();
    assert!(!period.open);
}

#[tokio::test]
async fn drop_without_record_is_not_found() {
    let pool = test_pool().await;
    open_selection(&pool).await;

    let course = seed_course(&pool, "PE113", "Rowing", 1.0, 10, "Tue", "10:00", "11:00").await;
    let user = seed_user(&pool, "20260109", 10.0).await;
    let service = service(&pool);

    let err = service.drop_course(&user.id, &course.id).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound));
}

#[tokio::test]
async fn selection_history_records_select_and_drop() {
    let pool = test_pool().await;
    open_selection(&pool).await;

    let course = seed_course(&pool, "PE114", "Archery", 1.0, 10, "Wed", "10:00", "11:00").await;
    let user = seed_user(&pool, "20260110", 10.0).await;
    let service = service(&pool);

    service.select_course(&user.id, &course.id).await.unwrap();
    service.drop_course(&user.id, &course.id).await.unwrap();

    let history = service
        .selection_history(&user.id, Some("2026-spring"), None)
        .await
        .unwrap();
    assert_eq!(history.len(), 2);

    let actions: Vec<&str> = history.iter().map(|entry| entry.action.as_str()).collect();
    assert!(actions.contains(&"select"));
    assert!(actions.contains(&"drop"));
}

#[tokio::test]
async fn my_selections_reports_status_counts() {
    let pool = test_pool().await;
    open_selection(&pool).await;

    let course_a = seed_course(&pool, "PE115", "Judo", 1.0, 10, "Mon", "08:00", "09:00").await;
    let course_b = seed_course(&pool, "PE116", "Karate", 1.0, 10, "Tue", "08:00", "09:00").await;
    let user = seed_user(&pool, "20260111", 10.0).await;
    let service = service(&pool);

    service.select_course(&user.id, &course_a.id).await.unwrap();
    service.select_course(&user.id, &course_b.id).await.unwrap();
    service.drop_course(&user.id, &course_b.id).await.unwrap();

    let mine = service.my_selections(&user.id, None).await.unwrap();
    assert_eq!(mine.selections.len(), 2);
    assert_eq!(mine.status_counts.get("selected"), Some(&1));
    assert_eq!(mine.status_counts.get("dropped"), Some(&1));

    let selected_only = service
        .my_selections(&user.id, Some(SelectionStatus::Selected))
        .await
        .unwrap();
    assert_eq!(selected_only.selections.len(), 1);
    assert_eq!(selected_only.selections[0].course_name, "Judo");
}

#[tokio::test]
async fn favorites_roundtrip() {
    let pool = test_pool().await;

    let course = seed_course(&pool, "PE117", "Skating", 1.0, 10, "Thu", "10:00", "11:00").await;
    let user = seed_user(&pool, "20260112", 10.0).await;
    let service = service(&pool);

    service.favorite_course(&user.id, &course.id).await.unwrap();

    let err = service.favorite_course(&user.id, &course.id).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));

    let favorites = service.favorite_courses(&user.id).await.unwrap();
    assert_eq!(favorites.len(), 1);
    assert_eq!(favorites[0].course_name, "Skating");

    service.unfavorite_course(&user.id, &course.id).await.unwrap();
    let err = service.unfavorite_course(&user.id, &course.id).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound));
}
