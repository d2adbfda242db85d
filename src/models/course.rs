use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum CourseStatus {
    Draft,
    Published,
    Closed,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Course {
    pub id: String,
    pub course_code: String,
    pub name: String,
    pub credits: f64,
    pub capacity: i64,
    pub enrolled_count: i64,
    pub day_of_week: String,
    pub start_time: String,
    pub end_time: String,
    pub status: CourseStatus,
    pub selection_start_time: Option<String>,
    pub selection_end_time: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Course creation payload used by the admin-side CRUD collaborators and tests.
/// The selection engine itself only ever reads courses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCourse {
    pub course_code: String,
    pub name: String,
    pub credits: f64,
    pub capacity: i64,
    pub day_of_week: String,
    pub start_time: String,
    pub end_time: String,
    pub status: CourseStatus,
    pub selection_start_time: Option<String>,
    pub selection_end_time: Option<String>,
}
