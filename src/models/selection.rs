use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum SelectionStatus {
    Pending,
    Selected,
    Lottery,
    Waiting,
    Failed,
    Dropped,
}

impl SelectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SelectionStatus::Pending => "pending",
            SelectionStatus::Selected => "selected",
            SelectionStatus::Lottery => "lottery",
            SelectionStatus::Waiting => "waiting",
            SelectionStatus::Failed => "failed",
            SelectionStatus::Dropped => "dropped",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SelectionRecord {
    pub id: String,
    pub user_id: String,
    pub course_id: String,
    pub status: SelectionStatus,
    pub selection_time: Option<String>,
    pub result_time: Option<String>,
    pub selected_at: Option<String>,
    pub admin_notes: Option<String>,
    pub created_at: String,
}

/// Row shape for a student's selection list, joined with course schedule
/// fields for display.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct SelectionDetail {
    pub id: String,
    pub status: SelectionStatus,
    pub selection_time: Option<String>,
    pub result_time: Option<String>,
    pub course_id: String,
    pub course_code: String,
    pub course_name: String,
    pub credits: f64,
    pub day_of_week: String,
    pub start_time: String,
    pub end_time: String,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct SelectionHistoryEntry {
    pub action: String,
    pub action_time: String,
    pub semester: String,
    pub academic_year: String,
    pub course_code: String,
    pub course_name: String,
    pub credits: f64,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct FavoriteCourse {
    pub favorite_time: String,
    pub course_id: String,
    pub course_code: String,
    pub course_name: String,
    pub credits: f64,
    pub capacity: i64,
    pub enrolled_count: i64,
    pub day_of_week: String,
    pub start_time: String,
    pub end_time: String,
}
