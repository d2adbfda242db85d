use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum ConfigStatus {
    Draft,
    Active,
    Ended,
    Cancelled,
}

/// Admin-defined selection window. The gate treats selection as open iff an
/// `active` row's `[start_time, end_time]` window contains the current time.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SelectionConfig {
    pub id: String,
    pub round_name: Option<String>,
    pub semester: String,
    pub academic_year: String,
    pub start_time: String,
    pub end_time: String,
    pub status: ConfigStatus,
    pub description: Option<String>,
    pub created_by: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSelectionConfig {
    pub round_name: Option<String>,
    pub semester: String,
    pub academic_year: String,
    pub start_time: String,
    pub end_time: String,
    pub status: ConfigStatus,
    pub description: Option<String>,
    pub created_by: Option<String>,
}
