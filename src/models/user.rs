use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Account data is owned by the user-management collaborators; the engine
/// only reads `credit_limit`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: String,
    pub student_id: String,
    pub name: String,
    pub credit_limit: f64,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewUser {
    pub student_id: String,
    pub name: String,
    pub credit_limit: f64,
}
