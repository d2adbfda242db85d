use std::sync::Arc;

use sqlx::SqlitePool;

use crate::audit::AuditSink;
use crate::services::CourseLocks;

/// Current term, stamped onto selection history rows.
#[derive(Clone, Debug)]
pub struct Term {
    pub semester: String,
    pub academic_year: String,
}

#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub locks: Arc<CourseLocks>,
    pub audit: Arc<dyn AuditSink>,
    pub term: Term,
}
