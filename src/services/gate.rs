use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqlitePool;

use crate::db::repository;
use crate::models::SelectionConfig;

/// Result of the selection-period check.
#[derive(Debug, Clone, Serialize)]
pub struct SelectionPeriod {
    pub open: bool,
    pub period: &'static str,
    pub message: String,
    pub config: Option<SelectionConfig>,
}

impl SelectionPeriod {
    fn closed(message: &str) -> Self {
        Self {
            open: false,
            period: "closed",
            message: message.to_string(),
            config: None,
        }
    }
}

/// Whether course selection is currently permitted: an `active`
/// configuration whose window contains the current time, newest first.
/// Re-evaluated on every attempt, never cached; administrators may close
/// selection at any moment.
pub async fn selection_period(db: &SqlitePool) -> Result<SelectionPeriod, sqlx::Error> {
    let now = Utc::now();

    for config in repository::active_configs(db).await? {
        let (Some(start), Some(end)) = (
            parse_timestamp(&config.start_time),
            parse_timestamp(&config.end_time),
        ) else {
            continue;
        };

        if start <= now && now <= end {
            let message = config
                .description
                .clone()
                .unwrap_or_else(|| "course selection is open".to_string());
            return Ok(SelectionPeriod {
                open: true,
                period: "selection",
                message,
                config: Some(config),
            });
        }
    }

    Ok(SelectionPeriod::closed("course selection is not open"))
}

/// Parse RFC3339 timestamp to comparable format
pub(crate) fn parse_timestamp(ts: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(ts)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
