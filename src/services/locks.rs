use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::Mutex as AsyncMutex;

/// Registry of per-course mutexes. All selection writers run in this
/// process, so holding a course's mutex across the read-check-write
/// transaction serializes concurrent mutations of its `enrolled_count`.
/// Selections against different courses proceed fully concurrently.
#[derive(Default)]
pub struct CourseLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl CourseLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock handle for one course. Entries are created on first use and
    /// live for the rest of the process; the course catalog is small.
    pub fn for_course(&self, course_id: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self
            .locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        locks
            .entry(course_id.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }
}
