use std::sync::Arc;

use crate::repository::CourseRepository;
use crate::services::CalendarSyncEngine;
use crate::storage::SqliteKvStore;

#[derive(Clone)]
pub struct AppState {
    pub kv: Arc<SqliteKvStore>,
    pub courses: Arc<CourseRepository>,
    pub engine: Arc<CalendarSyncEngine>,
}
