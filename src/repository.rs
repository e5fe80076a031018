use std::sync::Arc;

use serde_json::{Map, Value, json};
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::error::AppError;
use crate::feishu::RecordStore;
use crate::feishu::dto::{FilterOperator, RecordFilter};
use crate::models::{CourseRecord, ImportedCourse, process_feishu_records};

pub const DEFAULT_COURSE_TABLE: &str = "course_information";
pub const EVENT_ID_FIELD: &str = "event_id";

const BATCH_CREATE_LIMIT: usize = 500;

/// Course-level access to the course table of the record store.
pub struct CourseRepository {
    store: Arc<dyn RecordStore>,
    table_name: String,
    table_id: OnceCell<String>,
}

impl CourseRepository {
    pub fn new(store: Arc<dyn RecordStore>, table_name: &str) -> Self {
        Self {
            store,
            table_name: table_name.to_string(),
            table_id: OnceCell::new(),
        }
    }

    async fn table_id(&self) -> Result<&str, AppError> {
        let id = self
            .table_id
            .get_or_try_init(|| self.resolve_table_id())
            .await?;
        Ok(id.as_str())
    }

    async fn resolve_table_id(&self) -> Result<String, AppError> {
        let tables = self.store.list_tables().await?;
        tables
            .into_iter()
            .find(|table| table.name == self.table_name)
            .map(|table| table.table_id)
            .ok_or_else(|| AppError::UnexpectedResponse(format!("no table named {}", self.table_name)))
    }

    /// Courses owned by `open_id` whose week range covers `week`. Parity is
    /// not applied here.
    pub async fn fetch_courses_for_week(
        &self,
        open_id: &str,
        week: u32,
    ) -> Result<Vec<CourseRecord>, AppError> {
        let week = week.to_string();
        let filter = RecordFilter::all()
            .and("student_info", FilterOperator::Is, &[open_id])
            .and("start_week", FilterOperator::IsLessEqual, &[&week])
            .and("end_week", FilterOperator::IsGreaterEqual, &[&week]);
        self.search(&filter).await
    }

    pub async fn fetch_all_courses(&self, open_id: &str) -> Result<Vec<CourseRecord>, AppError> {
        let filter = RecordFilter::all().and("student_info", FilterOperator::Is, &[open_id]);
        self.search(&filter).await
    }

    pub async fn find_course(
        &self,
        open_id: &str,
        record_id: &str,
    ) -> Result<CourseRecord, AppError> {
        self.fetch_all_courses(open_id)
            .await?
            .into_iter()
            .find(|course| course.record_id == record_id)
            .ok_or(AppError::NotFound)
    }

    /// Every record that still points at a calendar event.
    pub async fn fetch_linked_courses(&self) -> Result<Vec<CourseRecord>, AppError> {
        let filter = RecordFilter::all().and(EVENT_ID_FIELD, FilterOperator::IsNotEmpty, &[]);
        let courses = self.search(&filter).await?;
        Ok(courses.into_iter().filter(CourseRecord::is_synced).collect())
    }

    /// Creates one record per imported course, all owned by `open_id`.
    /// Rejects the whole import when any course is invalid.
    pub async fn import_courses(
        &self,
        open_id: &str,
        courses: &[ImportedCourse],
    ) -> Result<Vec<CourseRecord>, AppError> {
        for (index, imported) in courses.iter().enumerate() {
            let preview = CourseRecord {
                course_name: imported.course_name.clone(),
                day_of_week: imported.day_of_week,
                start_period: imported.start_period,
                end_period: imported.end_period,
                start_week: imported.start_week,
                end_week: imported.end_week,
                week_type: imported.week_type,
                ..CourseRecord::default()
            };
            preview.validate().map_err(|e| {
                AppError::Validation(format!("course #{} ({}): {}", index + 1, imported.course_name, e))
            })?;
        }

        let table_id = self.table_id().await?;
        let mut created = Vec::with_capacity(courses.len());
        for chunk in courses.chunks(BATCH_CREATE_LIMIT) {
            let fields = chunk.iter().map(|c| c.to_table_fields(open_id)).collect();
            let records = self.store.batch_create_records(table_id, fields).await?;
            created.extend(process_feishu_records(&records));
        }

        info!("imported {} courses for {}", created.len(), open_id);
        Ok(created)
    }

    pub async fn set_event_id(&self, record_id: &str, event_id: &str) -> Result<(), AppError> {
        self.write_event_id(record_id, json!(event_id)).await
    }

    pub async fn clear_event_id(&self, record_id: &str) -> Result<(), AppError> {
        self.write_event_id(record_id, Value::Null).await
    }

    async fn write_event_id(&self, record_id: &str, value: Value) -> Result<(), AppError> {
        let table_id = self.table_id().await?;
        let mut fields = Map::new();
        fields.insert(EVENT_ID_FIELD.to_string(), value);
        self.store.update_record(table_id, record_id, fields).await?;
        debug!("updated event_id of record {}", record_id);
        Ok(())
    }

    async fn search(&self, filter: &RecordFilter) -> Result<Vec<CourseRecord>, AppError> {
        let table_id = self.table_id().await?;
        let records = self.store.search_records(table_id, filter).await?;
        Ok(process_feishu_records(&records))
    }
}
