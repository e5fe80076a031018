#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use timetable::error::AppError;
use timetable::feishu::dto::{
    CalendarEvent, CalendarInfo, EventPayload, FilterOperator, NewCalendar, RawRecord,
    RecordFilter, TableInfo,
};
use timetable::feishu::{CalendarService, RecordStore};

/// Calendar service double that records every call.
#[derive(Default)]
pub struct MockCalendar {
    pub calendars: Mutex<Vec<CalendarInfo>>,
    pub created_calendars: Mutex<Vec<NewCalendar>>,
    pub created_events: Mutex<Vec<(String, EventPayload)>>,
    pub deleted_events: Mutex<Vec<(String, String)>>,
    pub deleted_calendars: Mutex<Vec<String>>,
    pub listed_events: Mutex<Vec<CalendarEvent>>,
    /// Event titles whose creation fails.
    pub failing_titles: Mutex<HashSet<String>>,
    pub fail_list: AtomicBool,
    pub fail_create_calendar: AtomicBool,
    pub fail_delete_calendar: AtomicBool,
    calls: AtomicUsize,
    next_id: AtomicUsize,
}

impl MockCalendar {
    pub fn with_calendars(calendars: &[(&str, &str)]) -> Self {
        let mock = Self::default();
        *mock.calendars.lock().unwrap() = calendars
            .iter()
            .map(|(id, summary)| CalendarInfo {
                calendar_id: id.to_string(),
                summary: summary.to_string(),
                ..CalendarInfo::default()
            })
            .collect();
        mock
    }

    pub fn fail_for(&self, title: &str) {
        self.failing_titles.lock().unwrap().insert(title.to_string());
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn created_titles(&self) -> Vec<String> {
        self.created_events
            .lock()
            .unwrap()
            .iter()
            .map(|(_, event)| event.summary.clone())
            .collect()
    }

    fn touch(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl CalendarService for MockCalendar {
    async fn list_calendars(&self) -> Result<Vec<CalendarInfo>, AppError> {
        self.touch();
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(AppError::Api {
                code: 190004,
                msg: "list failed".to_string(),
            });
        }
        Ok(self.calendars.lock().unwrap().clone())
    }

    async fn create_calendar(&self, calendar: &NewCalendar) -> Result<String, AppError> {
        self.touch();
        if self.fail_create_calendar.load(Ordering::SeqCst) {
            return Err(AppError::Api {
                code: 190005,
                msg: "create calendar failed".to_string(),
            });
        }
        self.created_calendars.lock().unwrap().push(calendar.clone());
        let id = format!("cal_created_{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.calendars.lock().unwrap().push(CalendarInfo {
            calendar_id: id.clone(),
            summary: calendar.summary.clone(),
            summary_alias: calendar.summary_alias.clone(),
            ..CalendarInfo::default()
        });
        Ok(id)
    }

    async fn create_event(
        &self,
        calendar_id: &str,
        event: &EventPayload,
    ) -> Result<String, AppError> {
        self.touch();
        if self.failing_titles.lock().unwrap().contains(&event.summary) {
            return Err(AppError::Api {
                code: 190002,
                msg: format!("cannot create {}", event.summary),
            });
        }
        self.created_events
            .lock()
            .unwrap()
            .push((calendar_id.to_string(), event.clone()));
        Ok(format!("evt_{}", self.next_id.fetch_add(1, Ordering::SeqCst)))
    }

    async fn delete_event(&self, calendar_id: &str, event_id: &str) -> Result<(), AppError> {
        self.touch();
        self.deleted_events
            .lock()
            .unwrap()
            .push((calendar_id.to_string(), event_id.to_string()));
        Ok(())
    }

    async fn delete_calendar(&self, calendar_id: &str) -> Result<(), AppError> {
        self.touch();
        if self.fail_delete_calendar.load(Ordering::SeqCst) {
            return Err(AppError::Api {
                code: 195100,
                msg: "calendar is gone".to_string(),
            });
        }
        self.deleted_calendars.lock().unwrap().push(calendar_id.to_string());
        Ok(())
    }

    async fn list_events(
        &self,
        _calendar_id: &str,
        _start: i64,
        _end: i64,
    ) -> Result<Vec<CalendarEvent>, AppError> {
        self.touch();
        Ok(self.listed_events.lock().unwrap().clone())
    }
}

/// Record store double holding one course table, with enough filter support
/// for the course queries.
pub struct MockRecordStore {
    pub records: Mutex<Vec<RawRecord>>,
    pub updates: Mutex<Vec<(String, Map<String, Value>)>>,
    pub fail_updates: AtomicBool,
    next_id: AtomicUsize,
}

pub const TABLE_ID: &str = "tbl_courses";

impl MockRecordStore {
    pub fn new(records: Vec<RawRecord>) -> Self {
        Self {
            records: Mutex::new(records),
            updates: Mutex::new(Vec::new()),
            fail_updates: AtomicBool::new(false),
            next_id: AtomicUsize::new(1000),
        }
    }

    pub fn event_id_of(&self, record_id: &str) -> Option<String> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.record_id == record_id)
            .and_then(|r| r.fields.get("event_id"))
            .and_then(Value::as_str)
            .map(str::to_string)
    }
}

fn matches_filter(record: &RawRecord, filter: &RecordFilter) -> bool {
    filter.conditions.iter().all(|condition| {
        let value = record.fields.get(&condition.field_name);
        let expected = condition.value.first().map(String::as_str).unwrap_or_default();
        match condition.operator {
            FilterOperator::IsNotEmpty => match value {
                Some(Value::String(s)) => !s.is_empty(),
                Some(Value::Null) | None => false,
                Some(_) => true,
            },
            FilterOperator::IsEmpty => !matches!(value, Some(Value::String(s)) if !s.is_empty()),
            FilterOperator::Is => match value {
                Some(Value::Array(people)) => people
                    .iter()
                    .any(|p| p.get("id").and_then(Value::as_str) == Some(expected)),
                Some(Value::String(s)) => s == expected,
                _ => false,
            },
            FilterOperator::IsLessEqual | FilterOperator::IsGreaterEqual => {
                let (Some(actual), Ok(bound)) =
                    (value.and_then(Value::as_u64), expected.parse::<u64>())
                else {
                    return false;
                };
                if condition.operator == FilterOperator::IsLessEqual {
                    actual <= bound
                } else {
                    actual >= bound
                }
            }
        }
    })
}

#[async_trait]
impl RecordStore for MockRecordStore {
    async fn list_tables(&self) -> Result<Vec<TableInfo>, AppError> {
        Ok(vec![
            TableInfo {
                table_id: "tbl_students".to_string(),
                name: "students".to_string(),
            },
            TableInfo {
                table_id: TABLE_ID.to_string(),
                name: "course_information".to_string(),
            },
        ])
    }

    async fn search_records(
        &self,
        table_id: &str,
        filter: &RecordFilter,
    ) -> Result<Vec<RawRecord>, AppError> {
        assert_eq!(table_id, TABLE_ID);
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| matches_filter(r, filter))
            .cloned()
            .collect())
    }

    async fn batch_create_records(
        &self,
        table_id: &str,
        records: Vec<Map<String, Value>>,
    ) -> Result<Vec<RawRecord>, AppError> {
        assert_eq!(table_id, TABLE_ID);
        let created: Vec<RawRecord> = records
            .into_iter()
            .map(|fields| RawRecord {
                record_id: format!("rec_{}", self.next_id.fetch_add(1, Ordering::SeqCst)),
                fields,
            })
            .collect();
        self.records.lock().unwrap().extend(created.iter().cloned());
        Ok(created)
    }

    async fn update_record(
        &self,
        table_id: &str,
        record_id: &str,
        fields: Map<String, Value>,
    ) -> Result<RawRecord, AppError> {
        assert_eq!(table_id, TABLE_ID);
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(AppError::Api {
                code: 1254043,
                msg: "record is locked".to_string(),
            });
        }
        self.updates
            .lock()
            .unwrap()
            .push((record_id.to_string(), fields.clone()));

        let mut records = self.records.lock().unwrap();
        let record = records
            .iter_mut()
            .find(|r| r.record_id == record_id)
            .ok_or(AppError::NotFound)?;
        for (key, value) in fields {
            record.fields.insert(key, value);
        }
        Ok(record.clone())
    }
}

/// A table record as the store returns it.
pub fn course_record(
    record_id: &str,
    name: &str,
    day_of_week: u32,
    weeks: (u32, u32),
    week_type: &str,
    event_id: Option<&str>,
) -> RawRecord {
    let mut fields = json!({
        "course_name": [{ "text": name, "type": "text" }],
        "teacher": [{ "text": "张老师", "type": "text" }],
        "location": [{ "text": "A101", "type": "text" }],
        "student_info": [{ "id": "ou_student", "en_name": "Li Lei" }],
        "day_of_week": day_of_week,
        "start_period": 1,
        "end_period": 2,
        "start_week": weeks.0,
        "end_week": weeks.1,
        "week_type": week_type
    });
    if let Some(event_id) = event_id {
        fields["event_id"] = json!(event_id);
    }

    RawRecord {
        record_id: record_id.to_string(),
        fields: fields.as_object().cloned().unwrap_or_default(),
    }
}
