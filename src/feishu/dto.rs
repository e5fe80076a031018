//! Wire shapes of the workspace platform and the normalization helpers that
//! flatten its inconsistent nesting (`{event: {event_id}}` vs `{event_id}`).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Every response is wrapped as `{code, msg, data}`; `code != 0` is an error.
#[derive(Debug, Deserialize)]
pub struct Envelope {
    pub code: i64,
    #[serde(default)]
    pub msg: String,
    #[serde(default)]
    pub data: Value,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TableInfo {
    pub table_id: String,
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawRecord {
    #[serde(default)]
    pub record_id: String,
    #[serde(default)]
    pub fields: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecordPage {
    #[serde(default)]
    pub items: Vec<RawRecord>,
    #[serde(default)]
    pub has_more: bool,
    #[serde(default)]
    pub page_token: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Conjunction {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum FilterOperator {
    Is,
    IsNotEmpty,
    IsEmpty,
    IsLessEqual,
    IsGreaterEqual,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilterCondition {
    pub field_name: String,
    pub operator: FilterOperator,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub value: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordFilter {
    pub conjunction: Conjunction,
    pub conditions: Vec<FilterCondition>,
}

impl RecordFilter {
    pub fn all() -> Self {
        Self {
            conjunction: Conjunction::And,
            conditions: Vec::new(),
        }
    }

    pub fn and(mut self, field_name: &str, operator: FilterOperator, value: &[&str]) -> Self {
        self.conditions.push(FilterCondition {
            field_name: field_name.to_string(),
            operator,
            value: value.iter().map(|v| v.to_string()).collect(),
        });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CalendarInfo {
    pub calendar_id: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub summary_alias: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub permissions: String,
    #[serde(default)]
    pub role: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewCalendar {
    pub summary: String,
    pub description: String,
    pub permissions: String,
    pub color: i32,
    pub summary_alias: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventTime {
    pub timestamp: String,
    pub timezone: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reminder {
    pub minutes: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventPayload {
    pub summary: String,
    pub description: String,
    pub location: EventLocation,
    pub start_time: EventTime,
    pub end_time: EventTime,
    pub visibility: String,
    pub free_busy_status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recurrence: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub reminders: Vec<Reminder>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventLocation {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CalendarEvent {
    #[serde(default)]
    pub event_id: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub location: Option<EventLocation>,
    #[serde(default)]
    pub recurrence: Option<String>,
}

impl CalendarEvent {
    pub fn location_name(&self) -> &str {
        self.location.as_ref().map(|l| l.name.as_str()).unwrap_or_default()
    }
}

/// `data[key]` when the payload nests one level deeper, otherwise `data`.
pub fn unwrap_nested<'a>(data: &'a Value, key: &str) -> &'a Value {
    match data.get(key) {
        Some(inner) if inner.is_object() => inner,
        _ => data,
    }
}

pub fn extract_event_id(data: &Value) -> Option<String> {
    non_empty_str(unwrap_nested(data, "event"), "event_id")
}

pub fn extract_calendar_id(data: &Value) -> Option<String> {
    non_empty_str(unwrap_nested(data, "calendar"), "calendar_id")
}

pub fn extract_record(data: &Value) -> Option<RawRecord> {
    serde_json::from_value(unwrap_nested(data, "record").clone()).ok()
}

/// First array found under any of `keys`, decoded item by item; items that
/// do not decode are dropped.
pub fn extract_list<T>(data: &Value, keys: &[&str]) -> Vec<T>
where
    T: for<'de> Deserialize<'de>,
{
    keys.iter()
        .find_map(|key| data.get(*key).and_then(Value::as_array))
        .map(|items| {
            items
                .iter()
                .filter_map(|item| serde_json::from_value(item.clone()).ok())
                .collect()
        })
        .unwrap_or_default()
}

fn non_empty_str(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
