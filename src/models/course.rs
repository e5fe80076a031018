use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::error::AppError;
use crate::feishu::dto::RawRecord;
use crate::schedule::period::{FIRST_PERIOD, LAST_PERIOD};

const COLOR_PALETTE: [&str; 10] = [
    "#FF6B6B", "#4ECDC4", "#45B7D1", "#96CEB4", "#FFEAA7",
    "#DDA0DD", "#98D8C8", "#FFB6C1", "#87CEEB", "#F0E68C",
];

const DAY_NAMES: [&str; 5] = ["周一", "周二", "周三", "周四", "周五"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WeekType {
    #[default]
    All,
    Odd,
    Even,
}

impl WeekType {
    /// Accepts the English keys and the Chinese labels used in the table.
    pub fn parse(value: &str) -> Self {
        match value.trim() {
            "odd" | "单周" => WeekType::Odd,
            "even" | "双周" => WeekType::Even,
            _ => WeekType::All,
        }
    }

    pub fn matches(self, week: u32) -> bool {
        match self {
            WeekType::All => true,
            WeekType::Odd => week % 2 == 1,
            WeekType::Even => week % 2 == 0,
        }
    }

    pub fn is_alternating(self) -> bool {
        self != WeekType::All
    }

    pub fn label(self) -> Option<&'static str> {
        match self {
            WeekType::All => None,
            WeekType::Odd => Some("单周"),
            WeekType::Even => Some("双周"),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            WeekType::All => "all",
            WeekType::Odd => "odd",
            WeekType::Even => "even",
        }
    }
}

/// One scheduled course block, normalized from a table record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseRecord {
    #[serde(default)]
    pub record_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
    pub course_name: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub teacher: String,
    #[serde(default)]
    pub course_code: String,
    #[serde(default)]
    pub student_name: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub color: String,
    pub day_of_week: u32,
    pub start_period: u32,
    pub end_period: u32,
    pub start_week: u32,
    pub end_week: u32,
    #[serde(default)]
    pub week_type: WeekType,
}

impl Default for CourseRecord {
    fn default() -> Self {
        Self {
            record_id: String::new(),
            event_id: None,
            course_name: String::new(),
            location: String::new(),
            teacher: String::new(),
            course_code: String::new(),
            student_name: String::new(),
            notes: String::new(),
            color: String::new(),
            day_of_week: 1,
            start_period: 1,
            end_period: 1,
            start_week: 1,
            end_week: 16,
            week_type: WeekType::All,
        }
    }
}

impl CourseRecord {
    /// Maps a raw table record. Missing numbers fall back to the table
    /// defaults (day 1, period 1, weeks 1-16).
    pub fn from_feishu_record(record: &RawRecord) -> Self {
        let fields = &record.fields;

        let event_id = field_text(fields.get("event_id"));
        let mut course = Self {
            record_id: record.record_id.clone(),
            event_id: (!event_id.is_empty()).then_some(event_id),
            course_name: field_text(fields.get("course_name")),
            location: field_text(fields.get("location")),
            teacher: field_text(fields.get("teacher")),
            course_code: field_text(fields.get("course_code")),
            student_name: person_name(fields.get("student_info")),
            notes: field_text(fields.get("notes")),
            color: field_text(fields.get("color")),
            day_of_week: field_number(fields.get("day_of_week")).unwrap_or(1),
            start_period: field_number(fields.get("start_period")).unwrap_or(1),
            end_period: field_number(fields.get("end_period")).unwrap_or(1),
            start_week: field_number(fields.get("start_week")).unwrap_or(1),
            end_week: field_number(fields.get("end_week")).unwrap_or(16),
            week_type: WeekType::parse(&field_text(fields.get("week_type"))),
        };
        course.ensure_color();
        course
    }

    /// Wire representation handed to the UI layer.
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.course_name.trim().is_empty() {
            return Err(AppError::Validation("course name is empty".to_string()));
        }
        if !(1..=5).contains(&self.day_of_week) {
            return Err(AppError::Validation(format!(
                "day of week {} is outside 1-5",
                self.day_of_week
            )));
        }
        let periods = FIRST_PERIOD..=LAST_PERIOD;
        if !periods.contains(&self.start_period) || !periods.contains(&self.end_period) {
            return Err(AppError::Validation(format!(
                "periods {}-{} are outside {}-{}",
                self.start_period, self.end_period, FIRST_PERIOD, LAST_PERIOD
            )));
        }
        if self.start_period > self.end_period {
            return Err(AppError::Validation(format!(
                "start period {} is after end period {}",
                self.start_period, self.end_period
            )));
        }
        if self.start_week < 1 || self.start_week > self.end_week {
            return Err(AppError::Validation(format!(
                "week range {}-{} is invalid",
                self.start_week, self.end_week
            )));
        }
        Ok(())
    }

    pub fn duration(&self) -> u32 {
        (self.end_period + 1).saturating_sub(self.start_period)
    }

    pub fn has_class_in_week(&self, week: u32) -> bool {
        week >= self.start_week && week <= self.end_week && self.week_type.matches(week)
    }

    pub fn is_synced(&self) -> bool {
        self.event_id.as_deref().is_some_and(|id| !id.is_empty())
    }

    /// `周三 第1-2节 1-16周(单周)`
    pub fn time_description(&self) -> String {
        let day = DAY_NAMES
            .get((self.day_of_week as usize).wrapping_sub(1))
            .copied()
            .unwrap_or("");
        let parity = self
            .week_type
            .label()
            .map(|label| format!("({})", label))
            .unwrap_or_default();

        format!(
            "{} 第{}-{}节 {}-{}周{}",
            day, self.start_period, self.end_period, self.start_week, self.end_week, parity
        )
    }

    fn ensure_color(&mut self) {
        if self.color.is_empty() {
            self.color = palette_color(&self.course_name).to_string();
        }
    }
}

impl fmt::Display for CourseRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.course_name, self.time_description())
    }
}

/// Same course name, same colour.
pub fn palette_color(course_name: &str) -> &'static str {
    let sum = course_name
        .bytes()
        .fold(0usize, |acc, b| acc.wrapping_add(usize::from(b)));
    COLOR_PALETTE[sum % COLOR_PALETTE.len()]
}

pub fn process_feishu_records(records: &[RawRecord]) -> Vec<CourseRecord> {
    records.iter().map(CourseRecord::from_feishu_record).collect()
}

/// Buckets courses by weekday (1-5), each sorted by start period.
pub fn group_courses_by_day(courses: &[CourseRecord]) -> BTreeMap<u32, Vec<CourseRecord>> {
    let mut grouped: BTreeMap<u32, Vec<CourseRecord>> = (1..=5).map(|d| (d, Vec::new())).collect();

    for course in courses {
        if let Some(day) = grouped.get_mut(&course.day_of_week) {
            day.push(course.clone());
        }
    }
    for day in grouped.values_mut() {
        day.sort_by_key(|c| c.start_period);
    }

    grouped
}

/// A course as found in a user's import file (camelCase keys).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportedCourse {
    pub course_name: String,
    #[serde(default)]
    pub course_code: Option<String>,
    #[serde(default)]
    pub teacher: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    pub day_of_week: u32,
    pub start_period: u32,
    pub end_period: u32,
    pub start_week: u32,
    pub end_week: u32,
    #[serde(default)]
    pub week_type: WeekType,
}

impl ImportedCourse {
    /// Table fields for a new record owned by `open_id`.
    pub fn to_table_fields(&self, open_id: &str) -> Map<String, Value> {
        let mut fields = Map::new();
        fields.insert("course_name".into(), json!(self.course_name));
        for (key, value) in [
            ("course_code", &self.course_code),
            ("teacher", &self.teacher),
            ("location", &self.location),
            ("notes", &self.notes),
        ] {
            if let Some(value) = value.as_deref().filter(|v| !v.is_empty()) {
                fields.insert(key.into(), json!(value));
            }
        }
        fields.insert("day_of_week".into(), json!(self.day_of_week));
        fields.insert("start_period".into(), json!(self.start_period));
        fields.insert("end_period".into(), json!(self.end_period));
        fields.insert("start_week".into(), json!(self.start_week));
        fields.insert("end_week".into(), json!(self.end_week));
        fields.insert("week_type".into(), json!(self.week_type.as_str()));
        fields.insert("student_info".into(), json!([{ "id": open_id }]));
        fields
    }
}

/// Text cells come back either as a plain string or as `[{text: ..}]` segments.
fn field_text(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s.as_str()),
                other => other.get("text").and_then(Value::as_str),
            })
            .collect(),
        Some(Value::Object(obj)) => obj
            .get("text")
            .or_else(|| obj.get("value"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

fn field_number(value: Option<&Value>) -> Option<u32> {
    match value {
        Some(Value::Number(n)) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
            .and_then(|n| u32::try_from(n).ok()),
        Some(other) => field_text(Some(other)).trim().parse().ok(),
        None => None,
    }
}

/// Person cells: the first person's English name.
fn person_name(value: Option<&Value>) -> String {
    value
        .and_then(Value::as_array)
        .and_then(|people| people.first())
        .and_then(|person| person.get("en_name"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}
