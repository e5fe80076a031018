//! Calendar event payloads built from course records.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::feishu::dto::{EventLocation, EventPayload, EventTime, Reminder};
use crate::models::CourseRecord;
use crate::schedule::recurrence::{ensure_schedulable, first_occurrence, recurrence_rule};
use crate::schedule::semester::REFERENCE_TZ_NAME;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ReminderOption {
    #[default]
    None,
    FiveMinutes,
    FifteenMinutes,
    ThirtyMinutes,
    SixtyMinutes,
}

impl ReminderOption {
    /// Unknown options behave as `none`.
    pub fn parse(option: &str) -> Self {
        match option.trim() {
            "5min" => ReminderOption::FiveMinutes,
            "15min" => ReminderOption::FifteenMinutes,
            "30min" => ReminderOption::ThirtyMinutes,
            "60min" => ReminderOption::SixtyMinutes,
            _ => ReminderOption::None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ReminderOption::None => "none",
            ReminderOption::FiveMinutes => "5min",
            ReminderOption::FifteenMinutes => "15min",
            ReminderOption::ThirtyMinutes => "30min",
            ReminderOption::SixtyMinutes => "60min",
        }
    }

    pub fn reminders(self) -> Vec<Reminder> {
        let minutes = match self {
            ReminderOption::None => return Vec::new(),
            ReminderOption::FiveMinutes => 5,
            ReminderOption::FifteenMinutes => 15,
            ReminderOption::ThirtyMinutes => 30,
            ReminderOption::SixtyMinutes => 60,
        };
        vec![Reminder { minutes }]
    }
}

impl From<String> for ReminderOption {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl From<ReminderOption> for String {
    fn from(value: ReminderOption) -> Self {
        value.as_str().to_string()
    }
}

pub fn get_reminder_settings(option: &str) -> Vec<Reminder> {
    ReminderOption::parse(option).reminders()
}

/// One line per non-empty field, in a fixed order.
pub fn generate_description(course: &CourseRecord) -> String {
    let mut lines = Vec::new();

    if !course.teacher.is_empty() {
        lines.push(format!("教师: {}", course.teacher));
    }
    if !course.location.is_empty() {
        lines.push(format!("地点: {}", course.location));
    }
    if !course.course_code.is_empty() {
        lines.push(format!("课程代码: {}", course.course_code));
    }
    lines.push(format!("周次: 第{}-{}周", course.start_week, course.end_week));
    lines.push(format!("节次: 第{}-{}节", course.start_period, course.end_period));
    if let Some(label) = course.week_type.label() {
        lines.push(format!("类型: {}", label));
    }
    if !course.notes.is_empty() {
        lines.push(format!("备注: {}", course.notes));
    }

    lines.join("\n")
}

pub fn build_event_payload(
    course: &CourseRecord,
    semester_start: NaiveDate,
    reminder: ReminderOption,
) -> Result<EventPayload, AppError> {
    ensure_schedulable(course)?;
    let occurrence = first_occurrence(course, semester_start)?;

    Ok(EventPayload {
        summary: course.course_name.clone(),
        description: generate_description(course),
        location: EventLocation {
            name: course.location.clone(),
        },
        start_time: event_time(occurrence.start_timestamp()),
        end_time: event_time(occurrence.end_timestamp()),
        visibility: "default".to_string(),
        free_busy_status: "busy".to_string(),
        recurrence: recurrence_rule(course).map(|rule| rule.to_string()),
        reminders: reminder.reminders(),
    })
}

fn event_time(timestamp: i64) -> EventTime {
    EventTime {
        timestamp: timestamp.to_string(),
        timezone: REFERENCE_TZ_NAME.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::WeekType;

    fn semester_start() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 9, 1).expect("valid date")
    }

    fn linear_algebra() -> CourseRecord {
        CourseRecord {
            record_id: "rec1".to_string(),
            course_name: "线性代数".to_string(),
            teacher: "王老师".to_string(),
            location: "教学楼A101".to_string(),
            day_of_week: 3,
            start_period: 1,
            end_period: 2,
            start_week: 1,
            end_week: 16,
            ..CourseRecord::default()
        }
    }

    #[test]
    fn test_reminder_settings() {
        assert_eq!(get_reminder_settings("15min"), vec![Reminder { minutes: 15 }]);
        assert_eq!(get_reminder_settings("60min"), vec![Reminder { minutes: 60 }]);
        assert!(get_reminder_settings("none").is_empty());
        assert!(get_reminder_settings("unknown").is_empty());
    }

    #[test]
    fn test_reminder_option_deserializes_leniently() {
        let option: ReminderOption = serde_json::from_str("\"30min\"").expect("string");
        assert_eq!(option, ReminderOption::ThirtyMinutes);
        let option: ReminderOption = serde_json::from_str("\"2h\"").expect("string");
        assert_eq!(option, ReminderOption::None);
    }

    #[test]
    fn test_description_omits_empty_fields() {
        let description = generate_description(&linear_algebra());
        assert_eq!(
            description,
            "教师: 王老师\n地点: 教学楼A101\n周次: 第1-16周\n节次: 第1-2节"
        );
    }

    #[test]
    fn test_description_full() {
        let course = CourseRecord {
            course_code: "MATH201".to_string(),
            notes: "带计算器".to_string(),
            week_type: WeekType::Odd,
            end_week: 15,
            ..linear_algebra()
        };
        let lines: Vec<_> = generate_description(&course).lines().map(str::to_string).collect();
        assert_eq!(
            lines,
            [
                "教师: 王老师",
                "地点: 教学楼A101",
                "课程代码: MATH201",
                "周次: 第1-15周",
                "节次: 第1-2节",
                "类型: 单周",
                "备注: 带计算器",
            ]
        );
    }

    #[test]
    fn test_build_event_payload() {
        let payload =
            build_event_payload(&linear_algebra(), semester_start(), ReminderOption::FifteenMinutes)
                .expect("payload");

        assert_eq!(payload.summary, "线性代数");
        assert_eq!(payload.location.name, "教学楼A101");
        assert_eq!(payload.start_time.timestamp, "1756857600");
        // 09:35 on the same day
        assert_eq!(payload.end_time.timestamp, "1756863300");
        assert_eq!(payload.start_time.timezone, "Asia/Shanghai");
        assert_eq!(
            payload.recurrence.as_deref(),
            Some("FREQ=WEEKLY;BYDAY=WE;INTERVAL=1;COUNT=16")
        );
        assert_eq!(payload.reminders, vec![Reminder { minutes: 15 }]);
    }

    #[test]
    fn test_single_week_course_has_no_recurrence() {
        let course = CourseRecord {
            start_week: 5,
            end_week: 5,
            ..linear_algebra()
        };
        let payload =
            build_event_payload(&course, semester_start(), ReminderOption::None).expect("payload");
        assert_eq!(payload.recurrence, None);
        assert!(payload.reminders.is_empty());
    }

    #[test]
    fn test_invalid_course_is_rejected() {
        let course = CourseRecord {
            week_type: WeekType::Even,
            start_week: 1,
            ..linear_algebra()
        };
        assert!(matches!(
            build_event_payload(&course, semester_start(), ReminderOption::None),
            Err(AppError::Validation(_))
        ));
    }
}
