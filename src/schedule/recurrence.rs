//! Turns a course's weekly pattern into a first concrete occurrence plus an
//! RRULE describing the rest of the series.

use std::fmt;

use chrono::{DateTime, Datelike, Days, NaiveDate, TimeZone, Weekday};
use chrono_tz::Tz;

use crate::error::AppError;
use crate::models::CourseRecord;
use crate::schedule::period::period_info;
use crate::schedule::semester::REFERENCE_TZ;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Occurrence {
    pub start: DateTime<Tz>,
    pub end: DateTime<Tz>,
}

impl Occurrence {
    pub fn start_timestamp(&self) -> i64 {
        self.start.timestamp()
    }

    pub fn end_timestamp(&self) -> i64 {
        self.end.timestamp()
    }
}

/// Weekly recurrence. Alternating-week courses use `interval = 2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecurrenceRule {
    pub by_weekday: Weekday,
    pub interval: u32,
    pub count: u32,
}

impl fmt::Display for RecurrenceRule {
    /// Key order is fixed; the calendar service compares it verbatim.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "FREQ=WEEKLY;BYDAY={};INTERVAL={};COUNT={}",
            weekday_code(self.by_weekday),
            self.interval,
            self.count
        )
    }
}

fn weekday_code(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "MO",
        Weekday::Tue => "TU",
        Weekday::Wed => "WE",
        Weekday::Thu => "TH",
        Weekday::Fri => "FR",
        Weekday::Sat => "SA",
        Weekday::Sun => "SU",
    }
}

fn course_weekday(day_of_week: u32) -> Option<Weekday> {
    match day_of_week {
        1 => Some(Weekday::Mon),
        2 => Some(Weekday::Tue),
        3 => Some(Weekday::Wed),
        4 => Some(Weekday::Thu),
        5 => Some(Weekday::Fri),
        _ => None,
    }
}

/// The term start itself when it is a Monday, otherwise the following Monday.
pub fn first_monday(semester_start: NaiveDate) -> NaiveDate {
    let weekday = semester_start.weekday().number_from_monday();
    let days_to_add = match weekday {
        1 => 0,
        7 => 1,
        n => 8 - n,
    };
    semester_start + Days::new(u64::from(days_to_add))
}

/// Rejects records whose alternating pattern would anchor on the wrong week,
/// e.g. an even-week course starting in week 3.
pub fn check_parity(course: &CourseRecord) -> Result<(), AppError> {
    if course.week_type.is_alternating() && !course.week_type.matches(course.start_week) {
        return Err(AppError::Validation(format!(
            "start week {} does not match week type {}",
            course.start_week,
            course.week_type.as_str()
        )));
    }
    Ok(())
}

/// Validates the record and everything the scheduler relies on.
pub fn ensure_schedulable(course: &CourseRecord) -> Result<(), AppError> {
    course.validate()?;
    check_parity(course)
}

pub fn first_occurrence(
    course: &CourseRecord,
    semester_start: NaiveDate,
) -> Result<Occurrence, AppError> {
    let start_info = period_info(course.start_period)
        .ok_or(AppError::InvalidPeriod(course.start_period))?;
    let end_info = period_info(course.end_period)
        .ok_or(AppError::InvalidPeriod(course.end_period))?;

    let week_offset = u64::from(course.start_week.saturating_sub(1)) * 7;
    let day_offset = u64::from(course.day_of_week.saturating_sub(1));
    let date = first_monday(semester_start)
        .checked_add_days(Days::new(week_offset + day_offset))
        .ok_or_else(|| AppError::Validation("course date is out of range".to_string()))?;

    let (start_hour, start_minute) = start_info.start_hm();
    let (end_hour, end_minute) = end_info.end_hm();

    Ok(Occurrence {
        start: localize(date, start_hour, start_minute)?,
        end: localize(date, end_hour, end_minute)?,
    })
}

fn localize(date: NaiveDate, hour: u32, minute: u32) -> Result<DateTime<Tz>, AppError> {
    let naive = date
        .and_hms_opt(hour, minute, 0)
        .ok_or_else(|| AppError::Validation(format!("invalid clock time {}:{}", hour, minute)))?;
    REFERENCE_TZ
        .from_local_datetime(&naive)
        .single()
        .ok_or_else(|| AppError::Validation(format!("ambiguous local time {}", naive)))
}

pub fn occurrence_count(course: &CourseRecord) -> u32 {
    let weeks = (course.end_week + 1).saturating_sub(course.start_week);
    if course.week_type.is_alternating() {
        weeks.div_ceil(2)
    } else {
        weeks
    }
}

/// `None` when the course meets at most once.
pub fn recurrence_rule(course: &CourseRecord) -> Option<RecurrenceRule> {
    let count = occurrence_count(course);
    if count <= 1 {
        return None;
    }

    Some(RecurrenceRule {
        by_weekday: course_weekday(course.day_of_week)?,
        interval: if course.week_type.is_alternating() { 2 } else { 1 },
        count,
    })
}
