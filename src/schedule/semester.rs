use chrono::{DateTime, Datelike, Days, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::Serialize;

use crate::models::CourseRecord;

/// Timezone every course time is expressed in.
pub const REFERENCE_TZ: Tz = chrono_tz::Asia::Shanghai;
pub const REFERENCE_TZ_NAME: &str = "Asia/Shanghai";

pub const TOTAL_WEEKS: u32 = 20;

const FALL_TERM_START: (i32, u32, u32) = (2025, 9, 1);
const SPRING_TERM_START: (i32, u32, u32) = (2026, 3, 2);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WeekRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// Term start dates. Months 3-7 belong to the spring term, the rest to fall.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TermDates {
    pub fall: NaiveDate,
    pub spring: NaiveDate,
}

impl Default for TermDates {
    fn default() -> Self {
        Self {
            fall: ymd(FALL_TERM_START),
            spring: ymd(SPRING_TERM_START),
        }
    }
}

impl TermDates {
    pub fn start_for(&self, today: NaiveDate) -> NaiveDate {
        if (3..=7).contains(&today.month()) {
            self.spring
        } else {
            self.fall
        }
    }
}

/// Week arithmetic relative to one active term start date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SemesterCalendar {
    start_date: NaiveDate,
}

impl SemesterCalendar {
    pub fn new(start_date: NaiveDate) -> Self {
        Self { start_date }
    }

    /// Picks the active term from `now` seen in the reference timezone.
    pub fn current(now: DateTime<Utc>) -> Self {
        Self::for_date(now.with_timezone(&REFERENCE_TZ).date_naive())
    }

    pub fn for_date(today: NaiveDate) -> Self {
        Self::new(TermDates::default().start_for(today))
    }

    pub fn start_date(&self) -> NaiveDate {
        self.start_date
    }

    pub fn total_weeks(&self) -> u32 {
        TOTAL_WEEKS
    }

    pub fn is_valid_week(&self, week: u32) -> bool {
        (1..=self.total_weeks()).contains(&week)
    }

    /// Literal week number of `now`, clamped to `1..=total_weeks`.
    ///
    /// Weekend handling (showing next week on Saturday/Sunday) is left to
    /// callers.
    pub fn current_week(&self, now: DateTime<Utc>) -> u32 {
        let today = now.with_timezone(&REFERENCE_TZ).date_naive();
        self.week_of(today)
    }

    pub fn week_of(&self, date: NaiveDate) -> u32 {
        let diff_days = (date - self.start_date).num_days();
        let week = diff_days.div_euclid(7) + 1;
        week.clamp(1, i64::from(self.total_weeks())) as u32
    }

    pub fn filter_courses_by_week<'a, I>(&self, courses: I, week: u32) -> Vec<CourseRecord>
    where
        I: IntoIterator<Item = &'a CourseRecord>,
    {
        courses
            .into_iter()
            .filter(|course| course.has_class_in_week(week))
            .cloned()
            .collect()
    }

    pub fn week_date_range(&self, week: u32) -> WeekRange {
        let offset = u64::from(week.saturating_sub(1)) * 7;
        let start = self.start_date + Days::new(offset);
        WeekRange {
            start,
            end: start + Days::new(6),
        }
    }
}

fn ymd((year, month, day): (i32, u32, u32)) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap_or_default()
}
