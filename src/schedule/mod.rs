pub mod period;
pub mod recurrence;
pub mod semester;

pub use period::{DaySection, PeriodInfo, all_periods, current_period, period_info};
pub use recurrence::{Occurrence, RecurrenceRule, first_occurrence, occurrence_count, recurrence_rule};
pub use semester::{REFERENCE_TZ, REFERENCE_TZ_NAME, SemesterCalendar, TermDates, WeekRange};
