use serde::Serialize;

/// Length of a single class period in minutes.
pub const PERIOD_MINUTES: u32 = 45;

pub const FIRST_PERIOD: u32 = 1;
pub const LAST_PERIOD: u32 = 13;

const AFTERNOON_START: u32 = 14 * 60;
const EVENING_START: u32 = 18 * 60 + 30;

/// Start of each period as minutes since midnight, index 0 = period 1.
const PERIOD_STARTS: [u32; 13] = [
    8 * 60,
    8 * 60 + 50,
    9 * 60 + 50,
    10 * 60 + 40,
    11 * 60 + 25,
    14 * 60,
    14 * 60 + 50,
    15 * 60 + 50,
    16 * 60 + 40,
    18 * 60 + 30,
    19 * 60 + 20,
    20 * 60 + 10,
    21 * 60 + 45,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DaySection {
    Morning,
    Afternoon,
    Evening,
}

impl DaySection {
    fn of(start_minutes: u32) -> Self {
        if start_minutes < AFTERNOON_START {
            DaySection::Morning
        } else if start_minutes < EVENING_START {
            DaySection::Afternoon
        } else {
            DaySection::Evening
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PeriodInfo {
    pub period: u32,
    pub start_clock: String,
    pub end_clock: String,
    pub start_minutes: u32,
    pub end_minutes: u32,
    pub section: DaySection,
}

impl PeriodInfo {
    pub fn start_hm(&self) -> (u32, u32) {
        (self.start_minutes / 60, self.start_minutes % 60)
    }

    pub fn end_hm(&self) -> (u32, u32) {
        (self.end_minutes / 60, self.end_minutes % 60)
    }

    /// `08:00-08:45`
    pub fn time_range(&self) -> String {
        format!("{}-{}", self.start_clock, self.end_clock)
    }
}

/// Looks up the fixed clock times of a period. `None` outside 1..=13.
pub fn period_info(period: u32) -> Option<PeriodInfo> {
    if !(FIRST_PERIOD..=LAST_PERIOD).contains(&period) {
        return None;
    }

    let start_minutes = PERIOD_STARTS[(period - 1) as usize];
    let end_minutes = start_minutes + PERIOD_MINUTES;

    Some(PeriodInfo {
        period,
        start_clock: minutes_to_clock(start_minutes),
        end_clock: minutes_to_clock(end_minutes),
        start_minutes,
        end_minutes,
        section: DaySection::of(start_minutes),
    })
}

pub fn all_periods() -> Vec<PeriodInfo> {
    (FIRST_PERIOD..=LAST_PERIOD).filter_map(period_info).collect()
}

/// The period running at the given minute of the day, bounds inclusive.
pub fn current_period(minutes_since_midnight: u32) -> Option<PeriodInfo> {
    all_periods().into_iter().find(|p| {
        minutes_since_midnight >= p.start_minutes && minutes_since_midnight <= p.end_minutes
    })
}

fn minutes_to_clock(total: u32) -> String {
    format!("{:02}:{:02}", total / 60, total % 60)
}
