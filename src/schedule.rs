use chrono::{DateTime, Datelike as _, NaiveDate, NaiveTime, Utc, Weekday};

/// Source of the next meeting instant.
pub trait MeetingSchedule: Send + Sync {
    fn next_meeting(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>>;
}

/// Meetings on the third Wednesday of each month at a fixed UTC time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThirdWednesday {
    pub time: NaiveTime,
}

impl Default for ThirdWednesday {
    fn default() -> Self {
        Self {
            time: NaiveTime::from_hms_opt(17, 30, 0).unwrap_or(NaiveTime::MIN),
        }
    }
}

impl MeetingSchedule for ThirdWednesday {
    fn next_meeting(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let (mut year, mut month) = (after.year(), after.month());
        // The current month's meeting may already be past; the next one never is.
        for _ in 0..2 {
            let at = third_wednesday(year, month)?.and_time(self.time).and_utc();
            if at > after {
                return Some(at);
            }
            (year, month) = if month == 12 {
                (year + 1, 1)
            } else {
                (year, month + 1)
            };
        }
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedSchedule(pub DateTime<Utc>);

impl MeetingSchedule for FixedSchedule {
    fn next_meeting(&self, _after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        Some(self.0)
    }
}

pub fn third_wednesday(year: i32, month: u32) -> Option<NaiveDate> {
    NaiveDate::from_weekday_of_month_opt(year, month, Weekday::Wed, 3)
}

/// `1` -> "1st", `12` -> "12th", `22` -> "22nd".
pub fn ordinal(n: u32) -> String {
    let suffix = match (n % 10, n % 100) {
        (_, 11..=13) => "th",
        (1, _) => "st",
        (2, _) => "nd",
        (3, _) => "rd",
        _ => "th",
    };
    format!("{n}{suffix}")
}
