//! Report due-date arithmetic in business days.

use chrono::{Datelike, Duration, Local, NaiveDateTime, NaiveTime};

/// Timestamp format used in remote documents (second precision, no zone).
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Advance `start` by `days` business days, one calendar day at a time.
/// Saturdays and Sundays never consume a day; `days = 0` returns `start`
/// unchanged. The start day itself is never counted.
pub fn weekdays_from(start: NaiveDateTime, days: u32) -> NaiveDateTime {
    let mut date = start;
    let mut remaining = days;
    while remaining > 0 {
        date += Duration::days(1);
        if date.weekday().num_days_from_monday() < 5 {
            remaining -= 1;
        }
    }
    date
}

/// [`weekdays_from`] anchored at today's local midnight.
pub fn weekdays_from_now(days: u32) -> NaiveDateTime {
    weekdays_from(Local::now().date_naive().and_time(NaiveTime::MIN), days)
}
