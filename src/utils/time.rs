use chrono::{DateTime, Duration, Local, NaiveDate, Utc};

/// This is the standard way of converting a date to a string in sitewatch. Daily statistics are
/// keyed by it.
pub fn date_to_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// The calendar day of `time` on this machine. Daily totals and "today" follow the user's clock.
pub fn local_day(time: DateTime<Utc>) -> NaiveDate {
    time.with_timezone(&Local).date_naive()
}

pub fn format_duration(v: Duration) -> String {
    if v.num_hours() > 0 {
        format!("{}h {}m", v.num_hours(), v.num_minutes() % 60)
    } else if v.num_minutes() > 0 {
        format!("{}m {}s", v.num_minutes(), v.num_seconds() % 60)
    } else {
        format!("{}s", v.num_seconds())
    }
}

pub fn format_seconds(seconds: u64) -> String {
    format_duration(Duration::seconds(i64::try_from(seconds).unwrap_or(i64::MAX)))
}
