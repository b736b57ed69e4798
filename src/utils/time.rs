use chrono::{DateTime, Local, NaiveDate, NaiveTime, TimeZone};

const RECORD_NAME_FORMAT: &str = "%Y-%m-%d";

/// This is the standard way of converting a date to a string in playtime. Record files are named
/// this way, so lexicographic order of names is also date order.
pub fn date_to_record_name(date: NaiveDate) -> String {
    date.format(RECORD_NAME_FORMAT).to_string()
}

pub fn record_name_to_date(name: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(name, RECORD_NAME_FORMAT).ok()
}

/// Local midnight of `date`. Falls back to the first valid moment of the day when midnight is
/// skipped by a DST change.
pub fn day_start(date: NaiveDate) -> DateTime<Local> {
    let midnight = date.and_time(NaiveTime::MIN);
    match Local.from_local_datetime(&midnight).earliest() {
        Some(v) => v,
        None => Local.from_utc_datetime(&midnight),
    }
}

/// Combines hour/minute/second fields typed by a user. Anything that doesn't parse counts as 0 and
/// a negative total is clamped to 0.
pub fn parse_duration_fields(hours: &str, minutes: &str, seconds: &str) -> u64 {
    fn field(value: &str) -> i64 {
        value.trim().parse::<i64>().unwrap_or(0)
    }

    let total = field(hours)
        .saturating_mul(3600)
        .saturating_add(field(minutes).saturating_mul(60))
        .saturating_add(field(seconds));
    total.max(0) as u64
}

/// `01:05:09` style used for the running timer.
pub fn format_clock(seconds: u64) -> String {
    format!(
        "{:02}:{:02}:{:02}",
        seconds / 3600,
        (seconds / 60) % 60,
        seconds % 60
    )
}

/// `1h 5m 9s` style. Zero parts are skipped, but there is always at least one part.
pub fn format_with_units(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds / 60) % 60;
    let secs = seconds % 60;
    let mut parts = vec![];
    if hours > 0 {
        parts.push(format!("{hours}h"));
    }
    if minutes > 0 {
        parts.push(format!("{minutes}m"));
    }
    if secs > 0 || parts.is_empty() {
        parts.push(format!("{secs}s"));
    }
    parts.join(" ")
}

/// `6h 30m` or `30m`. Targets never carry seconds.
pub fn format_target(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds / 60) % 60;
    if hours > 0 {
        format!("{hours}h {minutes:02}m")
    } else {
        format!("{minutes}m")
    }
}
