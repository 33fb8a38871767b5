pub mod config;
pub mod constraint;
pub mod energy;
pub mod feedback;
pub mod goal;
pub mod plan;
pub mod task;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Serialize;
use timeblock_core::schedule::parse_hhmm;

pub type CmdResult = Result<(), Box<dyn std::error::Error>>;

/// `YYYY-MM-DD`, or today (UTC) when absent.
pub fn parse_date(value: Option<&str>) -> Result<NaiveDate, Box<dyn std::error::Error>> {
    match value {
        Some(s) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
            .map_err(|e| format!("invalid date '{s}' (expected YYYY-MM-DD): {e}").into()),
        None => Ok(Utc::now().date_naive()),
    }
}

/// `HH:MM` on `date`, in UTC.
pub fn parse_clock(date: NaiveDate, value: &str) -> Result<DateTime<Utc>, Box<dyn std::error::Error>> {
    let time = parse_hhmm(value)?;
    Ok(date.and_time(time).and_utc())
}

/// RFC 3339, or `YYYY-MM-DD HH:MM` taken as UTC.
pub fn parse_instant(value: &str) -> Result<DateTime<Utc>, Box<dyn std::error::Error>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value.trim()) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value.trim(), "%Y-%m-%d %H:%M")
        .map(|naive| naive.and_utc())
        .map_err(|_| format!("invalid time '{value}' (expected RFC 3339 or 'YYYY-MM-DD HH:MM')").into())
}

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> CmdResult {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Split a comma-separated flag value, dropping empty items.
pub fn split_list(value: Option<String>) -> Vec<String> {
    value
        .map(|v| {
            v.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default()
}
