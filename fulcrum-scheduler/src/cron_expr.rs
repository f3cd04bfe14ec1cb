//! Standard 5-field cron expression parsing (§4.7: "minute, hour,
//! day-of-month, month, day-of-week").
//!
//! The `cron` crate parses the 6/7-field format (seconds leading,
//! optional year trailing); this module adapts the 5-field form the
//! job store persists into that shape.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use cron::Schedule;

use crate::error::SchedulerError;

/// Parse a standard 5-field cron expression.
pub fn parse(expr: &str) -> Result<Schedule, SchedulerError> {
    let fields: Vec<&str> = expr.split_whitespace().collect();
    if fields.len() != 5 {
        return Err(SchedulerError::InvalidCronExpr(format!(
            "expected 5 fields (minute hour day-of-month month day-of-week), got {}: {expr}",
            fields.len()
        )));
    }
    let with_seconds = format!("0 {expr}");
    Schedule::from_str(&with_seconds)
        .map_err(|e| SchedulerError::InvalidCronExpr(format!("{expr}: {e}")))
}

/// The next fire time strictly after `after`.
pub fn next_after(schedule: &Schedule, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
    schedule.after(&after).next()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_wrong_field_count() {
        let err = parse("* * * *").unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidCronExpr(_)));
    }

    #[test]
    fn parses_every_minute() {
        let schedule = parse("* * * * *").unwrap();
        let now = Utc::now();
        let next = next_after(&schedule, now).unwrap();
        assert!(next > now);
        assert!(next - now <= chrono::Duration::minutes(1));
    }

    #[test]
    fn parses_nightly_midnight() {
        let schedule = parse("0 0 * * *").unwrap();
        let now = Utc::now();
        let next = next_after(&schedule, now).unwrap();
        assert_eq!(next.format("%H:%M").to_string(), "00:00");
    }
}
