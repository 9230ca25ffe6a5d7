use chrono::{DateTime, Datelike, Duration, Utc};

use crate::types::Schedule;

/// Compute the next UTC firing for `schedule` strictly *after* `from`.
///
/// Returns `None` when the schedule is exhausted (a `Once` job whose instant
/// has passed), when hour/minute are out of range, and always for `Cron`.
pub fn compute_next_run(schedule: &Schedule, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
    match schedule {
        Schedule::Once { at } => (*at > from).then_some(*at),

        Schedule::Interval { every_secs } => {
            Some(from + Duration::seconds((*every_secs).max(1) as i64))
        }

        Schedule::Daily { hour, minute } => {
            let candidate = at_time_of_day(from, *hour, *minute)?;
            if candidate > from {
                Some(candidate)
            } else {
                Some(candidate + Duration::days(1))
            }
        }

        Schedule::Weekly { day, hour, minute } => {
            // 0 = Monday, matching chrono's `num_days_from_monday`.
            let today = from.weekday().num_days_from_monday() as i64;
            let target = (*day as i64).clamp(0, 6);
            let days_ahead = (target - today).rem_euclid(7);

            let candidate = at_time_of_day(from, *hour, *minute)? + Duration::days(days_ahead);
            if candidate > from {
                Some(candidate)
            } else {
                Some(candidate + Duration::days(7))
            }
        }

        Schedule::Cron { .. } => None,
    }
}

/// Reject schedules that can never produce a firing time.
pub fn validate(schedule: &Schedule) -> Result<(), String> {
    match schedule {
        Schedule::Daily { hour, minute } | Schedule::Weekly { hour, minute, .. }
            if *hour > 23 || *minute > 59 =>
        {
            Err(format!("time of day out of range: {hour:02}:{minute:02}"))
        }
        Schedule::Weekly { day, .. } if *day > 6 => {
            Err(format!("weekday must be 0 (Monday) to 6 (Sunday), got {day}"))
        }
        Schedule::Interval { every_secs: 0 } => Err("interval must be at least 1 second".into()),
        Schedule::Cron { expression } if expression.trim().is_empty() => {
            Err("cron expression is empty".into())
        }
        _ => Ok(()),
    }
}

fn at_time_of_day(day: DateTime<Utc>, hour: u8, minute: u8) -> Option<DateTime<Utc>> {
    day.date_naive()
        .and_hms_opt(hour as u32, minute as u32, 0)
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn once_fires_only_in_the_future() {
        let now = at(2026, 3, 2, 12, 0);
        let later = at(2026, 3, 2, 13, 0);
        assert_eq!(compute_next_run(&Schedule::Once { at: later }, now), Some(later));
        assert_eq!(compute_next_run(&Schedule::Once { at: now }, now), None);
    }

    #[test]
    fn daily_rolls_over_after_todays_slot() {
        let s = Schedule::Daily { hour: 9, minute: 30 };
        assert_eq!(compute_next_run(&s, at(2026, 3, 2, 8, 0)), Some(at(2026, 3, 2, 9, 30)));
        assert_eq!(compute_next_run(&s, at(2026, 3, 2, 9, 30)), Some(at(2026, 3, 3, 9, 30)));
    }

    #[test]
    fn weekly_finds_next_weekday() {
        // 2026-03-02 is a Monday.
        let friday = Schedule::Weekly { day: 4, hour: 18, minute: 0 };
        assert_eq!(compute_next_run(&friday, at(2026, 3, 2, 10, 0)), Some(at(2026, 3, 6, 18, 0)));

        let monday = Schedule::Weekly { day: 0, hour: 9, minute: 0 };
        assert_eq!(compute_next_run(&monday, at(2026, 3, 2, 10, 0)), Some(at(2026, 3, 9, 9, 0)));
        assert_eq!(compute_next_run(&monday, at(2026, 3, 2, 8, 0)), Some(at(2026, 3, 2, 9, 0)));
    }

    #[test]
    fn cron_is_never_computed() {
        let s = Schedule::Cron { expression: "0 0 * * *".into() };
        assert_eq!(compute_next_run(&s, at(2026, 3, 2, 10, 0)), None);
    }

    #[test]
    fn validation_rejects_impossible_times() {
        assert!(validate(&Schedule::Daily { hour: 24, minute: 0 }).is_err());
        assert!(validate(&Schedule::Weekly { day: 7, hour: 1, minute: 0 }).is_err());
        assert!(validate(&Schedule::Interval { every_secs: 0 }).is_err());
        assert!(validate(&Schedule::Interval { every_secs: 60 }).is_ok());
    }
}
