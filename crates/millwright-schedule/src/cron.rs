//! A hand-rolled 5-field cron matcher: `minute hour day-of-month month
//! day-of-week`. Grounded on the `croniter`-driven scheduling in
//! `original_source/src/simulator/schedules.py::CronBlock.start_cond`, but
//! resolved to a single `next_after` search rather than pulling in a cron
//! crate — the field grammar this simulator's configuration documents use
//! (`*`, `N`, `N,M`, `N-M`, `*/N`) is small enough to match by hand.

use chrono::{DateTime, Datelike, Duration as ChronoDuration, Timelike, Utc};

use crate::error::{ScheduleError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Any,
    Set(u64),
}

impl Field {
    fn matches(&self, value: u32) -> bool {
        match self {
            Field::Any => true,
            Field::Set(bits) => bits & (1 << value) != 0,
        }
    }
}

/// A parsed 5-field cron expression.
#[derive(Debug, Clone)]
pub struct CronSchedule {
    minute: Field,
    hour: Field,
    day_of_month: Field,
    month: Field,
    day_of_week: Field,
}

/// Search cap for `next_after`: a schedule whose fields can never be
/// simultaneously satisfied (e.g. `30 0 31 2 *`, Feb 31st) would otherwise
/// loop forever.
const MAX_SEARCH_MINUTES: i64 = 4 * 366 * 24 * 60;

impl CronSchedule {
    pub fn parse(expr: &str) -> Result<Self> {
        let fields: Vec<&str> = expr.split_whitespace().collect();
        let [minute, hour, dom, month, dow]: [&str; 5] = fields
            .try_into()
            .map_err(|_| ScheduleError::InvalidCron(expr.to_string()))?;

        Ok(Self {
            minute: parse_field(minute, 0, 59)?,
            hour: parse_field(hour, 0, 23)?,
            day_of_month: parse_field(dom, 1, 31)?,
            month: parse_field(month, 1, 12)?,
            day_of_week: parse_field(dow, 0, 6)?,
        })
    }

    fn matches(&self, dt: DateTime<Utc>) -> bool {
        self.minute.matches(dt.minute())
            && self.hour.matches(dt.hour())
            && self.day_of_month.matches(dt.day())
            && self.month.matches(dt.month())
            && self.day_of_week.matches(dt.weekday().num_days_from_sunday())
    }

    /// Next instant strictly after `from` that satisfies every field,
    /// truncated to the minute (cron's native resolution).
    pub fn next_after(&self, from: DateTime<Utc>) -> Result<DateTime<Utc>> {
        let start = from
            .with_second(0)
            .and_then(|d| d.with_nanosecond(0))
            .unwrap_or(from)
            + ChronoDuration::minutes(1);

        let mut candidate = start;
        for _ in 0..MAX_SEARCH_MINUTES {
            if self.matches(candidate) {
                return Ok(candidate);
            }
            candidate += ChronoDuration::minutes(1);
        }
        Err(ScheduleError::UnsatisfiableCron)
    }
}

fn parse_field(raw: &str, low: u32, high: u32) -> Result<Field> {
    if raw == "*" {
        return Ok(Field::Any);
    }

    let mut bits: u64 = 0;
    for part in raw.split(',') {
        if let Some(step_expr) = part.strip_prefix("*/") {
            let step: u32 = step_expr
                .parse()
                .map_err(|_| ScheduleError::InvalidCron(raw.to_string()))?;
            if step == 0 {
                return Err(ScheduleError::InvalidCron(raw.to_string()));
            }
            let mut value = low;
            while value <= high {
                bits |= 1 << value;
                value += step;
            }
        } else if let Some((lo, hi)) = part.split_once('-') {
            let lo: u32 = lo.parse().map_err(|_| ScheduleError::InvalidCron(raw.to_string()))?;
            let hi: u32 = hi.parse().map_err(|_| ScheduleError::InvalidCron(raw.to_string()))?;
            if lo > hi || lo < low || hi > high {
                return Err(ScheduleError::InvalidCron(raw.to_string()));
            }
            for value in lo..=hi {
                bits |= 1 << value;
            }
        } else {
            let value: u32 = part.parse().map_err(|_| ScheduleError::InvalidCron(raw.to_string()))?;
            if value < low || value > high {
                return Err(ScheduleError::InvalidCron(raw.to_string()));
            }
            bits |= 1 << value;
        }
    }
    Ok(Field::Set(bits))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn every_day_at_eight_skips_to_next_morning() {
        let cron = CronSchedule::parse("0 8 * * *").unwrap();
        let from = Utc.with_ymd_and_hms(2026, 7, 28, 9, 0, 0).unwrap();
        let next = cron.next_after(from).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 7, 29, 8, 0, 0).unwrap());
    }

    #[test]
    fn weekday_list_restricts_to_named_days() {
        // 2026-07-28 is a Tuesday; "1,3,5" is Mon/Wed/Fri.
        let cron = CronSchedule::parse("0 10 * * 1,3,5").unwrap();
        let from = Utc.with_ymd_and_hms(2026, 7, 28, 0, 0, 0).unwrap();
        let next = cron.next_after(from).unwrap();
        assert_eq!(next.weekday(), chrono::Weekday::Wed);
        assert_eq!(next.hour(), 10);
    }

    #[test]
    fn step_expression_expands_into_a_set() {
        let cron = CronSchedule::parse("*/15 * * * *").unwrap();
        let from = Utc.with_ymd_and_hms(2026, 7, 28, 0, 5, 0).unwrap();
        let next = cron.next_after(from).unwrap();
        assert_eq!(next.minute(), 15);
    }

    #[test]
    fn unsatisfiable_expression_reports_an_error() {
        let cron = CronSchedule::parse("0 0 31 2 *").unwrap();
        let from = Utc.with_ymd_and_hms(2026, 7, 28, 0, 0, 0).unwrap();
        assert!(cron.next_after(from).is_err());
    }
}
