//! Wall-clock mapping from the simulation's virtual time (spec §4.I, §4.J).
//!
//! The engine's [`Clock`] only knows elapsed virtual duration; the operator's
//! daily cycle and the room sensor's hourly profile both need an actual
//! time-of-day and weekday, so callers anchor the clock to an `epoch` and
//! these helpers do the rest.

use chrono::{DateTime, Datelike, NaiveTime, Timelike, Utc, Weekday};

use millwright_engine::clock::Clock;

/// Current wall-clock instant, given the simulation's start time.
pub fn now_dt(clock: &Clock, epoch: DateTime<Utc>) -> DateTime<Utc> {
    epoch + chrono::Duration::from_std(clock.now()).unwrap_or_default()
}

pub fn hour_of(dt: DateTime<Utc>) -> usize {
    dt.hour() as usize
}

/// Parses a `"HH:MM"` constant from a configuration document. Panics on a
/// malformed literal, since these are only ever baked-in schedule defaults
/// or validated config values, never arbitrary input.
pub fn parse_time_of_day(s: &str) -> NaiveTime {
    NaiveTime::parse_from_str(s, "%H:%M").unwrap_or_else(|_| panic!("malformed time-of-day constant: {s}"))
}

/// The next instant at or after `from` that falls on `time_of_day` on one of
/// `workdays`, skipping non-workdays entirely.
pub fn next_workday_time(from: DateTime<Utc>, time_of_day: NaiveTime, workdays: &[Weekday]) -> DateTime<Utc> {
    let mut date = from.date_naive();
    let mut candidate = DateTime::<Utc>::from_naive_utc_and_offset(date.and_time(time_of_day), Utc);
    if candidate <= from {
        date = date.succ_opt().expect("calendar does not overflow in a simulation run");
        candidate = DateTime::<Utc>::from_naive_utc_and_offset(date.and_time(time_of_day), Utc);
    }
    while !workdays.contains(&candidate.weekday()) {
        date = date.succ_opt().expect("calendar does not overflow in a simulation run");
        candidate = DateTime::<Utc>::from_naive_utc_and_offset(date.and_time(time_of_day), Utc);
    }
    candidate
}

/// The next instant at or after `from` with `time_of_day`, same-day or
/// tomorrow, regardless of weekday (used for lunch/home windows once
/// already at work).
pub fn next_time(from: DateTime<Utc>, time_of_day: NaiveTime) -> DateTime<Utc> {
    let date = from.date_naive();
    let candidate = DateTime::<Utc>::from_naive_utc_and_offset(date.and_time(time_of_day), Utc);
    if candidate > from {
        candidate
    } else {
        let tomorrow = date.succ_opt().expect("calendar does not overflow in a simulation run");
        DateTime::<Utc>::from_naive_utc_and_offset(tomorrow.and_time(time_of_day), Utc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn next_workday_time_skips_the_weekend() {
        // 2026-07-25 is a Saturday.
        let saturday = Utc.with_ymd_and_hms(2026, 7, 25, 6, 0, 0).unwrap();
        let monday_eight = next_workday_time(
            saturday,
            parse_time_of_day("08:00"),
            &[Weekday::Mon, Weekday::Tue, Weekday::Wed, Weekday::Thu, Weekday::Fri],
        );
        assert_eq!(monday_eight.weekday(), Weekday::Mon);
        assert_eq!(monday_eight.hour(), 8);
    }

    #[test]
    fn next_time_rolls_to_tomorrow_once_past() {
        let past_lunch = Utc.with_ymd_and_hms(2026, 7, 28, 15, 0, 0).unwrap();
        let next = next_time(past_lunch, parse_time_of_day("11:30"));
        assert_eq!(next.day(), past_lunch.day() + 1);
        assert_eq!(next.hour(), 11);
    }
}
