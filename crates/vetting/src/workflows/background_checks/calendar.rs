//! Business-day arithmetic shared by SLA targets and elapsed-time counts.
//!
//! Counting and advancing use the same convention: a span `(from, to]` counts
//! the weekdays strictly after `from` up to and including `to`. Advancing `n`
//! business days from `from` therefore lands on a date whose count from `from`
//! is exactly `n`.

use chrono::{Datelike, Duration, NaiveDate, Weekday};

pub fn is_business_day(date: NaiveDate) -> bool {
    !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Returns the date `days` business days after `start`.
pub fn add_business_days(start: NaiveDate, days: u32) -> NaiveDate {
    let mut current = start;
    let mut remaining = days;
    while remaining > 0 {
        current += Duration::days(1);
        if is_business_day(current) {
            remaining -= 1;
        }
    }
    current
}

/// Signed number of business days in `(from, to]`, negative when `to` precedes `from`.
pub fn business_days_between(from: NaiveDate, to: NaiveDate) -> i64 {
    if to < from {
        return -business_days_between(to, from);
    }

    from.iter_days()
        .skip(1)
        .take_while(|day| *day <= to)
        .filter(|day| is_business_day(*day))
        .count() as i64
}

/// Calendar-day counterpart of [`business_days_between`].
pub fn calendar_days_between(from: NaiveDate, to: NaiveDate) -> i64 {
    (to - from).num_days()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    #[test]
    fn advancing_skips_weekends() {
        // 2026-10-16 is a Friday.
        let friday = date(2026, 10, 16);
        assert_eq!(add_business_days(friday, 1), date(2026, 10, 19));
        assert_eq!(add_business_days(friday, 5), date(2026, 10, 23));
        assert_eq!(add_business_days(friday, 0), friday);
    }

    #[test]
    fn counting_ignores_weekend_days() {
        let friday = date(2026, 10, 16);
        assert_eq!(business_days_between(friday, date(2026, 10, 18)), 0);
        assert_eq!(business_days_between(friday, date(2026, 10, 19)), 1);
        assert_eq!(business_days_between(date(2026, 10, 19), friday), -1);
    }

    #[test]
    fn advance_then_count_round_trips_for_every_weekday() {
        let monday = date(2026, 10, 12);
        for offset in 0..5 {
            let start = monday + Duration::days(offset);
            assert!(is_business_day(start));
            for n in 0..=40u32 {
                let target = add_business_days(start, n);
                assert_eq!(
                    business_days_between(start, target),
                    i64::from(n),
                    "start {start} advanced by {n}"
                );
                assert!(n == 0 || is_business_day(target));
            }
        }
    }
}
