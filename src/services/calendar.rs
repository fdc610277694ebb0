//! Rent calendar arithmetic. A lease's due day is clamped to the length of
//! each month, so day 31 falls on the 30th in April and the 28th/29th in
//! February.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

pub fn days_in_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|first| first.pred_opt())
        .map(|last| last.day())
        .unwrap_or(28)
}

/// The rent due date of a given month.
pub fn due_date_in_month(year: i32, month: u32, rent_due_day: u32) -> NaiveDate {
    let day = rent_due_day.clamp(1, days_in_month(year, month));
    NaiveDate::from_ymd_opt(year, month, day).unwrap_or(NaiveDate::MIN)
}

pub fn first_of_month(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

pub fn last_of_month(date: NaiveDate) -> NaiveDate {
    date.with_day(days_in_month(date.year(), date.month()))
        .unwrap_or(date)
}

pub fn month_bounds(year: i32, month: u32) -> Option<(NaiveDate, NaiveDate)> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    Some((first, last_of_month(first)))
}

/// First day of the month `offset` months after `date`'s month.
pub fn shift_month(date: NaiveDate, offset: i32) -> NaiveDate {
    let index = date.year() * 12 + date.month0() as i32 + offset;
    let year = index.div_euclid(12);
    let month = index.rem_euclid(12) as u32 + 1;
    NaiveDate::from_ymd_opt(year, month, 1).unwrap_or(date)
}

/// Rent periods owed between `start` and `reference`: whole calendar months,
/// plus one once the reference day reaches the month's due day. Never
/// negative.
pub fn months_elapsed(start: NaiveDate, reference: NaiveDate, rent_due_day: u32) -> i64 {
    if reference < start {
        return 0;
    }
    let mut months = i64::from(reference.year() - start.year()) * 12
        + i64::from(reference.month()) - i64::from(start.month());
    let due_this_month = due_date_in_month(reference.year(), reference.month(), rent_due_day);
    if reference.day() >= due_this_month.day() {
        months += 1;
    }
    months.max(0)
}

/// Next due date on or after `today`, rolling into the following month.
pub fn next_due_date(today: NaiveDate, rent_due_day: u32) -> NaiveDate {
    let this_month = due_date_in_month(today.year(), today.month(), rent_due_day);
    if this_month >= today {
        return this_month;
    }
    let next = shift_month(today, 1);
    due_date_in_month(next.year(), next.month(), rent_due_day)
}

/// Start of a "last N months" window, counted as 30-day months.
pub fn window_start(today: NaiveDate, months_back: u32) -> NaiveDate {
    today - Duration::days(i64::from(months_back) * 30)
}

/// Calendar day of `now` in the finance time zone.
pub fn local_date(now: DateTime<Utc>, timezone: Tz) -> NaiveDate {
    now.with_timezone(&timezone).date_naive()
}

/// `time` on `day` in the finance time zone. A wall time skipped by a DST
/// jump falls back to the same wall time read as UTC.
pub fn local_instant(day: NaiveDate, time: NaiveTime, timezone: Tz) -> DateTime<Utc> {
    let naive = day.and_time(time);
    timezone
        .from_local_datetime(&naive)
        .earliest()
        .map(|local| local.with_timezone(&Utc))
        .unwrap_or_else(|| naive.and_utc())
}

pub fn month_key(date: NaiveDate) -> String {
    date.format("%Y-%m").to_string()
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, NaiveTime, TimeZone, Utc};
    use chrono_tz::Tz;

    use super::{
        days_in_month, due_date_in_month, local_date, local_instant, months_elapsed,
        next_due_date, shift_month,
    };

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
    }

    #[test]
    fn clamps_due_day_to_month_length() {
        assert_eq!(days_in_month(2028, 2), 29);
        assert_eq!(days_in_month(2026, 2), 28);
        assert_eq!(due_date_in_month(2026, 2, 31), date(2026, 2, 28));
        assert_eq!(due_date_in_month(2026, 4, 31), date(2026, 4, 30));
        assert_eq!(due_date_in_month(2026, 12, 31), date(2026, 12, 31));
    }

    #[test]
    fn counts_partial_first_month_once_due_day_passes() {
        // Lease started 95 days before 2026-10-16.
        assert_eq!(months_elapsed(date(2026, 7, 13), date(2026, 10, 16), 1), 4);
        assert_eq!(months_elapsed(date(2026, 3, 15), date(2026, 3, 20), 25), 0);
        assert_eq!(months_elapsed(date(2026, 3, 15), date(2026, 3, 25), 25), 1);
        assert_eq!(months_elapsed(date(2026, 3, 15), date(2026, 3, 1), 1), 0);
    }

    #[test]
    fn month_end_due_day_counts_on_short_months() {
        assert_eq!(months_elapsed(date(2026, 1, 1), date(2026, 2, 28), 31), 2);
        assert_eq!(months_elapsed(date(2026, 1, 1), date(2026, 2, 27), 31), 1);
    }

    #[test]
    fn next_due_date_rolls_over_month_and_year() {
        assert_eq!(next_due_date(date(2026, 3, 1), 1), date(2026, 3, 1));
        assert_eq!(next_due_date(date(2026, 3, 2), 1), date(2026, 4, 1));
        assert_eq!(next_due_date(date(2026, 12, 20), 5), date(2027, 1, 5));
        assert_eq!(next_due_date(date(2026, 1, 31), 31), date(2026, 1, 31));
        assert_eq!(next_due_date(date(2026, 2, 1), 31), date(2026, 2, 28));
    }

    #[test]
    fn shifts_months_across_years() {
        assert_eq!(shift_month(date(2026, 1, 15), -1), date(2025, 12, 1));
        assert_eq!(shift_month(date(2026, 11, 30), 2), date(2027, 1, 1));
    }

    #[test]
    fn local_date_lags_utc_west_of_greenwich() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 2, 30, 0).single().expect("valid instant");
        assert_eq!(local_date(now, Tz::UTC), date(2026, 3, 1));
        assert_eq!(local_date(now, Tz::America__Asuncion), date(2026, 2, 28));
    }

    #[test]
    fn local_instant_converts_wall_time_to_utc() {
        let nine = NaiveTime::from_hms_opt(9, 0, 0).expect("valid time");
        assert_eq!(
            local_instant(date(2026, 7, 1), nine, Tz::Europe__Madrid),
            Utc.with_ymd_and_hms(2026, 7, 1, 7, 0, 0).single().expect("valid instant")
        );
        assert_eq!(
            local_instant(date(2026, 7, 1), nine, Tz::UTC),
            Utc.with_ymd_and_hms(2026, 7, 1, 9, 0, 0).single().expect("valid instant")
        );
    }
}
