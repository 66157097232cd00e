//! Month-grid date helpers
//!
//! Every series in the engine lives on a month-end grid: input dates are
//! canonicalized to the last calendar day of their month before use, and
//! monthly sequences are enumerated from that grid.

use chrono::{Datelike, Months, NaiveDate};

/// Last calendar day of the month containing `d`.
pub fn end_of_month(d: NaiveDate) -> NaiveDate {
    let (year, month) = if d.month() == 12 {
        (d.year() + 1, 1)
    } else {
        (d.year(), d.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|first| first.pred_opt())
        .expect("month arithmetic stays within chrono's date range")
}

/// Last calendar day of the month before the one containing `d`.
pub fn prior_month_end(d: NaiveDate) -> NaiveDate {
    let shifted = d
        .checked_sub_months(Months::new(1))
        .expect("month arithmetic stays within chrono's date range");
    end_of_month(shifted)
}

/// Month-end `months` whole months after the month containing `d`.
pub fn add_months(d: NaiveDate, months: u32) -> NaiveDate {
    let shifted = d
        .checked_add_months(Months::new(months))
        .expect("month arithmetic stays within chrono's date range");
    end_of_month(shifted)
}

/// Month-end dates for `months` consecutive months starting at the month
/// containing `start`.
pub fn month_sequence(start: NaiveDate, months: usize) -> Vec<NaiveDate> {
    (0..months).map(|i| add_months(start, i as u32)).collect()
}

/// Whole calendar months from `from` to `to` (negative when `to` is earlier).
pub fn months_between(from: NaiveDate, to: NaiveDate) -> i32 {
    (to.year() - from.year()) * 12 + to.month() as i32 - from.month() as i32
}
