//! Pre-fetched market data consumed by the engine
//!
//! The core performs no I/O of its own: NOI/capex series and treasury rate
//! curves arrive as plain in-memory maps, built either directly or through
//! the CSV loaders in [`loader`].

pub mod loader;

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::dates::end_of_month;
use crate::error::EngineError;

/// A month-end keyed amount series (NOI, capex, distributions).
///
/// Keys are normalized to month-end on insert. [`MonthlySeries::get`] is a
/// strict lookup and errors for months with no recorded value; use
/// [`MonthlySeries::amount_or_zero`] where absence means zero.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MonthlySeries {
    values: BTreeMap<NaiveDate, f64>,
}

impl MonthlySeries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (NaiveDate, f64)>,
    {
        let mut series = Self::new();
        for (date, amount) in pairs {
            series.set(date, amount);
        }
        series
    }

    /// Record `amount` for the month containing `date`, replacing any prior
    /// value.
    pub fn set(&mut self, date: NaiveDate, amount: f64) {
        self.values.insert(end_of_month(date), amount);
    }

    /// Strict lookup for the month containing `date`.
    pub fn get(&self, date: NaiveDate) -> Result<f64, EngineError> {
        let month = end_of_month(date);
        self.values
            .get(&month)
            .copied()
            .ok_or(EngineError::MissingMonth(month))
    }

    /// Lookup defaulting to 0.0 for unrecorded months.
    pub fn amount_or_zero(&self, date: NaiveDate) -> f64 {
        self.values.get(&end_of_month(date)).copied().unwrap_or(0.0)
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.values.contains_key(&end_of_month(date))
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&NaiveDate, &f64)> {
        self.values.iter()
    }
}

/// A date-keyed rate curve (treasury or SOFR), queried with exact-match,
/// else nearest-prior semantics.
///
/// Unlike [`MonthlySeries`], keys are daily observation dates and are not
/// month-end normalized.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RateCurve {
    rates: BTreeMap<NaiveDate, f64>,
}

impl RateCurve {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (NaiveDate, f64)>,
    {
        let mut curve = Self::new();
        for (date, rate) in pairs {
            curve.insert(date, rate);
        }
        curve
    }

    pub fn insert(&mut self, date: NaiveDate, rate: f64) {
        self.rates.insert(date, rate);
    }

    /// Rate on `date`, falling back to the nearest prior observation.
    /// Absence of any prior rate is an error surfaced to the caller.
    pub fn rate_on(&self, date: NaiveDate) -> Result<f64, EngineError> {
        self.rates
            .range(..=date)
            .next_back()
            .map(|(_, &rate)| rate)
            .ok_or(EngineError::MissingRate(date))
    }

    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_monthly_series_normalizes_to_month_end() {
        let mut series = MonthlySeries::new();
        series.set(d(2024, 3, 5), 1_000.0);

        assert_eq!(series.get(d(2024, 3, 31)).unwrap(), 1_000.0);
        assert_eq!(series.amount_or_zero(d(2024, 3, 12)), 1_000.0);
        assert_eq!(series.amount_or_zero(d(2024, 4, 1)), 0.0);
    }

    #[test]
    fn test_monthly_series_strict_lookup_errors() {
        let series = MonthlySeries::new();
        assert!(matches!(
            series.get(d(2024, 3, 31)),
            Err(EngineError::MissingMonth(_))
        ));
    }

    #[test]
    fn test_rate_curve_nearest_prior() {
        let curve = RateCurve::from_pairs([
            (d(2024, 1, 2), 0.041),
            (d(2024, 1, 9), 0.042),
        ]);

        assert_eq!(curve.rate_on(d(2024, 1, 2)).unwrap(), 0.041);
        assert_eq!(curve.rate_on(d(2024, 1, 5)).unwrap(), 0.041);
        assert_eq!(curve.rate_on(d(2024, 2, 1)).unwrap(), 0.042);
    }

    #[test]
    fn test_rate_curve_no_prior_rate_is_an_error() {
        let curve = RateCurve::from_pairs([(d(2024, 1, 2), 0.041)]);
        assert!(matches!(
            curve.rate_on(d(2023, 12, 29)),
            Err(EngineError::MissingRate(_))
        ));
    }
}
