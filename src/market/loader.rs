//! CSV-based market data loaders
//!
//! Owns parsing and validation of source files so the core only ever sees
//! clean in-memory maps. Expected layouts:
//! - monthly series: `date,amount` (dates normalized to month-end)
//! - rate curve: `date,rate` (daily observation dates kept as-is)
//! - tiers: `lp_dist_ratio,hurdle_rate` (ordered, one row per tier)

use std::fs::File;
use std::path::Path;

use chrono::NaiveDate;

use super::{MonthlySeries, RateCurve};
use crate::error::EngineError;
use crate::waterfall::TierParams;

fn parse_date(field: &str) -> Result<NaiveDate, EngineError> {
    field
        .trim()
        .parse()
        .map_err(|_| EngineError::InvalidRecord(format!("invalid date: {field}")))
}

fn parse_amount(field: &str) -> Result<f64, EngineError> {
    field
        .trim()
        .parse()
        .map_err(|_| EngineError::InvalidRecord(format!("invalid number: {field}")))
}

fn field<'a>(record: &'a csv::StringRecord, index: usize) -> Result<&'a str, EngineError> {
    record
        .get(index)
        .ok_or_else(|| EngineError::InvalidRecord(format!("missing column {index}")))
}

/// Load a month-end keyed amount series (NOI, capex) from CSV.
pub fn load_monthly_series(path: &Path) -> Result<MonthlySeries, EngineError> {
    let file = File::open(path)?;
    let mut reader = csv::Reader::from_reader(file);

    let mut series = MonthlySeries::new();
    for result in reader.records() {
        let record = result?;
        let date = parse_date(field(&record, 0)?)?;
        let amount = parse_amount(field(&record, 1)?)?;
        series.set(date, amount);
    }

    Ok(series)
}

/// Load a daily treasury/SOFR rate curve from CSV.
pub fn load_rate_curve(path: &Path) -> Result<RateCurve, EngineError> {
    let file = File::open(path)?;
    let mut reader = csv::Reader::from_reader(file);

    let mut curve = RateCurve::new();
    for result in reader.records() {
        let record = result?;
        let date = parse_date(field(&record, 0)?)?;
        let rate = parse_amount(field(&record, 1)?)?;
        curve.insert(date, rate);
    }

    Ok(curve)
}

/// Load an ordered waterfall tier list from CSV.
pub fn load_tiers(path: &Path) -> Result<Vec<TierParams>, EngineError> {
    let file = File::open(path)?;
    let mut reader = csv::Reader::from_reader(file);

    let mut tiers = Vec::new();
    for result in reader.records() {
        let record = result?;
        let lp_dist_ratio = parse_amount(field(&record, 0)?)?;
        let hurdle_rate = parse_amount(field(&record, 1)?)?;
        tiers.push(TierParams::new(lp_dist_ratio, hurdle_rate)?);
    }

    Ok(tiers)
}
