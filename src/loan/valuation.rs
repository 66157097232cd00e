//! Spread-over-treasury loan pricing
//!
//! The credit spread is locked at origination as the note rate minus the
//! treasury rate observed shortly before funding; pricing as of any later
//! date discounts the remaining schedule at that spread plus the current
//! treasury rate. Rates arrive pre-fetched as a [`RateCurve`] — the engine
//! never performs network I/O.

use chrono::{Duration, NaiveDate};
use log::warn;
use serde::{Deserialize, Serialize};

use super::Loan;
use crate::dates::end_of_month;
use crate::error::EngineError;
use crate::market::RateCurve;

/// Days before funding used to anchor the origination treasury rate
const ORIGINATION_LOOKBACK_DAYS: i64 = 60;

/// A priced loan: value plus the rate it was discounted at.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LoanValue {
    pub market_value: f64,
    pub discount_rate: f64,
    pub spread: f64,
}

impl LoanValue {
    fn zero() -> Self {
        Self {
            market_value: 0.0,
            discount_rate: 0.0,
            spread: 0.0,
        }
    }
}

/// Price a loan off the treasury curve as of a date.
///
/// A loan carrying a fixed `market_rate` prices at that rate with zero
/// spread. A schedule that ends on or before the as-of date values at
/// zero with a warning rather than an error: stale loans stay consumable.
pub fn value_loan(
    loan: &Loan,
    as_of_date: NaiveDate,
    curve: &RateCurve,
) -> Result<LoanValue, EngineError> {
    let as_of = end_of_month(as_of_date);
    let schedule = loan.schedule();

    match schedule.last_date() {
        Some(last) if last > as_of => {}
        _ => {
            warn!("{}: loan cash flows end before the as-of date", loan.id());
            return Ok(LoanValue::zero());
        }
    }

    if let Some(market_rate) = loan.terms().market_rate {
        return Ok(LoanValue {
            market_value: schedule.present_value(as_of, market_rate),
            discount_rate: market_rate,
            spread: 0.0,
        });
    }

    let origination_date = loan.fund_date_actual() - Duration::days(ORIGINATION_LOOKBACK_DAYS);
    let spread = loan.terms().rate - curve.rate_on(origination_date)?;
    let discount_rate = spread + curve.rate_on(as_of)?;

    Ok(LoanValue {
        market_value: schedule.present_value(as_of, discount_rate),
        discount_rate,
        spread,
    })
}
