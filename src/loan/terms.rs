//! Loan terms and day-count conventions

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Day-count convention for interest accrual
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DayCount {
    /// Actual elapsed days over a 360-day year
    Actual360,
    /// Fixed 30-day months over a 360-day year
    Thirty360,
    /// Actual elapsed days over a 365-day year
    Actual365,
}

impl DayCount {
    /// Accrual fraction between two consecutive schedule dates
    pub fn fraction(&self, start: NaiveDate, end: NaiveDate) -> f64 {
        let elapsed = (end - start).num_days() as f64;
        match self {
            DayCount::Actual360 => elapsed / 360.0,
            DayCount::Thirty360 => 30.0 / 360.0,
            DayCount::Actual365 => elapsed / 365.0,
        }
    }

    /// Parse the market convention string used in loan records
    pub fn parse(s: &str) -> Result<Self, EngineError> {
        match s {
            "Actual/360" => Ok(DayCount::Actual360),
            "30/360" => Ok(DayCount::Thirty360),
            "Actual/365" => Ok(DayCount::Actual365),
            other => Err(EngineError::InvalidTerms(format!(
                "unsupported payment type: {other}"
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DayCount::Actual360 => "Actual/360",
            DayCount::Thirty360 => "30/360",
            DayCount::Actual365 => "Actual/365",
        }
    }
}

/// Economic terms of a loan, immutable once the loan is constructed.
///
/// Dates may be supplied mid-month; `Loan::new` normalizes them to the
/// month-end grid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoanTerms {
    /// Initial funded amount
    pub loan_amount: f64,
    /// Annual note rate as a decimal in [0, 1]
    pub rate: f64,
    pub fund_date: NaiveDate,
    pub maturity_date: NaiveDate,
    pub day_count: DayCount,
    /// Months of interest-only payments after funding
    pub interest_only_periods: u32,
    /// Amortization term in months (0 = no scheduled principal)
    pub amortizing_periods: u32,
    /// Revolving commitment ceiling; draws are only allowed against this
    pub commitment: Option<f64>,
    pub prepayment_date: Option<NaiveDate>,
    pub foreclosure_date: Option<NaiveDate>,
    /// Fixed discount rate for pricing, overriding the treasury spread
    pub market_rate: Option<f64>,
}

impl LoanTerms {
    pub(crate) fn validate(&self) -> Result<(), EngineError> {
        if self.loan_amount < 0.0 {
            return Err(EngineError::InvalidTerms(
                "loan amount must be positive".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.rate) {
            return Err(EngineError::InvalidTerms(format!(
                "rate must be between 0 and 1, got {}",
                self.rate
            )));
        }
        if self.fund_date >= self.maturity_date {
            return Err(EngineError::InvalidTerms(
                "funding date must precede maturity date".to_string(),
            ));
        }
        Ok(())
    }
}
