//! Preferred equity positions layered on a loan
//!
//! A preferred equity investment reads an underlying loan's schedule from
//! the investor's side: interest is income, principal and paydowns are
//! repayments, draws are fundings, and the outstanding balance is the
//! position's value. An ownership step-timeline scales every column.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::dates::end_of_month;
use crate::error::EngineError;
use crate::loan::Loan;
use crate::property::OwnershipTimeline;

/// One month of the preferred equity schedule.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PreferredEquityRow {
    pub date: NaiveDate,
    /// Interest earned by the position
    pub income: f64,
    /// Capital funded into the underlying loan
    pub draw: f64,
    /// Principal and paydowns returned to the position
    pub repayment: f64,
    /// Outstanding balance backing the position
    pub market_value: f64,
    pub ownership_share: f64,
}

/// A preferred equity wrapper around a loan.
#[derive(Debug, Clone)]
pub struct PreferredEquity {
    id: String,
    loan: Loan,
    timeline: OwnershipTimeline,
}

impl PreferredEquity {
    /// Wrap a loan with an initial ownership share effective from the
    /// first schedule month. Shares outside [0, 1] are rejected.
    pub fn new(
        id: impl Into<String>,
        loan: Loan,
        initial_ownership: f64,
    ) -> Result<Self, EngineError> {
        validate_ownership(initial_ownership)?;

        let mut timeline = OwnershipTimeline::new();
        if let Some(start) = loan.schedule().first_date() {
            timeline.add_event(start, initial_ownership);
        }

        Ok(Self {
            id: id.into(),
            loan,
            timeline,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn loan(&self) -> &Loan {
        &self.loan
    }

    /// Record an ownership change effective the month containing `date`.
    pub fn add_ownership_change(
        &mut self,
        date: NaiveDate,
        share: f64,
    ) -> Result<(), EngineError> {
        validate_ownership(share)?;
        self.timeline.add_event(date, share);
        Ok(())
    }

    /// Ownership share in effect on a date (0.0 before the first event).
    pub fn ownership_share(&self, date: NaiveDate) -> f64 {
        self.timeline.share_on(end_of_month(date))
    }

    /// Ownership share per underlying schedule month.
    pub fn ownership_series(&self) -> BTreeMap<NaiveDate, f64> {
        let months: Vec<NaiveDate> = self.loan.schedule().rows().keys().copied().collect();
        self.timeline.series(&months)
    }

    /// The position's cash flows at 100% ownership of the loan.
    pub fn schedule(&self) -> Vec<PreferredEquityRow> {
        self.loan
            .schedule()
            .iter()
            .map(|(&date, row)| PreferredEquityRow {
                date,
                income: row.interest_payment,
                draw: row.loan_draw,
                repayment: row.scheduled_principal_payment + row.loan_paydown,
                market_value: row.ending_balance,
                ownership_share: 1.0,
            })
            .collect()
    }

    /// The position's cash flows scaled by the ownership timeline.
    pub fn schedule_at_share(&self) -> Vec<PreferredEquityRow> {
        let ownership = self.ownership_series();
        self.schedule()
            .into_iter()
            .map(|mut row| {
                let share = ownership.get(&row.date).copied().unwrap_or(0.0);
                row.income *= share;
                row.draw *= share;
                row.repayment *= share;
                row.market_value *= share;
                row.ownership_share = share;
                row
            })
            .collect()
    }

    /// Share-scaled rows within a date range, inclusive.
    pub fn schedule_at_share_between(
        &self,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Vec<PreferredEquityRow> {
        self.schedule_at_share()
            .into_iter()
            .filter(|row| row.date >= start_date && row.date <= end_date)
            .collect()
    }
}

fn validate_ownership(share: f64) -> Result<(), EngineError> {
    if !(0.0..=1.0).contains(&share) {
        return Err(EngineError::InvalidOwnership(share));
    }
    Ok(())
}
