//! Disposition timing analysis
//!
//! Scans candidate disposition months for the IRR-maximizing exit, with
//! the exit price taken as forward 12-month NOI capitalized at a fixed
//! rate. Requires full NOI/capex coverage of the analysis window; missing
//! months propagate as lookup errors.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::Property;
use crate::error::EngineError;
use crate::waterfall::periodic_irr;

/// Capitalization rate applied to forward NOI at exit
const EXIT_CAPITALIZATION_RATE: f64 = 0.05;

/// Earliest disposition considered, in months of held cash flows
const MIN_HOLD_MONTHS: usize = 12;

/// Result of a disposition scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispositionScan {
    pub date: NaiveDate,
    /// Annualized IRR (monthly rate x 12)
    pub irr: f64,
    pub cash_flows: Vec<f64>,
}

impl Property {
    /// Exit price for a disposition month: the strictly following 12
    /// months of NOI (clipped to the analysis window) capitalized at 5%.
    pub fn exit_value(&self, disposition_date: NaiveDate) -> Result<f64, EngineError> {
        let index = self.month_index(disposition_date)?;
        let months = self.months();

        let mut forward_noi = 0.0;
        for i in index + 1..(index + 13).min(months.len()) {
            forward_noi += self.noi().get(months[i])?;
        }
        Ok(forward_noi / EXIT_CAPITALIZATION_RATE)
    }

    /// Property-level IRR for a hypothetical disposition month: the
    /// stated market value goes out up front, each held month returns
    /// `noi - capex`, and the exit value lands in the disposition month.
    ///
    /// Returns the annualized rate (None when no IRR exists) and the cash
    /// flow vector it was solved over.
    pub fn property_irr(
        &self,
        disposition_date: NaiveDate,
    ) -> Result<(Option<f64>, Vec<f64>), EngineError> {
        let index = self.month_index(disposition_date)?;
        let months = self.months();

        let mut cash_flows = Vec::with_capacity(index + 2);
        cash_flows.push(-self.config().market_value);
        for &month in &months[..=index] {
            let sale_proceeds = if month == months[index] {
                self.exit_value(disposition_date)?
            } else {
                0.0
            };
            cash_flows.push(self.noi().get(month)? - self.capex().get(month)? + sale_proceeds);
        }

        let annualized = periodic_irr(&cash_flows).map(|monthly| monthly * 12.0);
        Ok((annualized, cash_flows))
    }

    /// Scan every candidate disposition from the minimum hold onward and
    /// return the IRR-maximizing one. None when no candidate produces an
    /// IRR.
    pub fn find_optimal_disposition(&self) -> Result<Option<DispositionScan>, EngineError> {
        let mut best: Option<DispositionScan> = None;

        for i in MIN_HOLD_MONTHS..self.months().len() {
            let date = self.months()[i];
            let (irr, cash_flows) = self.property_irr(date)?;
            let Some(irr) = irr else { continue };

            if best.as_ref().map_or(true, |b| irr > b.irr) {
                best = Some(DispositionScan {
                    date,
                    irr,
                    cash_flows,
                });
            }
        }

        Ok(best)
    }
}
