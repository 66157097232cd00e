//! Property market value projection
//!
//! Two mutually exclusive modes: compounding growth with capex during the
//! construction window, or forward-NOI capitalization with the cap rate
//! interpolated toward an exit cap rate over a fixed ramp.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::dates::add_months;
use crate::market::MonthlySeries;

/// Months over which the cap rate interpolates from start to exit
const CAP_RATE_RAMP_MONTHS: f64 = 120.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValuationMethod {
    /// Compound the prior value monthly, adding construction capex
    Growth,
    /// Capitalize forward 12-month NOI at an interpolated cap rate
    CapRate,
}

/// Projects one market value per analysis month.
#[derive(Debug, Clone)]
pub struct ValuationProjector<'a> {
    pub method: ValuationMethod,
    pub market_value: f64,
    /// Annual growth rate used by the growth method
    pub growth_rate: f64,
    pub cap_rate: Option<f64>,
    pub exit_cap_rate: Option<f64>,
    pub acquisition_date: Option<NaiveDate>,
    pub disposition_date: Option<NaiveDate>,
    /// Value reported in the disposition month under the cap-rate method
    pub disposition_value_override: Option<f64>,
    pub construction_end: Option<NaiveDate>,
    pub analysis_start: NaiveDate,
    pub noi: &'a MonthlySeries,
    pub capex: &'a MonthlySeries,
}

impl ValuationProjector<'_> {
    /// One value per month. The first month always reports the stated
    /// market value; the cap-rate method only engages once construction
    /// has finished before the analysis window.
    pub fn project(&self, months: &[NaiveDate]) -> Vec<f64> {
        let monthly_growth = (1.0 + self.growth_rate).powf(1.0 / 12.0);
        let construction_finished = match self.construction_end {
            None => true,
            Some(end) => end < self.analysis_start,
        };

        let mut values = Vec::with_capacity(months.len());
        let mut value = self.market_value;

        for (idx, &month) in months.iter().enumerate() {
            if idx == 0 {
                value = self.market_value;
                values.push(value);
                continue;
            }

            if let Some(disposition) = self.disposition_date {
                if month == disposition {
                    value = match self.method {
                        ValuationMethod::CapRate if construction_finished => {
                            self.disposition_value_override.unwrap_or(0.0)
                        }
                        _ => 0.0,
                    };
                    values.push(value);
                    continue;
                }
                if month > disposition {
                    value = 0.0;
                    values.push(value);
                    continue;
                }
            }

            if self.method == ValuationMethod::CapRate && construction_finished {
                let fraction = (idx as f64 / CAP_RATE_RAMP_MONTHS).min(1.0);
                value = match (self.cap_rate, self.exit_cap_rate) {
                    (Some(start), Some(exit)) => {
                        let rate = start + fraction * (exit - start);
                        if rate != 0.0 {
                            self.forward_noi(month) / rate
                        } else {
                            0.0
                        }
                    }
                    _ => 0.0,
                };
            } else {
                let capex_add = match self.construction_end {
                    Some(end) if month <= end => self.capex.amount_or_zero(month),
                    _ => 0.0,
                };
                value = value * monthly_growth + capex_add;
            }

            values.push(value);
        }

        values
    }

    /// NOI over the strictly following 12 months — never the current
    /// month. Zero for any month before acquisition.
    pub fn forward_noi(&self, month: NaiveDate) -> f64 {
        if let Some(acquisition) = self.acquisition_date {
            if month < acquisition {
                return 0.0;
            }
        }
        (1..=12)
            .map(|i| self.noi.amount_or_zero(add_months(month, i)))
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dates::month_sequence;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn projector<'a>(
        method: ValuationMethod,
        noi: &'a MonthlySeries,
        capex: &'a MonthlySeries,
    ) -> ValuationProjector<'a> {
        ValuationProjector {
            method,
            market_value: 10_000_000.0,
            growth_rate: 0.03,
            cap_rate: Some(0.05),
            exit_cap_rate: Some(0.06),
            acquisition_date: Some(d(2024, 1, 31)),
            disposition_date: Some(d(2026, 1, 31)),
            disposition_value_override: None,
            construction_end: None,
            analysis_start: d(2024, 1, 31),
            noi,
            capex,
        }
    }

    #[test]
    fn test_growth_mode_compounds_monthly() {
        let noi = MonthlySeries::new();
        let capex = MonthlySeries::new();
        let p = projector(ValuationMethod::Growth, &noi, &capex);

        let months = month_sequence(d(2024, 1, 31), 4);
        let values = p.project(&months);

        let g = 1.03_f64.powf(1.0 / 12.0);
        assert_eq!(values[0], 10_000_000.0);
        assert!((values[1] - 10_000_000.0 * g).abs() < 1e-6);
        assert!((values[3] - 10_000_000.0 * g.powi(3)).abs() < 1e-6);
    }

    #[test]
    fn test_growth_mode_adds_capex_during_construction() {
        let noi = MonthlySeries::new();
        let mut capex = MonthlySeries::new();
        capex.set(d(2024, 2, 29), 250_000.0);
        capex.set(d(2024, 3, 31), 250_000.0);

        let mut p = projector(ValuationMethod::Growth, &noi, &capex);
        p.construction_end = Some(d(2024, 2, 29));
        // Construction still running: growth method applies regardless of
        // the configured valuation method
        p.analysis_start = d(2024, 1, 31);

        let months = month_sequence(d(2024, 1, 31), 3);
        let values = p.project(&months);

        let g = 1.03_f64.powf(1.0 / 12.0);
        // February capex lands inside the construction window
        assert!((values[1] - (10_000_000.0 * g + 250_000.0)).abs() < 1e-6);
        // March capex falls outside it
        assert!((values[2] - values[1] * g).abs() < 1e-6);
    }

    #[test]
    fn test_growth_mode_zeroes_at_disposition() {
        let noi = MonthlySeries::new();
        let capex = MonthlySeries::new();
        let p = projector(ValuationMethod::Growth, &noi, &capex);

        let months = month_sequence(d(2024, 1, 31), 26);
        let values = p.project(&months);

        // Disposition month and everything after report zero
        assert_eq!(values[24], 0.0);
        assert_eq!(values[25], 0.0);
        assert!(values[23] > 0.0);
    }

    #[test]
    fn test_cap_rate_mode_capitalizes_forward_noi() {
        let mut noi = MonthlySeries::new();
        for month in month_sequence(d(2024, 1, 31), 40) {
            noi.set(month, 50_000.0);
        }
        let capex = MonthlySeries::new();
        let p = projector(ValuationMethod::CapRate, &noi, &capex);

        let months = month_sequence(d(2024, 1, 31), 3);
        let values = p.project(&months);

        // Month 1: forward NOI = 600k, cap rate one step along the ramp
        let rate = 0.05 + (1.0 / 120.0) * 0.01;
        assert!((values[1] - 600_000.0 / rate).abs() < 1e-6);
    }

    #[test]
    fn test_forward_noi_excludes_current_month() {
        let mut noi = MonthlySeries::new();
        noi.set(d(2024, 1, 31), 999_999.0); // must not be counted
        for month in month_sequence(d(2024, 2, 29), 12) {
            noi.set(month, 10_000.0);
        }
        let capex = MonthlySeries::new();
        let p = projector(ValuationMethod::CapRate, &noi, &capex);

        assert!((p.forward_noi(d(2024, 1, 31)) - 120_000.0).abs() < 1e-9);
    }

    #[test]
    fn test_forward_noi_zero_before_acquisition() {
        let mut noi = MonthlySeries::new();
        for month in month_sequence(d(2023, 1, 31), 24) {
            noi.set(month, 10_000.0);
        }
        let capex = MonthlySeries::new();
        let p = projector(ValuationMethod::CapRate, &noi, &capex);

        assert_eq!(p.forward_noi(d(2023, 6, 30)), 0.0);
    }
}
