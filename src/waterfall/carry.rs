//! Tiered carried-interest waterfall
//!
//! Splits a dated deal-level cash flow series into LP and GP streams across
//! an ordered list of distribution tiers, then derives IRRs, multiples, and
//! effective ownership shares for each party.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::irr::{round10, xirr, year_fraction};
use crate::error::EngineError;

/// Allocation cutoff: a positive flow is considered fully distributed once
/// the remainder drops below this.
const REMAINING_EPSILON: f64 = 1e-12;

/// A dated cash flow series in canonical form: same-date flows merged by
/// summation, NaN amounts dropped, sorted chronologically.
///
/// This is the sole input shape accepted by XNPV/XIRR and the waterfall.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CashFlowSeries {
    dates: Vec<NaiveDate>,
    amounts: Vec<f64>,
}

impl CashFlowSeries {
    /// Build from parallel date/amount lists. Lengths must match; the rest
    /// of canonicalization (merge, drop, sort) happens here.
    pub fn new(dates: Vec<NaiveDate>, amounts: Vec<f64>) -> Result<Self, EngineError> {
        if dates.len() != amounts.len() {
            return Err(EngineError::LengthMismatch {
                dates: dates.len(),
                amounts: amounts.len(),
            });
        }
        Ok(Self::from_pairs(dates.into_iter().zip(amounts)))
    }

    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (NaiveDate, f64)>,
    {
        let mut merged: BTreeMap<NaiveDate, f64> = BTreeMap::new();
        for (date, amount) in pairs {
            if amount.is_nan() {
                continue;
            }
            *merged.entry(date).or_insert(0.0) += amount;
        }

        let (dates, amounts) = merged.into_iter().unzip();
        Self { dates, amounts }
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn amounts(&self) -> &[f64] {
        &self.amounts
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }
}

/// Parameters for one waterfall tier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TierParams {
    /// LP share of this tier's distributions, strictly between 0 and 1
    pub lp_dist_ratio: f64,
    /// Annualized hurdle the LP position must clear within this tier
    pub hurdle_rate: f64,
}

impl TierParams {
    pub fn new(lp_dist_ratio: f64, hurdle_rate: f64) -> Result<Self, EngineError> {
        if !(lp_dist_ratio > 0.0 && lp_dist_ratio < 1.0) {
            return Err(EngineError::InvalidTier(lp_dist_ratio));
        }
        Ok(Self {
            lp_dist_ratio,
            hurdle_rate,
        })
    }

    /// GP share is whatever the LP share leaves behind.
    pub fn gp_dist_ratio(&self) -> f64 {
        1.0 - self.lp_dist_ratio
    }
}

/// Derived outputs of a waterfall evaluation.
///
/// For an empty series only the effective shares are populated; every other
/// field stays at its default.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WaterfallMetrics {
    pub deal_profit: f64,
    pub lp_profit: f64,
    pub gp_profit: f64,
    pub deal_xirr: f64,
    pub lp_xirr: f64,
    pub gp_xirr: f64,
    pub deal_contrib: f64,
    pub lp_contrib: f64,
    pub gp_contrib: f64,
    pub deal_distr: f64,
    pub lp_distr: f64,
    pub gp_distr: f64,
    pub deal_multiple: f64,
    pub lp_multiple: f64,
    pub gp_multiple: f64,
    pub lp_effective_share: f64,
    pub gp_effective_share: f64,
}

/// The allocated flow streams plus derived metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaterfallOutcome {
    pub lp_cash_flows: Vec<f64>,
    pub gp_cash_flows: Vec<f64>,
    pub metrics: WaterfallMetrics,
}

/// Tiered LP/GP distribution calculator for any number of tiers.
#[derive(Debug, Clone)]
pub struct CarryWaterfall {
    series: CashFlowSeries,
    tiers: Vec<TierParams>,
}

impl CarryWaterfall {
    /// Construction validates every tier ratio; a non-empty series with no
    /// tiers is rejected since there would be nothing to allocate against.
    pub fn new(series: CashFlowSeries, tiers: Vec<TierParams>) -> Result<Self, EngineError> {
        for tier in &tiers {
            if !(tier.lp_dist_ratio > 0.0 && tier.lp_dist_ratio < 1.0) {
                return Err(EngineError::InvalidTier(tier.lp_dist_ratio));
            }
        }
        if tiers.is_empty() && !series.is_empty() {
            return Err(EngineError::InvalidTerms(
                "waterfall requires at least one tier".to_string(),
            ));
        }
        Ok(Self { series, tiers })
    }

    /// Run the allocation and derive metrics.
    pub fn evaluate(&self) -> WaterfallOutcome {
        if self.series.is_empty() {
            let lp_share = self.tiers.first().map(|t| t.lp_dist_ratio).unwrap_or(0.0);
            return WaterfallOutcome {
                lp_cash_flows: Vec::new(),
                gp_cash_flows: Vec::new(),
                metrics: WaterfallMetrics {
                    lp_effective_share: lp_share,
                    ..WaterfallMetrics::default()
                },
            };
        }

        let mut lp = vec![0.0; self.series.len()];
        let mut gp = vec![0.0; self.series.len()];

        self.initial_allocation(&mut lp, &mut gp);
        self.tier_distribution(&mut lp, &mut gp);
        let metrics = self.derive_metrics(&lp, &gp);

        WaterfallOutcome {
            lp_cash_flows: lp,
            gp_cash_flows: gp,
            metrics,
        }
    }

    /// Convenience accessor for the dilution engine.
    pub fn lp_effective_share(&self) -> f64 {
        self.evaluate().metrics.lp_effective_share
    }

    /// Capital calls (negative flows) split by the first tier's ratio.
    fn initial_allocation(&self, lp: &mut [f64], gp: &mut [f64]) {
        let first = &self.tiers[0];
        for (i, &cf) in self.series.amounts().iter().enumerate() {
            if cf < 0.0 {
                lp[i] = cf * first.lp_dist_ratio;
                gp[i] = cf * first.gp_dist_ratio();
            }
        }
    }

    /// Future value, at the tier hurdle, of the LP's cumulative allocated
    /// position up to and including `up_to`.
    ///
    /// The hurdle compounds the LP's own running position on an Actual/365
    /// basis, not the gross deal flow. This matches the source model the
    /// waterfall was calibrated against, including the 10-decimal rounding.
    fn future_value(&self, up_to: usize, lp: &[f64], rate: f64) -> f64 {
        let dates = self.series.dates();
        let d0 = dates[0];

        let mut npv = 0.0;
        for j in 0..=up_to {
            let t = year_fraction(dates[j], d0);
            npv += lp[j] / (1.0 + rate).powf(t);
        }
        npv = -npv;

        let t_current = year_fraction(dates[up_to], d0);
        round10(npv * (1.0 + rate).powf(t_current))
    }

    /// Distributions (positive flows) allocated tier by tier; any residual
    /// after the last tier splits at the last tier's ratio.
    fn tier_distribution(&self, lp: &mut [f64], gp: &mut [f64]) {
        for i in 0..self.series.len() {
            let cf = self.series.amounts()[i];
            if cf <= 0.0 {
                continue;
            }

            let mut remaining = cf;
            for tier in &self.tiers {
                let required_fv = self.future_value(i, lp, tier.hurdle_rate);
                let alloc_lp = required_fv.min(remaining * tier.lp_dist_ratio);
                let alloc_gp = alloc_lp * (tier.gp_dist_ratio() / tier.lp_dist_ratio);
                lp[i] += alloc_lp;
                gp[i] += alloc_gp;
                remaining -= alloc_lp + alloc_gp;
                if remaining <= REMAINING_EPSILON {
                    break;
                }
            }

            if remaining > REMAINING_EPSILON {
                let last = self.tiers.last().expect("validated non-empty");
                lp[i] += remaining * last.lp_dist_ratio;
                gp[i] += remaining * last.gp_dist_ratio();
            }
        }
    }

    fn derive_metrics(&self, lp: &[f64], gp: &[f64]) -> WaterfallMetrics {
        let deal = self.series.amounts();
        let dates = self.series.dates();

        let deal_xirr = xirr(deal, dates);
        let lp_xirr = xirr(lp, dates);
        let gp_xirr = xirr(gp, dates);

        let contrib = |flows: &[f64]| -flows.iter().filter(|cf| **cf < 0.0).sum::<f64>();
        let distr = |flows: &[f64]| flows.iter().filter(|cf| **cf > 0.0).sum::<f64>();
        let multiple = |d: f64, c: f64| if c != 0.0 { d / c } else { f64::INFINITY };

        let deal_contrib = contrib(deal);
        let lp_contrib = contrib(lp);
        let gp_contrib = contrib(gp);

        let deal_distr = distr(deal);
        let lp_distr = distr(lp);
        let gp_distr = distr(gp);

        let (lp_effective_share, gp_effective_share) = if self.series.len() == 1 {
            let lp_share = self.tiers[0].lp_dist_ratio;
            (lp_share, 1.0 - lp_share)
        } else if deal_distr > 0.0 {
            (lp_distr / deal_distr, gp_distr / deal_distr)
        } else {
            let lp_share = self.tiers[0].lp_dist_ratio;
            (lp_share, 1.0 - lp_share)
        };

        debug_assert!(
            (lp_effective_share + gp_effective_share - 1.0).abs() < 1e-5,
            "shares do not sum to 1: LP {lp_effective_share}, GP {gp_effective_share}"
        );

        WaterfallMetrics {
            deal_profit: deal.iter().sum(),
            lp_profit: lp.iter().sum(),
            gp_profit: gp.iter().sum(),
            deal_xirr,
            lp_xirr,
            gp_xirr,
            deal_contrib,
            lp_contrib,
            gp_contrib,
            deal_distr,
            lp_distr,
            gp_distr,
            deal_multiple: multiple(deal_distr, deal_contrib),
            lp_multiple: multiple(lp_distr, lp_contrib),
            gp_multiple: multiple(gp_distr, gp_contrib),
            lp_effective_share,
            gp_effective_share,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn series(pairs: &[(NaiveDate, f64)]) -> CashFlowSeries {
        CashFlowSeries::from_pairs(pairs.iter().copied())
    }

    #[test]
    fn test_series_merges_same_date_flows() {
        let s = series(&[
            (d(2024, 1, 31), -500.0),
            (d(2024, 1, 31), -500.0),
            (d(2024, 6, 30), 1_200.0),
        ]);

        assert_eq!(s.len(), 2);
        assert_eq!(s.amounts()[0], -1_000.0);
    }

    #[test]
    fn test_series_drops_nan_and_sorts() {
        let s = series(&[
            (d(2024, 6, 30), 1_200.0),
            (d(2024, 1, 31), f64::NAN),
            (d(2024, 1, 31), -1_000.0),
        ]);

        assert_eq!(s.len(), 2);
        assert_eq!(s.dates()[0], d(2024, 1, 31));
        assert_eq!(s.amounts()[0], -1_000.0);
    }

    #[test]
    fn test_series_length_mismatch_rejected() {
        let result = CashFlowSeries::new(vec![d(2024, 1, 31)], vec![1.0, 2.0]);
        assert!(result.is_err());
    }

    #[test]
    fn test_tier_ratio_bounds() {
        assert!(TierParams::new(0.8, 0.08).is_ok());
        assert!(TierParams::new(0.0, 0.08).is_err());
        assert!(TierParams::new(1.0, 0.08).is_err());
        assert!(TierParams::new(1.5, 0.08).is_err());
    }

    #[test]
    fn test_single_tier_zero_hurdle() {
        // LP recovers capital first (the FV test at hurdle 0 collapses to
        // the LP's cumulative contribution), then the $200 profit splits
        // 80/20: lp = 800 + 160 = 960.
        let s = series(&[(d(2024, 1, 31), -1_000.0), (d(2025, 1, 31), 1_200.0)]);
        let tiers = vec![TierParams::new(0.8, 0.0).unwrap()];
        let outcome = CarryWaterfall::new(s, tiers).unwrap().evaluate();

        assert!((outcome.lp_cash_flows[0] - (-800.0)).abs() < 1e-9);
        assert!((outcome.gp_cash_flows[0] - (-200.0)).abs() < 1e-9);
        assert!((outcome.lp_cash_flows[1] - 960.0).abs() < 1e-9);
        assert!((outcome.gp_cash_flows[1] - 240.0).abs() < 1e-9);

        assert!((outcome.metrics.lp_distr - 960.0).abs() < 1e-9);
        assert!((outcome.metrics.lp_effective_share - 0.8).abs() < 1e-9);
        assert!((outcome.metrics.deal_profit - 200.0).abs() < 1e-9);
    }

    #[test]
    fn test_two_tier_allocation() {
        // Tier 1 (80/20) returns LP capital; the excess falls through to
        // tier 2 and the residual splits at the last tier's 50/50.
        let s = series(&[(d(2024, 1, 31), -1_000.0), (d(2025, 1, 31), 1_500.0)]);
        let tiers = vec![
            TierParams::new(0.8, 0.0).unwrap(),
            TierParams::new(0.5, 0.0).unwrap(),
        ];
        let outcome = CarryWaterfall::new(s, tiers).unwrap().evaluate();

        assert!((outcome.lp_cash_flows[1] - 1_050.0).abs() < 1e-9);
        assert!((outcome.gp_cash_flows[1] - 450.0).abs() < 1e-9);
        assert!((outcome.metrics.lp_effective_share - 0.7).abs() < 1e-9);
    }

    #[test]
    fn test_allocation_conserves_every_period() {
        let s = series(&[
            (d(2023, 1, 31), -2_000.0),
            (d(2023, 7, 31), -500.0),
            (d(2024, 3, 31), 900.0),
            (d(2025, 1, 31), 2_800.0),
        ]);
        let tiers = vec![
            TierParams::new(0.9, 0.08).unwrap(),
            TierParams::new(0.7, 0.12).unwrap(),
        ];
        let outcome = CarryWaterfall::new(s.clone(), tiers).unwrap().evaluate();

        for i in 0..s.len() {
            let total = outcome.lp_cash_flows[i] + outcome.gp_cash_flows[i];
            assert!(
                (total - s.amounts()[i]).abs() < 1e-9,
                "period {i}: {total} != {}",
                s.amounts()[i]
            );
        }

        let m = &outcome.metrics;
        assert!((m.lp_effective_share + m.gp_effective_share - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_empty_series_short_circuits() {
        let tiers = vec![TierParams::new(0.85, 0.08).unwrap()];
        let outcome = CarryWaterfall::new(CashFlowSeries::default(), tiers)
            .unwrap()
            .evaluate();

        assert!(outcome.lp_cash_flows.is_empty());
        assert!((outcome.metrics.lp_effective_share - 0.85).abs() < 1e-12);
        assert_eq!(outcome.metrics.deal_profit, 0.0);
    }

    #[test]
    fn test_no_tiers_rejected_for_nonempty_series() {
        let s = series(&[(d(2024, 1, 31), -1.0)]);
        assert!(CarryWaterfall::new(s, Vec::new()).is_err());
    }

    #[test]
    fn test_zero_distribution_falls_back_to_first_tier_share() {
        let s = series(&[(d(2024, 1, 31), -1_000.0), (d(2024, 6, 30), -500.0)]);
        let tiers = vec![TierParams::new(0.8, 0.0).unwrap()];
        let m = CarryWaterfall::new(s, tiers).unwrap().evaluate().metrics;

        assert!((m.lp_effective_share - 0.8).abs() < 1e-12);
        assert!(m.deal_multiple == 0.0);
    }

    #[test]
    fn test_multiple_is_infinite_without_contributions() {
        let s = series(&[(d(2024, 1, 31), 100.0), (d(2024, 6, 30), 100.0)]);
        let tiers = vec![TierParams::new(0.8, 0.0).unwrap()];
        let m = CarryWaterfall::new(s, tiers).unwrap().evaluate().metrics;

        assert!(m.deal_multiple.is_infinite());
    }
}
