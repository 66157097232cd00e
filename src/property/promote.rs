//! Promote dilution engine
//!
//! A promote deal's stated ownership overstates the LP position once the
//! GP's carry kicks in. Per month, the property's NAV is appended as a
//! synthetic terminal flow onto the promote cash-flow history to date and
//! the carry waterfall re-run over that truncated series; the resulting
//! effective share drives dilution adjustments against the stated lines.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::cashflows::PropertyCashFlowRow;
use super::Property;
use crate::dates::end_of_month;
use crate::error::EngineError;
use crate::waterfall::{CarryWaterfall, CashFlowSeries};

/// Dated promote cash flows for one property: capital draws negative,
/// distributions positive. Same-date amounts merge by summation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PromoteCashFlows {
    flows: BTreeMap<NaiveDate, f64>,
}

impl PromoteCashFlows {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, date: NaiveDate, amount: f64) {
        *self.flows.entry(end_of_month(date)).or_insert(0.0) += amount;
    }

    pub fn amount_on(&self, date: NaiveDate) -> f64 {
        self.flows.get(&end_of_month(date)).copied().unwrap_or(0.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&NaiveDate, &f64)> {
        self.flows.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.flows.is_empty()
    }

    pub(crate) fn flows(&self) -> &BTreeMap<NaiveDate, f64> {
        &self.flows
    }
}

/// Adjustment that restates a value from the stated share to the
/// effective share: `(v / s) * e - v`.
///
/// Zero when nothing is owned, and zero for wholly owned positions where
/// no dilution is possible.
pub fn dilution_adjustment(stated_value: f64, stated_share: f64, effective_share: f64) -> f64 {
    if stated_share == 0.0 {
        0.0
    } else if stated_share < 1.0 {
        stated_value / stated_share * effective_share - stated_value
    } else {
        0.0
    }
}

impl Property {
    /// Effective LP share as of a month, given the property's NAV at that
    /// month.
    ///
    /// The NAV lands as a terminal positive flow on the promote history
    /// truncated to the as-of month; zero flows are dropped before the
    /// waterfall runs. An upper-tier share multiplier scales the result
    /// for multi-level fund structures.
    pub fn effective_share(&self, as_of: NaiveDate, nav: f64) -> Result<f64, EngineError> {
        let as_of = end_of_month(as_of);

        let mut flows = self.promote_flows().flows().clone();
        *flows.entry(as_of).or_insert(0.0) += nav;

        let series = CashFlowSeries::from_pairs(
            flows
                .into_iter()
                .filter(|(date, amount)| *amount != 0.0 && *date <= as_of),
        );

        let waterfall = CarryWaterfall::new(series, self.tiers().to_vec())?;
        let mut share = waterfall.lp_effective_share();
        if let Some(upper_tier) = self.config().upper_tier_share {
            share *= upper_tier;
        }
        Ok(share)
    }

    /// Effective LP share per analysis month, using each month's NAV from
    /// the combined (full-share) rows.
    pub fn effective_shares(&self) -> Result<BTreeMap<NaiveDate, f64>, EngineError> {
        let mut shares = BTreeMap::new();
        for row in self.combined_rows() {
            let nav = row.market_value - row.ending_balance;
            shares.insert(row.date, self.effective_share(row.date, nav)?);
        }
        Ok(shares)
    }

    /// Apply dilution to the gain/loss, gross-income, and NAV lines of
    /// ownership-adjusted rows.
    pub(super) fn apply_dilution(
        &self,
        rows: &mut [PropertyCashFlowRow],
    ) -> Result<(), EngineError> {
        let shares = self.effective_shares()?;

        for row in rows.iter_mut() {
            let effective = shares.get(&row.date).copied().unwrap_or(0.0);
            row.effective_share = effective;
            row.nav = row.market_value - row.ending_balance;
            row.gain_loss_dilution =
                dilution_adjustment(row.gain_loss, row.ownership_share, effective);
            row.gross_income_dilution =
                dilution_adjustment(row.gross_income, row.ownership_share, effective);
            row.nav_dilution = dilution_adjustment(row.nav, row.ownership_share, effective);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property::{PropertyConfig, ValuationMethod};
    use crate::waterfall::TierParams;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn promote_property() -> Property {
        let config = PropertyConfig {
            id: "P-1".to_string(),
            name: "Summit Ridge".to_string(),
            property_type: "Industrial".to_string(),
            acquisition_date: Some(d(2024, 1, 31)),
            disposition_date: Some(d(2027, 12, 31)),
            acquisition_cost: 8_000_000.0,
            disposition_price: 11_000_000.0,
            market_value: 8_000_000.0,
            analysis_date: d(2024, 1, 31),
            analysis_length: 48,
            ownership: 0.9,
            promote: true,
            valuation_method: ValuationMethod::Growth,
            ..PropertyConfig::default()
        };
        let mut property = Property::new(config).unwrap();
        property.add_promote_tier(TierParams::new(0.9, 0.08).unwrap());
        property.add_promote_tier(TierParams::new(0.7, 0.0).unwrap());
        property.add_promote_cash_flow(d(2024, 1, 31), -8_000_000.0);
        property
    }

    #[test]
    fn test_dilution_adjustment_edge_shares() {
        assert_eq!(dilution_adjustment(1_000.0, 0.0, 0.8), 0.0);
        assert_eq!(dilution_adjustment(1_000.0, 1.0, 0.8), 0.0);

        // 90% stated, 85% effective: gives back a ninth of the grossed-up
        // value times the share gap
        let adjusted = dilution_adjustment(900.0, 0.9, 0.85);
        assert!((adjusted - (-50.0)).abs() < 1e-9);
    }

    #[test]
    fn test_effective_share_with_single_flow_defaults_to_first_tier() {
        let property = promote_property();

        // Truncating to the first month leaves only the capital call plus
        // NAV on the same date: one merged flow, first tier ratio applies
        let share = property
            .effective_share(d(2024, 1, 31), 8_000_000.0 - 8_000_000.0)
            .unwrap();
        assert!((share - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_effective_share_declines_once_promote_is_in_the_money() {
        let property = promote_property();

        // Three years on, a NAV well above the hurdle pushes profit into
        // the 70/30 tier and the LP's realized share drops below 90%
        let share = property
            .effective_share(d(2027, 1, 31), 14_000_000.0)
            .unwrap();
        assert!(share < 0.9, "expected dilution, got {share}");
        assert!(share > 0.7, "share cannot fall below the last tier, got {share}");
    }

    #[test]
    fn test_upper_tier_share_scales_the_result() {
        let unscaled = promote_property()
            .effective_share(d(2027, 1, 31), 14_000_000.0)
            .unwrap();

        let mut config = promote_property().config().clone();
        config.upper_tier_share = Some(0.5);
        let mut scaled_property = Property::new(config).unwrap();
        scaled_property.add_promote_tier(TierParams::new(0.9, 0.08).unwrap());
        scaled_property.add_promote_tier(TierParams::new(0.7, 0.0).unwrap());
        scaled_property.add_promote_cash_flow(d(2024, 1, 31), -8_000_000.0);

        let scaled = scaled_property
            .effective_share(d(2027, 1, 31), 14_000_000.0)
            .unwrap();
        assert!((scaled - unscaled * 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_diluted_rows_populate_adjustments() {
        let mut property = promote_property();
        for month in property.months().to_vec() {
            let _ = property.update_noi_by_date(month, 45_000.0);
        }

        let rows = property.ownership_adjusted_rows().unwrap();
        let row = rows.iter().find(|r| r.date == d(2026, 6, 30)).unwrap();

        assert!(row.effective_share > 0.0);
        assert!(row.effective_share <= 0.9 + 1e-9);
        // Adjustment formula holds on every populated line
        let expected =
            dilution_adjustment(row.gain_loss, row.ownership_share, row.effective_share);
        assert!((row.gain_loss_dilution - expected).abs() < 1e-9);
    }
}
