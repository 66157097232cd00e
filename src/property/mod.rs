//! Property modeling: ownership, valuation, cash flows, and promote
//! dilution

mod cashflows;
mod disposition;
mod ownership;
mod promote;
mod valuation;

pub use cashflows::PropertyCashFlowRow;
pub use disposition::DispositionScan;
pub use ownership::OwnershipTimeline;
pub use promote::{dilution_adjustment, PromoteCashFlows};
pub use valuation::{ValuationMethod, ValuationProjector};

use std::collections::BTreeMap;

use chrono::NaiveDate;
use log::warn;
use serde::{Deserialize, Serialize};

use crate::dates::{end_of_month, month_sequence, prior_month_end};
use crate::error::EngineError;
use crate::loan::Loan;
use crate::market::MonthlySeries;
use crate::waterfall::TierParams;

/// A partial sale of the stated ownership position.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PartialSale {
    pub date: NaiveDate,
    pub proceeds: f64,
    pub percent: f64,
}

/// A buyout of a partner's position.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PartnerBuyout {
    pub date: NaiveDate,
    pub cost: f64,
    pub percent: f64,
}

/// Construction parameters for a [`Property`]. Dates may be mid-month;
/// they are normalized to the month-end grid at construction.
#[derive(Debug, Clone)]
pub struct PropertyConfig {
    pub id: String,
    pub name: String,
    pub property_type: String,
    pub acquisition_date: Option<NaiveDate>,
    pub disposition_date: Option<NaiveDate>,
    pub acquisition_cost: f64,
    pub disposition_price: f64,
    pub market_value: f64,
    /// Annual growth assumption for the growth valuation method
    pub market_value_growth: f64,
    /// First month of the analysis window
    pub analysis_date: NaiveDate,
    /// Number of months in the analysis window
    pub analysis_length: usize,
    /// Stated ownership share at acquisition
    pub ownership: f64,
    /// Fund-level multiplier applied on top of the deal-level effective
    /// share for multi-tier structures
    pub upper_tier_share: Option<f64>,
    pub construction_end: Option<NaiveDate>,
    pub equity_commitment: Option<f64>,
    pub partial_sale: Option<PartialSale>,
    pub partner_buyout: Option<PartnerBuyout>,
    /// Marks every month encumbered regardless of loan state
    pub encumbered: bool,
    pub cap_rate: Option<f64>,
    pub exit_cap_rate: Option<f64>,
    pub capex_percent_of_noi: f64,
    /// Whether promote dilution applies to this property
    pub promote: bool,
    pub valuation_method: ValuationMethod,
}

impl Default for PropertyConfig {
    fn default() -> Self {
        Self {
            id: String::new(),
            name: String::new(),
            property_type: String::new(),
            acquisition_date: None,
            disposition_date: None,
            acquisition_cost: 0.0,
            disposition_price: 0.0,
            market_value: 0.0,
            market_value_growth: 0.03,
            analysis_date: NaiveDate::default(),
            analysis_length: 0,
            ownership: 1.0,
            upper_tier_share: None,
            construction_end: None,
            equity_commitment: None,
            partial_sale: None,
            partner_buyout: None,
            encumbered: false,
            cap_rate: None,
            exit_cap_rate: None,
            capex_percent_of_noi: 0.0,
            promote: false,
            valuation_method: ValuationMethod::CapRate,
        }
    }
}

/// A real-estate position: valuation inputs, loans, NOI/capex series,
/// ownership events, and promote structure.
#[derive(Debug, Clone)]
pub struct Property {
    config: PropertyConfig,
    months: Vec<NaiveDate>,
    timeline: OwnershipTimeline,
    loans: BTreeMap<String, Loan>,
    noi: MonthlySeries,
    capex: MonthlySeries,
    tiers: Vec<TierParams>,
    promote_flows: PromoteCashFlows,
}

impl Property {
    pub fn new(config: PropertyConfig) -> Result<Self, EngineError> {
        if !(0.0..=1.0).contains(&config.ownership) {
            return Err(EngineError::InvalidOwnership(config.ownership));
        }
        if config.analysis_length == 0 {
            return Err(EngineError::InvalidTerms(
                "analysis length must be at least one month".to_string(),
            ));
        }

        let mut config = config;
        config.analysis_date = end_of_month(config.analysis_date);
        config.acquisition_date = config.acquisition_date.map(end_of_month);
        config.disposition_date = config.disposition_date.map(end_of_month);
        config.construction_end = config.construction_end.map(end_of_month);
        if let Some(sale) = config.partial_sale.as_mut() {
            sale.date = end_of_month(sale.date);
        }
        if let Some(buyout) = config.partner_buyout.as_mut() {
            buyout.date = end_of_month(buyout.date);
        }

        let months = month_sequence(config.analysis_date, config.analysis_length);

        let mut timeline = OwnershipTimeline::new();
        if let Some(acquisition) = config.acquisition_date {
            timeline.record_acquisition(acquisition, config.ownership);
        }
        if let Some(disposition) = config.disposition_date {
            timeline.record_disposition(disposition);
        }
        if let Some(buyout) = config.partner_buyout {
            if buyout.percent != 0.0 {
                timeline.record_partner_buyout(buyout.date, buyout.percent);
            }
        }
        if let Some(sale) = config.partial_sale {
            if sale.percent != 0.0 {
                timeline.record_partial_sale(sale.date, sale.percent);
            }
        }

        Ok(Self {
            config,
            months,
            timeline,
            loans: BTreeMap::new(),
            noi: MonthlySeries::new(),
            capex: MonthlySeries::new(),
            tiers: Vec::new(),
            promote_flows: PromoteCashFlows::new(),
        })
    }

    pub fn config(&self) -> &PropertyConfig {
        &self.config
    }

    pub fn months(&self) -> &[NaiveDate] {
        &self.months
    }

    pub fn timeline(&self) -> &OwnershipTimeline {
        &self.timeline
    }

    pub(crate) fn month_index(&self, date: NaiveDate) -> Result<usize, EngineError> {
        let month = end_of_month(date);
        self.months
            .iter()
            .position(|&m| m == month)
            .ok_or(EngineError::OutsideAnalysisWindow(month))
    }

    // ---- loans ----------------------------------------------------------

    /// Attach a loan. Loans whose earliest exit (maturity, prepayment, or
    /// foreclosure) falls after the disposition date are accepted with a
    /// warning.
    pub fn add_loan(&mut self, loan: Loan) -> Result<(), EngineError> {
        let id = loan.id().to_string();
        if self.loans.contains_key(&id) {
            return Err(EngineError::DuplicateLoan(id));
        }

        if let Some(disposition) = self.config.disposition_date {
            let terms = loan.terms();
            let earliest = [
                Some(terms.maturity_date),
                terms.prepayment_date,
                terms.foreclosure_date,
            ]
            .into_iter()
            .flatten()
            .min();
            if earliest.is_some_and(|date| date > disposition) {
                warn!(
                    "loan dates extend beyond disposition -- property: {} | loan: {}",
                    self.config.name, id
                );
            }
        }

        self.loans.insert(id, loan);
        Ok(())
    }

    pub fn loan(&self, id: &str) -> Option<&Loan> {
        self.loans.get(id)
    }

    pub fn loans(&self) -> impl Iterator<Item = &Loan> {
        self.loans.values()
    }

    pub fn remove_loan(&mut self, id: &str) -> Option<Loan> {
        self.loans.remove(id)
    }

    /// Delegate a draw request to a loan; the applied amount is returned.
    pub fn add_loan_draw(
        &mut self,
        loan_id: &str,
        draw: f64,
        draw_date: NaiveDate,
    ) -> Result<f64, EngineError> {
        let loan = self
            .loans
            .get_mut(loan_id)
            .ok_or_else(|| EngineError::UnknownLoan(loan_id.to_string()))?;
        Ok(loan.add_loan_draw(draw, draw_date))
    }

    /// Delegate a paydown to a loan; the applied amount is returned.
    pub fn add_loan_paydown(
        &mut self,
        loan_id: &str,
        paydown: f64,
        paydown_date: NaiveDate,
    ) -> Result<f64, EngineError> {
        let loan = self
            .loans
            .get_mut(loan_id)
            .ok_or_else(|| EngineError::UnknownLoan(loan_id.to_string()))?;
        Ok(loan.add_loan_paydown(paydown, paydown_date))
    }

    // ---- NOI / capex ----------------------------------------------------

    pub fn set_noi(&mut self, noi: MonthlySeries) {
        self.noi = noi;
    }

    pub fn set_capex(&mut self, capex: MonthlySeries) {
        self.capex = capex;
    }

    pub fn noi(&self) -> &MonthlySeries {
        &self.noi
    }

    pub fn capex(&self) -> &MonthlySeries {
        &self.capex
    }

    /// Record NOI for a month inside the analysis window.
    pub fn update_noi_by_date(&mut self, date: NaiveDate, noi: f64) -> Result<(), EngineError> {
        self.month_index(date)?;
        self.noi.set(date, noi);
        Ok(())
    }

    /// Record capex for a month inside the analysis window.
    pub fn update_capex_by_date(&mut self, date: NaiveDate, capex: f64) -> Result<(), EngineError> {
        self.month_index(date)?;
        self.capex.set(date, capex);
        Ok(())
    }

    // ---- ownership ------------------------------------------------------

    pub fn ownership_share(&self, date: NaiveDate) -> f64 {
        self.timeline.share_on(date)
    }

    pub fn ownership_series(&self) -> BTreeMap<NaiveDate, f64> {
        self.timeline.series(&self.months)
    }

    // ---- promote --------------------------------------------------------

    pub fn add_promote_tier(&mut self, tier: TierParams) {
        self.tiers.push(tier);
    }

    pub fn tiers(&self) -> &[TierParams] {
        &self.tiers
    }

    pub fn add_promote_cash_flow(&mut self, date: NaiveDate, amount: f64) {
        self.promote_flows.add(date, amount);
    }

    pub fn promote_flows(&self) -> &PromoteCashFlows {
        &self.promote_flows
    }

    // ---- valuation ------------------------------------------------------

    fn projector(&self) -> ValuationProjector<'_> {
        ValuationProjector {
            method: self.config.valuation_method,
            market_value: self.config.market_value,
            growth_rate: self.config.market_value_growth,
            cap_rate: self.config.cap_rate,
            exit_cap_rate: self.config.exit_cap_rate,
            acquisition_date: self.config.acquisition_date,
            disposition_date: self.config.disposition_date,
            disposition_value_override: None,
            construction_end: self.config.construction_end,
            analysis_start: self.config.analysis_date,
            noi: &self.noi,
            capex: &self.capex,
        }
    }

    /// One market value per analysis month.
    pub fn market_values(&self) -> Vec<f64> {
        self.projector().project(&self.months)
    }

    pub fn market_value_on(&self, date: NaiveDate) -> Result<f64, EngineError> {
        let index = self.month_index(date)?;
        Ok(self.market_values()[index])
    }

    /// Projected value of the month before the earliest loan foreclosure,
    /// recovered when the lender takes the asset. Zero when no loan
    /// forecloses.
    pub fn foreclosure_value(&self) -> Option<(NaiveDate, f64)> {
        for loan in self.loans.values() {
            if let Some(foreclosure) = loan.terms().foreclosure_date {
                let before = prior_month_end(foreclosure);
                match self.market_value_on(before) {
                    Ok(value) => return Some((foreclosure, value)),
                    Err(_) => {
                        warn!(
                            "{}: month before foreclosure {} is outside the analysis window",
                            self.config.name, foreclosure
                        );
                        return None;
                    }
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loan::{DayCount, LoanTerms};

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn base_config() -> PropertyConfig {
        PropertyConfig {
            id: "P-1".to_string(),
            name: "Riverfront Tower".to_string(),
            property_type: "Office".to_string(),
            acquisition_date: Some(d(2024, 1, 31)),
            disposition_date: Some(d(2026, 12, 31)),
            acquisition_cost: 10_000_000.0,
            disposition_price: 12_000_000.0,
            market_value: 10_000_000.0,
            analysis_date: d(2024, 1, 31),
            analysis_length: 48,
            valuation_method: ValuationMethod::Growth,
            ..PropertyConfig::default()
        }
    }

    #[test]
    fn test_invalid_ownership_rejected() {
        let mut config = base_config();
        config.ownership = 1.2;
        assert!(matches!(
            Property::new(config),
            Err(EngineError::InvalidOwnership(_))
        ));
    }

    #[test]
    fn test_month_grid_spans_the_analysis_window() {
        let property = Property::new(base_config()).unwrap();
        assert_eq!(property.months().len(), 48);
        assert_eq!(property.months()[0], d(2024, 1, 31));
        assert_eq!(property.months()[47], d(2027, 12, 31));
    }

    #[test]
    fn test_ownership_seeded_from_lifecycle_dates() {
        let property = Property::new(base_config()).unwrap();
        assert_eq!(property.ownership_share(d(2023, 12, 31)), 0.0);
        assert_eq!(property.ownership_share(d(2024, 1, 31)), 1.0);
        assert_eq!(property.ownership_share(d(2026, 12, 31)), 1.0);
        assert_eq!(property.ownership_share(d(2027, 1, 31)), 0.0);
    }

    #[test]
    fn test_duplicate_loan_rejected() {
        let mut property = Property::new(base_config()).unwrap();
        let terms = LoanTerms {
            loan_amount: 5_000_000.0,
            rate: 0.05,
            fund_date: d(2024, 1, 31),
            maturity_date: d(2026, 1, 31),
            day_count: DayCount::Actual360,
            interest_only_periods: 0,
            amortizing_periods: 360,
            commitment: None,
            prepayment_date: None,
            foreclosure_date: None,
            market_rate: None,
        };

        property.add_loan(Loan::new("L-1", terms.clone()).unwrap()).unwrap();
        assert!(matches!(
            property.add_loan(Loan::new("L-1", terms).unwrap()),
            Err(EngineError::DuplicateLoan(_))
        ));
    }

    #[test]
    fn test_noi_outside_window_rejected() {
        let mut property = Property::new(base_config()).unwrap();
        assert!(property.update_noi_by_date(d(2024, 6, 30), 50_000.0).is_ok());
        assert!(matches!(
            property.update_noi_by_date(d(2031, 6, 30), 50_000.0),
            Err(EngineError::OutsideAnalysisWindow(_))
        ));
    }
}
