//! Monthly property cash flow assembly
//!
//! Combines the valuation projection, NOI/capex series, and aggregated
//! loan schedules into one row per analysis month, then restates those
//! rows at the stated ownership share and, for promote deals, applies
//! dilution against the effective share.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use log::error;
use serde::{Deserialize, Serialize};

use super::Property;
use crate::dates::add_months;

/// One analysis month of combined property and loan cash flows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropertyCashFlowRow {
    pub date: NaiveDate,
    pub market_value: f64,
    pub acquisition_cost: f64,
    pub disposition_price: f64,
    pub partner_buyout_cost: f64,
    pub partial_sale_proceeds: f64,
    pub foreclosure_value: f64,
    pub noi: f64,
    pub capex: f64,

    // Aggregated loan schedule columns
    pub beginning_balance: f64,
    pub loan_draw: f64,
    pub loan_paydown: f64,
    pub interest_payment: f64,
    pub scheduled_principal_payment: f64,
    pub ending_balance: f64,
    pub encumbered: bool,

    // Derived lines
    pub market_value_change: f64,
    pub gain_loss: f64,
    pub gross_income: f64,
    pub nav: f64,

    // Populated on ownership-adjusted rows
    pub ownership_share: f64,
    pub effective_share: f64,
    pub gain_loss_dilution: f64,
    pub gross_income_dilution: f64,
    pub nav_dilution: f64,
}

impl PropertyCashFlowRow {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            market_value: 0.0,
            acquisition_cost: 0.0,
            disposition_price: 0.0,
            partner_buyout_cost: 0.0,
            partial_sale_proceeds: 0.0,
            foreclosure_value: 0.0,
            noi: 0.0,
            capex: 0.0,
            beginning_balance: 0.0,
            loan_draw: 0.0,
            loan_paydown: 0.0,
            interest_payment: 0.0,
            scheduled_principal_payment: 0.0,
            ending_balance: 0.0,
            encumbered: false,
            market_value_change: 0.0,
            gain_loss: 0.0,
            gross_income: 0.0,
            nav: 0.0,
            ownership_share: 0.0,
            effective_share: 0.0,
            gain_loss_dilution: 0.0,
            gross_income_dilution: 0.0,
            nav_dilution: 0.0,
        }
    }

    /// Restate the row at a stated ownership share. Buyout costs and
    /// partial-sale proceeds are position-level amounts and stay whole.
    fn scale(&mut self, share: f64) {
        self.market_value *= share;
        self.acquisition_cost *= share;
        self.disposition_price *= share;
        self.foreclosure_value *= share;
        self.noi *= share;
        self.capex *= share;
        self.beginning_balance *= share;
        self.loan_draw *= share;
        self.loan_paydown *= share;
        self.interest_payment *= share;
        self.scheduled_principal_payment *= share;
        self.ending_balance *= share;
        self.market_value_change *= share;
        self.gain_loss *= share;
        self.gross_income *= share;
        self.nav *= share;
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct LoanAggregate {
    beginning_balance: f64,
    loan_draw: f64,
    loan_paydown: f64,
    interest_payment: f64,
    scheduled_principal_payment: f64,
    ending_balance: f64,
    encumbered: bool,
}

impl Property {
    /// Sum every loan's schedule by month; a month is encumbered when any
    /// loan's row is.
    fn loan_aggregates(&self) -> BTreeMap<NaiveDate, LoanAggregate> {
        let mut aggregates: BTreeMap<NaiveDate, LoanAggregate> = BTreeMap::new();
        for loan in self.loans() {
            for (&date, row) in loan.schedule().iter() {
                let agg = aggregates.entry(date).or_default();
                agg.beginning_balance += row.beginning_balance;
                agg.loan_draw += row.loan_draw;
                agg.loan_paydown += row.loan_paydown;
                agg.interest_payment += row.interest_payment;
                agg.scheduled_principal_payment += row.scheduled_principal_payment;
                agg.ending_balance += row.ending_balance;
                agg.encumbered |= row.encumbered;
            }
        }
        aggregates
    }

    /// One row per analysis month at full (100%) ownership.
    ///
    /// Missing NOI/capex months are imputed off the cap rate when one is
    /// configured: `noi = value * cap / 12`, capex as a percentage of
    /// that imputed NOI.
    pub fn combined_rows(&self) -> Vec<PropertyCashFlowRow> {
        let config = self.config();
        let market_values = self.market_values();
        let aggregates = self.loan_aggregates();
        let foreclosure = self.foreclosure_value();

        let mut rows = Vec::with_capacity(self.months().len());
        let mut prior_value: Option<f64> = None;

        for (idx, &month) in self.months().iter().enumerate() {
            let mut row = PropertyCashFlowRow::new(month);
            row.market_value = market_values[idx];

            if config.acquisition_date == Some(month) {
                row.acquisition_cost = config.acquisition_cost;
            }
            if config.disposition_date == Some(month) {
                row.disposition_price = config.disposition_price;
            }
            if let Some(buyout) = config.partner_buyout {
                if buyout.date == month {
                    row.partner_buyout_cost = buyout.cost;
                }
            }
            if let Some(sale) = config.partial_sale {
                if sale.date == month {
                    row.partial_sale_proceeds = sale.proceeds;
                }
            }
            if let Some((foreclosure_date, value)) = foreclosure {
                if foreclosure_date == month && value > 0.0 {
                    row.foreclosure_value = value;
                }
            }

            row.noi = self.noi().amount_or_zero(month);
            row.capex = self.capex().amount_or_zero(month);
            if let Some(cap_rate) = config.cap_rate {
                if row.noi == 0.0 {
                    row.noi = row.market_value * cap_rate / 12.0;
                }
                if row.capex == 0.0 {
                    row.capex =
                        row.market_value * cap_rate / 12.0 * config.capex_percent_of_noi;
                }
            }

            if let Some(agg) = aggregates.get(&month) {
                row.beginning_balance = agg.beginning_balance;
                row.loan_draw = agg.loan_draw;
                row.loan_paydown = agg.loan_paydown;
                row.interest_payment = agg.interest_payment;
                row.scheduled_principal_payment = agg.scheduled_principal_payment;
                row.ending_balance = agg.ending_balance;
                row.encumbered = agg.encumbered;
            }
            if config.encumbered {
                row.encumbered = true;
            }

            row.market_value_change = match prior_value {
                Some(prior) => row.market_value - prior,
                None => 0.0,
            };
            row.gain_loss = row.market_value_change - row.capex - row.partner_buyout_cost
                + row.disposition_price
                - row.acquisition_cost
                + row.partial_sale_proceeds
                + row.foreclosure_value;
            row.gross_income = row.noi - row.interest_payment;
            row.nav = row.market_value - row.ending_balance;

            prior_value = Some(row.market_value);
            rows.push(row);
        }

        rows
    }

    /// Rows restated at the stated ownership share, with promote dilution
    /// applied when the property carries one.
    ///
    /// Rows before acquisition are dropped. On a buyout or partial-sale
    /// month the market value is restated to the post-event share so the
    /// step change lands in the event month rather than the one after.
    pub fn ownership_adjusted_rows(
        &self,
    ) -> Result<Vec<PropertyCashFlowRow>, crate::error::EngineError> {
        let config = self.config();
        let ownership = self.ownership_series();

        let mut rows = self.combined_rows();
        if let Some(acquisition) = config.acquisition_date {
            rows.retain(|row| row.date >= acquisition);
        }

        for row in rows.iter_mut() {
            let share = ownership.get(&row.date).copied().unwrap_or(0.0);
            row.ownership_share = share;
            row.scale(share);
        }

        let event_dates = [
            config.partner_buyout.map(|b| b.date),
            config.partial_sale.map(|s| s.date),
        ];
        for event_date in event_dates.into_iter().flatten() {
            let next_month = add_months(event_date, 1);
            let share_next = rows
                .iter()
                .find(|row| row.date == next_month)
                .map(|row| row.ownership_share);
            if let (Some(share_next), Some(row)) = (
                share_next,
                rows.iter_mut().find(|row| row.date == event_date),
            ) {
                row.market_value = if row.ownership_share != 0.0 {
                    row.market_value / row.ownership_share * share_next
                } else {
                    0.0
                };
            }
        }

        if config.promote {
            self.apply_dilution(&mut rows)?;
        }

        for row in rows.iter_mut() {
            if row.ownership_share == 1.0 {
                row.effective_share = 1.0;
            }
        }

        Ok(rows)
    }

    /// Cover monthly construction deficits from the equity commitment
    /// first, then loan draws; whatever remains is logged and carried as
    /// an uncovered capital call. Returns the unfunded equity balance per
    /// month. Only meaningful while a construction window exists.
    pub fn fund_deficits(&mut self) -> Vec<f64> {
        let months = self.months().to_vec();
        if self.config().construction_end.is_none() {
            return vec![0.0; months.len()];
        }

        let name = self.config().name.clone();
        let loan_ids: Vec<String> = self.loans().map(|loan| loan.id().to_string()).collect();
        let mut unfunded = self.config().equity_commitment.unwrap_or(0.0);
        let mut balances = Vec::with_capacity(months.len());

        for month in months {
            let net_cash_flow =
                self.noi().amount_or_zero(month) - self.capex().amount_or_zero(month);
            let mut deficit = (-net_cash_flow).max(0.0);

            let equity_contribution = deficit.min(unfunded.max(0.0));
            unfunded -= equity_contribution;
            deficit -= equity_contribution;
            self.add_promote_cash_flow(month, -equity_contribution);

            if deficit > 0.0 {
                for loan_id in &loan_ids {
                    let drawn = self
                        .add_loan_draw(loan_id, deficit, month)
                        .unwrap_or(0.0);
                    deficit -= drawn;
                    if deficit <= 0.0 {
                        break;
                    }
                }
            }

            if deficit > 0.0 {
                error!("{name}: remaining deficit on {month}: {deficit:.2}");
                self.add_promote_cash_flow(month, -deficit);
            }

            balances.push(unfunded);
        }

        balances
    }

    /// NOI over unencumbered months in the date range, inclusive.
    pub fn unencumbered_noi(&self, beg_date: NaiveDate, end_date: NaiveDate) -> f64 {
        self.combined_rows()
            .iter()
            .filter(|row| row.date >= beg_date && row.date <= end_date && !row.encumbered)
            .map(|row| row.noi)
            .sum()
    }
}
