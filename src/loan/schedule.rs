//! Loan amortization schedule generation
//!
//! A loan carries its commitment/draw/paydown event history; the monthly
//! schedule is regenerated in full from that history on every query.
//! Full recomputation is the consistency mechanism: there is no cached
//! derived state to drift out of sync with the events.
//!
//! Runtime bound violations (over-draws, over-paydowns, negative unfunded
//! commitment) are clipped to the nearest valid value and logged, never
//! raised, so a schedule always generates to completion.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use log::warn;
use serde::{Deserialize, Serialize};

use super::terms::LoanTerms;
use crate::dates::{end_of_month, month_sequence, months_between, prior_month_end};
use crate::error::EngineError;

/// One month of the loan schedule.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ScheduleRow {
    pub beginning_balance: f64,
    pub loan_draw: f64,
    pub loan_paydown: f64,
    pub interest_payment: f64,
    pub scheduled_principal_payment: f64,
    pub ending_balance: f64,
    pub encumbered: bool,
}

impl ScheduleRow {
    /// Fully zeroed row for foreclosed or paid-off months.
    fn zeroed() -> Self {
        Self::default()
    }
}

/// Ordered month-end to row mapping for one loan.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoanSchedule {
    rows: BTreeMap<NaiveDate, ScheduleRow>,
}

impl LoanSchedule {
    pub fn get(&self, date: NaiveDate) -> Option<&ScheduleRow> {
        self.rows.get(&date)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&NaiveDate, &ScheduleRow)> {
        self.rows.iter()
    }

    pub fn rows(&self) -> &BTreeMap<NaiveDate, ScheduleRow> {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.rows.keys().next().copied()
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.rows.keys().next_back().copied()
    }

    /// Present value of all cash flows strictly after `as_of`, discounted
    /// monthly at `annual_rate / 12` over elapsed whole months.
    pub fn present_value(&self, as_of: NaiveDate, annual_rate: f64) -> f64 {
        let monthly = 1.0 + annual_rate / 12.0;
        self.rows
            .iter()
            .filter(|(date, _)| **date > as_of)
            .map(|(date, row)| {
                let cash_flow = row.interest_payment
                    + row.scheduled_principal_payment
                    + row.loan_paydown
                    - row.loan_draw;
                cash_flow / monthly.powi(months_between(as_of, *date))
            })
            .sum()
    }
}

/// Standard annuity payment, or a straight-line split at zero rate.
fn level_payment(balance: f64, annual_rate: f64, periods: u32) -> f64 {
    if periods == 0 {
        return 0.0;
    }
    let monthly_rate = annual_rate / 12.0;
    if monthly_rate == 0.0 {
        balance / periods as f64
    } else {
        let factor = (1.0 + monthly_rate).powi(periods as i32);
        balance * (monthly_rate * factor) / (factor - 1.0)
    }
}

/// An amortizing or revolving loan with its draw/paydown event history.
#[derive(Debug, Clone)]
pub struct Loan {
    id: String,
    terms: LoanTerms,
    /// Funding date before month-end normalization (spread pricing looks
    /// up the treasury rate relative to the actual date)
    fund_date_actual: NaiveDate,
    amortizing_payment: f64,
    months: Vec<NaiveDate>,
    draws: BTreeMap<NaiveDate, f64>,
    paydowns: BTreeMap<NaiveDate, f64>,
}

impl Loan {
    /// Validate terms and set up the month grid from funding through
    /// maturity inclusive. All term dates are normalized to month-end.
    pub fn new(id: impl Into<String>, terms: LoanTerms) -> Result<Self, EngineError> {
        terms.validate()?;

        let fund_date_actual = terms.fund_date;
        let mut terms = terms;
        terms.fund_date = end_of_month(terms.fund_date);
        terms.maturity_date = end_of_month(terms.maturity_date);
        terms.prepayment_date = terms.prepayment_date.map(end_of_month);
        terms.foreclosure_date = terms.foreclosure_date.map(end_of_month);

        let span = months_between(terms.fund_date, terms.maturity_date) + 1;
        let months = month_sequence(terms.fund_date, span as usize);
        let amortizing_payment =
            level_payment(terms.loan_amount, terms.rate, terms.amortizing_periods);

        Ok(Self {
            id: id.into(),
            terms,
            fund_date_actual,
            amortizing_payment,
            months,
            draws: BTreeMap::new(),
            paydowns: BTreeMap::new(),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn terms(&self) -> &LoanTerms {
        &self.terms
    }

    pub fn fund_date_actual(&self) -> NaiveDate {
        self.fund_date_actual
    }

    pub fn amortizing_payment(&self) -> f64 {
        self.amortizing_payment
    }

    pub fn months(&self) -> &[NaiveDate] {
        &self.months
    }

    fn draw_on(&self, date: NaiveDate) -> f64 {
        self.draws.get(&date).copied().unwrap_or(0.0)
    }

    fn paydown_on(&self, date: NaiveDate) -> f64 {
        self.paydowns.get(&date).copied().unwrap_or(0.0)
    }

    /// Unfunded commitment per month: `max(0, prior - draw + paydown)`,
    /// seeded at `commitment - loan_amount` in the funding month. All
    /// zeros when no commitment is configured.
    pub fn unfunded_schedule(&self) -> BTreeMap<NaiveDate, f64> {
        let mut unfunded = BTreeMap::new();
        let Some(commitment) = self.terms.commitment else {
            for &month in &self.months {
                unfunded.insert(month, 0.0);
            }
            return unfunded;
        };

        let mut prior = 0.0;
        for (i, &month) in self.months.iter().enumerate() {
            let base = if i == 0 {
                commitment - self.terms.loan_amount
            } else {
                prior
            };
            let raw = base - self.draw_on(month) + self.paydown_on(month);
            if raw < 0.0 {
                warn!(
                    "{}: unfunded commitment clamped to zero on {} (was {:.2})",
                    self.id, month, raw
                );
            }
            let value = raw.max(0.0);
            unfunded.insert(month, value);
            prior = value;
        }
        unfunded
    }

    /// Request a draw. The request is clipped to the unfunded commitment
    /// as of the *prior* month; the applied amount is returned. Requests
    /// with no commitment configured, or no availability, apply nothing.
    pub fn add_loan_draw(&mut self, draw: f64, draw_date: NaiveDate) -> f64 {
        let draw_date = end_of_month(draw_date);

        if self.terms.commitment.is_none() {
            warn!("{}: no commitment set for the loan", self.id);
            return 0.0;
        }

        let prior_month = prior_month_end(draw_date);
        let allowable = self
            .unfunded_schedule()
            .get(&prior_month)
            .copied()
            .unwrap_or(0.0);

        let applied = draw.min(allowable);
        if applied <= 0.0 {
            warn!(
                "{}: no available commitment to draw on {}",
                self.id, draw_date
            );
            return 0.0;
        }
        if applied < draw {
            warn!(
                "{}: draw of {:.2} on {} exceeds the available commitment of {:.2}; \
                 draw will be limited to {:.2}",
                self.id, draw, draw_date, allowable, applied
            );
        }

        self.draws.insert(draw_date, applied);
        applied
    }

    /// Record a paydown, accumulating with any existing paydown in the
    /// same month. The total is clipped to `beginning_balance + loan_draw`
    /// for that month; the applied amount is returned.
    pub fn add_loan_paydown(&mut self, paydown: f64, paydown_date: NaiveDate) -> f64 {
        let paydown_date = end_of_month(paydown_date);

        let schedule = self.schedule();
        let Some(row) = schedule.get(paydown_date) else {
            warn!(
                "{}: paydown date {} is not in the loan schedule",
                self.id, paydown_date
            );
            return 0.0;
        };

        let allowable = row.beginning_balance + row.loan_draw;
        let mut applied = paydown;
        if applied > allowable {
            warn!(
                "{}: attempted paydown of {:.2} on {} exceeds the allowable amount of {:.2}; \
                 paydown will be limited to {:.2}",
                self.id, applied, paydown_date, allowable, allowable
            );
            applied = allowable;
        }

        let existing = self.paydown_on(paydown_date);
        if existing + applied > allowable {
            let limited = (allowable - existing).max(0.0);
            warn!(
                "{}: total paydown of {:.2} on {} exceeds the allowable amount of {:.2}; \
                 paydown will be limited to {:.2}",
                self.id,
                existing + applied,
                paydown_date,
                allowable,
                limited
            );
            applied = limited;
        }

        self.paydowns.insert(paydown_date, existing + applied);
        applied
    }

    /// Regenerate the full monthly schedule from terms and event history.
    pub fn schedule(&self) -> LoanSchedule {
        let mut rows = BTreeMap::new();
        let mut prior_date = self.terms.fund_date;
        let mut prior_ending = 0.0;
        let mut prepayment_done = false;

        for (i, &month) in self.months.iter().enumerate() {
            // Foreclosure zeroes this month and every month after it
            if let Some(foreclosure) = self.terms.foreclosure_date {
                if month >= foreclosure {
                    rows.insert(month, ScheduleRow::zeroed());
                    continue;
                }
            }

            // Funding month: the initial amount is the draw
            if i == 0 {
                let paydown = self.paydown_on(month);
                let row = ScheduleRow {
                    beginning_balance: 0.0,
                    loan_draw: self.terms.loan_amount,
                    loan_paydown: paydown,
                    interest_payment: 0.0,
                    scheduled_principal_payment: 0.0,
                    ending_balance: self.terms.loan_amount - paydown,
                    encumbered: true,
                };
                prior_date = month;
                prior_ending = row.ending_balance;
                rows.insert(month, row);
                continue;
            }

            // Once a prepayment has run the balance to zero, every later
            // month is a dead row
            if prepayment_done && prior_ending <= 0.0 {
                rows.insert(month, ScheduleRow::zeroed());
                continue;
            }

            let beginning = prior_ending.max(0.0);
            let draw = self.draw_on(month);
            let mut paydown = self.paydown_on(month);

            let interest =
                beginning * self.terms.rate * self.terms.day_count.fraction(prior_date, month);

            let scheduled_principal = if self.terms.amortizing_periods > 0
                && i as u32 > self.terms.interest_only_periods
            {
                (self.amortizing_payment - interest).max(0.0).min(beginning)
            } else {
                0.0
            };

            // Prepayment takes the balance out net of this month's
            // scheduled principal; the forced paydown replaces any
            // recorded one
            if let Some(prepayment) = self.terms.prepayment_date {
                if month == prepayment && !prepayment_done {
                    paydown = self.forced_paydown(
                        month,
                        beginning,
                        draw,
                        scheduled_principal,
                        "prepayment",
                    );
                    prepayment_done = true;
                }
            }

            // Maturity payoff, unless a prepayment already retired the loan
            if month == self.terms.maturity_date && !prepayment_done {
                paydown =
                    self.forced_paydown(month, beginning, draw, scheduled_principal, "maturity");
            }

            let ending = (beginning + draw - paydown - scheduled_principal).max(0.0);
            rows.insert(
                month,
                ScheduleRow {
                    beginning_balance: beginning,
                    loan_draw: draw,
                    loan_paydown: paydown,
                    interest_payment: interest,
                    scheduled_principal_payment: scheduled_principal,
                    ending_balance: ending,
                    encumbered: true,
                },
            );

            prior_date = month;
            prior_ending = ending;
        }

        LoanSchedule { rows }
    }

    fn forced_paydown(
        &self,
        month: NaiveDate,
        beginning: f64,
        draw: f64,
        scheduled_principal: f64,
        kind: &str,
    ) -> f64 {
        let mut amount = (beginning - scheduled_principal).max(0.0);
        let allowable = beginning + draw;
        if amount > allowable {
            warn!(
                "{}: attempted {kind} paydown of {:.2} on {} exceeds the allowable amount of \
                 {:.2}; paydown will be limited to {:.2}",
                self.id, amount, month, allowable, allowable
            );
            amount = allowable;
        }
        amount
    }

    /// Simple DCF market value: all cash flows strictly after `as_of`,
    /// discounted monthly at `discount_rate / 12` (the note rate when no
    /// rate is given).
    pub fn market_value(&self, as_of_date: NaiveDate, discount_rate: Option<f64>) -> f64 {
        let as_of = end_of_month(as_of_date);
        let rate = discount_rate.unwrap_or(self.terms.rate);
        self.schedule().present_value(as_of, rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loan::terms::DayCount;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn base_terms() -> LoanTerms {
        LoanTerms {
            loan_amount: 1_000_000.0,
            rate: 0.06,
            fund_date: d(2024, 1, 31),
            maturity_date: d(2025, 1, 31),
            day_count: DayCount::Actual360,
            interest_only_periods: 0,
            amortizing_periods: 12,
            commitment: None,
            prepayment_date: None,
            foreclosure_date: None,
            market_rate: None,
        }
    }

    fn assert_row_invariant(schedule: &LoanSchedule) {
        for (date, row) in schedule.iter() {
            let expected = (row.beginning_balance + row.loan_draw
                - row.loan_paydown
                - row.scheduled_principal_payment)
                .max(0.0);
            assert!(
                (row.ending_balance - expected).abs() < 1e-9,
                "{date}: ending {} != {}",
                row.ending_balance,
                expected
            );
        }
    }

    #[test]
    fn test_one_year_amortizing_loan() {
        let loan = Loan::new("L-1", base_terms()).unwrap();

        // Funding month plus 12 payment months
        let schedule = loan.schedule();
        assert_eq!(schedule.len(), 13);

        let first = schedule.get(d(2024, 1, 31)).unwrap();
        assert_eq!(first.beginning_balance, 0.0);
        assert_eq!(first.loan_draw, 1_000_000.0);
        assert_eq!(first.interest_payment, 0.0);

        // Standard annuity payment at 0.5% monthly over 12 periods
        let factor = 1.005_f64.powi(12);
        let expected = 1_000_000.0 * (0.005 * factor) / (factor - 1.0);
        assert!((loan.amortizing_payment() - expected).abs() < 1e-6);
        assert!((loan.amortizing_payment() - 86_066.0).abs() < 5.0);

        // The maturity payoff takes the remaining balance to exactly zero
        let last = schedule.get(d(2025, 1, 31)).unwrap();
        assert!(last.ending_balance.abs() < 1e-9);

        assert_row_invariant(&schedule);
    }

    #[test]
    fn test_interest_only_window() {
        let mut terms = base_terms();
        terms.interest_only_periods = 3;
        let loan = Loan::new("L-2", terms).unwrap();
        let schedule = loan.schedule();

        // Months 1-3 after funding pay no principal
        for month in [d(2024, 2, 29), d(2024, 3, 31), d(2024, 4, 30)] {
            assert_eq!(
                schedule.get(month).unwrap().scheduled_principal_payment,
                0.0
            );
        }
        assert!(schedule.get(d(2024, 5, 31)).unwrap().scheduled_principal_payment > 0.0);
    }

    #[test]
    fn test_actual_360_interest_accrual() {
        let loan = Loan::new("L-3", base_terms()).unwrap();
        let schedule = loan.schedule();

        // February 2024: 29 elapsed days on a $1M balance at 6%
        let feb = schedule.get(d(2024, 2, 29)).unwrap();
        let expected = 1_000_000.0 * 0.06 * 29.0 / 360.0;
        assert!((feb.interest_payment - expected).abs() < 1e-9);
    }

    #[test]
    fn test_thirty_360_interest_accrual() {
        let mut terms = base_terms();
        terms.day_count = DayCount::Thirty360;
        let loan = Loan::new("L-4", terms).unwrap();
        let schedule = loan.schedule();

        let feb = schedule.get(d(2024, 2, 29)).unwrap();
        let expected = 1_000_000.0 * 0.06 * 30.0 / 360.0;
        assert!((feb.interest_payment - expected).abs() < 1e-9);
    }

    #[test]
    fn test_zero_rate_straight_line() {
        let mut terms = base_terms();
        terms.rate = 0.0;
        let loan = Loan::new("L-5", terms).unwrap();

        assert!((loan.amortizing_payment() - 1_000_000.0 / 12.0).abs() < 1e-9);
    }

    #[test]
    fn test_foreclosure_zeroes_remaining_months() {
        let mut terms = base_terms();
        terms.foreclosure_date = Some(d(2024, 7, 31));
        let loan = Loan::new("L-6", terms).unwrap();
        let schedule = loan.schedule();

        // June still accrues normally
        let june = schedule.get(d(2024, 6, 30)).unwrap();
        assert!(june.beginning_balance > 0.0);
        assert!(june.encumbered);

        // July onward is fully zeroed and unencumbered
        for (date, row) in schedule.iter().filter(|(date, _)| **date >= d(2024, 7, 31)) {
            assert_eq!(*row, ScheduleRow::default(), "non-zero row at {date}");
            assert!(!row.encumbered);
        }
    }

    #[test]
    fn test_foreclosure_takes_precedence_over_prepayment() {
        let mut terms = base_terms();
        terms.foreclosure_date = Some(d(2024, 6, 30));
        terms.prepayment_date = Some(d(2024, 6, 30));
        let loan = Loan::new("L-7", terms).unwrap();
        let schedule = loan.schedule();

        let june = schedule.get(d(2024, 6, 30)).unwrap();
        assert_eq!(june.loan_paydown, 0.0);
        assert_eq!(june.ending_balance, 0.0);
        assert!(!june.encumbered);
    }

    #[test]
    fn test_prepayment_retires_the_loan() {
        let mut terms = base_terms();
        terms.prepayment_date = Some(d(2024, 7, 31));
        let loan = Loan::new("L-8", terms).unwrap();
        let schedule = loan.schedule();

        let july = schedule.get(d(2024, 7, 31)).unwrap();
        assert!(july.loan_paydown > 0.0);
        assert!(july.ending_balance.abs() < 1e-9);

        // Later months are dead rows
        let august = schedule.get(d(2024, 8, 31)).unwrap();
        assert_eq!(*august, ScheduleRow::default());
        assert!(!august.encumbered);

        assert_row_invariant(&schedule);
    }

    #[test]
    fn test_draw_clipped_to_unfunded_commitment() {
        let mut terms = base_terms();
        terms.commitment = Some(1_500_000.0);
        let mut loan = Loan::new("L-9", terms).unwrap();

        // Only $500k of commitment remains after the initial funding
        let applied = loan.add_loan_draw(600_000.0, d(2024, 3, 31));
        assert!((applied - 500_000.0).abs() < 1e-9);

        let schedule = loan.schedule();
        let march = schedule.get(d(2024, 3, 31)).unwrap();
        assert!((march.loan_draw - 500_000.0).abs() < 1e-9);
        assert_row_invariant(&schedule);

        // Nothing left to draw afterwards
        assert_eq!(loan.add_loan_draw(1.0, d(2024, 4, 30)), 0.0);
    }

    #[test]
    fn test_draw_without_commitment_applies_nothing() {
        let mut loan = Loan::new("L-10", base_terms()).unwrap();
        assert_eq!(loan.add_loan_draw(100_000.0, d(2024, 3, 31)), 0.0);
        assert_eq!(loan.schedule().get(d(2024, 3, 31)).unwrap().loan_draw, 0.0);
    }

    #[test]
    fn test_unfunded_commitment_never_negative() {
        let mut terms = base_terms();
        terms.commitment = Some(1_200_000.0);
        let mut loan = Loan::new("L-11", terms).unwrap();
        loan.add_loan_draw(200_000.0, d(2024, 2, 29));

        for (&month, &value) in loan.unfunded_schedule().iter() {
            assert!(value >= 0.0, "negative unfunded commitment on {month}");
        }
    }

    #[test]
    fn test_paydown_clipped_to_balance() {
        let mut terms = base_terms();
        terms.amortizing_periods = 0; // interest-only balloon
        let mut loan = Loan::new("L-12", terms).unwrap();

        let applied = loan.add_loan_paydown(2_000_000.0, d(2024, 6, 30));
        assert!((applied - 1_000_000.0).abs() < 1e-9);

        let schedule = loan.schedule();
        let june = schedule.get(d(2024, 6, 30)).unwrap();
        assert!((june.loan_paydown - 1_000_000.0).abs() < 1e-9);
        assert!(june.ending_balance.abs() < 1e-9);
        assert_row_invariant(&schedule);
    }

    #[test]
    fn test_paydown_accumulates_within_a_month() {
        let mut terms = base_terms();
        terms.amortizing_periods = 0;
        let mut loan = Loan::new("L-13", terms).unwrap();

        assert!((loan.add_loan_paydown(300_000.0, d(2024, 6, 30)) - 300_000.0).abs() < 1e-9);
        // Second paydown in the same month is limited by what remains
        assert!((loan.add_loan_paydown(800_000.0, d(2024, 6, 30)) - 700_000.0).abs() < 1e-9);

        let june = loan.schedule().get(d(2024, 6, 30)).copied().unwrap();
        assert!((june.loan_paydown - 1_000_000.0).abs() < 1e-9);
    }

    #[test]
    fn test_paydown_outside_schedule_is_ignored() {
        let mut loan = Loan::new("L-14", base_terms()).unwrap();
        assert_eq!(loan.add_loan_paydown(100.0, d(2030, 1, 31)), 0.0);
    }

    #[test]
    fn test_market_value_after_final_cash_flow_is_zero() {
        let loan = Loan::new("L-15", base_terms()).unwrap();
        assert_eq!(loan.market_value(d(2025, 1, 31), None), 0.0);
    }

    #[test]
    fn test_market_value_discounts_future_cash_flows() {
        let loan = Loan::new("L-16", base_terms()).unwrap();

        // Discounting at the note rate from the funding month: the PV of
        // the repayment stream sits near par
        let value = loan.market_value(d(2024, 1, 31), None);
        assert!(value > 990_000.0 && value < 1_010_000.0, "got {value}");

        // A higher discount rate lowers the value
        let discounted = loan.market_value(d(2024, 1, 31), Some(0.12));
        assert!(discounted < value);
    }
}
