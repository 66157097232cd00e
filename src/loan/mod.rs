//! Loan modeling: terms, amortization schedules, and pricing

mod schedule;
mod terms;
mod valuation;

pub use schedule::{Loan, LoanSchedule, ScheduleRow};
pub use terms::{DayCount, LoanTerms};
pub use valuation::{value_loan, LoanValue};
