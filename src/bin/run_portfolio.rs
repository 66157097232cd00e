//! Batch loan valuation across a portfolio
//!
//! Prices every loan in parallel off a shared treasury curve and reports
//! schedule totals. Supports JSON output for API integration via --json.
//! Accepts config via environment variables:
//!   LOAN_COUNT, BASE_RATE, TREASURY_RATE, AS_OF_DATE

use std::env;
use std::time::Instant;

use chrono::NaiveDate;
use rayon::prelude::*;
use serde::Serialize;

use portfolio_engine::loan::value_loan;
use portfolio_engine::{DayCount, Loan, LoanTerms, RateCurve};

#[derive(Serialize)]
struct PortfolioResponse {
    loan_count: usize,
    as_of_date: NaiveDate,
    total_market_value: f64,
    total_interest: f64,
    total_principal: f64,
    loans: Vec<LoanSummary>,
    execution_time_ms: u64,
}

#[derive(Serialize)]
struct LoanSummary {
    id: String,
    rate: f64,
    market_value: f64,
    discount_rate: f64,
    spread: f64,
    total_interest: f64,
    total_principal: f64,
}

fn sample_loans(count: usize, base_rate: f64) -> Vec<Loan> {
    (0..count)
        .map(|i| {
            let terms = LoanTerms {
                loan_amount: 1_000_000.0 + 250_000.0 * i as f64,
                rate: base_rate + 0.0025 * (i % 8) as f64,
                fund_date: NaiveDate::from_ymd_opt(2024, 1 + (i % 6) as u32, 15)
                    .expect("static sample dates are valid"),
                maturity_date: NaiveDate::from_ymd_opt(2029, 1 + (i % 6) as u32, 15)
                    .expect("static sample dates are valid"),
                day_count: DayCount::Actual360,
                interest_only_periods: (i % 3) as u32 * 6,
                amortizing_periods: 360,
                commitment: None,
                prepayment_date: None,
                foreclosure_date: None,
                market_rate: None,
            };
            Loan::new(format!("L-{i:03}"), terms).expect("static sample terms are valid")
        })
        .collect()
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let json_output = env::args().any(|arg| arg == "--json");
    let start = Instant::now();

    let loan_count: usize = env::var("LOAN_COUNT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(24);
    let base_rate: f64 = env::var("BASE_RATE")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(0.055);
    let treasury_rate: f64 = env::var("TREASURY_RATE")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(0.042);
    let as_of_date: NaiveDate = env::var("AS_OF_DATE")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or_else(|| NaiveDate::from_ymd_opt(2025, 6, 30).expect("static date is valid"));

    let curve = RateCurve::from_pairs([(
        NaiveDate::from_ymd_opt(2023, 1, 2).expect("static date is valid"),
        treasury_rate,
    )]);

    let loans = sample_loans(loan_count, base_rate);

    let summaries: Vec<LoanSummary> = loans
        .par_iter()
        .map(|loan| {
            let value = value_loan(loan, as_of_date, &curve)
                .expect("flat curve covers every lookup date");
            let schedule = loan.schedule();
            let total_interest: f64 =
                schedule.iter().map(|(_, row)| row.interest_payment).sum();
            let total_principal: f64 = schedule
                .iter()
                .map(|(_, row)| row.scheduled_principal_payment + row.loan_paydown)
                .sum();

            LoanSummary {
                id: loan.id().to_string(),
                rate: loan.terms().rate,
                market_value: value.market_value,
                discount_rate: value.discount_rate,
                spread: value.spread,
                total_interest,
                total_principal,
            }
        })
        .collect();

    let response = PortfolioResponse {
        loan_count: summaries.len(),
        as_of_date,
        total_market_value: summaries.iter().map(|s| s.market_value).sum(),
        total_interest: summaries.iter().map(|s| s.total_interest).sum(),
        total_principal: summaries.iter().map(|s| s.total_principal).sum(),
        loans: summaries,
        execution_time_ms: start.elapsed().as_millis() as u64,
    };

    if json_output {
        println!("{}", serde_json::to_string_pretty(&response)?);
    } else {
        println!("Portfolio valuation as of {}", response.as_of_date);
        println!("  Loans: {}", response.loan_count);
        println!("  Total market value: ${:.2}", response.total_market_value);
        println!("  Total interest: ${:.2}", response.total_interest);
        println!("  Total principal: ${:.2}", response.total_principal);
        println!("  Elapsed: {}ms", response.execution_time_ms);
        println!();
        for loan in &response.loans {
            println!(
                "  {} rate {:.3}% spread {:.3}% value ${:.2}",
                loan.id,
                loan.rate * 100.0,
                loan.spread * 100.0,
                loan.market_value
            );
        }
    }

    Ok(())
}
