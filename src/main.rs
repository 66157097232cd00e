//! Portfolio Engine CLI
//!
//! Builds a loan from command-line terms, prints its amortization
//! schedule, and runs a sample two-tier carry waterfall over the deal
//! cash flows.

use chrono::NaiveDate;
use clap::Parser;

use portfolio_engine::waterfall::CashFlowSeries;
use portfolio_engine::{CarryWaterfall, DayCount, Loan, LoanTerms, TierParams};

#[derive(Parser)]
#[command(name = "portfolio_engine", about = "Loan schedule and carry waterfall demo")]
struct Args {
    /// Initial funded amount
    #[arg(long, default_value_t = 1_000_000.0)]
    amount: f64,

    /// Annual note rate (decimal)
    #[arg(long, default_value_t = 0.06)]
    rate: f64,

    #[arg(long, default_value = "2024-01-31")]
    fund_date: NaiveDate,

    #[arg(long, default_value = "2025-01-31")]
    maturity_date: NaiveDate,

    /// Day-count convention: Actual/360, 30/360, or Actual/365
    #[arg(long, default_value = "Actual/360")]
    day_count: String,

    /// Interest-only months after funding
    #[arg(long, default_value_t = 0)]
    interest_only: u32,

    /// Amortization term in months
    #[arg(long, default_value_t = 12)]
    amortizing: u32,

    /// LP share of the first waterfall tier
    #[arg(long, default_value_t = 0.8)]
    lp_ratio: f64,

    /// Annual hurdle of the first waterfall tier
    #[arg(long, default_value_t = 0.08)]
    hurdle: f64,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    println!("Portfolio Engine v0.1.0");
    println!("=======================\n");

    let terms = LoanTerms {
        loan_amount: args.amount,
        rate: args.rate,
        fund_date: args.fund_date,
        maturity_date: args.maturity_date,
        day_count: DayCount::parse(&args.day_count)?,
        interest_only_periods: args.interest_only,
        amortizing_periods: args.amortizing,
        commitment: None,
        prepayment_date: None,
        foreclosure_date: None,
        market_rate: None,
    };
    let loan = Loan::new("demo", terms)?;

    println!("Loan: {}", loan.id());
    println!("  Amount: ${:.2}", loan.terms().loan_amount);
    println!("  Rate: {:.2}%", loan.terms().rate * 100.0);
    println!("  Day count: {}", loan.terms().day_count.as_str());
    println!("  Level payment: ${:.2}", loan.amortizing_payment());
    println!();

    println!(
        "{:>12} {:>14} {:>12} {:>12} {:>12} {:>14}",
        "Date", "Beginning", "Draw", "Interest", "Principal", "Ending"
    );
    let schedule = loan.schedule();
    for (date, row) in schedule.iter() {
        println!(
            "{:>12} {:>14.2} {:>12.2} {:>12.2} {:>12.2} {:>14.2}",
            date.to_string(),
            row.beginning_balance,
            row.loan_draw,
            row.interest_payment,
            row.scheduled_principal_payment,
            row.ending_balance,
        );
    }
    println!();

    // Deal-level flows: capital out at funding, debt service back monthly
    let pairs: Vec<(NaiveDate, f64)> = schedule
        .iter()
        .map(|(&date, row)| {
            let cash_flow = row.interest_payment + row.scheduled_principal_payment
                + row.loan_paydown
                - row.loan_draw;
            (date, cash_flow)
        })
        .collect();
    let series = CashFlowSeries::from_pairs(pairs);

    let tiers = vec![
        TierParams::new(args.lp_ratio, args.hurdle)?,
        TierParams::new(0.7, 0.0)?,
    ];
    let metrics = CarryWaterfall::new(series, tiers)?.evaluate().metrics;

    println!("Waterfall");
    println!("  Deal XIRR: {:.4}%", metrics.deal_xirr * 100.0);
    println!("  LP XIRR: {:.4}%", metrics.lp_xirr * 100.0);
    println!("  GP XIRR: {:.4}%", metrics.gp_xirr * 100.0);
    println!("  Deal multiple: {:.4}x", metrics.deal_multiple);
    println!("  LP effective share: {:.4}", metrics.lp_effective_share);
    println!("  GP effective share: {:.4}", metrics.gp_effective_share);

    Ok(())
}
