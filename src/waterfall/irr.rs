//! XNPV / XIRR for irregular-date cash flows
//!
//! Newton-Raphson root finding over the XNPV function, plus a periodic IRR
//! for evenly spaced monthly flows (used by the disposition optimizer).

use chrono::NaiveDate;
use log::warn;

/// Convergence tolerance for the XIRR Newton-Raphson solve
const XIRR_TOLERANCE: f64 = 1e-12;

/// Default initial guess for XIRR
const XIRR_GUESS: f64 = 0.1;

const MAX_ITERATIONS: usize = 100;

/// Round to 10 decimal places, matching the precision the waterfall math
/// was calibrated against.
pub(crate) fn round10(x: f64) -> f64 {
    (x * 1e10).round() / 1e10
}

/// Year fraction between two dates on an Actual/365 basis.
pub(crate) fn year_fraction(d: NaiveDate, d0: NaiveDate) -> f64 {
    (d - d0).num_days() as f64 / 365.0
}

/// Net present value of irregular-date cash flows.
///
/// Time is measured in Actual/365 year fractions from the first date.
/// Rates at or below -100% return infinity.
pub fn xnpv(rate: f64, cash_flows: &[f64], dates: &[NaiveDate]) -> f64 {
    if rate <= -1.0 {
        return f64::INFINITY;
    }
    if dates.is_empty() {
        return 0.0;
    }

    let d0 = dates[0];
    let total: f64 = cash_flows
        .iter()
        .zip(dates)
        .map(|(cf, &d)| cf / (1.0 + rate).powf(year_fraction(d, d0)))
        .sum();

    round10(total)
}

/// Analytic derivative of `xnpv` with respect to the rate.
fn xnpv_derivative(rate: f64, cash_flows: &[f64], dates: &[NaiveDate]) -> f64 {
    let d0 = dates[0];
    cash_flows
        .iter()
        .zip(dates)
        .map(|(cf, &d)| {
            let t = year_fraction(d, d0);
            -t * cf / (1.0 + rate).powf(t + 1.0)
        })
        .sum()
}

/// Internal rate of return for irregular-date cash flows.
///
/// Newton-Raphson on `xnpv` from the default 10% guess. Returns 0.0 for
/// empty input and on non-convergence: the waterfall needs a usable number
/// for every evaluation, so a failed solve degrades to zero rather than
/// propagating.
pub fn xirr(cash_flows: &[f64], dates: &[NaiveDate]) -> f64 {
    xirr_from_guess(cash_flows, dates, XIRR_GUESS)
}

/// `xirr` with an explicit starting guess.
pub fn xirr_from_guess(cash_flows: &[f64], dates: &[NaiveDate], guess: f64) -> f64 {
    if cash_flows.is_empty() || dates.is_empty() {
        return 0.0;
    }

    let mut rate = guess;
    for _ in 0..MAX_ITERATIONS {
        let npv = xnpv(rate, cash_flows, dates);
        if !npv.is_finite() {
            warn!("xirr solve left the valid rate domain; falling back to 0.0");
            return 0.0;
        }

        let dnpv = xnpv_derivative(rate, cash_flows, dates);
        if dnpv.abs() < 1e-20 || !dnpv.is_finite() {
            warn!("xirr derivative vanished at rate {rate}; falling back to 0.0");
            return 0.0;
        }

        let next = rate - npv / dnpv;
        if (next - rate).abs() < XIRR_TOLERANCE {
            return round10(next);
        }
        rate = next;
    }

    warn!("xirr did not converge within {MAX_ITERATIONS} iterations; falling back to 0.0");
    0.0
}

/// Periodic IRR for evenly spaced cash flows using Newton-Raphson with a
/// bisection fallback.
///
/// Returns the per-period rate, or None when no solution exists (no sign
/// change) or neither method converges.
pub fn periodic_irr(cash_flows: &[f64]) -> Option<f64> {
    if cash_flows.is_empty() {
        return None;
    }
    if cash_flows.iter().all(|&cf| cf.abs() < 1e-10) {
        return Some(0.0);
    }

    // A sign change is required for an IRR to exist
    let has_positive = cash_flows.iter().any(|&cf| cf > 1e-10);
    let has_negative = cash_flows.iter().any(|&cf| cf < -1e-10);
    if !has_positive || !has_negative {
        return None;
    }

    let mut rate = 0.05 / 12.0;
    let tolerance = 1e-10;

    for _ in 0..1000 {
        let (npv, dnpv) = npv_and_derivative(cash_flows, rate);

        if dnpv.abs() < 1e-20 {
            return periodic_irr_bisection(cash_flows);
        }

        let new_rate = (rate - npv / dnpv).clamp(-0.99, 10.0);

        if (new_rate - rate).abs() < tolerance {
            return Some(new_rate);
        }

        rate = new_rate;
    }

    periodic_irr_bisection(cash_flows)
}

/// NPV and its derivative at a periodic rate.
fn npv_and_derivative(cash_flows: &[f64], rate: f64) -> (f64, f64) {
    let mut npv = 0.0;
    let mut dnpv = 0.0;

    for (t, &cf) in cash_flows.iter().enumerate() {
        npv += cf / (1.0 + rate).powi(t as i32);
        if t > 0 {
            dnpv -= (t as f64) * cf / (1.0 + rate).powi(t as i32 + 1);
        }
    }

    (npv, dnpv)
}

fn npv_at_rate(cash_flows: &[f64], rate: f64) -> f64 {
    cash_flows
        .iter()
        .enumerate()
        .map(|(t, &cf)| cf / (1.0 + rate).powi(t as i32))
        .sum()
}

/// Fallback periodic IRR via bisection.
fn periodic_irr_bisection(cash_flows: &[f64]) -> Option<f64> {
    let mut low = -0.99_f64;
    let mut high = 10.0_f64;
    let tolerance = 1e-10;

    if npv_at_rate(cash_flows, low) * npv_at_rate(cash_flows, high) > 0.0 {
        return None;
    }

    for _ in 0..1000 {
        let mid = (low + high) / 2.0;
        let npv_mid = npv_at_rate(cash_flows, mid);

        if npv_mid.abs() < tolerance || (high - low) / 2.0 < tolerance {
            return Some(mid);
        }

        if npv_mid * npv_at_rate(cash_flows, low) < 0.0 {
            high = mid;
        } else {
            low = mid;
        }
    }

    None
}
