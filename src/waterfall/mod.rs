//! Carried-interest waterfall and IRR root finding

mod carry;
pub mod irr;

pub use carry::{CarryWaterfall, CashFlowSeries, TierParams, WaterfallMetrics, WaterfallOutcome};
pub use irr::{periodic_irr, xirr, xirr_from_guess, xnpv};
