//! Portfolio Engine - cash flow projection for real estate debt and equity
//!
//! This library provides:
//! - Amortizing/revolving loan schedules with draw and paydown tracking
//! - Tiered carried-interest waterfalls solved via XIRR
//! - Property valuation projection and ownership-dilution analysis
//! - Treasury-spread loan pricing from pre-fetched rate curves
//! - Preferred equity overlays on loan schedules

pub mod dates;
pub mod error;
pub mod loan;
pub mod market;
pub mod preferred;
pub mod property;
pub mod waterfall;

// Re-export commonly used types
pub use error::EngineError;
pub use loan::{DayCount, Loan, LoanSchedule, LoanTerms, ScheduleRow};
pub use market::{MonthlySeries, RateCurve};
pub use preferred::PreferredEquity;
pub use property::{OwnershipTimeline, Property, PropertyConfig, ValuationMethod};
pub use waterfall::{CarryWaterfall, CashFlowSeries, TierParams, WaterfallMetrics};
