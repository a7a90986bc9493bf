//! Deterministic financial engines
//!
//! Pure calculators invoked by tool handlers. No hidden state, no I/O: each
//! call is a function of its supplied inputs, so results are reproducible and
//! auditable. Callers persist the outputs.

pub mod closure;
pub mod cmv;
pub mod price_trend;

pub use closure::{ClosureEngine, ClosureResult, CmvStatus};
pub use cmv::{CmvBreakdown, CmvEngine, CostSource, CostedLine, ProfitabilityTier};
pub use price_trend::{PriceObservation, PriceTrend, PriceTrendEngine, TrendDirection};

/// Round to two decimal places, the precision used across reports.
pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
