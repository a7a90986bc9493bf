//! Monthly closure engine
//!
//! Computes the CMV percentage for a closed month from total purchases and
//! the user-supplied revenue, classifies it against the restaurant's target,
//! and compares against the preceding period. The engine never infers
//! revenue: without one, the aggregate stays in `awaiting_revenue`.

use crate::error::{AgentError, Result};
use serde::{Deserialize, Serialize};

use super::round2;

/// Classification of a closed month's CMV.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CmvStatus {
    OnTarget,
    AboveTarget,
    Critical,
}

/// CMV above this percentage is critical regardless of the target.
const CRITICAL_CMV_PERCENT: f64 = 40.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClosureResult {
    pub cmv_percent: f64,
    pub status: CmvStatus,
    /// Percentage-point difference vs the preceding period's cmv_percent
    pub month_over_month_change: Option<f64>,
}

/// Monthly closure engine
pub struct ClosureEngine;

impl ClosureEngine {
    /// Close a month: compute and classify CMV.
    ///
    /// `target_percent` is caller-supplied configuration, `previous_cmv` the
    /// stored cmv_percent of the immediately preceding period if one exists.
    /// Errors when revenue is not positive; never divides by zero.
    pub fn close(
        total_purchases: f64,
        total_revenue: f64,
        target_percent: f64,
        previous_cmv: Option<f64>,
    ) -> Result<ClosureResult> {
        if total_revenue <= 0.0 {
            return Err(AgentError::InvalidAmount(format!(
                "revenue must be positive, got {}",
                total_revenue
            )));
        }
        if total_purchases < 0.0 {
            return Err(AgentError::InvalidAmount(format!(
                "purchases must not be negative, got {}",
                total_purchases
            )));
        }

        let cmv_percent = round2(total_purchases / total_revenue * 100.0);

        let status = if cmv_percent <= target_percent {
            CmvStatus::OnTarget
        } else if cmv_percent <= CRITICAL_CMV_PERCENT {
            CmvStatus::AboveTarget
        } else {
            CmvStatus::Critical
        };

        Ok(ClosureResult {
            cmv_percent,
            status,
            month_over_month_change: previous_cmv.map(|prev| round2(cmv_percent - prev)),
        })
    }

    /// The period immediately preceding (year, month).
    pub fn previous_period(year: i32, month: u32) -> (i32, u32) {
        if month > 1 {
            (year, month - 1)
        } else {
            (year - 1, 12)
        }
    }
}
