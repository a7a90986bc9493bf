//! Price trend engine
//!
//! Compares a newly observed invoice line against the most recent prior
//! observation for the same product and classifies the movement.

use crate::error::{AgentError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::round2;

/// Direction changes smaller than this (in percentage points) count as stable.
pub const STABILITY_EPSILON: f64 = 0.01;

/// One observed invoice line, a read-only snapshot of historical data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceObservation {
    pub product: String,
    pub quantity: f64,
    pub unit: String,
    pub unit_price: f64,
    pub observed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Up,
    Down,
    Stable,
    New,
}

/// Assessed movement for one product.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceTrend {
    pub product: String,
    /// None when there is no prior observation
    pub change_percent: Option<f64>,
    pub previous_price: Option<f64>,
    pub current_price: f64,
    pub direction: TrendDirection,
    pub is_significant: bool,
}

/// Price trend engine
pub struct PriceTrendEngine;

impl PriceTrendEngine {
    /// Assess the movement of `current` against the most recent prior
    /// observation, if any. `significance_threshold` is the externally
    /// configured alert threshold in percent.
    ///
    /// Pure function of its three inputs. Errors on non-positive prices
    /// rather than dividing by zero.
    pub fn assess(
        current: &PriceObservation,
        previous: Option<&PriceObservation>,
        significance_threshold: f64,
    ) -> Result<PriceTrend> {
        if current.unit_price <= 0.0 {
            return Err(AgentError::InvalidAmount(format!(
                "unit price must be positive, got {}",
                current.unit_price
            )));
        }

        let Some(previous) = previous else {
            return Ok(PriceTrend {
                product: current.product.clone(),
                change_percent: None,
                previous_price: None,
                current_price: current.unit_price,
                direction: TrendDirection::New,
                is_significant: false,
            });
        };

        if previous.unit_price <= 0.0 {
            return Err(AgentError::InvalidAmount(format!(
                "previous unit price must be positive, got {}",
                previous.unit_price
            )));
        }

        let change_percent =
            (current.unit_price - previous.unit_price) / previous.unit_price * 100.0;

        let direction = if change_percent.abs() <= STABILITY_EPSILON {
            TrendDirection::Stable
        } else if change_percent > 0.0 {
            TrendDirection::Up
        } else {
            TrendDirection::Down
        };

        Ok(PriceTrend {
            product: current.product.clone(),
            change_percent: Some(round2(change_percent)),
            previous_price: Some(previous.unit_price),
            current_price: current.unit_price,
            direction,
            is_significant: change_percent.abs() >= significance_threshold,
        })
    }
}
