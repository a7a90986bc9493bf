//! CMV (food cost) engine
//!
//! Computes the food cost of a menu item from its recipe lines, each already
//! resolved to a current unit cost by the caller. Lines without a resolved
//! cost are excluded from the sum and flagged so the caller can warn about
//! partial data.

use crate::error::{AgentError, Result};
use serde::{Deserialize, Serialize};

use super::round2;

/// Where a unit cost came from, in resolution-priority order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CostSource {
    InvoiceLatest,
    PricingHistory,
}

/// One recipe line with the caller-resolved unit cost attached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostedLine {
    pub ingredient: String,
    pub quantity_per_serving: f64,
    pub unit: String,
    pub waste_percent: f64,
    /// None when no cost could be resolved
    pub unit_cost: Option<f64>,
    pub cost_source: Option<CostSource>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProfitabilityTier {
    Negative,
    Low,
    Medium,
    High,
}

/// Per-ingredient cost detail in the result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineCost {
    pub ingredient: String,
    pub quantity_per_serving: f64,
    pub unit: String,
    pub waste_percent: f64,
    pub unit_cost: f64,
    pub cost_per_serving: f64,
    pub adjusted_cost_per_serving: f64,
    pub cost_source: CostSource,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CmvBreakdown {
    pub sale_price: f64,
    pub food_cost: f64,
    pub food_cost_percent: f64,
    pub contribution_margin: f64,
    pub profitability_tier: ProfitabilityTier,
    pub lines: Vec<LineCost>,
    /// Ingredients excluded from the sum for lack of a resolved cost
    pub unresolved: Vec<String>,
}

/// CMV engine
pub struct CmvEngine;

impl CmvEngine {
    /// Compute the food cost breakdown for one menu item.
    ///
    /// Errors when `sale_price` is not positive; never divides by zero.
    pub fn calculate(sale_price: f64, lines: &[CostedLine]) -> Result<CmvBreakdown> {
        if sale_price <= 0.0 {
            return Err(AgentError::InvalidAmount(format!(
                "sale price must be positive, got {}",
                sale_price
            )));
        }

        let mut food_cost = 0.0;
        let mut costed = Vec::new();
        let mut unresolved = Vec::new();

        for line in lines {
            if line.waste_percent < 0.0 {
                return Err(AgentError::InvalidAmount(format!(
                    "waste percent must not be negative for {}",
                    line.ingredient
                )));
            }

            match (line.unit_cost, line.cost_source) {
                (Some(unit_cost), Some(source)) => {
                    let cost_per_serving = line.quantity_per_serving * unit_cost;
                    let adjusted = cost_per_serving * (1.0 + line.waste_percent / 100.0);
                    food_cost += adjusted;

                    costed.push(LineCost {
                        ingredient: line.ingredient.clone(),
                        quantity_per_serving: line.quantity_per_serving,
                        unit: line.unit.clone(),
                        waste_percent: line.waste_percent,
                        unit_cost,
                        cost_per_serving: round2(cost_per_serving),
                        adjusted_cost_per_serving: round2(adjusted),
                        cost_source: source,
                    });
                }
                _ => unresolved.push(line.ingredient.clone()),
            }
        }

        let food_cost_percent = food_cost / sale_price * 100.0;

        Ok(CmvBreakdown {
            sale_price,
            food_cost: round2(food_cost),
            food_cost_percent: round2(food_cost_percent),
            contribution_margin: round2(sale_price - food_cost),
            profitability_tier: tier_for(food_cost_percent),
            lines: costed,
            unresolved,
        })
    }
}

/// Fixed tier breakpoints; exact boundaries fall into the better tier.
fn tier_for(food_cost_percent: f64) -> ProfitabilityTier {
    if food_cost_percent > 40.0 {
        ProfitabilityTier::Negative
    } else if food_cost_percent > 35.0 {
        ProfitabilityTier::Low
    } else if food_cost_percent > 28.0 {
        ProfitabilityTier::Medium
    } else {
        ProfitabilityTier::High
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(ingredient: &str, qty: f64, waste: f64, unit_cost: Option<f64>) -> CostedLine {
        CostedLine {
            ingredient: ingredient.to_string(),
            quantity_per_serving: qty,
            unit: "kg".to_string(),
            waste_percent: waste,
            unit_cost,
            cost_source: unit_cost.map(|_| CostSource::InvoiceLatest),
        }
    }

    #[test]
    fn test_single_ingredient_breakdown() {
        // 0.2kg at 25/kg with 10% waste against a 50 sale price
        let result =
            CmvEngine::calculate(50.0, &[line("picanha", 0.2, 10.0, Some(25.0))]).unwrap();

        assert_eq!(result.lines.len(), 1);
        assert_eq!(result.lines[0].cost_per_serving, 5.0);
        assert_eq!(result.lines[0].adjusted_cost_per_serving, 5.5);
        assert_eq!(result.food_cost, 5.5);
        assert_eq!(result.food_cost_percent, 11.0);
        assert_eq!(result.contribution_margin, 44.5);
        assert_eq!(result.profitability_tier, ProfitabilityTier::High);
    }

    #[test]
    fn test_zero_sale_price_is_error() {
        let result = CmvEngine::calculate(0.0, &[line("arroz", 0.1, 0.0, Some(8.0))]);
        assert!(matches!(result, Err(AgentError::InvalidAmount(_))));
    }

    #[test]
    fn test_unresolved_lines_flagged_not_summed() {
        let result = CmvEngine::calculate(
            50.0,
            &[
                line("picanha", 0.2, 10.0, Some(25.0)),
                line("tempero da casa", 0.01, 0.0, None),
            ],
        )
        .unwrap();

        assert_eq!(result.food_cost, 5.5);
        assert_eq!(result.unresolved, vec!["tempero da casa"]);
        assert_eq!(result.lines.len(), 1);
    }

    #[test]
    fn test_tier_boundaries_fall_into_better_tier() {
        // food_cost_percent exactly 40 / 35 / 28
        let at = |pct: f64| {
            CmvEngine::calculate(100.0, &[line("x", 1.0, 0.0, Some(pct))])
                .unwrap()
                .profitability_tier
        };
        assert_eq!(at(40.0), ProfitabilityTier::Low);
        assert_eq!(at(40.01), ProfitabilityTier::Negative);
        assert_eq!(at(35.0), ProfitabilityTier::Medium);
        assert_eq!(at(28.0), ProfitabilityTier::High);
        assert_eq!(at(28.01), ProfitabilityTier::Medium);
    }

    #[test]
    fn test_waste_factor_applied_per_line() {
        let result = CmvEngine::calculate(
            100.0,
            &[
                line("carne", 0.3, 20.0, Some(30.0)),
                line("arroz", 0.15, 0.0, Some(8.0)),
            ],
        )
        .unwrap();

        // 0.3*30*1.2 = 10.8; 0.15*8 = 1.2
        assert_eq!(result.lines[0].adjusted_cost_per_serving, 10.8);
        assert_eq!(result.lines[1].adjusted_cost_per_serving, 1.2);
        assert_eq!(result.food_cost, 12.0);
        assert_eq!(result.food_cost_percent, 12.0);
    }

    #[test]
    fn test_negative_waste_is_error() {
        let result = CmvEngine::calculate(50.0, &[line("carne", 0.2, -5.0, Some(25.0))]);
        assert!(result.is_err());
    }
}
