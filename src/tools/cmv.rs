//! Menu item cost tool
//!
//! Resolves each recipe ingredient to a current unit cost (latest invoice
//! first, historical pricing as fallback), runs the food cost calculation
//! and writes the computed numbers back onto the menu item.

use crate::engines::{CmvEngine, CostSource, CostedLine};
use crate::error::AgentError;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use super::{Tool, ToolContext};

#[derive(Debug, Deserialize)]
struct CalculateCostArgs {
    item_name: String,
}

pub struct CalculateMenuItemCostTool;

#[async_trait]
impl Tool for CalculateMenuItemCostTool {
    fn name(&self) -> &str {
        "calculate_menu_item_cost"
    }

    fn description(&self) -> &str {
        "Calcula o food cost de um prato do cardápio a partir da ficha técnica, usando o preço \
         mais recente de cada ingrediente nas notas fiscais (ou o histórico de preços quando \
         não há nota)."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "item_name": {
                    "type": "string",
                    "description": "Nome (ou parte do nome) do prato no cardápio"
                }
            },
            "required": ["item_name"]
        })
    }

    async fn execute(&self, args: &Value, ctx: &ToolContext) -> crate::Result<Value> {
        let restaurant_id = ctx.require_restaurant()?;
        let args: CalculateCostArgs = serde_json::from_value(args.clone()).map_err(|e| {
            AgentError::InvalidToolArguments(format!("calculate_menu_item_cost: {}", e))
        })?;

        let mut item = ctx
            .store
            .menu_item_by_name(restaurant_id, &args.item_name)
            .await?
            .ok_or_else(|| {
                AgentError::ToolExecutionFailed(format!(
                    "menu item '{}' not found",
                    args.item_name
                ))
            })?;

        let mut costed = Vec::with_capacity(item.recipe.len());
        for line in &item.recipe {
            let (unit_cost, cost_source) = if let Some(cost) = ctx
                .store
                .latest_invoice_cost(restaurant_id, &line.ingredient)
                .await?
            {
                (Some(cost), Some(CostSource::InvoiceLatest))
            } else if let Some(cost) = ctx
                .store
                .historical_cost(restaurant_id, &line.ingredient)
                .await?
            {
                (Some(cost), Some(CostSource::PricingHistory))
            } else {
                (None, None)
            };

            costed.push(CostedLine {
                ingredient: line.ingredient.clone(),
                quantity_per_serving: line.quantity_per_serving,
                unit: line.unit.clone(),
                waste_percent: line.waste_percent,
                unit_cost,
                cost_source,
            });
        }

        let breakdown = CmvEngine::calculate(item.sale_price, &costed)?;

        item.food_cost = Some(breakdown.food_cost);
        item.food_cost_percent = Some(breakdown.food_cost_percent);
        item.contribution_margin = Some(breakdown.contribution_margin);
        item.profitability_tier = Some(breakdown.profitability_tier);

        info!(
            restaurant_id,
            item = %item.name,
            food_cost_percent = breakdown.food_cost_percent,
            tier = ?breakdown.profitability_tier,
            unresolved = breakdown.unresolved.len(),
            "menu item cost calculated"
        );

        let item_name = item.name.clone();
        ctx.store.save_menu_item_costs(item).await?;

        Ok(json!({
            "item_name": item_name,
            "breakdown": breakdown,
        }))
    }
}
