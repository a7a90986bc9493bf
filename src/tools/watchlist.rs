//! Price watchlist tools
//!
//! Owners track a handful of volatile products; the watchlist pins each one
//! with an alert threshold and the latest known price as reference.
//! `check_watchlist_alerts` compares every watched product's newest observed
//! price against that reference, using the entry's own threshold, and moves
//! the reference forward.

use crate::engines::{PriceObservation, PriceTrendEngine};
use crate::error::AgentError;
use crate::store::WatchlistEntry;
use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use super::{Tool, ToolContext};

#[derive(Debug, Deserialize)]
struct AddWatchlistArgs {
    product: String,
    threshold_percent: Option<f64>,
}

pub struct AddWatchlistItemTool;

#[async_trait]
impl Tool for AddWatchlistItemTool {
    fn name(&self) -> &str {
        "add_watchlist_item"
    }

    fn description(&self) -> &str {
        "Adiciona um produto à lista de monitoramento de preços do restaurante, com um limite \
         de variação para alertas."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "product": {
                    "type": "string",
                    "description": "Nome do produto a monitorar"
                },
                "threshold_percent": {
                    "type": "number",
                    "description": "Variação percentual que dispara alerta (padrão: limite global)"
                }
            },
            "required": ["product"]
        })
    }

    async fn execute(&self, args: &Value, ctx: &ToolContext) -> crate::Result<Value> {
        let restaurant_id = ctx.require_restaurant()?;
        let args: AddWatchlistArgs = serde_json::from_value(args.clone())
            .map_err(|e| AgentError::InvalidToolArguments(format!("add_watchlist_item: {}", e)))?;

        let threshold = args.threshold_percent.unwrap_or(ctx.significance_threshold);
        if threshold <= 0.0 {
            return Err(AgentError::InvalidAmount(format!(
                "threshold must be positive, got {}",
                threshold
            )));
        }

        // Latest observed price anchors future comparisons.
        let reference_price = ctx
            .store
            .latest_invoice_cost(restaurant_id, &args.product)
            .await?;

        let entry = WatchlistEntry {
            id: Uuid::new_v4(),
            restaurant_id,
            product: args.product.clone(),
            threshold_percent: threshold,
            reference_price,
            created_at: Utc::now(),
        };
        let entry_id = entry.id;
        ctx.store.add_watchlist_entry(entry).await?;

        info!(restaurant_id, product = %args.product, threshold, "watchlist entry added");

        Ok(json!({
            "entry_id": entry_id,
            "product": args.product,
            "threshold_percent": threshold,
            "reference_price": reference_price,
        }))
    }
}

pub struct GetWatchlistTool;

#[async_trait]
impl Tool for GetWatchlistTool {
    fn name(&self) -> &str {
        "get_watchlist"
    }

    fn description(&self) -> &str {
        "Lista os produtos que o restaurante está monitorando e seus limites de alerta."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {},
            "required": []
        })
    }

    async fn execute(&self, _args: &Value, ctx: &ToolContext) -> crate::Result<Value> {
        let restaurant_id = ctx.require_restaurant()?;
        let entries = ctx.store.watchlist(restaurant_id).await?;

        let items: Vec<Value> = entries
            .iter()
            .map(|e| {
                json!({
                    "product": e.product,
                    "threshold_percent": e.threshold_percent,
                    "reference_price": e.reference_price,
                    "since": e.created_at.date_naive(),
                })
            })
            .collect();

        Ok(json!({
            "count": items.len(),
            "items": items,
        }))
    }
}

pub struct CheckWatchlistAlertsTool;

#[async_trait]
impl Tool for CheckWatchlistAlertsTool {
    fn name(&self) -> &str {
        "check_watchlist_alerts"
    }

    fn description(&self) -> &str {
        "Verifica os produtos monitorados: compara o preço mais recente de cada um com o preço \
         de referência e avisa quando a variação passa do limite daquele produto."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {},
            "required": []
        })
    }

    async fn execute(&self, _args: &Value, ctx: &ToolContext) -> crate::Result<Value> {
        let restaurant_id = ctx.require_restaurant()?;
        let entries = ctx.store.watchlist(restaurant_id).await?;

        let mut alerts = Vec::new();
        let mut checked = 0usize;

        for entry in &entries {
            let Some(latest) = ctx
                .store
                .latest_observation_before(restaurant_id, &entry.product, Utc::now())
                .await?
            else {
                continue;
            };
            checked += 1;

            // The stored reference is the baseline; per-entry threshold wins
            // over the global one.
            let baseline = entry.reference_price.map(|price| PriceObservation {
                product: entry.product.clone(),
                quantity: 0.0,
                unit: latest.unit.clone(),
                unit_price: price,
                observed_at: entry.created_at,
            });
            let trend =
                PriceTrendEngine::assess(&latest, baseline.as_ref(), entry.threshold_percent)?;

            if trend.is_significant {
                info!(
                    restaurant_id,
                    product = %entry.product,
                    change = ?trend.change_percent,
                    threshold = entry.threshold_percent,
                    "watchlist alert"
                );
                alerts.push(json!({
                    "product": entry.product,
                    "threshold_percent": entry.threshold_percent,
                    "trend": trend,
                }));
            }

            if entry.reference_price != Some(latest.unit_price) {
                ctx.store
                    .update_watchlist_reference(entry.id, latest.unit_price)
                    .await?;
            }
        }

        Ok(json!({
            "watched": entries.len(),
            "checked": checked,
            "alerts": alerts,
        }))
    }
}
