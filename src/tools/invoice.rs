//! Invoice recording tool
//!
//! Persists a parsed invoice and assesses each line against the product's
//! price history, so the model can alert on significant movements in the
//! same turn the invoice lands.

use crate::engines::{PriceObservation, PriceTrend, PriceTrendEngine};
use crate::error::AgentError;
use crate::store::InvoiceRecord;
use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use super::{Tool, ToolContext};

#[derive(Debug, Deserialize)]
struct RecordInvoiceArgs {
    supplier: String,
    total_amount: f64,
    /// ISO date, e.g. "2025-07-14"
    invoice_date: String,
    #[serde(default)]
    lines: Vec<InvoiceLineArgs>,
}

#[derive(Debug, Deserialize)]
struct InvoiceLineArgs {
    product: String,
    quantity: f64,
    unit: String,
    unit_price: f64,
}

pub struct RecordInvoiceTool;

#[async_trait]
impl Tool for RecordInvoiceTool {
    fn name(&self) -> &str {
        "record_invoice"
    }

    fn description(&self) -> &str {
        "Registra uma nota fiscal de compra já extraída (fornecedor, total, data e itens) e \
         compara cada item com o histórico de preços do restaurante."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "supplier": { "type": "string", "description": "Nome do fornecedor" },
                "total_amount": { "type": "number", "description": "Valor total da nota em reais" },
                "invoice_date": { "type": "string", "description": "Data da nota no formato AAAA-MM-DD" },
                "lines": {
                    "type": "array",
                    "description": "Itens da nota",
                    "items": {
                        "type": "object",
                        "properties": {
                            "product": { "type": "string" },
                            "quantity": { "type": "number" },
                            "unit": { "type": "string" },
                            "unit_price": { "type": "number" }
                        },
                        "required": ["product", "quantity", "unit", "unit_price"]
                    }
                }
            },
            "required": ["supplier", "total_amount", "invoice_date"]
        })
    }

    async fn execute(&self, args: &Value, ctx: &ToolContext) -> crate::Result<Value> {
        let restaurant_id = ctx.require_restaurant()?;
        let args: RecordInvoiceArgs = serde_json::from_value(args.clone())
            .map_err(|e| AgentError::InvalidToolArguments(format!("record_invoice: {}", e)))?;

        if args.total_amount <= 0.0 {
            return Err(AgentError::InvalidAmount(format!(
                "invoice total must be positive, got {}",
                args.total_amount
            )));
        }

        let invoice_date = NaiveDate::parse_from_str(&args.invoice_date, "%Y-%m-%d")
            .map_err(|_| {
                AgentError::InvalidToolArguments(format!(
                    "record_invoice: invalid invoice_date '{}'",
                    args.invoice_date
                ))
            })?;
        let observed_at = Utc
            .from_utc_datetime(&invoice_date.and_hms_opt(12, 0, 0).unwrap_or_default());

        let lines: Vec<PriceObservation> = args
            .lines
            .iter()
            .map(|line| PriceObservation {
                product: line.product.clone(),
                quantity: line.quantity,
                unit: line.unit.clone(),
                unit_price: line.unit_price,
                observed_at,
            })
            .collect();

        // Assess trends against history before the new lines are recorded.
        let mut trends: Vec<PriceTrend> = Vec::new();
        for line in &lines {
            let previous = ctx
                .store
                .latest_observation_before(restaurant_id, &line.product, observed_at)
                .await?;
            let trend =
                PriceTrendEngine::assess(line, previous.as_ref(), ctx.significance_threshold)?;
            trends.push(trend);
        }

        let invoice = InvoiceRecord {
            id: Uuid::new_v4(),
            restaurant_id,
            supplier: args.supplier.clone(),
            total_amount: args.total_amount,
            invoice_date,
            lines,
        };
        let invoice_id = ctx.store.record_invoice(invoice).await?;

        ctx.sessions
            .update(&ctx.conversation_id, |s| {
                s.current_invoice_id = Some(invoice_id);
            })
            .await;

        let alerts: Vec<&PriceTrend> = trends.iter().filter(|t| t.is_significant).collect();
        info!(
            %invoice_id,
            supplier = %args.supplier,
            lines = trends.len(),
            alerts = alerts.len(),
            "invoice recorded"
        );

        Ok(json!({
            "invoice_id": invoice_id,
            "supplier": args.supplier,
            "total_amount": args.total_amount,
            "line_count": trends.len(),
            "price_alerts": alerts,
            "trends": trends,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::tests::test_context;

    fn invoice_args(supplier: &str, date: &str, unit_price: f64) -> Value {
        json!({
            "supplier": supplier,
            "total_amount": unit_price * 10.0,
            "invoice_date": date,
            "lines": [{
                "product": "Picanha",
                "quantity": 10.0,
                "unit": "kg",
                "unit_price": unit_price
            }]
        })
    }

    #[tokio::test]
    async fn test_first_invoice_line_is_new_product() {
        let (_store, ctx) = test_context(Some(1));
        let result = RecordInvoiceTool
            .execute(&invoice_args("Frigorífico Sul", "2025-07-01", 100.0), &ctx)
            .await
            .unwrap();

        assert_eq!(result["line_count"], 1);
        assert_eq!(result["trends"][0]["direction"], "new");
        assert_eq!(result["price_alerts"].as_array().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_significant_increase_raises_alert() {
        let (_store, ctx) = test_context(Some(1));
        RecordInvoiceTool
            .execute(&invoice_args("Frigorífico Sul", "2025-07-01", 100.0), &ctx)
            .await
            .unwrap();

        let result = RecordInvoiceTool
            .execute(&invoice_args("Frigorífico Sul", "2025-07-15", 115.0), &ctx)
            .await
            .unwrap();

        assert_eq!(result["trends"][0]["direction"], "up");
        assert_eq!(result["trends"][0]["change_percent"], 15.0);
        assert_eq!(result["price_alerts"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_invoice_id_tracked_in_session() {
        let (_store, ctx) = test_context(Some(1));
        RecordInvoiceTool
            .execute(&invoice_args("Atacadão", "2025-07-01", 50.0), &ctx)
            .await
            .unwrap();

        let session = ctx.sessions.get_or_create(&ctx.conversation_id).await;
        assert!(session.current_invoice_id.is_some());
    }

    #[tokio::test]
    async fn test_bad_date_rejected() {
        let (_store, ctx) = test_context(Some(1));
        let result = RecordInvoiceTool
            .execute(&invoice_args("Atacadão", "14/07/2025", 50.0), &ctx)
            .await;
        assert!(matches!(result, Err(AgentError::InvalidToolArguments(_))));
    }

    #[tokio::test]
    async fn test_requires_restaurant() {
        let (_store, ctx) = test_context(None);
        let result = RecordInvoiceTool
            .execute(&invoice_args("Atacadão", "2025-07-01", 50.0), &ctx)
            .await;
        assert!(matches!(result, Err(AgentError::ToolExecutionFailed(_))));
    }
}
