//! Monthly closure tools
//!
//! Four tools drive the closure flow: open the period aggregate, record the
//! user-supplied revenue, generate the final report, and list past reports.
//! The aggregate stays in `awaiting_revenue` until the user provides the
//! month's revenue; the pipeline never infers it.

use crate::engines::{ClosureEngine, CmvStatus};
use crate::error::AgentError;
use crate::store::{ClosureReport, ReportStatus, SupplierTotal};
use async_trait::async_trait;
use chrono::{Datelike, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use super::{Tool, ToolContext};

const TOP_SUPPLIER_LIMIT: usize = 3;
const DEFAULT_HISTORY_LIMIT: usize = 6;

/// Days into a month during which "fechar o mês" still means the previous one.
const PREVIOUS_MONTH_GRACE_DAYS: u32 = 10;

#[derive(Debug, Deserialize, Default)]
struct PeriodArgs {
    year: Option<i32>,
    month: Option<u32>,
}

/// Resolve the period a closure tool should act on. Explicit arguments win;
/// otherwise early in a month the previous period is assumed, since that is
/// the month owners are still closing.
fn resolve_period(args: &PeriodArgs) -> crate::Result<(i32, u32)> {
    if let (Some(year), Some(month)) = (args.year, args.month) {
        if !(1..=12).contains(&month) {
            return Err(AgentError::InvalidToolArguments(format!(
                "month must be between 1 and 12, got {}",
                month
            )));
        }
        return Ok((year, month));
    }

    let today = Utc::now().date_naive();
    if today.day() <= PREVIOUS_MONTH_GRACE_DAYS {
        Ok(ClosureEngine::previous_period(today.year(), today.month()))
    } else {
        Ok((today.year(), today.month()))
    }
}

fn report_summary(report: &ClosureReport) -> Value {
    json!({
        "report_id": report.id,
        "year": report.year,
        "month": report.month,
        "status": report.status,
        "total_purchases": report.total_purchases,
        "total_revenue": report.total_revenue,
        "cmv_percent": report.cmv_percent,
        "cmv_target_percent": report.cmv_target_percent,
        "month_over_month_change": report.month_over_month_change,
        "top_suppliers": report.top_suppliers,
        "insights": report.insights,
    })
}

async fn cmv_target(ctx: &ToolContext, restaurant_id: i64) -> crate::Result<f64> {
    let profile = ctx.store.load_profile(restaurant_id).await?;
    Ok(profile
        .and_then(|p| p.cmv_target_percent)
        .unwrap_or(ctx.default_cmv_target_percent))
}

/// Report the conversation is currently working on, falling back to the
/// default period when the session carries no open report.
async fn current_report(
    ctx: &ToolContext,
    restaurant_id: i64,
) -> crate::Result<Option<ClosureReport>> {
    let session = ctx.sessions.get_or_create(&ctx.conversation_id).await;
    if let Some(report_id) = session.current_report_id {
        let history = ctx.store.report_history(restaurant_id, 24).await?;
        if let Some(report) = history.into_iter().find(|r| r.id == report_id) {
            return Ok(Some(report));
        }
    }

    let (year, month) = resolve_period(&PeriodArgs::default())?;
    ctx.store.find_report(restaurant_id, year, month).await
}

//
// ================= start_monthly_closure =================
//

pub struct StartMonthlyClosureTool;

#[async_trait]
impl Tool for StartMonthlyClosureTool {
    fn name(&self) -> &str {
        "start_monthly_closure"
    }

    fn description(&self) -> &str {
        "Abre o fechamento mensal: soma as notas fiscais do período, agrupa por fornecedor e \
         deixa o relatório aguardando o faturamento do mês. Use ano e mês apenas se o usuário \
         pedir um período específico."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "year": { "type": "integer", "description": "Ano do período, ex.: 2025" },
                "month": { "type": "integer", "description": "Mês do período, 1 a 12" }
            },
            "required": []
        })
    }

    async fn execute(&self, args: &Value, ctx: &ToolContext) -> crate::Result<Value> {
        let restaurant_id = ctx.require_restaurant()?;
        let args: PeriodArgs = serde_json::from_value(args.clone()).unwrap_or_default();
        let (year, month) = resolve_period(&args)?;

        let purchases = ctx.store.monthly_purchases(restaurant_id, year, month).await?;
        let target = cmv_target(ctx, restaurant_id).await?;

        let mut top_suppliers: Vec<SupplierTotal> = purchases.by_supplier;
        top_suppliers.truncate(TOP_SUPPLIER_LIMIT);

        // Reuse an existing aggregate for the period, refreshing the
        // purchase totals; revenue already submitted is kept, but derived
        // numbers are stale once the purchase base changes and must be
        // regenerated.
        let existing = ctx.store.find_report(restaurant_id, year, month).await?;
        let report = match existing {
            Some(mut report) => {
                report.total_purchases = Some(purchases.total);
                report.top_suppliers = top_suppliers;
                report.status = ReportStatus::AwaitingRevenue;
                report.cmv_percent = None;
                report.month_over_month_change = None;
                report.insights = Vec::new();
                report.generated_at = None;
                report
            }
            None => ClosureReport {
                id: Uuid::new_v4(),
                restaurant_id,
                year,
                month,
                status: ReportStatus::AwaitingRevenue,
                total_revenue: None,
                total_purchases: Some(purchases.total),
                cmv_percent: None,
                cmv_target_percent: target,
                month_over_month_change: None,
                top_suppliers,
                insights: Vec::new(),
                generated_at: None,
            },
        };

        let report_id = report.id;
        let next_step = if report.total_revenue.is_some() {
            "generate_monthly_report"
        } else {
            "awaiting_revenue"
        };
        let summary = report_summary(&report);
        ctx.store.save_report(report).await?;

        ctx.sessions
            .update(&ctx.conversation_id, |s| {
                s.current_report_id = Some(report_id);
            })
            .await;

        info!(restaurant_id, year, month, %report_id, next_step, "monthly closure opened");

        Ok(json!({
            "report": summary,
            "invoice_count": purchases.invoice_count,
            "next_step": next_step,
        }))
    }
}

//
// ================= submit_revenue =================
//

#[derive(Debug, Deserialize)]
struct SubmitRevenueArgs {
    total_revenue: f64,
}

pub struct SubmitRevenueTool;

#[async_trait]
impl Tool for SubmitRevenueTool {
    fn name(&self) -> &str {
        "submit_revenue"
    }

    fn description(&self) -> &str {
        "Registra o faturamento informado pelo usuário no fechamento mensal em andamento."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "total_revenue": {
                    "type": "number",
                    "description": "Faturamento total do mês em reais"
                }
            },
            "required": ["total_revenue"]
        })
    }

    async fn execute(&self, args: &Value, ctx: &ToolContext) -> crate::Result<Value> {
        let restaurant_id = ctx.require_restaurant()?;
        let args: SubmitRevenueArgs = serde_json::from_value(args.clone())
            .map_err(|e| AgentError::InvalidToolArguments(format!("submit_revenue: {}", e)))?;

        if args.total_revenue <= 0.0 {
            return Err(AgentError::InvalidAmount(format!(
                "revenue must be positive, got {}",
                args.total_revenue
            )));
        }

        let mut report = current_report(ctx, restaurant_id).await?.ok_or_else(|| {
            AgentError::ToolExecutionFailed(
                "no open monthly closure; call start_monthly_closure first".to_string(),
            )
        })?;

        report.total_revenue = Some(args.total_revenue);
        let summary = report_summary(&report);
        info!(restaurant_id, report_id = %report.id, "revenue submitted");
        ctx.store.save_report(report).await?;

        Ok(json!({
            "report": summary,
            "next_step": "generate_monthly_report",
        }))
    }
}

//
// ================= generate_monthly_report =================
//

pub struct GenerateMonthlyReportTool;

#[async_trait]
impl Tool for GenerateMonthlyReportTool {
    fn name(&self) -> &str {
        "generate_monthly_report"
    }

    fn description(&self) -> &str {
        "Gera o relatório final do fechamento mensal com CMV, comparação com o mês anterior e \
         principais fornecedores. Exige que o faturamento já tenha sido registrado."
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

        let mut report = current_report(ctx, restaurant_id).await?.ok_or_else(|| {
            AgentError::ToolExecutionFailed(
                "no open monthly closure; call start_monthly_closure first".to_string(),
            )
        })?;

        let total_revenue = report.total_revenue.ok_or_else(|| {
            AgentError::ToolExecutionFailed(
                "revenue not yet submitted; call submit_revenue first".to_string(),
            )
        })?;
        let total_purchases = report.total_purchases.unwrap_or(0.0);

        let (prev_year, prev_month) = ClosureEngine::previous_period(report.year, report.month);
        let previous_cmv = ctx
            .store
            .find_report(restaurant_id, prev_year, prev_month)
            .await?
            .and_then(|r| r.cmv_percent);

        let result = ClosureEngine::close(
            total_purchases,
            total_revenue,
            report.cmv_target_percent,
            previous_cmv,
        )?;

        report.cmv_percent = Some(result.cmv_percent);
        report.month_over_month_change = result.month_over_month_change;
        report.status = match result.status {
            CmvStatus::OnTarget => ReportStatus::OnTarget,
            CmvStatus::AboveTarget => ReportStatus::AboveTarget,
            CmvStatus::Critical => ReportStatus::Critical,
        };
        report.insights = build_insights(&report, total_purchases);
        report.generated_at = Some(Utc::now());

        let summary = report_summary(&report);
        info!(
            restaurant_id,
            report_id = %report.id,
            cmv = result.cmv_percent,
            status = ?report.status,
            "monthly report generated"
        );
        ctx.store.save_report(report).await?;

        Ok(json!({ "report": summary }))
    }
}

fn build_insights(report: &ClosureReport, total_purchases: f64) -> Vec<String> {
    let mut insights = Vec::new();

    match report.status {
        ReportStatus::Critical => insights.push(
            "CMV crítico: as compras passaram de 40% do faturamento. Vale revisar preços e \
             desperdício com urgência."
                .to_string(),
        ),
        ReportStatus::AboveTarget => insights.push(format!(
            "CMV acima da meta de {:.0}%. Pequenos ajustes em compras já trazem o número de volta.",
            report.cmv_target_percent
        )),
        ReportStatus::OnTarget => insights.push(format!(
            "CMV dentro da meta de {:.0}%. Bom controle de compras este mês.",
            report.cmv_target_percent
        )),
        ReportStatus::AwaitingRevenue => {}
    }

    if let Some(change) = report.month_over_month_change {
        if change > 0.0 {
            insights.push(format!(
                "O CMV subiu {:.1} pontos em relação ao mês anterior.",
                change
            ));
        } else if change < 0.0 {
            insights.push(format!(
                "O CMV caiu {:.1} pontos em relação ao mês anterior.",
                change.abs()
            ));
        }
    }

    if let Some(top) = report.top_suppliers.first() {
        if total_purchases > 0.0 {
            let share = top.total / total_purchases * 100.0;
            insights.push(format!(
                "{} concentrou {:.0}% das compras do mês.",
                top.name, share
            ));
        }
    }

    insights
}

//
// ================= get_report_history =================
//

#[derive(Debug, Deserialize, Default)]
struct HistoryArgs {
    limit: Option<usize>,
}

pub struct GetReportHistoryTool;

#[async_trait]
impl Tool for GetReportHistoryTool {
    fn name(&self) -> &str {
        "get_report_history"
    }

    fn description(&self) -> &str {
        "Lista os fechamentos mensais anteriores do restaurante, do mais recente para o mais \
         antigo."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "limit": {
                    "type": "integer",
                    "description": "Quantos meses retornar (padrão 6)"
                }
            },
            "required": []
        })
    }

    async fn execute(&self, args: &Value, ctx: &ToolContext) -> crate::Result<Value> {
        let restaurant_id = ctx.require_restaurant()?;
        let args: HistoryArgs = serde_json::from_value(args.clone()).unwrap_or_default();
        let limit = args.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);

        let history = ctx.store.report_history(restaurant_id, limit).await?;
        let reports: Vec<Value> = history.iter().map(report_summary).collect();

        Ok(json!({
            "count": reports.len(),
            "reports": reports,
        }))
    }
}
