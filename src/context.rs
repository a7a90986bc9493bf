//! Context loader
//!
//! Fetches the minimal external state needed to personalize a turn: the
//! restaurant profile, a short summary of recent activity, and any pending
//! drip questions. Everything comes back as structured, pre-formatted
//! context — never raw rows — through the injected `FinanceStore` capability.

use crate::models::IntentLabel;
use crate::store::FinanceStore;
use std::sync::Arc;
use tracing::warn;

const RECENT_INVOICE_LIMIT: usize = 5;
const REPORT_HISTORY_LIMIT: usize = 3;

/// Structured context for one turn.
#[derive(Debug, Clone, Default)]
pub struct TurnContext {
    /// Formatted restaurant memory block, if a profile exists
    pub user_memory: Option<String>,
    /// Formatted recent-activity block, intent dependent
    pub recent_data: Option<String>,
    /// Formatted drip-question hint
    pub drip_hint: Option<String>,
}

/// Context loader
pub struct ContextLoader {
    store: Arc<dyn FinanceStore>,
}

impl ContextLoader {
    pub fn new(store: Arc<dyn FinanceStore>) -> Self {
        Self { store }
    }

    /// Load context for a turn. Individual load failures degrade to a
    /// missing block rather than failing the turn.
    pub async fn load(&self, restaurant_id: Option<i64>, intent: IntentLabel) -> TurnContext {
        let Some(restaurant_id) = restaurant_id else {
            return TurnContext::default();
        };

        TurnContext {
            user_memory: self.load_user_memory(restaurant_id).await,
            recent_data: self.load_recent_data(restaurant_id, intent).await,
            drip_hint: self.load_drip_hint(restaurant_id, intent).await,
        }
    }

    async fn load_user_memory(&self, restaurant_id: i64) -> Option<String> {
        let profile = match self.store.load_profile(restaurant_id).await {
            Ok(profile) => profile?,
            Err(e) => {
                warn!(restaurant_id, error = %e, "failed to load profile");
                return None;
            }
        };

        let mut lines = vec![format!("- Restaurante: {}", profile.restaurant_name)];
        if let Some(person) = &profile.person_name {
            lines.push(format!("- Contato: {}", person));
        }
        if let Some(target) = profile.cmv_target_percent {
            lines.push(format!("- Meta de CMV: {}%", target));
        }
        if let Some(opportunity) = &profile.savings_opportunity {
            lines.push(format!(
                "- Oportunidade de economia identificada pelo dono: {}",
                opportunity
            ));
        }

        Some(format!("## Contexto do Restaurante\n{}", lines.join("\n")))
    }

    async fn load_recent_data(&self, restaurant_id: i64, intent: IntentLabel) -> Option<String> {
        let result = match intent {
            IntentLabel::InvoiceUpload | IntentLabel::Watchlist | IntentLabel::General => {
                self.recent_invoice_lines(restaurant_id).await
            }
            IntentLabel::MonthlyClosure | IntentLabel::CmvQuery => {
                self.recent_report_lines(restaurant_id).await
            }
            IntentLabel::Onboarding => Ok(Vec::new()),
        };

        match result {
            Ok(lines) if lines.is_empty() => None,
            Ok(lines) => Some(lines.join("\n")),
            Err(e) => {
                warn!(restaurant_id, error = %e, "failed to load recent data");
                None
            }
        }
    }

    async fn recent_invoice_lines(&self, restaurant_id: i64) -> crate::Result<Vec<String>> {
        let invoices = self
            .store
            .recent_invoices(restaurant_id, RECENT_INVOICE_LIMIT)
            .await?;
        Ok(invoices
            .iter()
            .map(|inv| {
                format!(
                    "- {} | {} | R$ {:.2}",
                    inv.invoice_date, inv.supplier, inv.total_amount
                )
            })
            .collect())
    }

    async fn recent_report_lines(&self, restaurant_id: i64) -> crate::Result<Vec<String>> {
        let reports = self
            .store
            .report_history(restaurant_id, REPORT_HISTORY_LIMIT)
            .await?;
        Ok(reports
            .iter()
            .map(|r| match r.cmv_percent {
                Some(cmv) => format!("- {:02}/{}: CMV {:.1}%", r.month, r.year, cmv),
                None => format!("- {:02}/{}: aguardando faturamento", r.month, r.year),
            })
            .collect())
    }

    async fn load_drip_hint(&self, restaurant_id: i64, intent: IntentLabel) -> Option<String> {
        if intent == IntentLabel::Onboarding {
            return None;
        }
        match self.store.pending_drip_questions(restaurant_id).await {
            Ok(questions) if questions.is_empty() => None,
            Ok(questions) => Some(format!(
                "## Pergunta para encaixar naturalmente na conversa\n{}",
                questions
                    .iter()
                    .map(|q| format!("- {}", q))
                    .collect::<Vec<_>>()
                    .join("\n")
            )),
            Err(e) => {
                warn!(restaurant_id, error = %e, "failed to load drip questions");
                None
            }
        }
    }
}
