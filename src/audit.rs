//! Turn log
//!
//! Every turn produces one structured record: classified intent, the prompt
//! composition summary, every tool call paired with its result in execution
//! order, timing and the final outcome. Records are append-only; once a turn
//! is sealed any further mutation is rejected.

use crate::composer::ComposedPrompt;
use crate::error::AgentError;
use crate::models::{Intent, ToolCall, ToolResult, TurnOutcome};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

/// Compact prompt composition record kept per turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptSnapshot {
    pub hash: String,
    pub prompt_version: String,
    pub total_tokens: usize,
    pub shed_layers: Vec<String>,
    pub over_budget: bool,
}

impl From<&ComposedPrompt> for PromptSnapshot {
    fn from(prompt: &ComposedPrompt) -> Self {
        Self {
            hash: prompt.hash.clone(),
            prompt_version: prompt.prompt_version.clone(),
            total_tokens: prompt.total_tokens,
            shed_layers: prompt.shed_layers.clone(),
            over_budget: prompt.over_budget,
        }
    }
}

/// One tool call with its result, ordered by call index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub call: ToolCall,
    pub result: ToolResult,
}

/// Audit record for one turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnLog {
    pub turn_id: Uuid,
    pub conversation_id: String,
    pub started_at: DateTime<Utc>,

    pub intent: Intent,
    pub prompt: PromptSnapshot,
    pub tool_calls: Vec<ToolCallRecord>,

    // Set at sealing
    pub outcome: Option<TurnOutcome>,
    pub response_length: usize,
    pub elapsed_ms: u64,
    pub error_occurred: bool,
    pub error_message: Option<String>,
    pub sealed: bool,
}

/// In-memory turn log store. Sink for every turn the pipeline runs;
/// production deployments drain it to durable storage.
pub struct InteractionLog {
    turns: Arc<RwLock<HashMap<Uuid, TurnLog>>>,
}

impl InteractionLog {
    pub fn new() -> Self {
        Self {
            turns: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Open the record for a new turn.
    pub async fn open(
        &self,
        conversation_id: &str,
        intent: Intent,
        prompt: PromptSnapshot,
    ) -> Uuid {
        let turn_id = Uuid::new_v4();
        let log = TurnLog {
            turn_id,
            conversation_id: conversation_id.to_string(),
            started_at: Utc::now(),
            intent,
            prompt,
            tool_calls: Vec::new(),
            outcome: None,
            response_length: 0,
            elapsed_ms: 0,
            error_occurred: false,
            error_message: None,
            sealed: false,
        };
        self.turns.write().await.insert(turn_id, log);
        turn_id
    }

    /// Append one executed tool call to an open turn.
    pub async fn record_tool(
        &self,
        turn_id: Uuid,
        call: ToolCall,
        result: ToolResult,
    ) -> crate::Result<()> {
        let mut turns = self.turns.write().await;
        let log = turns
            .get_mut(&turn_id)
            .ok_or_else(|| AgentError::AuditError(format!("unknown turn {}", turn_id)))?;
        if log.sealed {
            return Err(AgentError::AuditError(format!(
                "turn {} already sealed",
                turn_id
            )));
        }
        log.tool_calls.push(ToolCallRecord { call, result });
        Ok(())
    }

    /// Seal a turn with its outcome. A sealed turn cannot be reopened.
    pub async fn seal(
        &self,
        turn_id: Uuid,
        outcome: TurnOutcome,
        response_length: usize,
        error_message: Option<String>,
    ) -> crate::Result<()> {
        let mut turns = self.turns.write().await;
        let log = turns
            .get_mut(&turn_id)
            .ok_or_else(|| AgentError::AuditError(format!("unknown turn {}", turn_id)))?;
        if log.sealed {
            return Err(AgentError::AuditError(format!(
                "turn {} already sealed",
                turn_id
            )));
        }

        log.outcome = Some(outcome);
        log.response_length = response_length;
        log.elapsed_ms = (Utc::now() - log.started_at).num_milliseconds().max(0) as u64;
        log.error_occurred = error_message.is_some();
        log.error_message = error_message;
        log.sealed = true;

        info!(
            %turn_id,
            conversation = %log.conversation_id,
            intent = %log.intent.label,
            outcome = ?outcome,
            tool_calls = log.tool_calls.len(),
            elapsed_ms = log.elapsed_ms,
            "turn sealed"
        );
        Ok(())
    }

    pub async fn get(&self, turn_id: Uuid) -> Option<TurnLog> {
        self.turns.read().await.get(&turn_id).cloned()
    }

    /// All turns of one conversation, oldest first.
    pub async fn list_for_conversation(&self, conversation_id: &str) -> Vec<TurnLog> {
        let turns = self.turns.read().await;
        let mut logs: Vec<TurnLog> = turns
            .values()
            .filter(|t| t.conversation_id == conversation_id)
            .cloned()
            .collect();
        logs.sort_by_key(|t| t.started_at);
        logs
    }
}

impl Default for InteractionLog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::IntentLabel;
    use serde_json::json;

    fn intent() -> Intent {
        Intent {
            label: IntentLabel::MonthlyClosure,
            confidence: 0.9,
            matched_trigger: Some("fechar o mês".to_string()),
        }
    }

    fn snapshot() -> PromptSnapshot {
        PromptSnapshot {
            hash: "deadbeefdeadbeef".to_string(),
            prompt_version: "persona-v2+skills-v2".to_string(),
            total_tokens: 900,
            shed_layers: vec![],
            over_budget: false,
        }
    }

    fn call(index: u32) -> ToolCall {
        ToolCall {
            id: format!("call_{}", index),
            name: "start_monthly_closure".to_string(),
            arguments: json!({}),
            call_index: index,
        }
    }

    #[tokio::test]
    async fn test_tool_calls_kept_in_order() {
        let log = InteractionLog::new();
        let turn_id = log.open("chat-1", intent(), snapshot()).await;

        for i in 0..3 {
            let c = call(i);
            let r = ToolResult::ok(&c, json!({"i": i}));
            log.record_tool(turn_id, c, r).await.unwrap();
        }

        let turn = log.get(turn_id).await.unwrap();
        let indexes: Vec<u32> = turn.tool_calls.iter().map(|t| t.call.call_index).collect();
        assert_eq!(indexes, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_sealed_turn_rejects_mutation() {
        let log = InteractionLog::new();
        let turn_id = log.open("chat-1", intent(), snapshot()).await;
        log.seal(turn_id, TurnOutcome::Answered, 42, None)
            .await
            .unwrap();

        let c = call(0);
        let r = ToolResult::ok(&c, json!({}));
        let result = log.record_tool(turn_id, c, r).await;
        assert!(matches!(result, Err(AgentError::AuditError(_))));

        let result = log.seal(turn_id, TurnOutcome::Answered, 42, None).await;
        assert!(matches!(result, Err(AgentError::AuditError(_))));
    }

    #[tokio::test]
    async fn test_seal_records_outcome_and_error() {
        let log = InteractionLog::new();
        let turn_id = log.open("chat-1", intent(), snapshot()).await;
        log.seal(
            turn_id,
            TurnOutcome::Failed,
            0,
            Some("model unavailable".to_string()),
        )
        .await
        .unwrap();

        let turn = log.get(turn_id).await.unwrap();
        assert_eq!(turn.outcome, Some(TurnOutcome::Failed));
        assert!(turn.error_occurred);
        assert!(turn.sealed);
    }

    #[tokio::test]
    async fn test_conversation_listing_oldest_first() {
        let log = InteractionLog::new();
        let first = log.open("chat-1", intent(), snapshot()).await;
        let second = log.open("chat-1", intent(), snapshot()).await;
        log.open("chat-2", intent(), snapshot()).await;

        let turns = log.list_for_conversation("chat-1").await;
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].turn_id, first);
        assert_eq!(turns[1].turn_id, second);
    }
}
