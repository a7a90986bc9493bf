//! Turn orchestrator
//!
//! One `handle_message` call runs the whole pipeline: classify the intent,
//! load context, compose the system prompt, then drive the model through a
//! bounded tool-invocation loop. Every turn ends in exactly one of three
//! outcomes (answered, exhausted, failed) and leaves a sealed turn log.

use crate::audit::{InteractionLog, PromptSnapshot};
use crate::classifier::IntentClassifier;
use crate::composer::PromptComposer;
use crate::context::ContextLoader;
use crate::error::AgentError;
use crate::model::{ChatModel, ModelResponse};
use crate::models::{ChatMessage, ToolCall, ToolResult, TurnOutcome, TurnReply};
use crate::prompts;
use crate::session::SessionStore;
use crate::store::FinanceStore;
use crate::tools::{ToolContext, ToolRegistry};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Tunables for the turn pipeline.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Model round-trips allowed per turn before the exhausted fallback.
    pub max_rounds: u32,
    /// Token budget for prompt composition.
    pub token_budget: usize,
    /// Price movement (percent) that counts as significant.
    pub significance_threshold: f64,
    /// CMV target used when the restaurant profile does not carry one.
    pub default_cmv_target_percent: f64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_rounds: 8,
            token_budget: 4000,
            significance_threshold: 10.0,
            default_cmv_target_percent: 32.0,
        }
    }
}

/// The assembled pipeline. One instance serves all conversations.
pub struct FinanceAgent {
    model: Arc<dyn ChatModel>,
    tools: ToolRegistry,
    store: Arc<dyn FinanceStore>,
    sessions: Arc<SessionStore>,
    audit: Arc<InteractionLog>,
    context: ContextLoader,
    config: AgentConfig,
}

impl FinanceAgent {
    pub fn new(
        model: Arc<dyn ChatModel>,
        tools: ToolRegistry,
        store: Arc<dyn FinanceStore>,
        config: AgentConfig,
    ) -> Self {
        Self {
            model,
            tools,
            store: store.clone(),
            sessions: Arc::new(SessionStore::new()),
            audit: Arc::new(InteractionLog::new()),
            context: ContextLoader::new(store),
            config,
        }
    }

    pub fn audit(&self) -> Arc<InteractionLog> {
        self.audit.clone()
    }

    pub fn sessions(&self) -> Arc<SessionStore> {
        self.sessions.clone()
    }

    /// Bind a conversation to a restaurant. Until this is called the
    /// conversation is treated as an unregistered user.
    pub async fn link_restaurant(
        &self,
        conversation_id: &str,
        restaurant_id: i64,
        is_new_user: bool,
    ) {
        self.sessions
            .update(conversation_id, |s| {
                s.restaurant_id = Some(restaurant_id);
                s.is_new_user = is_new_user;
            })
            .await;
    }

    /// Run one user message through the pipeline.
    pub async fn handle_message(
        &self,
        conversation_id: &str,
        text: &str,
        has_attachment: bool,
    ) -> crate::Result<TurnReply> {
        let session = self.sessions.get_or_create(conversation_id).await;

        // A conversation with no linked restaurant is an unregistered user.
        let is_new_user = session.is_new_user || session.restaurant_id.is_none();
        let intent = IntentClassifier::classify(text, has_attachment, is_new_user);
        info!(
            conversation = conversation_id,
            intent = %intent.label,
            confidence = intent.confidence,
            "message classified"
        );

        let context = self.context.load(session.restaurant_id, intent.label).await;
        let layers = PromptComposer::build_layers(
            intent.label,
            context.user_memory.as_deref(),
            context.recent_data.as_deref(),
            context.drip_hint.as_deref(),
        );
        let composed = PromptComposer::compose(layers, self.config.token_budget);

        let turn_id = self
            .audit
            .open(conversation_id, intent.clone(), PromptSnapshot::from(&composed))
            .await;

        // The system message is rebuilt every turn; intent changes swap the
        // active skill layer without losing history.
        self.sessions
            .update(conversation_id, |s| {
                s.set_system_message(composed.system_message.clone());
                s.last_intent = Some(intent.label);
                s.messages.push(ChatMessage::user(text));
            })
            .await;

        let tool_ctx = ToolContext {
            conversation_id: conversation_id.to_string(),
            restaurant_id: session.restaurant_id,
            store: self.store.clone(),
            sessions: self.sessions.clone(),
            default_cmv_target_percent: self.config.default_cmv_target_percent,
            significance_threshold: self.config.significance_threshold,
        };
        let schemas = self.tools.schemas();

        let mut call_index = 0u32;
        for round in 0..self.config.max_rounds {
            let messages = self.sessions.get_or_create(conversation_id).await.messages;

            let response = match self.model.complete(&messages, &schemas).await {
                Ok(response) => response,
                Err(e) => {
                    let message = e.to_string();
                    self.audit
                        .seal(turn_id, TurnOutcome::Failed, 0, Some(message))
                        .await?;
                    return Err(e);
                }
            };

            match response {
                ModelResponse::Final(answer) => {
                    self.sessions
                        .update(conversation_id, |s| {
                            s.messages.push(ChatMessage::assistant(answer.clone()));
                        })
                        .await;
                    self.audit
                        .seal(turn_id, TurnOutcome::Answered, answer.len(), None)
                        .await?;
                    return Ok(TurnReply {
                        text: answer,
                        outcome: TurnOutcome::Answered,
                        turn_id,
                    });
                }
                ModelResponse::ToolCalls(requests) => {
                    debug!(
                        round,
                        calls = requests.len(),
                        "model requested tool calls"
                    );
                    let calls: Vec<ToolCall> = requests
                        .into_iter()
                        .map(|req| {
                            let call = ToolCall {
                                id: req.id,
                                name: req.name,
                                arguments: req.arguments,
                                call_index,
                            };
                            call_index += 1;
                            call
                        })
                        .collect();

                    self.sessions
                        .update(conversation_id, |s| {
                            s.messages
                                .push(ChatMessage::assistant_tool_calls(calls.clone()));
                        })
                        .await;

                    // Sequential execution in call order; a failed call
                    // becomes a structured result the model can react to.
                    for call in calls {
                        let result = self.execute_call(&call, &tool_ctx).await;
                        self.audit
                            .record_tool(turn_id, call.clone(), result.clone())
                            .await?;
                        self.sessions
                            .update(conversation_id, |s| {
                                s.messages
                                    .push(ChatMessage::tool_result(&call, &result.payload));
                            })
                            .await;
                    }
                }
            }
        }

        warn!(
            conversation = conversation_id,
            rounds = self.config.max_rounds,
            "turn exhausted its round bound"
        );
        self.audit
            .seal(
                turn_id,
                TurnOutcome::Exhausted,
                prompts::EXHAUSTED_FALLBACK.len(),
                None,
            )
            .await?;
        Ok(TurnReply {
            text: prompts::EXHAUSTED_FALLBACK.to_string(),
            outcome: TurnOutcome::Exhausted,
            turn_id,
        })
    }

    async fn execute_call(&self, call: &ToolCall, ctx: &ToolContext) -> ToolResult {
        if let Err(e) = self.tools.validate_arguments(&call.name, &call.arguments) {
            warn!(tool = %call.name, error = %e, "rejecting tool call");
            return ToolResult::failed(call, e.to_string());
        }

        // validate_arguments already proved the tool exists
        let Some(tool) = self.tools.get(&call.name) else {
            return ToolResult::failed(call, AgentError::ToolNotFound(call.name.clone()).to_string());
        };

        match tool.execute(&call.arguments, ctx).await {
            Ok(payload) => ToolResult::ok(call, payload),
            Err(e) => {
                warn!(tool = %call.name, error = %e, "tool execution failed");
                ToolResult::failed(call, e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ModelResponse, ScriptedModel, ToolCallRequest};
    use crate::store::InMemoryFinanceStore;
    use serde_json::json;

    fn agent_with(model: ScriptedModel) -> FinanceAgent {
        FinanceAgent::new(
            Arc::new(model),
            ToolRegistry::with_builtin_tools(),
            Arc::new(InMemoryFinanceStore::new()),
            AgentConfig::default(),
        )
    }

    fn tool_call(name: &str, arguments: serde_json::Value) -> ModelResponse {
        ModelResponse::ToolCalls(vec![ToolCallRequest {
            id: "call_1".to_string(),
            name: name.to_string(),
            arguments,
        }])
    }

    #[tokio::test]
    async fn test_direct_answer_seals_answered_turn() {
        let agent = agent_with(ScriptedModel::new(vec![ModelResponse::Final(
            "Tudo certo por aqui!".to_string(),
        )]));

        let reply = agent.handle_message("chat-1", "oi", false).await.unwrap();
        assert_eq!(reply.outcome, TurnOutcome::Answered);
        assert_eq!(reply.text, "Tudo certo por aqui!");

        let log = agent.audit().get(reply.turn_id).await.unwrap();
        assert!(log.sealed);
        assert_eq!(log.outcome, Some(TurnOutcome::Answered));
        assert!(log.tool_calls.is_empty());
    }

    #[tokio::test]
    async fn test_tool_round_then_answer() {
        let agent = agent_with(ScriptedModel::new(vec![
            tool_call("get_watchlist", json!({})),
            ModelResponse::Final("Sua lista está vazia.".to_string()),
        ]));
        agent.link_restaurant("chat-1", 1, false).await;

        let reply = agent
            .handle_message("chat-1", "o que estou monitorando?", false)
            .await
            .unwrap();
        assert_eq!(reply.outcome, TurnOutcome::Answered);

        let log = agent.audit().get(reply.turn_id).await.unwrap();
        assert_eq!(log.tool_calls.len(), 1);
        assert_eq!(log.tool_calls[0].call.name, "get_watchlist");
        assert!(log.tool_calls[0].result.success);
    }

    #[tokio::test]
    async fn test_unknown_tool_becomes_failed_result_not_error() {
        let agent = agent_with(ScriptedModel::new(vec![
            tool_call("fly_to_the_moon", json!({})),
            ModelResponse::Final("Essa eu não sei fazer.".to_string()),
        ]));

        let reply = agent.handle_message("chat-1", "oi", false).await.unwrap();
        assert_eq!(reply.outcome, TurnOutcome::Answered);

        let log = agent.audit().get(reply.turn_id).await.unwrap();
        assert_eq!(log.tool_calls.len(), 1);
        assert!(!log.tool_calls[0].result.success);
    }

    #[tokio::test]
    async fn test_relentless_tool_calling_is_exhausted() {
        let agent = agent_with(ScriptedModel::cycling(vec![tool_call(
            "get_watchlist",
            json!({}),
        )]));
        agent.link_restaurant("chat-1", 1, false).await;

        let reply = agent.handle_message("chat-1", "oi", false).await.unwrap();
        assert_eq!(reply.outcome, TurnOutcome::Exhausted);
        assert_eq!(reply.text, prompts::EXHAUSTED_FALLBACK);

        let log = agent.audit().get(reply.turn_id).await.unwrap();
        assert_eq!(log.tool_calls.len(), 8);
        assert_eq!(log.outcome, Some(TurnOutcome::Exhausted));
    }

    #[tokio::test]
    async fn test_model_failure_seals_failed_turn() {
        // Empty script: the first round-trip errors out.
        let agent = agent_with(ScriptedModel::new(vec![]));

        let result = agent.handle_message("chat-1", "oi", false).await;
        assert!(matches!(result, Err(AgentError::ModelUnavailable(_))));

        let logs = agent.audit().list_for_conversation("chat-1").await;
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].outcome, Some(TurnOutcome::Failed));
        assert!(logs[0].error_occurred);
    }

    #[tokio::test]
    async fn test_system_message_carries_active_skill() {
        let agent = agent_with(ScriptedModel::new(vec![ModelResponse::Final(
            "Vamos fechar o mês.".to_string(),
        )]));
        agent.link_restaurant("chat-1", 1, false).await;

        agent
            .handle_message("chat-1", "preciso fechar o mês", false)
            .await
            .unwrap();

        let session = agent.sessions().get_or_create("chat-1").await;
        assert!(session.messages[0].content.contains("fechamento mensal"));
        assert_eq!(
            session.last_intent,
            Some(crate::models::IntentLabel::MonthlyClosure)
        );
    }

    #[tokio::test]
    async fn test_call_indexes_increase_across_rounds() {
        let agent = agent_with(ScriptedModel::new(vec![
            tool_call("get_watchlist", json!({})),
            tool_call("get_watchlist", json!({})),
            ModelResponse::Final("Pronto.".to_string()),
        ]));
        agent.link_restaurant("chat-1", 1, false).await;

        let reply = agent.handle_message("chat-1", "oi", false).await.unwrap();
        let log = agent.audit().get(reply.turn_id).await.unwrap();
        let indexes: Vec<u32> = log.tool_calls.iter().map(|t| t.call.call_index).collect();
        assert_eq!(indexes, vec![0, 1]);
    }
}
