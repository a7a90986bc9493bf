//! Chat model boundary
//!
//! The external language model is a black box invoked once per round-trip:
//! it receives the message list and tool schemas and answers with either a
//! final text or a batch of tool calls. `OpenAiChatModel` talks to any
//! OpenAI-compatible chat-completions endpoint over a pooled reqwest client;
//! `ScriptedModel` replays a fixed sequence for tests.

use crate::error::AgentError;
use crate::models::{ChatMessage, ChatRole, ToolSchema};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{error, info};

/// A tool call as requested by the model, before the loop indexes it.
#[derive(Debug, Clone)]
pub struct ToolCallRequest {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

/// One model round-trip result: a final answer xor tool calls.
#[derive(Debug, Clone)]
pub enum ModelResponse {
    Final(String),
    ToolCalls(Vec<ToolCallRequest>),
}

/// Sampling parameters for the model request.
#[derive(Debug, Clone)]
pub struct SamplingParams {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 1024,
        }
    }
}

/// Trait for one synchronous model round-trip.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolSchema],
    ) -> crate::Result<ModelResponse>;
}

//
// ================= HTTP implementation =================
//

/// Reusable chat-completions client (connection-pooled).
pub struct OpenAiChatModel {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    sampling: SamplingParams,
}

impl OpenAiChatModel {
    /// `base_url` is the completions endpoint root, e.g.
    /// `https://api.openai.com/v1`. The timeout applies per round-trip.
    pub fn new(
        api_key: String,
        base_url: String,
        model: String,
        sampling: SamplingParams,
        timeout: Duration,
    ) -> crate::Result<Self> {
        let client = reqwest::Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            sampling,
        })
    }
}

#[async_trait]
impl ChatModel for OpenAiChatModel {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolSchema],
    ) -> crate::Result<ModelResponse> {
        if self.api_key.is_empty() {
            return Err(AgentError::ModelUnavailable(
                "model API key not configured".to_string(),
            ));
        }

        let request = CompletionRequest {
            model: self.model.clone(),
            messages: messages.iter().map(WireMessage::from).collect(),
            tools: tools.iter().map(WireTool::from).collect(),
            tool_choice: "auto",
            temperature: self.sampling.temperature,
            max_tokens: self.sampling.max_tokens,
        };

        info!(model = %self.model, messages = messages.len(), "calling chat model");

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                error!("model request failed: {}", e);
                AgentError::ModelUnavailable(format!("model request failed: {}", e))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!(%status, "model returned error response");
            return Err(AgentError::ModelUnavailable(format!(
                "model returned {}: {}",
                status, body
            )));
        }

        let completion: CompletionResponse = response.json().await.map_err(|e| {
            AgentError::ModelResponseInvalid(format!("failed to parse model response: {}", e))
        })?;

        let choice = completion.choices.into_iter().next().ok_or_else(|| {
            AgentError::ModelResponseInvalid("model returned no choices".to_string())
        })?;

        if let Some(calls) = choice.message.tool_calls {
            if !calls.is_empty() {
                let requests = calls
                    .into_iter()
                    .map(|call| {
                        let arguments = serde_json::from_str(&call.function.arguments)
                            .unwrap_or(Value::Null);
                        ToolCallRequest {
                            id: call.id,
                            name: call.function.name,
                            arguments,
                        }
                    })
                    .collect();
                return Ok(ModelResponse::ToolCalls(requests));
            }
        }

        match choice.message.content {
            Some(text) if !text.is_empty() => Ok(ModelResponse::Final(text)),
            _ => Err(AgentError::ModelResponseInvalid(
                "model returned neither text nor tool calls".to_string(),
            )),
        }
    }
}

//
// ================= Wire types =================
//

#[derive(Debug, Serialize)]
struct CompletionRequest {
    model: String,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool>,
    tool_choice: &'static str,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: &'static str,
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<WireToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
}

impl From<&ChatMessage> for WireMessage {
    fn from(msg: &ChatMessage) -> Self {
        let role = match msg.role {
            ChatRole::System => "system",
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
            ChatRole::Tool => "tool",
        };
        let tool_calls = msg.tool_calls.as_ref().map(|calls| {
            calls
                .iter()
                .map(|call| WireToolCall {
                    id: call.id.clone(),
                    kind: "function",
                    function: WireFunctionCall {
                        name: call.name.clone(),
                        arguments: call.arguments.to_string(),
                    },
                })
                .collect()
        });
        Self {
            role,
            content: msg.content.clone(),
            tool_calls,
            tool_call_id: msg.tool_call_id.clone(),
            name: msg.name.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type")]
    kind: &'static str,
    function: WireFunctionCall,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireFunctionCall {
    name: String,
    arguments: String,
}

#[derive(Debug, Serialize)]
struct WireTool {
    #[serde(rename = "type")]
    kind: &'static str,
    function: WireFunction,
}

#[derive(Debug, Serialize)]
struct WireFunction {
    name: String,
    description: String,
    parameters: Value,
}

impl From<&ToolSchema> for WireTool {
    fn from(schema: &ToolSchema) -> Self {
        Self {
            kind: "function",
            function: WireFunction {
                name: schema.name.clone(),
                description: schema.description.clone(),
                parameters: schema.parameters.clone(),
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
    tool_calls: Option<Vec<IncomingToolCall>>,
}

#[derive(Debug, Deserialize)]
struct IncomingToolCall {
    id: String,
    function: WireFunctionCall,
}

//
// ================= Scripted implementation =================
//

/// Replays a fixed response sequence. Keeps the pipeline testable without a
/// live model; `cycling` repeats the script forever, which is how the
/// iteration-bound tests simulate a model that never stops calling tools.
pub struct ScriptedModel {
    script: Mutex<VecDeque<ModelResponse>>,
    cycle: bool,
}

impl ScriptedModel {
    pub fn new(responses: Vec<ModelResponse>) -> Self {
        Self {
            script: Mutex::new(responses.into()),
            cycle: false,
        }
    }

    pub fn cycling(responses: Vec<ModelResponse>) -> Self {
        Self {
            script: Mutex::new(responses.into()),
            cycle: true,
        }
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    async fn complete(
        &self,
        _messages: &[ChatMessage],
        _tools: &[ToolSchema],
    ) -> crate::Result<ModelResponse> {
        let mut script = self
            .script
            .lock()
            .map_err(|_| AgentError::ModelUnavailable("script lock poisoned".to_string()))?;

        let response = script
            .pop_front()
            .ok_or_else(|| AgentError::ModelUnavailable("scripted model exhausted".to_string()))?;

        if self.cycle {
            script.push_back(response.clone());
        }

        Ok(response)
    }
}
