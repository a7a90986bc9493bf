//! Core data models shared across the pipeline

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

//
// ================= Intent =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum IntentLabel {
    InvoiceUpload,
    MonthlyClosure,
    CmvQuery,
    Watchlist,
    Onboarding,
    General,
}

impl fmt::Display for IntentLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IntentLabel::InvoiceUpload => "invoice_upload",
            IntentLabel::MonthlyClosure => "monthly_closure",
            IntentLabel::CmvQuery => "cmv_query",
            IntentLabel::Watchlist => "watchlist",
            IntentLabel::Onboarding => "onboarding",
            IntentLabel::General => "general",
        };
        write!(f, "{}", s)
    }
}

/// Result of intent classification. Immutable once produced,
/// consumed exactly once per turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Intent {
    pub label: IntentLabel,
    /// 0.0 to 1.0
    pub confidence: f64,
    /// Which pattern matched, if any
    pub matched_trigger: Option<String>,
}

//
// ================= Chat messages =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
    Tool,
}

/// A message in the model-facing conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self::plain(ChatRole::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::plain(ChatRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::plain(ChatRole::Assistant, content)
    }

    /// Assistant message carrying the tool calls the model requested.
    pub fn assistant_tool_calls(calls: Vec<ToolCall>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: String::new(),
            tool_call_id: None,
            tool_calls: Some(calls),
            name: None,
        }
    }

    /// Tool message feeding one result back to the model.
    pub fn tool_result(call: &ToolCall, payload: &Value) -> Self {
        Self {
            role: ChatRole::Tool,
            content: payload.to_string(),
            tool_call_id: Some(call.id.clone()),
            tool_calls: None,
            name: Some(call.name.clone()),
        }
    }

    fn plain(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_call_id: None,
            tool_calls: None,
            name: None,
        }
    }
}

//
// ================= Tool I/O =================
//

/// A structured action request emitted by the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Model-assigned call id, echoed back with the result
    pub id: String,
    pub name: String,
    pub arguments: Value,
    /// Position of this call within the turn, across all rounds
    pub call_index: u32,
}

/// Outcome of one tool call. One-to-one with a `ToolCall`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub call_index: u32,
    pub tool_name: String,
    pub success: bool,
    pub payload: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolResult {
    pub fn ok(call: &ToolCall, payload: Value) -> Self {
        Self {
            call_index: call.call_index,
            tool_name: call.name.clone(),
            success: true,
            payload,
            error: None,
        }
    }

    pub fn failed(call: &ToolCall, error: impl Into<String>) -> Self {
        let error = error.into();
        Self {
            call_index: call.call_index,
            tool_name: call.name.clone(),
            success: false,
            payload: serde_json::json!({ "error": error }),
            error: Some(error),
        }
    }
}

/// Declared schema for one tool, exported to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    /// JSON schema object for the arguments
    pub parameters: Value,
}

//
// ================= Turn =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TurnOutcome {
    Answered,
    Exhausted,
    Failed,
}

/// What the pipeline hands back to the transport layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnReply {
    pub text: String,
    pub outcome: TurnOutcome,
    pub turn_id: Uuid,
}
