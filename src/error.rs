//! Error types for the finance agent pipeline

use thiserror::Error;

/// Result type alias for agent operations
pub type Result<T> = std::result::Result<T, AgentError>;

#[derive(Error, Debug)]
pub enum AgentError {

    // =============================
    // Pipeline Errors
    // =============================

    #[error("Model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("Model response malformed: {0}")]
    ModelResponseInvalid(String),

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Invalid tool arguments: {0}")]
    InvalidToolArguments(String),

    #[error("Tool execution failed: {0}")]
    ToolExecutionFailed(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Store error: {0}")]
    StoreError(String),

    #[error("Session error: {0}")]
    SessionError(String),

    #[error("Audit error: {0}")]
    AuditError(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),
}
