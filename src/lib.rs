//! Conversational financial assistant for restaurant owners.
//!
//! Each incoming message runs through a fixed pipeline: intent
//! classification, context loading, layered prompt composition under a token
//! budget, then a bounded tool-invocation loop against the chat model. Three
//! deterministic engines (price trend, food cost, monthly closure) do all
//! financial arithmetic; the model never computes numbers itself. Every turn
//! leaves a sealed audit record.

pub mod agent;
pub mod audit;
pub mod classifier;
pub mod composer;
pub mod context;
pub mod engines;
pub mod error;
pub mod model;
pub mod models;
pub mod prompts;
pub mod session;
pub mod store;
pub mod tools;

pub use agent::{AgentConfig, FinanceAgent};
pub use error::{AgentError, Result};
pub use models::{Intent, IntentLabel, TurnOutcome, TurnReply};
pub use store::{FinanceStore, InMemoryFinanceStore};
