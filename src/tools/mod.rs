//! Tool registry
//!
//! Tools are the only way the model touches external state. Each tool
//! declares a JSON-schema parameter shape; the registry validates arguments
//! against it before dispatch so malformed calls come back as structured
//! failures instead of reaching the tool body.

pub mod cmv;
pub mod invoice;
pub mod monthly;
pub mod watchlist;

use crate::error::AgentError;
use crate::models::ToolSchema;
use crate::session::SessionStore;
use crate::store::FinanceStore;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// Per-turn state handed to every tool execution.
#[derive(Clone)]
pub struct ToolContext {
    pub conversation_id: String,
    pub restaurant_id: Option<i64>,
    pub store: Arc<dyn FinanceStore>,
    pub sessions: Arc<SessionStore>,
    /// Restaurant CMV target used when the profile does not carry one.
    pub default_cmv_target_percent: f64,
    /// Alert threshold for price movements, in percent.
    pub significance_threshold: f64,
}

impl ToolContext {
    /// Restaurant id or a structured failure for tools that require one.
    pub fn require_restaurant(&self) -> crate::Result<i64> {
        self.restaurant_id.ok_or_else(|| {
            AgentError::ToolExecutionFailed("no restaurant linked to this conversation".to_string())
        })
    }
}

/// One executable capability exposed to the model.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    /// JSON schema object for the arguments.
    fn parameters(&self) -> Value;

    async fn execute(&self, args: &Value, ctx: &ToolContext) -> crate::Result<Value>;

    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters(),
        }
    }
}

/// Name-keyed registry of tools, shared across turns.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Registry with the full built-in tool set.
    pub fn with_builtin_tools() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(invoice::RecordInvoiceTool));
        registry.register(Arc::new(monthly::StartMonthlyClosureTool));
        registry.register(Arc::new(monthly::SubmitRevenueTool));
        registry.register(Arc::new(monthly::GenerateMonthlyReportTool));
        registry.register(Arc::new(monthly::GetReportHistoryTool));
        registry.register(Arc::new(cmv::CalculateMenuItemCostTool));
        registry.register(Arc::new(watchlist::AddWatchlistItemTool));
        registry.register(Arc::new(watchlist::GetWatchlistTool));
        registry.register(Arc::new(watchlist::CheckWatchlistAlertsTool));
        registry
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        info!(tool = tool.name(), "registering tool");
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Schemas for every registered tool, sorted by name for stable output.
    pub fn schemas(&self) -> Vec<ToolSchema> {
        let mut schemas: Vec<ToolSchema> = self.tools.values().map(|t| t.schema()).collect();
        schemas.sort_by(|a, b| a.name.cmp(&b.name));
        schemas
    }

    /// Validate `args` against the tool's declared schema: required keys
    /// must be present and primitive types must match. Returns
    /// `InvalidToolArguments` on the first violation.
    pub fn validate_arguments(&self, name: &str, args: &Value) -> crate::Result<()> {
        let tool = self
            .get(name)
            .ok_or_else(|| AgentError::ToolNotFound(name.to_string()))?;
        let schema = tool.parameters();

        let object = match args {
            Value::Object(map) => map,
            Value::Null => {
                if required_keys(&schema).is_empty() {
                    return Ok(());
                }
                return Err(AgentError::InvalidToolArguments(format!(
                    "{}: arguments must be an object",
                    name
                )));
            }
            _ => {
                return Err(AgentError::InvalidToolArguments(format!(
                    "{}: arguments must be an object",
                    name
                )))
            }
        };

        for key in required_keys(&schema) {
            if !object.contains_key(key) {
                return Err(AgentError::InvalidToolArguments(format!(
                    "{}: missing required argument '{}'",
                    name, key
                )));
            }
        }

        if let Some(properties) = schema.get("properties").and_then(Value::as_object) {
            for (key, value) in object {
                let Some(expected) = properties.get(key).and_then(|p| p.get("type")) else {
                    continue;
                };
                let Some(expected) = expected.as_str() else {
                    continue;
                };
                if !type_matches(expected, value) {
                    return Err(AgentError::InvalidToolArguments(format!(
                        "{}: argument '{}' must be of type {}",
                        name, key, expected
                    )));
                }
            }
        }

        Ok(())
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn required_keys(schema: &Value) -> Vec<&str> {
    schema
        .get("required")
        .and_then(Value::as_array)
        .map(|keys| keys.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default()
}

fn type_matches(expected: &str, value: &Value) -> bool {
    match expected {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryFinanceStore;
    use serde_json::json;

    pub(crate) fn test_context(
        restaurant_id: Option<i64>,
    ) -> (Arc<InMemoryFinanceStore>, ToolContext) {
        let store = Arc::new(InMemoryFinanceStore::new());
        let ctx = ToolContext {
            conversation_id: "chat-test".to_string(),
            restaurant_id,
            store: store.clone(),
            sessions: Arc::new(SessionStore::new()),
            default_cmv_target_percent: 32.0,
            significance_threshold: 10.0,
        };
        (store, ctx)
    }

    #[test]
    fn test_builtin_registry_exposes_all_tools() {
        let registry = ToolRegistry::with_builtin_tools();
        assert_eq!(registry.len(), 9);
        for name in [
            "record_invoice",
            "start_monthly_closure",
            "submit_revenue",
            "generate_monthly_report",
            "get_report_history",
            "calculate_menu_item_cost",
            "add_watchlist_item",
            "get_watchlist",
            "check_watchlist_alerts",
        ] {
            assert!(registry.get(name).is_some(), "missing tool {}", name);
        }
    }

    #[test]
    fn test_schemas_sorted_by_name() {
        let registry = ToolRegistry::with_builtin_tools();
        let schemas = registry.schemas();
        let names: Vec<&str> = schemas.iter().map(|s| s.name.as_str()).collect();
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);
    }

    #[test]
    fn test_missing_required_argument_rejected() {
        let registry = ToolRegistry::with_builtin_tools();
        let result = registry.validate_arguments("submit_revenue", &json!({}));
        assert!(matches!(
            result,
            Err(AgentError::InvalidToolArguments(_))
        ));
    }

    #[test]
    fn test_wrong_argument_type_rejected() {
        let registry = ToolRegistry::with_builtin_tools();
        let result =
            registry.validate_arguments("submit_revenue", &json!({"total_revenue": "muito"}));
        assert!(matches!(
            result,
            Err(AgentError::InvalidToolArguments(_))
        ));
    }

    #[test]
    fn test_valid_arguments_accepted() {
        let registry = ToolRegistry::with_builtin_tools();
        registry
            .validate_arguments("submit_revenue", &json!({"total_revenue": 40000.0}))
            .unwrap();
    }

    #[test]
    fn test_unknown_tool_is_not_found() {
        let registry = ToolRegistry::with_builtin_tools();
        let result = registry.validate_arguments("fly_to_the_moon", &json!({}));
        assert!(matches!(result, Err(AgentError::ToolNotFound(_))));
    }
}
