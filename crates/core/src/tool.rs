//! Tool trait and the registry that dispatches model tool calls.
//!
//! Tools are what give the agent the ability to act: create and edit files,
//! list directories, run code. The registry is the single place where a tool
//! call's argument shape is validated before any work is done.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::error::ToolError;
use crate::model::ToolDefinition;

/// The uniform result of a tool invocation.
///
/// Either a successful payload or an error message, never both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolOutcome {
    pub content: String,
    pub is_error: bool,
}

impl ToolOutcome {
    pub fn success(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: false,
        }
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: true,
        }
    }
}

impl From<ToolError> for ToolOutcome {
    fn from(err: ToolError) -> Self {
        Self::error(err.to_string())
    }
}

/// Typed accessors over a tool call's argument map.
#[derive(Debug, Clone, Default)]
pub struct ToolArgs(serde_json::Map<String, serde_json::Value>);

impl ToolArgs {
    pub fn new(map: serde_json::Map<String, serde_json::Value>) -> Self {
        Self(map)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.get(key).is_some_and(|v| !v.is_null())
    }

    /// A required string argument.
    pub fn required_str(&self, key: &str) -> Result<&str, ToolError> {
        match self.0.get(key) {
            None | Some(serde_json::Value::Null) => Err(ToolError::MissingParameter(key.into())),
            Some(v) => v
                .as_str()
                .ok_or_else(|| ToolError::InvalidArguments(format!("'{key}' must be a string"))),
        }
    }

    /// An optional string argument.
    pub fn optional_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|v| v.as_str())
    }

    /// A required list of strings. A single string is accepted as a one-element list.
    pub fn required_str_list(&self, key: &str) -> Result<Vec<String>, ToolError> {
        match self.0.get(key) {
            None | Some(serde_json::Value::Null) => Err(ToolError::MissingParameter(key.into())),
            Some(serde_json::Value::String(s)) => Ok(vec![s.clone()]),
            Some(serde_json::Value::Array(items)) => items
                .iter()
                .map(|v| {
                    v.as_str().map(String::from).ok_or_else(|| {
                        ToolError::InvalidArguments(format!("'{key}' must contain only strings"))
                    })
                })
                .collect(),
            Some(_) => Err(ToolError::InvalidArguments(format!(
                "'{key}' must be a list of strings"
            ))),
        }
    }

    pub fn as_map(&self) -> &serde_json::Map<String, serde_json::Value> {
        &self.0
    }
}

/// The core Tool trait.
///
/// Each built-in (create_file, edit_and_apply, execute_code, ...) implements
/// this trait and is registered in the ToolRegistry.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "create_file").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the model).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Execute the tool with already-validated arguments.
    async fn execute(&self, args: &ToolArgs) -> Result<ToolOutcome, ToolError>;

    /// Convert this tool into a ToolDefinition for sending to the model.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

struct RegisteredTool {
    tool: Box<dyn Tool>,
    required: Vec<String>,
}

/// A registry of available tools.
///
/// The orchestrator uses this to:
/// 1. Get tool definitions to send to the model
/// 2. Dispatch tool calls by name, always producing a `ToolOutcome`
pub struct ToolRegistry {
    tools: HashMap<String, RegisteredTool>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool after validating its declared schema.
    pub fn register(&mut self, tool: Box<dyn Tool>) -> Result<(), ToolError> {
        let name = tool.name().to_string();
        if name.is_empty() {
            return Err(ToolError::InvalidSchema {
                tool_name: name,
                reason: "tool name must not be empty".into(),
            });
        }
        if self.tools.contains_key(&name) {
            return Err(ToolError::Duplicate(name));
        }
        let required = validate_schema(&name, &tool.parameters_schema())?;
        debug!(tool = %name, required = ?required, "Registered tool");
        self.tools.insert(name, RegisteredTool { tool, required });
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|t| t.tool.as_ref())
    }

    /// All tool definitions, sorted by name for a stable request shape.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<_> = self.tools.values().map(|t| t.tool.to_definition()).collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// Dispatch a tool call. Total over all names: never returns an error.
    pub async fn dispatch(
        &self,
        name: &str,
        args: serde_json::Map<String, serde_json::Value>,
    ) -> ToolOutcome {
        let Some(entry) = self.tools.get(name) else {
            warn!(tool = %name, "Model requested unknown tool");
            return ToolError::NotFound(name.into()).into();
        };

        let args = ToolArgs::new(args);
        if let Some(missing) = entry.required.iter().find(|p| !args.contains(p)) {
            warn!(tool = %name, parameter = %missing, "Tool call missing parameter");
            return ToolError::MissingParameter(missing.clone()).into();
        }

        match entry.tool.execute(&args).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(tool = %name, error = %e, "Tool execution failed");
                e.into()
            }
        }
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.tools.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Check that `schema` is an object schema whose `required` entries are all
/// declared properties. Returns the required parameter names.
fn validate_schema(tool_name: &str, schema: &serde_json::Value) -> Result<Vec<String>, ToolError> {
    let invalid = |reason: &str| ToolError::InvalidSchema {
        tool_name: tool_name.into(),
        reason: reason.into(),
    };

    if schema.get("type").and_then(|t| t.as_str()) != Some("object") {
        return Err(invalid("parameters schema must have type \"object\""));
    }
    let properties = schema
        .get("properties")
        .and_then(|p| p.as_object())
        .ok_or_else(|| invalid("parameters schema must declare properties"))?;

    let required = match schema.get("required") {
        None => Vec::new(),
        Some(serde_json::Value::Array(items)) => items
            .iter()
            .map(|v| {
                v.as_str()
                    .map(String::from)
                    .ok_or_else(|| invalid("required entries must be strings"))
            })
            .collect::<Result<Vec<_>, _>>()?,
        Some(_) => return Err(invalid("required must be an array")),
    };

    if let Some(undeclared) = required.iter().find(|r| !properties.contains_key(*r)) {
        return Err(invalid(&format!(
            "required parameter '{undeclared}' is not a declared property"
        )));
    }
    Ok(required)
}
