//! Capability abstraction.

use async_trait::async_trait;
use delegate_core::{Arguments, TaskKind};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

/// A tool that can be invoked.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Get tool name.
    fn name(&self) -> &str;

    /// Get tool description.
    fn description(&self) -> &str;

    /// Invoke the tool. When run as a delegated task the body gets a thread
    /// of its own, so it may block (synchronous clients, heavy compute).
    async fn invoke(&self, arguments: &Arguments) -> Result<Value, anyhow::Error>;

    /// Get tool schema (for AI discovery).
    fn schema(&self) -> ToolSchema;
}

/// A sub-agent that runs its own reasoning loop for a delegated request.
#[async_trait]
pub trait ManagedAgent: Send + Sync {
    /// Get agent name.
    fn name(&self) -> &str;

    /// Get agent description.
    fn description(&self) -> &str;

    /// Run the agent on the given arguments (usually a `task` string). May
    /// block, like [`Tool::invoke`].
    async fn run(&self, arguments: &Arguments) -> Result<Value, anyhow::Error>;
}

/// A resolved invocable target.
///
/// Dispatch and execution only ever see this type, never the concrete kind.
#[derive(Clone)]
pub enum Capability {
    /// A plain tool
    Tool(Arc<dyn Tool>),
    /// A managed sub-agent
    ManagedAgent(Arc<dyn ManagedAgent>),
}

impl Capability {
    /// Kind tag of the capability.
    pub fn kind(&self) -> TaskKind {
        match self {
            Capability::Tool(_) => TaskKind::Tool,
            Capability::ManagedAgent(_) => TaskKind::ManagedAgent,
        }
    }

    /// Registered name.
    pub fn name(&self) -> &str {
        match self {
            Capability::Tool(tool) => tool.name(),
            Capability::ManagedAgent(agent) => agent.name(),
        }
    }

    /// Invoke the capability.
    pub async fn invoke(&self, arguments: &Arguments) -> Result<Value, anyhow::Error> {
        match self {
            Capability::Tool(tool) => tool.invoke(arguments).await,
            Capability::ManagedAgent(agent) => agent.run(arguments).await,
        }
    }
}

impl std::fmt::Debug for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Capability({}:{})", self.kind(), self.name())
    }
}

/// Tool schema for AI discovery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    /// Tool name
    pub name: String,

    /// Description
    pub description: String,

    /// Parameters
    pub parameters: Vec<Parameter>,
}

impl ToolSchema {
    /// Create a schema with no parameters.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: Vec::new(),
        }
    }

    /// Add a parameter.
    pub fn param(mut self, parameter: Parameter) -> Self {
        self.parameters.push(parameter);
        self
    }

    /// Names of required parameters.
    pub fn required(&self) -> impl Iterator<Item = &str> {
        self.parameters
            .iter()
            .filter(|p| p.required)
            .map(|p| p.name.as_str())
    }

    /// Render as a JSON Schema `object` for model tool-calling APIs.
    pub fn input_schema(&self) -> Value {
        let mut properties = serde_json::Map::new();
        for p in &self.parameters {
            let mut prop = json!({
                "type": p.param_type,
                "description": p.description,
            });
            if let Some(default) = &p.default {
                prop["default"] = default.clone();
            }
            if !p.required {
                prop["nullable"] = Value::Bool(true);
            }
            properties.insert(p.name.clone(), prop);
        }
        let required: Vec<&str> = self.required().collect();
        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }
}

/// A tool parameter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Parameter {
    /// Parameter name
    pub name: String,

    /// Description
    pub description: String,

    /// Type
    pub param_type: String,

    /// Required
    pub required: bool,

    /// Default value
    pub default: Option<Value>,
}

impl Parameter {
    /// A required parameter.
    pub fn required(
        name: impl Into<String>,
        param_type: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            param_type: param_type.into(),
            required: true,
            default: None,
        }
    }

    /// An optional parameter.
    pub fn optional(
        name: impl Into<String>,
        param_type: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            required: false,
            ..Self::required(name, param_type, description)
        }
    }

    /// Set the default value.
    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_schema_shape() {
        let schema = ToolSchema::new("search", "Web search")
            .param(Parameter::required("query", "string", "Search query"))
            .param(Parameter::optional("limit", "integer", "Max hits").with_default(json!(5)));

        let input = schema.input_schema();
        assert_eq!(input["type"], "object");
        assert_eq!(input["required"], json!(["query"]));
        assert_eq!(input["properties"]["query"]["type"], "string");
        assert_eq!(input["properties"]["limit"]["default"], 5);
        assert_eq!(input["properties"]["limit"]["nullable"], true);
        assert!(input["properties"]["query"].get("nullable").is_none());
    }
}
