//! Capability registry - resolves `(kind, name)` to something invocable.

use delegate_core::{Arguments, TaskKind};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::r#trait::{Capability, ManagedAgent, Tool};

/// Errors raised while resolving a submission target.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// No tool with that name
    #[error("Tool '{0}' not found")]
    UnknownTool(String),

    /// No managed agent with that name
    #[error("Managed agent '{0}' not found")]
    UnknownAgent(String),

    /// A required parameter is missing from the arguments
    #[error("Tool '{target}' requires argument '{parameter}'")]
    MissingArgument {
        /// Tool name
        target: String,
        /// Missing parameter
        parameter: String,
    },
}

/// Registry of tools and managed agents, keyed by name.
#[derive(Clone, Default)]
pub struct CapabilityRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    agents: HashMap<String, Arc<dyn ManagedAgent>>,
}

impl CapabilityRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool under its own name, replacing any previous one.
    pub fn register_tool(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        self.tools.insert(name.clone(), tool);
        debug!("Registered tool: {}", name);
    }

    /// Register a managed agent under its own name.
    pub fn register_agent(&mut self, agent: Arc<dyn ManagedAgent>) {
        let name = agent.name().to_string();
        self.agents.insert(name.clone(), agent);
        debug!("Registered managed agent: {}", name);
    }

    /// Builder form of [`register_tool`](Self::register_tool).
    pub fn with_tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.register_tool(tool);
        self
    }

    /// Builder form of [`register_agent`](Self::register_agent).
    pub fn with_agent(mut self, agent: Arc<dyn ManagedAgent>) -> Self {
        self.register_agent(agent);
        self
    }

    /// Registered tool names, sorted.
    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// Registered agent names, sorted.
    pub fn agent_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.agents.keys().cloned().collect();
        names.sort();
        names
    }

    /// Resolve a target and check the arguments against its schema.
    pub fn resolve(
        &self,
        kind: TaskKind,
        name: &str,
        arguments: &Arguments,
    ) -> Result<Capability, RegistryError> {
        match kind {
            TaskKind::Tool => {
                let tool = self
                    .tools
                    .get(name)
                    .ok_or_else(|| RegistryError::UnknownTool(name.to_string()))?;
                let schema = tool.schema();
                if let Some(missing) = schema.required().find(|p| !arguments.contains_key(*p)) {
                    return Err(RegistryError::MissingArgument {
                        target: name.to_string(),
                        parameter: missing.to_string(),
                    });
                }
                Ok(Capability::Tool(Arc::clone(tool)))
            }
            TaskKind::ManagedAgent => self
                .agents
                .get(name)
                .map(|agent| Capability::ManagedAgent(Arc::clone(agent)))
                .ok_or_else(|| RegistryError::UnknownAgent(name.to_string())),
        }
    }
}

impl std::fmt::Debug for CapabilityRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityRegistry")
            .field("tools", &self.tool_names())
            .field("agents", &self.agent_names())
            .finish()
    }
}
