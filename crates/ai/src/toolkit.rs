//! `AsyncToolkit` - one manager plus the control tools over it.

use std::sync::Arc;

use delegate_core::Arguments;
use delegate_execution::{ManagerConfig, TaskManager};
use delegate_tools::{CapabilityRegistry, ManagedAgent, Tool, ToolSchema};
use serde_json::Value;
use tracing::info;

use crate::control::control_tools;
use crate::guidance;

/// Gives a control loop asynchronous delegation.
///
/// The wrapped tools and managed agents become submission targets; the
/// control loop itself sees only the six control tools.
pub struct AsyncToolkit {
    manager: Arc<TaskManager>,
    control: Vec<Arc<dyn Tool>>,
}

impl AsyncToolkit {
    /// Register `tools` and `agents` and start a manager over them. Must be
    /// called inside a tokio runtime.
    pub fn new(
        tools: Vec<Arc<dyn Tool>>,
        agents: Vec<Arc<dyn ManagedAgent>>,
        config: ManagerConfig,
    ) -> Self {
        let mut registry = CapabilityRegistry::new();
        for tool in tools {
            registry.register_tool(tool);
        }
        for agent in agents {
            registry.register_agent(agent);
        }
        Self::from_registry(registry, config)
    }

    /// Start a manager over an existing registry.
    pub fn from_registry(registry: CapabilityRegistry, config: ManagerConfig) -> Self {
        Self::from_manager(Arc::new(TaskManager::start(registry, config)))
    }

    /// Wrap an already running manager.
    pub fn from_manager(manager: Arc<TaskManager>) -> Self {
        let control = control_tools(&manager);
        info!(
            control_tools = control.len(),
            targets = manager.registry().tool_names().len() + manager.registry().agent_names().len(),
            "AsyncToolkit ready"
        );
        Self { manager, control }
    }

    /// The shared manager.
    pub fn manager(&self) -> &Arc<TaskManager> {
        &self.manager
    }

    /// The six control tools.
    pub fn tools(&self) -> &[Arc<dyn Tool>] {
        &self.control
    }

    /// Control tool by name.
    pub fn tool(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.control.iter().find(|tool| tool.name() == name)
    }

    /// Schemas of the control tools, for a model's tool list.
    pub fn schemas(&self) -> Vec<ToolSchema> {
        self.control.iter().map(|tool| tool.schema()).collect()
    }

    /// Call a control tool by name.
    pub async fn call(&self, name: &str, arguments: &Arguments) -> anyhow::Result<Value> {
        let tool = self
            .tool(name)
            .ok_or_else(|| anyhow::anyhow!("Unknown control tool '{}'", name))?;
        tool.invoke(arguments).await
    }

    /// `system_prompt` with the async guidance appended.
    pub fn system_prompt(&self, system_prompt: &str) -> String {
        guidance::with_guidance(system_prompt)
    }

    /// Stop the manager after queued tasks finish.
    pub async fn shutdown(&self) {
        self.manager.shutdown().await;
    }
}
