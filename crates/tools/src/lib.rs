//! Capability Integration
//!
//! Tools and managed agents a control loop can delegate work to, and the
//! registry the dispatcher resolves submissions against.

#![warn(missing_docs)]

pub mod r#trait;
pub mod registry;
pub mod builtin;

pub use r#trait::{Capability, ManagedAgent, Parameter, Tool, ToolSchema};
pub use registry::{CapabilityRegistry, RegistryError};
pub use builtin::{DelayTool, EchoTool, ShellTool};
