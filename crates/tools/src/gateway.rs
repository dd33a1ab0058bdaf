//! Tool registry and executor.
//!
//! The gateway owns the set of invocable tools, validates each call against
//! the tool's declared schema and wraps every outcome in a [`ToolResult`].
//! It never returns an error to the caller.

use futures::FutureExt;
use lily_core::tool::{Tool, ToolCall, ToolDefinition, ToolResult};
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::time::Instant;
use tracing::{info, warn};

use crate::schema;

#[derive(Default)]
pub struct ToolGateway {
    tools: HashMap<String, Box<dyn Tool>>,
}

impl ToolGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool; a tool with the same name is replaced.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), tool).is_some() {
            warn!(tool = %name, "Replacing previously registered tool");
        }
    }

    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    /// Definitions of all registered tools, sorted by name.
    pub fn list_tools(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self.tools.values().map(|t| t.to_definition()).collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Execute one call. Every failure mode comes back as an unsuccessful
    /// [`ToolResult`].
    pub async fn execute(&self, call: &ToolCall) -> ToolResult {
        let Some(tool) = self.tools.get(&call.name) else {
            warn!(tool = %call.name, "Tool not found");
            return ToolResult::failure(format!("tool not found: {}", call.name));
        };

        if let Some(reason) = &call.arguments_error {
            warn!(tool = %call.name, reason = %reason, "Rejected unreadable tool arguments");
            return ToolResult::failure(format!("invalid arguments: {reason}"));
        }

        if let Err(reason) = schema::validate(&tool.parameters_schema(), &call.arguments) {
            warn!(tool = %call.name, reason = %reason, "Rejected tool arguments");
            return ToolResult::failure(format!("invalid arguments: {reason}"));
        }

        let started = Instant::now();
        let outcome = AssertUnwindSafe(tool.execute(&call.arguments))
            .catch_unwind()
            .await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let result = match outcome {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => ToolResult::failure(e.to_string()),
            Err(panic) => {
                let detail = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".into());
                ToolResult::failure(format!("tool '{}' panicked: {detail}", call.name))
            }
        };

        info!(
            tool = %call.name,
            success = result.success,
            duration_ms = elapsed_ms,
            "Tool executed"
        );
        result
    }
}
