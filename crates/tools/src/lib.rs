//! Tools the model can ask Lily to run.
//!
//! [`ToolGateway`] validates and executes calls; the built-in tools hand
//! their side effects to collaborator traits ([`Haptics`], [`CodeRunner`]).

pub mod gateway;
pub mod python;
pub mod schema;
pub mod vibration;

pub use gateway::ToolGateway;
pub use python::{CodeRunner, PythonInterpreterTool, SimulatedRunner};
pub use vibration::{Haptics, LogHaptics, VibrationTool};

/// A gateway with the built-in tools and their default collaborators.
pub fn default_gateway() -> ToolGateway {
    let mut gateway = ToolGateway::new();
    gateway.register(Box::new(VibrationTool::default()));
    gateway.register(Box::new(PythonInterpreterTool::default()));
    gateway
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_gateway_has_builtins() {
        let names: Vec<String> = default_gateway()
            .list_tools()
            .into_iter()
            .map(|d| d.name)
            .collect();
        assert_eq!(names, vec!["python_interpreter", "vibrate_device"]);
    }
}
