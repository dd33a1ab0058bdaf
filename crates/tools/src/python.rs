//! Python interpreter tool.
//!
//! The tool only owns the contract; actual execution belongs to a
//! [`CodeRunner`]. [`SimulatedRunner`] stands in where no interpreter is
//! available.

use async_trait::async_trait;
use lily_core::error::ToolError;
use lily_core::tool::{Tool, ToolResult};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::debug;

/// Something that can run Python source and return its stdout.
#[async_trait]
pub trait CodeRunner: Send + Sync {
    async fn run(&self, code: &str) -> Result<String, ToolError>;
}

/// Echoes the argument of the first `print(...)`, or reports a simulated run.
pub struct SimulatedRunner;

#[async_trait]
impl CodeRunner for SimulatedRunner {
    async fn run(&self, code: &str) -> Result<String, ToolError> {
        if let Some(printed) = first_print_argument(code) {
            return Ok(printed);
        }
        Ok(format!(
            "[System]: Python code executed successfully.\n\
             (Note: Actual Python execution requires a native runtime. This is a simulation.)\n\n\
             Code:\n{code}"
        ))
    }
}

/// Text between the first `print(` and the last `)` on that line, quotes
/// removed.
fn first_print_argument(code: &str) -> Option<String> {
    let line = code.lines().find(|l| l.contains("print("))?;
    let start = line.find("print(")? + "print(".len();
    let end = line.rfind(')')?;
    if end < start {
        return None;
    }
    Some(line[start..end].replace(['\'', '"'], ""))
}

pub struct PythonInterpreterTool {
    runner: Arc<dyn CodeRunner>,
}

impl PythonInterpreterTool {
    pub fn new(runner: Arc<dyn CodeRunner>) -> Self {
        Self { runner }
    }
}

impl Default for PythonInterpreterTool {
    fn default() -> Self {
        Self::new(Arc::new(SimulatedRunner))
    }
}

#[async_trait]
impl Tool for PythonInterpreterTool {
    fn name(&self) -> &str {
        "python_interpreter"
    }

    fn description(&self) -> &str {
        "A Python environment. Use this to execute Python code to calculate results, process data, \
         or run algorithms. The code is executed in a sandboxed environment. The output of the code \
         (stdout) will be returned."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "code": {
                    "type": "string",
                    "description": "The Python code to execute."
                }
            },
            "required": ["code"]
        })
    }

    async fn execute(&self, arguments: &Map<String, Value>) -> Result<ToolResult, ToolError> {
        let code = arguments
            .get("code")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'code' argument".into()))?;

        debug!(chars = code.len(), "Running python code");
        let output = self.runner.run(code).await?;
        Ok(ToolResult::ok(output))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn print_argument_extraction() {
        assert_eq!(first_print_argument("print('hello')").as_deref(), Some("hello"));
        assert_eq!(
            first_print_argument("x = 2\nprint(\"sum\", x + 1)").as_deref(),
            Some("sum, x + 1")
        );
        assert_eq!(first_print_argument("x = 1"), None);
    }

    #[tokio::test]
    async fn simulated_run_without_print() {
        let tool = PythonInterpreterTool::default();
        let args = json!({"code": "x = 6 * 7"});
        let result = tool.execute(args.as_object().unwrap()).await.unwrap();
        assert!(result.success);
        assert!(result.output.contains("simulation"));
        assert!(result.output.ends_with("x = 6 * 7"));
    }

    #[tokio::test]
    async fn simulated_run_echoes_print() {
        let tool = PythonInterpreterTool::default();
        let args = json!({"code": "print('42')"});
        let result = tool.execute(args.as_object().unwrap()).await.unwrap();
        assert_eq!(result.output, "42");
    }

    #[tokio::test]
    async fn missing_code_is_invalid() {
        let tool = PythonInterpreterTool::default();
        let err = tool.execute(&Map::new()).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }
}
