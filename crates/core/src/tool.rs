//! Tool trait: actions the model can ask the client to perform.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ToolError;

/// A model's request to run a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Name of the tool to execute
    pub name: String,

    /// Arguments keyed by parameter name
    #[serde(default)]
    pub arguments: serde_json::Map<String, serde_json::Value>,

    /// Set when the model's arguments could not be read as a JSON object.
    /// Such a call must not be executed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments_error: Option<String>,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, arguments: serde_json::Value) -> Self {
        match arguments {
            serde_json::Value::Object(map) => Self {
                name: name.into(),
                arguments: map,
                arguments_error: None,
            },
            other => Self::malformed(
                name,
                format!("arguments must be a JSON object, got {}", json_kind(&other)),
            ),
        }
    }

    /// A call whose arguments were unreadable.
    pub fn malformed(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            arguments: serde_json::Map::new(),
            arguments_error: Some(reason.into()),
        }
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

/// The outcome of one tool execution. Failures are data, not errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    pub output: String,
}

impl ToolResult {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
        }
    }

    pub fn failure(output: impl Into<String>) -> Self {
        Self {
            success: false,
            output: output.into(),
        }
    }
}

/// A tool definition sent to the model so it knows what it can call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,

    /// JSON Schema describing the parameters
    pub parameters: serde_json::Value,
}

/// The core Tool trait.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "vibrate_device").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the model).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Execute the tool. Arguments have already been checked against
    /// [`parameters_schema`](Self::parameters_schema).
    async fn execute(
        &self,
        arguments: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<ToolResult, ToolError>;

    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_call_from_non_object_is_malformed() {
        let call = ToolCall::new("vibrate_device", serde_json::json!("oops"));
        assert!(call.arguments.is_empty());
        assert_eq!(
            call.arguments_error.as_deref(),
            Some("arguments must be a JSON object, got string")
        );
    }

    #[test]
    fn tool_call_from_object_is_well_formed() {
        let call = ToolCall::new("vibrate_device", serde_json::json!({"duration": 200}));
        assert_eq!(call.arguments["duration"], 200);
        assert!(call.arguments_error.is_none());
    }

    #[test]
    fn tool_call_missing_arguments_deserializes() {
        let call: ToolCall = serde_json::from_str(r#"{"name":"vibrate_device"}"#).unwrap();
        assert_eq!(call.name, "vibrate_device");
        assert!(call.arguments.is_empty());
        assert!(call.arguments_error.is_none());
    }

    #[test]
    fn tool_definition_serialization() {
        let def = ToolDefinition {
            name: "python_interpreter".into(),
            description: "Run python".into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": { "code": { "type": "string" } },
                "required": ["code"]
            }),
        };
        let json = serde_json::to_string(&def).unwrap();
        assert!(json.contains("python_interpreter"));
        assert!(json.contains("code"));
    }
}
