//! Argument validation against a tool's declared JSON schema.
//!
//! Only the subset tools actually declare is checked: a top-level object,
//! `required` keys, and primitive `type`s of declared properties.

use serde_json::{Map, Value};

/// Check `arguments` against `schema`. The error is a human-readable reason.
pub fn validate(schema: &Value, arguments: &Map<String, Value>) -> Result<(), String> {
    if let Some(kind) = schema.get("type").and_then(Value::as_str)
        && kind != "object"
    {
        return Err(format!("schema must describe an object, found '{kind}'"));
    }

    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        for key in required.iter().filter_map(Value::as_str) {
            if !arguments.contains_key(key) {
                return Err(format!("missing required argument '{key}'"));
            }
        }
    }

    let Some(properties) = schema.get("properties").and_then(Value::as_object) else {
        return Ok(());
    };

    for (name, value) in arguments {
        let Some(expected) = properties
            .get(name)
            .and_then(|p| p.get("type"))
            .and_then(Value::as_str)
        else {
            // Undeclared or untyped arguments pass through.
            continue;
        };
        if !matches_type(expected, value) {
            return Err(format!(
                "argument '{name}' must be {expected}, got {}",
                type_name(value)
            ));
        }
    }
    Ok(())
}

fn matches_type(expected: &str, value: &Value) -> bool {
    match expected {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        "object" => value.is_object(),
        "array" => value.is_array(),
        "null" => value.is_null(),
        _ => true,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    fn schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "code": { "type": "string" },
                "count": { "type": "integer" },
                "ratio": { "type": "number" },
                "flags": { "type": "array" }
            },
            "required": ["code"]
        })
    }

    #[test]
    fn valid_arguments_pass() {
        let result = validate(&schema(), &args(json!({"code": "print(1)", "count": 2, "ratio": 0.5})));
        assert!(result.is_ok());
    }

    #[test]
    fn missing_required_key() {
        let err = validate(&schema(), &args(json!({"count": 2}))).unwrap_err();
        assert!(err.contains("'code'"));
    }

    #[test]
    fn wrong_primitive_type() {
        let err = validate(&schema(), &args(json!({"code": 42}))).unwrap_err();
        assert_eq!(err, "argument 'code' must be string, got number");
    }

    #[test]
    fn integer_rejects_fraction() {
        assert!(validate(&schema(), &args(json!({"code": "", "count": 1.5}))).is_err());
        assert!(validate(&schema(), &args(json!({"code": "", "ratio": 3}))).is_ok());
    }

    #[test]
    fn undeclared_arguments_pass_through() {
        assert!(validate(&schema(), &args(json!({"code": "", "extra": true}))).is_ok());
    }

    #[test]
    fn empty_schema_accepts_anything() {
        assert!(validate(&json!({}), &args(json!({"a": 1}))).is_ok());
    }

    #[test]
    fn non_object_schema_rejected() {
        assert!(validate(&json!({"type": "string"}), &Map::new()).is_err());
    }
}
