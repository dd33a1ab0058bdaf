//! Haptic vibration tool.

use async_trait::async_trait;
use lily_core::error::ToolError;
use lily_core::tool::{Tool, ToolResult};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::info;

const DEFAULT_DURATION_MS: f64 = 400.0;

/// The device's vibration motor.
#[async_trait]
pub trait Haptics: Send + Sync {
    /// Whether the device can play on/off patterns. When it can't, the tool
    /// plays the pattern's total duration as one pulse.
    fn supports_patterns(&self) -> bool {
        true
    }

    /// Play alternating vibrate/pause timings in milliseconds.
    async fn vibrate(&self, timings_ms: &[u64]) -> Result<(), ToolError>;
}

/// Haptics for hosts without a motor: the pattern is only logged.
pub struct LogHaptics;

#[async_trait]
impl Haptics for LogHaptics {
    async fn vibrate(&self, timings_ms: &[u64]) -> Result<(), ToolError> {
        info!(timings = ?timings_ms, "Vibrate");
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pattern {
    Single,
    Double,
    Triple,
    Custom,
}

impl Pattern {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "single" => Some(Self::Single),
            "double" => Some(Self::Double),
            "triple" => Some(Self::Triple),
            "custom" => Some(Self::Custom),
            _ => None,
        }
    }

    /// Vibrate/pause timings for a base duration `d`.
    pub fn timings(self, d: f64) -> Vec<f64> {
        match self {
            Self::Single => vec![d],
            Self::Double => vec![d, 100.0, d],
            Self::Triple => vec![d, 100.0, d, 100.0, d],
            Self::Custom => vec![d, 200.0, d * 0.5, 200.0, d],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intensity {
    Light,
    Medium,
    Strong,
}

impl Intensity {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "light" => Some(Self::Light),
            "medium" => Some(Self::Medium),
            "strong" => Some(Self::Strong),
            _ => None,
        }
    }

    pub fn multiplier(self) -> f64 {
        match self {
            Self::Light => 0.5,
            Self::Medium => 1.0,
            Self::Strong => 1.5,
        }
    }
}

/// Compute the timings for a vibration request.
pub fn vibration_timings(duration_ms: f64, pattern: Pattern, intensity: Intensity) -> Vec<u64> {
    let base = duration_ms * intensity.multiplier();
    pattern
        .timings(base)
        .into_iter()
        .map(|t| t.round().max(0.0) as u64)
        .collect()
}

pub struct VibrationTool {
    haptics: Arc<dyn Haptics>,
}

impl VibrationTool {
    pub fn new(haptics: Arc<dyn Haptics>) -> Self {
        Self { haptics }
    }
}

impl Default for VibrationTool {
    fn default() -> Self {
        Self::new(Arc::new(LogHaptics))
    }
}

fn string_arg<'a>(arguments: &'a Map<String, Value>, key: &str, default: &'a str) -> &'a str {
    arguments.get(key).and_then(Value::as_str).unwrap_or(default)
}

#[async_trait]
impl Tool for VibrationTool {
    fn name(&self) -> &str {
        "vibrate_device"
    }

    fn description(&self) -> &str {
        "Trigger haptic vibration on the device with customizable parameters"
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "duration": {
                    "type": "number",
                    "description": "Duration of vibration in milliseconds (default: 400)"
                },
                "pattern": {
                    "type": "string",
                    "description": "Vibration pattern type: \"single\", \"double\", \"triple\", or \"custom\""
                },
                "intensity": {
                    "type": "string",
                    "description": "Vibration intensity: \"light\", \"medium\", or \"strong\""
                }
            },
            "required": []
        })
    }

    async fn execute(&self, arguments: &Map<String, Value>) -> Result<ToolResult, ToolError> {
        let duration = arguments
            .get("duration")
            .and_then(Value::as_f64)
            .unwrap_or(DEFAULT_DURATION_MS);
        if !duration.is_finite() || duration < 0.0 {
            return Err(ToolError::InvalidArguments(format!(
                "duration must be a non-negative number of milliseconds, got {duration}"
            )));
        }

        let pattern_name = string_arg(arguments, "pattern", "single");
        let pattern = Pattern::parse(pattern_name).ok_or_else(|| {
            ToolError::InvalidArguments(format!("unknown pattern '{pattern_name}'"))
        })?;

        let intensity_name = string_arg(arguments, "intensity", "medium");
        let intensity = Intensity::parse(intensity_name).ok_or_else(|| {
            ToolError::InvalidArguments(format!("unknown intensity '{intensity_name}'"))
        })?;

        let mut timings = vibration_timings(duration, pattern, intensity);
        if !self.haptics.supports_patterns() {
            timings = vec![timings.iter().sum()];
        }

        self.haptics.vibrate(&timings).await?;

        Ok(ToolResult::ok(format!(
            "Vibrated device ({pattern_name}, {intensity_name}): {timings:?} ms"
        )))
    }
}
