//! Function/tool registry: name → JSON schema + async handler.
//!
//! Read-only after startup. Populated with a couple of illustrative handlers so the
//! dispatch path is exercised end to end; only the registry's shape is load-bearing,
//! the handlers themselves are a starting point for real tool integrations.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

/// A registered function handler.
#[async_trait]
pub trait FunctionHandler: Send + Sync {
    /// JSON schema for the function's arguments, surfaced to the model at session
    /// config time.
    fn schema(&self) -> Value;

    /// Run the handler against parsed arguments. Errors here are caught by
    /// `dispatch` and turned into the `{ error: ... }` shape — handlers
    /// may freely return `Err` for any failure.
    async fn call(&self, arguments: Value) -> Result<Value, String>;
}

/// Outcome of dispatching a function call: always a string or JSON value to
/// serialize into `function_call_output.output`, never a hard failure.
pub struct FunctionRegistry {
    handlers: HashMap<String, Arc<dyn FunctionHandler>>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self { handlers: HashMap::new() }
    }

    pub fn register(&mut self, name: impl Into<String>, handler: Arc<dyn FunctionHandler>) {
        self.handlers.insert(name.into(), handler);
    }

    /// Seed registry with illustrative demo handlers (`get_weather_from_coords`,
    /// `hang_up`).
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("get_weather_from_coords", Arc::new(GetWeatherFromCoords));
        registry.register("hang_up", Arc::new(HangUp));
        registry
    }

    /// Dispatch a function call by name, with a fixed error shape for each failure mode:
    /// - missing handler → `{ error: "No handler found for function: <name>" }`
    /// - bad JSON args → `{ error: "Invalid JSON arguments for function call." }`
    /// - handler error → `{ error: "Error running function <name>: <msg>" }`
    ///
    /// The returned string is already the serialized `output` field: strings pass
    /// through as-is, anything else is JSON-encoded.
    pub async fn dispatch(&self, name: &str, raw_arguments: &str) -> String {
        let Some(handler) = self.handlers.get(name) else {
            return serialize_error(format!("No handler found for function: {name}"));
        };

        let arguments: Value = match serde_json::from_str(raw_arguments) {
            Ok(v) => v,
            Err(_) => return serialize_error("Invalid JSON arguments for function call.".to_string()),
        };

        match handler.call(arguments).await {
            Ok(Value::String(s)) => s,
            Ok(other) => serde_json::to_string(&other).unwrap_or_default(),
            Err(msg) => serialize_error(format!("Error running function {name}: {msg}")),
        }
    }
}

impl Default for FunctionRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

fn serialize_error(message: String) -> String {
    serde_json::to_string(&serde_json::json!({ "error": message })).unwrap_or(message)
}

struct GetWeatherFromCoords;

#[async_trait]
impl FunctionHandler for GetWeatherFromCoords {
    fn schema(&self) -> Value {
        serde_json::json!({
            "name": "get_weather_from_coords",
            "description": "Look up current weather for a latitude/longitude pair.",
            "parameters": {
                "type": "object",
                "properties": {
                    "latitude": { "type": "number" },
                    "longitude": { "type": "number" },
                },
                "required": ["latitude", "longitude"],
            },
        })
    }

    async fn call(&self, arguments: Value) -> Result<Value, String> {
        let lat = arguments.get("latitude").and_then(Value::as_f64).ok_or("missing latitude")?;
        let lon = arguments.get("longitude").and_then(Value::as_f64).ok_or("missing longitude")?;
        // Demo-only placeholder; a real deployment wires this to a weather provider.
        let _ = (lat, lon);
        Ok(serde_json::json!({ "temp": 10 }))
    }
}

struct HangUp;

#[async_trait]
impl FunctionHandler for HangUp {
    fn schema(&self) -> Value {
        serde_json::json!({
            "name": "hang_up",
            "description": "End the current call.",
            "parameters": { "type": "object", "properties": {} },
        })
    }

    async fn call(&self, _arguments: Value) -> Result<Value, String> {
        Ok(Value::String("call ended".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn dispatch_resolves_registered_handler_and_serializes_output() {
        let registry = FunctionRegistry::with_defaults();
        let output = registry
            .dispatch("get_weather_from_coords", "{\"latitude\":1,\"longitude\":2}")
            .await;
        assert_eq!(output, "{\"temp\":10}");
    }

    #[tokio::test]
    async fn missing_handler_produces_named_error() {
        let registry = FunctionRegistry::with_defaults();
        let output = registry.dispatch("no_such_function", "{}").await;
        assert_eq!(output, "{\"error\":\"No handler found for function: no_such_function\"}");
    }

    #[tokio::test]
    async fn invalid_json_arguments_produces_fixed_error() {
        let registry = FunctionRegistry::with_defaults();
        let output = registry.dispatch("get_weather_from_coords", "not json").await;
        assert_eq!(output, "{\"error\":\"Invalid JSON arguments for function call.\"}");
    }

    #[tokio::test]
    async fn handler_error_is_wrapped() {
        let registry = FunctionRegistry::with_defaults();
        let output = registry.dispatch("get_weather_from_coords", "{\"latitude\":1}").await;
        assert_eq!(output, "{\"error\":\"Error running function get_weather_from_coords: missing longitude\"}");
    }
}
