//! Inbound (model → bridge) event types.
//!
//! The model protocol covers dozens of event shapes, so this decodes into a tagged
//! sum type with explicit variants only for the events the session bridge actually
//! acts on, plus a catch-all `Other` variant that keeps the full raw document —
//! observers get a verbatim mirror either way (see `session::actor`, which broadcasts
//! the original `Value` regardless of variant).

use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Clone)]
pub enum ServerEvent {
    Error {
        code: Option<String>,
        message: Option<String>,
    },
    SpeechStarted {
        item_id: Option<String>,
    },
    OutputAudioDelta {
        item_id: String,
        delta: String,
    },
    ResponseCreated,
    ResponseDone,
    OutputItemDone {
        item: Value,
    },
    /// Any other event type, documented or not. The raw document is preserved so
    /// observers still see it verbatim (`forward-anything, warn-unknown`).
    Other {
        event_type: String,
    },
}

impl ServerEvent {
    /// Decode a raw model-leg frame into a `ServerEvent`. Returns `None` if the frame
    /// has no string `type` field at all (a malformed frame — callers should log and
    /// drop rather than propagate).
    pub fn parse(raw: &Value) -> Option<Self> {
        let event_type = raw.get("type")?.as_str()?.to_string();
        Some(match event_type.as_str() {
            "error" => {
                let err = raw.get("error");
                ServerEvent::Error {
                    code: err.and_then(|e| e.get("code")).and_then(Value::as_str).map(String::from),
                    message: err.and_then(|e| e.get("message")).and_then(Value::as_str).map(String::from),
                }
            }
            "input_audio_buffer.speech_started" => ServerEvent::SpeechStarted {
                item_id: raw.get("item_id").and_then(Value::as_str).map(String::from),
            },
            "response.output_audio.delta" => ServerEvent::OutputAudioDelta {
                item_id: raw.get("item_id").and_then(Value::as_str).unwrap_or_default().to_string(),
                delta: raw.get("delta").and_then(Value::as_str).unwrap_or_default().to_string(),
            },
            "response.created" => ServerEvent::ResponseCreated,
            "response.done" => ServerEvent::ResponseDone,
            "response.output_item.done" => ServerEvent::OutputItemDone {
                item: raw.get("item").cloned().unwrap_or(Value::Null),
            },
            _ => ServerEvent::Other { event_type },
        })
    }

    pub fn event_type(&self) -> &str {
        match self {
            ServerEvent::Error { .. } => "error",
            ServerEvent::SpeechStarted { .. } => "input_audio_buffer.speech_started",
            ServerEvent::OutputAudioDelta { .. } => "response.output_audio.delta",
            ServerEvent::ResponseCreated => "response.created",
            ServerEvent::ResponseDone => "response.done",
            ServerEvent::OutputItemDone { .. } => "response.output_item.done",
            ServerEvent::Other { event_type } => event_type,
        }
    }
}

/// A `response.output_item.done` item of type `function_call`, extracted on demand by
/// the dispatch path. Kept separate from `ServerEvent::OutputItemDone` because
/// not every `output_item.done` is a function call.
#[derive(Debug, Clone, Deserialize)]
pub struct FunctionCallItem {
    pub call_id: String,
    pub name: String,
    pub arguments: String,
}

impl FunctionCallItem {
    pub fn from_item(item: &Value) -> Option<Self> {
        if item.get("type").and_then(Value::as_str) != Some("function_call") {
            return None;
        }
        serde_json::from_value(item.clone()).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_error_event() {
        let raw = serde_json::json!({
            "type": "error",
            "error": { "code": "input_audio_buffer_commit_empty", "message": "buffer too small" }
        });
        match ServerEvent::parse(&raw).unwrap() {
            ServerEvent::Error { code, message } => {
                assert_eq!(code.as_deref(), Some("input_audio_buffer_commit_empty"));
                assert_eq!(message.as_deref(), Some("buffer too small"));
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn unknown_event_preserves_type_and_does_not_panic() {
        let raw = serde_json::json!({ "type": "something.new", "foo": "bar" });
        match ServerEvent::parse(&raw).unwrap() {
            ServerEvent::Other { event_type } => assert_eq!(event_type, "something.new"),
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn malformed_frame_has_no_type_returns_none() {
        let raw = serde_json::json!({ "foo": "bar" });
        assert!(ServerEvent::parse(&raw).is_none());
    }

    #[test]
    fn function_call_item_extracted_from_output_item_done() {
        let item = serde_json::json!({
            "type": "function_call",
            "call_id": "cc1",
            "name": "get_weather_from_coords",
            "arguments": "{\"latitude\":1,\"longitude\":2}",
        });
        let fc = FunctionCallItem::from_item(&item).unwrap();
        assert_eq!(fc.call_id, "cc1");
        assert_eq!(fc.name, "get_weather_from_coords");
    }

    #[test]
    fn non_function_call_item_returns_none() {
        let item = serde_json::json!({ "type": "message" });
        assert!(FunctionCallItem::from_item(&item).is_none());
    }
}
