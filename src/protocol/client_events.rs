//! Outbound (client → model) event types, with builder constructors: one constructor
//! per event kind rather than public struct literals everywhere.

use serde::Serialize;
use serde_json::Value;

use super::session_config::SessionConfig;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    #[serde(rename = "session.update")]
    SessionUpdate { session: SessionConfig },

    #[serde(rename = "input_audio_buffer.append")]
    InputAudioBufferAppend { audio: String },

    #[serde(rename = "input_audio_buffer.commit")]
    InputAudioBufferCommit,

    #[serde(rename = "input_audio_buffer.clear")]
    InputAudioBufferClear,

    #[serde(rename = "conversation.item.create")]
    ConversationItemCreate { item: Value },

    #[serde(rename = "conversation.item.retrieve")]
    ConversationItemRetrieve { item_id: String },

    #[serde(rename = "conversation.item.truncate")]
    ConversationItemTruncate {
        item_id: String,
        content_index: u32,
        audio_end_ms: u64,
    },

    #[serde(rename = "conversation.item.delete")]
    ConversationItemDelete { item_id: String },

    #[serde(rename = "response.create")]
    ResponseCreate,

    #[serde(rename = "response.cancel")]
    ResponseCancel,

    #[serde(rename = "output_audio_buffer.clear")]
    OutputAudioBufferClear,
}

impl ClientEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            ClientEvent::SessionUpdate { .. } => "session.update",
            ClientEvent::InputAudioBufferAppend { .. } => "input_audio_buffer.append",
            ClientEvent::InputAudioBufferCommit => "input_audio_buffer.commit",
            ClientEvent::InputAudioBufferClear => "input_audio_buffer.clear",
            ClientEvent::ConversationItemCreate { .. } => "conversation.item.create",
            ClientEvent::ConversationItemRetrieve { .. } => "conversation.item.retrieve",
            ClientEvent::ConversationItemTruncate { .. } => "conversation.item.truncate",
            ClientEvent::ConversationItemDelete { .. } => "conversation.item.delete",
            ClientEvent::ResponseCreate => "response.create",
            ClientEvent::ResponseCancel => "response.cancel",
            ClientEvent::OutputAudioBufferClear => "output_audio_buffer.clear",
        }
    }

    pub fn session_update(session: SessionConfig) -> Self {
        ClientEvent::SessionUpdate { session }
    }

    pub fn audio_append(base64_payload: impl Into<String>) -> Self {
        ClientEvent::InputAudioBufferAppend { audio: base64_payload.into() }
    }

    pub fn audio_commit() -> Self {
        ClientEvent::InputAudioBufferCommit
    }

    pub fn item_create(item: Value) -> Self {
        ClientEvent::ConversationItemCreate { item }
    }

    pub fn item_truncate(item_id: impl Into<String>, content_index: u32, audio_end_ms: u64) -> Self {
        ClientEvent::ConversationItemTruncate {
            item_id: item_id.into(),
            content_index,
            audio_end_ms,
        }
    }

    pub fn response_create() -> Self {
        ClientEvent::ResponseCreate
    }

    /// Build the `function_call_output` follow-up item for a completed function call,
    /// once the handler finishes running.
    pub fn function_call_output(call_id: impl Into<String>, output: impl Into<String>) -> Self {
        ClientEvent::ConversationItemCreate {
            item: serde_json::json!({
                "type": "function_call_output",
                "call_id": call_id.into(),
                "status": "completed",
                "output": output.into(),
            }),
        }
    }

    /// Serialize to the wire JSON string, or `None` if `event_type()` is not in the
    /// registry's client set — this should never happen for variants constructed
    /// through this enum, but callers emitting raw observer-forwarded events route
    /// through the registry gate explicitly (see `session::actor`).
    pub fn to_wire_json(&self) -> Value {
        serde_json::to_value(self).expect("ClientEvent always serializes")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::registry::is_client_event;

    #[test]
    fn every_variant_event_type_is_registered() {
        let events = vec![
            ClientEvent::session_update(SessionConfig::default()),
            ClientEvent::audio_append("AAAA"),
            ClientEvent::audio_commit(),
            ClientEvent::InputAudioBufferClear,
            ClientEvent::item_create(serde_json::json!({"type": "message"})),
            ClientEvent::ConversationItemRetrieve { item_id: "i1".into() },
            ClientEvent::item_truncate("item_A", 0, 100),
            ClientEvent::ConversationItemDelete { item_id: "i1".into() },
            ClientEvent::response_create(),
            ClientEvent::ResponseCancel,
            ClientEvent::OutputAudioBufferClear,
        ];
        for e in events {
            assert!(is_client_event(e.event_type()), "{}", e.event_type());
        }
    }

    #[test]
    fn function_call_output_event_has_expected_shape() {
        let e = ClientEvent::function_call_output("cc1", "{\"temp\":10}");
        let v = e.to_wire_json();
        assert_eq!(v["type"], "conversation.item.create");
        assert_eq!(v["item"]["type"], "function_call_output");
        assert_eq!(v["item"]["call_id"], "cc1");
        assert_eq!(v["item"]["status"], "completed");
        assert_eq!(v["item"]["output"], "{\"temp\":10}");
    }

    #[test]
    fn truncate_event_serializes_requested_fields() {
        let e = ClientEvent::item_truncate("item_A", 0, 100);
        let v = e.to_wire_json();
        assert_eq!(v["type"], "conversation.item.truncate");
        assert_eq!(v["item_id"], "item_A");
        assert_eq!(v["content_index"], 0);
        assert_eq!(v["audio_end_ms"], 100);
    }
}
