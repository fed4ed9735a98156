//! Observer fan-out: the read-mostly dashboard-facing mirror of the model's events.
//!
//! Pure helpers only: synthesizing the `relay.hello`/`call.state` payloads observers
//! receive on connect/lifecycle transitions, and classifying an observer-sent frame
//! into what the session actor should do with it. The actual fan-out (who's
//! connected, sending over their sockets) is I/O and lives in `session::actor`.

use serde_json::Value;

use crate::protocol::registry::is_client_event;

/// Sent to an observer immediately after its websocket upgrades.
pub fn relay_hello(now_ms: u64) -> Value {
    serde_json::json!({
        "type": "relay.hello",
        "message": "connected",
        "timestamp": now_ms,
    })
}

/// Broadcast to all observers whenever the call's lifecycle state changes
/// (`active`, `model_disconnected`, `disconnected`, ...).
pub fn call_state(call_sid: &str, state: &str) -> Value {
    serde_json::json!({
        "type": "call.state",
        "state": state,
        "callSid": call_sid,
        "recording": { "status": "idle" },
    })
}

/// What the session actor should do with a frame an observer sent in.
#[derive(Debug, Clone, PartialEq)]
pub enum ObserverFrameDecision {
    /// A `session.update`: carries the (not-yet-sanitized) `session` payload to
    /// merge into `saved_config` and, if the model leg is open, push downstream.
    SessionUpdate(Value),
    /// Any other registered client event: forward the raw frame to the model as-is.
    Forward,
    /// Not a recognized client event type; drop and warn.
    Reject(String),
}

/// Classify a raw frame received from an observer socket.
pub fn classify_observer_frame(raw: &Value) -> ObserverFrameDecision {
    let event_type = raw.get("type").and_then(Value::as_str).unwrap_or_default();
    if event_type == "session.update" {
        return ObserverFrameDecision::SessionUpdate(raw.get("session").cloned().unwrap_or(Value::Null));
    }
    if is_client_event(event_type) {
        ObserverFrameDecision::Forward
    } else {
        ObserverFrameDecision::Reject(event_type.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relay_hello_has_expected_shape() {
        let v = relay_hello(1000);
        assert_eq!(v["type"], "relay.hello");
        assert_eq!(v["timestamp"], 1000);
    }

    #[test]
    fn call_state_carries_call_sid_and_state() {
        let v = call_state("CA1", "active");
        assert_eq!(v["type"], "call.state");
        assert_eq!(v["state"], "active");
        assert_eq!(v["callSid"], "CA1");
    }

    #[test]
    fn classifies_session_update() {
        let raw = serde_json::json!({ "type": "session.update", "session": { "voice": "marin" } });
        match classify_observer_frame(&raw) {
            ObserverFrameDecision::SessionUpdate(session) => {
                assert_eq!(session["voice"], "marin");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn classifies_other_registered_event_as_forward() {
        let raw = serde_json::json!({ "type": "response.cancel" });
        assert_eq!(classify_observer_frame(&raw), ObserverFrameDecision::Forward);
    }

    #[test]
    fn classifies_unknown_event_as_reject() {
        let raw = serde_json::json!({ "type": "made.up.event" });
        assert_eq!(
            classify_observer_frame(&raw),
            ObserverFrameDecision::Reject("made.up.event".to_string())
        );
    }
}
