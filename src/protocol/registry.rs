//! Event type registry: the two disjoint sets of allowed model-protocol event names.
//!
//! Constant data, read-only after process start. Gates outbound client events before
//! they're emitted; used to decide whether an inbound server event tag is "known"
//! before falling back to the catch-all unknown variant.

/// Authoritative client-event list (emittable by the bridge).
pub const CLIENT_EVENT_TYPES: &[&str] = &[
    "session.update",
    "input_audio_buffer.append",
    "input_audio_buffer.commit",
    "input_audio_buffer.clear",
    "conversation.item.create",
    "conversation.item.retrieve",
    "conversation.item.truncate",
    "conversation.item.delete",
    "response.create",
    "response.cancel",
    "output_audio_buffer.clear",
];

/// Authoritative server-event list (accepted by the bridge).
pub const SERVER_EVENT_TYPES: &[&str] = &[
    "error",
    "session.created",
    "session.updated",
    "conversation.item.added",
    "conversation.item.done",
    "conversation.item.retrieved",
    "conversation.item.truncated",
    "conversation.item.deleted",
    "conversation.item.input_audio_transcription.completed",
    "conversation.item.input_audio_transcription.delta",
    "conversation.item.input_audio_transcription.segment",
    "conversation.item.input_audio_transcription.failed",
    "input_audio_buffer.committed",
    "input_audio_buffer.cleared",
    "input_audio_buffer.speech_started",
    "input_audio_buffer.speech_stopped",
    "input_audio_buffer.timeout_triggered",
    "output_audio_buffer.started",
    "output_audio_buffer.stopped",
    "output_audio_buffer.cleared",
    "response.created",
    "response.done",
    "response.output_item.added",
    "response.output_item.done",
    "response.output_audio.delta",
    "response.output_audio.done",
    "response.output_audio_transcript.delta",
    "response.output_audio_transcript.done",
    "response.output_text.delta",
    "response.output_text.done",
    "response.content_part.added",
    "response.content_part.done",
];

/// Is `event_type` one of the types this bridge is allowed to emit toward the model?
pub fn is_client_event(event_type: &str) -> bool {
    CLIENT_EVENT_TYPES.contains(&event_type)
}

/// Is `event_type` one of the documented server event types?
pub fn is_server_event(event_type: &str) -> bool {
    SERVER_EVENT_TYPES.contains(&event_type)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_and_server_sets_are_disjoint() {
        for t in CLIENT_EVENT_TYPES {
            assert!(!SERVER_EVENT_TYPES.contains(t), "{t} in both sets");
        }
    }

    #[test]
    fn gates_known_and_unknown_types() {
        assert!(is_client_event("session.update"));
        assert!(!is_client_event("response.created"));
        assert!(is_server_event("response.done"));
        assert!(!is_server_event("session.update"));
        assert!(!is_client_event("totally.made.up"));
    }
}
