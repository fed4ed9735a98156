//! The session bridge: the state machine at the center of the call.
//!
//! `Session` holds the pure per-call state and the state-machine transitions that
//! don't themselves touch I/O (the response-creation gate, truncation math, the
//! commit-debounce bookkeeping). `actor` wires this state to the three sockets;
//! `manager` is the per-`callSid` registry replacing a process-global singleton.

pub mod actor;
pub mod manager;

use crate::audio::bytes_to_ms;

/// Session state. Owned exclusively by one actor task; never shared.
#[derive(Debug, Clone, Default)]
pub struct Session {
    pub stream_sid: Option<String>,
    pub call_sid: String,

    pub latest_media_timestamp_ms: u64,
    pub response_start_timestamp_ms: Option<u64>,

    pub has_buffered_audio: bool,
    pub pending_audio_bytes: usize,
    pub response_output_audio_bytes: u64,

    pub response_in_progress: bool,
    pub response_create_queued: bool,
    pub response_create_force_queued: bool,
    pub committed_audio_pending: bool,

    pub active_model: Option<String>,
    pub saved_config: Option<serde_json::Value>,

    pub last_assistant_item: Option<String>,

    /// Canonical output audio format (`audio/pcm`|`audio/pcma`|`audio/pcmu`), used by
    /// the truncation byte→ms computation.
    pub output_audio_format: String,
}

impl Session {
    pub fn new(call_sid: String, output_audio_format: String) -> Self {
        Self {
            call_sid,
            output_audio_format,
            ..Default::default()
        }
    }

    /// Reset all timing and response bookkeeping on a fresh `start` frame.
    pub fn reset_for_start(&mut self, stream_sid: String) {
        let call_sid = std::mem::take(&mut self.call_sid);
        let output_audio_format = std::mem::take(&mut self.output_audio_format);
        *self = Session {
            call_sid,
            output_audio_format,
            stream_sid: Some(stream_sid),
            ..Default::default()
        };
    }

    /// The response-creation gate. `model_open` reflects whether the model
    /// socket is currently connected. Returns `true` if a `response.create` should be
    /// emitted to the model right now.
    pub fn request_response_create(&mut self, force: bool, model_open: bool) -> bool {
        if !model_open {
            return false;
        }
        if !force && !self.committed_audio_pending {
            return false;
        }
        if self.response_in_progress {
            self.response_create_queued = true;
            self.response_create_force_queued = self.response_create_force_queued || force;
            return false;
        }
        self.response_in_progress = true;
        self.response_create_queued = false;
        self.response_create_force_queued = force;
        if !force {
            self.committed_audio_pending = false;
        }
        true
    }

    /// On `response.created`.
    pub fn on_response_created(&mut self) {
        self.response_in_progress = true;
        self.response_output_audio_bytes = 0;
        if !self.response_create_force_queued {
            self.committed_audio_pending = false;
        }
    }

    /// On `response.done`. Returns `(should_regate, force)` describing whether
    /// the caller must now re-invoke the response-creation gate for a coalesced
    /// request.
    pub fn on_response_done(&mut self) -> (bool, bool) {
        self.response_in_progress = false;
        let should_regate = self.response_create_queued;
        let force = self.response_create_force_queued;
        self.response_create_queued = false;
        self.response_create_force_queued = false;
        self.response_output_audio_bytes = 0;
        (should_regate, force)
    }

    /// Account a `response.output_audio.delta` chunk. Returns the number of
    /// decoded bytes added, and whether this delta started a new assistant item.
    pub fn on_output_audio_delta(&mut self, item_id: &str, decoded_len: usize) -> bool {
        let is_new_item = self.last_assistant_item.as_deref() != Some(item_id);
        if is_new_item {
            self.response_output_audio_bytes = 0;
            self.last_assistant_item = Some(item_id.to_string());
        }
        self.response_output_audio_bytes += decoded_len as u64;
        if self.response_start_timestamp_ms.is_none() {
            self.response_start_timestamp_ms = Some(self.latest_media_timestamp_ms);
        }
        is_new_item
    }

    /// Compute the truncation target for a barge-in. Returns `None` (a no-op)
    /// if there's no in-flight assistant item to truncate.
    pub fn compute_truncation(&self, sample_rate: u64) -> Option<(String, u64)> {
        let item_id = self.last_assistant_item.clone()?;
        let response_start = self.response_start_timestamp_ms?;
        let requested_end_ms = self.latest_media_timestamp_ms.saturating_sub(response_start);
        let available_end_ms =
            bytes_to_ms(self.response_output_audio_bytes, &self.output_audio_format, sample_rate);
        let audio_end_ms = if available_end_ms > 0 {
            requested_end_ms.min(available_end_ms)
        } else {
            requested_end_ms
        };
        Some((item_id, audio_end_ms))
    }

    /// Apply the post-truncation state reset.
    pub fn apply_truncation_reset(&mut self) {
        self.last_assistant_item = None;
        self.response_start_timestamp_ms = None;
        self.response_output_audio_bytes = 0;
    }

    /// Pending-commit timer fired. `min_commit_bytes` / `forced` decide whether
    /// to commit now, discard, or re-arm. Returns `true` if a commit should be
    /// emitted; the caller clears `pending_audio_bytes`/`has_buffered_audio` and sets
    /// `committed_audio_pending` when it does.
    pub fn should_commit(&self, min_commit_bytes: usize, forced: bool) -> CommitDecision {
        if self.pending_audio_bytes < min_commit_bytes {
            if forced {
                CommitDecision::Discard
            } else {
                CommitDecision::Rearm
            }
        } else {
            CommitDecision::Commit
        }
    }

    /// Clear buffered-audio bookkeeping after a commit is emitted.
    pub fn apply_commit(&mut self) {
        self.has_buffered_audio = false;
        self.pending_audio_bytes = 0;
        self.committed_audio_pending = true;
    }

    /// Error code `input_audio_buffer_commit_empty`: the commit was premature.
    pub fn apply_commit_empty_error(&mut self) {
        self.has_buffered_audio = false;
        self.pending_audio_bytes = 0;
        self.committed_audio_pending = false;
    }

    /// Error code `conversation_already_has_active_response`: coalesce.
    pub fn apply_already_has_active_response_error(&mut self) {
        self.response_in_progress = true;
        self.response_create_queued = true;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitDecision {
    Commit,
    Rearm,
    Discard,
}
