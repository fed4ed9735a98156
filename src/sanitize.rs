//! Payload sanitizer: a pure function from a permissive
//! `session.update` payload to the strict nested shape the model leg accepts.
//!
//! Implemented as a plain `Value -> Value` transform: side-effect free and testable
//! in isolation, with no access to session or socket state.

use serde_json::{Map, Value};

use crate::audio::normalize_audio_format;

const DISALLOWED_TOP_LEVEL: &[&str] = &[
    "modalities",
    "input_audio_format",
    "output_audio_format",
    "input_audio_transcription",
    "input_audio_noise_reduction",
    "voice",
    "turn_detection",
];

/// Sanitize a `session.update`-shaped payload per every normalization rule. Idempotent:
/// sanitizing an already-sanitized payload is a no-op.
pub fn sanitize(input: Value) -> Value {
    let Value::Object(mut obj) = input else {
        return input;
    };

    // `type`: default to "realtime" if missing or empty.
    let needs_type_default = match obj.get("type") {
        Some(Value::String(s)) if !s.is_empty() => false,
        _ => true,
    };
    if needs_type_default {
        obj.insert("type".into(), Value::String("realtime".into()));
    }

    // Delete `modalities` entirely.
    obj.remove("modalities");

    // Delete empty `mcp_server_connections` arrays.
    if let Some(Value::Array(conns)) = obj.get("mcp_server_connections") {
        if conns.is_empty() {
            obj.remove("mcp_server_connections");
        }
    }

    // Rename max_output_tokens -> max_response_output_tokens.
    if let Some(v) = obj.remove("max_output_tokens") {
        obj.entry("max_response_output_tokens").or_insert(v);
    }

    // Fold flat legacy fields into the nested `audio` structure.
    let mut audio = match obj.remove("audio") {
        Some(Value::Object(a)) => a,
        _ => Map::new(),
    };
    let mut audio_input = match audio.remove("input") {
        Some(Value::Object(i)) => i,
        _ => Map::new(),
    };
    let mut audio_output = match audio.remove("output") {
        Some(Value::Object(o)) => o,
        _ => Map::new(),
    };

    if let Some(v) = obj.remove("input_audio_format") {
        if let Some(fmt) = sanitize_audio_format(&v) {
            audio_input.insert("format".into(), fmt);
        }
    }
    if let Some(v) = obj.remove("output_audio_format") {
        if let Some(fmt) = sanitize_audio_format(&v) {
            audio_output.insert("format".into(), fmt);
        }
    }
    if let Some(v) = obj.remove("input_audio_transcription") {
        audio_input.insert("transcription".into(), v);
    }
    if let Some(v) = obj.remove("input_audio_noise_reduction") {
        audio_input.insert("noise_reduction".into(), v);
    }
    if let Some(v) = obj.remove("voice") {
        audio_output.insert("voice".into(), v);
    }
    if let Some(v) = obj.remove("turn_detection") {
        audio_input.insert("turn_detection".into(), sanitize_turn_detection(v));
    }

    // Nested audio.input.format / audio.output.format may also already be present
    // (re-sanitizing an already-nested payload) — normalize those too.
    if let Some(existing) = audio_input.remove("format") {
        if let Some(fmt) = sanitize_audio_format(&existing) {
            audio_input.insert("format".into(), fmt);
        }
    }
    if let Some(existing) = audio_output.remove("format") {
        if let Some(fmt) = sanitize_audio_format(&existing) {
            audio_output.insert("format".into(), fmt);
        }
    }
    if let Some(existing) = audio_input.remove("turn_detection") {
        audio_input.insert("turn_detection".into(), sanitize_turn_detection(existing));
    }

    if !audio_input.is_empty() {
        audio.insert("input".into(), Value::Object(audio_input));
    }
    if !audio_output.is_empty() {
        audio.insert("output".into(), Value::Object(audio_output));
    }
    if !audio.is_empty() {
        obj.insert("audio".into(), Value::Object(audio));
    }

    // Remove any disallowed top-level field that might have survived (defensive;
    // the folding above already consumes all of these).
    for key in DISALLOWED_TOP_LEVEL {
        obj.remove(*key);
    }

    Value::Object(obj)
}

/// A format value may arrive as a bare alias string (`"mulaw"`) or already as
/// `{ type: "..." }`. Either way, normalize to `{ type: <canonical> }`; unknown
/// aliases drop the field (return `None`).
fn sanitize_audio_format(value: &Value) -> Option<Value> {
    let alias = match value {
        Value::String(s) => s.as_str(),
        Value::Object(o) => o.get("type")?.as_str()?,
        _ => return None,
    };
    let canonical = normalize_audio_format(alias)?;
    Some(serde_json::json!({ "type": canonical }))
}

/// Normalize turn-detection: for `semantic_vad`, coerce `eagerness` to a known value
/// (default `auto`) and default `create_response`/`interrupt_response` to `true`.
fn sanitize_turn_detection(value: Value) -> Value {
    let Value::Object(mut td) = value else {
        return value;
    };
    if td.get("type").and_then(Value::as_str) == Some("semantic_vad") {
        let eagerness = td
            .get("eagerness")
            .and_then(Value::as_str)
            .filter(|e| matches!(*e, "auto" | "low" | "medium" | "high"))
            .unwrap_or("auto")
            .to_string();
        td.insert("eagerness".into(), Value::String(eagerness));
        td.entry("create_response").or_insert(Value::Bool(true));
        td.entry("interrupt_response").or_insert(Value::Bool(true));
    }
    Value::Object(td)
}

/// Deep-merge `overlay` onto `base`, recursing into nested objects (used to merge
/// observer-provided `savedConfig` over the default session config at model-connect).
/// Scalars and arrays in `overlay` replace the corresponding `base` value.
pub fn deep_merge(base: &Value, overlay: &Value) -> Value {
    match (base, overlay) {
        (Value::Object(base_obj), Value::Object(overlay_obj)) => {
            let mut merged = base_obj.clone();
            for (k, v) in overlay_obj {
                let next = match merged.get(k) {
                    Some(existing) => deep_merge(existing, v),
                    None => v.clone(),
                };
                merged.insert(k.clone(), next);
            }
            Value::Object(merged)
        }
        (_, overlay) => overlay.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_type_when_missing() {
        let out = sanitize(serde_json::json!({}));
        assert_eq!(out["type"], "realtime");
    }

    #[test]
    fn defaults_type_when_empty() {
        let out = sanitize(serde_json::json!({ "type": "" }));
        assert_eq!(out["type"], "realtime");
    }

    #[test]
    fn deletes_modalities() {
        let out = sanitize(serde_json::json!({ "modalities": ["text", "audio"] }));
        assert!(out.get("modalities").is_none());
    }

    #[test]
    fn deletes_empty_mcp_connections_but_keeps_nonempty() {
        let out = sanitize(serde_json::json!({ "mcp_server_connections": [] }));
        assert!(out.get("mcp_server_connections").is_none());

        let out = sanitize(serde_json::json!({ "mcp_server_connections": [{"id": "x"}] }));
        assert!(out.get("mcp_server_connections").is_some());
    }

    #[test]
    fn renames_max_output_tokens() {
        let out = sanitize(serde_json::json!({ "max_output_tokens": 256 }));
        assert_eq!(out["max_response_output_tokens"], 256);
        assert!(out.get("max_output_tokens").is_none());
    }

    #[test]
    fn folds_flat_legacy_fields_into_nested_audio() {
        let out = sanitize(serde_json::json!({
            "input_audio_format": "mulaw",
            "output_audio_format": "audio/pcma",
            "input_audio_transcription": { "model": "whisper-1" },
            "input_audio_noise_reduction": "near_field",
            "voice": "marin",
            "turn_detection": { "type": "server_vad" },
        }));
        assert!(out.get("input_audio_format").is_none());
        assert!(out.get("output_audio_format").is_none());
        assert!(out.get("voice").is_none());
        assert!(out.get("turn_detection").is_none());
        assert_eq!(out["audio"]["input"]["format"]["type"], "audio/pcmu");
        assert_eq!(out["audio"]["output"]["format"]["type"], "audio/pcma");
        assert_eq!(out["audio"]["input"]["transcription"]["model"], "whisper-1");
        assert_eq!(out["audio"]["input"]["noise_reduction"], "near_field");
        assert_eq!(out["audio"]["output"]["voice"], "marin");
        assert_eq!(out["audio"]["input"]["turn_detection"]["type"], "server_vad");
    }

    #[test]
    fn semantic_vad_eagerness_normalized_and_defaults_set() {
        let out = sanitize(serde_json::json!({
            "turn_detection": { "type": "semantic_vad", "eagerness": "bogus" }
        }));
        let td = &out["audio"]["input"]["turn_detection"];
        assert_eq!(td["eagerness"], "auto");
        assert_eq!(td["create_response"], true);
        assert_eq!(td["interrupt_response"], true);
    }

    #[test]
    fn semantic_vad_valid_eagerness_preserved() {
        let out = sanitize(serde_json::json!({
            "turn_detection": { "type": "semantic_vad", "eagerness": "high", "create_response": false }
        }));
        let td = &out["audio"]["input"]["turn_detection"];
        assert_eq!(td["eagerness"], "high");
        assert_eq!(td["create_response"], false);
        assert_eq!(td["interrupt_response"], true);
    }

    #[test]
    fn unknown_format_alias_drops_field() {
        let out = sanitize(serde_json::json!({ "input_audio_format": "audio/opus" }));
        assert!(out.get("audio").and_then(|a| a.get("input")).is_none());
    }

    #[test]
    fn no_legacy_top_level_fields_survive_sanitization() {
        let out = sanitize(serde_json::json!({
            "modalities": ["audio"],
            "input_audio_format": "mulaw",
            "output_audio_format": "mulaw",
            "input_audio_transcription": {"model": "whisper-1"},
            "input_audio_noise_reduction": "near_field",
            "voice": "marin",
            "turn_detection": {"type": "server_vad"},
            "max_output_tokens": 10,
        }));
        for key in DISALLOWED_TOP_LEVEL {
            assert!(out.get(*key).is_none(), "{key} survived sanitization");
        }
        assert!(out.get("max_output_tokens").is_none());
    }

    #[test]
    fn sanitize_is_idempotent() {
        let input = serde_json::json!({
            "input_audio_format": "mulaw",
            "voice": "marin",
            "turn_detection": { "type": "semantic_vad" },
            "max_output_tokens": 100,
        });
        let once = sanitize(input);
        let twice = sanitize(once.clone());
        assert_eq!(once, twice);
    }

    #[test]
    fn deep_merge_overlays_nested_audio_over_defaults() {
        let base = serde_json::json!({
            "audio": { "input": { "format": {"type": "audio/pcmu"} }, "output": { "voice": "marin" } },
            "model": "A",
        });
        let overlay = serde_json::json!({
            "audio": { "output": { "voice": "cove" } },
            "model": "B",
        });
        let merged = deep_merge(&base, &overlay);
        assert_eq!(merged["audio"]["input"]["format"]["type"], "audio/pcmu");
        assert_eq!(merged["audio"]["output"]["voice"], "cove");
        assert_eq!(merged["model"], "B");
    }
}
