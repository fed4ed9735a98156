//! Environment/CLI-driven configuration for the bridge process.

use clap::Parser;
use serde_json::Value;

use crate::protocol::session_config::SessionConfig;

/// Bridge configuration, parsed once at process startup.
#[derive(Debug, Clone, Parser)]
#[command(name = "callbridge", version)]
pub struct BridgeConfig {
    /// Realtime model id, pinned in the model-leg connect URL.
    #[arg(long, env = "BRIDGE_MODEL_ID", default_value = "gpt-realtime-2025-08-28")]
    pub model_id: String,

    /// Base websocket URL for the model's realtime endpoint.
    #[arg(long, env = "BRIDGE_MODEL_WS_BASE", default_value = "wss://api.openai.com/v1/realtime")]
    pub model_ws_base: String,

    /// API key used for the model-leg Authorization header.
    #[arg(long, env = "OPENAI_API_KEY", default_value = "")]
    pub openai_api_key: String,

    /// Default system instructions.
    #[arg(long, env = "BRIDGE_INSTRUCTIONS", default_value = "")]
    pub default_instructions: String,

    /// Default voice for audio output.
    #[arg(long, env = "BRIDGE_VOICE", default_value = "marin")]
    pub default_voice: String,

    /// Default tool-choice strategy.
    #[arg(long, env = "BRIDGE_TOOL_CHOICE", default_value = "auto")]
    pub default_tool_choice: String,

    /// Default tools, as a JSON array.
    #[arg(long, env = "BRIDGE_TOOLS_JSON", default_value = "[]")]
    pub default_tools_json: String,

    /// Default MCP server connections, as a JSON array.
    #[arg(long, env = "BRIDGE_MCP_CONNECTIONS_JSON", default_value = "[]")]
    pub default_mcp_connections_json: String,

    /// Input audio format (pre-canonicalization).
    #[arg(long, env = "BRIDGE_INPUT_AUDIO_FORMAT", default_value = "audio/pcmu")]
    pub input_audio_format: String,

    /// Output audio format (pre-canonicalization).
    #[arg(long, env = "BRIDGE_OUTPUT_AUDIO_FORMAT", default_value = "audio/pcmu")]
    pub output_audio_format: String,

    /// Audio sample rate in Hz.
    #[arg(long, env = "BRIDGE_AUDIO_SAMPLE_RATE", default_value_t = 8000)]
    pub audio_sample_rate: u32,

    /// Input transcription config: a JSON object, or a bare model-name shortcut.
    #[arg(long, env = "BRIDGE_INPUT_TRANSCRIPTION", default_value = "")]
    pub input_audio_transcription: String,

    /// Input noise reduction mode: near_field|far_field|none.
    #[arg(long, env = "BRIDGE_NOISE_REDUCTION", default_value = "")]
    pub input_audio_noise_reduction: String,

    /// Turn detection config, as a JSON object.
    #[arg(long, env = "BRIDGE_TURN_DETECTION_JSON", default_value = "")]
    pub turn_detection_json: String,

    /// Override eagerness for semantic_vad turn detection.
    #[arg(long, env = "BRIDGE_SEMANTIC_VAD_EAGERNESS", default_value = "")]
    pub semantic_vad_eagerness: String,

    /// Optional `OpenAI-Beta` header value for the model-leg connect.
    #[arg(long, env = "BRIDGE_BETA_HEADER", default_value = "")]
    pub beta_header: String,

    /// TCP port the process listens on.
    #[arg(long, env = "BRIDGE_PORT", default_value_t = 8081)]
    pub listen_port: u16,

    /// Debounce delay after the last `media` frame before attempting a commit.
    #[arg(long, env = "BRIDGE_PENDING_COMMIT_DELAY_MS", default_value_t = 120)]
    pub pending_commit_delay_ms: u64,

    /// Minimum committed-audio byte count for a non-forced commit to proceed.
    #[arg(long, env = "BRIDGE_MIN_COMMIT_BYTES", default_value_t = 960)]
    pub min_commit_bytes: usize,

    /// Delay before a single model-leg reconnect attempt.
    #[arg(long, env = "BRIDGE_MODEL_RECONNECT_DELAY_MS", default_value_t = 200)]
    pub model_reconnect_delay_ms: u64,
}

impl BridgeConfig {
    /// Validate configuration that can't be checked by `clap` alone. Called once at
    /// startup, before the process accepts any connection.
    pub fn validate(&self) -> Result<(), crate::error::BridgeError> {
        if self.openai_api_key.is_empty() {
            return Err(crate::error::BridgeError::Config(
                "OPENAI_API_KEY must be set".to_string(),
            ));
        }
        for (name, json) in [
            ("BRIDGE_TOOLS_JSON", &self.default_tools_json),
            ("BRIDGE_MCP_CONNECTIONS_JSON", &self.default_mcp_connections_json),
        ] {
            if serde_json::from_str::<Value>(json).is_err() {
                return Err(crate::error::BridgeError::Config(format!("{name} is not valid JSON")));
            }
        }
        if !self.turn_detection_json.is_empty()
            && serde_json::from_str::<Value>(&self.turn_detection_json).is_err()
        {
            return Err(crate::error::BridgeError::Config(
                "BRIDGE_TURN_DETECTION_JSON is not valid JSON".to_string(),
            ));
        }
        Ok(())
    }

    /// Build the default session configuration this process advertises to the model,
    /// before any observer-provided `savedConfig` is merged over it.
    pub fn default_session_config(&self) -> SessionConfig {
        let mut session = serde_json::json!({
            "type": "realtime",
            "model": self.model_id,
            "voice": self.default_voice,
            "tool_choice": self.default_tool_choice,
            "input_audio_format": self.input_audio_format,
            "output_audio_format": self.output_audio_format,
        });

        let obj = session.as_object_mut().expect("session is always an object");

        if !self.default_instructions.is_empty() {
            obj.insert("instructions".into(), Value::String(self.default_instructions.clone()));
        }
        if let Ok(tools) = serde_json::from_str::<Value>(&self.default_tools_json) {
            if tools.as_array().is_some_and(|a| !a.is_empty()) {
                obj.insert("tools".into(), tools);
            }
        }
        if let Ok(mcp) = serde_json::from_str::<Value>(&self.default_mcp_connections_json) {
            if mcp.as_array().is_some_and(|a| !a.is_empty()) {
                obj.insert("mcp_server_connections".into(), mcp);
            }
        }
        if !self.input_audio_transcription.is_empty() {
            let transcription = serde_json::from_str::<Value>(&self.input_audio_transcription)
                .unwrap_or_else(|_| serde_json::json!({ "model": self.input_audio_transcription }));
            obj.insert("input_audio_transcription".into(), transcription);
        }
        if !self.input_audio_noise_reduction.is_empty()
            && self.input_audio_noise_reduction != "none"
        {
            obj.insert(
                "input_audio_noise_reduction".into(),
                Value::String(self.input_audio_noise_reduction.clone()),
            );
        }
        if !self.turn_detection_json.is_empty() {
            if let Ok(mut turn_detection) = serde_json::from_str::<Value>(&self.turn_detection_json) {
                if !self.semantic_vad_eagerness.is_empty() {
                    if let Some(td) = turn_detection.as_object_mut() {
                        if td.get("type").and_then(Value::as_str) == Some("semantic_vad") {
                            td.insert(
                                "eagerness".into(),
                                Value::String(self.semantic_vad_eagerness.clone()),
                            );
                        }
                    }
                }
                obj.insert("turn_detection".into(), turn_detection);
            }
        }

        let sanitized = crate::sanitize::sanitize(session);
        serde_json::from_value(sanitized).expect("sanitized output always matches SessionConfig shape")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> BridgeConfig {
        BridgeConfig::parse_from(std::iter::once("callbridge").chain(args.iter().copied()))
    }

    #[test]
    fn defaults_match_documented_values() {
        let cfg = parse(&[]);
        assert_eq!(cfg.model_id, "gpt-realtime-2025-08-28");
        assert_eq!(cfg.default_voice, "marin");
        assert_eq!(cfg.input_audio_format, "audio/pcmu");
        assert_eq!(cfg.audio_sample_rate, 8000);
        assert_eq!(cfg.listen_port, 8081);
        assert_eq!(cfg.pending_commit_delay_ms, 120);
        assert_eq!(cfg.min_commit_bytes, 960);
        assert_eq!(cfg.model_reconnect_delay_ms, 200);
    }

    #[test]
    fn default_session_config_has_no_legacy_top_level_fields() {
        let cfg = parse(&[]);
        let session = cfg.default_session_config();
        let value = serde_json::to_value(&session).unwrap();
        assert!(value.get("modalities").is_none());
        assert!(value.get("input_audio_format").is_none());
        assert!(value.get("voice").is_none());
        assert!(value.get("audio").is_some());
    }

    #[test]
    fn validate_rejects_missing_api_key() {
        let cfg = parse(&[]);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_accepts_a_configured_api_key() {
        let cfg = parse(&["--openai-api-key", "sk-test"]);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn validate_rejects_malformed_tools_json() {
        let cfg = parse(&["--openai-api-key", "sk-test", "--default-tools-json", "not json"]);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_malformed_turn_detection_json() {
        let cfg = parse(&[
            "--openai-api-key",
            "sk-test",
            "--turn-detection-json",
            "{not json",
        ]);
        assert!(cfg.validate().is_err());
    }
}
