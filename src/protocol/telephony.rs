//! Telephony leg wire frames, grounded on the Twilio Media Streams
//! `StreamEvent` shape: an internally-tagged enum on `event`, lowercase tags.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum TelephonyInbound {
    Start {
        start: StartMetadata,
    },
    Media {
        media: MediaPayload,
    },
    Mark {
        mark: MarkPayload,
    },
    Stop {
        stop: StopPayload,
    },
    Close,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StartMetadata {
    #[serde(rename = "streamSid")]
    pub stream_sid: String,
    #[serde(rename = "callSid")]
    pub call_sid: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MediaPayload {
    pub timestamp: Option<StrOrInt>,
    /// Base64-encoded µ-law 8 kHz mono audio.
    pub payload: String,
    #[serde(default)]
    pub track: Option<String>,
}

/// The telephony provider sends `media.timestamp` as a string in practice even
/// though it is documented as an integer; accept either.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum StrOrInt {
    Str(String),
    Int(u64),
}

impl StrOrInt {
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            StrOrInt::Int(n) => Some(*n),
            StrOrInt::Str(s) => s.parse().ok(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MarkPayload {
    pub name: String,
    #[serde(rename = "streamSid")]
    pub stream_sid: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StopPayload {
    #[serde(rename = "streamSid")]
    pub stream_sid: Option<String>,
}

/// Outbound telephony frames. Constructed directly as `serde_json::Value` by the
/// `clear` builder below because its wire shape intentionally carries both a legacy
/// and a new key for the same semantics — a plain struct can't express "two different
/// `type`-ish keys at once" without contorting the schema.
#[derive(Debug, Clone, Serialize)]
pub struct OutboundMedia {
    pub event: &'static str,
    #[serde(rename = "streamSid")]
    pub stream_sid: String,
    pub media: OutboundMediaPayload,
}

#[derive(Debug, Clone, Serialize)]
pub struct OutboundMediaPayload {
    pub payload: String,
}

impl OutboundMedia {
    pub fn new(stream_sid: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            event: "media",
            stream_sid: stream_sid.into(),
            media: OutboundMediaPayload { payload: payload.into() },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OutboundMark {
    pub event: &'static str,
    #[serde(rename = "streamSid")]
    pub stream_sid: String,
    pub mark: OutboundMarkName,
}

#[derive(Debug, Clone, Serialize)]
pub struct OutboundMarkName {
    pub name: String,
}

impl OutboundMark {
    pub fn new(stream_sid: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            event: "mark",
            stream_sid: stream_sid.into(),
            mark: OutboundMarkName { name: name.into() },
        }
    }
}

/// The `clear` frame carries both the legacy `event: "clear"` key and the newer
/// `type: "clear", track: "outbound"` keys in the same object, preserved verbatim so
/// older and newer telephony-provider clients both recognize it.
pub fn outbound_clear(stream_sid: &str) -> serde_json::Value {
    serde_json::json!({
        "event": "clear",
        "streamSid": stream_sid,
        "type": "clear",
        "track": "outbound",
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_start_frame() {
        let raw = r#"{"event":"start","start":{"streamSid":"S1","callSid":"C1"}}"#;
        match serde_json::from_str::<TelephonyInbound>(raw).unwrap() {
            TelephonyInbound::Start { start } => {
                assert_eq!(start.stream_sid, "S1");
                assert_eq!(start.call_sid, "C1");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn parses_media_frame_with_string_timestamp() {
        let raw = r#"{"event":"media","media":{"timestamp":"20","payload":"AAAA"}}"#;
        match serde_json::from_str::<TelephonyInbound>(raw).unwrap() {
            TelephonyInbound::Media { media } => {
                assert_eq!(media.timestamp.unwrap().as_u64(), Some(20));
                assert_eq!(media.payload, "AAAA");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn clear_frame_carries_both_legacy_and_new_keys() {
        let v = outbound_clear("S1");
        assert_eq!(v["event"], "clear");
        assert_eq!(v["type"], "clear");
        assert_eq!(v["track"], "outbound");
        assert_eq!(v["streamSid"], "S1");
    }

    #[test]
    fn outbound_media_serializes_with_stream_sid() {
        let v = serde_json::to_value(OutboundMedia::new("S1", "AAAA")).unwrap();
        assert_eq!(v["event"], "media");
        assert_eq!(v["streamSid"], "S1");
        assert_eq!(v["media"]["payload"], "AAAA");
    }
}
