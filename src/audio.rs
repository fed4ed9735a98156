//! Audio format alias table and (sample_rate, bytes_per_sample) derivation: a data
//! table rather than a branch cascade, so adding a format alias never touches the
//! conversion math.

/// Canonical audio format identifiers.
pub const CANONICAL_FORMATS: &[&str] = &["audio/pcm", "audio/pcma", "audio/pcmu"];

/// (alias, canonical) pairs. Canonical formats also map to themselves.
const ALIASES: &[(&str, &str)] = &[
    ("audio/pcm", "audio/pcm"),
    ("pcm16", "audio/pcm"),
    ("pcm_s16le", "audio/pcm"),
    ("linear16", "audio/pcm"),
    ("audio/pcma", "audio/pcma"),
    ("g711_alaw", "audio/pcma"),
    ("alaw", "audio/pcma"),
    ("audio/pcmu", "audio/pcmu"),
    ("g711_ulaw", "audio/pcmu"),
    ("mulaw", "audio/pcmu"),
    ("ulaw", "audio/pcmu"),
];

/// Normalize a (possibly-aliased) audio format string to its canonical form.
/// Returns `None` for unrecognized formats — the sanitizer drops the field in that
/// case.
pub fn normalize_audio_format(format: &str) -> Option<&'static str> {
    ALIASES
        .iter()
        .find(|(alias, _)| alias.eq_ignore_ascii_case(format))
        .map(|(_, canonical)| *canonical)
}

/// Bytes per sample for a canonical audio format: µ-law/A-law are 1 byte/sample,
/// `audio/pcm` (16-bit linear) is 2 bytes/sample.
pub fn bytes_per_sample(canonical_format: &str) -> u32 {
    match canonical_format {
        "audio/pcm" => 2,
        _ => 1,
    }
}

/// `floor(bytes / bytes_per_sample / sample_rate * 1000)` — the available-audio-ms
/// computation used by barge-in truncation.
pub fn bytes_to_ms(bytes: u64, canonical_format: &str, sample_rate: u64) -> u64 {
    let bps = bytes_per_sample(canonical_format) as u64;
    if bps == 0 || sample_rate == 0 {
        return 0;
    }
    bytes.saturating_mul(1000) / (bps * sample_rate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_formats_normalize_to_themselves() {
        for f in CANONICAL_FORMATS {
            assert_eq!(normalize_audio_format(f), Some(*f));
        }
    }

    #[test]
    fn documented_aliases_collapse_to_canonical() {
        assert_eq!(normalize_audio_format("mulaw"), Some("audio/pcmu"));
        assert_eq!(normalize_audio_format("g711_ulaw"), Some("audio/pcmu"));
        assert_eq!(normalize_audio_format("alaw"), Some("audio/pcma"));
        assert_eq!(normalize_audio_format("pcm16"), Some("audio/pcm"));
    }

    #[test]
    fn unknown_alias_is_none() {
        assert_eq!(normalize_audio_format("audio/opus"), None);
    }

    #[test]
    fn mulaw_8khz_ms_math() {
        // 800 bytes of mu-law at 8kHz == 100ms.
        assert_eq!(bytes_to_ms(800, "audio/pcmu", 8000), 100);
    }

    #[test]
    fn pcm16_uses_two_bytes_per_sample() {
        // 3200 bytes of 16-bit PCM at 8kHz == 1600 samples == 200ms.
        assert_eq!(bytes_to_ms(3200, "audio/pcm", 8000), 200);
    }

    #[test]
    fn pcm16_floors_once_rather_than_after_the_byte_division() {
        // floor(5 / 2 / 3 * 1000) = floor(833.33) = 833, not floor(5/2)=2 * 1000 / 3 = 666.
        assert_eq!(bytes_to_ms(5, "audio/pcm", 3), 833);
    }
}
