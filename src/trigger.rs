//! Inbound trigger payloads and the outbound score line.
//!
//! A trigger maps to "capture reference" (`true`) or "capture current and
//! compare" (`false`). Payloads arrive as bare keywords, JSON scalars or JSON
//! objects; anything that does not decode unambiguously is `None`.

use serde_json::Value;

const TRUE_WORDS: [&str; 5] = ["true", "1", "on", "si", "yes"];
const FALSE_WORDS: [&str; 4] = ["false", "0", "off", "no"];

/// Object fields consulted in order. The first one present decides.
const FIELDS: [&str; 6] = ["estado", "turno", "value", "on", "estadoTurno", "state"];

const MAX_DEPTH: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    CaptureReference,
    Compare,
}

impl From<bool> for Command {
    fn from(value: bool) -> Self {
        if value {
            Command::CaptureReference
        } else {
            Command::Compare
        }
    }
}

pub fn decode_trigger(payload: &[u8]) -> Option<bool> {
    let text = std::str::from_utf8(payload).ok()?.trim();
    if text.is_empty() {
        return None;
    }
    if let Some(b) = keyword(text) {
        return Some(b);
    }
    let value: Value = serde_json::from_str(text).ok()?;
    decode_value(&value, 0)
}

pub fn decode_command(payload: &[u8]) -> Option<Command> {
    decode_trigger(payload).map(Command::from)
}

fn keyword(text: &str) -> Option<bool> {
    let lower = text.trim().to_ascii_lowercase();
    if TRUE_WORDS.contains(&lower.as_str()) {
        Some(true)
    } else if FALSE_WORDS.contains(&lower.as_str()) {
        Some(false)
    } else {
        None
    }
}

fn decode_value(value: &Value, depth: usize) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => match n.as_f64()? {
            v if v == 0.0 => Some(false),
            v if v == 1.0 => Some(true),
            _ => None,
        },
        Value::String(s) => keyword(s),
        Value::Object(map) if depth < MAX_DEPTH => {
            let field = FIELDS.iter().find_map(|name| map.get(*name))?;
            decode_value(field, depth + 1)
        }
        _ => None,
    }
}

/// Outbound payload carrying the severity score.
pub fn format_score(score: f64) -> String {
    format!("{score:.3}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keywords_in_any_case() {
        for word in ["true", "TRUE", " on ", "Si", "yes", "1"] {
            assert_eq!(decode_trigger(word.as_bytes()), Some(true), "{word}");
        }
        for word in ["false", "Off", "no", "0"] {
            assert_eq!(decode_trigger(word.as_bytes()), Some(false), "{word}");
        }
    }

    #[test]
    fn json_scalars() {
        assert_eq!(decode_trigger(b"1.0"), Some(true));
        assert_eq!(decode_trigger(b"0.0"), Some(false));
        assert_eq!(decode_trigger(b"\"yes\""), Some(true));
        assert_eq!(decode_trigger(b"2"), None);
        assert_eq!(decode_trigger(b"null"), None);
    }

    #[test]
    fn object_fields_follow_priority() {
        assert_eq!(decode_trigger(br#"{"estadoTurno": true}"#), Some(true));
        assert_eq!(decode_trigger(br#"{"turno": "off", "value": true}"#), Some(false));
        assert_eq!(decode_trigger(br#"{"state": 1}"#), Some(true));
        assert_eq!(decode_trigger(br#"{"other": true}"#), None);
    }

    #[test]
    fn nested_objects_are_bounded() {
        assert_eq!(decode_trigger(br#"{"value": {"estado": "no"}}"#), Some(false));
        let deep = br#"{"value":{"value":{"value":{"value":{"value":true}}}}}"#;
        assert_eq!(decode_trigger(deep), None);
    }

    #[test]
    fn ambiguous_payloads_are_rejected() {
        assert_eq!(decode_trigger(b""), None);
        assert_eq!(decode_trigger(b"maybe"), None);
        assert_eq!(decode_trigger(br#"{"estado": "tal vez"}"#), None);
        assert_eq!(decode_trigger(b"[true]"), None);
        assert_eq!(decode_trigger(&[0xff, 0xfe]), None);
    }

    #[test]
    fn commands_and_score_line() {
        assert_eq!(decode_command(b"true"), Some(Command::CaptureReference));
        assert_eq!(decode_command(b"false"), Some(Command::Compare));
        assert_eq!(format_score(48.0), "48.000");
        assert_eq!(format_score(12.34567), "12.346");
    }
}
