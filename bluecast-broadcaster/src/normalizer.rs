//! Raw frame → clean message text

use serde::{Deserialize, Serialize};

/// Accepted message length window, in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MessageLimits {
    pub min_length: usize,
    pub max_length: usize,
}

impl Default for MessageLimits {
    fn default() -> Self {
        Self {
            min_length: 1,
            max_length: 1000,
        }
    }
}

/// Decode, strip control characters, trim, and bounds-check one frame.
///
/// Returns `None` for anything that must not be dispatched. Invalid UTF-8
/// sequences are dropped rather than failing the whole frame.
pub fn normalize(raw: &[u8], limits: &MessageLimits) -> Option<String> {
    let decoded = decode_lossy(raw);

    let cleaned: String = decoded.chars().filter(|c| !is_stripped_control(*c)).collect();
    let trimmed = cleaned.trim();

    if trimmed.is_empty() {
        return None;
    }

    let length = trimmed.chars().count();
    if length < limits.min_length || length > limits.max_length {
        return None;
    }

    Some(trimmed.to_string())
}

/// UTF-8 decode that skips invalid byte sequences instead of replacing them.
fn decode_lossy(mut raw: &[u8]) -> String {
    let mut out = String::with_capacity(raw.len());

    loop {
        match std::str::from_utf8(raw) {
            Ok(valid) => {
                out.push_str(valid);
                return out;
            }
            Err(err) => {
                let (valid, rest) = raw.split_at(err.valid_up_to());
                // The prefix up to valid_up_to() always decodes.
                out.push_str(std::str::from_utf8(valid).unwrap_or_default());
                match err.error_len() {
                    Some(bad) => raw = &rest[bad..],
                    // Truncated sequence at the end of the frame.
                    None => return out,
                }
            }
        }
    }
}

/// C0 controls except `\t`, `\n`, `\r`, plus DEL and the C1 block.
fn is_stripped_control(c: char) -> bool {
    let code = c as u32;
    match c {
        '\t' | '\n' | '\r' => false,
        _ => code < 0x20 || (0x7F..=0x9F).contains(&code),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn norm(raw: &[u8]) -> Option<String> {
        normalize(raw, &MessageLimits::default())
    }

    #[test]
    fn test_strips_nul_and_trims_newline() {
        assert_eq!(norm(b"Hello\x00World\n"), Some("HelloWorld".to_string()));
    }

    #[test]
    fn test_empty_is_rejected() {
        assert_eq!(norm(b""), None);
        assert_eq!(norm(b"   \r\n\t"), None);
        assert_eq!(norm(b"\x01\x02\x1b"), None);
    }

    #[test]
    fn test_too_long_is_rejected() {
        let long = "a".repeat(2000);
        assert_eq!(norm(long.as_bytes()), None);

        let exact = "a".repeat(1000);
        assert_eq!(norm(exact.as_bytes()), Some(exact));
    }

    #[test]
    fn test_length_counts_characters_not_bytes() {
        // 600 two-byte characters = 1200 bytes but only 600 chars.
        let text = "é".repeat(600);
        assert_eq!(norm(text.as_bytes()), Some(text));
    }

    #[test]
    fn test_min_length_window() {
        let limits = MessageLimits {
            min_length: 3,
            max_length: 10,
        };
        assert_eq!(normalize(b"hi", &limits), None);
        assert_eq!(normalize(b"hey", &limits), Some("hey".to_string()));
        assert_eq!(normalize(b"  hey  ", &limits), Some("hey".to_string()));
    }

    #[test]
    fn test_inner_whitespace_controls_preserved() {
        assert_eq!(
            norm(b"line one\r\nline\ttwo"),
            Some("line one\r\nline\ttwo".to_string())
        );
    }

    #[test]
    fn test_c1_and_del_stripped() {
        let input = "a\u{7f}b\u{85}c\u{9f}d\u{a0}e";
        // U+00A0 is outside the stripped range and is not at an edge.
        assert_eq!(norm(input.as_bytes()), Some("abcd\u{a0}e".to_string()));
    }

    #[test]
    fn test_invalid_utf8_dropped_not_replaced() {
        assert_eq!(norm(b"caf\xc3\xa9 \xff\xfeok"), Some("café ok".to_string()));
        // Truncated multi-byte sequence at the tail.
        assert_eq!(norm(b"ping\xe2\x82"), Some("ping".to_string()));
        assert_eq!(norm(b"\xff\xff"), None);
    }

    #[test]
    fn test_every_single_byte_is_safe() {
        for byte in 0u8..=255 {
            if let Some(text) = norm(&[byte]) {
                assert!(text.chars().all(|c| !is_stripped_control(c)));
                assert_eq!(text.chars().count(), 1);
            }
        }
    }

    #[test]
    fn test_output_never_contains_disallowed_controls() {
        let mut raw = Vec::new();
        for byte in 0u8..=255 {
            raw.push(b'x');
            raw.push(byte);
        }
        let text = norm(&raw).expect("plenty of printable content");
        assert!(text.chars().all(|c| !is_stripped_control(c)));
        assert!(text.chars().count() <= 1000);
    }
}
