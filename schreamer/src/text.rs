//! Text encodings for length-prefixed string payloads.

use serde_json::Value;

use crate::codec::describe;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextEncoding {
    Latin1,
    /// Always little-endian, whatever the byte order of the enclosing scope.
    Utf16,
    Utf8,
}

impl TextEncoding {
    pub fn label(self) -> &'static str {
        match self {
            TextEncoding::Latin1 => "LATIN1",
            TextEncoding::Utf16 => "UTF16",
            TextEncoding::Utf8 => "UTF8",
        }
    }

    /// Byte count of `text` once encoded, which is what the length prefix records.
    pub fn byte_len(self, text: &str) -> usize {
        match self {
            TextEncoding::Latin1 => text.chars().count(),
            TextEncoding::Utf16 => text.encode_utf16().count() * 2,
            TextEncoding::Utf8 => text.len(),
        }
    }

    pub(crate) fn encode(self, text: &str) -> Result<Vec<u8>, String> {
        match self {
            TextEncoding::Utf8 => Ok(text.as_bytes().to_vec()),
            TextEncoding::Utf16 => Ok(text.encode_utf16().flat_map(u16::to_le_bytes).collect()),
            TextEncoding::Latin1 => text
                .chars()
                .map(|c| {
                    u8::try_from(u32::from(c))
                        .map_err(|_| format!("{:?} can not be represented in LATIN1", c))
                })
                .collect(),
        }
    }

    /// Malformed input is decoded lossily.
    pub(crate) fn decode(self, bytes: &[u8]) -> String {
        match self {
            TextEncoding::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
            TextEncoding::Latin1 => bytes.iter().map(|&b| char::from(b)).collect(),
            TextEncoding::Utf16 => {
                let pairs = bytes.chunks_exact(2);
                let odd = !pairs.remainder().is_empty();
                let units = pairs
                    .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
                    .collect::<Vec<_>>();
                let mut text = String::from_utf16_lossy(&units);
                if odd {
                    text.push(char::REPLACEMENT_CHARACTER);
                }
                text
            }
        }
    }
}

/// Scalars are stringified, anything else is refused.
pub(crate) fn text_of(value: &Value) -> Result<String, String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => Err(format!("expected a string, found {}", describe(other))),
    }
}
