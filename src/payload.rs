//! Turning message bodies into values and back.
use std::fmt;

/// The content type of every message the relay publishes.
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// The body of a delivery, decoded.
///
/// A body that is not a JSON document is not an error: it is kept as text so that it can be
/// observed and forwarded like any other message.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedPayload {
    /// The body was UTF-8 text containing a JSON document (object, array or scalar).
    Structured(serde_json::Value),
    /// The body was not valid JSON. Invalid UTF-8 sequences have been replaced with `U+FFFD`.
    Text(String),
}

impl DecodedPayload {
    /// Returns `false` if decoding fell back to text.
    pub fn is_structured(&self) -> bool {
        matches!(self, Self::Structured(_))
    }

    /// Serialize the payload as UTF-8 JSON.
    ///
    /// Structured values are written in their compact JSON form; text is written as a JSON
    /// string literal. Non-ASCII characters are not escaped.
    pub fn to_json_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        match self {
            Self::Structured(value) => serde_json::to_vec(value),
            Self::Text(text) => serde_json::to_vec(text),
        }
    }
}

impl fmt::Display for DecodedPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Structured(value) => write!(f, "{value}"),
            Self::Text(text) => f.write_str(text),
        }
    }
}

/// Decode a raw message body.
///
/// This never fails: bodies that are not UTF-8, or not JSON, come back as
/// [`DecodedPayload::Text`].
pub fn decode(body: &[u8]) -> DecodedPayload {
    match std::str::from_utf8(body) {
        Ok(text) => match serde_json::from_str(text) {
            Ok(value) => DecodedPayload::Structured(value),
            Err(_) => DecodedPayload::Text(text.to_owned()),
        },
        Err(_) => DecodedPayload::Text(String::from_utf8_lossy(body).into_owned()),
    }
}
