//! Payload encoding.

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

/// A payload could not be encoded or decoded.
#[derive(Debug, Error)]
pub enum SerializationError {
    /// The outgoing value could not be encoded
    #[error("failed to encode payload: {0}")]
    Encode(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The incoming text could not be decoded
    #[error("failed to decode payload: {0}")]
    Decode(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Converts payloads to and from their wire text.
pub trait Serializer: Send + Sync {
    /// Encode `value`.
    fn serialize<T>(&self, value: &T) -> Result<String, SerializationError>
    where
        T: Serialize + ?Sized;

    /// Decode `text` into a `T`.
    fn deserialize<T>(&self, text: &str) -> Result<T, SerializationError>
    where
        T: DeserializeOwned;

    /// Value for the `Content-Type` header.
    fn content_type(&self) -> &'static str;
}

/// JSON encoding via `serde_json`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl Serializer for JsonSerializer {
    fn serialize<T>(&self, value: &T) -> Result<String, SerializationError>
    where
        T: Serialize + ?Sized,
    {
        serde_json::to_string(value).map_err(|e| SerializationError::Encode(Box::new(e)))
    }

    fn deserialize<T>(&self, text: &str) -> Result<T, SerializationError>
    where
        T: DeserializeOwned,
    {
        serde_json::from_str(text).map_err(|e| SerializationError::Decode(Box::new(e)))
    }

    fn content_type(&self) -> &'static str {
        "application/json"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::ser::Error as _;
    use serde::Deserialize;
    use std::collections::HashMap;

    #[derive(Debug, Deserialize)]
    struct Token {
        token: String,
    }

    struct Unencodable;

    impl Serialize for Unencodable {
        fn serialize<S: serde::Serializer>(&self, _: S) -> Result<S::Ok, S::Error> {
            Err(S::Error::custom("refusing to encode"))
        }
    }

    #[test]
    fn test_json_encode() {
        let mut value = HashMap::new();
        value.insert("doc_id", "42");
        let text = JsonSerializer.serialize(&value).unwrap();
        assert_eq!(text, r#"{"doc_id":"42"}"#);
        assert_eq!(JsonSerializer.content_type(), "application/json");
    }

    #[test]
    fn test_json_decode() {
        let token: Token = JsonSerializer.deserialize(r#"{"token":"abc"}"#).unwrap();
        assert_eq!(token.token, "abc");
    }

    #[test]
    fn test_decode_failure() {
        let err = JsonSerializer
            .deserialize::<Token>("<html>bad gateway</html>")
            .unwrap_err();
        assert!(matches!(err, SerializationError::Decode(_)));
        assert!(err.to_string().starts_with("failed to decode payload"));
    }

    #[test]
    fn test_encode_failure() {
        let err = JsonSerializer.serialize(&Unencodable).unwrap_err();
        assert!(matches!(err, SerializationError::Encode(_)));
        assert!(err.to_string().contains("refusing to encode"));
    }
}
