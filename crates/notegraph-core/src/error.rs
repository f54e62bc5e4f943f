//! Error types for notegraph.

use thiserror::Error;

/// Result type alias using notegraph's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for notegraph operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Model output could not be turned into a JSON object.
    #[error("Parse error: {message} (raw output: {excerpt:?})")]
    Parse { message: String, excerpt: String },

    /// A field is missing, mistyped, or out of range.
    #[error("Schema error at {path}: {message}")]
    Schema { path: String, message: String },

    /// The top-level payload is not an object or lacks a required array.
    #[error("Shape error: {0}")]
    Shape(String),

    /// Local server could not be started or died.
    #[error("Runtime error: {0}")]
    Runtime(String),

    /// A request-scoped deadline elapsed.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Inference/generation failed
    #[error("Inference error: {0}")]
    Inference(String),

    /// HTTP/network request failed
    #[error("Request error: {0}")]
    Request(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Build a schema error for a field path.
    pub fn schema(path: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Schema {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Build a parse error carrying a bounded excerpt of the raw output.
    pub fn parse(message: impl Into<String>, raw: &str) -> Self {
        Error::Parse {
            message: message.into(),
            excerpt: excerpt(raw, crate::defaults::RAW_EXCERPT_CHARS),
        }
    }
}

/// First `max_chars` characters of `raw`, with an ellipsis when truncated.
pub fn excerpt(raw: &str, max_chars: usize) -> String {
    let mut chars = raw.chars();
    let head: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        format!("{}…", head)
    } else {
        head
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Error::Timeout(e.to_string())
        } else {
            Error::Request(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_schema_includes_path() {
        let err = Error::schema("facts[2].evidenceStart", "expected integer");
        assert_eq!(
            err.to_string(),
            "Schema error at facts[2].evidenceStart: expected integer"
        );
    }

    #[test]
    fn test_error_display_shape() {
        let err = Error::Shape("missing required array `facts`".to_string());
        assert_eq!(err.to_string(), "Shape error: missing required array `facts`");
    }

    #[test]
    fn test_error_display_runtime() {
        let err = Error::Runtime("health check timed out".to_string());
        assert_eq!(err.to_string(), "Runtime error: health check timed out");
    }

    #[test]
    fn test_parse_error_bounds_excerpt() {
        let raw = "x".repeat(1000);
        match Error::parse("no JSON object found", &raw) {
            Error::Parse { excerpt, .. } => {
                assert_eq!(
                    excerpt.chars().count(),
                    crate::defaults::RAW_EXCERPT_CHARS + 1
                );
                assert!(excerpt.ends_with('…'));
            }
            other => panic!("Expected Parse error, got {:?}", other),
        }
    }

    #[test]
    fn test_excerpt_short_input_unchanged() {
        assert_eq!(excerpt("hello", 10), "hello");
        assert_eq!(excerpt("", 10), "");
    }

    #[test]
    fn test_excerpt_respects_char_boundaries() {
        assert_eq!(excerpt("ėėėė", 2), "ėė…");
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<i32>("not a number").unwrap_err();
        let err: Error = json_err.into();
        match err {
            Error::Serialization(msg) => assert!(!msg.is_empty()),
            _ => panic!("Expected Serialization error"),
        }
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "no such binary");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
        assert!(err.to_string().contains("no such binary"));
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<Error>();
        assert_sync::<Error>();
    }
}
