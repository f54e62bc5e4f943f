//! HTTP error classification shared by the remote providers.

use notegraph_core::Error;

/// Provider error classes derived from status and error type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorCode {
    /// Invalid or missing credentials.
    AuthenticationError,
    /// Rate limit or quota exceeded.
    RateLimitExceeded,
    /// Model not found or not available.
    ModelNotFound,
    /// Request too large for the model.
    ContextLengthExceeded,
    /// Schema or request rejected by the provider.
    InvalidRequest,
    /// Server error.
    ServerError,
    /// Unknown error.
    Unknown,
}

impl ProviderErrorCode {
    /// Determine error code from HTTP status and the provider's error type.
    pub fn from_response(status: u16, error_type: &str) -> Self {
        let error_type = error_type.to_lowercase();
        match (status, error_type.as_str()) {
            (401, _) | (403, _) => Self::AuthenticationError,
            (429, _) | (_, "resource_exhausted") => Self::RateLimitExceeded,
            (404, _) | (_, "model_not_found") => Self::ModelNotFound,
            (400, t) if t.contains("context_length") => Self::ContextLengthExceeded,
            (400, _) | (422, _) => Self::InvalidRequest,
            (500..=599, _) => Self::ServerError,
            _ => Self::Unknown,
        }
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimitExceeded | Self::ServerError)
    }
}

/// Convert a provider error into a notegraph error.
pub fn to_notegraph_error(provider: &str, code: ProviderErrorCode, message: &str) -> Error {
    match code {
        ProviderErrorCode::AuthenticationError => {
            Error::Config(format!("{} authentication failed: {}", provider, message))
        }
        ProviderErrorCode::ModelNotFound => {
            Error::Config(format!("{} model not found: {}", provider, message))
        }
        ProviderErrorCode::RateLimitExceeded => {
            Error::Inference(format!("{} rate limit exceeded: {}", provider, message))
        }
        ProviderErrorCode::ContextLengthExceeded => {
            Error::Inference(format!("{} context too long: {}", provider, message))
        }
        ProviderErrorCode::InvalidRequest => {
            Error::Inference(format!("{} rejected the request: {}", provider, message))
        }
        ProviderErrorCode::ServerError => {
            Error::Inference(format!("{} server error: {}", provider, message))
        }
        ProviderErrorCode::Unknown => Error::Inference(format!("{}: {}", provider, message)),
    }
}
