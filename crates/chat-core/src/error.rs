//! Error types for the chat pipeline
//!
//! Forecast failures never surface here: they become transcript notices.

use thiserror::Error;

/// Errors surfaced by the chat client and its configuration
#[derive(Debug, Error)]
pub enum ChatError {
    /// Network or HTTP-level failure
    #[error("Network error: {0}")]
    Http(#[from] reqwest::Error),

    /// Backend answered with a non-2xx status
    #[error("HTTP {status}: {body}")]
    Status {
        status: u16,
        body: String,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias for chat operations
pub type Result<T> = std::result::Result<T, ChatError>;

impl From<chat_utils::EnvError> for ChatError {
    fn from(err: chat_utils::EnvError) -> Self {
        ChatError::Config(err.to_string())
    }
}

impl ChatError {
    /// Whether this failure belongs to the transport layer
    pub fn is_transport(&self) -> bool {
        matches!(self, ChatError::Http(_) | ChatError::Status { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chat_utils::EnvError;

    #[test]
    fn test_error_display() {
        let err = ChatError::Status {
            status: 502,
            body: "Bad Gateway".to_string(),
        };
        assert_eq!(err.to_string(), "HTTP 502: Bad Gateway");
        assert!(err.is_transport());

        let err = ChatError::Config("api_base must not be empty".to_string());
        assert_eq!(err.to_string(), "Configuration error: api_base must not be empty");
        assert!(!err.is_transport());
    }

    #[test]
    fn test_error_conversion() {
        let err: ChatError = EnvError {
            name: "MARKET_CHAT_TIMEOUT_SECS".to_string(),
            value: "soon".to_string(),
            reason: "invalid digit found in string".to_string(),
        }
        .into();

        match err {
            ChatError::Config(message) => {
                assert!(message.contains("MARKET_CHAT_TIMEOUT_SECS"));
                assert!(message.contains("soon"));
            }
            _ => panic!("Expected Config variant"),
        }
    }
}
