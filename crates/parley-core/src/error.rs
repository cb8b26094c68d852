//! Error types for parley operations.
//!
//! Every failure carries a structured [`ErrorCode`] so callers (and the HTTP
//! surface) can decide how to react without string matching.

use thiserror::Error;

/// Result type alias for parley operations.
pub type ParleyResult<T> = Result<T, ParleyError>;

/// Main error type for all parley operations.
#[derive(Error, Debug)]
pub enum ParleyError {
    /// Missing or malformed configuration, or a missing required secret.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The conversation was never initialized or has already been torn down.
    #[error("Conversation not found: {conversation_id}")]
    ConversationNotFound {
        conversation_id: String,
        code: ErrorCode,
    },

    /// A configured trigger pattern failed to compile or evaluate.
    #[error("Pattern error for '{pattern}': {message}")]
    Pattern {
        pattern: String,
        message: String,
        code: ErrorCode,
    },

    /// Graph store read failed or exceeded its deadline.
    #[error("Graph query error: {message}")]
    GraphQuery {
        message: String,
        code: ErrorCode,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Webhook or email delivery failed.
    #[error("Delivery error: {message}")]
    Delivery {
        message: String,
        code: ErrorCode,
        status: Option<u16>,
    },

    /// An event category with no matching handler.
    #[error("Unhandled message: {category}")]
    UnhandledMessage { category: String },

    /// Outbound publish failed.
    #[error("Publish error: {0}")]
    Publish(String),

    /// Notification template failed to render.
    #[error("Template error: {0}")]
    Template(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error codes for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Configuration (CFG_xxx)
    CfgInvalid,

    // Conversation (CONV_xxx)
    ConvNotFound,

    // Pattern (PAT_xxx)
    PatInvalid,

    // Graph (GRP_xxx)
    GrpConnectionFailed,
    GrpOperationFailed,

    // Delivery (DLV_xxx)
    DlvRejected,
    DlvFailed,

    // Network (NET_xxx)
    NetTimeout,
    NetConnectionFailed,

    // Internal
    Internal,
}

impl ErrorCode {
    /// Get the string representation of the error code.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::CfgInvalid => "CFG_001",
            ErrorCode::ConvNotFound => "CONV_001",
            ErrorCode::PatInvalid => "PAT_001",
            ErrorCode::GrpConnectionFailed => "GRP_001",
            ErrorCode::GrpOperationFailed => "GRP_002",
            ErrorCode::DlvRejected => "DLV_001",
            ErrorCode::DlvFailed => "DLV_002",
            ErrorCode::NetTimeout => "NET_001",
            ErrorCode::NetConnectionFailed => "NET_002",
            ErrorCode::Internal => "INT_001",
        }
    }
}

impl ParleyError {
    /// Create a conversation-not-found error.
    pub fn conversation_not_found(conversation_id: impl Into<String>) -> Self {
        Self::ConversationNotFound {
            conversation_id: conversation_id.into(),
            code: ErrorCode::ConvNotFound,
        }
    }

    /// Create a pattern error.
    pub fn pattern(pattern: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Pattern {
            pattern: pattern.into(),
            message: message.into(),
            code: ErrorCode::PatInvalid,
        }
    }

    /// Create a graph query error.
    pub fn graph_query(message: impl Into<String>) -> Self {
        Self::GraphQuery {
            message: message.into(),
            code: ErrorCode::GrpOperationFailed,
            source: None,
        }
    }

    /// Create a graph query error that keeps the driver error as its source.
    pub fn graph_query_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::GraphQuery {
            message: message.into(),
            code: ErrorCode::GrpOperationFailed,
            source: Some(Box::new(source)),
        }
    }

    /// Create a graph connection error.
    pub fn graph_connection(message: impl Into<String>) -> Self {
        Self::GraphQuery {
            message: message.into(),
            code: ErrorCode::GrpConnectionFailed,
            source: None,
        }
    }

    /// Create a graph query timeout error.
    pub fn graph_timeout(operation: &str, timeout: std::time::Duration) -> Self {
        Self::GraphQuery {
            message: format!("{} exceeded deadline of {:?}", operation, timeout),
            code: ErrorCode::NetTimeout,
            source: None,
        }
    }

    /// Create a delivery error for a rejected request (HTTP 400).
    pub fn delivery_rejected(status: u16, body: impl Into<String>) -> Self {
        Self::Delivery {
            message: format!("{}: {}", status, body.into().trim()),
            code: ErrorCode::DlvRejected,
            status: Some(status),
        }
    }

    /// Create a generic delivery error.
    pub fn delivery(message: impl Into<String>) -> Self {
        Self::Delivery {
            message: message.into(),
            code: ErrorCode::DlvFailed,
            status: None,
        }
    }

    /// Create a delivery error for a response status other than 2xx or 400.
    pub fn delivery_status(status: u16) -> Self {
        Self::Delivery {
            message: format!("Unknown/Fatal Error (status {})", status),
            code: ErrorCode::DlvFailed,
            status: Some(status),
        }
    }

    /// Create a delivery error for a request that never got a response.
    pub fn delivery_transport(message: impl Into<String>) -> Self {
        Self::Delivery {
            message: message.into(),
            code: ErrorCode::NetConnectionFailed,
            status: None,
        }
    }

    /// Create a delivery timeout error.
    pub fn delivery_timeout(timeout: std::time::Duration) -> Self {
        Self::Delivery {
            message: format!("no response within {:?}", timeout),
            code: ErrorCode::NetTimeout,
            status: None,
        }
    }

    /// Create an unhandled message error.
    pub fn unhandled(category: impl Into<String>) -> Self {
        Self::UnhandledMessage {
            category: category.into(),
        }
    }

    /// Create a missing secret error.
    pub fn missing_secret(variable: &str) -> Self {
        Self::Configuration(format!("{} not found in environment", variable))
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Get the error code.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Configuration(_) => ErrorCode::CfgInvalid,
            Self::ConversationNotFound { code, .. } => *code,
            Self::Pattern { code, .. } => *code,
            Self::GraphQuery { code, .. } => *code,
            Self::Delivery { code, .. } => *code,
            _ => ErrorCode::Internal,
        }
    }

    /// Whether repeating the same request may succeed.
    ///
    /// Transport failures, timeouts and 5xx responses are retryable; a
    /// rejected request is not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Delivery { code, status, .. } => match status {
                Some(status) => *status >= 500,
                None => matches!(code, ErrorCode::NetTimeout | ErrorCode::NetConnectionFailed),
            },
            Self::GraphQuery { code, .. } => {
                matches!(code, ErrorCode::NetTimeout | ErrorCode::GrpConnectionFailed)
            }
            _ => false,
        }
    }

    /// Whether the caller should drop the event rather than fail the process.
    pub fn is_conversation_scoped(&self) -> bool {
        matches!(
            self,
            Self::ConversationNotFound { .. }
                | Self::GraphQuery { .. }
                | Self::Delivery { .. }
                | Self::UnhandledMessage { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversation_not_found_error() {
        let err = ParleyError::conversation_not_found("conv-1");
        assert_eq!(err.code(), ErrorCode::ConvNotFound);
        assert!(err.to_string().contains("conv-1"));
        assert!(err.is_conversation_scoped());
    }

    #[test]
    fn test_delivery_rejected_keeps_body() {
        let err = ParleyError::delivery_rejected(400, "bad secret\n");
        assert_eq!(err.code(), ErrorCode::DlvRejected);
        assert_eq!(err.to_string(), "Delivery error: 400: bad secret");
    }

    #[test]
    fn test_retryable_delivery_errors() {
        assert!(ParleyError::delivery_status(503).is_retryable());
        assert!(ParleyError::delivery_timeout(std::time::Duration::from_secs(3)).is_retryable());
        assert!(ParleyError::delivery_transport("connection refused").is_retryable());
        assert!(!ParleyError::delivery_rejected(400, "nope").is_retryable());
        assert!(!ParleyError::delivery_status(404).is_retryable());
        assert!(!ParleyError::conversation_not_found("c").is_retryable());
    }

    #[test]
    fn test_graph_timeout_code() {
        let err = ParleyError::graph_timeout("prior_matches", std::time::Duration::from_millis(50));
        assert_eq!(err.code(), ErrorCode::NetTimeout);
    }

    #[test]
    fn test_graph_query_keeps_driver_source() {
        use std::error::Error as _;

        let driver = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset by peer");
        let err = ParleyError::graph_query_source("Failed to run query", driver);
        assert_eq!(err.code(), ErrorCode::GrpOperationFailed);
        assert_eq!(err.source().map(|s| s.to_string()).as_deref(), Some("reset by peer"));
        assert!(ParleyError::graph_query("no source").source().is_none());
    }

    #[test]
    fn test_conversation_scoped_errors() {
        assert!(ParleyError::graph_query("x").is_conversation_scoped());
        assert!(ParleyError::delivery_status(500).is_conversation_scoped());
        assert!(ParleyError::unhandled("foo").is_conversation_scoped());
        assert!(!ParleyError::Configuration("x".into()).is_conversation_scoped());
        assert!(!ParleyError::internal("x").is_conversation_scoped());
    }

    #[test]
    fn test_error_code_as_str() {
        assert_eq!(ErrorCode::ConvNotFound.as_str(), "CONV_001");
        assert_eq!(ErrorCode::PatInvalid.as_str(), "PAT_001");
        assert_eq!(ParleyError::Configuration("x".into()).code().as_str(), "CFG_001");
    }
}
