//! Error handling with context pattern
//!
//! Broker-facing failures carry the request they belong to, so a tool
//! error reads as "what was being done" plus "what went wrong".
//! Absence of structure in a message (no envelope, no fault) is never
//! an error here; those paths return `Option::None`.

use thiserror::Error;

/// Result type alias for RabbitMQ MCP operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for RabbitMQ MCP operations
#[derive(Debug, Error)]
pub enum Error {
    /// Transport-level failure talking to the management API
    #[error("Request to {context} failed: {source}")]
    Http {
        context: String,
        #[source]
        source: reqwest::Error,
    },

    /// Management API answered with a non-success status
    #[error("{context} returned HTTP {status}: {body}")]
    Status {
        context: String,
        status: u16,
        body: String,
    },

    /// Credentials rejected by the management API
    #[error("Authentication failed for {context}")]
    Unauthorized { context: String },

    /// Queue, exchange or vhost does not exist
    #[error("Not found: {context}")]
    NotFound { context: String },

    /// Invalid tool or JSON-RPC request
    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    /// Unknown tool requested
    #[error("Unknown tool: {name}")]
    UnknownTool { name: String },

    /// Serialization/deserialization error
    #[error("Serialization error in {context}: {source}")]
    Serialization {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    /// Stdio transport failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Shorthand for an invalid request
    pub fn invalid(message: impl Into<String>) -> Self {
        Error::InvalidRequest {
            message: message.into(),
        }
    }
}

/// Extension trait for adding context to errors
pub trait ErrorContext<T> {
    /// Add context to an error
    fn with_context(self, context: impl Into<String>) -> Result<T>;
}

impl<T> ErrorContext<T> for std::result::Result<T, reqwest::Error> {
    fn with_context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| Error::Http {
            context: context.into(),
            source: e,
        })
    }
}

impl<T> ErrorContext<T> for std::result::Result<T, serde_json::Error> {
    fn with_context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| Error::Serialization {
            context: context.into(),
            source: e,
        })
    }
}
