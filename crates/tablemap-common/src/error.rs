//! Error types for the tablemap data layer.

use thiserror::Error;

/// Result type alias using TableError.
pub type TableResult<T> = Result<T, TableError>;

/// Primary error type for fetch, cache and decode operations.
#[derive(Debug, Error)]
pub enum TableError {
    // === Network Errors ===
    #[error("Network error: {0}")]
    Network(String),

    #[error("Remote table error (status {status}): {message}")]
    Remote { status: u16, message: String },

    #[error("Request timeout")]
    Timeout,

    // === Cache Errors ===
    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Decompression error: {0}")]
    Decompression(String),

    // === Decode Errors ===
    #[error("Failed to parse row {line}: {message}")]
    RowParse { line: usize, message: String },

    #[error("Geometry decode error: {0}")]
    GeometryDecode(String),

    #[error("Invalid value for '{variable}': {message}")]
    InvalidCell { variable: String, message: String },

    // === Configuration Errors ===
    #[error("Invalid source '{source_name}': {message}")]
    InvalidSource {
        source_name: String,
        message: String,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl TableError {
    /// Create an InvalidSource error.
    pub fn invalid_source(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidSource {
            source_name: source_name.into(),
            message: message.into(),
        }
    }

    /// Create an InvalidCell error.
    pub fn invalid_cell(variable: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidCell {
            variable: variable.into(),
            message: message.into(),
        }
    }

    /// Whether a retry with identical parameters may succeed.
    ///
    /// Only transport-level failures qualify; a remote error status is a
    /// definitive answer from the table store.
    pub fn is_transient(&self) -> bool {
        matches!(self, TableError::Network(_) | TableError::Timeout)
    }

    /// Short category name used in notifications and log fields.
    pub fn category(&self) -> &'static str {
        match self {
            TableError::Network(_) | TableError::Timeout => "network",
            TableError::Remote { .. } => "remote",
            TableError::Cache(_) | TableError::Decompression(_) => "cache",
            TableError::RowParse { .. }
            | TableError::GeometryDecode(_)
            | TableError::InvalidCell { .. } => "decode",
            TableError::InvalidSource { .. } | TableError::Config(_) => "config",
            TableError::Internal(_) => "internal",
        }
    }
}

impl From<std::io::Error> for TableError {
    fn from(err: std::io::Error) -> Self {
        TableError::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for TableError {
    fn from(err: serde_json::Error) -> Self {
        TableError::Internal(format!("JSON error: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_transport_errors_are_transient() {
        assert!(TableError::Network("connection reset".into()).is_transient());
        assert!(TableError::Timeout.is_transient());
        assert!(!TableError::Remote {
            status: 503,
            message: "busy".into()
        }
        .is_transient());
        assert!(!TableError::Decompression("bad header".into()).is_transient());
    }

    #[test]
    fn test_remote_error_carries_body_text() {
        let err = TableError::Remote {
            status: 404,
            message: "Table not found".into(),
        };
        assert_eq!(
            err.to_string(),
            "Remote table error (status 404): Table not found"
        );
        assert_eq!(err.category(), "remote");
    }
}
