/// Domain-specific error types for pharmsearch
///
/// Load errors are fatal and block serving. Query errors are never surfaced as
/// failures to callers: the service converts them into an empty response that
/// carries the error code, so a bad filter value cannot crash a request.

#[derive(Debug, thiserror::Error)]
pub enum PharmaError {
    #[error("Catalogue load error{}: {message}", row.map(|r| format!(" (row {})", r)).unwrap_or_default())]
    Load {
        message: String,
        /// 1-based data row (header excluded), when the failure is row-specific
        row: Option<usize>,
    },

    #[error("Query error on '{field}': {message}")]
    Query {
        field: String,
        message: String,
    },

    #[error("Index unavailable: {0}")]
    IndexUnavailable(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<csv::Error> for PharmaError {
    fn from(e: csv::Error) -> Self {
        let row = e.position().map(|p| p.line().saturating_sub(1) as usize);
        PharmaError::Load {
            message: e.to_string(),
            row,
        }
    }
}

impl PharmaError {
    /// Catalogue-level load error without a row position.
    pub fn load(message: impl Into<String>) -> Self {
        PharmaError::Load {
            message: message.into(),
            row: None,
        }
    }

    /// Helper to create filter validation errors with field names
    ///
    /// Example:
    /// ```
    /// use pharmsearch::errors::PharmaError;
    /// let err = PharmaError::invalid_filter("sort_by", "unknown sort key 'price'");
    /// assert_eq!(err.code(), "invalid_filter");
    /// ```
    pub fn invalid_filter(field: &str, message: &str) -> Self {
        PharmaError::Query {
            field: field.to_string(),
            message: message.to_string(),
        }
    }

    /// Stable machine-readable code, used in search responses and CLI output.
    pub fn code(&self) -> &'static str {
        match self {
            PharmaError::Load { .. } => "load_error",
            PharmaError::Query { .. } => "invalid_filter",
            PharmaError::IndexUnavailable(_) => "index_unavailable",
            PharmaError::Config(_) => "config_error",
            PharmaError::Internal(_) => "internal_error",
        }
    }

    /// Whether this error must stop the process from serving.
    pub fn is_fatal(&self) -> bool {
        matches!(self, PharmaError::Load { .. } | PharmaError::Config(_))
    }
}
