//! Error types for ocean-search.

use thiserror::Error;

use crate::bbox::BboxParseError;
use crate::time::TimeParseError;

/// Result type alias using SearchError.
pub type SearchResult<T> = Result<T, SearchError>;

/// Primary error type for catalog search and data retrieval.
#[derive(Debug, Error)]
pub enum SearchError {
    // === Query Errors ===
    #[error("Invalid bbox: {0}")]
    InvalidBbox(#[from] BboxParseError),

    #[error("Invalid time specification: {0}")]
    InvalidTime(#[from] TimeParseError),

    #[error("No selection made; configure the reader with a region or stations first")]
    MissingSelection,

    #[error("Unknown server '{0}'; select a known server or give both protocol and server url")]
    UnknownServer(String),

    #[error("Invalid parameter value for '{param}': {message}")]
    InvalidParameter { param: String, message: String },

    #[error("Variables are not exact matches to parameter groups: {0:?}")]
    InvalidVariables(Vec<String>),

    // === Remote Errors ===
    #[error("HTTP request to {url} failed: {message}")]
    Http { url: String, message: String },

    #[error("Unexpected response from {url}: {message}")]
    UnexpectedResponse { url: String, message: String },

    #[error("Missing field '{field}' in {context}")]
    MissingField { field: String, context: String },

    // === Local Errors ===
    #[error("Catalog error: {0}")]
    Catalog(String),

    #[error("Failed to parse CSV data: {0}")]
    Csv(String),

    #[error("Failed to read data: {0}")]
    DataRead(String),

    #[error("Unsupported file type: {0}")]
    UnsupportedFile(String),
}

impl SearchError {
    pub fn missing_field(field: impl Into<String>, context: impl Into<String>) -> Self {
        SearchError::MissingField {
            field: field.into(),
            context: context.into(),
        }
    }

    pub fn unexpected(url: impl Into<String>, message: impl Into<String>) -> Self {
        SearchError::UnexpectedResponse {
            url: url.into(),
            message: message.into(),
        }
    }

    /// True for failures caused by the remote side rather than the query.
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            SearchError::Http { .. }
                | SearchError::UnexpectedResponse { .. }
                | SearchError::MissingField { .. }
        )
    }
}

// Conversion from common error types
impl From<std::io::Error> for SearchError {
    fn from(err: std::io::Error) -> Self {
        SearchError::DataRead(err.to_string())
    }
}

impl From<serde_json::Error> for SearchError {
    fn from(err: serde_json::Error) -> Self {
        SearchError::DataRead(format!("JSON error: {}", err))
    }
}

impl From<serde_yaml::Error> for SearchError {
    fn from(err: serde_yaml::Error) -> Self {
        SearchError::Catalog(format!("YAML error: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_classification() {
        let http = SearchError::Http {
            url: "http://example.com".to_string(),
            message: "404".to_string(),
        };
        assert!(http.is_remote());
        assert!(!SearchError::MissingSelection.is_remote());
    }

    #[test]
    fn test_bbox_error_converts() {
        let err: SearchError = crate::BoundingBox::from_bbox_string("1,2,3")
            .unwrap_err()
            .into();
        assert!(err.to_string().starts_with("Invalid bbox"));
    }
}
