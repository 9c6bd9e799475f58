//! Error types for the approval workflow system

use thiserror::Error;
use workflow_types::{ErrorBody, ErrorKind};

/// Main error type for all workflow operations
#[derive(Error, Debug)]
pub enum WorkflowError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("File system error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Notification failed: {0}")]
    Notification(String),
}

impl WorkflowError {
    /// Category reported to API callers
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::InvalidState(_) => ErrorKind::InvalidState,
            Self::Forbidden(_) => ErrorKind::Forbidden,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::Validation(_) => ErrorKind::Validation,
            Self::Config(_)
            | Self::Http(_)
            | Self::Json(_)
            | Self::Io(_)
            | Self::Serialization(_)
            | Self::Deserialization(_)
            | Self::Storage(_)
            | Self::Notification(_) => ErrorKind::Internal,
        }
    }

    pub fn to_body(&self) -> ErrorBody {
        ErrorBody {
            kind: self.kind(),
            message: self.to_string(),
        }
    }
}

impl From<config::ConfigError> for WorkflowError {
    fn from(e: config::ConfigError) -> Self {
        WorkflowError::Config(e.to_string())
    }
}

/// Result type for workflow operations
pub type Result<T> = std::result::Result<T, WorkflowError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(WorkflowError::NotFound("x".into()).kind(), ErrorKind::NotFound);
        assert_eq!(WorkflowError::InvalidState("x".into()).kind(), ErrorKind::InvalidState);
        assert_eq!(WorkflowError::Forbidden("x".into()).kind(), ErrorKind::Forbidden);
        assert_eq!(WorkflowError::Conflict("x".into()).kind(), ErrorKind::Conflict);
        assert_eq!(WorkflowError::Validation("x".into()).kind(), ErrorKind::Validation);
        assert_eq!(WorkflowError::Config("x".into()).kind(), ErrorKind::Internal);
    }

    #[test]
    fn test_body_carries_message() {
        let body = WorkflowError::Forbidden("bob cannot decide".into()).to_body();
        assert_eq!(body.kind, ErrorKind::Forbidden);
        assert_eq!(body.message, "Forbidden: bob cannot decide");
    }
}
