//! Normalized outcome of persistence-backed operations.
//!
//! Services never leak repository errors: every failure becomes an
//! [`OperationError`] carrying a caller-facing message. Infrastructure faults
//! are logged before being normalized.

use serde::Serialize;
use thiserror::Error;
use tracing::error;

use crate::application::repos::RepoError;
use crate::domain::error::DomainError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationErrorKind {
    NotFound,
    Conflict,
    Validation,
    Unexpected,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct OperationError {
    pub kind: OperationErrorKind,
    pub message: String,
}

pub type OperationResult<T> = Result<T, OperationError>;

impl OperationError {
    pub fn new(kind: OperationErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(OperationErrorKind::NotFound, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(OperationErrorKind::Validation, message)
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::new(OperationErrorKind::Unexpected, message)
    }

    pub fn is_unexpected(&self) -> bool {
        self.kind == OperationErrorKind::Unexpected
    }
}

impl From<RepoError> for OperationError {
    fn from(err: RepoError) -> Self {
        let kind = match &err {
            RepoError::NotFound { .. } | RepoError::Missing { .. } => OperationErrorKind::NotFound,
            RepoError::Conflict { .. } => OperationErrorKind::Conflict,
            RepoError::InvalidInput { .. } => OperationErrorKind::Validation,
            RepoError::Persistence(_) | RepoError::NotInitialized | RepoError::Timeout => {
                error!(
                    category = err.category(),
                    error = %err,
                    "Persistence operation failed"
                );
                OperationErrorKind::Unexpected
            }
        };
        Self::new(kind, err.to_string())
    }
}

impl From<DomainError> for OperationError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::NotFound { entity } => Self::not_found(format!("{entity} not found")),
            DomainError::Validation { message } => Self::validation(message),
        }
    }
}

/// `{success, data?, error?}` as printed to callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationOutcome<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T> OperationOutcome<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            message: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            message: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

impl<T, E: std::fmt::Display> From<Result<T, E>> for OperationOutcome<T> {
    fn from(result: Result<T, E>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(err) => Self::failed(err.to_string()),
        }
    }
}
