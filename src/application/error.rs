use thiserror::Error;

use crate::application::mutations::MutationError;
use crate::application::operation::OperationError;
use crate::cache::QueryError;
use crate::domain::error::DomainError;
use crate::infra::error::InfraError;

/// Top-level failure of a command-line run.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error(transparent)]
    Operation(#[from] OperationError),
    #[error(transparent)]
    Mutation(#[from] MutationError),
    #[error(transparent)]
    Query(#[from] QueryError),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }

    /// Process exit code for this failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            AppError::Domain(_) | AppError::Validation(_) => 2,
            AppError::Infra(InfraError::Configuration { .. }) => 78,
            AppError::Infra(_) => 74,
            AppError::Operation(_)
            | AppError::Mutation(_)
            | AppError::Query(_)
            | AppError::Unexpected(_) => 1,
        }
    }
}
