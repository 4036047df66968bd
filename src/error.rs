use thiserror::Error;

use crate::auth::AuthError;
use crate::constants::{ERR_NOT_AUTHENTICATED, ERR_UNAUTHORIZED};
use crate::service::ServiceError;

pub type Result<T> = std::result::Result<T, ExpenseError>;

#[derive(Debug, Error)]
pub enum ExpenseError {
    #[error("{}", ERR_NOT_AUTHENTICATED)]
    NotAuthenticated,
    #[error("{}", ERR_UNAUTHORIZED)]
    Unauthorized,
    #[error("Record not found: {0}")]
    NotFound(String),
    #[error("{0}")]
    Validation(String),
    #[error("Failed to reach the expense service: {0}")]
    Persistence(String),
    /// Provider errors are passed through untouched so the UI can show
    /// provider-specific guidance.
    #[error(transparent)]
    Auth(#[from] AuthError),
}

impl ExpenseError {
    pub fn validation(message: impl Into<String>) -> Self {
        ExpenseError::Validation(message.into())
    }
}

impl From<ServiceError> for ExpenseError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::NotFound(id) => ExpenseError::NotFound(id),
            other => ExpenseError::Persistence(other.to_string()),
        }
    }
}
