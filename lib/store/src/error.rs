//! Repository error type.

use chatflow_flow::FlowError;
use std::fmt;

/// Errors from repository operations that carry domain meaning beyond a
/// database failure.
#[derive(Debug)]
pub enum RepositoryError {
    /// A flow-level rule was violated (missing flow, quota, invalid graph).
    Flow(FlowError),
    /// The database failed.
    Database(sqlx::Error),
}

impl fmt::Display for RepositoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Flow(e) => write!(f, "{e}"),
            Self::Database(e) => write!(f, "database error: {e}"),
        }
    }
}

impl std::error::Error for RepositoryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Flow(e) => Some(e),
            Self::Database(e) => Some(e),
        }
    }
}

impl From<FlowError> for RepositoryError {
    fn from(e: FlowError) -> Self {
        Self::Flow(e)
    }
}

impl From<sqlx::Error> for RepositoryError {
    fn from(e: sqlx::Error) -> Self {
        Self::Database(e)
    }
}
