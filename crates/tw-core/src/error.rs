//! # AppError
//!
//! Centralized error handling for the threaded content store. Multi-step
//! mutations wrap whatever step failed into `OperationFailed`; callers
//! that only care about the category go through [`AppError::kind`].

use thiserror::Error;

/// Broad classification of a failure, independent of which operation or
/// step produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Validation,
    Store,
}

/// The primary error type for all store operations.
#[derive(Error, Debug)]
pub enum AppError {
    /// A referenced Thread/User/Community id does not resolve.
    #[error("{0} not found with id {1}")]
    NotFound(&'static str, String),

    /// Input rejected before any store call was issued.
    #[error("validation error: {0}")]
    Validation(String),

    /// The underlying document store call failed.
    #[error("store unavailable: {0}")]
    Store(anyhow::Error),

    /// A multi-step mutation aborted partway. Steps that already
    /// committed are not rolled back; the original failure rides along
    /// as the source.
    #[error("{op} failed")]
    OperationFailed {
        op: &'static str,
        #[source]
        source: Box<AppError>,
    },
}

impl AppError {
    pub fn store(err: anyhow::Error) -> Self {
        AppError::Store(err)
    }

    pub fn operation(op: &'static str, source: AppError) -> Self {
        AppError::OperationFailed {
            op,
            source: Box::new(source),
        }
    }

    /// Looks through `OperationFailed` wrappers to the underlying kind.
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::NotFound(..) => ErrorKind::NotFound,
            AppError::Validation(_) => ErrorKind::Validation,
            AppError::Store(_) => ErrorKind::Store,
            AppError::OperationFailed { source, .. } => source.kind(),
        }
    }
}

/// A specialized Result type for store logic.
pub type Result<T> = std::result::Result<T, AppError>;
