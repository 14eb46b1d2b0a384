//! Common error types shared by every wavelist crate.

use thiserror::Error;

/// Common result type for wavelist operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors originating from shared code: the data model's invariants, the
/// fixed-point money type, and configuration resolution. Selection/batch
/// specific errors live in `wavelist_core::error`.
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Internal error: {0}")]
    Internal(String),
}
