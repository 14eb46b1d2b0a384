//! Error types for the selection/validation/batch pipeline (spec §7).

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the library accessor collaborator boundary (spec
/// §6 "Failure semantics of the collaborator boundary").
#[derive(Error, Debug, Clone)]
pub enum LibraryError {
    #[error("track not found: {0}")]
    NotFound(String),
    #[error("authentication failed: {0}")]
    AuthFailure(String),
    #[error("library accessor unreachable: {0}")]
    Unreachable(String),
    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("document parse error: {0}")]
    Parse(String),

    #[error("document is already locked by {0}")]
    LockBusy(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("tool call timed out: {0}")]
    ToolTimeout(String),

    #[error("tool call error: {0}")]
    ToolError(String),

    #[error("insufficient tracks: needed {needed}, found {found}")]
    InsufficientTracks { needed: usize, found: usize },

    #[error("budget exceeded: requested {requested}, remaining {remaining}")]
    BudgetExceeded {
        requested: wavelist_common::Usd,
        remaining: wavelist_common::Usd,
    },

    #[error("metadata enrichment unavailable for track {0}")]
    EnrichmentUnavailable(String),

    #[error("selection cancelled after timeout: {0}")]
    CancellationTimeout(String),

    #[error("library accessor error: {0}")]
    Library(#[from] LibraryError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Common(#[from] wavelist_common::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// The stable, short name used in decision-log `error_type` fields
    /// (spec §8 scenario 5: `decision_data.error_type == "LLMError"`).
    pub fn error_type(&self) -> &'static str {
        match self {
            Error::Parse(_) => "ParseError",
            Error::LockBusy(_) => "LockBusy",
            Error::Llm(_) => "LLMError",
            Error::ToolTimeout(_) => "ToolTimeout",
            Error::ToolError(_) => "ToolError",
            Error::InsufficientTracks { .. } => "InsufficientTracks",
            Error::BudgetExceeded { .. } => "BudgetExceeded",
            Error::EnrichmentUnavailable(_) => "EnrichmentUnavailable",
            Error::CancellationTimeout(_) => "CancellationTimeout",
            Error::Library(LibraryError::NotFound(_)) => "NotFound",
            Error::Library(LibraryError::AuthFailure(_)) => "AuthFailure",
            Error::Library(LibraryError::Unreachable(_)) => "Unreachable",
            Error::Library(LibraryError::RateLimited { .. }) => "RateLimited",
            Error::Io(_) => "IoError",
            Error::Json(_) => "JsonError",
            Error::Http(_) => "HttpError",
            Error::Common(_) => "CommonError",
            Error::Other(_) => "InternalError",
        }
    }
}
