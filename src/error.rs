//! Crate-wide error taxonomy.
//!
//! The sync engine and the retrieval orchestrator branch on error kind:
//! transient provider failures are retried with backoff, validation failures
//! never are, and storage failures get a small bounded retry of their own.
//! Content problems (empty text, upstream collection failures) are not
//! errors at all; they become a [`crate::models::DocStatus`] on the document
//! and the batch continues.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Failure talking to an external provider (embeddings, generation).
    /// `transient` marks timeouts, connection resets, 429s and 5xx responses;
    /// those are eligible for backoff retry. Other provider failures are not.
    #[error("provider '{provider}' failed: {message}")]
    Provider {
        provider: String,
        message: String,
        transient: bool,
    },

    /// Malformed input or an out-of-range parameter. Never retried.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Persistence-layer failure.
    #[error("storage error: {0}")]
    Storage(String),

    /// The embedding loop stopped making progress while failures kept
    /// occurring. Fatal for the sync run.
    #[error("sync stagnated after {passes} pass(es) with {pending} embedding(s) still pending")]
    Stagnation { passes: u32, pending: u64 },
}

impl Error {
    pub fn transient(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Provider {
            provider: provider.into(),
            message: message.into(),
            transient: true,
        }
    }

    pub fn permanent(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Provider {
            provider: provider.into(),
            message: message.into(),
            transient: false,
        }
    }

    /// True only for provider failures worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Provider { transient: true, .. })
    }
}

impl From<sqlx::Error> for Error {
    fn from(e: sqlx::Error) -> Self {
        Error::Storage(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(Error::transient("openai", "timeout").is_transient());
        assert!(!Error::permanent("openai", "bad request").is_transient());
        assert!(!Error::Validation("question too short".into()).is_transient());
        assert!(!Error::Storage("disk full".into()).is_transient());
    }

    #[test]
    fn sqlx_errors_map_to_storage() {
        let err: Error = sqlx::Error::PoolTimedOut.into();
        assert!(matches!(err, Error::Storage(_)));
    }
}
