//! Error types for the unisearch crate.
//!
//! All errors use stable string messages suitable for display to users
//! and programmatic handling. No tokens or credentials appear in error
//! messages.
//!
//! Backend-level errors never escape [`crate::SearchBackend::search`]; they
//! are folded into [`crate::BackendResponse`] values at the backend boundary.
//! Only the orchestrator's own failures reach the caller, and even those are
//! converted into a `success = false` envelope.

/// Errors that can occur during unified search operations.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    /// The backend has not passed a health check and refused the request.
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    /// An HTTP or storage request made by a single backend failed.
    #[error("transport error: {0}")]
    Transport(String),

    /// A backend or health probe exceeded its time budget.
    #[error("timed out: {0}")]
    Timeout(String),

    /// A backend response could not be decoded.
    #[error("parse error: {0}")]
    Parse(String),

    /// The object-storage listing provider failed.
    #[error("storage error: {0}")]
    Storage(String),

    /// A backend with the same type identifier is already registered.
    #[error("duplicate backend: {0}")]
    DuplicateBackend(String),

    /// The caller's request is malformed (empty query, bad limit, ...).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Invalid search configuration.
    #[error("config error: {0}")]
    Config(String),

    /// An unexpected failure inside aggregation or ranking.
    #[error("orchestrator failure: {0}")]
    Orchestrator(String),
}

impl SearchError {
    /// Whether this error means the backend is not reachable with the
    /// current credentials, as opposed to a transient failure.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::BackendUnavailable(_))
    }
}

/// Convenience type alias for unisearch results.
pub type Result<T> = std::result::Result<T, SearchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_backend_unavailable() {
        let err = SearchError::BackendUnavailable("not authenticated".into());
        assert_eq!(err.to_string(), "backend unavailable: not authenticated");
    }

    #[test]
    fn display_transport() {
        let err = SearchError::Transport("connection refused".into());
        assert_eq!(err.to_string(), "transport error: connection refused");
    }

    #[test]
    fn display_timeout() {
        let err = SearchError::Timeout("exceeded 30s limit".into());
        assert_eq!(err.to_string(), "timed out: exceeded 30s limit");
    }

    #[test]
    fn display_duplicate_backend() {
        let err = SearchError::DuplicateBackend("graphql".into());
        assert_eq!(err.to_string(), "duplicate backend: graphql");
    }

    #[test]
    fn display_config() {
        let err = SearchError::Config("max_limit must be > 0".into());
        assert_eq!(err.to_string(), "config error: max_limit must be > 0");
    }

    #[test]
    fn only_backend_unavailable_reports_unavailable() {
        assert!(SearchError::BackendUnavailable("x".into()).is_unavailable());
        assert!(!SearchError::Transport("x".into()).is_unavailable());
        assert!(!SearchError::Orchestrator("x".into()).is_unavailable());
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SearchError>();
    }
}
