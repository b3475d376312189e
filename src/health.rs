//! Per-backend health state.
//!
//! Each backend owns one [`BackendHealth`]. Health checks and failed
//! searches write it; the orchestrator and registry read it concurrently.
//! All access goes through a single mutex and readers receive a copied
//! [`HealthSnapshot`], so a status and its error message are always seen
//! together.
//!
//! # State Machine
//!
//! ```text
//! ┌───────────────┐  probe ok    ┌───────────┐
//! │ Uninitialized ├─────────────►│ Available │◄──────────────┐
//! └──────┬────────┘              └─────┬─────┘               │
//!        │ probe refused / failed      │ search failed       │ probe ok
//!        ▼                             ▼                     │
//! ┌─────────────────────┐        ┌───────────┐               │
//! │ Unavailable / Error │───────►│   Error   ├───────────────┘
//! └─────────────────────┘        └───────────┘
//! ```
//!
//! A successful search never moves a backend out of `Error`; only an
//! explicit probe does.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::SearchError;
use crate::types::BackendStatus;

/// Point-in-time copy of a backend's health record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthSnapshot {
    /// Current status.
    pub status: BackendStatus,
    /// Message from the most recent failure, cleared by a successful probe.
    pub last_error: Option<String>,
    /// When the status was last determined by a probe or a failed search.
    pub last_checked: Option<DateTime<Utc>>,
}

impl Default for HealthSnapshot {
    fn default() -> Self {
        Self {
            status: BackendStatus::Uninitialized,
            last_error: None,
            last_checked: None,
        }
    }
}

impl HealthSnapshot {
    /// Whether a non-available record is old enough to be probed again.
    pub fn is_stale(&self, max_age: Duration, now: DateTime<Utc>) -> bool {
        if self.status == BackendStatus::Available {
            return false;
        }
        match self.last_checked {
            None => true,
            Some(checked) => (now - checked)
                .to_std()
                .map_or(true, |age| age >= max_age),
        }
    }
}

/// Mutex-guarded health record owned by one backend.
#[derive(Debug, Default)]
pub struct BackendHealth {
    name: &'static str,
    inner: Mutex<HealthSnapshot>,
}

impl BackendHealth {
    /// Create an uninitialised record for the named backend.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            inner: Mutex::new(HealthSnapshot::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HealthSnapshot> {
        // The record is always written whole, so a poisoned guard is still consistent.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy of the current record.
    pub fn snapshot(&self) -> HealthSnapshot {
        self.lock().clone()
    }

    /// Current status.
    pub fn status(&self) -> BackendStatus {
        self.lock().status
    }

    /// Record the outcome of a health probe and return whether it passed.
    ///
    /// - `Ok` → [`BackendStatus::Available`], error cleared
    /// - [`SearchError::BackendUnavailable`] → [`BackendStatus::Unavailable`]
    /// - any other error → [`BackendStatus::Error`]
    pub fn record_probe(&self, outcome: &Result<(), SearchError>) -> bool {
        let (status, error) = match outcome {
            Ok(()) => (BackendStatus::Available, None),
            Err(err) if err.is_unavailable() => (BackendStatus::Unavailable, Some(err.to_string())),
            Err(err) => (BackendStatus::Error, Some(err.to_string())),
        };
        self.transition(status, error);
        status == BackendStatus::Available
    }

    /// Record a failed search. Always lands in [`BackendStatus::Error`].
    pub fn record_search_failure(&self, err: &SearchError) {
        self.transition(BackendStatus::Error, Some(err.to_string()));
    }

    fn transition(&self, status: BackendStatus, error: Option<String>) {
        let previous = {
            let mut record = self.lock();
            let previous = record.status;
            *record = HealthSnapshot {
                status,
                last_error: error,
                last_checked: Some(Utc::now()),
            };
            previous
        };
        if previous != status {
            tracing::info!(backend = self.name, from = %previous, to = %status, "backend status changed");
        }
    }
}
