//! Error types and reporting for relay stages.

use std::fmt;
use std::sync::{Arc, Mutex};
use tracing::{error, warn};

/// Errors that can occur while relaying one utterance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageError {
    /// The utterance is lost; the relay keeps going.
    Recoverable(String),
    /// The relay cannot continue.
    Fatal(String),
}

impl fmt::Display for StageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageError::Recoverable(msg) => write!(f, "Recoverable error: {}", msg),
            StageError::Fatal(msg) => write!(f, "Fatal error: {}", msg),
        }
    }
}

impl std::error::Error for StageError {}

/// Trait for reporting stage errors.
pub trait ErrorReporter: Send + Sync {
    fn report(&self, stage: &str, error: &StageError);
}

/// Reports through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

impl ErrorReporter for TracingReporter {
    fn report(&self, stage: &str, error: &StageError) {
        match error {
            StageError::Recoverable(msg) => warn!(stage, error = %msg, "Stage error"),
            StageError::Fatal(msg) => error!(stage, error = %msg, "Fatal stage error"),
        }
    }
}

/// Keeps every report in memory. Clones share the list.
#[derive(Debug, Clone, Default)]
pub struct CollectingReporter {
    reports: Arc<Mutex<Vec<(String, StageError)>>>,
}

impl CollectingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports(&self) -> Vec<(String, StageError)> {
        self.reports
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl ErrorReporter for CollectingReporter {
    fn report(&self, stage: &str, error: &StageError) {
        if let Ok(mut reports) = self.reports.lock() {
            reports.push((stage.to_string(), error.clone()));
        }
    }
}
