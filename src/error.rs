//! Failure taxonomy for the injection drivers and hook handlers.
//!
//! Normal "nothing to do" outcomes (no queue, awaits mismatch, ...) are not
//! errors; they are variants of the scheduler's `Action`. Everything here
//! aborts the current invocation and maps onto a process exit code.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DriveError {
    /// Malformed command-line input. Nothing was mutated.
    #[error("{0}")]
    Argument(String),

    /// Phase 0: the pane never showed a fresh, empty prompt.
    #[error("fresh empty prompt not detected within {}ms", waited.as_millis())]
    ReadinessTimeout { waited: Duration },

    /// Phase 1: typed text never became visible on the prompt line.
    #[error("typed text {text:?} not visible after {attempts} typing attempts")]
    TextVerificationFailed { text: String, attempts: u32 },

    /// Phase 2: the host never acknowledged the submit key.
    #[error("submission of {text:?} not confirmed after {attempts} submit attempts")]
    SubmissionNotConfirmed { text: String, attempts: u32 },

    /// A persisted state file exists but cannot be parsed.
    #[error("corrupt state file {}: {source}", path.display())]
    StaleData {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The gateway collaborator failed after all retries.
    #[error("gateway delivery failed: {0}")]
    Delivery(String),
}

impl DriveError {
    pub fn argument(message: impl Into<String>) -> Self {
        Self::Argument(message.into())
    }

    /// Process exit code surfaced to supervising processes.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Argument(_) => 1,
            Self::ReadinessTimeout { .. } => 2,
            Self::TextVerificationFailed { .. } => 3,
            Self::SubmissionNotConfirmed { .. } => 4,
            Self::StaleData { .. } | Self::Delivery(_) => 1,
        }
    }
}

/// Find the exit code for an arbitrary error chain.
pub fn exit_code_for(error: &anyhow::Error) -> i32 {
    error
        .downcast_ref::<DriveError>()
        .or_else(|| {
            error
                .chain()
                .find_map(|cause| cause.downcast_ref::<DriveError>())
        })
        .map(DriveError::exit_code)
        .unwrap_or(1)
}
