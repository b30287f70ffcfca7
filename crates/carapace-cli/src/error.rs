//! CLI error type: maps engine failures and CLI-level conditions onto a
//! single error surfaced as the process exit status.

use thiserror::Error;

/// Errors surfaced by the CLI.
#[derive(Debug, Error)]
pub enum CliError {
    /// An engine operation failed.
    #[error(transparent)]
    Engine(#[from] carapace_secrets::Error),

    /// `rotate-all` finished with at least one failed service.
    #[error("{failed} of {attempted} services failed to rotate")]
    PartialRotation {
        /// Number of services that failed.
        failed: usize,
        /// Number of services attempted.
        attempted: usize,
    },

    /// Validation found live credentials drifted from the source of truth.
    #[error("credential drift detected for service '{service}'")]
    DriftDetected {
        /// The drifted service.
        service: String,
    },

    /// The encryption setup is incomplete.
    #[error("encryption setup is incomplete: {missing}")]
    SetupIncomplete {
        /// Human-readable list of what is missing.
        missing: String,
    },

    /// `cleanup` was invoked without `--force`.
    #[error("cleanup is destructive; re-run with --force to confirm")]
    CleanupNotConfirmed,
}
