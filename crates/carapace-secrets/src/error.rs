//! Error types for the credential lifecycle engine.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while managing credentials.
#[derive(Debug, Error)]
pub enum Error {
    /// Credential generation failed.
    #[error("credential generation failed: {reason}")]
    Generation {
        /// The reason generation failed.
        reason: String,
    },

    /// A required external tool is not installed.
    #[error("required tool '{tool}' not found: {hint}")]
    EncryptionToolMissing {
        /// The binary that could not be found.
        tool: String,
        /// Actionable installation hint for the operator.
        hint: String,
    },

    /// The encryption subprocess exited with a failure.
    #[error("encryption failed ({command}): {stderr}")]
    EncryptionFailed {
        /// The exact command that was executed.
        command: String,
        /// The subprocess's error stream, verbatim.
        stderr: String,
    },

    /// The decryption subprocess exited with a failure.
    #[error("decryption failed ({command}): {stderr}")]
    DecryptionFailed {
        /// The exact command that was executed.
        command: String,
        /// The subprocess's error stream, verbatim.
        stderr: String,
    },

    /// The asymmetric key material has not been initialized.
    #[error("key material missing at '{}': run `carapace init` first", path.display())]
    KeyMaterialMissing {
        /// Expected location of the private-key file.
        path: PathBuf,
    },

    /// No encrypted envelope exists for a service that requires one.
    #[error("no encrypted envelope for service '{service}' at '{}'", path.display())]
    EnvelopeMissing {
        /// The service whose envelope was requested.
        service: String,
        /// Expected location of the envelope.
        path: PathBuf,
    },

    /// A cluster query or mutation failed.
    #[error("cluster command failed ({command}): {stderr}")]
    ClusterCommandFailed {
        /// The exact command that was executed.
        command: String,
        /// The subprocess's error stream, verbatim.
        stderr: String,
    },

    /// An external command did not complete within its deadline.
    #[error("command timed out after {timeout_secs}s ({command})")]
    CommandTimeout {
        /// The exact command that was executed.
        command: String,
        /// The configured timeout in seconds.
        timeout_secs: u64,
    },

    /// A filesystem operation failed.
    #[error("{context}: {source}")]
    Io {
        /// What was being attempted.
        context: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Serializing or deserializing a document failed.
    #[error("serialization error: {reason}")]
    Serialization {
        /// The reason serialization failed.
        reason: String,
    },

    /// The configuration is invalid.
    #[error("configuration error: {reason}")]
    Config {
        /// The reason the configuration is invalid.
        reason: String,
    },
}

impl Error {
    /// Wraps an I/O error with the path or action that produced it.
    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}

/// Result type alias for credential operations.
pub type Result<T> = std::result::Result<T, Error>;
