//! Credential rotation.
//!
//! Rotation is the one path allowed to invalidate existing credentials:
//! it always generates fresh values, bypassing the store's reuse rule, and
//! persists both representations. It never redeploys: rotated secrets are
//! inert until the deployment tooling rolls the workloads, and the summary
//! says so.

use std::fmt;
use std::path::PathBuf;

use tracing::{debug, info, warn};

use crate::encryption::EncryptionBackend;
use crate::error::{Error, Result};
use crate::schema;
use crate::store::SecretStore;

/// States of a single rotation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationPhase {
    /// No rotation in progress.
    Idle,
    /// Generating fresh credential values.
    Generating,
    /// Writing the manifest and encrypted envelope.
    Persisting,
    /// Redeployment of consumers; owned by external tooling, never entered
    /// by the controller itself.
    Redeploying,
    /// Rotation finished; both representations written.
    Done,
    /// Rotation aborted.
    Failed,
}

impl RotationPhase {
    /// True for phases a rotation cannot leave.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

impl fmt::Display for RotationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Generating => write!(f, "generating"),
            Self::Persisting => write!(f, "persisting"),
            Self::Redeploying => write!(f, "redeploying"),
            Self::Done => write!(f, "done"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Result of one successful rotation.
#[derive(Debug)]
pub struct RotationOutcome {
    /// The rotated service.
    pub service: String,
    /// Terminal phase reached; always [`RotationPhase::Done`] here.
    pub phase: RotationPhase,
    /// Paths written, manifest first.
    pub written: Vec<PathBuf>,
}

/// Per-service results of `rotate_all`.
///
/// Partial failure is a reported condition, not an error: one service
/// failing never aborts rotation of the rest.
#[derive(Debug, Default)]
pub struct RotationSummary {
    results: Vec<(String, Result<RotationOutcome>)>,
}

impl RotationSummary {
    /// Per-service results in rotation order.
    pub fn results(&self) -> impl Iterator<Item = (&str, &Result<RotationOutcome>)> {
        self.results.iter().map(|(s, r)| (s.as_str(), r))
    }

    /// Services whose rotation failed, with the failure.
    pub fn failures(&self) -> impl Iterator<Item = (&str, &Error)> {
        self.results
            .iter()
            .filter_map(|(s, r)| r.as_ref().err().map(|e| (s.as_str(), e)))
    }

    /// Number of services rotated successfully.
    #[must_use]
    pub fn rotated(&self) -> usize {
        self.results.iter().filter(|(_, r)| r.is_ok()).count()
    }

    /// True when every service rotated successfully.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.results.iter().all(|(_, r)| r.is_ok())
    }

    /// Number of services attempted.
    #[must_use]
    pub fn len(&self) -> usize {
        self.results.len()
    }

    /// True when no services were attempted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

/// Orchestrates generate → persist for explicit credential rotation.
pub struct RotationController<'a, B> {
    store: &'a SecretStore<B>,
}

impl<'a, B: EncryptionBackend> RotationController<'a, B> {
    /// Creates a controller over a store.
    pub const fn new(store: &'a SecretStore<B>) -> Self {
        Self { store }
    }

    /// Rotates one service: fresh values, both representations persisted.
    ///
    /// The store's reuse rule is deliberately bypassed. Consumers keep
    /// running on the old credentials until they are redeployed, which is
    /// the caller's responsibility.
    ///
    /// # Errors
    ///
    /// Returns an error if generation or persistence fails; on failure the
    /// envelope on disk is either the previous one or the new one, never a
    /// partial write.
    pub fn rotate(&self, service: &str) -> Result<RotationOutcome> {
        info!(service, "rotating credentials");

        debug!(service, phase = %RotationPhase::Generating, "rotation phase");
        let set = self.store.generate(service, None)?;

        debug!(service, phase = %RotationPhase::Persisting, "rotation phase");
        let namespace = schema::namespace_for(service);
        let manifest = self.store.persist_manifest(service, namespace, &set)?;
        let envelope = self.store.persist_encrypted(service, &set)?;

        info!(service, "rotation complete; secrets are inert until workloads are redeployed");
        Ok(RotationOutcome {
            service: service.to_string(),
            phase: RotationPhase::Done,
            written: vec![manifest, envelope],
        })
    }

    /// Rotates every known service, sequentially.
    ///
    /// Sequential on purpose: services share downstream infrastructure
    /// (database operator, cache), and concurrent rotation risks lock
    /// contention there. A failure is recorded and the remaining services
    /// still rotate.
    #[must_use]
    pub fn rotate_all(&self) -> RotationSummary {
        let mut summary = RotationSummary::default();
        for service in schema::KNOWN_SERVICES {
            let result = self.rotate(service);
            if let Err(e) = &result {
                warn!(service, error = %e, "rotation failed, continuing with remaining services");
            }
            summary.results.push(((*service).to_string(), result));
        }
        info!(
            rotated = summary.rotated(),
            attempted = summary.len(),
            "rotation sweep finished"
        );
        summary
    }
}
