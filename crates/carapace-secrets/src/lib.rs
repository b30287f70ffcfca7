//! # Carapace Secrets
//!
//! Credential lifecycle engine for multi-service cluster deployments:
//!
//! - **Generation**: cryptographically strong values per declared schema
//! - **Persistence**: a deployable Kubernetes Secret manifest plus a
//!   SOPS/Age-encrypted envelope safe for version control
//! - **Idempotent regeneration**: re-running generation reuses deployed
//!   values; only an explicit rotation mints fresh ones
//! - **Drift repair**: live cluster state is compared against the
//!   encrypted source of truth and patched back when a chart invented its
//!   own credentials
//!
//! ## Example
//!
//! ```no_run
//! use carapace_secrets::{Config, RotationController, SecretStore, SopsAgeBackend};
//!
//! # fn main() -> carapace_secrets::Result<()> {
//! let config = Config::new("/opt/cluster");
//! let backend = SopsAgeBackend::new(&config);
//! let store = SecretStore::new(config, backend);
//!
//! // Idempotent: reuses whatever the envelope already holds.
//! let existing = store.read_existing("authentik");
//! let set = store.generate("authentik", existing.as_ref())?;
//! store.persist_manifest("authentik", "identity", &set)?;
//! store.persist_encrypted("authentik", &set)?;
//!
//! // Explicit rotation is the only path that invalidates values.
//! let controller = RotationController::new(&store);
//! controller.rotate("authentik")?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Security Considerations
//!
//! - Credential values zeroize their memory on drop and redact debug
//!   output
//! - The private-key file path reaches the encryption tool through the
//!   environment, never through a command line visible in process listings
//! - Plaintext only ever touches disk as a temp file that is encrypted in
//!   place and atomically renamed; on failure it is deleted before the
//!   error propagates

pub mod cluster;
pub mod config;
pub mod encryption;
pub mod error;
pub mod generator;
pub mod projection;
pub mod reconcile;
pub mod rotation;
pub mod schema;
pub mod store;
pub mod types;

mod process;

#[cfg(test)]
mod test_support;

// Re-export commonly used types
pub use error::{Error, Result};

pub use config::Config;

pub use types::{CredentialSet, CredentialValue};

pub use schema::{CharsetPolicy, CredentialKind, CredentialSpec, ServiceSchema, KNOWN_SERVICES};

pub use encryption::{EncryptionBackend, SetupStatus, SopsAgeBackend};

pub use store::SecretStore;

pub use rotation::{RotationController, RotationOutcome, RotationPhase, RotationSummary};

pub use cluster::{ClusterClient, KubectlClient, WorkloadKind, WorkloadRef};

pub use reconcile::{
    ConsistencyReconciler, ReconcileOutcome, ReconcileReport, ValidationOutcome, ValidationReport,
};
