//! Credential persistence: cluster manifests and encrypted envelopes.
//!
//! The store owns the mapping from a [`CredentialSet`] to its two on-disk
//! representations: the plaintext, base64-encoded Kubernetes Secret
//! manifest (local only, never committed) and the SOPS/Age-encrypted
//! envelope holding the chart-values projection (safe for version
//! control). It also implements the idempotence rule: regenerating a
//! service that already has credentials reuses them verbatim; only an
//! explicit rotation mints fresh values.

use std::collections::BTreeMap;
use std::path::PathBuf;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::encryption::EncryptionBackend;
use crate::error::{Error, Result};
use crate::generator;
use crate::projection::projection_for;
use crate::schema;
use crate::types::CredentialSet;

const MANAGED_BY: &str = "carapace";
const ROTATION_INTERVAL: &str = "30d";

/// Manifest fields derived from credentials rather than generated.
/// `(service, manifest field, derivation)`.
type DerivedField = (&'static str, &'static str, fn(&CredentialSet) -> Option<String>);

static DERIVED_FIELDS: &[DerivedField] = &[
    // The samba chart consumes `user;password` bootstrap lines.
    ("samba4", "samba-user-config", |set| {
        set.value("admin_password").map(|p| format!("admin;{p}"))
    }),
];

/// A rendered Kubernetes Secret document.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretManifest {
    /// Kubernetes API version (`v1`).
    pub api_version: String,
    /// Resource kind (`Secret`).
    pub kind: String,
    /// Resource metadata.
    pub metadata: ManifestMetadata,
    /// Secret type (`Opaque`).
    #[serde(rename = "type")]
    pub secret_type: String,
    /// Base64-encoded values, keys in deterministic order.
    pub data: BTreeMap<String, String>,
}

/// Metadata block of a [`SecretManifest`].
#[derive(Debug, Serialize)]
pub struct ManifestMetadata {
    /// Secret name, `<service>-secrets`.
    pub name: String,
    /// Target namespace.
    pub namespace: String,
    /// Identifying labels.
    pub labels: BTreeMap<String, String>,
    /// Generation bookkeeping annotations.
    pub annotations: BTreeMap<String, String>,
}

/// Persists credentials as manifests and encrypted envelopes.
pub struct SecretStore<B> {
    config: Config,
    backend: B,
}

impl<B: EncryptionBackend> SecretStore<B> {
    /// Creates a store over the given configuration and backend.
    pub fn new(config: Config, backend: B) -> Self {
        Self { config, backend }
    }

    /// The store's configuration.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Produces the credential set for a service, reusing existing values.
    ///
    /// For each key in the service's schema, `existing[key]` is reused when
    /// present and non-empty; otherwise a fresh value is generated. This is
    /// the idempotence rule: regeneration must never rotate credentials a
    /// running workload already consumed.
    ///
    /// # Errors
    ///
    /// Returns an error if generation fails for any spec.
    pub fn generate(
        &self,
        service: &str,
        existing: Option<&CredentialSet>,
    ) -> Result<CredentialSet> {
        let mut set = CredentialSet::new();
        for spec in schema::specs_for(service) {
            let reused = existing
                .and_then(|e| e.get(spec.key))
                .filter(|v| !v.is_empty());
            match reused {
                Some(value) => {
                    debug!(service, key = spec.key, "reusing existing credential");
                    set.insert(spec.key, value.clone());
                }
                None => {
                    set.insert(spec.key, generator::generate(spec)?);
                }
            }
        }
        Ok(set)
    }

    /// Renders the Kubernetes Secret manifest for a credential set.
    #[must_use]
    pub fn manifest_document(
        &self,
        service: &str,
        namespace: &str,
        set: &CredentialSet,
    ) -> SecretManifest {
        let mut data = BTreeMap::new();
        for (key, value) in set.iter() {
            data.insert(key.replace('_', "-"), BASE64.encode(value.expose()));
        }
        for (svc, field, derive) in DERIVED_FIELDS {
            if *svc == service {
                if let Some(value) = derive(set) {
                    data.insert((*field).to_string(), BASE64.encode(value));
                }
            }
        }

        let mut labels = BTreeMap::new();
        labels.insert("app.kubernetes.io/name".to_string(), service.to_string());
        labels.insert(
            "app.kubernetes.io/managed-by".to_string(),
            MANAGED_BY.to_string(),
        );
        labels.insert("carapace.dev/component".to_string(), "credentials".to_string());

        let mut annotations = BTreeMap::new();
        annotations.insert(
            "carapace.dev/generated-at".to_string(),
            Utc::now().to_rfc3339(),
        );
        annotations.insert(
            "carapace.dev/rotation-interval".to_string(),
            ROTATION_INTERVAL.to_string(),
        );

        SecretManifest {
            api_version: "v1".to_string(),
            kind: "Secret".to_string(),
            metadata: ManifestMetadata {
                name: format!("{service}-secrets"),
                namespace: namespace.to_string(),
                labels,
                annotations,
            },
            secret_type: "Opaque".to_string(),
            data,
        }
    }

    /// Writes the cluster manifest and returns its path.
    ///
    /// The manifest is plaintext-equivalent (base64 is encoding, not
    /// encryption) and therefore only ever lands in the local secrets
    /// directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the manifest cannot be rendered or written.
    pub fn persist_manifest(
        &self,
        service: &str,
        namespace: &str,
        set: &CredentialSet,
    ) -> Result<PathBuf> {
        let manifest = self.manifest_document(service, namespace, set);
        let rendered = serde_yaml::to_string(&manifest).map_err(|e| Error::Serialization {
            reason: format!("failed to render manifest for '{service}': {e}"),
        })?;

        let dir = self.config.service_dir(service);
        std::fs::create_dir_all(&dir)
            .map_err(|e| Error::io(format!("failed to create '{}'", dir.display()), e))?;

        let path = self.manifest_path(service);
        std::fs::write(&path, rendered)
            .map_err(|e| Error::io(format!("failed to write '{}'", path.display()), e))?;
        info!(service, path = %path.display(), "cluster manifest written");
        Ok(path)
    }

    /// Writes the encrypted envelope and returns its path.
    ///
    /// The values projection is written to a temporary sibling (named so
    /// the encryption tool's creation rule still matches), encrypted in
    /// place, and atomically renamed into the final path. No reader ever
    /// observes a partially-written or plaintext-at-rest envelope. If
    /// encryption fails the temporary plaintext is deleted before the
    /// error propagates.
    ///
    /// # Errors
    ///
    /// Returns an error if rendering, encryption, or the final rename
    /// fails.
    pub fn persist_encrypted(&self, service: &str, set: &CredentialSet) -> Result<PathBuf> {
        let doc = projection_for(service).project(set);
        let rendered = serde_yaml::to_string(&doc).map_err(|e| Error::Serialization {
            reason: format!("failed to render values for '{service}': {e}"),
        })?;

        let dir = self.config.service_dir(service);
        std::fs::create_dir_all(&dir)
            .map_err(|e| Error::io(format!("failed to create '{}'", dir.display()), e))?;

        let temp = dir.join(format!("{service}-secrets.tmp.enc.yaml"));
        let path = self.envelope_path(service);

        std::fs::write(&temp, rendered)
            .map_err(|e| Error::io(format!("failed to write '{}'", temp.display()), e))?;

        if let Err(e) = self.backend.encrypt_in_place(&temp) {
            if let Err(cleanup) = std::fs::remove_file(&temp) {
                warn!(path = %temp.display(), error = %cleanup, "failed to remove plaintext temp file");
            }
            return Err(e);
        }

        if let Err(e) = std::fs::rename(&temp, &path) {
            let _ = std::fs::remove_file(&temp);
            return Err(Error::io(
                format!("failed to move envelope into '{}'", path.display()),
                e,
            ));
        }
        info!(service, path = %path.display(), "encrypted envelope written");
        Ok(path)
    }

    /// Reads the previously persisted credential set, best effort.
    ///
    /// `None` means "no prior state": the envelope does not exist, could
    /// not be decrypted, or could not be parsed. All three are logged and
    /// none is fatal, so first-time generation can proceed.
    #[must_use]
    pub fn read_existing(&self, service: &str) -> Option<CredentialSet> {
        let path = self.envelope_path(service);
        if !path.exists() {
            debug!(service, "no existing envelope");
            return None;
        }

        let plaintext = match self.backend.decrypt(&path) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(service, error = %e, "could not decrypt existing envelope, treating as no prior state");
                return None;
            }
        };

        match serde_yaml::from_slice(&plaintext) {
            Ok(doc) => Some(projection_for(service).reverse(&doc)),
            Err(e) => {
                warn!(service, error = %e, "could not parse decrypted envelope, treating as no prior state");
                None
            }
        }
    }

    /// Reads the persisted credential set, failing when it cannot be
    /// served (the envelope is the source of truth for reconciliation).
    ///
    /// # Errors
    ///
    /// Returns [`Error::EnvelopeMissing`] when no envelope exists, or the
    /// underlying decryption/parse error.
    pub fn read_required(&self, service: &str) -> Result<CredentialSet> {
        let path = self.envelope_path(service);
        if !path.exists() {
            return Err(Error::EnvelopeMissing {
                service: service.to_string(),
                path,
            });
        }
        let plaintext = self.backend.decrypt(&path)?;
        let doc = serde_yaml::from_slice(&plaintext).map_err(|e| Error::Serialization {
            reason: format!("failed to parse envelope for '{service}': {e}"),
        })?;
        Ok(projection_for(service).reverse(&doc))
    }

    /// Path of the cluster manifest for a service.
    #[must_use]
    pub fn manifest_path(&self, service: &str) -> PathBuf {
        self.config
            .service_dir(service)
            .join(format!("{service}-secrets.yaml"))
    }

    /// Path of the encrypted envelope for a service.
    #[must_use]
    pub fn envelope_path(&self, service: &str) -> PathBuf {
        self.config
            .service_dir(service)
            .join(format!("{service}-secrets.enc.yaml"))
    }

    /// Lists every persisted secret artifact, sorted by path.
    #[must_use]
    pub fn list_artifacts(&self) -> Vec<PathBuf> {
        let mut artifacts = Vec::new();
        let Ok(services) = std::fs::read_dir(&self.config.secrets_dir) else {
            return artifacts;
        };
        for service in services.flatten() {
            let Ok(files) = std::fs::read_dir(service.path()) else {
                continue;
            };
            for file in files.flatten() {
                let name = file.file_name().to_string_lossy().into_owned();
                if name.ends_with("-secrets.yaml") || name.ends_with("-secrets.enc.yaml") {
                    artifacts.push(file.path());
                }
            }
        }
        artifacts.sort();
        artifacts
    }

    /// Removes every persisted secret artifact.
    ///
    /// # Errors
    ///
    /// Returns an error if the secrets directory cannot be removed.
    pub fn remove_artifacts(&self) -> Result<()> {
        let dir = &self.config.secrets_dir;
        if dir.exists() {
            std::fs::remove_dir_all(dir)
                .map_err(|e| Error::io(format!("failed to remove '{}'", dir.display()), e))?;
            info!(path = %dir.display(), "local secret artifacts removed");
        }
        Ok(())
    }
}
