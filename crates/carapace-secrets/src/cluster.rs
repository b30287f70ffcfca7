//! Narrow cluster collaborator interface.
//!
//! The reconciler needs exactly three verbs from the cluster: read one
//! field of one secret, patch named fields of one secret, and trigger a
//! rolling restart of a named workload. Nothing else is consumed from the
//! cluster API.

use std::fmt;
use std::process::Command;
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use tracing::{debug, info};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::process::{self, ProcessError};

const KUBECTL_BIN: &str = "kubectl";
const KUBECTL_INSTALL_HINT: &str = "install from https://kubernetes.io/docs/tasks/tools/";

/// Kinds of workloads the reconciler may restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum WorkloadKind {
    /// A Deployment.
    Deployment,
    /// A StatefulSet.
    StatefulSet,
}

impl fmt::Display for WorkloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Deployment => write!(f, "deployment"),
            Self::StatefulSet => write!(f, "statefulset"),
        }
    }
}

/// Reference to a restartable workload.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct WorkloadRef {
    /// Workload kind.
    pub kind: WorkloadKind,
    /// Workload name.
    pub name: String,
}

impl WorkloadRef {
    /// Creates a workload reference.
    #[must_use]
    pub fn new(kind: WorkloadKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }
}

impl fmt::Display for WorkloadRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.name)
    }
}

/// The three cluster verbs consumed by this crate.
pub trait ClusterClient {
    /// Reads one field of one secret, decoded to plaintext.
    ///
    /// Returns `Ok(None)` when the secret or field does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the cluster cannot be queried.
    fn read_secret_field(
        &self,
        namespace: &str,
        secret: &str,
        field: &str,
    ) -> Result<Option<String>>;

    /// Patches named fields of one secret with plaintext values.
    ///
    /// # Errors
    ///
    /// Returns an error if the patch is rejected.
    fn patch_secret_fields(
        &self,
        namespace: &str,
        secret: &str,
        fields: &[(String, String)],
    ) -> Result<()>;

    /// Triggers a rolling restart of a workload.
    ///
    /// # Errors
    ///
    /// Returns an error if the restart cannot be requested.
    fn rollout_restart(&self, namespace: &str, workload: &WorkloadRef) -> Result<()>;
}

/// Production client shelling out to `kubectl`.
#[derive(Debug, Clone)]
pub struct KubectlClient {
    timeout: Duration,
}

impl KubectlClient {
    /// Creates a client from the engine configuration.
    #[must_use]
    pub fn new(config: &Config) -> Self {
        Self {
            timeout: config.subprocess_timeout(),
        }
    }

    fn run(&self, cmd: &mut Command) -> Result<process::ProcessOutput> {
        let rendered = process::display_command(cmd);
        debug!(command = %rendered, "cluster call");
        process::run(cmd, self.timeout).map_err(|e| match e {
            ProcessError::Missing(_) => Error::ClusterCommandFailed {
                command: rendered.clone(),
                stderr: format!("{KUBECTL_BIN} not found; {KUBECTL_INSTALL_HINT}"),
            },
            ProcessError::Io(e) => Error::io(format!("failed to run '{rendered}'"), e),
            ProcessError::TimedOut => Error::CommandTimeout {
                command: rendered.clone(),
                timeout_secs: self.timeout.as_secs(),
            },
        })
    }
}

impl ClusterClient for KubectlClient {
    fn read_secret_field(
        &self,
        namespace: &str,
        secret: &str,
        field: &str,
    ) -> Result<Option<String>> {
        let mut cmd = Command::new(KUBECTL_BIN);
        cmd.args([
            "get",
            "secret",
            secret,
            "-n",
            namespace,
            "-o",
            &format!("jsonpath={{.data.{field}}}"),
        ]);
        let rendered = process::display_command(&cmd);

        let output = self.run(&mut cmd)?;
        if !output.success {
            let stderr = output.stderr_text();
            if stderr.contains("NotFound") {
                return Ok(None);
            }
            return Err(Error::ClusterCommandFailed {
                command: rendered,
                stderr,
            });
        }

        let encoded = output.stdout_text();
        if encoded.trim().is_empty() {
            return Ok(None);
        }
        let decoded = BASE64
            .decode(encoded.trim())
            .map_err(|e| Error::ClusterCommandFailed {
                command: rendered.clone(),
                stderr: format!("secret field is not valid base64: {e}"),
            })?;
        String::from_utf8(decoded)
            .map(Some)
            .map_err(|e| Error::ClusterCommandFailed {
                command: rendered,
                stderr: format!("secret field is not valid UTF-8: {e}"),
            })
    }

    fn patch_secret_fields(
        &self,
        namespace: &str,
        secret: &str,
        fields: &[(String, String)],
    ) -> Result<()> {
        let mut data = serde_json::Map::new();
        for (field, value) in fields {
            data.insert(
                field.clone(),
                serde_json::Value::String(BASE64.encode(value)),
            );
        }
        let payload = serde_json::json!({ "data": data }).to_string();

        let mut cmd = Command::new(KUBECTL_BIN);
        cmd.args(["patch", "secret", secret, "-n", namespace, "-p", &payload]);
        let rendered = process::display_command(&cmd);

        let output = self.run(&mut cmd)?;
        if output.success {
            info!(secret, namespace, "patched live secret");
            Ok(())
        } else {
            Err(Error::ClusterCommandFailed {
                command: rendered,
                stderr: output.stderr_text(),
            })
        }
    }

    fn rollout_restart(&self, namespace: &str, workload: &WorkloadRef) -> Result<()> {
        let target = workload.to_string();
        let mut cmd = Command::new(KUBECTL_BIN);
        cmd.args(["rollout", "restart", &target, "-n", namespace]);
        let rendered = process::display_command(&cmd);

        let output = self.run(&mut cmd)?;
        if output.success {
            info!(workload = %target, namespace, "rolling restart requested");
            Ok(())
        } else {
            Err(Error::ClusterCommandFailed {
                command: rendered,
                stderr: output.stderr_text(),
            })
        }
    }
}
