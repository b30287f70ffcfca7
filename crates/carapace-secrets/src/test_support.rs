//! Shared fakes for unit tests: a reversible mock encryption backend and a
//! recording in-memory cluster client.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::path::Path;

use crate::cluster::{ClusterClient, WorkloadRef};
use crate::encryption::EncryptionBackend;
use crate::error::{Error, Result};

/// Header marking a file as "encrypted" by the mock backend.
pub(crate) const MOCK_HEADER: &[u8] = b"MOCK-ENCRYPTED:v1\n";

const MOCK_XOR: u8 = 0x5A;

/// Reversible stand-in for the external encryption tool.
pub(crate) struct MockBackend;

impl EncryptionBackend for MockBackend {
    fn encrypt_in_place(&self, path: &Path) -> Result<()> {
        let plaintext = std::fs::read(path)
            .map_err(|e| Error::io(format!("mock read '{}'", path.display()), e))?;
        if plaintext.starts_with(MOCK_HEADER) {
            return Err(Error::EncryptionFailed {
                command: format!("mock encrypt {}", path.display()),
                stderr: "file is already encrypted".to_string(),
            });
        }
        let mut output = MOCK_HEADER.to_vec();
        output.extend(plaintext.iter().map(|b| b ^ MOCK_XOR));
        std::fs::write(path, output)
            .map_err(|e| Error::io(format!("mock write '{}'", path.display()), e))
    }

    fn decrypt(&self, path: &Path) -> Result<Vec<u8>> {
        let data = std::fs::read(path)
            .map_err(|e| Error::io(format!("mock read '{}'", path.display()), e))?;
        let Some(body) = data.strip_prefix(MOCK_HEADER) else {
            return Err(Error::DecryptionFailed {
                command: format!("mock decrypt {}", path.display()),
                stderr: "file is not mock-encrypted".to_string(),
            });
        };
        Ok(body.iter().map(|b| b ^ MOCK_XOR).collect())
    }
}

/// Backend whose encrypt always fails, for plaintext-cleanup tests.
pub(crate) struct FailingBackend;

impl EncryptionBackend for FailingBackend {
    fn encrypt_in_place(&self, path: &Path) -> Result<()> {
        Err(Error::EncryptionFailed {
            command: format!("mock encrypt {}", path.display()),
            stderr: "deliberate failure".to_string(),
        })
    }

    fn decrypt(&self, path: &Path) -> Result<Vec<u8>> {
        Err(Error::DecryptionFailed {
            command: format!("mock decrypt {}", path.display()),
            stderr: "deliberate failure".to_string(),
        })
    }
}

/// In-memory cluster that records every patch and restart.
#[derive(Default)]
pub(crate) struct MockCluster {
    /// `(namespace, secret, field) -> value`
    pub secrets: RefCell<BTreeMap<(String, String, String), String>>,
    /// Every patch call as `(namespace, secret, field, value)`.
    pub patches: RefCell<Vec<(String, String, String, String)>>,
    /// Every restart call as `namespace/kind/name`.
    pub restarts: RefCell<Vec<String>>,
}

impl MockCluster {
    pub fn with_secret(self, namespace: &str, secret: &str, field: &str, value: &str) -> Self {
        self.secrets.borrow_mut().insert(
            (namespace.to_string(), secret.to_string(), field.to_string()),
            value.to_string(),
        );
        self
    }

    pub fn live_value(&self, namespace: &str, secret: &str, field: &str) -> Option<String> {
        self.secrets
            .borrow()
            .get(&(namespace.to_string(), secret.to_string(), field.to_string()))
            .cloned()
    }
}

impl ClusterClient for MockCluster {
    fn read_secret_field(
        &self,
        namespace: &str,
        secret: &str,
        field: &str,
    ) -> Result<Option<String>> {
        Ok(self.live_value(namespace, secret, field))
    }

    fn patch_secret_fields(
        &self,
        namespace: &str,
        secret: &str,
        fields: &[(String, String)],
    ) -> Result<()> {
        for (field, value) in fields {
            self.secrets.borrow_mut().insert(
                (namespace.to_string(), secret.to_string(), field.clone()),
                value.clone(),
            );
            self.patches.borrow_mut().push((
                namespace.to_string(),
                secret.to_string(),
                field.clone(),
                value.clone(),
            ));
        }
        Ok(())
    }

    fn rollout_restart(&self, namespace: &str, workload: &WorkloadRef) -> Result<()> {
        self.restarts
            .borrow_mut()
            .push(format!("{namespace}/{}/{}", workload.kind, workload.name));
        Ok(())
    }
}
