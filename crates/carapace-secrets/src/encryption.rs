//! Encryption backend: a thin adapter over the external SOPS/Age tooling.
//!
//! The [`EncryptionBackend`] trait has exactly two methods so the one place
//! that shells out to `sops` stays isolated; a native implementation of the
//! same on-disk format could replace it without touching any other
//! component. Key material is an Age key pair: a private-key file written
//! once with mode 0600, and a public key parsed from the `# public key:`
//! line of the generator's output.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::process::{self, ProcessError};

/// Environment variable through which the private-key file path is handed
/// to the encryption tool. Never passed as a command-line argument, which
/// would leak it through process listings.
const AGE_KEY_ENV: &str = "SOPS_AGE_KEY_FILE";

const SOPS_BIN: &str = "sops";
const AGE_KEYGEN_BIN: &str = "age-keygen";

const SOPS_INSTALL_HINT: &str = "install from https://github.com/getsops/sops";
const AGE_INSTALL_HINT: &str = "install from https://github.com/FiloSottile/age";

/// Marker line in `age-keygen` output carrying the public key.
const PUBLIC_KEY_PREFIX: &str = "# public key:";

/// Asymmetric encryption of files at rest.
///
/// `encrypt_in_place` replaces a plaintext file with its ciphertext;
/// `decrypt` returns the plaintext of an encrypted file without modifying
/// it.
pub trait EncryptionBackend {
    /// Encrypts the file at `path` in place.
    ///
    /// # Errors
    ///
    /// Returns an error if key material is missing, the tool is not
    /// installed, or the tool reports failure.
    fn encrypt_in_place(&self, path: &Path) -> Result<()>;

    /// Decrypts the file at `path` and returns the plaintext.
    ///
    /// # Errors
    ///
    /// Returns an error if key material is missing, the tool is not
    /// installed, or the tool reports failure.
    fn decrypt(&self, path: &Path) -> Result<Vec<u8>>;
}

/// Production backend shelling out to `sops` with Age key material.
#[derive(Debug, Clone)]
pub struct SopsAgeBackend {
    key_file: PathBuf,
    rules_file: PathBuf,
    timeout: Duration,
}

/// Result of checking the encryption setup, for the CLI `validate` verb.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetupStatus {
    /// Whether the private-key file exists.
    pub key_file_present: bool,
    /// Whether the creation-rule configuration exists.
    pub rules_file_present: bool,
}

impl SetupStatus {
    /// True when both the key material and the creation rules are in place.
    #[must_use]
    pub const fn is_ready(&self) -> bool {
        self.key_file_present && self.rules_file_present
    }
}

/// Serialized shape of the creation-rule configuration consumed by the
/// encryption tool.
#[derive(Serialize)]
struct CreationRules {
    creation_rules: Vec<CreationRule>,
}

#[derive(Serialize)]
struct CreationRule {
    path_regex: String,
    age: String,
}

impl SopsAgeBackend {
    /// Creates a backend from the engine configuration.
    #[must_use]
    pub fn new(config: &Config) -> Self {
        Self {
            key_file: config.age_key_file.clone(),
            rules_file: config.sops_rules_file.clone(),
            timeout: config.subprocess_timeout(),
        }
    }

    /// Generates the Age key pair if it does not already exist and returns
    /// the public key.
    ///
    /// An existing key file is never regenerated: every encrypted envelope
    /// is addressed to it, and minting a new pair would orphan them all.
    ///
    /// # Errors
    ///
    /// Returns an error if `age-keygen` is missing or fails, or the key
    /// file cannot be written.
    pub fn initialize_key_material(&self) -> Result<String> {
        if self.key_file.exists() {
            info!(path = %self.key_file.display(), "age key already exists, reusing");
            return self.public_key();
        }

        if let Some(parent) = self.key_file.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::io(format!("failed to create key directory '{}'", parent.display()), e)
            })?;
        }

        let mut cmd = Command::new(AGE_KEYGEN_BIN);
        let rendered = process::display_command(&cmd);
        let output = process::run(&mut cmd, self.timeout).map_err(|e| {
            self.map_process_error(e, AGE_KEYGEN_BIN, AGE_INSTALL_HINT, &rendered)
        })?;

        if !output.success {
            return Err(Error::EncryptionFailed {
                command: rendered,
                stderr: output.stderr_text(),
            });
        }

        let key_text = output.stdout_text();
        write_private(&self.key_file, &key_text)?;
        info!(path = %self.key_file.display(), "age key generated");

        parse_public_key(&key_text).ok_or_else(|| Error::EncryptionFailed {
            command: rendered,
            stderr: "key generator output did not contain a public key line".to_string(),
        })
    }

    /// Extracts the public key from the existing private-key file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::KeyMaterialMissing`] if the key file does not
    /// exist, or a serialization error if no public-key line is present.
    pub fn public_key(&self) -> Result<String> {
        let content = std::fs::read_to_string(&self.key_file).map_err(|_| {
            Error::KeyMaterialMissing {
                path: self.key_file.clone(),
            }
        })?;
        parse_public_key(&content).ok_or_else(|| Error::Serialization {
            reason: format!(
                "no '{PUBLIC_KEY_PREFIX}' line in key file '{}'",
                self.key_file.display()
            ),
        })
    }

    /// Writes the creation-rule configuration mapping encrypted-file
    /// suffixes to the recipient public key.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be serialized or written.
    pub fn configure(&self, public_key: &str) -> Result<()> {
        let rules = CreationRules {
            creation_rules: vec![
                CreationRule {
                    path_regex: r".*\.enc\.yaml$".to_string(),
                    age: public_key.to_string(),
                },
                CreationRule {
                    path_regex: r".*\.enc\.json$".to_string(),
                    age: public_key.to_string(),
                },
            ],
        };

        let rendered = serde_yaml::to_string(&rules).map_err(|e| Error::Serialization {
            reason: format!("failed to serialize creation rules: {e}"),
        })?;
        std::fs::write(&self.rules_file, rendered).map_err(|e| {
            Error::io(
                format!("failed to write creation rules '{}'", self.rules_file.display()),
                e,
            )
        })?;
        info!(path = %self.rules_file.display(), "creation rules written");
        Ok(())
    }

    /// Reports whether the key material and creation rules are in place.
    #[must_use]
    pub fn validate_setup(&self) -> SetupStatus {
        SetupStatus {
            key_file_present: self.key_file.exists(),
            rules_file_present: self.rules_file.exists(),
        }
    }

    /// Removes the key material and creation rules.
    ///
    /// Destroys access to every existing envelope; callers are expected to
    /// confirm before invoking.
    ///
    /// # Errors
    ///
    /// Returns an error if a file exists but cannot be removed.
    pub fn cleanup(&self) -> Result<()> {
        for path in [&self.key_file, &self.rules_file] {
            if path.exists() {
                std::fs::remove_file(path).map_err(|e| {
                    Error::io(format!("failed to remove '{}'", path.display()), e)
                })?;
                info!(path = %path.display(), "removed");
            }
        }
        Ok(())
    }

    fn ensure_key_material(&self) -> Result<()> {
        if self.key_file.exists() {
            Ok(())
        } else {
            Err(Error::KeyMaterialMissing {
                path: self.key_file.clone(),
            })
        }
    }

    fn map_process_error(
        &self,
        error: ProcessError,
        tool: &str,
        hint: &str,
        command: &str,
    ) -> Error {
        match error {
            ProcessError::Missing(_) => Error::EncryptionToolMissing {
                tool: tool.to_string(),
                hint: hint.to_string(),
            },
            ProcessError::Io(e) => Error::io(format!("failed to run '{command}'"), e),
            ProcessError::TimedOut => Error::CommandTimeout {
                command: command.to_string(),
                timeout_secs: self.timeout.as_secs(),
            },
        }
    }
}

impl EncryptionBackend for SopsAgeBackend {
    fn encrypt_in_place(&self, path: &Path) -> Result<()> {
        self.ensure_key_material()?;

        let mut cmd = Command::new(SOPS_BIN);
        cmd.args(["--encrypt", "--in-place"])
            .arg(path)
            .env(AGE_KEY_ENV, &self.key_file);
        let rendered = process::display_command(&cmd);
        debug!(command = %rendered, "encrypting");

        let output = process::run(&mut cmd, self.timeout)
            .map_err(|e| self.map_process_error(e, SOPS_BIN, SOPS_INSTALL_HINT, &rendered))?;

        if output.success {
            Ok(())
        } else {
            Err(Error::EncryptionFailed {
                command: rendered,
                stderr: output.stderr_text(),
            })
        }
    }

    fn decrypt(&self, path: &Path) -> Result<Vec<u8>> {
        self.ensure_key_material()?;

        let mut cmd = Command::new(SOPS_BIN);
        cmd.arg("--decrypt")
            .arg(path)
            .env(AGE_KEY_ENV, &self.key_file);
        let rendered = process::display_command(&cmd);
        debug!(command = %rendered, "decrypting");

        let output = process::run(&mut cmd, self.timeout)
            .map_err(|e| self.map_process_error(e, SOPS_BIN, SOPS_INSTALL_HINT, &rendered))?;

        if output.success {
            Ok(output.stdout)
        } else {
            Err(Error::DecryptionFailed {
                command: rendered,
                stderr: output.stderr_text(),
            })
        }
    }
}

/// Parses the public key out of `age-keygen` output or a saved key file.
fn parse_public_key(content: &str) -> Option<String> {
    content.lines().find_map(|line| {
        line.strip_prefix(PUBLIC_KEY_PREFIX)
            .map(|rest| rest.trim().to_string())
    })
}

/// Writes `content` to `path` with owner-only permissions.
fn write_private(path: &Path, content: &str) -> Result<()> {
    #[cfg(unix)]
    {
        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;

        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .map_err(|e| Error::io(format!("failed to create '{}'", path.display()), e))?;
        file.write_all(content.as_bytes())
            .map_err(|e| Error::io(format!("failed to write '{}'", path.display()), e))?;
    }

    #[cfg(not(unix))]
    {
        std::fs::write(path, content)
            .map_err(|e| Error::io(format!("failed to write '{}'", path.display()), e))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_KEY_FILE: &str = "\
# created: 2026-01-15T09:30:00Z
# public key: age1qlfnyxtvk9jdxk0h2mpl9ttjc0wf6yh8cgxyz4gr3wqv5d4cdqds7un2hx
AGE-SECRET-KEY-1SAMPLESAMPLESAMPLESAMPLESAMPLESAMPLESAMPLESAMPLESAMPLE
";

    fn backend_in(dir: &Path) -> SopsAgeBackend {
        let config = Config::new(dir);
        SopsAgeBackend::new(&config)
    }

    #[test]
    fn parse_public_key_finds_marker_line() {
        let key = parse_public_key(SAMPLE_KEY_FILE).expect("public key");
        assert!(key.starts_with("age1"));
        assert!(!key.contains(' '));
    }

    #[test]
    fn parse_public_key_missing_marker() {
        assert!(parse_public_key("AGE-SECRET-KEY-1XYZ\n").is_none());
    }

    #[test]
    fn public_key_without_key_file_is_key_material_missing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let backend = backend_in(dir.path());
        let err = backend.public_key().expect_err("should fail");
        assert!(matches!(err, Error::KeyMaterialMissing { .. }));
    }

    #[test]
    fn encrypt_without_key_material_fails_fast() {
        let dir = tempfile::tempdir().expect("tempdir");
        let backend = backend_in(dir.path());
        let err = backend
            .encrypt_in_place(Path::new("/tmp/whatever.enc.yaml"))
            .expect_err("should fail");
        assert!(matches!(err, Error::KeyMaterialMissing { .. }));
    }

    #[test]
    fn configure_writes_creation_rules_for_both_suffixes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let backend = backend_in(dir.path());
        backend.configure("age1testkey").expect("configure");

        let rendered =
            std::fs::read_to_string(dir.path().join(".sops.yaml")).expect("read rules");
        assert!(rendered.contains(r".*\.enc\.yaml$"));
        assert!(rendered.contains(r".*\.enc\.json$"));
        assert!(rendered.contains("age1testkey"));
    }

    #[test]
    fn validate_setup_reports_missing_pieces() {
        let dir = tempfile::tempdir().expect("tempdir");
        let backend = backend_in(dir.path());

        let status = backend.validate_setup();
        assert!(!status.key_file_present);
        assert!(!status.rules_file_present);
        assert!(!status.is_ready());

        backend.configure("age1testkey").expect("configure");
        let status = backend.validate_setup();
        assert!(status.rules_file_present);
        assert!(!status.is_ready());
    }

    #[test]
    fn initialize_reuses_existing_key_material() {
        let dir = tempfile::tempdir().expect("tempdir");
        let backend = backend_in(dir.path());

        let key_path = dir.path().join("age").join("keys.txt");
        std::fs::create_dir_all(key_path.parent().expect("parent")).expect("mkdir");
        std::fs::write(&key_path, SAMPLE_KEY_FILE).expect("write key");

        let key = backend.initialize_key_material().expect("initialize");
        assert!(key.starts_with("age1"));
        // File untouched.
        let content = std::fs::read_to_string(&key_path).expect("read");
        assert_eq!(content, SAMPLE_KEY_FILE);
    }

    #[test]
    #[cfg(unix)]
    fn write_private_sets_owner_only_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("keys.txt");
        write_private(&path, SAMPLE_KEY_FILE).expect("write");

        let mode = std::fs::metadata(&path)
            .expect("metadata")
            .permissions()
            .mode()
            & 0o777;
        assert_eq!(mode, 0o600);
    }

    #[test]
    fn cleanup_removes_key_material_and_rules() {
        let dir = tempfile::tempdir().expect("tempdir");
        let backend = backend_in(dir.path());

        let key_path = dir.path().join("age").join("keys.txt");
        std::fs::create_dir_all(key_path.parent().expect("parent")).expect("mkdir");
        std::fs::write(&key_path, SAMPLE_KEY_FILE).expect("write key");
        backend.configure("age1testkey").expect("configure");

        backend.cleanup().expect("cleanup");
        assert!(!key_path.exists());
        assert!(!dir.path().join(".sops.yaml").exists());
    }
}
