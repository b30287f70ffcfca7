//! Engine configuration.
//!
//! Every component receives an explicit [`Config`]; nothing in this crate
//! reads ambient process state. The CLI (or any other caller) resolves the
//! configuration once and threads it through the constructors.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default subprocess timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Resolved configuration for the credential engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    /// Project root directory; relative defaults are derived from it.
    pub project_root: PathBuf,
    /// Directory holding per-service secret artifacts.
    pub secrets_dir: PathBuf,
    /// Path to the Age private-key file (mode 0600).
    pub age_key_file: PathBuf,
    /// Path to the SOPS creation-rule configuration.
    pub sops_rules_file: PathBuf,
    /// Timeout applied to every external subprocess call, in seconds.
    pub subprocess_timeout_secs: u64,
}

/// On-disk form of [`Config`]; unset paths fall back to defaults derived
/// from the project root.
#[derive(Debug, Deserialize)]
struct RawConfig {
    project_root: Option<PathBuf>,
    secrets_dir: Option<PathBuf>,
    age_key_file: Option<PathBuf>,
    sops_rules_file: Option<PathBuf>,
    subprocess_timeout_secs: Option<u64>,
}

impl Config {
    /// Creates a configuration rooted at `project_root` with the standard
    /// layout: `<root>/secrets`, `<root>/age/keys.txt`, `<root>/.sops.yaml`.
    #[must_use]
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        let project_root = project_root.into();
        Self {
            secrets_dir: project_root.join("secrets"),
            age_key_file: project_root.join("age").join("keys.txt"),
            sops_rules_file: project_root.join(".sops.yaml"),
            subprocess_timeout_secs: DEFAULT_TIMEOUT_SECS,
            project_root,
        }
    }

    /// Loads configuration from a TOML file.
    ///
    /// Absent fields are derived from the `project_root` field, which
    /// itself defaults to the directory containing the file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::io(format!("failed to read config file '{}'", path.display()), e))?;

        let raw: RawConfig = toml::from_str(&content).map_err(|e| Error::Config {
            reason: format!("failed to parse config file '{}': {e}", path.display()),
        })?;

        let root = raw
            .project_root
            .or_else(|| path.parent().map(Path::to_path_buf))
            .unwrap_or_else(|| PathBuf::from("."));

        let mut config = Self::new(root);
        if let Some(dir) = raw.secrets_dir {
            config.secrets_dir = dir;
        }
        if let Some(file) = raw.age_key_file {
            config.age_key_file = file;
        }
        if let Some(file) = raw.sops_rules_file {
            config.sops_rules_file = file;
        }
        if let Some(secs) = raw.subprocess_timeout_secs {
            config.subprocess_timeout_secs = secs;
        }
        Ok(config)
    }

    /// Subprocess timeout as a [`Duration`].
    #[must_use]
    pub const fn subprocess_timeout(&self) -> Duration {
        Duration::from_secs(self.subprocess_timeout_secs)
    }

    /// Directory holding a single service's secret artifacts.
    #[must_use]
    pub fn service_dir(&self, service: &str) -> PathBuf {
        self.secrets_dir.join(service)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_derives_standard_layout() {
        let config = Config::new("/opt/cluster");
        assert_eq!(config.secrets_dir, PathBuf::from("/opt/cluster/secrets"));
        assert_eq!(
            config.age_key_file,
            PathBuf::from("/opt/cluster/age/keys.txt")
        );
        assert_eq!(
            config.sops_rules_file,
            PathBuf::from("/opt/cluster/.sops.yaml")
        );
        assert_eq!(config.subprocess_timeout_secs, DEFAULT_TIMEOUT_SECS);
    }

    #[test]
    fn from_file_fills_defaults_from_root() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("carapace.toml");
        std::fs::write(&path, "subprocess_timeout_secs = 5\n").expect("write config");

        let config = Config::from_file(&path).expect("load config");
        assert_eq!(config.project_root, dir.path());
        assert_eq!(config.secrets_dir, dir.path().join("secrets"));
        assert_eq!(config.subprocess_timeout_secs, 5);
    }

    #[test]
    fn from_file_respects_explicit_paths() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("carapace.toml");
        std::fs::write(
            &path,
            "project_root = \"/srv/cluster\"\nage_key_file = \"/etc/age/keys.txt\"\n",
        )
        .expect("write config");

        let config = Config::from_file(&path).expect("load config");
        assert_eq!(config.project_root, PathBuf::from("/srv/cluster"));
        assert_eq!(config.age_key_file, PathBuf::from("/etc/age/keys.txt"));
        assert_eq!(config.secrets_dir, PathBuf::from("/srv/cluster/secrets"));
    }

    #[test]
    fn from_file_rejects_invalid_toml() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("carapace.toml");
        std::fs::write(&path, "not valid [[ toml").expect("write config");

        assert!(Config::from_file(&path).is_err());
    }

    #[test]
    fn service_dir_is_per_service() {
        let config = Config::new("/opt/cluster");
        assert_eq!(
            config.service_dir("authentik"),
            PathBuf::from("/opt/cluster/secrets/authentik")
        );
    }
}
