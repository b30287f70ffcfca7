//! Command-line argument parsing with clap.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Carapace - cluster credential lifecycle management.
#[derive(Parser, Debug, Clone)]
#[command(name = "carapace")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Project root; the secrets directory, key material, and creation
    /// rules live beneath it.
    #[arg(long, env = "CARAPACE_ROOT", default_value = ".")]
    pub root: PathBuf,

    /// Optional TOML configuration file overriding the derived layout.
    #[arg(long, env = "CARAPACE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Initialize encryption: generate the Age key pair and write the
    /// SOPS creation rules.
    Init,

    /// Generate credentials for a service, reusing existing values.
    Generate {
        /// Service to generate credentials for.
        service: String,
    },

    /// Rotate a service's credentials to fresh values.
    Rotate {
        /// Service to rotate.
        service: String,
    },

    /// Rotate every known service, reporting per-service results.
    RotateAll,

    /// Validate the encryption setup, or a service's live credentials
    /// against the encrypted source of truth.
    Validate {
        /// Service to cross-check; omit to check the encryption setup.
        service: Option<String>,
    },

    /// Repair a service's drifted live credentials toward the source of
    /// truth and restart the affected workloads.
    Reconcile {
        /// Service to reconcile.
        service: String,
    },

    /// List persisted secret artifacts.
    List,

    /// Remove key material, creation rules, and local secret artifacts.
    Cleanup {
        /// Actually delete; without this flag nothing is removed.
        #[arg(long)]
        force: bool,
    },
}
