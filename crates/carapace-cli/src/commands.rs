//! Subcommand implementations over the core engine.

use carapace_secrets::{
    Config, ConsistencyReconciler, KubectlClient, ReconcileOutcome, RotationController,
    SecretStore, SopsAgeBackend, ValidationOutcome, schema,
};
use tracing::info;

use crate::cli::{Cli, Commands};
use crate::error::CliError;

/// Resolves configuration and dispatches the parsed command.
///
/// # Errors
///
/// Returns an error if the command fails; `main` maps it to a non-zero
/// exit status.
pub fn run(cli: Cli) -> Result<(), CliError> {
    let config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::new(&cli.root),
    };

    match cli.command {
        Commands::Init => init(&config),
        Commands::Generate { ref service } => generate(&config, service),
        Commands::Rotate { ref service } => rotate(&config, service),
        Commands::RotateAll => rotate_all(&config),
        Commands::Validate { ref service } => match service {
            Some(service) => validate_service(&config, service),
            None => validate_setup(&config),
        },
        Commands::Reconcile { ref service } => reconcile(&config, service),
        Commands::List => list(&config),
        Commands::Cleanup { force } => cleanup(&config, force),
    }
}

fn store_for(config: &Config) -> SecretStore<SopsAgeBackend> {
    let backend = SopsAgeBackend::new(config);
    SecretStore::new(config.clone(), backend)
}

fn init(config: &Config) -> Result<(), CliError> {
    let backend = SopsAgeBackend::new(config);
    let public_key = backend.initialize_key_material()?;
    backend.configure(&public_key)?;
    println!("encryption initialized");
    println!("public key: {public_key}");
    Ok(())
}

fn generate(config: &Config, service: &str) -> Result<(), CliError> {
    let store = store_for(config);
    let existing = store.read_existing(service);
    if existing.is_some() {
        info!(service, "existing credentials found, reusing values");
    }

    let set = store.generate(service, existing.as_ref())?;
    let namespace = schema::namespace_for(service);
    let manifest = store.persist_manifest(service, namespace, &set)?;
    let envelope = store.persist_encrypted(service, &set)?;

    println!("generated {} credentials for {service}", set.len());
    println!("  manifest: {}", manifest.display());
    println!("  envelope: {}", envelope.display());
    Ok(())
}

fn rotate(config: &Config, service: &str) -> Result<(), CliError> {
    let store = store_for(config);
    let controller = RotationController::new(&store);
    let outcome = controller.rotate(service)?;

    println!("rotated {service}");
    for path in &outcome.written {
        println!("  {}", path.display());
    }
    println!("note: rotated secrets are inert until workloads are redeployed");
    Ok(())
}

fn rotate_all(config: &Config) -> Result<(), CliError> {
    let store = store_for(config);
    let controller = RotationController::new(&store);
    let summary = controller.rotate_all();

    for (service, result) in summary.results() {
        match result {
            Ok(outcome) => {
                println!("{service}: rotated");
                for path in &outcome.written {
                    println!("  {}", path.display());
                }
            }
            Err(e) => println!("{service}: FAILED: {e}"),
        }
    }
    println!("note: rotated secrets are inert until workloads are redeployed");

    if summary.is_success() {
        Ok(())
    } else {
        Err(CliError::PartialRotation {
            failed: summary.len() - summary.rotated(),
            attempted: summary.len(),
        })
    }
}

fn validate_setup(config: &Config) -> Result<(), CliError> {
    let backend = SopsAgeBackend::new(config);
    let status = backend.validate_setup();

    println!(
        "age key file: {}",
        if status.key_file_present { "present" } else { "missing" }
    );
    println!(
        "creation rules: {}",
        if status.rules_file_present { "present" } else { "missing" }
    );

    if status.is_ready() {
        println!("encryption setup is ready");
        Ok(())
    } else {
        let mut missing = Vec::new();
        if !status.key_file_present {
            missing.push("age key file");
        }
        if !status.rules_file_present {
            missing.push("creation rules");
        }
        Err(CliError::SetupIncomplete {
            missing: missing.join(", "),
        })
    }
}

fn validate_service(config: &Config, service: &str) -> Result<(), CliError> {
    let store = store_for(config);
    let cluster = KubectlClient::new(config);
    let reconciler = ConsistencyReconciler::new(&store, &cluster);

    match reconciler.validate(service)? {
        ValidationOutcome::NotImplemented => {
            println!("no drift checks registered for {service}");
            Ok(())
        }
        ValidationOutcome::Report(report) => {
            for check in &report.checks {
                let status = if check.consistent {
                    "consistent"
                } else if check.live_present {
                    "MISMATCH"
                } else {
                    "MISSING LIVE VALUE"
                };
                println!("{}: {status} ({})", check.key, check.secret);
            }
            if report.is_consistent() {
                println!("all checked credentials are consistent");
                Ok(())
            } else {
                Err(CliError::DriftDetected {
                    service: service.to_string(),
                })
            }
        }
    }
}

fn reconcile(config: &Config, service: &str) -> Result<(), CliError> {
    let store = store_for(config);
    let cluster = KubectlClient::new(config);
    let reconciler = ConsistencyReconciler::new(&store, &cluster);

    match reconciler.reconcile(service)? {
        ReconcileOutcome::NotImplemented => {
            println!("no drift checks registered for {service}");
        }
        ReconcileOutcome::Reconciled(report) => {
            if report.repaired.is_empty() {
                println!("{service}: no drift, nothing repaired");
            } else {
                for key in &report.repaired {
                    println!("repaired {key}");
                }
                for workload in &report.restarted {
                    println!("restarted {workload}");
                }
            }
        }
    }
    Ok(())
}

fn list(config: &Config) -> Result<(), CliError> {
    let store = store_for(config);
    let artifacts = store.list_artifacts();
    if artifacts.is_empty() {
        println!("no secret artifacts");
    } else {
        for path in artifacts {
            println!("{}", path.display());
        }
    }
    Ok(())
}

fn cleanup(config: &Config, force: bool) -> Result<(), CliError> {
    if !force {
        return Err(CliError::CleanupNotConfirmed);
    }
    let backend = SopsAgeBackend::new(config);
    let store = SecretStore::new(config.clone(), backend.clone());

    store.remove_artifacts()?;
    backend.cleanup()?;
    println!("local secrets, key material, and creation rules removed");
    Ok(())
}
