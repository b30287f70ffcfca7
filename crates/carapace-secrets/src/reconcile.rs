//! Drift detection and repair.
//!
//! Some deployment charts mint their own credentials on first install
//! instead of accepting injected ones, so the password a dependent
//! component actually runs with can drift from the one the encrypted
//! envelope believes is in use. The reconciler compares the two and, on
//! request, repairs the live side. Repair is always toward the source of
//! truth: the envelope wins, live state is overwritten, never the reverse.

use std::collections::BTreeSet;

use tracing::{info, warn};

use crate::cluster::{ClusterClient, WorkloadKind, WorkloadRef};
use crate::encryption::EncryptionBackend;
use crate::error::Result;
use crate::schema;
use crate::store::SecretStore;
use crate::types::CredentialSet;

/// One cross-checked credential: where its live copy lives and who
/// consumes it.
#[derive(Debug, Clone, Copy)]
pub struct DriftCheck {
    /// Flat credential key in the source-of-truth set.
    pub key: &'static str,
    /// Name of the dependent component's live secret.
    pub secret: &'static str,
    /// Field of the live secret holding the credential.
    pub field: &'static str,
    /// Workloads that must be restarted after a repair.
    pub consumers: &'static [(WorkloadKind, &'static str)],
}

static AUTHENTIK_CHECKS: &[DriftCheck] = &[
    DriftCheck {
        key: "postgresql_password",
        secret: "authentik-postgresql",
        field: "password",
        consumers: &[(WorkloadKind::StatefulSet, "authentik-postgresql")],
    },
    DriftCheck {
        key: "redis_password",
        secret: "authentik-redis",
        field: "redis-password",
        consumers: &[(WorkloadKind::StatefulSet, "authentik-redis")],
    },
];

/// Drift checks registered for a service. Services without an entry have
/// no reconciliation support and report that explicitly rather than a
/// false "consistent".
#[must_use]
pub fn drift_checks_for(service: &str) -> &'static [DriftCheck] {
    match service {
        "authentik" => AUTHENTIK_CHECKS,
        _ => &[],
    }
}

/// Comparison result for one checked credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckResult {
    /// The checked credential key.
    pub key: String,
    /// The live secret that was read.
    pub secret: String,
    /// Whether a live value was found at all.
    pub live_present: bool,
    /// Whether live and source-of-truth values match exactly.
    pub consistent: bool,
}

/// Validation result for one service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationReport {
    /// The validated service.
    pub service: String,
    /// Per-credential comparison results.
    pub checks: Vec<CheckResult>,
}

impl ValidationReport {
    /// True when every checked credential matches.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.checks.iter().all(|c| c.consistent)
    }

    /// Keys whose live value drifted from the source of truth.
    pub fn drifted_keys(&self) -> impl Iterator<Item = &str> {
        self.checks
            .iter()
            .filter(|c| !c.consistent)
            .map(|c| c.key.as_str())
    }
}

/// Outcome of `validate`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationOutcome {
    /// No drift checks are registered for this service.
    NotImplemented,
    /// The service was checked.
    Report(ValidationReport),
}

/// Outcome of `reconcile`.
#[derive(Debug)]
pub enum ReconcileOutcome {
    /// No drift checks are registered for this service.
    NotImplemented,
    /// The service was checked and, where needed, repaired.
    Reconciled(ReconcileReport),
}

/// What a reconciliation pass did.
#[derive(Debug)]
pub struct ReconcileReport {
    /// The reconciled service.
    pub service: String,
    /// Keys whose live secret was patched back to the source of truth.
    pub repaired: Vec<String>,
    /// Keys that were already consistent.
    pub consistent: Vec<String>,
    /// Workloads restarted, each exactly once.
    pub restarted: Vec<WorkloadRef>,
}

/// Compares source-of-truth credentials against live cluster state and
/// repairs drift.
pub struct ConsistencyReconciler<'a, B, C> {
    store: &'a SecretStore<B>,
    cluster: &'a C,
}

impl<'a, B: EncryptionBackend, C: ClusterClient> ConsistencyReconciler<'a, B, C> {
    /// Creates a reconciler over a store and a cluster client.
    pub const fn new(store: &'a SecretStore<B>, cluster: &'a C) -> Self {
        Self { store, cluster }
    }

    /// Compares every registered credential of a service against its live
    /// value.
    ///
    /// # Errors
    ///
    /// Returns an error if the source of truth cannot be read (a missing
    /// or undecryptable envelope is fatal here, unlike best-effort reuse)
    /// or the cluster cannot be queried.
    pub fn validate(&self, service: &str) -> Result<ValidationOutcome> {
        let checks = drift_checks_for(service);
        if checks.is_empty() {
            info!(service, "no drift checks registered");
            return Ok(ValidationOutcome::NotImplemented);
        }

        let source = self.store.read_required(service)?;
        let report = self.compare(service, checks, &source)?;
        Ok(ValidationOutcome::Report(report))
    }

    /// Repairs every drifted credential, then restarts the consumers of
    /// the repaired secrets, each exactly once.
    ///
    /// # Errors
    ///
    /// Returns an error if validation fails, a patch is rejected, or a
    /// restart cannot be requested.
    pub fn reconcile(&self, service: &str) -> Result<ReconcileOutcome> {
        let checks = drift_checks_for(service);
        if checks.is_empty() {
            info!(service, "no drift checks registered");
            return Ok(ReconcileOutcome::NotImplemented);
        }

        let namespace = schema::namespace_for(service);
        let source = self.store.read_required(service)?;
        let report = self.compare(service, checks, &source)?;

        let mut repaired = Vec::new();
        let mut consistent = Vec::new();
        let mut to_restart = BTreeSet::new();

        for (check, result) in checks.iter().zip(&report.checks) {
            if result.consistent {
                consistent.push(check.key.to_string());
                continue;
            }
            let Some(value) = source.value(check.key) else {
                // Nothing to repair toward; flagged by validate already.
                warn!(service, key = check.key, "source of truth has no value for drifted key");
                continue;
            };

            info!(
                service,
                key = check.key,
                secret = check.secret,
                "repairing live secret toward source of truth"
            );
            self.cluster.patch_secret_fields(
                namespace,
                check.secret,
                &[(check.field.to_string(), value.to_string())],
            )?;
            repaired.push(check.key.to_string());
            for (kind, name) in check.consumers {
                to_restart.insert(WorkloadRef::new(*kind, *name));
            }
        }

        let mut restarted = Vec::new();
        for workload in to_restart {
            self.cluster.rollout_restart(namespace, &workload)?;
            restarted.push(workload);
        }

        Ok(ReconcileOutcome::Reconciled(ReconcileReport {
            service: service.to_string(),
            repaired,
            consistent,
            restarted,
        }))
    }

    fn compare(
        &self,
        service: &str,
        checks: &[DriftCheck],
        source: &CredentialSet,
    ) -> Result<ValidationReport> {
        let namespace = schema::namespace_for(service);
        let mut results = Vec::with_capacity(checks.len());

        for check in checks {
            let live = self
                .cluster
                .read_secret_field(namespace, check.secret, check.field)?;
            let source_value = source.get(check.key);

            let consistent = match (source_value, &live) {
                // Exact, constant-time equality; no normalization.
                (Some(expected), Some(actual)) => expected.ct_matches(actual),
                _ => false,
            };
            if !consistent {
                warn!(
                    service,
                    key = check.key,
                    secret = check.secret,
                    live_present = live.is_some(),
                    "credential drift detected"
                );
            }

            results.push(CheckResult {
                key: check.key.to_string(),
                secret: check.secret.to_string(),
                live_present: live.is_some(),
                consistent,
            });
        }

        Ok(ValidationReport {
            service: service.to_string(),
            checks: results,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::error::Error;
    use crate::test_support::{MockBackend, MockCluster};

    fn seeded_store(dir: &std::path::Path) -> (SecretStore<MockBackend>, CredentialSet) {
        let store = SecretStore::new(Config::new(dir), MockBackend);
        let set = store.generate("authentik", None).expect("generate");
        store.persist_encrypted("authentik", &set).expect("persist");
        (store, set)
    }

    fn cluster_matching(set: &CredentialSet) -> MockCluster {
        MockCluster::default()
            .with_secret(
                "identity",
                "authentik-postgresql",
                "password",
                set.value("postgresql_password").expect("pg"),
            )
            .with_secret(
                "identity",
                "authentik-redis",
                "redis-password",
                set.value("redis_password").expect("redis"),
            )
    }

    #[test]
    fn unregistered_service_is_not_implemented() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (store, _) = seeded_store(dir.path());
        let cluster = MockCluster::default();
        let reconciler = ConsistencyReconciler::new(&store, &cluster);

        assert_eq!(
            reconciler.validate("samba4").expect("validate"),
            ValidationOutcome::NotImplemented
        );
        assert!(matches!(
            reconciler.reconcile("grafana").expect("reconcile"),
            ReconcileOutcome::NotImplemented
        ));
    }

    #[test]
    fn validate_reports_consistent_when_live_matches() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (store, set) = seeded_store(dir.path());
        let cluster = cluster_matching(&set);
        let reconciler = ConsistencyReconciler::new(&store, &cluster);

        let ValidationOutcome::Report(report) =
            reconciler.validate("authentik").expect("validate")
        else {
            panic!("expected a report");
        };
        assert!(report.is_consistent());
        assert_eq!(report.checks.len(), 2);
        assert!(report.checks.iter().all(|c| c.live_present));
    }

    #[test]
    fn validate_detects_drifted_key() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (store, set) = seeded_store(dir.path());
        let cluster = cluster_matching(&set).with_secret(
            "identity",
            "authentik-postgresql",
            "password",
            "chart-invented-this",
        );
        let reconciler = ConsistencyReconciler::new(&store, &cluster);

        let ValidationOutcome::Report(report) =
            reconciler.validate("authentik").expect("validate")
        else {
            panic!("expected a report");
        };
        assert!(!report.is_consistent());
        let drifted: Vec<&str> = report.drifted_keys().collect();
        assert_eq!(drifted, vec!["postgresql_password"]);
    }

    #[test]
    fn validate_treats_missing_live_secret_as_inconsistent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (store, _) = seeded_store(dir.path());
        let cluster = MockCluster::default();
        let reconciler = ConsistencyReconciler::new(&store, &cluster);

        let ValidationOutcome::Report(report) =
            reconciler.validate("authentik").expect("validate")
        else {
            panic!("expected a report");
        };
        assert!(!report.is_consistent());
        assert!(report.checks.iter().all(|c| !c.live_present));
    }

    #[test]
    fn validate_without_envelope_is_fatal() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = SecretStore::new(Config::new(dir.path()), MockBackend);
        let cluster = MockCluster::default();
        let reconciler = ConsistencyReconciler::new(&store, &cluster);

        let err = reconciler.validate("authentik").expect_err("must fail");
        assert!(matches!(err, Error::EnvelopeMissing { .. }));
    }

    #[test]
    fn reconcile_repairs_live_toward_source_of_truth() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (store, set) = seeded_store(dir.path());
        let cluster = cluster_matching(&set).with_secret(
            "identity",
            "authentik-postgresql",
            "password",
            "chart-invented-this",
        );
        let reconciler = ConsistencyReconciler::new(&store, &cluster);

        let envelope_before =
            std::fs::read(store.envelope_path("authentik")).expect("read envelope");

        let ReconcileOutcome::Reconciled(report) =
            reconciler.reconcile("authentik").expect("reconcile")
        else {
            panic!("expected reconciliation");
        };

        assert_eq!(report.repaired, vec!["postgresql_password".to_string()]);
        assert_eq!(report.consistent, vec!["redis_password".to_string()]);

        // Live state now carries the source-of-truth value...
        assert_eq!(
            cluster
                .live_value("identity", "authentik-postgresql", "password")
                .as_deref(),
            set.value("postgresql_password")
        );
        // ...and the source of truth was never rewritten.
        let envelope_after =
            std::fs::read(store.envelope_path("authentik")).expect("read envelope");
        assert_eq!(envelope_before, envelope_after);

        // Exactly one restart for the affected workload, none for redis.
        assert_eq!(
            cluster.restarts.borrow().as_slice(),
            ["identity/statefulset/authentik-postgresql"]
        );
        assert_eq!(report.restarted.len(), 1);
    }

    #[test]
    fn reconcile_with_consistent_state_is_a_no_op() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (store, set) = seeded_store(dir.path());
        let cluster = cluster_matching(&set);
        let reconciler = ConsistencyReconciler::new(&store, &cluster);

        let ReconcileOutcome::Reconciled(report) =
            reconciler.reconcile("authentik").expect("reconcile")
        else {
            panic!("expected reconciliation");
        };

        assert!(report.repaired.is_empty());
        assert_eq!(report.consistent.len(), 2);
        assert!(cluster.patches.borrow().is_empty());
        assert!(cluster.restarts.borrow().is_empty());
    }

    #[test]
    fn reconcile_repairs_every_drifted_key() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (store, set) = seeded_store(dir.path());
        let cluster = cluster_matching(&set)
            .with_secret("identity", "authentik-postgresql", "password", "wrong-a")
            .with_secret("identity", "authentik-redis", "redis-password", "wrong-b");
        let reconciler = ConsistencyReconciler::new(&store, &cluster);

        let ReconcileOutcome::Reconciled(report) =
            reconciler.reconcile("authentik").expect("reconcile")
        else {
            panic!("expected reconciliation");
        };

        assert_eq!(report.repaired.len(), 2);
        assert_eq!(cluster.restarts.borrow().len(), 2);
        assert_eq!(
            cluster
                .live_value("identity", "authentik-redis", "redis-password")
                .as_deref(),
            set.value("redis_password")
        );
    }
}
