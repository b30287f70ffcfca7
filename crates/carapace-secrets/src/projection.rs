//! Chart-values projections.
//!
//! Each service's deployment chart expects credentials in its own nested
//! shape (`postgresql.auth.password`, not `postgresql_password`). A
//! projection maps a flat [`CredentialSet`] into that shape and back.
//! Projections are lossless: every schema key has exactly one canonical
//! path, so an envelope read back from disk reconstructs the full set.
//! Chart-specific duplicates are write-only aliases.

use serde_yaml::{Mapping, Value};

use crate::types::CredentialSet;

/// A projection with explicit per-key paths.
#[derive(Debug)]
pub struct MappedProjection {
    /// `(flat key, canonical dotted path)` pairs; reversible.
    entries: &'static [(&'static str, &'static str)],
    /// Additional write-only paths duplicated from a flat key.
    aliases: &'static [(&'static str, &'static str)],
    /// Fixed chart fields that ride along with the credentials.
    constants: &'static [(&'static str, &'static str)],
}

/// How a service's credentials map into its chart-values document.
#[derive(Debug, Clone, Copy)]
pub enum ValuesProjection {
    /// Explicit nested mapping declared in the registry.
    Mapped(&'static MappedProjection),
    /// Every key verbatim under a top-level `secrets` section.
    Flat,
}

static AUTHENTIK_PROJECTION: MappedProjection = MappedProjection {
    entries: &[
        ("secret_key", "authentik.secretKey"),
        ("bootstrap_password", "authentik.bootstrap.password"),
        ("bootstrap_token", "authentik.bootstrap.token"),
        ("postgresql_password", "postgresql.auth.password"),
        ("redis_password", "redis.auth.password"),
    ],
    aliases: &[],
    constants: &[
        ("postgresql.auth.username", "authentik"),
        ("postgresql.auth.database", "authentik"),
    ],
};

static SAMBA4_PROJECTION: MappedProjection = MappedProjection {
    entries: &[
        ("admin_password", "secrets.adminPassword"),
        ("domain_admin_password", "secrets.domainAdminPassword"),
        ("service_account_password", "secrets.servicePassword"),
        ("machine_account_password", "secrets.machinePassword"),
        ("krb5_password", "secrets.krb5Password"),
        ("dns_key", "secrets.dnsKey"),
    ],
    // The chart reads the domain admin password from its own section too.
    aliases: &[("admin_password", "domain.adminPassword")],
    constants: &[],
};

/// Looks up the projection for a service. Services without a dedicated
/// chart shape use the flat projection.
#[must_use]
pub fn projection_for(service: &str) -> ValuesProjection {
    match service {
        "authentik" => ValuesProjection::Mapped(&AUTHENTIK_PROJECTION),
        "samba4" => ValuesProjection::Mapped(&SAMBA4_PROJECTION),
        _ => ValuesProjection::Flat,
    }
}

impl ValuesProjection {
    /// Renders a credential set into the chart-values document.
    #[must_use]
    pub fn project(&self, set: &CredentialSet) -> Value {
        let mut root = Mapping::new();
        match self {
            Self::Mapped(projection) => {
                for (key, path) in projection.entries {
                    if let Some(value) = set.value(key) {
                        insert_path(&mut root, path, Value::String(value.to_string()));
                    }
                }
                for (key, path) in projection.aliases {
                    if let Some(value) = set.value(key) {
                        insert_path(&mut root, path, Value::String(value.to_string()));
                    }
                }
                for (path, value) in projection.constants {
                    insert_path(&mut root, path, Value::String((*value).to_string()));
                }
            }
            Self::Flat => {
                let mut secrets = Mapping::new();
                for (key, value) in set.iter() {
                    secrets.insert(
                        Value::String(key.to_string()),
                        Value::String(value.expose().to_string()),
                    );
                }
                root.insert(
                    Value::String("secrets".to_string()),
                    Value::Mapping(secrets),
                );
            }
        }
        Value::Mapping(root)
    }

    /// Reconstructs the flat credential set from a chart-values document.
    ///
    /// Keys whose canonical path is absent or empty are simply omitted;
    /// callers treat them as never-generated.
    #[must_use]
    pub fn reverse(&self, doc: &Value) -> CredentialSet {
        let mut set = CredentialSet::new();
        match self {
            Self::Mapped(projection) => {
                for (key, path) in projection.entries {
                    if let Some(Value::String(value)) = lookup_path(doc, path) {
                        if !value.is_empty() {
                            set.insert(*key, value.as_str());
                        }
                    }
                }
            }
            Self::Flat => {
                if let Some(Value::Mapping(secrets)) = doc.get("secrets") {
                    for (key, value) in secrets {
                        if let (Value::String(key), Value::String(value)) = (key, value) {
                            if !value.is_empty() {
                                set.insert(key.as_str(), value.as_str());
                            }
                        }
                    }
                }
            }
        }
        set
    }
}

/// Inserts `value` at a dotted path, creating intermediate mappings.
fn insert_path(root: &mut Mapping, path: &str, value: Value) {
    match path.split_once('.') {
        None => {
            root.insert(Value::String(path.to_string()), value);
        }
        Some((head, rest)) => {
            let key = Value::String(head.to_string());
            if !matches!(root.get(&key), Some(Value::Mapping(_))) {
                root.insert(key.clone(), Value::Mapping(Mapping::new()));
            }
            if let Some(Value::Mapping(child)) = root.get_mut(&key) {
                insert_path(child, rest, value);
            }
        }
    }
}

/// Resolves a dotted path in a document.
fn lookup_path<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = doc;
    for segment in path.split('.') {
        current = current.get(segment)?;
    }
    Some(current)
}
