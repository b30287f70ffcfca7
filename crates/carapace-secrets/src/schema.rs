//! Per-service credential schemas.
//!
//! Each known service declares which credential keys exist and how each is
//! generated. Schemas form a static registry; adding a service means adding
//! a table entry, not editing conditional chains. Unknown services fall
//! back to a generic two-field schema.

use serde::{Deserialize, Serialize};

/// How a credential value is generated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CredentialKind {
    /// A human-typeable password.
    Password,
    /// A long random token (API keys, signing keys, bootstrap tokens).
    HighEntropyToken,
    /// Opaque random material with no composition guarantees.
    OpaqueBlob,
}

/// Which alphabet a credential draws from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CharsetPolicy {
    /// Letters, digits, and punctuation symbols.
    AlnumSymbols,
    /// Letters and digits only, for consumers that reject punctuation.
    AlnumOnly,
}

/// Declares one secret field of a service.
///
/// Specs are immutable and defined at schema-authoring time; `max_length`
/// is a hard upper bound enforced by downstream consumers of the value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CredentialSpec {
    /// Identifier of the field, e.g. `postgresql_password`.
    pub key: &'static str,
    /// Generation strategy.
    pub kind: CredentialKind,
    /// Requested length.
    pub length: usize,
    /// Hard upper bound on the generated value's length.
    pub max_length: usize,
    /// Alphabet policy.
    pub charset: CharsetPolicy,
}

impl CredentialSpec {
    /// A password spec: symbols allowed, requested length == max length.
    #[must_use]
    pub const fn password(key: &'static str, length: usize) -> Self {
        Self {
            key,
            kind: CredentialKind::Password,
            length,
            max_length: length,
            charset: CharsetPolicy::AlnumSymbols,
        }
    }

    /// A high-entropy token spec: alphanumeric only.
    #[must_use]
    pub const fn token(key: &'static str, length: usize) -> Self {
        Self {
            key,
            kind: CredentialKind::HighEntropyToken,
            length,
            max_length: length,
            charset: CharsetPolicy::AlnumOnly,
        }
    }

    /// An opaque-blob spec: alphanumeric material, no composition rules.
    #[must_use]
    pub const fn blob(key: &'static str, length: usize) -> Self {
        Self {
            key,
            kind: CredentialKind::OpaqueBlob,
            length,
            max_length: length,
            charset: CharsetPolicy::AlnumOnly,
        }
    }
}

/// The credential schema and deployment defaults for one service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceSchema {
    /// Canonical service name.
    pub service: &'static str,
    /// Namespace the service's secrets are deployed into.
    pub namespace: &'static str,
    /// Ordered credential specs.
    pub specs: &'static [CredentialSpec],
}

const AUTHENTIK_SPECS: &[CredentialSpec] = &[
    CredentialSpec::token("secret_key", 50),
    CredentialSpec::password("bootstrap_password", 24),
    CredentialSpec::token("bootstrap_token", 50),
    CredentialSpec::password("postgresql_password", 32),
    CredentialSpec::password("redis_password", 32),
];

const SAMBA4_SPECS: &[CredentialSpec] = &[
    CredentialSpec::password("admin_password", 24),
    CredentialSpec::password("domain_admin_password", 24),
    CredentialSpec::password("service_account_password", 24),
    CredentialSpec::password("machine_account_password", 32),
    CredentialSpec::password("krb5_password", 32),
    CredentialSpec::token("dns_key", 32),
];

const CILIUM_SPECS: &[CredentialSpec] = &[
    CredentialSpec::blob("hubble_tls_key", 32),
    CredentialSpec::blob("cluster_mesh_key", 32),
    CredentialSpec::password("ca_key_passphrase", 24),
];

const DEFAULT_SPECS: &[CredentialSpec] = &[
    CredentialSpec::password("default_password", 24),
    CredentialSpec::token("api_key", 50),
];

/// Registry of every service with a dedicated schema.
static SCHEMAS: &[ServiceSchema] = &[
    ServiceSchema {
        service: "authentik",
        namespace: "identity",
        specs: AUTHENTIK_SPECS,
    },
    ServiceSchema {
        service: "samba4",
        namespace: "identity",
        specs: SAMBA4_SPECS,
    },
    ServiceSchema {
        service: "cilium",
        namespace: "kube-system",
        specs: CILIUM_SPECS,
    },
];

/// Fallback schema for services without a dedicated entry.
static DEFAULT_SCHEMA: ServiceSchema = ServiceSchema {
    service: "default",
    namespace: "default",
    specs: DEFAULT_SPECS,
};

/// Services covered by `rotate_all`, in rotation order.
pub const KNOWN_SERVICES: &[&str] = &["authentik", "samba4", "cilium"];

/// Looks up the schema for a service, falling back to the generic schema
/// for unknown names. Pure lookup; no failure modes.
#[must_use]
pub fn schema_for(service: &str) -> &'static ServiceSchema {
    SCHEMAS
        .iter()
        .find(|s| s.service == service)
        .unwrap_or(&DEFAULT_SCHEMA)
}

/// The ordered credential specs for a service.
#[must_use]
pub fn specs_for(service: &str) -> &'static [CredentialSpec] {
    schema_for(service).specs
}

/// The default namespace for a service's secrets.
#[must_use]
pub fn namespace_for(service: &str) -> &'static str {
    schema_for(service).namespace
}
