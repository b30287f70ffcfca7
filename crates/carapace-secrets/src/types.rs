//! Core types for credential handling.
//!
//! - [`CredentialValue`]: a single secret string that zeroizes on drop
//! - [`CredentialSet`]: the full set of generated values for one service

use std::collections::BTreeMap;
use std::fmt;

use zeroize::{Zeroize, ZeroizeOnDrop};

/// A single secret value.
///
/// The backing memory is securely cleared when the value is dropped, debug
/// output is redacted, and equality is constant-time.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct CredentialValue(String);

impl CredentialValue {
    /// Creates a new credential value.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the secret string.
    ///
    /// Named `expose` so call sites that leak the plaintext into documents
    /// are easy to audit.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Returns the value length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the value is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Constant-time comparison against a plaintext string.
    #[must_use]
    pub fn ct_matches(&self, other: &str) -> bool {
        use subtle::ConstantTimeEq;
        self.0.as_bytes().ct_eq(other.as_bytes()).into()
    }

    /// Consumes the value and returns the inner string.
    #[must_use]
    pub fn into_string(self) -> String {
        // ManuallyDrop prevents the zeroize-on-drop from clearing the
        // buffer the caller now owns.
        let mut this = std::mem::ManuallyDrop::new(self);
        std::mem::take(&mut this.0)
    }
}

impl fmt::Debug for CredentialValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CredentialValue").field(&"[REDACTED]").finish()
    }
}

impl PartialEq for CredentialValue {
    fn eq(&self, other: &Self) -> bool {
        self.ct_matches(&other.0)
    }
}

impl Eq for CredentialValue {}

impl From<String> for CredentialValue {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for CredentialValue {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// The full set of generated secret values for one service.
///
/// Keys are ordered so every serialized representation of the set is
/// deterministic.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct CredentialSet {
    values: BTreeMap<String, CredentialValue>,
}

impl CredentialSet {
    /// Creates an empty credential set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<CredentialValue>) {
        self.values.insert(key.into(), value.into());
    }

    /// Returns the value for a key, if present.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&CredentialValue> {
        self.values.get(key)
    }

    /// Returns the plaintext value for a key, if present.
    #[must_use]
    pub fn value(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(CredentialValue::expose)
    }

    /// Returns true if the set contains a key.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Number of credentials in the set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if the set holds no credentials.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterates over keys in deterministic order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// Iterates over `(key, value)` pairs in deterministic order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &CredentialValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl fmt::Debug for CredentialSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Keys are not sensitive; values always are.
        f.debug_struct("CredentialSet")
            .field("keys", &self.keys().collect::<Vec<_>>())
            .field("values", &"[REDACTED]")
            .finish()
    }
}
