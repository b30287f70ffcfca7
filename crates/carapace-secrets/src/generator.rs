//! Cryptographically secure credential generation.
//!
//! Values are drawn from the operating system's CSPRNG. Passwords and
//! tokens guarantee at least one character from each required class, with
//! the remainder filled uniformly from the full alphabet and the whole
//! buffer shuffled so no fixed-position bias exists.

use rand::rngs::OsRng;
use rand::seq::SliceRandom;

use crate::error::{Error, Result};
use crate::schema::{CharsetPolicy, CredentialKind, CredentialSpec};

const LOWERCASE: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
const UPPERCASE: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const DIGITS: &[u8] = b"0123456789";
const SYMBOLS: &[u8] = b"!@#$%^&*()-_=+[]{}|;:,.<>?";
// The guaranteed symbol comes from the subset every downstream consumer
// accepts unquoted.
const GUARANTEED_SYMBOLS: &[u8] = b"!@#$%^&*";

/// Generates a value for the given spec.
///
/// The effective length is `min(spec.length, spec.max_length)`.
///
/// # Errors
///
/// Returns [`Error::Generation`] if the effective length is too short to
/// satisfy the spec's composition guarantees. An unavailable random source
/// is a fatal environment error surfaced by the OS RNG itself and is never
/// retried.
pub fn generate(spec: &CredentialSpec) -> Result<String> {
    let length = spec.length.min(spec.max_length);
    match spec.kind {
        CredentialKind::Password | CredentialKind::HighEntropyToken => {
            composed(length, spec.charset)
        }
        CredentialKind::OpaqueBlob => uniform(length, spec.charset),
    }
}

/// One guaranteed character per class, remainder uniform, then shuffled.
fn composed(length: usize, charset: CharsetPolicy) -> Result<String> {
    let mut chars = vec![
        pick(LOWERCASE)?,
        pick(UPPERCASE)?,
        pick(DIGITS)?,
    ];
    if charset == CharsetPolicy::AlnumSymbols {
        chars.push(pick(GUARANTEED_SYMBOLS)?);
    }

    if length < chars.len() {
        return Err(Error::Generation {
            reason: format!(
                "length {length} cannot satisfy {} guaranteed character classes",
                chars.len()
            ),
        });
    }

    let alphabet = full_alphabet(charset);
    while chars.len() < length {
        chars.push(pick(&alphabet)?);
    }

    // Shuffle so the guaranteed characters do not sit at fixed positions.
    chars.shuffle(&mut OsRng);

    String::from_utf8(chars).map_err(|e| Error::Generation {
        reason: format!("generated bytes were not valid UTF-8: {e}"),
    })
}

/// Uniform draw with no composition guarantees (opaque blobs).
fn uniform(length: usize, charset: CharsetPolicy) -> Result<String> {
    if length == 0 {
        return Err(Error::Generation {
            reason: "requested length is zero".to_string(),
        });
    }

    let alphabet = full_alphabet(charset);
    let mut chars = Vec::with_capacity(length);
    while chars.len() < length {
        chars.push(pick(&alphabet)?);
    }

    String::from_utf8(chars).map_err(|e| Error::Generation {
        reason: format!("generated bytes were not valid UTF-8: {e}"),
    })
}

fn full_alphabet(charset: CharsetPolicy) -> Vec<u8> {
    let mut alphabet = Vec::with_capacity(LOWERCASE.len() + UPPERCASE.len() + DIGITS.len() + SYMBOLS.len());
    alphabet.extend_from_slice(LOWERCASE);
    alphabet.extend_from_slice(UPPERCASE);
    alphabet.extend_from_slice(DIGITS);
    if charset == CharsetPolicy::AlnumSymbols {
        alphabet.extend_from_slice(SYMBOLS);
    }
    alphabet
}

fn pick(alphabet: &[u8]) -> Result<u8> {
    alphabet
        .choose(&mut OsRng)
        .copied()
        .ok_or_else(|| Error::Generation {
            reason: "empty alphabet".to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::CredentialSpec;
    use proptest::prelude::*;

    fn has_class(value: &str, class: &[u8]) -> bool {
        value.bytes().any(|b| class.contains(&b))
    }

    #[test]
    fn password_contains_every_class() {
        let spec = CredentialSpec::password("db_password", 24);
        for _ in 0..100 {
            let value = generate(&spec).expect("generate");
            assert_eq!(value.len(), 24);
            assert!(has_class(&value, LOWERCASE));
            assert!(has_class(&value, UPPERCASE));
            assert!(has_class(&value, DIGITS));
            assert!(has_class(&value, SYMBOLS));
        }
    }

    #[test]
    fn token_never_contains_symbols() {
        let spec = CredentialSpec::token("api_key", 50);
        for _ in 0..100 {
            let value = generate(&spec).expect("generate");
            assert_eq!(value.len(), 50);
            assert!(!has_class(&value, SYMBOLS));
            assert!(value.bytes().all(|b| b.is_ascii_alphanumeric()));
        }
    }

    #[test]
    fn length_invariant_over_many_generations() {
        // The hard length bound must hold across a large sample.
        let specs = [
            CredentialSpec::password("a", 24),
            CredentialSpec::token("b", 50),
            CredentialSpec::blob("c", 32),
        ];
        for spec in &specs {
            for _ in 0..1000 {
                let value = generate(spec).expect("generate");
                assert!(value.len() <= spec.max_length);
            }
        }
    }

    #[test]
    fn requested_length_is_clamped_to_max() {
        let spec = CredentialSpec {
            key: "clamped",
            kind: CredentialKind::Password,
            length: 64,
            max_length: 24,
            charset: CharsetPolicy::AlnumSymbols,
        };
        let value = generate(&spec).expect("generate");
        assert_eq!(value.len(), 24);
    }

    #[test]
    fn too_short_for_guarantees_is_an_error() {
        let spec = CredentialSpec {
            key: "tiny",
            kind: CredentialKind::Password,
            length: 3,
            max_length: 3,
            charset: CharsetPolicy::AlnumSymbols,
        };
        assert!(generate(&spec).is_err());
    }

    #[test]
    fn blob_has_no_composition_rule_but_respects_charset() {
        let spec = CredentialSpec::blob("tls_key", 32);
        let value = generate(&spec).expect("generate");
        assert_eq!(value.len(), 32);
        assert!(value.bytes().all(|b| b.is_ascii_alphanumeric()));
    }

    #[test]
    fn successive_values_differ() {
        let spec = CredentialSpec::password("p", 24);
        let a = generate(&spec).expect("generate");
        let b = generate(&spec).expect("generate");
        assert_ne!(a, b);
    }

    proptest! {
        #[test]
        fn generated_length_is_min_of_requested_and_max(
            length in 4usize..64,
            max in 4usize..64,
        ) {
            let spec = CredentialSpec {
                key: "prop",
                kind: CredentialKind::Password,
                length,
                max_length: max,
                charset: CharsetPolicy::AlnumOnly,
            };
            let value = generate(&spec).expect("generate");
            prop_assert_eq!(value.len(), length.min(max));
        }

        #[test]
        fn alnum_only_values_are_alphanumeric(length in 4usize..64) {
            let spec = CredentialSpec {
                key: "prop",
                kind: CredentialKind::HighEntropyToken,
                length,
                max_length: length,
                charset: CharsetPolicy::AlnumOnly,
            };
            let value = generate(&spec).expect("generate");
            prop_assert!(value.bytes().all(|b| b.is_ascii_alphanumeric()));
        }
    }
}
