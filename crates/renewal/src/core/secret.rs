//! Secret string type with automatic zeroization
//!
//! Signing key material and the issuer's auth token travel as [`SecretString`]:
//! the value is only reachable inside an [`expose_secret`] closure and the
//! memory is zeroed on drop.
//!
//! [`expose_secret`]: SecretString::expose_secret

use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Secret string with automatic memory zeroization
///
/// # Examples
///
/// ```
/// use signing_key_renewal::SecretString;
///
/// let key = SecretString::new("c2lnbmluZy1rZXk=");
/// assert_eq!(key.expose_secret(str::len), 16);
/// assert_eq!(format!("{key:?}"), "[REDACTED]");
/// ```
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecretString {
    inner: String,
}

impl SecretString {
    /// Creates a new secret from any string-like value
    pub fn new<S: Into<String>>(s: S) -> Self {
        Self { inner: s.into() }
    }

    /// Accesses the secret value within a closure scope
    pub fn expose_secret<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&str) -> R,
    {
        f(&self.inner)
    }

    /// Returns the length without exposing content
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Checks if empty without exposing content
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.trim().is_empty()
    }
}

impl PartialEq for SecretString {
    fn eq(&self, other: &Self) -> bool {
        use subtle::ConstantTimeEq;
        self.inner.as_bytes().ct_eq(other.inner.as_bytes()).into()
    }
}

impl Eq for SecretString {}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl fmt::Display for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

// Serialized form is redacted; the record codec writes the plain value explicitly.
impl Serialize for SecretString {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str("[REDACTED]")
    }
}

impl<'de> Deserialize<'de> for SecretString {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        String::deserialize(deserializer).map(SecretString::new)
    }
}
