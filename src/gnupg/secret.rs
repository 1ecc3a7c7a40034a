//! Secret material that may only reach a child process through its stdin.
//!
//! A [`Secret`] has no `Display`, no `AsRef<str>` and no conversion into an
//! argument, so the argument builders in this crate cannot interpolate it.
//! The buffer is wiped when dropped.

use std::fmt;

use zeroize::Zeroizing;

#[derive(Clone, Default)]
pub struct Secret(Zeroizing<Vec<u8>>);

impl Secret {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(Zeroizing::new(bytes.into()))
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Uppercase hex encoding of the secret, itself kept secret.
    pub fn to_upper_hex(&self) -> Secret {
        Secret::new(hex::encode_upper(self.expose()))
    }

    /// Concatenate `prefix`, the secret and `suffix` into a new secret.
    pub(crate) fn wrapped(prefix: &str, inner: &Secret, suffix: &str) -> Secret {
        let mut bytes = Vec::with_capacity(prefix.len() + inner.0.len() + suffix.len());
        bytes.extend_from_slice(prefix.as_bytes());
        bytes.extend_from_slice(inner.expose());
        bytes.extend_from_slice(suffix.as_bytes());
        Secret::new(bytes)
    }

    pub(crate) fn expose(&self) -> &[u8] {
        &self.0
    }
}

impl From<String> for Secret {
    fn from(value: String) -> Self {
        Secret::new(value.into_bytes())
    }
}

impl From<&str> for Secret {
    fn from(value: &str) -> Self {
        Secret::new(value.as_bytes().to_vec())
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            f.write_str("Secret(<empty>)")
        } else {
            f.write_str("Secret(***)")
        }
    }
}
