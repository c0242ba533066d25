//! Per-session client identity.
//!
//! Every request a [`PollingChannel`](crate::PollingChannel) issues carries
//! the same [`ClientId`] in the [`CLIENT_ID_HEADER`](crate::CLIENT_ID_HEADER)
//! header, which is how the server correlates `/send` and `/recv` traffic
//! from one session.

use core::{fmt, str::FromStr};

use rand::Rng;

use crate::error::InvalidClientId;

/// Number of characters in a [`ClientId`].
pub const CLIENT_ID_LEN: usize = 32;

/// The characters a [`ClientId`] is drawn from.
pub const CLIENT_ID_ALPHABET: &[u8; 36] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// An opaque session identifier: 32 characters over `[a-z0-9]`.
///
/// Generated once per channel and never changed afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClientId([u8; CLIENT_ID_LEN]);

impl ClientId {
    /// Generate a new random client identity.
    ///
    /// Each character is drawn uniformly from [`CLIENT_ID_ALPHABET`]. The
    /// thread RNG is used; uniqueness only needs to hold with overwhelming
    /// probability, not against an adversary.
    #[must_use]
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let mut bytes = [0u8; CLIENT_ID_LEN];
        for byte in &mut bytes {
            let idx = rng.gen_range(0..CLIENT_ID_ALPHABET.len());
            *byte = CLIENT_ID_ALPHABET.get(idx).copied().unwrap_or(b'a');
        }
        Self(bytes)
    }

    /// The identity as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        // Only ASCII from the alphabet is ever stored.
        core::str::from_utf8(&self.0).unwrap_or_default()
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClientId {
    type Err = InvalidClientId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes: [u8; CLIENT_ID_LEN] = s
            .as_bytes()
            .try_into()
            .map_err(|_| InvalidClientId::Length(s.len()))?;

        if let Some(&bad) = bytes.iter().find(|&&b| !CLIENT_ID_ALPHABET.contains(&b)) {
            return Err(InvalidClientId::Character(char::from(bad)));
        }

        Ok(Self(bytes))
    }
}
