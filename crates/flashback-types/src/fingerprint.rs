//! Visitor fingerprint derivation.
//!
//! The fingerprint correlates sessions to a returning visitor without a
//! login identity. Inputs are intentionally low-entropy (screen size,
//! client address, timezone, language, user agent); collisions across
//! unrelated visitors are an accepted precision/privacy trade-off.

use sha2::{Digest, Sha256};

use crate::session::ScreenSize;

/// Hex characters kept from the digest. 64 bits is plenty for
/// correlation and deliberately too little for unique identification.
const FINGERPRINT_LEN: usize = 16;

/// Client signals the fingerprint is derived from.
#[derive(Debug, Clone, Copy, Default)]
pub struct FingerprintInputs<'a> {
    pub user_agent: &'a str,
    pub language: &'a str,
    pub timezone: &'a str,
    pub screen: ScreenSize,
    /// Client network address as seen by the collector, when known.
    pub client_address: Option<&'a str>,
}

/// Derives a visitor fingerprint from low-entropy client signals.
///
/// The same inputs always produce the same fingerprint; there is no
/// per-visitor salt, which is what makes cross-session correlation
/// possible in the first place.
pub fn derive_fingerprint(inputs: &FingerprintInputs<'_>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(inputs.user_agent.as_bytes());
    hasher.update(b"|");
    hasher.update(inputs.language.as_bytes());
    hasher.update(b"|");
    hasher.update(inputs.timezone.as_bytes());
    hasher.update(b"|");
    hasher.update(format!("{}x{}", inputs.screen.width, inputs.screen.height).as_bytes());
    hasher.update(b"|");
    hasher.update(inputs.client_address.unwrap_or("").as_bytes());

    let digest = hasher.finalize();
    hex::encode(digest)[..FINGERPRINT_LEN].to_string()
}
