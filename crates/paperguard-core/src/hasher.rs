//! Identity Hashing
//!
//! Raw caller identifiers (network addresses) are never used as storage keys
//! directly. Every identifier is passed through a salted one-way hash first,
//! so the shared store only ever sees non-reversible digests.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::prelude::*;

type HmacSha256 = Hmac<Sha256>;

/// Hex characters in a digest (16 bytes of the HMAC output)
const DIGEST_HEX_LEN: usize = 32;

/// Salted one-way identifier hasher.
///
/// Deterministic: the same identifier always yields the same digest, which is
/// what makes digests usable as storage key prefixes. Total: empty or garbage
/// input still produces a valid digest and is simply rate limited as its own
/// identity.
#[derive(Debug, Clone)]
pub struct IdentityHasher {
	mac: HmacSha256,
}

impl IdentityHasher {
	pub fn new(salt: &str) -> ClResult<Self> {
		let mac = HmacSha256::new_from_slice(salt.as_bytes())
			.map_err(|_| Error::ConfigError("invalid identity hash salt".into()))?;
		Ok(Self { mac })
	}

	/// Hashes a raw identifier into a fixed-length hex digest.
	pub fn hash(&self, raw: &str) -> Box<str> {
		let mut mac = self.mac.clone();
		mac.update(raw.as_bytes());
		let digest = mac.finalize().into_bytes();

		digest[..DIGEST_HEX_LEN / 2]
			.iter()
			.map(|b| format!("{:02x}", b))
			.collect::<String>()
			.into_boxed_str()
	}
}


// vim: ts=4
