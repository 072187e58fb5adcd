//! Securely seal payout account identifiers (IBANs) at rest.
//!
//! ## Design
//!
//! - AES-256-GCM under a single server-side key, with a random 96-bit nonce
//!   sampled per sealing from a cryptographic RNG. Identifiers are tiny
//!   (<= 34 bytes) and low-volume, so the random-nonce collision bound is a
//!   non-issue at our scale.
//! - Sealed output is `version || nonce || ciphertext || tag`, base64
//!   encoded, so it fits the store's existing text column.
//! - Validation (see [`crate::iban`]) is always performed on plaintext
//!   *before* sealing.
//! - Reads accept a plaintext value when decryption fails, covering the
//!   migration window in which unsealed identifiers still exist in the
//!   store.

use base64::Engine;
use ring::aead::{self, BoundKey};

use crate::rng::{Crng, RngExt};

/// serialized version length
const VERSION_LEN: usize = 1;
/// AES-256-GCM nonce length
const NONCE_LEN: usize = 12;
/// AES-256-GCM tag length
const TAG_LEN: usize = 16;

const SEAL_VERSION_V1: u8 = 1;

const BASE64: base64::engine::general_purpose::GeneralPurpose =
    base64::engine::general_purpose::STANDARD;

/// Errors that can occur when unsealing a stored identifier.
#[derive(Debug, thiserror::Error)]
pub enum UnsealError {
    #[error("stored value is not valid base64")]
    Base64,
    #[error("sealed value is too short")]
    TooShort,
    #[error("unrecognized seal version")]
    Version,
    #[error("decryption failed")]
    Decrypt,
    #[error("plaintext is not valid UTF-8")]
    Utf8,
}

/// A single-use nonce wrapper. [`aead::SealingKey`]/[`aead::OpeningKey`]
/// require a [`aead::NonceSequence`]; ours yields exactly one nonce.
struct OneNonce(Option<aead::Nonce>);

impl aead::NonceSequence for OneNonce {
    fn advance(&mut self) -> Result<aead::Nonce, ring::error::Unspecified> {
        self.0.take().ok_or(ring::error::Unspecified)
    }
}

/// The server-side key under which payout account identifiers are sealed.
pub struct SealKey {
    key_bytes: [u8; 32],
}

impl SealKey {
    pub fn new(key_bytes: [u8; 32]) -> Self {
        Self { key_bytes }
    }

    fn bound_key<K: BoundKey<OneNonce>>(&self, nonce: aead::Nonce) -> K {
        let unbound =
            aead::UnboundKey::new(&aead::AES_256_GCM, &self.key_bytes)
                .expect("Key length is correct by construction");
        K::new(unbound, OneNonce(Some(nonce)))
    }

    /// Seal a plaintext identifier for storage.
    pub fn seal(&self, rng: &mut impl Crng, plaintext: &str) -> String {
        let nonce_bytes = rng.gen_bytes::<NONCE_LEN>();
        let nonce = aead::Nonce::assume_unique_for_key(nonce_bytes);
        let mut key = self.bound_key::<aead::SealingKey<OneNonce>>(nonce);

        let mut in_out = plaintext.as_bytes().to_vec();
        key.seal_in_place_append_tag(aead::Aad::empty(), &mut in_out)
            .expect("Sealing un-aliased plaintext never fails");

        let mut buf =
            Vec::with_capacity(VERSION_LEN + NONCE_LEN + in_out.len());
        buf.push(SEAL_VERSION_V1);
        buf.extend_from_slice(&nonce_bytes);
        buf.extend_from_slice(&in_out);

        BASE64.encode(buf)
    }

    /// Unseal a stored identifier.
    pub fn unseal(&self, sealed: &str) -> Result<String, UnsealError> {
        let bytes =
            BASE64.decode(sealed).map_err(|_| UnsealError::Base64)?;
        if bytes.len() < VERSION_LEN + NONCE_LEN + TAG_LEN {
            return Err(UnsealError::TooShort);
        }

        let (version, rest) = bytes.split_at(VERSION_LEN);
        if version[0] != SEAL_VERSION_V1 {
            return Err(UnsealError::Version);
        }

        let (nonce_bytes, ciphertext) = rest.split_at(NONCE_LEN);
        let nonce = aead::Nonce::try_assume_unique_for_key(nonce_bytes)
            .expect("Length checked above");
        let mut key = self.bound_key::<aead::OpeningKey<OneNonce>>(nonce);

        let mut in_out = ciphertext.to_vec();
        let plaintext = key
            .open_in_place(aead::Aad::empty(), &mut in_out)
            .map_err(|_| UnsealError::Decrypt)?;

        String::from_utf8(plaintext.to_vec()).map_err(|_| UnsealError::Utf8)
    }

    /// Migration-window read: returns the unsealed identifier, or the stored
    /// value verbatim when it does not unseal (i.e. it predates sealing).
    pub fn unseal_or_plaintext(&self, stored: &str) -> String {
        match self.unseal(stored) {
            Ok(plaintext) => plaintext,
            Err(_) => stored.to_owned(),
        }
    }
}

#[cfg(test)]
mod test {
    use proptest::{arbitrary::any, prop_assert_eq, proptest};

    use super::*;
    use crate::rng::WeakRng;

    fn test_key() -> SealKey {
        SealKey::new([0x42; 32])
    }

    #[test]
    fn seal_unseal_roundtrip() {
        proptest!(|(mut rng in any::<WeakRng>(), iban in "[A-Z0-9]{24,34}")| {
            let key = test_key();
            let sealed = key.seal(&mut rng, &iban);
            let unsealed = key.unseal(&sealed).unwrap();
            prop_assert_eq!(iban, unsealed);
        })
    }

    #[test]
    fn tampered_ciphertext_fails() {
        let key = test_key();
        let mut rng = WeakRng::new();
        let sealed = key.seal(&mut rng, "RO49AAAA1B31007593840000");

        let mut bytes = BASE64.decode(&sealed).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        let tampered = BASE64.encode(bytes);

        assert!(matches!(key.unseal(&tampered), Err(UnsealError::Decrypt)));
    }

    #[test]
    fn plaintext_fallback_read() {
        let key = test_key();
        let legacy = "RO49AAAA1B31007593840000";
        assert_eq!(key.unseal_or_plaintext(legacy), legacy);
    }

    #[test]
    fn wrong_key_fails() {
        let mut rng = WeakRng::new();
        let sealed = test_key().seal(&mut rng, "RO49AAAA1B31007593840000");
        let other = SealKey::new([0x43; 32]);
        assert!(other.unseal(&sealed).is_err());
    }
}
