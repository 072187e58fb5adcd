//! Reservation code generation.
//!
//! Codes are `CB-<year>-<6 chars>` over the uppercase-alphanumeric
//! alphabet, drawn from a cryptographic RNG. Uniqueness is enforced by the
//! store's unique index; on conflict the caller regenerates and retries,
//! bounded by [`MAX_ATTEMPTS`].

use cb_common::rng::Crng;

use crate::models::booking::ReservationCode;

const ALPHABET: &[u8; 36] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const SUFFIX_LEN: usize = 6;

/// Insert attempts before giving up with a conflict error.
pub const MAX_ATTEMPTS: u32 = 5;

/// Draws a fresh candidate code for the given booking year.
pub fn generate(rng: &mut (impl Crng + ?Sized), year: i32) -> ReservationCode {
    let mut suffix = [0u8; SUFFIX_LEN];
    for byte in suffix.iter_mut() {
        let index = rng.next_u32() as usize % ALPHABET.len();
        *byte = ALPHABET[index];
    }
    let suffix = std::str::from_utf8(&suffix)
        .expect("The alphabet is pure ASCII");
    ReservationCode::from_parts(year, suffix)
}
