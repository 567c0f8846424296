//! Cryptographic primitives: device key pairs, detached statement
//! signatures, HKDF key derivation, and sealed boxes for team secrets.

pub mod derivation;
pub mod encryption;
pub mod keys;
pub mod signing;

use rand::RngCore;

/// `N` bytes from the operating system backed thread RNG.
pub(crate) fn random_array<const N: usize>() -> [u8; N] {
    let mut buf = [0u8; N];
    rand::thread_rng().fill_bytes(&mut buf);
    buf
}
