//! Cryptographic utilities shared by the credential verification pipeline.
//!
//! Commitment verification is vulnerable to timing attacks when using
//! standard string comparison because the comparison may exit early on the
//! first mismatch. Verification here always goes through constant-time
//! comparison via the `subtle` crate, and commitments are SHA-256 digests of
//! their inputs rather than the inputs themselves.

use rand::{TryRngCore, rngs::OsRng};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Number of raw bytes in a generated salt.
pub const SALT_LEN: usize = 16;

/// Generate a random salt encoded as URL-safe base64.
///
/// # Panics
///
/// Panics if the OS random number generator fails. That indicates a critical
/// system failure (e.g. /dev/urandom unavailable) from which recovery is not
/// possible for security-sensitive operations.
pub fn generate_salt() -> String {
    let mut bytes = [0u8; SALT_LEN];
    OsRng
        .try_fill_bytes(&mut bytes)
        .expect("OS RNG failure - system entropy source unavailable");
    base64::Engine::encode(&base64::engine::general_purpose::URL_SAFE_NO_PAD, bytes)
}

/// Generate a random 256-bit nonce encoded as URL-safe base64.
pub fn generate_nonce() -> String {
    let mut bytes = [0u8; 32];
    OsRng
        .try_fill_bytes(&mut bytes)
        .expect("OS RNG failure - system entropy source unavailable");
    base64::Engine::encode(&base64::engine::general_purpose::URL_SAFE_NO_PAD, bytes)
}

/// Decode a salt produced by [`generate_salt`] back to its raw bytes.
pub fn decode_salt(salt: &str) -> Option<[u8; SALT_LEN]> {
    let bytes =
        base64::Engine::decode(&base64::engine::general_purpose::URL_SAFE_NO_PAD, salt).ok()?;
    bytes.try_into().ok()
}

/// Hex-encoded SHA-256 digest of the input.
pub fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

/// Constant-time comparison of two byte slices.
pub fn constant_time_compare(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}
