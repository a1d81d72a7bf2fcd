//! Password scheme verification for the internal backend (spec.md §4.D).

use argon2::{Argon2, PasswordHash, PasswordVerifier};
use base64::Engine;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Verifies `candidate` against `stored`, dispatching on `stored`'s own
/// prefix (`sha256:`, `argon2:`, or plaintext otherwise) per spec.md §3
/// — there is no separate scheme field, the `pass` string names its own
/// scheme.
pub fn verify(stored: &str, candidate: &str) -> bool {
    if stored.starts_with("sha256:") {
        verify_sha256(stored, candidate)
    } else if stored.starts_with("argon2:") {
        verify_argon2(stored, candidate)
    } else {
        verify_plain(stored, candidate)
    }
}

fn verify_plain(stored: &str, candidate: &str) -> bool {
    let a = stored.as_bytes();
    let b = candidate.as_bytes();
    a.len() == b.len() && bool::from(a.ct_eq(b))
}

fn verify_sha256(stored: &str, candidate: &str) -> bool {
    let expected = stored.strip_prefix("sha256:").unwrap_or(stored);
    let Ok(expected_bytes) = base64::engine::general_purpose::STANDARD.decode(expected) else {
        return false;
    };
    let digest = Sha256::digest(candidate.as_bytes());
    expected_bytes.len() == digest.len() && bool::from(expected_bytes.ct_eq(&digest))
}

fn verify_argon2(stored: &str, candidate: &str) -> bool {
    let encoded = stored.strip_prefix("argon2:").unwrap_or(stored);
    let Ok(hash) = PasswordHash::new(encoded) else {
        return false;
    };
    Argon2::default()
        .verify_password(candidate.as_bytes(), &hash)
        .is_ok()
}
