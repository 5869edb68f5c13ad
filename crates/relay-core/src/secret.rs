//! HTLC preimage hashing and constant-time verification.
//!
//! Compute the hashlock once at order-submission time, compare in constant
//! time at reveal time so the comparison itself cannot leak timing
//! information about how many leading bytes matched.

use sha2::{Digest, Sha256};

use crate::types::SecretHash;

/// Compute `sha256(secret)`, the `secretHash` commitment.
pub fn hash_secret(secret: &[u8; 32]) -> SecretHash {
    let digest = Sha256::digest(secret);
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    SecretHash::from_bytes(out)
}

/// Verify that `secret` is a preimage of `expected` using a constant-time
/// comparison, so a resolver probing reveals cannot learn anything from
/// response latency (spec's secret-soundness property, P2).
pub fn verify_secret(secret: &[u8; 32], expected: &SecretHash) -> bool {
    let computed = hash_secret(secret);
    constant_time_eq(computed.as_bytes(), expected.as_bytes())
}

/// Byte-wise constant-time equality: always inspects every byte, never
/// short-circuits on the first mismatch.
fn constant_time_eq(a: &[u8; 32], b: &[u8; 32]) -> bool {
    let mut diff = 0u8;
    for i in 0..32 {
        diff |= a[i] ^ b[i];
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matching_preimage_verifies() {
        let secret = [7u8; 32];
        let hash = hash_secret(&secret);
        assert!(verify_secret(&secret, &hash));
    }

    #[test]
    fn wrong_preimage_fails() {
        let secret = [7u8; 32];
        let hash = hash_secret(&secret);
        let wrong = [8u8; 32];
        assert!(!verify_secret(&wrong, &hash));
    }

    #[test]
    fn constant_time_eq_detects_any_byte_difference() {
        let a = [1u8; 32];
        let mut b = [1u8; 32];
        for i in 0..32 {
            let mut c = a;
            c[i] = 0;
            assert!(!constant_time_eq(&b, &c));
            b[i] = 1;
        }
    }
}
