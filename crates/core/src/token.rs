//! Approval token secrets: generation, digest derivation, verification.
//!
//! Only the SHA-256 digest of a secret is ever persisted. The raw secret is
//! handed to the approver exactly once, inside the approval link.

use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Entropy per secret. 32 bytes keeps collisions below the birthday bound of
/// a 256-bit space.
pub const SECRET_BYTES: usize = 32;

/// Generate a fresh approval secret as a lowercase hex string (64 chars).
pub fn generate() -> String {
    let mut bytes = [0u8; SECRET_BYTES];
    OsRng.fill_bytes(&mut bytes);
    encode_hex(&bytes)
}

/// Derive the storage digest for a secret. Deterministic SHA-256, hex encoded.
pub fn hash(secret: &str) -> String {
    let digest = Sha256::digest(secret.as_bytes());
    encode_hex(digest.as_slice())
}

/// Check a candidate secret against a stored digest.
///
/// The comparison is constant-time so response latency does not leak the
/// position of the first mismatching byte. A length mismatch is an ordinary
/// `false`, not an error.
pub fn verify(secret: &str, digest: &str) -> bool {
    let computed = hash(secret);
    computed.as_bytes().ct_eq(digest.as_bytes()).into()
}

pub(crate) fn encode_hex(bytes: &[u8]) -> String {
    let mut output = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        output.push_str(&format!("{byte:02x}"));
    }
    output
}

#[cfg(test)]
mod tests {
    use super::{generate, hash, verify};

    fn is_lower_hex(value: &str) -> bool {
        value.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase())
    }

    #[test]
    fn generated_secrets_are_64_hex_chars() {
        let secret = generate();
        assert_eq!(secret.len(), 64);
        assert!(is_lower_hex(&secret));
    }

    #[test]
    fn generated_secrets_do_not_collide_across_samples() {
        let mut seen = std::collections::HashSet::new();
        for _ in 0..100 {
            assert!(seen.insert(generate()), "duplicate secret generated");
        }
    }

    #[test]
    fn hash_is_deterministic_and_fixed_width() {
        let secret = generate();
        let first = hash(&secret);
        let second = hash(&secret);
        assert_eq!(first, second);
        assert_eq!(first.len(), 64);
        assert!(is_lower_hex(&first));
    }

    #[test]
    fn distinct_secrets_hash_to_distinct_digests() {
        let a = generate();
        let b = generate();
        assert_ne!(hash(&a), hash(&b));
    }

    #[test]
    fn verify_accepts_matching_secret() {
        let secret = generate();
        assert!(verify(&secret, &hash(&secret)));
    }

    #[test]
    fn verify_rejects_wrong_secret() {
        let secret = generate();
        let other = generate();
        assert!(!verify(&other, &hash(&secret)));
    }

    #[test]
    fn verify_treats_length_mismatch_as_failure() {
        let secret = generate();
        assert!(!verify(&secret, "deadbeef"));
        assert!(!verify(&secret, ""));
    }
}
