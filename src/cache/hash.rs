//! Stable hashing for persisted identifiers.

use sha2::{Digest, Sha256};

/// First eight bytes of the SHA256 of `text`, big-endian.
///
/// Stable across processes and releases, unlike `DefaultHasher`, so it can
/// seed persisted identifiers.
pub fn stable_hash_u64(text: &str) -> u64 {
    let digest = Sha256::digest(text.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stable_hash_is_fixed() {
        // sha256("abc") = ba7816bf8f01cfea...
        assert_eq!(stable_hash_u64("abc"), 0xba78_16bf_8f01_cfea);
        assert_ne!(stable_hash_u64("25-34"), stable_hash_u64("35-44"));
    }
}
