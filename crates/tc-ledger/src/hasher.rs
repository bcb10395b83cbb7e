// hasher.rs — SHA-256 hashing for the ledger chain.
//
// All hashes are SHA-256, encoded as 64-character lowercase hex. An entry's
// hash covers the previous entry's hash followed by the entry's canonical
// JSON, so changing any byte of any entry breaks every later link.

use sha2::{Digest, Sha256};

/// `prev_hash` of the first entry in a ledger.
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// Hash arbitrary bytes, returning a lowercase hex-encoded SHA-256 string.
pub fn hash_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// Hash a UTF-8 string.
pub fn hash_str(s: &str) -> String {
    hash_bytes(s.as_bytes())
}

/// `H(prev_hash ‖ canonical)`.
pub fn chain_hash(prev_hash: &str, canonical: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(prev_hash.as_bytes());
    hasher.update(canonical);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_known_value() {
        // SHA-256("") is a well-known constant.
        assert_eq!(
            hash_str(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn hash_is_lowercase_hex() {
        let hash = hash_str("trust");
        assert_eq!(hash.len(), 64);
        assert!(hash
            .chars()
            .all(|c| c.is_ascii_hexdigit() && !c.is_uppercase()));
    }

    #[test]
    fn chain_hash_equals_hash_of_concatenation() {
        let joined = format!("{}{}", GENESIS_HASH, "{\"a\":1}");
        assert_eq!(chain_hash(GENESIS_HASH, b"{\"a\":1}"), hash_str(&joined));
    }

    #[test]
    fn chain_hash_depends_on_predecessor() {
        let a = chain_hash(GENESIS_HASH, b"payload");
        let b = chain_hash(&hash_str("other"), b"payload");
        assert_ne!(a, b);
    }

    #[test]
    fn genesis_hash_has_digest_width() {
        assert_eq!(GENESIS_HASH.len(), 64);
    }
}
