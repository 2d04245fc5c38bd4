use sha2::{Digest, Sha256};

/// SHA-256 hex digest of a token or text.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Compare a presented bearer token with a stored SHA-256 hex digest.
/// Digests are compared in constant time.
pub fn token_matches(presented: &str, stored_hash: &str) -> bool {
    let presented_hash = hash_token(presented.trim());
    if presented_hash.len() != stored_hash.len() {
        return false;
    }
    presented_hash
        .bytes()
        .zip(stored_hash.bytes())
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_stable_hex() {
        let hash = hash_token("secret");
        assert_eq!(hash.len(), 64);
        assert_eq!(hash, hash_token("secret"));
        assert_ne!(hash, hash_token("Secret"));
    }

    #[test]
    fn token_matches_only_the_hashed_token() {
        let stored = hash_token("bridge-token");
        assert!(token_matches("bridge-token", &stored));
        assert!(token_matches("  bridge-token ", &stored));
        assert!(!token_matches("other", &stored));
        assert!(!token_matches("bridge-token", "short"));
    }
}
