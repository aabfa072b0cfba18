use sha2::{Digest, Sha256};

/// SHA-256 hex digest over whitespace-trimmed text. Used for change
/// detection: a re-fetched item with the same normalized body produces the
/// same fingerprint and can be skipped in incremental mode.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.trim().as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_deterministic() {
        assert_eq!(content_hash("need better intake"), content_hash("need better intake"));
    }

    #[test]
    fn hash_ignores_surrounding_whitespace() {
        assert_eq!(content_hash("  body text \n"), content_hash("body text"));
    }

    #[test]
    fn hash_differs_for_different_bodies() {
        assert_ne!(content_hash("one"), content_hash("two"));
    }
}
