use sha2::{Digest, Sha256};
use std::time::Duration;

/// How long a fingerprint record may be trusted to re-identify a visitor.
pub const FINGERPRINT_TTL: Duration = Duration::from_secs(48 * 3600);

/// Unit separator between hashed fields.
///
/// Keeps `("ab", "c")` and `("a", "bc")` from colliding into the same digest.
const FIELD_SEPARATOR: u8 = 0x1f;

/// Compute a stable fingerprint hash from coarse request attributes.
///
/// Formula: hex(sha256(ip 0x1F user_agent 0x1F accept_language)).
///
/// Missing headers reduce entropy but must never abort the request: absent
/// fields hash as empty strings, yielding a lower-confidence hash rather
/// than an error.
pub fn fingerprint_hash(
    ip: Option<&str>,
    user_agent: Option<&str>,
    accept_language: Option<&str>,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(ip.unwrap_or("").as_bytes());
    hasher.update([FIELD_SEPARATOR]);
    hasher.update(user_agent.unwrap_or("").as_bytes());
    hasher.update([FIELD_SEPARATOR]);
    hasher.update(accept_language.unwrap_or("").as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_64_hex_chars() {
        let hash = fingerprint_hash(Some("1.2.3.4"), Some("Mozilla/5.0"), Some("en-US"));
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn hash_is_deterministic() {
        let a = fingerprint_hash(Some("1.2.3.4"), Some("Mozilla/5.0"), Some("en-US"));
        let b = fingerprint_hash(Some("1.2.3.4"), Some("Mozilla/5.0"), Some("en-US"));
        assert_eq!(a, b);
    }

    #[test]
    fn differing_fields_change_the_hash() {
        let a = fingerprint_hash(Some("1.2.3.4"), Some("Mozilla/5.0"), Some("en-US"));
        let b = fingerprint_hash(Some("1.2.3.5"), Some("Mozilla/5.0"), Some("en-US"));
        assert_ne!(a, b);
    }

    #[test]
    fn field_boundaries_are_unambiguous() {
        // Without the separator both would hash "abc" + "Mozilla".
        let a = fingerprint_hash(Some("ab"), Some("cMozilla"), None);
        let b = fingerprint_hash(Some("abc"), Some("Mozilla"), None);
        assert_ne!(a, b);
    }

    #[test]
    fn missing_headers_still_produce_a_hash() {
        let hash = fingerprint_hash(None, None, None);
        assert_eq!(hash.len(), 64);
    }
}
