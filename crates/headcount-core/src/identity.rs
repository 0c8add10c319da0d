use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Name of the identity cookie set on every first contact.
pub const COOKIE_NAME: &str = "ea_uid";

/// Cookie lifetime: 7 days, in seconds.
pub const COOKIE_MAX_AGE_SECS: u64 = 604_800;

/// A per-browser visitor identity.
///
/// Minted once on first contact and mirrored into the dedup store's
/// membership set. Never mutated; a fingerprint match that resolves to a
/// different uid supersedes this one (the cookie is rewritten), it does not
/// delete it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedIdentity {
    pub uid: String,
    pub created_at: DateTime<Utc>,
    /// `true` when no valid cookie was presented and a fresh uid was minted.
    pub is_new: bool,
}

/// Resolve the visitor identity from a raw `Cookie` request header.
///
/// A valid token is the 32-lowercase-hex simple form of a v4 UUID (128 bits
/// of randomness). Anything else — absent header, absent key, malformed
/// value — mints a new token and marks the identity as new so the caller
/// knows to emit a `Set-Cookie`.
pub fn resolve(cookie_header: Option<&str>) -> ResolvedIdentity {
    if let Some(uid) = cookie_header.and_then(extract_uid) {
        return ResolvedIdentity {
            uid,
            created_at: Utc::now(),
            is_new: false,
        };
    }
    ResolvedIdentity {
        uid: mint_uid(),
        created_at: Utc::now(),
        is_new: true,
    }
}

/// Mint a fresh opaque visitor token.
pub fn mint_uid() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Render the `Set-Cookie` header value carrying `uid`.
///
/// `HttpOnly` keeps the token out of page scripts; `SameSite=Strict` keeps
/// third-party embeds from replaying it.
pub fn set_cookie(uid: &str) -> String {
    format!(
        "{}={}; HttpOnly; SameSite=Strict; Max-Age={}; Path=/",
        COOKIE_NAME, uid, COOKIE_MAX_AGE_SECS
    )
}

/// Pull a syntactically valid uid out of a `Cookie` header value.
///
/// Cookie headers are `key=value` pairs separated by `"; "`. Only the
/// well-known key is considered; an invalid value is treated the same as an
/// absent cookie.
fn extract_uid(header: &str) -> Option<String> {
    header
        .split(';')
        .filter_map(|pair| {
            let (key, value) = pair.trim().split_once('=')?;
            (key == COOKIE_NAME).then(|| value.to_string())
        })
        .find(|value| is_valid_uid(value))
}

/// A valid uid is exactly 32 lowercase hex characters.
fn is_valid_uid(token: &str) -> bool {
    token.len() == 32
        && token
            .chars()
            .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minted_uid_is_32_lowercase_hex() {
        let uid = mint_uid();
        assert_eq!(uid.len(), 32);
        assert!(is_valid_uid(&uid));
    }

    #[test]
    fn no_header_mints_new_identity() {
        let id = resolve(None);
        assert!(id.is_new);
        assert!(is_valid_uid(&id.uid));
    }

    #[test]
    fn valid_cookie_is_reused() {
        let uid = mint_uid();
        let header = format!("theme=dark; {}={}; lang=en", COOKIE_NAME, uid);
        let id = resolve(Some(&header));
        assert!(!id.is_new);
        assert_eq!(id.uid, uid);
    }

    #[test]
    fn malformed_token_mints_new_identity() {
        let header = format!("{}=not-a-real-token", COOKIE_NAME);
        let id = resolve(Some(&header));
        assert!(id.is_new);
        assert_ne!(id.uid, "not-a-real-token");
    }

    #[test]
    fn wrong_key_is_ignored() {
        let uid = mint_uid();
        let header = format!("other_uid={uid}");
        let id = resolve(Some(&header));
        assert!(id.is_new);
        assert_ne!(id.uid, uid);
    }

    #[test]
    fn set_cookie_carries_required_attributes() {
        let value = set_cookie("abc123");
        assert!(value.starts_with("ea_uid=abc123; "));
        assert!(value.contains("HttpOnly"));
        assert!(value.contains("SameSite=Strict"));
        assert!(value.contains("Max-Age=604800"));
        assert!(value.contains("Path=/"));
    }

    #[test]
    fn two_minted_uids_differ() {
        assert_ne!(mint_uid(), mint_uid());
    }
}
