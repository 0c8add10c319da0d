//! Bot classification from request metadata.
//!
//! Purely a predicate: callers decide what to do with the verdict. The policy
//! is deliberately conservative — bots still get served the current count
//! (read-only), they just never reach the dedup store's write path.

/// UA substrings that identify automated traffic, matched case-insensitively.
const BOT_SIGNATURES: &[&str] = &[
    "bot",
    "spider",
    "crawler",
    "googlebot",
    "bingbot",
    "duckduckbot",
    "yandexbot",
    "baiduspider",
    "ahrefsbot",
    "semrushbot",
    "mj12bot",
    "headlesschrome",
    "phantomjs",
    "python-requests",
    "curl/",
    "wget/",
    "go-http-client",
    "libwww-perl",
    "urllib",
    "httpclient",
];

/// Classify a request as automated from its `User-Agent` header.
///
/// An absent or empty UA is treated as a bot: every mainstream browser sends
/// one, and counting UA-less traffic inflates the visitor total with probes
/// and scripts.
pub fn is_bot(user_agent: Option<&str>) -> bool {
    let ua = match user_agent {
        Some(ua) if !ua.trim().is_empty() => ua,
        _ => return true,
    };

    let lowered = ua.to_ascii_lowercase();
    if BOT_SIGNATURES.iter().any(|sig| lowered.contains(sig)) {
        return true;
    }

    // woothee knows crawlers the substring list misses (e.g. feed fetchers).
    matches!(
        woothee::parser::Parser::new().parse(ua),
        Some(result) if result.category == "crawler"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHROME_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
         AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

    #[test]
    fn browser_ua_is_human() {
        assert!(!is_bot(Some(CHROME_UA)));
    }

    #[test]
    fn missing_ua_is_bot() {
        assert!(is_bot(None));
        assert!(is_bot(Some("")));
        assert!(is_bot(Some("   ")));
    }

    #[test]
    fn known_crawlers_are_bots() {
        assert!(is_bot(Some(
            "Mozilla/5.0 (compatible; Googlebot/2.1; +http://www.google.com/bot.html)"
        )));
        assert!(is_bot(Some("curl/8.4.0")));
        assert!(is_bot(Some("python-requests/2.31.0")));
    }

    #[test]
    fn signature_match_is_case_insensitive() {
        assert!(is_bot(Some("SomeThing AHREFSBOT v7")));
    }
}
