use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderValue},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use headcount_core::{bot, fingerprint::fingerprint_hash, identity};

use crate::{error::AppError, state::AppState};

/// `POST /early-access/visit` — count this visitor, exactly once.
///
/// Control flow: bot filter → identity cookie → fingerprint merge →
/// `add_visitor` → response with the current count.
///
/// - Bot traffic short-circuits to a read-only count: bots still see a
///   working page, they just never mutate state and never get a cookie.
/// - A request without a valid `ea_uid` cookie gets one; if the fingerprint
///   index recognizes the browser, the cookie carries the *original* uid so
///   the visit dedups instead of double counting.
/// - A storage outage degrades to in-process fallback counting; the response
///   is still 200 with `source: "fallback"`.
#[tracing::instrument(skip(state, headers))]
pub async fn visit(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let user_agent = header_str(&headers, header::USER_AGENT.as_str());

    if bot::is_bot(user_agent) {
        let snapshot = state.current_count().await;
        return Ok(Json(json!({
            "count": snapshot.value,
            "source": snapshot.source,
        }))
        .into_response());
    }

    let resolved = identity::resolve(header_str(&headers, header::COOKIE.as_str()));

    // Fingerprint reconciliation only applies to cookie-less requests: a
    // valid cookie is already the strongest identity signal we have.
    let uid = if resolved.is_new {
        let client_ip = extract_client_ip(&headers);
        let accept_language = header_str(&headers, header::ACCEPT_LANGUAGE.as_str());
        let hash = fingerprint_hash(client_ip.as_deref(), user_agent, accept_language);
        state.reconcile_fingerprint(&hash, &resolved.uid).await
    } else {
        resolved.uid.clone()
    };

    let snapshot = state.record_visit(&uid).await;

    let mut response = Json(json!({
        "count": snapshot.value,
        "source": snapshot.source,
    }))
    .into_response();

    if resolved.is_new {
        let cookie = HeaderValue::from_str(&identity::set_cookie(&uid))
            .map_err(|e| AppError::Internal(anyhow::anyhow!("invalid cookie value: {e}")))?;
        response.headers_mut().insert(header::SET_COOKIE, cookie);
    }

    Ok(response)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Extract the real client IP from `X-Forwarded-For` (first entry), falling
/// back to `X-Real-IP`. `None` lowers fingerprint confidence but never fails
/// the request.
fn extract_client_ip(headers: &HeaderMap) -> Option<String> {
    if let Some(forwarded) = header_str(headers, "x-forwarded-for") {
        if let Some(first) = forwarded.split(',').next() {
            let trimmed = first.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
    }
    header_str(headers, "x-real-ip").map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forwarded_for_takes_first_entry() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.9, 10.0.0.1"),
        );
        assert_eq!(extract_client_ip(&headers).as_deref(), Some("203.0.113.9"));
    }

    #[test]
    fn real_ip_is_the_fallback() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("198.51.100.7"));
        assert_eq!(extract_client_ip(&headers).as_deref(), Some("198.51.100.7"));
    }

    #[test]
    fn no_ip_headers_yields_none() {
        assert_eq!(extract_client_ip(&HeaderMap::new()), None);
    }
}
