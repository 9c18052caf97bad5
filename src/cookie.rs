//! Session cookie encode/decode.

use chrono::{DateTime, Utc};
use http::HeaderMap;
use http::header::COOKIE;

use crate::constants::SESSION_COOKIE;

/// Domains matching this prefix never get a `Domain` attribute; browsers
/// reject domain-scoped cookies on loopback-style hosts.
const LOCAL_DOMAIN_PREFIX: &str = "localhost";

/// Immutable descriptor for a `Set-Cookie` value carrying the session
/// token. Built once per response and handed to the transport layer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionCookie {
    value: String,
    domain: Option<String>,
    expires: DateTime<Utc>,
}

impl SessionCookie {
    /// Cookie establishing `token` for `ttl_seconds` from now.
    pub fn establish(token: &str, service_domain: &str, ttl_seconds: i64) -> Self {
        Self {
            value: token.to_string(),
            domain: cookie_domain(service_domain),
            expires: Utc::now() + chrono::Duration::seconds(ttl_seconds),
        }
    }

    /// Cookie clearing the session: empty value, expiry in the past.
    pub fn clear(service_domain: &str) -> Self {
        Self {
            value: String::new(),
            domain: cookie_domain(service_domain),
            expires: DateTime::UNIX_EPOCH,
        }
    }

    /// `Set-Cookie` header value with an absolute expiry timestamp.
    pub fn header_value(&self) -> String {
        let mut out = format!(
            "{}={}; Path=/; Expires={}",
            SESSION_COOKIE,
            self.value,
            self.expires.format("%a, %d %b %Y %H:%M:%S GMT"),
        );
        if let Some(domain) = &self.domain {
            out.push_str("; Domain=");
            out.push_str(domain);
        }
        out
    }
}

fn cookie_domain(service_domain: &str) -> Option<String> {
    if service_domain.starts_with(LOCAL_DOMAIN_PREFIX) {
        None
    } else {
        Some(service_domain.to_string())
    }
}

/// Pulls the session token out of the request's cookie headers.
///
/// A missing header, a missing pair, or an empty value all yield `None`.
pub fn extract_session_token(headers: &HeaderMap) -> Option<String> {
    headers.get_all(COOKIE).iter().find_map(|header| {
        let header = header.to_str().ok()?;
        header.split(';').find_map(|pair| {
            let (name, value) = pair.trim().split_once('=')?;
            (name == SESSION_COOKIE && !value.is_empty()).then(|| value.to_string())
        })
    })
}
