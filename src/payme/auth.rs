//! Basic-auth check for gateway calls.
//!
//! The gateway sends `Authorization: Basic base64(login:key)`. Only the key
//! is compared; the login is logged but otherwise ignored.

use axum::http::{HeaderMap, header::AUTHORIZATION};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use tracing::warn;

/// Returns true if `headers` carry the expected secret.
///
/// An empty `expected_key` never authorizes.
#[must_use]
pub fn is_authorized(headers: &HeaderMap, expected_key: &str) -> bool {
    if expected_key.is_empty() {
        warn!("Gateway key is not configured, rejecting call");
        return false;
    }

    let Some(encoded) = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Basic "))
    else {
        warn!("Missing or malformed Authorization header");
        return false;
    };

    let Some((login, key)) = STANDARD
        .decode(encoded.trim())
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .and_then(|decoded| {
            decoded
                .split_once(':')
                .map(|(login, key)| (login.to_string(), key.to_string()))
        })
    else {
        warn!("Undecodable Authorization credentials");
        return false;
    };

    if key == expected_key {
        true
    } else {
        warn!(login = %login, "Invalid gateway key");
        false
    }
}
