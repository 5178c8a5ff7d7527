//! Endpoint URL construction.

/// Append the auth token to the chat endpoint as a `token` query parameter.
#[must_use]
pub fn endpoint_url(base: &str, token: &str) -> String {
    let separator = if base.contains('?') { '&' } else { '?' };
    format!("{base}{separator}token={}", urlencoding::encode(token))
}
