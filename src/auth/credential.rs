//! Bearer credential extraction
//!
//! Browser WebSocket clients cannot set headers on the upgrade request, so
//! the connection endpoint also accepts the token as a `token` query
//! parameter. The header wins when both are present.

use axum::http::{header::AUTHORIZATION, HeaderMap};

/// Token from an `Authorization: Bearer <token>` header
pub fn bearer_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

/// Token from the header, falling back to the query parameter
pub fn credential_from_request(headers: &HeaderMap, query_token: Option<&str>) -> Option<String> {
    bearer_from_headers(headers).or_else(|| {
        query_token
            .map(|t| t.strip_prefix("Bearer ").unwrap_or(t).trim())
            .filter(|t| !t.is_empty())
            .map(str::to_string)
    })
}
