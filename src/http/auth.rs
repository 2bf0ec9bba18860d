//! Token extraction.
//!
//! Tokens come from `Authorization: Bearer <token>`, falling back to the
//! `access_token` query parameter when the header is absent or uses
//! another scheme. An empty token counts as missing.

use std::sync::Arc;

use axum::http::{header, HeaderMap, Uri};

use crate::http::error::AuthError;
use crate::registry::{Endpoint, Registry};

const BEARER_PREFIX: &str = "Bearer ";

/// Pull the caller's token out of the request.
pub fn extract_token(headers: &HeaderMap, uri: &Uri) -> Result<String, AuthError> {
    let from_header = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix(BEARER_PREFIX))
        .map(str::to_string);

    let token = match from_header {
        Some(token) => token,
        None => uri
            .query()
            .and_then(|q| {
                url::form_urlencoded::parse(q.as_bytes())
                    .find(|(k, _)| k == "access_token")
                    .map(|(_, v)| v.into_owned())
            })
            .unwrap_or_default(),
    };

    if token.is_empty() {
        return Err(AuthError::MissingToken);
    }
    Ok(token)
}

/// Resolve the endpoint a homeserver or sync proxy push is for.
pub fn authenticate_inbound(
    registry: &Registry,
    headers: &HeaderMap,
    uri: &Uri,
) -> Result<Arc<Endpoint>, AuthError> {
    let token = extract_token(headers, uri)?;
    registry
        .lookup_by_inbound_token(&token)
        .cloned()
        .ok_or(AuthError::UnknownToken)
}

/// Resolve the endpoint a bridge websocket belongs to.
pub fn authenticate_outbound(
    registry: &Registry,
    headers: &HeaderMap,
    uri: &Uri,
) -> Result<Arc<Endpoint>, AuthError> {
    let token = extract_token(headers, uri)?;
    registry
        .lookup_by_outbound_token(&token)
        .cloned()
        .ok_or(AuthError::UnknownToken)
}
