//! Token Exchange (C9): `/v2/auth` trades Basic auth credentials for a short-lived
//! bearer token consumable by the rest of the `/v2` tree, matching the
//! distribution token spec's response shape (§4.9/§6).
use axum::response::{IntoResponse, Response};
use http::{header, HeaderMap, StatusCode};
use serde::Serialize;

use registry_core::collab::UserService;

use crate::auth::basic_auth;
use crate::errors::unauthorized_response;

#[derive(Debug, Serialize)]
struct TokenResponse {
    /// Present for legacy clients that only understand the pre-OAuth2 field name.
    token: String,
    access_token: String,
    expires_in: u64,
    issued_at: String,
}

/// `GET|POST /v2/auth`: exchange Basic credentials for a bearer token. A password
/// beginning with the long-lived-token prefix is validated as a token directly,
/// without consulting username/password login, per §4.9; username may be any
/// non-empty string in that case since distribution clients always send one.
pub async fn exchange(headers: HeaderMap, users: &dyn UserService, realm: &str) -> Response {
    let Some(raw) = headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok()) else {
        return unauthorized_response(realm);
    };
    let Some(creds) = basic_auth(raw.as_bytes()) else {
        return unauthorized_response(realm);
    };

    let pair = if let Some(identity) = users.validate_long_lived_token(&creds.password).await {
        users.issue_short_lived(&identity.user_id).await
    } else {
        match users.login_password(&creds.username, &creds.password).await {
            Some(pair) => pair,
            None => return unauthorized_response(realm),
        }
    };

    (
        StatusCode::OK,
        axum::Json(TokenResponse {
            token: pair.token,
            access_token: pair.access_token,
            expires_in: pair.expires_in,
            issued_at: pair.issued_at,
        }),
    )
        .into_response()
}
