//! Catalog & Listing endpoint (`GET /v2/_catalog`, C6/§4.6).
use std::collections::HashMap;

use axum::response::{IntoResponse, Response};
use axum::Json;
use http::{header, HeaderMap, HeaderValue, StatusCode};

use registry_core::registry::RepositoryStoreManager;

use crate::errors::Result;

pub async fn list<M: RepositoryStoreManager>(manager: &M, query: &HashMap<String, String>) -> Result<Response> {
    let n = query.get("n").and_then(|v| v.parse::<i64>().ok());
    let last = query.get("last").cloned();

    let catalog = manager.catalog(n, last).await.map_err(Into::into)?;

    let mut headers = HeaderMap::new();
    // §4.6: repositories beyond this page signal `next` via a `Link` header
    // pointing at `last=<lastReturned>`, the convention distribution clients
    // already know how to follow. Whether more exist is decided by `paginate`
    // itself (§8: `n=len(all)` must return all with no `next`), not by comparing
    // the returned page length to `n`.
    if let Some(n) = n {
        if catalog.has_more {
            if let Some(last) = catalog.repositories.last() {
                if let Ok(v) = HeaderValue::from_str(&format!(r#"</v2/_catalog?n={n}&last={last}>; rel="next""#)) {
                    headers.insert(header::LINK, v);
                }
            }
        }
    }

    Ok((StatusCode::OK, headers, Json(catalog)).into_response())
}
