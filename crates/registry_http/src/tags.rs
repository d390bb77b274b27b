//! Tag listing endpoint (`GET .../tags/list`, §4.6).
use std::collections::HashMap;

use axum::response::{IntoResponse, Response};
use axum::Json;
use http::{header, HeaderMap, HeaderValue, StatusCode};

use registry_core::registry::{ManifestStore, RepositoryStore};

use crate::errors::Result;

pub async fn list<R: RepositoryStore>(repo: &R, repo_name: &str, query: &HashMap<String, String>) -> Result<Response> {
    let n = query.get("n").and_then(|v| v.parse::<i64>().ok());
    let last = query.get("last").cloned();

    let manifest_store = repo.get_manifest_store();
    let (tags, has_more) = manifest_store.get_tags(n, last).await.map_err(Into::into)?;

    let mut headers = HeaderMap::new();
    // Same has-more-beyond-this-page convention as Catalog (§4.6); `has_more` is
    // decided by `paginate` itself, not by comparing the page length to `n`.
    if let Some(n) = n {
        if has_more {
            if let Some(last) = tags.tags().last() {
                if let Ok(v) =
                    HeaderValue::from_str(&format!(r#"</v2/{repo_name}/tags/list?n={n}&last={last}>; rel="next""#))
                {
                    headers.insert(header::LINK, v);
                }
            }
        }
    }

    Ok((StatusCode::OK, headers, Json(tags)).into_response())
}
