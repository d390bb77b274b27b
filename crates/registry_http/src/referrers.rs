//! Referrers endpoint (`GET .../referrers/<digest>`, OCI 1.1 §4.6 extension).
use std::collections::HashMap;

use axum::response::{IntoResponse, Response};
use axum::Json;
use http::header::{self, HeaderMap, HeaderName, HeaderValue};
use http::StatusCode;
use oci_spec::image::MediaType;

use registry_core::registry::{ManifestStore, RepositoryStore};
use registry_core::OciDigest;

use crate::errors::{Error, Result};

pub async fn get<R: RepositoryStore>(
    repo: &R,
    digest: &str,
    query: &HashMap<String, String>,
) -> Result<Response> {
    let oci_digest: OciDigest = digest.try_into().map_err(registry_core::ManifestError::from)?;
    let artifact_type = query.get("artifactType").cloned();

    let manifest_store = repo.get_manifest_store();
    let index = manifest_store
        .get_referrers(&oci_digest, artifact_type.clone())
        .await
        .map_err(Into::into)?;

    let mut response_headers = HeaderMap::new();
    response_headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&MediaType::ImageIndex.to_string())?,
    );
    if let Some(artifact_type) = &artifact_type {
        response_headers.insert(
            HeaderName::from_static("oci-filters-applied"),
            HeaderValue::from_str(artifact_type).map_err(Error::from)?,
        );
    }

    Ok((StatusCode::OK, response_headers, Json(index)).into_response())
}
