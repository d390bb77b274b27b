//! Manifest endpoints (`manifests/<reference>`, §4.4/§4.5).
//!
//! A `PUT` against a tag name feeds the Tag Index (C5) as a side effect of
//! `ManifestStore::put`; the immutable-tag rejection and the hook/audit fan-out
//! both happen here rather than in `registry_backend`, since they're dispatch
//! concerns, not storage concerns.
use std::str::FromStr;

use axum::body::StreamBody;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use http::header::{self, HeaderMap, HeaderName, HeaderValue};
use http::{Method, StatusCode};

use registry_core::hooks::{ManifestEvent, RegistryHooks};
use registry_core::registry::{Manifest, ManifestRef, ManifestSpec, ManifestStore, RepositoryStore};
use registry_core::OciDigest;

use crate::errors::{Error, Result};

fn digest_header(digest: &OciDigest) -> Result<(HeaderName, HeaderValue)> {
    Ok((
        HeaderName::from_static("docker-content-digest"),
        HeaderValue::from_str(&digest.to_string())?,
    ))
}

fn content_type_header(media_type: &Option<oci_spec::image::MediaType>) -> Option<(HeaderName, HeaderValue)> {
    let mt = media_type.as_ref()?;
    HeaderValue::from_str(&mt.to_string())
        .ok()
        .map(|v| (header::CONTENT_TYPE, v))
}

pub async fn dispatch<R: RepositoryStore>(
    repo: &R,
    repo_name: &str,
    method: &Method,
    reference: &str,
    headers: &HeaderMap,
    hooks: &dyn RegistryHooks,
    user_id: Option<&str>,
    username: Option<&str>,
    body: Bytes,
) -> Result<Response> {
    let key = ManifestRef::from_str(reference).map_err(registry_core::ManifestError::from)?;
    match *method {
        Method::HEAD => head(repo, &key).await,
        Method::GET => get(repo, &key).await,
        Method::PUT => put(repo, repo_name, &key, reference, headers, hooks, user_id, username, body).await,
        Method::DELETE => delete(repo, repo_name, &key, reference, hooks, user_id, username).await,
        _ => Err(Error::MethodNotAllowed),
    }
}

async fn head<R: RepositoryStore>(repo: &R, key: &ManifestRef) -> Result<Response> {
    let manifest_store = repo.get_manifest_store();
    match manifest_store.head(key).await.map_err(Into::into)? {
        Some(m) => {
            let mut response_headers = HeaderMap::new();
            let (n, v) = digest_header(m.digest())?;
            response_headers.insert(n, v);
            response_headers.insert(
                header::CONTENT_LENGTH,
                HeaderValue::from_str(&m.bytes_on_disk().to_string())?,
            );
            if let Some((n, v)) = content_type_header(m.media_type()) {
                response_headers.insert(n, v);
            }
            Ok((StatusCode::OK, response_headers).into_response())
        }
        None => Err(registry_core::ManifestError::ManifestUnknown(None).into()),
    }
}

async fn get<R: RepositoryStore>(repo: &R, key: &ManifestRef) -> Result<Response> {
    let manifest_store = repo.get_manifest_store();
    match manifest_store.get(key).await.map_err(Into::into)? {
        Some((m, body)) => {
            let mut response_headers = HeaderMap::new();
            let (n, v) = digest_header(m.digest())?;
            response_headers.insert(n, v);
            response_headers.insert(
                header::CONTENT_LENGTH,
                HeaderValue::from_str(&m.bytes_on_disk().to_string())?,
            );
            if let Some((n, v)) = content_type_header(m.media_type()) {
                response_headers.insert(n, v);
            }
            Ok((StatusCode::OK, response_headers, StreamBody::new(body)).into_response())
        }
        None => Err(registry_core::ManifestError::ManifestUnknown(None).into()),
    }
}

#[allow(clippy::too_many_arguments)]
async fn put<R: RepositoryStore>(
    repo: &R,
    repo_name: &str,
    key: &ManifestRef,
    reference: &str,
    headers: &HeaderMap,
    hooks: &dyn RegistryHooks,
    user_id: Option<&str>,
    username: Option<&str>,
    body: Bytes,
) -> Result<Response> {
    let mut spec = ManifestSpec::try_from(&body).map_err(|e| {
        tracing::warn!("error deserializing manifest: {e:?}");
        registry_core::Error::DistributionSpecError(registry_core::DistributionErrorCode::ManifestInvalid)
    })?;

    match (spec.media_type(), headers.get(header::CONTENT_TYPE)) {
        (Some(_), None) => {
            // Clients that neglect to set Content-Type despite the manifest naming its
            // own mediaType aren't worth rejecting over; the manifest is still usable.
            tracing::warn!("client neglected to include content type in header");
        }
        (Some(mt), Some(ct)) => {
            if let Ok(ct) = ct.to_str() {
                if mt != ct.into() {
                    return Err(registry_core::ManifestError::ManifestInvalid(None).into());
                }
            }
        }
        (None, Some(ct)) => {
            if let Ok(ct) = ct.to_str() {
                spec.set_media_type(ct);
            }
        }
        (None, None) => {
            spec.infer_media_type().map_err(|_| registry_core::ManifestError::ManifestInvalid(None))?;
        }
    }

    let mut manifest_store = repo.get_manifest_store();
    let size = body.len() as u64;
    let digest = manifest_store.put(key, &spec, body).await.map_err(Into::into)?;

    hooks
        .on_manifest_put(&ManifestEvent {
            repository: repo_name.to_string(),
            reference: reference.to_string(),
            digest: digest.to_string(),
            size,
            user_id: user_id.map(str::to_string),
            username: username.map(str::to_string),
        })
        .await;

    let mut response_headers = HeaderMap::new();
    response_headers.insert(
        header::LOCATION,
        HeaderValue::from_str(&format!("/v2/{repo_name}/manifests/{reference}"))?,
    );
    let (n, v) = digest_header(&digest)?;
    response_headers.insert(n, v);
    if let Some(subject) = spec.subject() {
        if let Ok(v) = HeaderValue::from_str(subject.digest().as_str()) {
            response_headers.insert(HeaderName::from_static("oci-subject"), v);
        }
    }

    Ok((StatusCode::CREATED, response_headers).into_response())
}

async fn delete<R: RepositoryStore>(
    repo: &R,
    repo_name: &str,
    key: &ManifestRef,
    reference: &str,
    hooks: &dyn RegistryHooks,
    user_id: Option<&str>,
    username: Option<&str>,
) -> Result<Response> {
    let mut manifest_store = repo.get_manifest_store();
    let existing = manifest_store.head(key).await.map_err(Into::into)?;
    manifest_store.delete(key).await.map_err(Into::into)?;

    hooks
        .on_manifest_delete(&ManifestEvent {
            repository: repo_name.to_string(),
            reference: reference.to_string(),
            digest: existing.map(|m| m.digest().to_string()).unwrap_or_default(),
            size: 0,
            user_id: user_id.map(str::to_string),
            username: username.map(str::to_string),
        })
        .await;

    Ok(StatusCode::ACCEPTED.into_response())
}
