//! Blob and upload-session endpoints (`blobs/*`, §4.8's sub-path routing table):
//! the monolithic-push shortcut and resumable-chunk semantics from §4.3.
use std::collections::HashMap;

use axum::body::StreamBody;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use uuid::Uuid;

use registry_core::registry::{Blob, BlobStore, BlobWriter, RepositoryStore, UploadSession, UploadSessionStore};
use registry_core::ContentRange;
use registry_core::OciDigest;

use crate::errors::{Error, Result};

fn docker_digest_header(digest: &OciDigest) -> Result<(HeaderName, HeaderValue)> {
    Ok((
        HeaderName::from_static("docker-content-digest"),
        HeaderValue::from_str(&digest.to_string())?,
    ))
}

fn location_header(repo: &str, suffix: &str) -> Result<(HeaderName, HeaderValue)> {
    Ok((
        header::LOCATION,
        HeaderValue::from_str(&format!("/v2/{repo}/blobs/{suffix}"))?,
    ))
}

fn upload_uuid_header(uuid: &Uuid) -> Result<(HeaderName, HeaderValue)> {
    Ok((
        HeaderName::from_static("docker-upload-uuid"),
        HeaderValue::from_str(&uuid.to_string())?,
    ))
}

fn range_header(last_range_end: i64) -> Option<(HeaderName, HeaderValue)> {
    if last_range_end < 0 {
        return None;
    }
    HeaderValue::from_str(&format!("0-{last_range_end}"))
        .ok()
        .map(|v| (header::RANGE, v))
}

fn content_length_value(n: u64) -> Result<HeaderValue> {
    Ok(HeaderValue::from_str(&n.to_string())?)
}

/// Dispatch one `blobs/*` sub-path (everything after the `blobs/` marker, §4.8).
pub async fn dispatch<R: RepositoryStore>(
    repo: &R,
    repo_name: &str,
    method: &Method,
    sub_path: &str,
    query: &HashMap<String, String>,
    headers: &HeaderMap,
    body: Bytes,
) -> Result<Response> {
    if sub_path == "uploads" || sub_path == "uploads/" {
        return match *method {
            Method::POST => initiate_upload(repo, repo_name, query, headers, body).await,
            _ => Err(Error::MethodNotAllowed),
        };
    }

    if let Some(rest) = sub_path.strip_prefix("uploads/") {
        let uuid = Uuid::parse_str(rest)
            .map_err(|_| registry_core::BlobError::UploadUnknown(Some(rest.to_string())))?;
        return match *method {
            Method::PATCH => append_chunk(repo, repo_name, uuid, headers, body).await,
            Method::PUT => complete_upload(repo, repo_name, uuid, query, headers, body).await,
            Method::DELETE => cancel_upload(repo, uuid).await,
            Method::GET => upload_status(repo, repo_name, uuid).await,
            _ => Err(Error::MethodNotAllowed),
        };
    }

    let digest: OciDigest = sub_path.try_into().map_err(registry_core::BlobError::from)?;
    match *method {
        Method::HEAD => head_blob(repo, &digest).await,
        Method::GET => get_blob(repo, &digest).await,
        Method::DELETE => delete_blob(repo, repo_name, &digest).await,
        _ => Err(Error::MethodNotAllowed),
    }
}

async fn head_blob<R: RepositoryStore>(repo: &R, digest: &OciDigest) -> Result<Response> {
    let blob_store = repo.get_blob_store();
    match blob_store.head(digest).await.map_err(Into::into)? {
        Some(blob) => {
            let mut headers = HeaderMap::new();
            let (n, v) = docker_digest_header(digest)?;
            headers.insert(n, v);
            headers.insert(header::CONTENT_LENGTH, content_length_value(blob.bytes_on_disk())?);
            headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/octet-stream"));
            Ok((StatusCode::OK, headers).into_response())
        }
        None => Err(registry_core::BlobError::BlobUnknown(Some(digest.to_string())).into()),
    }
}

async fn get_blob<R: RepositoryStore>(repo: &R, digest: &OciDigest) -> Result<Response> {
    let blob_store = repo.get_blob_store();
    match blob_store.get(digest).await.map_err(Into::into)? {
        Some((blob, body)) => {
            let mut headers = HeaderMap::new();
            let (n, v) = docker_digest_header(digest)?;
            headers.insert(n, v);
            headers.insert(header::CONTENT_LENGTH, content_length_value(blob.bytes_on_disk())?);
            headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/octet-stream"));
            Ok((StatusCode::OK, headers, StreamBody::new(body)).into_response())
        }
        None => Err(registry_core::BlobError::BlobUnknown(Some(digest.to_string())).into()),
    }
}

async fn delete_blob<R: RepositoryStore>(repo: &R, repo_name: &str, digest: &OciDigest) -> Result<Response> {
    let mut blob_store = repo.get_blob_store();
    blob_store.delete(digest).await.map_err(Into::into)?;
    tracing::info!(repository = repo_name, digest = %digest, "blob deleted");
    Ok(StatusCode::ACCEPTED.into_response())
}

async fn initiate_upload<R: RepositoryStore>(
    repo: &R,
    repo_name: &str,
    query: &HashMap<String, String>,
    headers: &HeaderMap,
    body: Bytes,
) -> Result<Response> {
    // Cross-repository mount (§4.3, §8 scenario 5): try the zero-copy path first,
    // falling back to a normal upload session if the blob isn't present at the
    // source.
    if let (Some(digest_str), Some(from)) = (query.get("mount"), query.get("from")) {
        let digest: OciDigest = digest_str.as_str().try_into().map_err(registry_core::BlobError::from)?;
        let mut blob_store = repo.get_blob_store();
        if blob_store.mount(&digest, from).await.map_err(Into::into)? {
            let mut response_headers = HeaderMap::new();
            let (n, v) = docker_digest_header(&digest)?;
            response_headers.insert(n, v);
            let (n, v) = location_header(repo_name, &digest.to_string())?;
            response_headers.insert(n, v);
            return Ok((StatusCode::CREATED, response_headers).into_response());
        }
        // fall through to a normal session per the mount-fallback contract
    }

    // Monolithic push shortcut (§4.3): POST with a body and an asserted digest
    // skips the upload-session machinery entirely.
    if let Some(digest_str) = query.get("digest") {
        let digest: OciDigest = digest_str.as_str().try_into().map_err(registry_core::BlobError::from)?;
        let content_length = content_length_from(headers, body.len() as u64);
        let mut blob_store = repo.get_blob_store();
        blob_store
            .put(&digest, content_length, body.into())
            .await
            .map_err(Into::into)?;
        let mut response_headers = HeaderMap::new();
        let (n, v) = docker_digest_header(&digest)?;
        response_headers.insert(n, v);
        let (n, v) = location_header(repo_name, &digest.to_string())?;
        response_headers.insert(n, v);
        return Ok((StatusCode::CREATED, response_headers).into_response());
    }

    let session_store = repo.get_upload_session_store();
    let session = session_store.new_upload_session().await.map_err(Into::into)?;
    let mut response_headers = HeaderMap::new();
    let (n, v) = location_header(repo_name, &format!("uploads/{}", session.uuid()))?;
    response_headers.insert(n, v);
    let (n, v) = upload_uuid_header(session.uuid())?;
    response_headers.insert(n, v);
    response_headers.insert(header::RANGE, HeaderValue::from_static("0-0"));
    Ok((StatusCode::ACCEPTED, response_headers).into_response())
}

fn content_length_from(headers: &HeaderMap, fallback: u64) -> u64 {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .unwrap_or(fallback)
}

async fn append_chunk<R: RepositoryStore>(
    repo: &R,
    repo_name: &str,
    uuid: Uuid,
    headers: &HeaderMap,
    body: Bytes,
) -> Result<Response> {
    let start = match headers.get(header::CONTENT_RANGE) {
        Some(v) => {
            let s = v.to_str().map_err(|_| Error::MissingHeader("content-range"))?;
            Some(ContentRange::parse(s).map_err(registry_core::BlobError::from)?.start)
        }
        None => None,
    };

    let content_length = content_length_from(headers, body.len() as u64);
    let blob_store = repo.get_blob_store();
    let writer = blob_store.resume(&uuid, start).await.map_err(Into::into)?;
    let session = writer.write(content_length, body.into()).await.map_err(Into::into)?;

    let mut response_headers = HeaderMap::new();
    let (n, v) = location_header(repo_name, &format!("uploads/{uuid}"))?;
    response_headers.insert(n, v);
    let (n, v) = upload_uuid_header(&uuid)?;
    response_headers.insert(n, v);
    if let Some((n, v)) = range_header(session.last_range_end()) {
        response_headers.insert(n, v);
    }
    Ok((StatusCode::ACCEPTED, response_headers).into_response())
}

async fn complete_upload<R: RepositoryStore>(
    repo: &R,
    repo_name: &str,
    uuid: Uuid,
    query: &HashMap<String, String>,
    headers: &HeaderMap,
    body: Bytes,
) -> Result<Response> {
    let digest_str = query.get("digest").ok_or(Error::MissingQueryParameter("digest"))?;
    let digest: OciDigest = digest_str.as_str().try_into().map_err(registry_core::BlobError::from)?;

    let blob_store = repo.get_blob_store();
    if !body.is_empty() {
        let content_length = content_length_from(headers, body.len() as u64);
        let writer = blob_store.resume(&uuid, None).await.map_err(Into::into)?;
        writer.write(content_length, body.into()).await.map_err(Into::into)?;
    }
    let writer = blob_store.resume(&uuid, None).await.map_err(Into::into)?;
    writer.finalize(&digest).await.map_err(Into::into)?;

    let mut response_headers = HeaderMap::new();
    let (n, v) = docker_digest_header(&digest)?;
    response_headers.insert(n, v);
    let (n, v) = location_header(repo_name, &digest.to_string())?;
    response_headers.insert(n, v);
    Ok((StatusCode::CREATED, response_headers).into_response())
}

async fn cancel_upload<R: RepositoryStore>(repo: &R, uuid: Uuid) -> Result<Response> {
    let session_store = repo.get_upload_session_store();
    session_store.delete_session(&uuid).await.map_err(Into::into)?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

async fn upload_status<R: RepositoryStore>(repo: &R, repo_name: &str, uuid: Uuid) -> Result<Response> {
    let session_store = repo.get_upload_session_store();
    let session = session_store.get_upload_session(&uuid).await.map_err(Into::into)?;
    let mut response_headers = HeaderMap::new();
    let (n, v) = location_header(repo_name, &format!("uploads/{uuid}"))?;
    response_headers.insert(n, v);
    let (n, v) = upload_uuid_header(&uuid)?;
    response_headers.insert(n, v);
    if let Some((n, v)) = range_header(session.last_range_end()) {
        response_headers.insert(n, v);
    } else {
        response_headers.insert(header::RANGE, HeaderValue::from_static("0-0"));
    }
    Ok((StatusCode::NO_CONTENT, response_headers).into_response())
}
