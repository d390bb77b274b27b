//! # Registry HTTP
//!
//! `registry_http` implements the OCI Distribution Specification v2 HTTP surface
//! generic over the traits defined in [`registry_core`], wiring the Authorization
//! Gate (C7), Token Exchange (C9), Side-effect Hooks (C10), and Audit Recorder (C11)
//! around whatever [`registry_core::registry::RepositoryStoreManager`] a caller
//! supplies.
//!
//! Repository names in this spec may themselves contain slashes (`library/nginx`),
//! which rules out axum's ordinary single-segment `:repository` path parameter.
//! Instead the whole `/v2/<name>/<verb-path>` tail is captured as one wildcard
//! segment and split on the first occurrence of `/manifests/`, `/blobs/`, or
//! `/tags/`, per §4.8. The Referrers endpoint has no marker of its own --
//! `manifests/<digest>/referrers` is recognized by its `/referrers` suffix once
//! split on `/manifests/`.
use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use axum::routing::{any, get};
use axum::Router;
use bytes::Bytes;
use http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::{self, TraceLayer};

mod errors;
pub use errors::Error;
pub use errors::Result;

pub mod auth;
pub mod blobs;
pub mod catalog;
pub mod manifests;
pub mod referrers;
pub mod tags;
pub mod token;

mod audit;
pub use audit::RequestContext;

use registry_core::audit::AuditSink;
use registry_core::collab::{ProjectService, UserService, Verb};
use registry_core::hooks::RegistryHooks;
use registry_core::registry::RepositoryStoreManager;

/// Everything `registry_http` needs beyond the repository backend itself: the
/// collaborator services named in §6, plus operating mode.
#[derive(Clone)]
pub struct Registry<M: RepositoryStoreManager> {
    manager: M,
    hooks: Arc<dyn RegistryHooks>,
    audit: Arc<dyn AuditSink>,
    users: Arc<dyn UserService>,
    projects: Arc<dyn ProjectService>,
    /// §4.7 step 1: admit unauthenticated callers outright. Only appropriate for a
    /// single-machine embedding with no externally reachable network interface.
    dev_mode: bool,
    /// Advertised in the `WWW-Authenticate: Bearer realm="..."` challenge and as the
    /// `/v2/auth` endpoint clients should hit (§4.9).
    realm: String,
}

impl<M: RepositoryStoreManager> Registry<M> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        manager: M,
        hooks: Arc<dyn RegistryHooks>,
        audit: Arc<dyn AuditSink>,
        users: Arc<dyn UserService>,
        projects: Arc<dyn ProjectService>,
        dev_mode: bool,
        realm: String,
    ) -> Self {
        Self {
            manager,
            hooks,
            audit,
            users,
            projects,
            dev_mode,
            realm,
        }
    }

    /// Return an [`axum::Router`] implementing the full `/v2` tree.
    pub fn router(self) -> Router {
        Router::new()
            .route("/v2/", get(version))
            .route("/v2/auth", get(auth_exchange::<M>).post(auth_exchange::<M>))
            .route("/v2/_catalog", get(catalog_list::<M>))
            .route("/v2/*rest", any(dispatch::<M>))
            .layer(axum::extract::DefaultBodyLimit::disable())
            .layer(
                TraceLayer::new_for_http()
                    .make_span_with(trace::DefaultMakeSpan::new().include_headers(true))
                    .on_response(trace::DefaultOnResponse::new())
                    .on_request(trace::DefaultOnRequest::new()),
            )
            .layer(SetResponseHeaderLayer::if_not_present(
                HeaderName::from_static("docker-distribution-api-version"),
                HeaderValue::from_static("registry/2.0"),
            ))
            .with_state(self)
    }
}

async fn version() -> Result<Response> {
    let mut response_headers = HeaderMap::new();
    response_headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
    Ok((StatusCode::OK, response_headers, "{}").into_response())
}

async fn auth_exchange<M: RepositoryStoreManager>(
    State(registry): State<Registry<M>>,
    headers: HeaderMap,
) -> Response {
    token::exchange(headers, registry.users.as_ref(), &registry.realm).await
}

async fn catalog_list<M: RepositoryStoreManager>(
    State(registry): State<Registry<M>>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    match catalog::list(&registry.manager, &query).await {
        Ok(r) => r,
        Err(e) => e.into_response(),
    }
}

/// One of the three sub-path markers a `/v2/<name>/<...>` tail can be split on, per
/// §4.8. Order matters only in that no marker is a substring of another. The
/// Referrers endpoint (`manifests/<digest>/referrers`) lives under the
/// `/manifests/` marker, distinguished by its `/referrers` suffix once split.
const MARKERS: [&str; 3] = ["/manifests/", "/blobs/", "/tags/"];

struct SplitPath {
    repository: String,
    kind: &'static str,
    sub_path: String,
}

fn split_repository_path(path: &str) -> Result<SplitPath> {
    for marker in MARKERS {
        if let Some(idx) = path.find(marker) {
            return Ok(SplitPath {
                repository: path[..idx].to_string(),
                kind: marker.trim_matches('/'),
                sub_path: path[idx + marker.len()..].to_string(),
            });
        }
    }
    Err(Error::MalformedPath)
}

fn verb_for(method: &Method, kind: &str) -> Verb {
    if *method == Method::DELETE {
        Verb::Delete
    } else if kind == "tags" || *method == Method::GET || *method == Method::HEAD {
        Verb::Pull
    } else {
        Verb::Push
    }
}

fn action_name(kind: &str, sub_path: &str, method: &Method) -> &'static str {
    if kind == "manifests" && sub_path.ends_with("/referrers") {
        return "GetReferrers";
    }
    match (kind, *method) {
        ("manifests", Method::GET) => "GetManifest",
        ("manifests", Method::HEAD) => "HeadManifest",
        ("manifests", Method::PUT) => "PutManifest",
        ("manifests", Method::DELETE) => "DeleteManifest",
        ("blobs", Method::GET) => "GetBlob",
        ("blobs", Method::HEAD) => "HeadBlob",
        ("blobs", Method::POST) => "InitiateBlobUpload",
        ("blobs", Method::PATCH) => "PatchBlobUpload",
        ("blobs", Method::PUT) => "CompleteBlobUpload",
        ("blobs", Method::DELETE) => "DeleteBlob",
        ("tags", _) => "ListTags",
        _ => "Unknown",
    }
}

/// Dispatch one `/v2/<name>/<verb-path>` request: resolve the caller's identity,
/// apply the Authorization Gate (§4.7), resolve or implicitly create the named
/// repository, dispatch into the per-domain handler, and record an audit entry for
/// the attempt regardless of outcome (§4.11).
async fn dispatch<M: RepositoryStoreManager>(
    State(registry): State<Registry<M>>,
    method: Method,
    uri: Uri,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let path = uri.path().strip_prefix("/v2/").unwrap_or_default();
    let split = match split_repository_path(path) {
        Ok(s) => s,
        Err(e) => return e.into_response(),
    };

    let verb = verb_for(&method, split.kind);
    let action = action_name(split.kind, &split.sub_path, &method);
    let identity = auth::extract_identity(&headers, registry.users.as_ref()).await;
    let user_id = identity.as_ref().map(|i| i.user_id.clone());
    let username = identity.as_ref().map(|i| i.username.clone());
    let ctx = RequestContext::from_headers(&headers, user_id.clone());

    let decision = auth::authorize(
        identity.as_ref(),
        registry.projects.as_ref(),
        &split.repository,
        verb,
        registry.dev_mode,
    )
    .await;

    match decision {
        auth::Decision::Admit => {}
        auth::Decision::Deny => {
            audit::record(
                registry.audit.as_ref(),
                &ctx,
                action,
                &method,
                &split.repository,
                None,
                None,
                false,
                Some("denied".to_string()),
            )
            .await;
            return Error::Unauthorized {
                realm: registry.realm.clone(),
            }
            .into_response();
        }
        auth::Decision::NotFound => {
            audit::record(
                registry.audit.as_ref(),
                &ctx,
                action,
                &method,
                &split.repository,
                None,
                None,
                false,
                Some("project not found".to_string()),
            )
            .await;
            return Error::Repository(registry_core::RepositoryError::NameUnknown(split.repository.clone()))
                .into_response();
        }
    }

    let result = run::<M>(
        &registry,
        verb,
        &method,
        &split,
        &query,
        &headers,
        body,
        user_id.as_deref(),
        username.as_deref(),
    )
    .await;

    let (response, error) = match result {
        Ok(r) => (r, None),
        Err(e) => {
            let msg = e.to_string();
            (e.into_response(), Some(msg))
        }
    };

    let offsets = headers
        .get(header::CONTENT_RANGE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    audit::record(
        registry.audit.as_ref(),
        &ctx,
        action,
        &method,
        &split.repository,
        Some(split.sub_path.clone()),
        offsets,
        error.is_none(),
        error,
    )
    .await;

    response
}

#[allow(clippy::too_many_arguments)]
async fn run<M: RepositoryStoreManager>(
    registry: &Registry<M>,
    verb: Verb,
    method: &Method,
    split: &SplitPath,
    query: &HashMap<String, String>,
    headers: &HeaderMap,
    body: Bytes,
    user_id: Option<&str>,
    username: Option<&str>,
) -> Result<Response> {
    let repo = match registry.manager.get(&split.repository).await.map_err(Into::into)? {
        Some(repo) => repo,
        None if verb == Verb::Push => registry.manager.create(&split.repository).await.map_err(Into::into)?,
        None => {
            return Err(registry_core::RepositoryError::NameUnknown(split.repository.clone()).into());
        }
    };

    match split.kind {
        "blobs" => blobs::dispatch(&repo, &split.repository, method, &split.sub_path, query, headers, body).await,
        "manifests" => {
            if let Some(digest) = split.sub_path.strip_suffix("/referrers") {
                return referrers::get(&repo, digest, query).await;
            }
            manifests::dispatch(
                &repo,
                &split.repository,
                method,
                &split.sub_path,
                headers,
                registry.hooks.as_ref(),
                user_id,
                username,
                body,
            )
            .await
        }
        "tags" if split.sub_path == "list" => tags::list(&repo, &split.repository, query).await,
        _ => Err(Error::MalformedPath),
    }
}
