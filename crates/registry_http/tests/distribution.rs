//! In-process HTTP integration tests exercising the full `/v2` tree against a
//! filesystem-backed `registry_backend::Manager`, via `tower::ServiceExt::oneshot`
//! (no socket, no separate process). Covers the literal end-to-end scenarios named
//! in `spec.md` §8.
use std::sync::Arc;

use axum::body::Body;
use axum::Router;
use http::{header, Request, StatusCode};
use serde_json::json;
use tower::ServiceExt;

use registry_backend::standalone::{InMemoryProjectService, InMemoryUserService, NoopWebhookDispatcher, StandaloneHooks};
use registry_backend::ManagerConfig;
use registry_core::audit::TracingAuditSink;
use registry_objectstore::fs::FsConfig;
use registry_objectstore::Config as ObjectsConfig;
use registry_http::Registry;

const EMPTY_DIGEST: &str = "sha256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";
const HELLOWORLD_DIGEST: &str = "sha256:936a185caaa266bb9cbe981e9e05cb78cd732b0b3280eb944412bb6f8f8f07af";

/// Holds a `TestApp`'s backing temp directory alive for as long as the router is
/// in use.
struct TestApp {
    router: Router,
    projects: Arc<InMemoryProjectService>,
    _tmp: tempfile::TempDir,
}

/// Builds a fresh router over a fresh temp-dir-backed filesystem object store,
/// along with the `InMemoryProjectService` driving it, so tests can pre-seed
/// project visibility before issuing requests.
async fn test_app(dev_mode: bool) -> TestApp {
    let tmp = tempfile::tempdir().expect("tempdir");
    let objects_config = ObjectsConfig::Fs(FsConfig { root: tmp.path().to_path_buf() });
    let manager_config = ManagerConfig { objects: objects_config };
    let manager = manager_config.new_manager().await.expect("new_manager");

    let projects = Arc::new(InMemoryProjectService::default());
    let users: Arc<dyn registry_core::collab::UserService> =
        Arc::new(InMemoryUserService::new("admin".to_string(), vec![]));
    let webhooks: Arc<dyn registry_core::collab::WebhookDispatcher> = Arc::new(NoopWebhookDispatcher);
    let objects = manager_config.objects.new_objects().await.expect("new_objects");
    let hooks: Arc<dyn registry_core::hooks::RegistryHooks> = Arc::new(StandaloneHooks {
        objects,
        projects: projects.clone() as Arc<dyn registry_core::collab::ProjectService>,
        webhooks,
    });
    let audit = Arc::new(TracingAuditSink);

    let registry = Registry::new(
        manager,
        hooks,
        audit,
        users,
        projects.clone() as Arc<dyn registry_core::collab::ProjectService>,
        dev_mode,
        "http://localhost/v2/auth".to_string(),
    );
    TestApp { router: registry.router(), projects, _tmp: tmp }
}

fn image_manifest_bytes(layer_digests: &[&str]) -> Vec<u8> {
    let layers: Vec<_> = layer_digests
        .iter()
        .map(|d| {
            json!({
                "mediaType": "application/vnd.oci.image.layer.v1.tar",
                "size": 0,
                "digest": d,
            })
        })
        .collect();
    let body = json!({
        "schemaVersion": 2,
        "config": {
            "mediaType": "application/vnd.oci.image.config.v1+json",
            "size": 0,
            "digest": EMPTY_DIGEST,
        },
        "layers": layers,
    });
    serde_json::to_vec(&body).unwrap()
}

async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
    hyper::body::to_bytes(response.into_body()).await.unwrap().to_vec()
}

fn signature_manifest_bytes(subject_digest: &str, subject_size: usize) -> Vec<u8> {
    let body = json!({
        "schemaVersion": 2,
        "mediaType": "application/vnd.oci.image.manifest.v1+json",
        "artifactType": "application/vnd.example.signature.v1",
        "config": {
            "mediaType": "application/vnd.oci.empty.v1+json",
            "size": 2,
            "digest": EMPTY_DIGEST,
        },
        "layers": [],
        "subject": {
            "mediaType": "application/vnd.oci.image.manifest.v1+json",
            "size": subject_size,
            "digest": subject_digest,
        },
    });
    serde_json::to_vec(&body).unwrap()
}

/// Scenario 1: monolithic push of zero bytes, asserting the empty-payload digest,
/// followed by a HEAD confirming the blob landed with `Content-Length: 0`.
#[tokio::test]
async fn monolithic_push_empty_blob() {
    let test = test_app(true).await;
    let app = test.router;

    let req = Request::builder()
        .method("POST")
        .uri(format!("/v2/acme/web/blobs/uploads/?digest={EMPTY_DIGEST}"))
        .body(Body::empty())
        .unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    assert_eq!(
        resp.headers().get("docker-content-digest").unwrap().to_str().unwrap(),
        EMPTY_DIGEST
    );
    assert!(resp.headers().get(header::LOCATION).is_some());

    let req = Request::builder()
        .method("HEAD")
        .uri(format!("/v2/acme/web/blobs/{EMPTY_DIGEST}"))
        .body(Body::empty())
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers().get(header::CONTENT_LENGTH).unwrap(), "0");
}

/// Scenario 2: two PATCH chunks ("hello" then "world") against one upload session,
/// each acknowledged with the running `Range`, then a PUT finalizing against the
/// combined digest of "helloworld".
#[tokio::test]
async fn chunked_push_two_patches() {
    let test = test_app(true).await;
    let app = test.router;

    let req = Request::builder()
        .method("POST")
        .uri("/v2/acme/web/blobs/uploads/")
        .body(Body::empty())
        .unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::ACCEPTED);
    let location = resp.headers().get(header::LOCATION).unwrap().to_str().unwrap().to_string();
    let uuid = location.rsplit('/').next().unwrap().to_string();

    let req = Request::builder()
        .method("PATCH")
        .uri(format!("/v2/acme/web/blobs/uploads/{uuid}"))
        .header(header::CONTENT_RANGE, "bytes 0-4/10")
        .header(header::CONTENT_LENGTH, "5")
        .body(Body::from("hello"))
        .unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::ACCEPTED);
    assert_eq!(resp.headers().get(header::RANGE).unwrap(), "0-4");

    let req = Request::builder()
        .method("PATCH")
        .uri(format!("/v2/acme/web/blobs/uploads/{uuid}"))
        .header(header::CONTENT_RANGE, "bytes 5-9/10")
        .header(header::CONTENT_LENGTH, "5")
        .body(Body::from("world"))
        .unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::ACCEPTED);
    assert_eq!(resp.headers().get(header::RANGE).unwrap(), "0-9");

    let req = Request::builder()
        .method("PUT")
        .uri(format!("/v2/acme/web/blobs/uploads/{uuid}?digest={HELLOWORLD_DIGEST}"))
        .body(Body::empty())
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    assert_eq!(
        resp.headers().get("docker-content-digest").unwrap().to_str().unwrap(),
        HELLOWORLD_DIGEST
    );
}

/// Scenario 3: a version-shaped tag accepts its first PUT, rejects a second PUT
/// with different bytes as `ImmutableTag`, and a subsequent GET still returns the
/// original bytes.
#[tokio::test]
async fn immutable_tag_rejects_second_write() {
    let test = test_app(true).await;
    let app = test.router;

    let m1 = image_manifest_bytes(&[]);
    let req = Request::builder()
        .method("PUT")
        .uri("/v2/acme/web/manifests/v1.0.0")
        .body(Body::from(m1.clone()))
        .unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);

    let mut m2 = image_manifest_bytes(&[]);
    m2.extend_from_slice(b" ");
    let req = Request::builder()
        .method("PUT")
        .uri("/v2/acme/web/manifests/v1.0.0")
        .body(Body::from(m2))
        .unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::CONFLICT);

    let req = Request::builder()
        .method("GET")
        .uri("/v2/acme/web/manifests/v1.0.0")
        .body(Body::empty())
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_bytes(resp).await, m1);
}

/// The Referrers endpoint (`manifests/<digest>/referrers`) is reached via a
/// `/manifests/` split plus a `/referrers` suffix check rather than its own marker
/// -- this exercises that routing end to end, along with the `artifactType` filter.
#[tokio::test]
async fn referrers_lists_manifests_pointing_at_subject() {
    let test = test_app(true).await;
    let app = test.router;

    let subject = image_manifest_bytes(&[]);
    let req = Request::builder()
        .method("PUT")
        .uri("/v2/acme/web/manifests/base")
        .body(Body::from(subject.clone()))
        .unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    let subject_digest = resp.headers().get("docker-content-digest").unwrap().to_str().unwrap().to_string();

    let signature = signature_manifest_bytes(&subject_digest, subject.len());
    let req = Request::builder()
        .method("PUT")
        .uri("/v2/acme/web/manifests/sig")
        .body(Body::from(signature.clone()))
        .unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    let signature_digest = resp.headers().get("docker-content-digest").unwrap().to_str().unwrap().to_string();

    let req = Request::builder()
        .method("GET")
        .uri(format!("/v2/acme/web/manifests/{subject_digest}/referrers"))
        .body(Body::empty())
        .unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let index: serde_json::Value = serde_json::from_slice(&body_bytes(resp).await).unwrap();
    let manifests = index["manifests"].as_array().unwrap();
    assert_eq!(manifests.len(), 1);
    assert_eq!(manifests[0]["digest"], signature_digest);
    assert_eq!(manifests[0]["artifactType"], "application/vnd.example.signature.v1");

    let req = Request::builder()
        .method("GET")
        .uri(format!(
            "/v2/acme/web/manifests/{subject_digest}/referrers?artifactType=application/vnd.other.v1"
        ))
        .body(Body::empty())
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let index: serde_json::Value = serde_json::from_slice(&body_bytes(resp).await).unwrap();
    assert!(index["manifests"].as_array().unwrap().is_empty());
}

/// Scenario 4: `latest` (not version-shaped) accepts a second PUT that moves the
/// tag forward, while the original manifest remains addressable by its own digest.
#[tokio::test]
async fn mutable_tag_moves_to_latest_write() {
    let test = test_app(true).await;
    let app = test.router;

    let m1 = image_manifest_bytes(&[]);
    let req = Request::builder()
        .method("PUT")
        .uri("/v2/acme/web/manifests/latest")
        .body(Body::from(m1.clone()))
        .unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    let m1_digest = resp.headers().get("docker-content-digest").unwrap().to_str().unwrap().to_string();

    let mut m2 = image_manifest_bytes(&[]);
    m2.extend_from_slice(b" ");
    let req = Request::builder()
        .method("PUT")
        .uri("/v2/acme/web/manifests/latest")
        .body(Body::from(m2.clone()))
        .unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);

    let req = Request::builder()
        .method("GET")
        .uri("/v2/acme/web/manifests/latest")
        .body(Body::empty())
        .unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_bytes(resp).await, m2);

    let req = Request::builder()
        .method("GET")
        .uri(format!("/v2/acme/web/manifests/{m1_digest}"))
        .body(Body::empty())
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_bytes(resp).await, m1);
}

/// Scenario 5: mounting a blob absent from the source repository falls back to a
/// normal upload session (202 + `Location`) instead of failing outright; the
/// client can then complete the push as an ordinary monolithic PUT.
#[tokio::test]
async fn cross_repo_mount_falls_back_to_upload_session() {
    let test = test_app(true).await;
    let app = test.router;

    let req = Request::builder()
        .method("POST")
        .uri(format!("/v2/acme/web/blobs/uploads/?mount={HELLOWORLD_DIGEST}&from=other/repo"))
        .body(Body::empty())
        .unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::ACCEPTED);
    assert!(resp.headers().get(header::LOCATION).is_some());

    let req = Request::builder()
        .method("POST")
        .uri(format!("/v2/acme/web/blobs/uploads/?digest={HELLOWORLD_DIGEST}"))
        .body(Body::from("helloworld"))
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
}

/// Scenario 6: a private project denies an unauthenticated pull with a bearer
/// challenge, but admits the owning identity. The standalone `InMemoryUserService`
/// only ever resolves credentials to its single built-in `admin` user, so the
/// denied caller here is simulated as anonymous (no `Authorization` header) rather
/// than as a second distinct user identity -- the HTTP-level property under test
/// (401 with a realm challenge vs. 200 with the body) is exercised identically
/// either way.
#[tokio::test]
async fn private_project_denies_anonymous_pull_admits_owner() {
    let test = test_app(false).await;
    let app = test.router;
    let projects = test.projects;
    projects.create("secret", "admin", false).await;

    let m1 = image_manifest_bytes(&[]);
    let req = Request::builder()
        .method("PUT")
        .uri("/v2/secret/app/manifests/latest")
        .header(header::AUTHORIZATION, "Bearer admin")
        .body(Body::from(m1.clone()))
        .unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);

    let req = Request::builder()
        .method("GET")
        .uri("/v2/secret/app/manifests/latest")
        .body(Body::empty())
        .unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let challenge = resp.headers().get(header::WWW_AUTHENTICATE).unwrap().to_str().unwrap().to_string();
    assert!(challenge.starts_with("Bearer realm=\""));

    let req = Request::builder()
        .method("GET")
        .uri("/v2/secret/app/manifests/latest")
        .header(header::AUTHORIZATION, "Bearer admin")
        .body(Body::empty())
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_bytes(resp).await, m1);
}
