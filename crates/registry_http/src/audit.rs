//! Audit Recorder (C11) glue: builds one [`AuditEntry`] per dispatched request and
//! hands it to the configured [`AuditSink`], swallowing any error per §4.11/§7.
use http::{HeaderMap, Method};
use serde_json::json;

use registry_core::audit::{AuditEntry, AuditSink};

pub struct RequestContext {
    pub user_id: Option<String>,
    pub client_ip: Option<String>,
    pub user_agent: Option<String>,
}

impl RequestContext {
    pub fn from_headers(headers: &HeaderMap, user_id: Option<String>) -> Self {
        let client_ip = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(',').next().unwrap_or(v).trim().to_string());
        let user_agent = headers
            .get(http::header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        Self {
            user_id,
            client_ip,
            user_agent,
        }
    }
}

/// Record one registry verb attempt. `action` is the dispatch table entry (e.g.
/// `"PutManifest"`); `resource_id` is the reference/digest/UUID at play, if any;
/// `offsets` is the raw `Content-Range` header of a chunk-append request, if any.
/// Per §4.11 the details bag carries repository, reference/digest, offsets, and the
/// error string -- not just the ones the backend happened to have in scope.
#[allow(clippy::too_many_arguments)]
pub async fn record(
    sink: &dyn AuditSink,
    ctx: &RequestContext,
    action: &'static str,
    method: &Method,
    repository: &str,
    resource_id: Option<String>,
    offsets: Option<String>,
    success: bool,
    error: Option<String>,
) {
    sink.record(AuditEntry {
        action,
        resource_kind: "image",
        resource_id: resource_id.clone(),
        user_id: ctx.user_id.clone(),
        client_ip: ctx.client_ip.clone(),
        user_agent: ctx.user_agent.clone(),
        details: json!({
            "method": method.as_str(),
            "repository": repository,
            "reference": resource_id,
            "offsets": offsets,
            "error": error,
        }),
        success,
    })
    .await;
}
