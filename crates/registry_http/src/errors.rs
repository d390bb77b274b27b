//! Maps `registry_core`'s per-component error enums onto OCI Distribution Spec
//! error-code JSON bodies and HTTP status codes (§4.8 "Status discipline", §7).
//!
//! Business errors that don't correspond to a standard `DistributionErrorCode` --
//! immutable-tag overwrite, content-still-referenced on delete -- get their own
//! dedicated code namespace rather than being shoehorned into the distribution
//! spec's closed set, per §4.8.
use axum::response::{IntoResponse, Response};
use http::StatusCode;
use serde::Serialize;

use oci_spec::distribution::ErrorCode as DistributionErrorCode;
use oci_spec::distribution::ErrorInfoBuilder;
use oci_spec::distribution::ErrorResponseBuilder;

use registry_core::{BlobError, Error as CoreError, ManifestError, RegistryErrorCode, RepositoryError};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("http invalid header name")]
    HTTPInvalidHeaderName(#[from] http::header::InvalidHeaderName),
    #[error("http invalid header value")]
    HTTPInvalidHeaderValue(#[from] http::header::InvalidHeaderValue),

    #[error("missing query parameter: {0}")]
    MissingQueryParameter(&'static str),
    #[error("missing header: {0}")]
    MissingHeader(&'static str),
    #[error("malformed request path")]
    MalformedPath,
    #[error("method not allowed")]
    MethodNotAllowed,

    #[error(transparent)]
    Core(#[from] CoreError),
    #[error(transparent)]
    Blob(#[from] BlobError),
    #[error(transparent)]
    Manifest(#[from] ManifestError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    /// Authorization denial (§4.7): always surfaced as 401 with a bearer challenge,
    /// never 403, so standard clients know to re-authenticate.
    #[error("unauthorized")]
    Unauthorized { realm: String },

    #[error("internal server error: {0}")]
    Internal(String),
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        match self {
            Error::Blob(e) => blob_error_to_response(e),
            Error::Manifest(e) => manifest_error_to_response(e),
            Error::Repository(e) => repository_error_to_response(e),
            Error::Core(e) => core_error_to_response(e),
            Error::Unauthorized { realm } => unauthorized_response(&realm),
            Error::MissingHeader(_)
            | Error::MissingQueryParameter(_)
            | Error::MalformedPath
            | Error::HTTPInvalidHeaderName(_)
            | Error::HTTPInvalidHeaderValue(_) => {
                (StatusCode::BAD_REQUEST, self.to_string()).into_response()
            }
            Error::MethodNotAllowed => {
                (StatusCode::METHOD_NOT_ALLOWED, self.to_string()).into_response()
            }
            Error::Internal(s) => {
                tracing::warn!("{s}");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal server error").into_response()
            }
        }
    }
}

/// `WWW-Authenticate: Bearer realm="<realm>"` per §4.7/§6 so standard distribution
/// clients re-authenticate against the token endpoint rather than giving up.
pub fn unauthorized_response(realm: &str) -> Response {
    let mut response = into_error_response(DistributionErrorCode::Unauthorized, None);
    if let Ok(value) = http::HeaderValue::from_str(&format!(r#"Bearer realm="{realm}""#)) {
        response
            .headers_mut()
            .insert(http::header::WWW_AUTHENTICATE, value);
    }
    response
}

#[inline]
fn into_error_response(code: DistributionErrorCode, msg: Option<String>) -> Response {
    let msg = msg.unwrap_or_else(|| default_message(&code).to_string());
    let status = status_code(&code);
    let info = ErrorInfoBuilder::default()
        .code(code)
        .message(msg)
        .build()
        .expect("all required ErrorInfo fields must be initialized");
    let body = ErrorResponseBuilder::default()
        .errors(vec![info])
        .build()
        .expect("all required ErrorResponse fields must be initialized");
    (status, axum::Json(body)).into_response()
}

#[inline]
fn core_error_to_response(e: CoreError) -> Response {
    match e {
        CoreError::InvalidDigest(s) => into_error_response(DistributionErrorCode::DigestInvalid, Some(s)),
        CoreError::UnsupportedDigestAlgorithm(s) => {
            into_error_response(DistributionErrorCode::DigestInvalid, Some(s))
        }
        CoreError::InvalidContentRange(s) => {
            into_error_response(DistributionErrorCode::BlobUploadInvalid, Some(s))
        }
        CoreError::BackendError(s) => {
            tracing::warn!("{s}");
            (StatusCode::INTERNAL_SERVER_ERROR, "internal server error").into_response()
        }
        CoreError::DistributionSpecError(code) => into_error_response(code, None),
        CoreError::RegistrySpecError(code) => into_business_error_response(code, None),
    }
}

#[inline]
fn blob_error_to_response(e: BlobError) -> Response {
    match e {
        BlobError::BlobUnknown(m) => into_error_response(DistributionErrorCode::BlobUnknown, m),
        BlobError::UploadUnknown(m) => into_error_response(DistributionErrorCode::BlobUploadUnknown, m),
        BlobError::BlobUploadInvalid(m) => into_error_response(DistributionErrorCode::BlobUploadInvalid, m),
        BlobError::OffsetMismatch { expected, actual } => {
            // §4.3/§7: the client's resumed offset doesn't match the session's
            // current size. Report the current size via `Range` so a well-behaved
            // client can re-synchronize instead of restarting the whole upload.
            let mut response = into_error_response(
                DistributionErrorCode::BlobUploadInvalid,
                Some(format!("expected offset {expected}, got {actual}")),
            );
            if expected > 0 {
                if let Ok(v) = http::HeaderValue::from_str(&format!("0-{}", expected - 1)) {
                    response.headers_mut().insert(http::header::RANGE, v);
                }
            }
            response
        }
        BlobError::DigestMismatch { asserted, computed } => {
            // §7/§4.3: a finalize-time digest mismatch is a 500, not a 400 -- the
            // client asserted a well-formed digest, but what actually landed on
            // disk doesn't hash to it. The scratch object is already gone by the
            // time this error surfaces (see `verify_and_promote`); nothing is left
            // visible under either digest.
            tracing::warn!(asserted, computed, "upload digest mismatch on finalize");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("digest mismatch: asserted {asserted}, computed {computed}"),
            )
                .into_response()
        }
        BlobError::SizeMismatch { asserted, actual } => into_error_response(
            DistributionErrorCode::SizeInvalid,
            Some(format!("asserted {asserted}, actual {actual}")),
        ),
        BlobError::BlobWriterFinished => {
            into_error_response(DistributionErrorCode::BlobUploadUnknown, None)
        }
        BlobError::Storage(s) => {
            tracing::warn!("{s}");
            (StatusCode::INTERNAL_SERVER_ERROR, "internal server error").into_response()
        }
        BlobError::GenericSpecError(e) => core_error_to_response(e),
    }
}

#[inline]
fn manifest_error_to_response(e: ManifestError) -> Response {
    match e {
        ManifestError::ManifestUnknown(m) => into_error_response(DistributionErrorCode::ManifestUnknown, m),
        ManifestError::ManifestBlobUnknown(m) => {
            into_error_response(DistributionErrorCode::ManifestBlobUnknown, m)
        }
        ManifestError::ManifestInvalid(m) => into_error_response(DistributionErrorCode::ManifestInvalid, m),
        ManifestError::SizeInvalid(m) => into_error_response(DistributionErrorCode::SizeInvalid, m),
        ManifestError::ImmutableTag(t) => into_business_error_response(
            RegistryBusinessErrorCode::ImmutableTag,
            Some(format!("tag {t} is version-shaped and already exists")),
        ),
        ManifestError::Storage(s) => {
            tracing::warn!("{s}");
            (StatusCode::INTERNAL_SERVER_ERROR, "internal server error").into_response()
        }
        ManifestError::GenericSpecError(e) => core_error_to_response(e),
    }
}

#[inline]
fn repository_error_to_response(e: RepositoryError) -> Response {
    match e {
        RepositoryError::NameUnknown(n) => {
            into_error_response(DistributionErrorCode::NameUnknown, Some(n))
        }
        RepositoryError::NameInvalid(n) => {
            into_error_response(DistributionErrorCode::NameInvalid, Some(n))
        }
        RepositoryError::Storage(s) => {
            tracing::warn!("{s}");
            (StatusCode::INTERNAL_SERVER_ERROR, "internal server error").into_response()
        }
        RepositoryError::GenericSpecError(e) => core_error_to_response(e),
    }
}

/// Business-specific codes surfaced in the same JSON error-body shape as
/// `DistributionErrorCode`, but outside that closed set (§4.8).
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
enum RegistryBusinessErrorCode {
    ImmutableTag,
    ContentReferenced,
}

impl From<RegistryErrorCode> for RegistryBusinessErrorCode {
    fn from(c: RegistryErrorCode) -> Self {
        match c {
            RegistryErrorCode::ContentReferenced => RegistryBusinessErrorCode::ContentReferenced,
        }
    }
}

#[derive(Debug, Serialize)]
struct BusinessErrorInfo {
    code: RegistryBusinessErrorCode,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

#[derive(Debug, Serialize)]
struct BusinessErrorResponse {
    errors: Vec<BusinessErrorInfo>,
}

#[inline]
fn into_business_error_response(code: impl Into<RegistryBusinessErrorCode>, msg: Option<String>) -> Response {
    let code = code.into();
    let status = match code {
        RegistryBusinessErrorCode::ImmutableTag => StatusCode::CONFLICT,
        RegistryBusinessErrorCode::ContentReferenced => StatusCode::CONFLICT,
    };
    let body = BusinessErrorResponse {
        errors: vec![BusinessErrorInfo { code, message: msg }],
    };
    (status, axum::Json(body)).into_response()
}

#[inline]
fn status_code(c: &DistributionErrorCode) -> StatusCode {
    match c {
        DistributionErrorCode::BlobUnknown => StatusCode::NOT_FOUND,
        DistributionErrorCode::BlobUploadInvalid => StatusCode::RANGE_NOT_SATISFIABLE,
        DistributionErrorCode::BlobUploadUnknown => StatusCode::NOT_FOUND,
        DistributionErrorCode::DigestInvalid => StatusCode::BAD_REQUEST,
        DistributionErrorCode::ManifestBlobUnknown => StatusCode::NOT_FOUND,
        DistributionErrorCode::ManifestInvalid => StatusCode::BAD_REQUEST,
        DistributionErrorCode::ManifestUnknown => StatusCode::NOT_FOUND,
        DistributionErrorCode::NameInvalid => StatusCode::BAD_REQUEST,
        DistributionErrorCode::NameUnknown => StatusCode::NOT_FOUND,
        DistributionErrorCode::SizeInvalid => StatusCode::BAD_REQUEST,
        DistributionErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
        DistributionErrorCode::Denied => StatusCode::FORBIDDEN,
        DistributionErrorCode::Unsupported => StatusCode::NOT_IMPLEMENTED,
        DistributionErrorCode::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
    }
}

#[inline]
fn default_message(c: &DistributionErrorCode) -> &'static str {
    match c {
        DistributionErrorCode::BlobUnknown => "blob unknown to registry",
        DistributionErrorCode::BlobUploadInvalid => "blob upload invalid",
        DistributionErrorCode::BlobUploadUnknown => "blob upload unknown to registry",
        DistributionErrorCode::DigestInvalid => "provided digest did not match uploaded content",
        DistributionErrorCode::ManifestBlobUnknown => {
            "manifest references a manifest or blob unknown to registry"
        }
        DistributionErrorCode::ManifestInvalid => "manifest invalid",
        DistributionErrorCode::ManifestUnknown => "manifest unknown to registry",
        DistributionErrorCode::NameInvalid => "invalid repository name",
        DistributionErrorCode::NameUnknown => "repository name not known to registry",
        DistributionErrorCode::SizeInvalid => "provided length did not match content length",
        DistributionErrorCode::Unauthorized => "authentication required",
        DistributionErrorCode::Denied => "requested access to the resource is denied",
        DistributionErrorCode::Unsupported => "the operation is unsupported",
        DistributionErrorCode::TooManyRequests => "too many requests",
    }
}
