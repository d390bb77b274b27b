//! Error kinds surfaced by the registry core, per the error handling design in the
//! specification's §7: `InvalidDigest`, `ManifestNotFound`, `BlobNotFound`,
//! `UploadNotFound`, `InvalidContentType`, `ImmutableTag`, `QuotaExceeded` (reserved,
//! never returned), plus generic `Storage` and `Unauthorized`.
//!
//! HTTP status mapping lives in `registry_http::errors`, not here -- this crate has no
//! dependency on an HTTP status type so it stays usable by non-HTTP embedders.
pub use oci_spec::distribution::ErrorCode as DistributionErrorCode;

pub type Result<T> = std::result::Result<T, Error>;

/// Catch-all error for code paths that aren't specific to blobs, manifests, or
/// repositories (digest parsing, content-range parsing, manifest deserialization).
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid digest: {0}")]
    InvalidDigest(String),
    #[error("unsupported digest algorithm: {0}")]
    UnsupportedDigestAlgorithm(String),
    #[error("invalid content-range: {0}")]
    InvalidContentRange(String),

    #[error("backend error: {0}")]
    BackendError(String),

    // distribution error codes
    // https://github.com/opencontainers/distribution-spec/blob/main/spec.md#error-codes
    #[error("distribution spec error")]
    DistributionSpecError(DistributionErrorCode),

    #[error("registry spec error")]
    RegistrySpecError(RegistryErrorCode),
}

/// Business-specific error codes that don't map onto a standard
/// `DistributionErrorCode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryErrorCode {
    /// A manifest or blob delete was requested but the content is still referenced
    /// elsewhere (e.g. a digest referenced by another tag).
    ContentReferenced = 99,
}

/// Errors returned by the Blob Store (C1) and Upload Session Manager (C3).
#[derive(thiserror::Error, Debug)]
pub enum BlobError {
    #[error("blob unknown")]
    BlobUnknown(Option<String>),
    #[error("upload unknown: {0:?}")]
    UploadUnknown(Option<String>),
    #[error("invalid blob upload: {0:?}")]
    BlobUploadInvalid(Option<String>),
    #[error("append offset {actual} does not match current size {expected}")]
    OffsetMismatch { expected: u64, actual: u64 },
    #[error("digest mismatch: asserted {asserted}, computed {computed}")]
    DigestMismatch { asserted: String, computed: String },
    #[error("size mismatch: asserted {asserted}, actual {actual}")]
    SizeMismatch { asserted: u64, actual: u64 },
    #[error("blob writer already finished")]
    BlobWriterFinished,
    #[error("storage error: {0}")]
    Storage(String),
    #[error(transparent)]
    GenericSpecError(#[from] Error),
}

/// Errors returned by the Manifest Store (C4) and Tag Index (C5).
#[derive(thiserror::Error, Debug)]
pub enum ManifestError {
    #[error("manifest unknown")]
    ManifestUnknown(Option<String>),
    #[error("referenced blob unknown: {0:?}")]
    ManifestBlobUnknown(Option<String>),
    #[error("manifest invalid: {0:?}")]
    ManifestInvalid(Option<String>),
    #[error("size invalid: {0:?}")]
    SizeInvalid(Option<String>),
    #[error("immutable tag: {0}")]
    ImmutableTag(String),
    #[error("storage error: {0}")]
    Storage(String),
    #[error(transparent)]
    GenericSpecError(#[from] Error),
}

/// Errors returned by `RepositoryStoreManager`/`RepositoryStore` (C6 catalog, repo
/// lifecycle).
#[derive(thiserror::Error, Debug)]
pub enum RepositoryError {
    #[error("name unknown: {0}")]
    NameUnknown(String),
    #[error("name invalid: {0}")]
    NameInvalid(String),
    #[error("storage error: {0}")]
    Storage(String),
    #[error(transparent)]
    GenericSpecError(#[from] Error),
}
