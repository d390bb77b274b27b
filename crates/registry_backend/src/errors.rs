//! Backend error type, convertible into each of `registry_core`'s per-component
//! error enums so a single type can satisfy every trait's `Error` associated type.
use registry_core::{BlobError, ManifestError, RepositoryError};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("object store error: {0}")]
    ObjectStore(#[from] registry_objectstore::Error),

    #[error("blob unknown: {0:?}")]
    BlobUnknown(Option<String>),

    #[error("manifest unknown: {0:?}")]
    ManifestUnknown(Option<String>),

    #[error("referenced blob unknown: {0}")]
    ManifestBlobUnknown(String),

    #[error("upload unknown: {0:?}")]
    UploadUnknown(Option<String>),

    #[error("repository name invalid: {0}")]
    NameInvalid(String),

    #[error("repository unknown: {0}")]
    NameUnknown(String),

    #[error("append offset {actual} does not match current size {expected}")]
    OffsetMismatch { expected: u64, actual: u64 },

    #[error("digest mismatch: asserted {asserted}, computed {computed}")]
    DigestMismatch { asserted: String, computed: String },

    #[error("size mismatch: asserted {asserted}, actual {actual}")]
    SizeMismatch { asserted: u64, actual: u64 },

    #[error("blob writer already finished")]
    BlobWriterFinished,

    #[error("immutable tag: {0}")]
    ImmutableTag(String),

    #[error("manifest invalid: {0:?}")]
    ManifestInvalid(Option<String>),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error(transparent)]
    Core(#[from] registry_core::Error),
}

impl Error {
    fn storage_message(&self) -> String {
        self.to_string()
    }
}

impl From<Error> for BlobError {
    fn from(e: Error) -> BlobError {
        match e {
            Error::BlobUnknown(d) => BlobError::BlobUnknown(d),
            Error::UploadUnknown(d) => BlobError::UploadUnknown(d),
            Error::OffsetMismatch { expected, actual } => {
                BlobError::OffsetMismatch { expected, actual }
            }
            Error::DigestMismatch { asserted, computed } => {
                BlobError::DigestMismatch { asserted, computed }
            }
            Error::SizeMismatch { asserted, actual } => {
                BlobError::SizeMismatch { asserted, actual }
            }
            Error::BlobWriterFinished => BlobError::BlobWriterFinished,
            Error::Core(e) => BlobError::GenericSpecError(e),
            e => BlobError::Storage(e.storage_message()),
        }
    }
}

impl From<Error> for ManifestError {
    fn from(e: Error) -> ManifestError {
        match e {
            Error::ManifestUnknown(d) => ManifestError::ManifestUnknown(d),
            Error::ManifestBlobUnknown(d) => ManifestError::ManifestBlobUnknown(Some(d)),
            Error::ManifestInvalid(d) => ManifestError::ManifestInvalid(d),
            Error::ImmutableTag(t) => ManifestError::ImmutableTag(t),
            Error::Core(e) => ManifestError::GenericSpecError(e),
            e => ManifestError::Storage(e.storage_message()),
        }
    }
}

impl From<Error> for RepositoryError {
    fn from(e: Error) -> RepositoryError {
        match e {
            Error::NameInvalid(n) => RepositoryError::NameInvalid(n),
            Error::NameUnknown(n) => RepositoryError::NameUnknown(n),
            Error::Core(e) => RepositoryError::GenericSpecError(e),
            e => RepositoryError::Storage(e.storage_message()),
        }
    }
}
