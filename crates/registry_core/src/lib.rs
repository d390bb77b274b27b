//#![warn(missing_docs)]
//! # Registry Core
//!
//! `registry_core` provides the backend-agnostic interoperability types consumed by
//! [`registry_http`] (an OCI Distribution Specification v2 implementation) and
//! implemented by backend crates such as `registry_backend`.
//!
//! The primary set of interoperability types can be found in the [`crate::registry`] module.
pub mod errors;
pub use errors::{BlobError, DistributionErrorCode, Error, ManifestError, RegistryErrorCode, RepositoryError, Result};

mod oci_digest;
pub use oci_digest::{DigestState, Digester, OciDigest};

pub mod registry;

mod content_range;
pub use content_range::ContentRange;

mod stream;
pub use stream::ChunkedBody;

pub mod hooks;
pub use hooks::{BoundedHooks, RegistryHooks};

pub mod audit;
pub use audit::AuditSink;

pub mod collab;
