//! Filesystem/S3-backed implementation of `registry_core`'s storage traits.
//!
//! A repository's persisted state lives entirely under its name as a key prefix in
//! the configured [`registry_objectstore::ObjectStore`] (§6):
//!
//! ```text
//! <repo>/blobs/<alg>/<alg>:<hex>
//! <repo>/manifests/<hex>
//! <repo>/manifests/tags/<tag>
//! ```
//!
//! Upload session bytes live under a process-local scratch prefix and are never
//! visible under a repository's own key space until they've been digest-verified.
pub mod errors;

mod blobs;
mod manager;
mod manifests;
mod pagination;
mod tags;

pub mod standalone;

pub use manager::{Manager, ManagerConfig, Repo};

use bytes::{Bytes, BytesMut};
use futures::stream::TryStreamExt;

/// Buffer an [`registry_objectstore::ObjectBody`] into a single [`Bytes`]. Used for
/// manifests and tag records, both of which are small enough to hold in memory
/// whole (unlike blobs, which are always streamed).
pub(crate) async fn read_all(
    body: registry_objectstore::ObjectBody,
) -> registry_objectstore::Result<Bytes> {
    let buf = body
        .try_fold(BytesMut::new(), |mut acc, chunk| async move {
            acc.extend_from_slice(&chunk);
            Ok(acc)
        })
        .await?;
    Ok(buf.freeze())
}
