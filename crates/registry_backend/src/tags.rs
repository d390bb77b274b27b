//! Tag Index (C5): durable per-tag records under `<repo>/manifests/tags/<name>`,
//! mirrored into an in-memory cache so `ListTags` doesn't pay a directory walk on
//! every request. Version-shaped tags (`v1.2.3`, `1.2.3-rc1`) are immutable once
//! written, per §4.5 and the redesign flag calling for that distinction.
use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use registry_objectstore::{Key, ObjectStore};

use crate::errors::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagRecord {
    pub digest: String,
    pub media_type: Option<String>,
    /// Sum of the referenced manifest's `layers[*].size`, falling back to the
    /// manifest JSON's own length when it has no layers (§3). Used by the
    /// Side-effect Hooks (C10) to recompute `storageUsed` as `Σ tagRecord.size`.
    #[serde(default)]
    pub size: u64,
}

/// In-memory mirror of one repository's tag → record mapping, guarded by a single
/// `RwLock` so concurrent readers don't block each other and writers serialize.
pub type TagCache = Arc<RwLock<HashMap<String, TagRecord>>>;

static VERSION_TAG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^v?\d+\.\d+\.\d+([._-][0-9A-Za-z]+)*$").unwrap());

/// A tag matching this shape is immutable: once written, a second `PutManifest`
/// under the same name with a different digest is rejected (§4.5).
pub fn is_version_shaped(tag: &str) -> bool {
    VERSION_TAG_RE.is_match(tag)
}

fn tag_key(repo: &str, tag: &str) -> Result<Key> {
    Ok(Key::try_from(format!("{repo}/manifests/tags/{tag}").as_str())?)
}

/// Populate `cache` from durable storage for `repo` if it hasn't been loaded yet.
/// Idempotent and safe to call on every `RepositoryStore::get_manifest_store` since
/// it only does work the first time (tracked by the cache being non-empty or the
/// repo directory being empty, whichever comes first -- either way this is cheap
/// compared to re-walking on every tag list request).
pub async fn ensure_loaded(
    objects: &dyn ObjectStore,
    repo: &str,
    cache: &TagCache,
) -> Result<()> {
    {
        let guard = cache.read().await;
        if !guard.is_empty() {
            return Ok(());
        }
    }
    let prefix = Key::try_from(format!("{repo}/manifests/tags/").as_str())?;
    let entries = objects.list(&prefix).await?;
    let mut loaded = HashMap::new();
    for entry in entries {
        let Some(tag) = entry.rsplit('/').next().map(str::to_string) else {
            continue;
        };
        let key = Key::try_from(entry.as_str())?;
        let body = objects.get(&key).await?;
        let bytes = crate::read_all(body).await?;
        if let Ok(record) = serde_json::from_slice::<TagRecord>(&bytes) {
            loaded.insert(tag, record);
        }
    }
    let mut guard = cache.write().await;
    if guard.is_empty() {
        *guard = loaded;
    }
    Ok(())
}

/// Write a tag record both durably and into the in-memory cache, enforcing
/// immutability for version-shaped tags.
pub async fn put(
    objects: &dyn ObjectStore,
    repo: &str,
    tag: &str,
    record: TagRecord,
    cache: &TagCache,
) -> Result<()> {
    // Warm the cache from durable storage first so a cold-started process's very
    // first push of an existing version tag still sees it (§4.5: the immutability
    // check must be safe across restarts, not just within one process's lifetime).
    ensure_loaded(objects, repo, cache).await?;
    {
        let guard = cache.read().await;
        if let Some(existing) = guard.get(tag) {
            if is_version_shaped(tag) && existing.digest != record.digest {
                return Err(Error::ImmutableTag(tag.to_string()));
            }
        }
    }

    let bytes = serde_json::to_vec(&record)?;
    let len = bytes.len() as u64;
    let key = tag_key(repo, tag)?;
    objects
        .put(&key, hyper::body::Body::from(bytes), len)
        .await?;

    let mut guard = cache.write().await;
    guard.insert(tag.to_string(), record);
    Ok(())
}

pub async fn get(
    objects: &dyn ObjectStore,
    repo: &str,
    tag: &str,
    cache: &TagCache,
) -> Result<Option<TagRecord>> {
    ensure_loaded(objects, repo, cache).await?;
    Ok(cache.read().await.get(tag).cloned())
}

pub async fn delete(
    objects: &dyn ObjectStore,
    repo: &str,
    tag: &str,
    cache: &TagCache,
) -> Result<()> {
    let key = tag_key(repo, tag)?;
    objects.delete(&key).await?;
    cache.write().await.remove(tag);
    Ok(())
}

/// Remove every tag pointing at `digest`, used when a manifest is deleted by
/// digest directly (§4.4 edge case: deleting by digest must also drop its tags).
pub async fn delete_all_pointing_at(
    objects: &dyn ObjectStore,
    repo: &str,
    digest: &str,
    cache: &TagCache,
) -> Result<()> {
    ensure_loaded(objects, repo, cache).await?;
    let to_remove: Vec<String> = {
        let guard = cache.read().await;
        guard
            .iter()
            .filter(|(_, record)| record.digest == digest)
            .map(|(tag, _)| tag.clone())
            .collect()
    };
    for tag in to_remove {
        delete(objects, repo, &tag, cache).await?;
    }
    Ok(())
}

pub async fn list(cache: &TagCache) -> Vec<String> {
    cache.read().await.keys().cloned().collect()
}

/// All tag records currently known for a repository, durable storage loaded first
/// if the cache is cold. Used by the Side-effect Hooks (C10) to recompute
/// `imageCount = len(ListTags(repo))` and `storageUsed = Σ tagRecord.size` (§4.10)
/// without re-deriving either figure from a directory walk over blobs/manifests.
pub async fn all_records(
    objects: &dyn ObjectStore,
    repo: &str,
    cache: &TagCache,
) -> Result<Vec<TagRecord>> {
    ensure_loaded(objects, repo, cache).await?;
    Ok(cache.read().await.values().cloned().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_version_shapes() {
        assert!(is_version_shaped("v1.2.3"));
        assert!(is_version_shaped("1.2.3"));
        assert!(is_version_shaped("1.2.3-rc1"));
        assert!(is_version_shaped("1.2.3.4"));
        assert!(!is_version_shaped("latest"));
        assert!(!is_version_shaped("1.2"));
        assert!(!is_version_shaped("release"));
    }
}
