//! Repository lifecycle (C6) and the shared state every `Repo` clone for the same
//! repository name needs to agree on: the object store handle and the tag cache.
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use tokio::sync::RwLock;

use registry_core::registry::{Catalog, RepositoryStore, RepositoryStoreManager};

use registry_objectstore::{Key, ObjectStore};

use crate::blobs::BlobStoreImpl;
use crate::errors::{Error, Result};
use crate::manifests::ManifestStoreImpl;
use crate::pagination::paginate;
use crate::tags::TagCache;

static REPO_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9]+((\.|_|__|-+)[a-z0-9]+)*(/[a-z0-9]+((\.|_|__|-+)[a-z0-9]+)*)*$").unwrap());

#[derive(Clone, Deserialize)]
pub struct ManagerConfig {
    pub objects: registry_objectstore::Config,
}

impl ManagerConfig {
    pub async fn new_manager(&self) -> Result<Manager> {
        let objects = self.objects.new_objects().await?;
        Ok(Manager {
            objects,
            tag_caches: Arc::new(RwLock::new(HashMap::new())),
            upload_sessions: crate::blobs::UploadSessionTable::default(),
        })
    }
}

#[derive(Clone)]
pub struct Manager {
    objects: Arc<dyn ObjectStore>,
    tag_caches: Arc<RwLock<HashMap<String, TagCache>>>,
    upload_sessions: crate::blobs::UploadSessionTable,
}

impl Manager {
    async fn tag_cache_for(&self, repo: &str) -> TagCache {
        if let Some(cache) = self.tag_caches.read().await.get(repo) {
            return cache.clone();
        }
        let mut guard = self.tag_caches.write().await;
        guard
            .entry(repo.to_string())
            .or_insert_with(|| Arc::new(RwLock::new(HashMap::new())))
            .clone()
    }
}

#[async_trait]
impl RepositoryStoreManager for Manager {
    type RepositoryStore = Repo;
    type Error = Error;

    async fn get(&self, name: &str) -> std::result::Result<Option<Repo>, Error> {
        if !REPO_NAME_RE.is_match(name) {
            return Err(Error::NameInvalid(name.to_string()));
        }
        let prefix = Key::try_from(format!("{name}/").as_str())?;
        if self.objects.list(&prefix).await?.is_empty() {
            return Ok(None);
        }
        Ok(Some(self.repo(name).await))
    }

    async fn create(&self, name: &str) -> std::result::Result<Repo, Error> {
        if !REPO_NAME_RE.is_match(name) {
            return Err(Error::NameInvalid(name.to_string()));
        }
        Ok(self.repo(name).await)
    }

    async fn catalog(
        &self,
        n: Option<i64>,
        last: Option<String>,
    ) -> std::result::Result<Catalog, Error> {
        // Repository names may themselves contain slashes (`acme/web`), so the
        // repository key isn't just the first path segment -- split each listed
        // object key on the first `/manifests/` marker (same convention the HTTP
        // dispatcher uses for request paths, §4.8) and keep whatever precedes it,
        // provided what follows is an actual manifest (not a `tags/<name>` record).
        let all = self.objects.list(&Key::try_from("").unwrap()).await?;
        let mut repos = std::collections::BTreeSet::new();
        for entry in all {
            let Some(idx) = entry.find("/manifests/") else {
                continue;
            };
            let rest = &entry[idx + "/manifests/".len()..];
            if rest.starts_with("tags/") || rest.starts_with("referrers/") {
                continue;
            }
            repos.insert(entry[..idx].to_string());
        }
        let repos: Vec<String> = repos.into_iter().collect();
        let (repositories, has_more) = paginate(repos, n, last);
        Ok(Catalog { repositories, has_more })
    }
}

impl Manager {
    async fn repo(&self, name: &str) -> Repo {
        let tag_cache = self.tag_cache_for(name).await;
        Repo {
            name: name.to_string(),
            objects: self.objects.clone(),
            tag_cache,
            upload_sessions: self.upload_sessions.clone(),
        }
    }
}

#[derive(Clone)]
pub struct Repo {
    name: String,
    objects: Arc<dyn ObjectStore>,
    tag_cache: TagCache,
    upload_sessions: crate::blobs::UploadSessionTable,
}

#[async_trait]
impl RepositoryStore for Repo {
    type ManifestStore = ManifestStoreImpl;
    type BlobStore = BlobStoreImpl;
    type UploadSessionStore = crate::blobs::UploadSessionStoreImpl;
    type Error = Error;

    fn name(&self) -> &str {
        &self.name
    }

    fn get_manifest_store(&self) -> ManifestStoreImpl {
        ManifestStoreImpl {
            repo: self.name.clone(),
            objects: self.objects.clone(),
            tag_cache: self.tag_cache.clone(),
        }
    }

    fn get_blob_store(&self) -> BlobStoreImpl {
        BlobStoreImpl {
            repo: self.name.clone(),
            objects: self.objects.clone(),
            sessions: self.upload_sessions.clone(),
        }
    }

    fn get_upload_session_store(&self) -> crate::blobs::UploadSessionStoreImpl {
        crate::blobs::UploadSessionStoreImpl {
            repo: self.name.clone(),
            objects: self.objects.clone(),
            sessions: self.upload_sessions.clone(),
        }
    }
}
