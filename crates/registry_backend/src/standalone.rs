//! Default, single-machine implementations of the collaborator interfaces declared
//! in `registry_core::collab` (§4.7's "standalone" embedding: no external project/user
//! service, no webhook fan-out service). Suitable for the `registry` binary's default
//! configuration and for integration tests; a real deployment swaps these for
//! implementations backed by whatever already manages projects, users, and
//! notification preferences.
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use registry_core::collab::{Identity, Project, ProjectService, Scope, TokenPair, UserService, WebhookDispatcher};
use registry_core::hooks::{BlobEvent, ManifestEvent, RegistryHooks};

use registry_objectstore::ObjectStore;

use crate::tags;

/// Project registry keyed by slug, held entirely in memory. Storage stats are
/// recomputed on demand by [`StandaloneHooks`] rather than persisted here.
#[derive(Default)]
pub struct InMemoryProjectService {
    projects: RwLock<HashMap<String, Project>>,
}

#[async_trait]
impl ProjectService for InMemoryProjectService {
    async fn get_by_name(&self, slug: &str) -> Option<Project> {
        self.projects.read().await.get(slug).cloned()
    }

    async fn create(&self, slug: &str, owner_id: &str, is_public: bool) -> Project {
        let project = Project {
            id: Uuid::new_v4().to_string(),
            slug: slug.to_string(),
            owner_id: owner_id.to_string(),
            is_public,
            image_count: 0,
            storage_used: 0,
            storage_quota: None,
        };
        self.projects
            .write()
            .await
            .insert(slug.to_string(), project.clone());
        project
    }

    async fn update_stats(&self, slug: &str, image_count: u64, storage_used: u64) {
        if let Some(project) = self.projects.write().await.get_mut(slug) {
            project.image_count = image_count;
            project.storage_used = storage_used;
        }
    }
}

struct DevUser {
    user_id: String,
    username: String,
    password: String,
    long_lived_tokens: Vec<(String, Vec<Scope>)>,
}

/// A fixed single development user plus whatever long-lived tokens are configured,
/// with no real session expiry -- issued short-lived tokens are just the user id
/// itself, valid forever, since there is no JWT signing key configured in this mode.
pub struct InMemoryUserService {
    users: Vec<DevUser>,
}

impl InMemoryUserService {
    /// `dev_password` authenticates the single built-in `admin` user; each entry in
    /// `long_lived_tokens` is a `pat_v1_`-prefixed token string paired with the
    /// scopes it grants (§4.9).
    pub fn new(dev_password: String, long_lived_tokens: Vec<(String, Vec<Scope>)>) -> Self {
        Self {
            users: vec![DevUser {
                user_id: "admin".to_string(),
                username: "admin".to_string(),
                password: dev_password,
                long_lived_tokens,
            }],
        }
    }
}

#[async_trait]
impl UserService for InMemoryUserService {
    async fn validate_bearer(&self, raw: &str) -> Option<Identity> {
        if let Some(identity) = self.validate_long_lived_token(raw).await {
            return Some(identity);
        }
        self.users
            .iter()
            .find(|u| u.user_id == raw)
            .map(|u| Identity {
                user_id: u.user_id.clone(),
                username: u.username.clone(),
                scopes: None,
            })
    }

    async fn validate_long_lived_token(&self, raw: &str) -> Option<Identity> {
        if !raw.starts_with("pat_v1_") {
            return None;
        }
        for user in &self.users {
            if let Some((_, scopes)) = user.long_lived_tokens.iter().find(|(t, _)| t == raw) {
                return Some(Identity {
                    user_id: user.user_id.clone(),
                    username: user.username.clone(),
                    scopes: Some(scopes.clone()),
                });
            }
        }
        None
    }

    async fn login_password(&self, username: &str, password: &str) -> Option<TokenPair> {
        let user = self
            .users
            .iter()
            .find(|u| u.username == username && u.password == password)?;
        Some(TokenPair {
            token: user.user_id.clone(),
            access_token: user.user_id.clone(),
            expires_in: 3600,
            issued_at: "1970-01-01T00:00:00Z".to_string(),
        })
    }

    async fn issue_short_lived(&self, user_id: &str) -> TokenPair {
        TokenPair {
            token: user_id.to_string(),
            access_token: user_id.to_string(),
            expires_in: 3600,
            issued_at: "1970-01-01T00:00:00Z".to_string(),
        }
    }
}

/// Logs webhook events via `tracing` instead of delivering them anywhere, per the
/// "standalone" mode's no-op notification policy.
pub struct NoopWebhookDispatcher;

#[async_trait]
impl WebhookDispatcher for NoopWebhookDispatcher {
    async fn push_event(
        &self,
        project_id: &str,
        repo: &str,
        reference: &str,
        digest: &str,
        size: u64,
        user_id: Option<&str>,
        username: Option<&str>,
    ) {
        tracing::info!(
            project_id,
            repo,
            reference,
            digest,
            size,
            user_id,
            username,
            "push event (no webhook dispatcher configured)"
        );
    }

    async fn delete_event(
        &self,
        project_id: &str,
        repo: &str,
        reference: &str,
        digest: &str,
        user_id: Option<&str>,
        username: Option<&str>,
    ) {
        tracing::info!(
            project_id,
            repo,
            reference,
            digest,
            user_id,
            username,
            "delete event (no webhook dispatcher configured)"
        );
    }
}

/// Wires the Side-effect Hooks contract (C10) onto a [`ProjectService`] and
/// [`WebhookDispatcher`]: project stats are recomputed from the Tag Index's own
/// durable records (`imageCount = len(ListTags(repo))`, `storageUsed =
/// Σ tagRecord.size`, §4.10) rather than a separately maintained counter, so they
/// can never drift from what the tag index itself says is live.
pub struct StandaloneHooks {
    pub objects: Arc<dyn ObjectStore>,
    pub projects: Arc<dyn ProjectService>,
    pub webhooks: Arc<dyn WebhookDispatcher>,
}

impl StandaloneHooks {
    fn project_slug(repository: &str) -> &str {
        repository.split('/').next().unwrap_or(repository)
    }

    /// §4.10: a push to a repository whose project doesn't exist yet implicitly
    /// creates that project, owned by the pusher, iff the pusher's identity is
    /// known. An anonymous push (dev mode) leaves no project behind to own.
    async fn ensure_project(&self, repository: &str, user_id: Option<&str>) {
        let slug = Self::project_slug(repository);
        if self.projects.get_by_name(slug).await.is_some() {
            return;
        }
        let Some(owner_id) = user_id else {
            return;
        };
        self.projects.create(slug, owner_id, false).await;
    }

    /// Every distinct repository key holding at least one manifest under the
    /// project's prefix, recovered the same way `Manager::catalog` recovers
    /// repository keys from listed object paths (split on the first
    /// `/manifests/` marker, §4.8's convention, since a project may own more
    /// than one multi-segment repository).
    async fn project_repositories(&self, slug: &str) -> Vec<String> {
        let prefix = match registry_objectstore::Key::try_from(format!("{slug}/").as_str()) {
            Ok(k) => k,
            Err(_) => return Vec::new(),
        };
        let entries = self.objects.list(&prefix).await.unwrap_or_default();
        let mut repos = std::collections::BTreeSet::new();
        for entry in entries {
            if let Some(idx) = entry.find("/manifests/") {
                repos.insert(entry[..idx].to_string());
            }
        }
        repos.into_iter().collect()
    }

    /// §4.10: recompute `imageCount = len(ListTags(repo))` and `storageUsed =
    /// Σ tagRecord.size`, aggregated over every repository the project owns --
    /// each repository's tags are read straight from durable storage via a
    /// throwaway cache (`tags::all_records` warms a cold one lazily, same as a
    /// freshly restarted process would, §4.5), not derived from a raw object
    /// count or byte total over the project's whole storage prefix.
    async fn refresh_stats(&self, repository: &str) {
        let slug = Self::project_slug(repository);
        if self.projects.get_by_name(slug).await.is_none() {
            return;
        }

        let mut image_count = 0u64;
        let mut storage_used = 0u64;
        for repo in self.project_repositories(slug).await {
            let cache: tags::TagCache = Arc::new(RwLock::new(HashMap::new()));
            match tags::all_records(self.objects.as_ref(), &repo, &cache).await {
                Ok(records) => {
                    image_count += records.len() as u64;
                    storage_used += records.iter().map(|r| r.size).sum::<u64>();
                }
                Err(e) => {
                    tracing::warn!(repo, error = %e, "failed to recompute tag stats for repository");
                }
            }
        }

        self.projects
            .update_stats(slug, image_count, storage_used)
            .await;
    }
}

#[async_trait]
impl RegistryHooks for StandaloneHooks {
    async fn on_manifest_put(&self, event: &ManifestEvent) {
        self.ensure_project(&event.repository, event.user_id.as_deref()).await;
        self.refresh_stats(&event.repository).await;
        let slug = Self::project_slug(&event.repository);
        let project_id = self
            .projects
            .get_by_name(slug)
            .await
            .map(|p| p.id)
            .unwrap_or_default();
        self.webhooks
            .push_event(
                &project_id,
                &event.repository,
                &event.reference,
                &event.digest,
                event.size,
                event.user_id.as_deref(),
                event.username.as_deref(),
            )
            .await;
    }

    async fn on_manifest_delete(&self, event: &ManifestEvent) {
        self.refresh_stats(&event.repository).await;
        let slug = Self::project_slug(&event.repository);
        let project_id = self
            .projects
            .get_by_name(slug)
            .await
            .map(|p| p.id)
            .unwrap_or_default();
        self.webhooks
            .delete_event(
                &project_id,
                &event.repository,
                &event.reference,
                &event.digest,
                event.user_id.as_deref(),
                event.username.as_deref(),
            )
            .await;
    }

    async fn on_blob_delete(&self, event: &BlobEvent) {
        self.refresh_stats(&event.repository).await;
    }
}
