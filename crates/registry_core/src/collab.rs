//! Narrow interfaces onto the external collaborators named in §6: the project/user
//! services and webhook dispatcher that live outside this core (Web UI, project/user
//! CRUD, notification preferences) but whose state the Authorization Gate (C7),
//! Token Exchange (C9), and Side-effect Hooks (C10) need to read and write.
//!
//! This crate only depends on these as traits; a standalone embedding (no external
//! project/user service) can supply in-memory implementations, which is exactly what
//! `registry_backend::standalone` does.
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A scope granted to a caller, closed per §9: `read`, `write`, `delete`, `admin`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Read,
    Write,
    Delete,
    Admin,
}

/// One of the three permissions registry verbs reduce to (§4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    Pull,
    Push,
    Delete,
}

impl Scope {
    /// `read ⇒ pull`, `write ⇒ push`, `delete ⇒ delete`; `admin` covers all three.
    pub fn permits(&self, verb: Verb) -> bool {
        match self {
            Scope::Admin => true,
            Scope::Read => verb == Verb::Pull,
            Scope::Write => verb == Verb::Push,
            Scope::Delete => verb == Verb::Delete,
        }
    }
}

/// Resolved caller identity, regardless of whether it arrived as a JWT bearer token,
/// a long-lived token presented as a bearer token, or a long-lived token presented as
/// a Basic auth password (§9).
#[derive(Debug, Clone)]
pub struct Identity {
    pub user_id: String,
    pub username: String,
    /// `None` means "no scope restriction" (e.g. a full user session JWT); `Some` means
    /// the identity arrived via a scoped long-lived token.
    pub scopes: Option<Vec<Scope>>,
}

impl Identity {
    pub fn permits(&self, verb: Verb) -> bool {
        match &self.scopes {
            None => true,
            Some(scopes) => scopes.iter().any(|s| s.permits(verb)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub slug: String,
    pub owner_id: String,
    pub is_public: bool,
    pub image_count: u64,
    pub storage_used: u64,
    pub storage_quota: Option<u64>,
}

#[async_trait]
pub trait ProjectService: Send + Sync {
    async fn get_by_name(&self, slug: &str) -> Option<Project>;
    async fn create(&self, slug: &str, owner_id: &str, is_public: bool) -> Project;
    async fn update_stats(&self, slug: &str, image_count: u64, storage_used: u64);
}

#[derive(Debug, Clone)]
pub struct TokenPair {
    pub token: String,
    pub access_token: String,
    pub expires_in: u64,
    pub issued_at: String,
}

#[async_trait]
pub trait UserService: Send + Sync {
    /// Validate a bearer token (JWT or long-lived-token-as-bearer), returning the
    /// resolved identity if valid.
    async fn validate_bearer(&self, raw: &str) -> Option<Identity>;

    /// Validate a long-lived token string (the distinguished `pat_v1_...` form),
    /// returning the resolved identity if valid.
    async fn validate_long_lived_token(&self, raw: &str) -> Option<Identity>;

    /// Username+password login, returning a fresh token pair on success.
    async fn login_password(&self, username: &str, password: &str) -> Option<TokenPair>;

    /// Issue a short-lived bearer token pair for an already-authenticated user (used
    /// by the Token Exchange endpoint when a long-lived token validated, §4.9).
    async fn issue_short_lived(&self, user_id: &str) -> TokenPair;
}

#[async_trait]
pub trait WebhookDispatcher: Send + Sync {
    async fn push_event(
        &self,
        project_id: &str,
        repo: &str,
        reference: &str,
        digest: &str,
        size: u64,
        user_id: Option<&str>,
        username: Option<&str>,
    );

    async fn delete_event(
        &self,
        project_id: &str,
        repo: &str,
        reference: &str,
        digest: &str,
        user_id: Option<&str>,
        username: Option<&str>,
    );
}
