use serde::Deserialize;

use registry_core::collab::Scope;

/// Top-level `dev-config.yml` shape: a tagged object-store backend plus whatever
/// operating-mode knobs the standalone collaborator implementations need.
#[derive(Clone, Deserialize)]
pub struct Config {
    pub objects: registry_objectstore::Config,

    /// Bind address for the HTTP listener. Defaults to `0.0.0.0:13030`.
    #[serde(default)]
    pub bind_address: Option<String>,

    /// §4.7 step 1: admit unauthenticated callers as if fully scoped. Only
    /// appropriate for a single-machine embedding with no externally reachable
    /// network interface.
    #[serde(default)]
    pub dev_mode: bool,

    /// Advertised in the `WWW-Authenticate: Bearer realm="..."` challenge and as
    /// the URL clients should `POST`/`GET` to exchange credentials (§4.9).
    #[serde(default = "default_realm")]
    pub realm: String,

    /// Password for the single built-in `admin` user the standalone `UserService`
    /// serves.
    #[serde(default = "default_dev_password")]
    pub dev_password: String,

    /// Long-lived, `pat_v1_`-prefixed tokens recognized by the standalone
    /// `UserService`, each scoped independently of the `admin` user's own session.
    #[serde(default)]
    pub long_lived_tokens: Vec<LongLivedToken>,
}

#[derive(Clone, Deserialize)]
pub struct LongLivedToken {
    pub token: String,
    pub scopes: Vec<Scope>,
}

impl Config {
    pub fn bind_addr(&self) -> String {
        self.bind_address
            .clone()
            .unwrap_or_else(|| "0.0.0.0:13030".to_string())
    }
}

fn default_realm() -> String {
    "http://localhost:13030/v2/auth".to_string()
}

fn default_dev_password() -> String {
    "admin".to_string()
}
