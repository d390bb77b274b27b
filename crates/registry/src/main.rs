use std::fs::File;
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;

use registry_backend::standalone::{InMemoryProjectService, InMemoryUserService, NoopWebhookDispatcher, StandaloneHooks};
use registry_core::audit::TracingAuditSink;
use registry_core::hooks::{BoundedHooks, RegistryHooks};
use registry_http::Registry;

mod config;
use crate::config::Config;

#[derive(Parser)]
struct Cli {
    #[arg(short, long)]
    config_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(true)
        .compact()
        .init();

    tracing::info!("info enabled");
    tracing::warn!("warning enabled");
    tracing::debug!("debug enabled");
    tracing::trace!("trace enabled");

    // load configuration
    let mut config_file = File::open(cli.config_file.unwrap_or("./dev-config.yml".into()))?;
    let mut s = String::new();
    config_file.read_to_string(&mut s)?;
    let config: Config = serde_yaml::from_str(&s)?;

    if config.dev_mode {
        tracing::warn!("dev_mode enabled: all requests are treated as fully authorized");
    }

    // initialize persistence layer
    let manager_config = registry_backend::ManagerConfig {
        objects: config.objects.clone(),
    };
    let manager = manager_config.new_manager().await?;

    let long_lived_tokens = config
        .long_lived_tokens
        .iter()
        .map(|t| (t.token.clone(), t.scopes.clone()))
        .collect();

    let projects: Arc<dyn registry_core::collab::ProjectService> = Arc::new(InMemoryProjectService::default());
    let users: Arc<dyn registry_core::collab::UserService> =
        Arc::new(InMemoryUserService::new(config.dev_password.clone(), long_lived_tokens));
    let webhooks: Arc<dyn registry_core::collab::WebhookDispatcher> = Arc::new(NoopWebhookDispatcher);
    let objects = config.objects.new_objects().await?;
    // §4.10/§9: stats refresh and webhook fan-out run on a bounded pool of `tokio::task`s
    // rather than on the request path, so a slow webhook endpoint never delays a push.
    let hooks: Arc<dyn RegistryHooks> = Arc::new(BoundedHooks::new(
        StandaloneHooks {
            objects,
            projects: projects.clone(),
            webhooks,
        },
        64,
    ));
    let audit = Arc::new(TracingAuditSink);

    let registry = Registry::new(manager, hooks, audit, users, projects, config.dev_mode, config.realm.clone());
    let router = registry.router();

    // run HTTP server
    let bind_addr = config.bind_addr();
    tracing::info!(bind_addr, "starting registry server");
    axum::Server::bind(&bind_addr.parse()?)
        .serve(router.into_make_service())
        .await?;

    Ok(())
}
