use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use dispatch_core::{CooldownPolicy, Dispatcher, ProfileStore};
use dispatch_credential::KeyManager;
use dispatch_inspector::{InspectorConfig, InspectorState, inspector_router};

mod cli;

use cli::CliArgs;

/// Thin host binary: loads the persisted profile store and inspection proxy
/// config, wires a `Dispatcher` to the inspection proxy the way the operator
/// configured it, and serves the proxy.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = CliArgs::parse();

    let profile_store = ProfileStore::load(&args.profiles_path)
        .await
        .with_context(|| format!("load profile store from {}", args.profiles_path))?;

    let mut inspector_config = InspectorConfig::load(&args.inspector_config_path)
        .await
        .with_context(|| format!("load inspector config from {}", args.inspector_config_path))?;
    if let Some(port) = args.port {
        inspector_config.port = port;
    }
    let bind = format!("{}:{}", args.host, inspector_config.port);
    let inspector_config_path = args.inspector_config_path.clone();
    let inspector_state = InspectorState::new(inspector_config);

    let key_manager = Arc::new(KeyManager::new(CooldownPolicy::default()));
    let dispatcher = Arc::new(Dispatcher::new(key_manager));
    dispatcher
        .set_inspector_url(Some(format!("http://{bind}")))
        .await;

    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("bind inspection proxy on {bind}"))?;
    tracing::info!(%bind, "inspection proxy listening");

    let router = inspector_router(inspector_state.clone());
    let server = tokio::spawn(async move { axum::serve(listener, router).await });

    // This process's own job ends at serving the inspection proxy and
    // persisting state on shutdown; `dispatcher` and `profile_store` are
    // wired for whatever embeds this binary to drive `send_request` against.
    let _ = &dispatcher;

    tokio::signal::ctrl_c()
        .await
        .context("wait for shutdown signal")?;
    tracing::info!("shutting down");

    profile_store
        .save()
        .await
        .context("save profile store on shutdown")?;
    inspector_state
        .config()
        .await
        .save(&inspector_config_path)
        .await
        .context("save inspector config on shutdown")?;

    server.abort();
    Ok(())
}
