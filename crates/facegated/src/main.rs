use anyhow::{Context, Result};
use facegate_core::VerificationService;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod api;
mod config;
mod dbus_interface;
mod store;

use api::RestApi;
use config::Config;
use store::SqliteStore;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("facegated starting");

    let config = Config::from_env();
    config.policy.validate().context("invalid policy configuration")?;

    if let Some(parent) = config.db_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    let store = SqliteStore::new(&config.db_path);
    store
        .migrate(config.create_prejoined_view)
        .with_context(|| format!("opening database {}", store.path().display()))?;

    let service = VerificationService::new(
        Arc::new(store),
        config.target_identity.clone(),
        config.policy,
    );
    tracing::info!(
        identity = %config.target_identity,
        min_references = config.policy.min_references,
        match_threshold = config.policy.match_threshold,
        best_min_multi = config.policy.best_min_multi,
        best_min_single = config.policy.best_min_single,
        "verification service configured"
    );

    // Held for the lifetime of the process; dropping it unregisters the name.
    let _dbus = if config.dbus_enabled {
        match dbus_interface::serve(service.clone()).await {
            Ok(conn) => {
                tracing::info!(name = dbus_interface::BUS_NAME, "D-Bus interface registered");
                Some(conn)
            }
            Err(e) => {
                tracing::warn!(error = %e, "D-Bus unavailable; serving HTTP only");
                None
            }
        }
    } else {
        tracing::info!("D-Bus disabled via FACEGATE_DBUS_ENABLED=0");
        None
    };

    let http_service = service.clone();
    let http_addr = config.http_addr.clone();
    let (bound_tx, bound_rx) = tokio::sync::oneshot::channel();
    std::thread::Builder::new()
        .name("facegate-http".into())
        .spawn(move || {
            let sys = actix_web::rt::System::new();
            sys.block_on(async move {
                let server = match RestApi::bind(http_service, &http_addr) {
                    Ok(server) => server,
                    Err(e) => {
                        let _ = bound_tx.send(Err(e));
                        return;
                    }
                };
                let _ = bound_tx.send(Ok(()));
                if let Err(e) = server.await {
                    tracing::error!(error = %e, addr = %http_addr, "HTTP server exited");
                }
            });
        })
        .context("spawning HTTP thread")?;
    bound_rx
        .await
        .context("HTTP thread exited before binding")?
        .with_context(|| format!("binding HTTP API on {}", config.http_addr))?;

    tracing::info!("facegated ready");

    tokio::signal::ctrl_c().await?;
    tracing::info!("facegated shutting down");

    Ok(())
}
