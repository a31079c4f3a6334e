use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;

use horizon_api::app::{AppServices, build_app};
use horizon_auth::{AuthGateway, Hs256AuthGateway};
use horizon_infra::ExpiryReaper;
use horizon_infra::config::AppConfig;
use horizon_infra::store::{InMemoryTicketingStore, PostgresTicketingStore, TicketingStore};
use horizon_observability::LogFormat;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine.
    let _ = dotenvy::dotenv();

    let config = AppConfig::from_env().context("invalid configuration")?;
    let log_format: LogFormat = config.log_format.parse()?;
    horizon_observability::init_with(log_format);

    if config.auth.insecure_dev_secret {
        tracing::warn!("JWT_SECRET not set; using insecure dev secret");
    }
    tracing::info!(
        config = %serde_json::to_string(&config).unwrap_or_default(),
        "configuration loaded"
    );

    let gateway: Arc<dyn AuthGateway> =
        Arc::new(Hs256AuthGateway::new(config.auth.jwt_secret.as_bytes()));

    match &config.database {
        Some(db) => {
            let store =
                PostgresTicketingStore::connect(&db.url, db.max_connections, db.acquire_timeout())
                    .await
                    .context("failed to connect to postgres")?;
            store.migrate().await.context("failed to run migrations")?;
            tracing::info!("using postgres store");
            serve(&config, store, gateway).await
        }
        None => {
            tracing::warn!("DATABASE_URL not set; using in-memory store (data is not persisted)");
            serve(&config, InMemoryTicketingStore::new(), gateway).await
        }
    }
}

async fn serve<S>(config: &AppConfig, store: S, gateway: Arc<dyn AuthGateway>) -> anyhow::Result<()>
where
    S: TicketingStore + Clone + 'static,
{
    let services = Arc::new(AppServices::new(store));
    let reaper = ExpiryReaper::new(services.cascade.clone(), config.reaper.interval()).spawn();

    let app = build_app(services, gateway);

    let addr = config.server.bind_address();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    reaper.shutdown().await;
    tracing::info!("shut down cleanly");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
