mod auth;
mod config;
mod routes;

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{info, warn};

use konubu_db::Database;
use konubu_push::{DeliveryHints, Dispatcher, FcmClient};
use konubu_triggers::{ProfileImages, TriggerRouter};

use config::Config;
use routes::AppStateInner;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "konubu=debug,konubu_triggers=debug,konubu_push=debug,tower_http=debug".into()
            }),
        )
        .init();

    let config = Config::from_env()?;

    let db = Arc::new(Database::open(&config.db_path)?);
    info!("Database ready at {}", config.db_path.display());

    let client = FcmClient::new(&config.fcm_project_id, config.fcm_access_token.clone());
    let dispatcher = Dispatcher::new(client, DeliveryHints::with_channel(&config.android_channel));
    let images = ProfileImages::new(&config.storage_dir);

    let state = Arc::new(AppStateInner {
        router: TriggerRouter::new(db, dispatcher, images),
        jwt_secret: config.jwt_secret.clone(),
        trigger_secret: config.trigger_secret.clone(),
    });

    let app = routes::app(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("KonuBu backend listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
                }
            }
            Err(e) => {
                warn!("SIGTERM handler unavailable ({}); waiting for Ctrl+C", e);
                ctrl_c.await.ok();
                info!("Received Ctrl+C, shutting down...");
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
