//! Seed sync binary entrypoint: WebSocket listener, background loops and seed store.

use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[cfg(feature = "redis-store")]
use seed_sync_back::dao::seed_store::redis::{RedisConfig, RedisSeedStore};
use seed_sync_back::{
    config::{AppConfig, StoreBackend},
    dao::{
        seed_store::{SeedStore, memory::InMemorySeedStore},
        storage::StorageError,
    },
    routes,
    services::{broadcast_scheduler, persistence_sync, storage_supervisor},
    state::{AppState, SharedState, counters::Side},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();
    let port = config.port();
    let app_state = AppState::new(config);

    spawn_storage_supervisor(&app_state)?;
    let flush_task = tokio::spawn(persistence_sync::run(app_state.clone()));
    let broadcast_task = tokio::spawn(broadcast_scheduler::run(app_state.clone()));

    let app = build_router(app_state.clone());

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "starting server");

    let listener = TcpListener::bind(addr).await.context("binding server")?;
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving axum")?;

    broadcast_task.abort();
    flush_task.abort();
    // Dropping the loop releases the flush lock if a cycle was in flight.
    let _ = flush_task.await;

    // Last chance to write back increments received since the previous cycle.
    match persistence_sync::run_cycle(&app_state).await {
        Ok(report) => info!(written = report.written, failed = report.failed, "final flush done"),
        Err(err) => warn!(error = %err, "skipping final flush"),
    }

    let counters = app_state.counters().read().await;
    for side in Side::ALL {
        let unflushed = counters.dirty_indices(side);
        if !unflushed.is_empty() {
            warn!(%side, indices = ?unflushed, "exiting with seeds not written to storage");
        }
    }

    Ok(())
}

/// Start the supervisor task for the configured seed store backend.
fn spawn_storage_supervisor(state: &SharedState) -> anyhow::Result<()> {
    let config = state.config();
    match config.store_backend() {
        StoreBackend::Memory => {
            warn!("using the in-memory seed store; seeds will not survive a restart");
            let store: Arc<dyn SeedStore> = Arc::new(InMemorySeedStore::new());
            tokio::spawn(storage_supervisor::run(state.clone(), move || {
                let store = store.clone();
                async move { Ok::<_, StorageError>(store) }
            }));
        }
        #[cfg(feature = "redis-store")]
        StoreBackend::Redis => {
            let redis = RedisConfig::from_url(config.redis_url()).context("parsing REDIS_URL")?;
            info!(address = %redis.address(), "using the Redis seed store");
            tokio::spawn(storage_supervisor::run(state.clone(), move || {
                let redis = redis.clone();
                async move {
                    let store = RedisSeedStore::connect(redis).await?;
                    Ok::<_, StorageError>(Arc::new(store) as Arc<dyn SeedStore>)
                }
            }));
        }
        #[cfg(not(feature = "redis-store"))]
        StoreBackend::Redis => {
            anyhow::bail!("the Redis seed store requires the `redis-store` feature");
        }
    }
    Ok(())
}

/// Build the top-level router and attach cross-cutting middleware layers.
fn build_router(state: SharedState) -> Router<()> {
    routes::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for Ctrl+C or SIGTERM and shut the server down gracefully.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut term = signal(SignalKind::terminate()).expect("install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = term.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
