use anyhow::Result;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use newsletter_hub::config::Config;
use newsletter_hub::db;
use newsletter_hub::routes::{self, AppState};
use newsletter_hub::services::scheduler;
use newsletter_hub::services::sync_lock::SyncLockManager;
use newsletter_hub::services::sync_log_service::SyncLogRecorder;
use newsletter_hub::services::sync_service::SyncPolicy;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,newsletter_hub=debug")),
        )
        .init();

    let config = Arc::new(Config::from_env()?);
    let pool = db::connect(&config.database_url).await?;
    db::run_migrations(&pool).await?;

    let http = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(30))
        .build()?;
    let recorder = Arc::new(SyncLogRecorder::new(pool.clone()));
    let locks = SyncLockManager::new();

    // Background scheduled syncs
    scheduler::start(
        pool.clone(),
        config.clone(),
        http.clone(),
        recorder.clone(),
        locks.clone(),
    );

    let state = AppState {
        pool,
        config: config.clone(),
        http,
        recorder,
        locks,
        policy: Arc::new(SyncPolicy::default()),
    };
    let app = routes::router(state);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    use tokio::signal;
    let ctrl_c = async {
        signal::ctrl_c().await.ok();
    };
    #[cfg(unix)]
    let term = async {
        if let Ok(mut s) = signal::unix::signal(signal::unix::SignalKind::terminate()) {
            s.recv().await;
        }
    };
    #[cfg(not(unix))]
    let term = std::future::pending::<()>();
    tokio::select! { _ = ctrl_c => {}, _ = term => {} }
}
