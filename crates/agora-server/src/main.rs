use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use agora_db::Database;
use agora_gateway::SessionStore;
use agora_gateway::session::run_sweep_loop;
use agora_server::config::Config;
use agora_server::{build_router, build_state};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "agora=debug,agora_server=debug,agora_gateway=debug,agora_api=debug,tower_http=debug".into()
            }),
        )
        .init();

    let config = Config::from_env()?;

    let db = Arc::new(Database::open(&config.db_path)?);
    let state = build_state(db, SessionStore::with_ttl(config.session_ttl));

    let cancel = CancellationToken::new();
    let sweep = tokio::spawn(run_sweep_loop(
        state.sessions.clone(),
        config.sweep_every,
        cancel.clone(),
    ));

    if config.debug_sessions {
        warn!("GET /debug/sessions is enabled");
    }
    let app = build_router(state, config.debug_sessions);

    let addr = config.addr();
    info!("Agora server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cancel.clone()))
        .await?;

    cancel.cancel();
    if let Err(e) = sweep.await {
        warn!("Session sweep task failed: {}", e);
    }
    info!("Agora server stopped");
    Ok(())
}

async fn shutdown_signal(cancel: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
    cancel.cancel();
}
