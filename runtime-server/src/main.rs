use runtime_core::RuntimeConfig;
use std::net::SocketAddr;
use tokio::signal;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    runtime_server::init_tracing();

    let config = RuntimeConfig::load();
    let state = runtime_server::build_app_state(config)?;

    if std::env::var("RUNTIME_SEED_DEMO").map(|v| v == "1").unwrap_or(false) {
        runtime_server::seed::seed_demo_tenant(&state.repos)?;
        info!("seeded demo tenant/agent/voice");
    }

    let worker_handles = state.reconciler.clone().spawn().await;
    info!(workers = worker_handles.len(), "post-call reconciler started");

    let addr: SocketAddr = std::env::var("RUNTIME_GATEWAY_ADDR")
        .unwrap_or_else(|_| "0.0.0.0:8080".into())
        .parse()?;

    let router = runtime_gateway::router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "session gateway listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received, draining in-flight sessions");
}
