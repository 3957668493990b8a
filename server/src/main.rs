use clap::Parser;
use credit_sim_server::{AppConfig, AppState};
use std::net::SocketAddr;

/// HTTP/SSE server for the credit network simulator.
///
/// Most settings are read from the environment (`SIMULATOR_*`, see
/// [`AppConfig::from_env`]); the flags below let an operator override
/// the bind address without touching the environment.
#[derive(Debug, Parser)]
struct Arguments {
    /// Override the bind address (defaults to SIMULATOR_BIND_ADDR or 0.0.0.0:8080).
    #[clap(long, env = "SIMULATOR_BIND_ADDR")]
    bind_addr: Option<SocketAddr>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "credit_sim_server=info,credit_sim_engine=info".into()))
        .init();

    let args = Arguments::parse();

    let mut config = match AppConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "refusing to start with invalid configuration");
            std::process::exit(1);
        }
    };
    if let Some(bind_addr) = args.bind_addr {
        config.bind_addr = bind_addr;
    }

    tracing::info!(bind_addr = %config.bind_addr, "starting simulator server");

    let bind_addr = config.bind_addr;
    let state = AppState::new(config);
    let app = credit_sim_server::build_app(state);

    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .unwrap_or_else(|e| panic!("failed to bind {bind_addr}: {e}"));

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
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
    tracing::info!("shutdown signal received");
}
