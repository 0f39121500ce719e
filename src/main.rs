mod config;
mod errors;
mod models;
mod orchestrator;
mod pde_service;
mod provider;
mod server;
mod state;

use crate::state::AppState;

#[tokio::main]
async fn main() {
    // Structured logging to stderr
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("strike_bench starting");

    let cfg = match config::AppConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("config error: {e}");
            std::process::exit(1);
        }
    };

    let port = cfg.server_port;
    tracing::info!(
        market_data = %cfg.market_data_base_url,
        pde_service = %cfg.pde_service_url,
        rate_series = %cfg.risk_free_series,
        "config loaded"
    );

    let app = server::router(AppState::new(cfg));

    let addr = format!("0.0.0.0:{port}");
    tracing::info!("server listening on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| {
            tracing::error!("bind error: {e}");
            std::process::exit(1);
        });

    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("server error: {e}");
    }
}
