use std::sync::Arc;

use clap::Parser;
use pingpong_api::{ApiState, DEFAULT_MAX_BODY_BYTES, api_router};
use pingpong_metrics::MetricsRegistry;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "pingpong", about = "Dynamic counter registry with Prometheus exposition")]
struct Cli {
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    #[arg(long, default_value = "8090")]
    port: u16,

    /// Largest accepted /create or /update payload.
    #[arg(long, default_value_t = DEFAULT_MAX_BODY_BYTES)]
    max_body_bytes: usize,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = EnvFilter::from_default_env().add_directive("pingpong=info".parse()?);
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let cli = Cli::parse();
    info!(?cli, "starting metrics server");

    let registry = Arc::new(MetricsRegistry::new());
    let state = Arc::new(ApiState::new(registry));
    let app = api_router(state, cli.max_body_bytes);

    let addr = format!("{}:{}", cli.host, cli.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("pingpong server listening on {addr}");
    axum::serve(listener, app).await?;

    Ok(())
}
