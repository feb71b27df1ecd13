//! Courier router binary.
//!
//! # Usage
//!
//! ```bash
//! # Default bind (0.0.0.0:8084)
//! courier-router
//!
//! # Custom bind and verbose logging
//! courier-router --bind 127.0.0.1:9000 --log-level debug
//! ```

use std::sync::Arc;

use clap::Parser;
use courier_router::{Router, RouterConfig, http};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Courier relay router
#[derive(Parser, Debug)]
#[command(name = "courier-router")]
#[command(about = "Blind store-and-forward relay for the Courier overlay fabric")]
#[command(version)]
struct Args {
    /// Address to bind to
    #[arg(short, long, default_value = "0.0.0.0:8084")]
    bind: String,

    /// Per-mailbox message cap
    #[arg(long, default_value = "100000000")]
    max_messages: usize,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    tracing::info!("courier router starting");

    let config =
        RouterConfig { max_messages_per_mailbox: args.max_messages, ..RouterConfig::default() };
    let router = Arc::new(Router::new(config));
    let maintenance = router.start_maintenance();

    let shutdown_router = Arc::clone(&router);
    http::serve(Arc::clone(&router), &args.bind, async move {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("shutdown signal received");
        shutdown_router.shutdown();
    })
    .await?;

    router.shutdown();
    let _ = maintenance.await;

    Ok(())
}
