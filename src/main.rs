//! Rewriting forward proxy.
//!
//! # Architecture Overview
//!
//! ```text
//!     Browser                 ┌──────────────────────────────────────────────┐
//!     ───────────────────────▶│  http (axum router + tower-http layers)      │
//!                             │      │                                       │
//!                             │      ▼                                       │
//!                             │  target::codec ──▶ session::store            │
//!                             │      │                                       │
//!                             │      ▼                                       │
//!                             │  upstream::Forwarder ─────────────────────────┼──▶ Origin
//!                             │      │                                       │
//!                             │      ▼                                       │
//!     ◀───────────────────────│  rewrite (html / css / shim) + header relay  │
//!                             │                                              │
//!                             │  render (optional headless collaborator)     │
//!                             │  config · observability · lifecycle          │
//!                             └──────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;

use rewrite_proxy::config::{load_config, CodecStrategy, ProxyConfig};
use rewrite_proxy::lifecycle::{signals, start, Shutdown};
use rewrite_proxy::observability::logging::init_logging;

#[derive(Parser)]
#[command(name = "rewrite-proxy")]
#[command(about = "Rewriting forward proxy", long_about = None)]
struct Args {
    /// TOML configuration file
    #[arg(short, long, env = "REWRITE_PROXY_CONFIG")]
    config: Option<PathBuf>,

    /// Bind address, overrides listener.bind_address
    #[arg(long)]
    bind: Option<String>,

    /// Port on all interfaces, overrides the port of the bind address
    #[arg(short, long, env = "PORT")]
    port: Option<u16>,

    /// Proxy path strategy
    #[arg(long, value_parser = ["direct", "session"])]
    strategy: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => ProxyConfig::default(),
    };
    apply_overrides(&mut config, &args);

    init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "rewrite-proxy starting");

    let shutdown = Shutdown::new();
    signals::trigger_on_signal(shutdown.clone());

    start(config, &shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

fn apply_overrides(config: &mut ProxyConfig, args: &Args) {
    if let Some(bind) = &args.bind {
        config.listener.bind_address = bind.clone();
    }
    if let Some(port) = args.port {
        let host = config
            .listener
            .bind_address
            .rsplit_once(':')
            .map(|(host, _)| host.to_string())
            .unwrap_or_else(|| "0.0.0.0".to_string());
        config.listener.bind_address = format!("{host}:{port}");
    }
    match args.strategy.as_deref() {
        Some("session") => config.codec.strategy = CodecStrategy::Session,
        Some("direct") => config.codec.strategy = CodecStrategy::Direct,
        _ => {}
    }
}
