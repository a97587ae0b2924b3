//! respkv server entry point.
//!
//! Parses configuration, sets up logging, binds the listener and runs the
//! accept loop until Ctrl+C.

use anyhow::Context;
use clap::Parser;
use respkv::storage::StorageEngine;
use respkv::{server, DEFAULT_HOST, DEFAULT_PORT};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Server configuration
#[derive(Parser, Debug)]
#[command(name = "respkv", version, about = "A minimal in-memory key-value server")]
struct Config {
    /// Host to bind to
    #[arg(long, env = "RESPKV_HOST", default_value = DEFAULT_HOST)]
    host: String,

    /// Port to listen on
    #[arg(short, long, env = "RESPKV_PORT", default_value_t = DEFAULT_PORT)]
    port: u16,
}

impl Config {
    fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_target(false)
        .init();

    info!("respkv v{} starting", respkv::VERSION);

    // Shared by every connection for the lifetime of the process.
    let storage = Arc::new(StorageEngine::new());

    let listener = match TcpListener::bind(config.bind_address()).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(address = %config.bind_address(), error = %e, "Failed to bind");
            return Err(e).with_context(|| format!("failed to bind to {}", config.bind_address()));
        }
    };

    let shutdown = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Shutdown signal received, stopping server...");
    };

    tokio::select! {
        _ = server::run(listener, storage) => {}
        _ = shutdown => {}
    }

    info!("Server shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::try_parse_from(["respkv"]).unwrap();
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.host, DEFAULT_HOST);
        assert_eq!(config.bind_address(), "0.0.0.0:6379");
    }

    #[test]
    fn test_flags() {
        let config =
            Config::try_parse_from(["respkv", "--host", "127.0.0.1", "-p", "6380"]).unwrap();
        assert_eq!(config.bind_address(), "127.0.0.1:6380");
    }

    #[test]
    fn test_invalid_port() {
        assert!(Config::try_parse_from(["respkv", "--port", "notaport"]).is_err());
        assert!(Config::try_parse_from(["respkv", "--port", "70000"]).is_err());
    }
}
