//! SnapKV server entry point.
//!
//! Parses the command line, sets up logging, binds the listener and runs
//! the server until Ctrl+C.

use anyhow::Context;
use clap::Parser;
use snapkv::{Server, ServerConfig};
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn print_banner(config: &ServerConfig) {
    let saves = match config.save_interval() {
        Some(interval) => format!("every {}s", interval.as_secs()),
        None => "at shutdown only".to_string(),
    };
    println!(
        r#"
SnapKV v{} - In-Memory Key-Value Server
──────────────────────────────────────────────────────────────
Address:   {}
Snapshot:  {} (saved {})

Use Ctrl+C to shutdown gracefully.
"#,
        snapkv::VERSION,
        config.bind_address(),
        config.snapshot.display(),
        saves,
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    print_banner(&config);

    let listener = TcpListener::bind(config.bind_address())
        .await
        .with_context(|| format!("failed to bind {}", config.bind_address()))?;
    info!(addr = %config.bind_address(), "Listening");

    let shutdown = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    // A failed final snapshot is logged by the server; exit status stays 0.
    let _ = Server::new(config).run(listener, shutdown).await;
    Ok(())
}
