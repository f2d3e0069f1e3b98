//! Duplex RPC client - serves JSON-RPC requests pushed over a WebSocket.
//!
//! Dials the configured WebSocket endpoint (optionally through an HTTP
//! proxy), registers the demonstration service and answers requests until
//! the connection closes or Ctrl-C is pressed.

mod service;

use anyhow::{Context, Result};
use clap::Parser;
use duplex_rpc::{Client, ClientConfig, TransportConfig};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn, Level};
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "duplex-rpc-client")]
#[command(about = "Serve JSON-RPC requests over an outbound WebSocket")]
struct Args {
    /// WebSocket address, e.g. 192.168.158.129:8080
    #[arg(long = "ws", default_value = TransportConfig::DEFAULT_ADDR)]
    addr: String,

    /// HTTP proxy URL, e.g. http://localhost:8888
    #[arg(long)]
    proxy: Option<String>,

    /// Request path for the WebSocket upgrade
    #[arg(long, default_value = TransportConfig::DEFAULT_PATH)]
    path: String,

    /// Namespace used for method names without a `Service.` prefix
    #[arg(long)]
    default_namespace: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Also write logs to this file
    #[arg(long)]
    log_file: Option<PathBuf>,
}

impl Args {
    fn to_config(&self) -> ClientConfig {
        let mut config = ClientConfig::new(self.addr.clone());
        config.path = self.path.clone();
        if let Some(proxy) = self.proxy.as_deref().filter(|p| !p.is_empty()) {
            config = config.with_proxy(proxy);
        }
        if let Some(namespace) = &self.default_namespace {
            config = config.with_default_namespace(namespace.clone());
        }
        config
    }
}

/// Open `path` for appending, creating it and its parent directory.
fn open_log_file(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating log directory {}", parent.display()))?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("opening log file {}", path.display()))
}

fn init_logging(debug: bool, log_file: Option<&Path>) -> Result<()> {
    let log_level = if debug { Level::DEBUG } else { Level::INFO };
    let builder = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .compact();

    match log_file {
        Some(path) => {
            let file = Arc::new(open_log_file(path)?);
            builder
                .with_ansi(false)
                .with_writer(std::io::stdout.and(file))
                .init();
        }
        None => builder.init(),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.debug, args.log_file.as_deref())?;

    info!("Starting duplex RPC client");

    let config = args.to_config();
    config.validate()?;

    let client = Client::new(config);
    client.register_service(service::Service1, None)?;

    client.dispatcher().register_before_hook(|info| {
        debug!("Calling {}", info.method);
    });
    client.dispatcher().register_after_hook(|info| match &info.error {
        Some(err) => warn!("{} finished with {}: {}", info.method, info.status_code, err),
        None => debug!("{} finished with {}", info.method, info.status_code),
    });

    info!("Client key: {}", client.client_key());

    tokio::select! {
        result = client.run() => {
            let reason = result?;
            if reason.is_clean() {
                info!("Connection closed");
            } else {
                warn!("Connection lost: {:?}", reason);
            }
        }
        signal = tokio::signal::ctrl_c() => {
            signal?;
            info!("Shutdown signal received, exiting");
        }
    }

    Ok(())
}
