//! CLI entry point: `serve` starts the HTTP gateway against either backend,
//! `dump` inspects a distributed backend's metadata offline.

use clap::{Parser, Subcommand};
use s3gate::api;
use s3gate::config::{BackendConfig, Config};
use s3gate::metrics::Metrics;
use s3gate::storage::{dump_meta_dir, BlobStore, DirBackend, DistBackend, HttpBlobStore, LocalBlobStore, StorageBackend};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "s3gate", about = "S3-compatible object storage gateway")]
struct Cli {
    /// Path to a TOML config file; overrides S3GATE_CONFIG and the default search path.
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP gateway.
    Serve {
        /// Flat-filesystem backend root. Mutually exclusive with --blob-master/--meta-dir.
        #[arg(long)]
        root: Option<PathBuf>,

        /// Blob-store master URL for the distributed backend (http(s):// for a real
        /// master, or a bare directory path to use the local reference blob store).
        #[arg(long)]
        blob_master: Option<String>,

        /// Metadata directory for the distributed backend.
        #[arg(long)]
        meta_dir: Option<PathBuf>,

        #[arg(long)]
        listen: Option<SocketAddr>,

        #[arg(long)]
        service_host: Option<String>,
    },

    /// Dump a distributed backend's metadata tables as JSON.
    Dump {
        #[arg(long)]
        meta_dir: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::load(),
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    match cli.command {
        Command::Serve { root, blob_master, meta_dir, listen, service_host } => {
            if let Some(root) = root {
                config.backend = BackendConfig::Dir { root };
            } else if let (Some(blob_master), Some(meta_dir)) = (blob_master, meta_dir) {
                config.backend = BackendConfig::Distributed { blob_master, meta_dir };
            }
            if let Some(listen) = listen {
                config.listen_addr = listen;
            }
            if let Some(service_host) = service_host {
                config.service_host = service_host;
            }
            serve(config).await
        }
        Command::Dump { meta_dir } => dump(meta_dir),
    }
}

async fn serve(config: Config) -> anyhow::Result<()> {
    let backend: Box<dyn StorageBackend> = match &config.backend {
        BackendConfig::Dir { root } => Box::new(DirBackend::new(root.clone()).await?),
        BackendConfig::Distributed { blob_master, meta_dir } => {
            let blob: Arc<dyn BlobStore> = if blob_master.starts_with("http://") || blob_master.starts_with("https://") {
                Arc::new(HttpBlobStore::new(blob_master.clone()))
            } else {
                Arc::new(LocalBlobStore::new(PathBuf::from(blob_master)))
            };
            Box::new(DistBackend::new(meta_dir.clone(), blob).await?)
        }
    };

    let state = Arc::new(api::handlers::AppState {
        backend,
        service_host: config.service_host.clone(),
        metrics: Arc::new(Metrics::new()),
    });

    let app = api::build_router(state);

    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    info!(addr = %config.listen_addr, "s3gate listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

fn dump(meta_dir: PathBuf) -> anyhow::Result<()> {
    let owners = dump_meta_dir(&meta_dir)?;
    println!("{}", serde_json::to_string_pretty(&owners)?);
    Ok(())
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
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("shutdown signal received");
}
