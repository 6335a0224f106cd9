//! gcsproxy - serve a Cloud Storage bucket over HTTP

use clap::Parser;
use gcsproxy::{config::Backend, run_server, FileConfig};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "gcsproxy")]
#[command(about = "Serve, write and browse a Google Cloud Storage bucket over HTTP")]
#[command(version)]
struct Args {
    /// Host to bind to
    #[arg(short = 'H', long, default_value = "0.0.0.0", env = "GCSPROXY_HOST")]
    host: String,

    /// Port to listen on
    #[arg(short, long, default_value = "8080", env = "GCSPROXY_PORT")]
    port: u16,

    /// Configuration file (TOML); gcsproxy.toml is read when present
    #[arg(short, long, env = "GCSPROXY_CONFIG")]
    config: Option<PathBuf>,

    /// Use in-memory storage (for testing, data will not persist)
    #[arg(long, env = "GCSPROXY_MEMORY_STORE")]
    memory_store: bool,

    /// Directory serving requests the gateway passes through
    #[arg(long, env = "GCSPROXY_FALLBACK_DIR")]
    fallback_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, env = "GCSPROXY_DEBUG")]
    debug: bool,

    /// Emit logs as JSON lines
    #[arg(long, env = "GCSPROXY_LOG_JSON")]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let log_level = if args.debug { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("gcsproxy={log_level},tower_http={log_level}").into());
    let registry = tracing_subscriber::registry().with(filter);
    if args.log_json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    let mut file_config = FileConfig::load(args.config.as_deref())?;
    if args.memory_store {
        file_config.backend = Backend::Memory;
    }
    let (config, settings) = file_config.into_parts()?;

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    tracing::info!(
        root = %config.root,
        put = config.enable_put,
        delete = config.enable_delete,
        browse = config.enable_browse,
        "Starting gcsproxy on {}",
        addr
    );

    run_server(addr, config, settings, args.fallback_dir).await
}
