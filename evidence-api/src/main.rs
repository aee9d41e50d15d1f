use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use postureledger_compliance::config::{ServiceConfig, ServiceFlags};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "postureledger-api",
    about = "PostureLedger evidence query and export API"
)]
struct Args {
    /// Listen address
    #[arg(long, env = "POSTURELEDGER_API_HOST", default_value = "0.0.0.0")]
    host: String,
    /// Listen port
    #[arg(long, env = "POSTURELEDGER_API_PORT", default_value = "8080")]
    port: u16,
    /// Allowed CORS origins (repeatable). If omitted, all origins are allowed.
    #[arg(long = "cors-origin")]
    cors_origins: Vec<String>,
    /// Directory holding the blob store and index.
    #[arg(long)]
    data_dir: Option<PathBuf>,
    /// Base URL placed in export links (e.g. https://ledger.example.com).
    #[arg(long)]
    public_base_url: Option<String>,
    /// Lifetime of export links in seconds.
    #[arg(long)]
    link_ttl_secs: Option<u64>,
    /// Hex-encoded Ed25519 seed for signing export links.
    /// Can also be set via POSTURELEDGER_SIGNING_KEY.
    #[arg(long)]
    signing_key: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let flags = ServiceFlags {
        data_dir: args.data_dir,
        public_base_url: args.public_base_url,
        link_ttl_secs: args.link_ttl_secs,
        signing_key_hex: args.signing_key,
        ..Default::default()
    };
    let config = ServiceConfig::resolve(&flags, &std::env::current_dir()?)
        .context("invalid configuration")?;
    tracing::info!(
        blobs = %config.blob_root.display(),
        index = %config.index_root.display(),
        link_ttl_secs = config.link_ttl.as_secs(),
        "evidence store configured"
    );

    if args.cors_origins.is_empty() {
        tracing::warn!("No --cors-origin specified; CORS is fully permissive");
    } else {
        tracing::info!("CORS allowed origins: {:?}", args.cors_origins);
    }

    let state = postureledger_api::AppState::new(config.export_service()?);
    let app = postureledger_api::build_router_with_origins(state, &args.cors_origins);

    let addr = format!("{}:{}", args.host, args.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("cannot bind {}", addr))?;
    tracing::info!("PostureLedger API listening on {}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}
