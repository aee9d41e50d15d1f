//! CLI for PostureLedger operations.
//!
//! Subcommands:
//! - `collect`: Run one collection pass over an inventory document.
//! - `list`: Print the evidence index.
//! - `export`: Write a manifest for the given ids and print its signed link.
//! - `verify`: Recompute a stored record's content hash.
//! - `reindex`: Restore index entries for orphaned evidence blobs.
//! - `rules`: Print the effective rule table.
//!
//! Exit codes: 0 = success, 1 = partial failure or integrity mismatch, 2 = error.

use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use postureledger_compliance::config::{ServiceConfig, ServiceFlags};
use postureledger_compliance::inventory::fixture::StaticInventory;

#[derive(Parser)]
#[command(name = "postureledger", about = "Cloud posture evidence ledger")]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,
    #[command(subcommand)]
    command: Commands,
}

/// Overrides for values otherwise read from POSTURELEDGER_* or `.env.postureledger`.
#[derive(Args)]
struct GlobalArgs {
    /// Cloud account id recorded on collected evidence.
    #[arg(long, global = true)]
    account: Option<String>,
    #[arg(long, global = true)]
    region: Option<String>,
    /// Resource type tag or short name (e.g. "s3").
    #[arg(long, global = true)]
    resource_type: Option<String>,
    /// Directory holding the blob store and index.
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
    /// Rule table JSON; the builtin table is used when omitted.
    #[arg(long, global = true)]
    rules: Option<PathBuf>,
    #[arg(long, global = true)]
    concurrency: Option<usize>,
    #[arg(long, global = true)]
    public_base_url: Option<String>,
    /// Hex-encoded Ed25519 seed (32 bytes = 64 hex chars) for export links.
    #[arg(long, global = true)]
    signing_key: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one collection pass.
    Collect {
        /// Path to the inventory JSON document.
        #[arg(long)]
        inventory: PathBuf,
    },
    /// Print every index entry.
    List,
    /// Export selected evidence as a signed manifest.
    Export {
        /// Evidence id to include; repeat for several.
        #[arg(long = "id", required = true)]
        ids: Vec<String>,
    },
    /// Check a stored record against its recorded hash.
    Verify {
        #[arg(long)]
        id: String,
    },
    /// Restore index entries for evidence blobs missing from the index.
    Reindex,
    /// Print the effective rule table.
    Rules,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let exit_code = match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            2
        }
    };
    process::exit(exit_code);
}

async fn run(cli: Cli) -> anyhow::Result<i32> {
    let g = cli.global;
    let flags = ServiceFlags {
        account: g.account,
        region: g.region,
        resource_type: g.resource_type,
        data_dir: g.data_dir,
        rules_path: g.rules,
        concurrency: g.concurrency,
        public_base_url: g.public_base_url,
        signing_key_hex: g.signing_key,
        ..Default::default()
    };
    let cwd = std::env::current_dir()?;
    let config = ServiceConfig::resolve(&flags, &cwd)?;

    match cli.command {
        Commands::Collect { inventory } => {
            let source = StaticInventory::from_path(&inventory)?;
            let summary = config.collector(Arc::new(source))?.run().await;
            print_json(&summary)?;
            Ok(if summary.is_clean() { 0 } else { 1 })
        }
        Commands::List => {
            let entries = config.open_store().list().await?;
            print_json(&entries)?;
            Ok(0)
        }
        Commands::Export { ids } => {
            let descriptor = config.export_service()?.export(&ids).await?;
            print_json(&descriptor)?;
            Ok(0)
        }
        Commands::Verify { id } => {
            let report = config.open_store().verify(&id).await?;
            print_json(&report)?;
            Ok(if report.intact { 0 } else { 1 })
        }
        Commands::Reindex => {
            let report = config.open_store().reindex().await?;
            print_json(&report)?;
            Ok(if report.skipped.is_empty() { 0 } else { 1 })
        }
        Commands::Rules => {
            print_json(&config.rule_table()?)?;
            Ok(0)
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
