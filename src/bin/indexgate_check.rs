//! indexgate-check - evaluate one request against an ACL configuration
//!
//! Reads a request context as JSON (from a file or stdin), runs it through the
//! configured blocks and prints the decision as JSON.

use anyhow::{Context, Result};
use clap::Parser;
use indexgate::acl::RuleRegistry;
use indexgate::{AclEngine, Config, RequestContext};
use std::io::Read;
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "indexgate-check")]
#[command(about = "Evaluate a request against an IndexGate access control configuration")]
#[command(version)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, default_value = "config/indexgate.toml")]
    config: PathBuf,

    /// Request context as JSON; read from stdin when omitted
    #[arg(short, long)]
    request: Option<PathBuf>,

    /// Print the resolved rule order of every block and exit
    #[arg(long)]
    explain: bool,

    /// Pretty-print JSON output
    #[arg(long)]
    pretty: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("INDEXGATE_LOG")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    indexgate::panic_handler::install_panic_hook();

    let cli = Cli::parse();

    info!("Loading configuration from: {}", cli.config.display());
    let config = match Config::from_file(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    let engine = AclEngine::from_config(&config, RuleRegistry::builtin())
        .await
        .context("failed to build access control blocks")?;

    if cli.explain {
        for block in engine.blocks().iter() {
            println!("{} [{}]: {}", block.name(), block.policy(), block.rule_keys().join(" -> "));
        }
        return Ok(());
    }

    let raw = match &cli.request {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("cannot read request from {}", path.display()))?,
        None => {
            let mut buffer = String::new();
            std::io::stdin()
                .read_to_string(&mut buffer)
                .context("cannot read request from stdin")?;
            buffer
        }
    };

    let request: RequestContext =
        serde_json::from_str(&raw).context("request is not a valid JSON request context")?;

    let decision = engine.decide(&request).await;
    let output = if cli.pretty {
        serde_json::to_string_pretty(&decision)?
    } else {
        serde_json::to_string(&decision)?
    };
    println!("{}", output);

    Ok(())
}
