//! claimtrie CLI - inspect and repair a claim trie change log
//!
//! Every command prints one JSON document to stdout so the output can be
//! piped into other tooling.

use anyhow::Context;
use claimtrie::{ChangeRepo, ClaimTrie, Config, Node};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "claimtrie")]
#[command(about = "Inspect the change log of a name-claim trie")]
#[command(version)]
struct Cli {
    /// Path to the change-log file (overrides the config file)
    #[arg(short, long)]
    log: Option<PathBuf>,

    /// JSON config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output format (json or text)
    #[arg(short, long, default_value = "json")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
enum OutputFormat {
    Json,
    Text,
}

#[derive(Subcommand)]
enum Commands {
    /// Print every change record of a name
    Dump {
        name: String,
    },

    /// List names with records
    Names {
        /// Only names starting with this prefix
        #[arg(short, long, default_value = "")]
        prefix: String,
        /// Maximum number of names to return
        #[arg(short = 'n', long)]
        limit: Option<usize>,
        /// Only names with a winner, with their committed digests
        #[arg(short, long)]
        winners: bool,
    },

    /// Show the resolved state of a name
    Resolve {
        name: String,
        /// Resolve at an earlier height instead of the tip
        #[arg(long)]
        height: Option<u32>,
    },

    /// Show the committed height and root hash
    Root,

    /// Drop every block above a height
    Rollback {
        height: u32,
    },

    /// Print the effective configuration
    Config,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;

    match cli.command {
        Commands::Config => {
            output(&cli.format, &serde_json::to_value(&config)?)?;
        }

        Commands::Dump { name } => {
            let trie = open_trie(&config)?;
            let changes = trie.repo().load(name.as_bytes())?;
            let records: Vec<serde_json::Value> = changes
                .iter()
                .map(|c| {
                    serde_json::json!({
                        "height": c.height,
                        "kind": c.kind.as_str(),
                        "claim_id": c.claim_id.to_hex(),
                        "outpoint": c.outpoint.to_string(),
                        "amount": c.amount,
                        "value": hex::encode(&c.value),
                        "active_height": c.active_height,
                        "visible_height": c.visible_height,
                    })
                })
                .collect();
            output(
                &cli.format,
                &serde_json::json!({
                    "name": name,
                    "count": records.len(),
                    "changes": records
                }),
            )?;
        }

        Commands::Names {
            prefix,
            limit,
            winners,
        } => {
            let trie = open_trie(&config)?;
            let limit = limit.unwrap_or(usize::MAX);
            let names: Vec<serde_json::Value> = if winners {
                trie.winners_with_prefix(prefix.as_bytes())
                    .into_iter()
                    .take(limit)
                    .map(|(name, digest)| {
                        serde_json::json!({
                            "name": name.escape_ascii().to_string(),
                            "digest": digest.to_hex()
                        })
                    })
                    .collect()
            } else {
                trie.names_with_prefix(prefix.as_bytes())?
                    .into_iter()
                    .take(limit)
                    .map(|name| serde_json::json!(name.escape_ascii().to_string()))
                    .collect()
            };
            output(
                &cli.format,
                &serde_json::json!({
                    "count": names.len(),
                    "names": names
                }),
            )?;
        }

        Commands::Resolve { name, height } => {
            let trie = open_trie(&config)?;
            let node = match height {
                Some(h) => trie.node_at(name.as_bytes(), h)?,
                None => trie.node(name.as_bytes())?,
            };
            output(&cli.format, &node_json(&node))?;
        }

        Commands::Root => {
            let trie = open_trie(&config)?;
            output(
                &cli.format,
                &serde_json::json!({
                    "height": trie.height(),
                    "root": trie.root_hash().to_hex(),
                    "names": trie.len()
                }),
            )?;
        }

        Commands::Rollback { height } => {
            let mut trie = open_trie(&config)?;
            let from = trie.height();
            trie.drop_above(height)?;
            output(
                &cli.format,
                &serde_json::json!({
                    "status": "ok",
                    "from": from,
                    "height": trie.height(),
                    "root": trie.root_hash().to_hex()
                }),
            )?;
            trie.close()?;
        }
    }

    Ok(())
}

fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("reading config {}", path.display()))?,
        None => Config::default(),
    };
    if let Some(log) = &cli.log {
        config.path = log.clone();
    }
    Ok(config)
}

fn open_trie(config: &Config) -> anyhow::Result<ClaimTrie> {
    if !config.path.exists() {
        anyhow::bail!("No change log at {}", config.path.display());
    }
    let trie = ClaimTrie::open(config)
        .with_context(|| format!("opening {}", config.path.display()))?;
    Ok(trie)
}

fn node_json(node: &Node) -> serde_json::Value {
    let winner = node.best_claim().map(|c| {
        serde_json::json!({
            "claim_id": c.claim_id.to_hex(),
            "outpoint": c.outpoint.to_string(),
            "amount": c.amount,
            "effective_amount": node.effective_amount(&c.claim_id),
            "value": hex::encode(&c.value),
            "active_height": c.active_height
        })
    });
    serde_json::json!({
        "name": node.name().escape_ascii().to_string(),
        "height": node.height(),
        "state": node.state().as_str(),
        "takeover_height": node.takeover_height(),
        "winner": winner,
        "claims": node.claims().len(),
        "supports": node.supports().len()
    })
}

fn output(format: &OutputFormat, value: &serde_json::Value) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string(value)?);
        }
        OutputFormat::Text => {
            println!("{}", serde_json::to_string_pretty(value)?);
        }
    }
    Ok(())
}
