//! # Recall CLI (`recall`)
//!
//! Runs the HTTP server, pushes captured items to it, asks questions, and
//! offers small debugging aids for configuration and dedupe behavior.
//!
//! ## Usage
//!
//! ```bash
//! recall --config ./config/recall.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `recall serve` | Start the HTTP API |
//! | `recall submit <file\|->` | Submit JSON Lines items through the seen-set |
//! | `recall ask "<question>"` | Query a running server |
//! | `recall check-config` | Validate and print the effective config |
//! | `recall normalize "<text>"` | Show normalized text, fingerprint, identity |

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use recall::client::{run_ask, run_submit};
use recall::config::{self, sanitize_base_url, Config};
use recall::logging::init_logging;
use recall::server::run_server;
use recall::service::QueryRequest;
use recall_core::fingerprint::{fingerprint, resolve_identity};
use recall_core::normalize::normalize;

/// Recall: a semantic item store with dedupe and widening retrieval.
///
/// All commands accept `--config`. A missing file means defaults
/// (hash embeddings, no summarization). See `config/recall.example.toml`.
#[derive(Parser)]
#[command(name = "recall", version, about = "Semantic item store with dedupe and widening retrieval")]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/recall.toml")]
    config: PathBuf,

    /// Log at debug level unless `RUST_LOG` says otherwise.
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server on `[server].bind`.
    Serve,

    /// Submit items from a JSON Lines file (`-` for stdin).
    ///
    /// Each line is a `POST /api/items` body. Identities already handled
    /// in this run are skipped locally.
    Submit {
        /// Input file, or `-` for stdin.
        input: PathBuf,

        /// Server URL; defaults to `[capture].server_url`.
        #[arg(long)]
        server: Option<String>,

        /// Extra passes over the same input.
        #[arg(long, default_value_t = 0)]
        rescan: usize,

        /// Store without asking for an analysis verdict.
        #[arg(long)]
        no_analyze: bool,
    },

    /// Ask a question against a running server.
    Ask {
        question: String,

        #[arg(long)]
        server: Option<String>,

        /// Number of distinct items to retrieve.
        #[arg(long)]
        limit: Option<i64>,

        /// Return raw nearest neighbors without identity dedupe.
        #[arg(long)]
        no_dedupe: bool,

        /// Completion model hint.
        #[arg(long)]
        model: Option<String>,
    },

    /// Validate the config file and print the effective settings.
    CheckConfig,

    /// Print normalized text, fingerprint, and identity for TEXT.
    Normalize {
        text: String,

        #[arg(long)]
        external_id: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config_path = cli.config;

    match cli.command {
        Commands::Serve => {
            let cfg = config::load_config(&config_path)?;
            run_server(&cfg).await?;
        }
        Commands::Submit {
            input,
            server,
            rescan,
            no_analyze,
        } => {
            let cfg = config::load_config(&config_path)?;
            run_submit(&cfg, &input, server.as_deref(), rescan, !no_analyze).await?;
        }
        Commands::Ask {
            question,
            server,
            limit,
            no_dedupe,
            model,
        } => {
            let cfg = config::load_config(&config_path)?;
            let req = QueryRequest {
                query: question,
                max_results: limit,
                dedupe: if no_dedupe { Some(false) } else { None },
                model,
            };
            run_ask(&cfg, server.as_deref(), &req).await?;
        }
        Commands::CheckConfig => {
            let cfg = config::load_config(&config_path)?;
            print_config(&cfg);
        }
        // Pure helper, no config needed.
        Commands::Normalize { text, external_id } => {
            println!("normalized: {}", normalize(&text));
            println!("fingerprint: {}", fingerprint(&text));
            println!("identity: {}", resolve_identity(external_id.as_deref(), &text));
        }
    }

    Ok(())
}

fn print_config(cfg: &Config) {
    println!("server.bind: {}", cfg.server.bind);
    match cfg.store.dims {
        Some(d) => println!("store.dims: {}", d),
        None => println!("store.dims: (first insert)"),
    }
    println!("embedding.provider: {}", cfg.embedding.provider);
    match cfg.embedding.provider.as_str() {
        "openai" => {
            println!("embedding.model: {}", cfg.embedding.model);
            println!(
                "embedding.base_url: {}",
                sanitize_base_url(cfg.embedding.base_url.as_deref())
            );
        }
        "hash" => println!("embedding.dims: {}", cfg.embedding.dims),
        _ => {}
    }
    println!("completion.provider: {}", cfg.completion.provider);
    if cfg.completion.is_enabled() {
        println!("completion.model: {}", cfg.completion.model);
        println!(
            "completion.base_url: {}",
            sanitize_base_url(cfg.completion.base_url.as_deref())
        );
    }
    println!(
        "retrieval: default_target={} max_target={} dedupe={}",
        cfg.retrieval.default_target, cfg.retrieval.max_target, cfg.retrieval.dedupe
    );
    println!(
        "capture: server_url={} seen_capacity={}",
        cfg.capture.server_url, cfg.capture.seen_capacity
    );
    println!("config ok");
}
