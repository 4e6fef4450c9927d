use anyhow::Result;
use clap::{Parser, Subcommand};
use groundsearch_core::{CompletionBackend, Dispatcher, SearchRequest};
use groundsearch_openai::{OpenAiConfig, OpenAiResponsesClient};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

mod doctor;
#[cfg(feature = "stdio")]
mod mcp;

#[derive(Parser, Debug)]
#[command(name = "groundsearch")]
#[command(about = "Web-search-grounded answers from OpenAI models (MCP stdio server)", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run as an MCP stdio server exposing the `grounded_search` tool.
    #[cfg(feature = "stdio")]
    McpStdio(ClientArgs),
    /// Run one grounded search and print the answer to stdout.
    Search(SearchCmd),
    /// Diagnose configuration/launch issues (no secrets).
    Doctor(doctor::DoctorCmd),
    /// Print version info.
    Version(VersionCmd),
}

/// Outbound client settings, fixed for the life of the process.
#[derive(clap::Args, Debug, Clone)]
pub(crate) struct ClientArgs {
    /// Client-wide request timeout (ms). Reasoning + web search can take many minutes.
    #[arg(long, env = "GROUNDSEARCH_TIMEOUT_MS", default_value_t = 900_000)]
    timeout_ms: u64,
    /// Transparent retries on connection errors and 408/409/429/5xx.
    #[arg(long, env = "GROUNDSEARCH_MAX_RETRIES", default_value_t = 2)]
    max_retries: u32,
}

impl ClientArgs {
    pub(crate) fn timeout_ms(&self) -> u64 {
        self.timeout_ms
    }

    pub(crate) fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Build the one shared dispatcher. Fails when no API key is configured.
    fn dispatcher(&self) -> Result<Dispatcher> {
        let cfg = OpenAiConfig::from_env()?
            .with_timeout(Duration::from_millis(self.timeout_ms))
            .with_max_retries(self.max_retries);
        let client = OpenAiResponsesClient::new(cfg)?;
        info!(
            timeout_ms = self.timeout_ms,
            max_retries = self.max_retries,
            "openai client initialized"
        );
        let backend: Arc<dyn CompletionBackend> = Arc::new(client);
        Ok(Dispatcher::new(backend))
    }
}

#[derive(clap::Args, Debug)]
struct SearchCmd {
    /// Search query for current information.
    query: String,
    /// Model id (defaults to o3-2025-04-16).
    #[arg(long)]
    model: Option<String>,
    /// Reasoning effort: low|medium|high.
    #[arg(long)]
    reasoning_effort: Option<String>,
    #[command(flatten)]
    client: ClientArgs,
}

#[derive(clap::Args, Debug)]
struct VersionCmd {
    /// Output format: json|text
    #[arg(long = "output", alias = "format", default_value = "json")]
    output: String,
}

/// Load `GROUNDSEARCH_ENV_FILE` if set. Never overrides variables already in the environment.
fn load_env_file() -> Option<(PathBuf, std::result::Result<(), dotenvy::Error>)> {
    let p = std::env::var("GROUNDSEARCH_ENV_FILE").ok()?;
    let p = p.trim();
    if p.is_empty() {
        return None;
    }
    let path = PathBuf::from(p);
    let r = dotenvy::from_path(&path);
    Some((path, r))
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    // stdout carries JSON-RPC; diagnostics go to stderr only.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("groundsearch=info,groundsearch_core=info,groundsearch_openai=info,warn")
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        #[cfg(feature = "stdio")]
        Commands::McpStdio(args) => {
            let dispatcher = args.dispatcher()?;
            mcp::serve_stdio(dispatcher)
                .await
                .map_err(|e| anyhow::anyhow!(e.to_string()))?;
        }
        Commands::Search(args) => {
            let dispatcher = args.client.dispatcher()?;
            let req = SearchRequest {
                query: args.query,
                model: args.model,
                reasoning_effort: args.reasoning_effort,
            };
            let r = groundsearch_core::grounded_search(&dispatcher, &req).await;
            if r.is_error {
                anyhow::bail!(r.text);
            }
            println!("{}", r.text);
        }
        Commands::Doctor(args) => doctor::run(args).await?,
        Commands::Version(args) => {
            let name = env!("CARGO_PKG_NAME");
            let version = env!("CARGO_PKG_VERSION");
            if args.output.trim().eq_ignore_ascii_case("text") {
                println!("{name} {version}");
            } else {
                println!(
                    "{}",
                    serde_json::json!({ "name": name, "version": version })
                );
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let env_file = load_env_file();
    init_tracing();
    match env_file {
        Some((path, Ok(()))) => info!(path = %path.display(), "loaded env file"),
        Some((path, Err(e))) => warn!(path = %path.display(), error = %e, "env file not loaded"),
        None => {}
    }

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e:#}");
            std::process::ExitCode::FAILURE
        }
    }
}
