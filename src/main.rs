use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use agile_planner::backlog::{self, validator, MaterializeReport, RunContext};
use agile_planner::config::Config;
use agile_planner::mcp;

#[derive(Parser)]
#[command(name = "agile-planner")]
#[command(about = "Materialize agile backlogs into linked markdown documents")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the MCP server via stdio (default)
    Mcp,
    /// Materialize a backlog JSON file
    Materialize {
        /// Backlog JSON, bare or wrapped as {success, result}
        file: PathBuf,

        /// Output root; .agile-planner-backlog is created inside it
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Validate a backlog JSON file without writing anything
    Validate {
        /// Backlog JSON, bare or wrapped as {success, result}
        file: PathBuf,
    },
}

/// Logs always go to stderr: stdout is the protocol channel in MCP mode and
/// carries the JSON report otherwise.
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "agile_planner=info".into()),
    );

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn read_json(file: &Path) -> anyhow::Result<serde_json::Value> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", file.display()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let config = Config::from_env()?;

    match cli.command {
        Some(Commands::Mcp) | None => {
            let shutdown = CancellationToken::new();
            let signal = shutdown.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::info!("Interrupt received, shutting down");
                    signal.cancel();
                }
            });

            mcp::run_stdio_server(config, shutdown).await?;
            // The blocking stdin reader cannot be cancelled; don't wait on it.
            std::process::exit(0);
        }
        Some(Commands::Materialize { file, output }) => {
            let input = read_json(&file)?;
            let ctx = RunContext::new(config.resolve_output_root(output.as_deref()));
            let result = backlog::materialize(&input, &ctx);
            let report = MaterializeReport::from(&result);

            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.success {
                std::process::exit(1);
            }
        }
        Some(Commands::Validate { file }) => {
            let input = read_json(&file)?;
            let report = validator::validate(&input);

            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.valid {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
