use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use jobscout_bridge::rpc::RpcDispatcher;
use jobscout_sync::{DEFAULT_KEYWORD, DEFAULT_LOCATION};
use tracing::error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry};

#[derive(Debug, Parser)]
#[command(name = "jobscout")]
#[command(about = "Scrape job offers and serve them to MCP clients")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Scrape one search into the job store
    Scrape {
        #[arg(default_value = DEFAULT_KEYWORD)]
        keyword: String,
        #[arg(default_value = DEFAULT_LOCATION)]
        location: String,
    },
    /// Serve JSON-RPC over HTTP
    Serve,
    /// Serve JSON-RPC over stdin/stdout
    Stdio,
}

#[tokio::main]
async fn main() -> Result<()> {
    // stdout belongs to the stdio transport
    Registry::default()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Commands::Scrape {
        keyword: DEFAULT_KEYWORD.to_string(),
        location: DEFAULT_LOCATION.to_string(),
    });

    if let Err(err) = run(command).await {
        error!("{err:#}");
        return Err(err);
    }
    Ok(())
}

async fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Scrape { keyword, location } => {
            let summary = jobscout_sync::run_scrape_from_env(&keyword, &location).await?;
            if summary.scraped == 0 {
                println!("No jobs found for '{}' in '{}'", summary.keyword, summary.location);
            } else {
                println!(
                    "{} jobs scraped and saved to {} (run_id={} skipped={})",
                    summary.scraped, summary.jobs_file, summary.run_id, summary.skipped
                );
            }
        }
        Commands::Serve => jobscout_web::serve_from_env().await?,
        Commands::Stdio => {
            let bridge = jobscout_bridge::build_bridge_from_env().await?;
            let dispatcher = Arc::new(RpcDispatcher::new(Arc::new(bridge)));
            jobscout_bridge::stdio::serve_stdio(dispatcher).await?;
        }
    }
    Ok(())
}
