//! Model serving CLI
//!
//! A command-line tool for checking health, inspecting the served model,
//! requesting predictions and smoke testing a deployed model server.

mod client;
mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{serving, smoke};
use std::path::PathBuf;
use std::time::Duration;

/// Model serving CLI
#[derive(Parser)]
#[command(name = "mlserve")]
#[command(author, version, about = "CLI for the Model Serving API", long_about = None)]
pub struct Cli {
    /// API endpoint URL (can also be set via MLSERVE_API_URL env var)
    #[arg(long, env = "MLSERVE_API_URL", default_value = "http://localhost:8000")]
    pub api_url: String,

    /// Request timeout in seconds
    #[arg(long, default_value_t = 30)]
    pub timeout: u64,

    /// Output format
    #[arg(long, short, default_value = "table")]
    pub format: output::OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show server health
    Health,

    /// Show the model currently served
    Info,

    /// Request a prediction
    Predict {
        /// Feature value as name=value (repeatable)
        #[arg(long = "feature", short = 'F', value_name = "NAME=VALUE")]
        features: Vec<String>,

        /// JSON file with a request body or a feature object
        #[arg(long, short)]
        input: Option<PathBuf>,

        /// Model identifier overriding the server default
        #[arg(long, short)]
        model: Option<String>,
    },

    /// Print Prometheus metrics
    Metrics {
        /// Only show metrics whose name starts with this prefix
        #[arg(long)]
        filter: Option<String>,
    },

    /// Run smoke tests against a deployed server
    Smoke {
        /// Attempts per check
        #[arg(long, default_value_t = 5)]
        retries: u32,

        /// Delay between attempts in seconds
        #[arg(long, default_value_t = 5)]
        retry_delay: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize client
    let client = client::ApiClient::with_timeout(&cli.api_url, Duration::from_secs(cli.timeout))?;

    // Execute command
    match cli.command {
        Commands::Health => {
            serving::show_health(&client, cli.format).await?;
        }
        Commands::Info => {
            serving::show_model_info(&client, cli.format).await?;
        }
        Commands::Predict {
            features,
            input,
            model,
        } => {
            serving::predict(&client, &features, input.as_deref(), model, cli.format).await?;
        }
        Commands::Metrics { filter } => {
            serving::show_metrics(&client, filter.as_deref()).await?;
        }
        Commands::Smoke {
            retries,
            retry_delay,
        } => {
            let policy = smoke::RetryPolicy::new(retries, Duration::from_secs(retry_delay));
            smoke::run(&client, policy).await?;
        }
    }

    Ok(())
}
