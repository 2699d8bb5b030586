//! Tabular AutoML CLI
//!
//! A command-line tool for training models on server-side datasets,
//! scoring records and managing stored models.

mod client;
mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{health, models, predict, train};
use std::time::Duration;

/// Tabular AutoML CLI
#[derive(Parser)]
#[command(name = "automl")]
#[command(author, version, about = "CLI for the Tabular AutoML service", long_about = None)]
pub struct Cli {
    /// API endpoint URL (can also be set via AUTOML_API_URL env var)
    #[arg(long, env = "AUTOML_API_URL")]
    pub api_url: Option<String>,

    /// Output format
    #[arg(long, short)]
    pub format: Option<output::OutputFormat>,

    /// Request timeout in seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Train and rank models on a dataset
    Train {
        /// Dataset id (file stem under the server's data directory)
        dataset_id: String,

        /// Algorithm to train; repeat for several (defaults to the server's list)
        #[arg(long = "algorithm", short = 'a')]
        algorithms: Vec<String>,

        /// Target column (resolved automatically if not specified)
        #[arg(long)]
        target: Option<String>,

        /// Server-side run timeout in seconds
        #[arg(long)]
        run_timeout: Option<u64>,
    },

    /// Score a single record
    Predict {
        /// Dataset id the model was trained on
        dataset_id: String,

        /// Model name (uses the best model if not specified)
        #[arg(long, short)]
        model: Option<String>,

        /// Record as a JSON object
        #[arg(long, short)]
        input: Option<String>,

        /// Record field as key=value; repeatable and applied after --input
        #[arg(long = "field", short = 'F')]
        fields: Vec<String>,
    },

    /// Manage stored models
    #[command(subcommand)]
    Models(ModelsCommands),

    /// Show server health
    Health,

    /// Persist CLI defaults
    Config {
        /// Default API endpoint URL
        #[arg(long = "set-api-url")]
        api_url: Option<String>,

        /// Default output format
        #[arg(long = "set-format")]
        format: Option<output::OutputFormat>,

        /// Default request timeout in seconds
        #[arg(long = "set-timeout")]
        timeout_secs: Option<u64>,
    },
}

#[derive(Subcommand)]
pub enum ModelsCommands {
    /// List stored models for a dataset
    List {
        /// Dataset id
        dataset_id: String,
    },

    /// Delete a model, or all models of a dataset
    Delete {
        /// Dataset id
        dataset_id: String,

        /// Model name (deletes every model of the dataset if not specified)
        model: Option<String>,
    },
}

/// Training runs can be long; the HTTP timeout defaults accordingly
const DEFAULT_TIMEOUT_SECS: u64 = 300;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut settings = config::Config::load()?;

    let command = match cli.command {
        Commands::Config {
            api_url,
            format,
            timeout_secs,
        } => {
            settings.api_url = api_url.or(settings.api_url);
            settings.default_format = format.or(settings.default_format);
            settings.timeout_secs = timeout_secs.or(settings.timeout_secs);
            let path = settings.save()?;
            output::print_success(&format!("Saved configuration to {}", path.display()));
            return Ok(());
        }
        command => command,
    };

    let format = settings.resolve_format(cli.format);
    let timeout = cli
        .timeout
        .or(settings.timeout_secs)
        .unwrap_or(DEFAULT_TIMEOUT_SECS);

    // Initialize client
    let client = client::ApiClient::new(
        &settings.resolve_api_url(cli.api_url),
        Duration::from_secs(timeout),
    )?;

    // Execute command
    match command {
        Commands::Train {
            dataset_id,
            algorithms,
            target,
            run_timeout,
        } => {
            let request = client::TrainRequest {
                dataset_id,
                algorithms,
                target_column: target,
                timeout_secs: run_timeout,
            };
            train::train(&client, request, format).await?;
        }
        Commands::Predict {
            dataset_id,
            model,
            input,
            fields,
        } => {
            let request = client::PredictRequest {
                dataset_id,
                model_name: model,
                input_fields: predict::build_input(input.as_deref(), &fields)?,
            };
            predict::predict(&client, request, format).await?;
        }
        Commands::Models(models_cmd) => match models_cmd {
            ModelsCommands::List { dataset_id } => {
                models::list_models(&client, &dataset_id, format).await?;
            }
            ModelsCommands::Delete { dataset_id, model } => {
                models::delete_models(&client, &dataset_id, model.as_deref(), format).await?;
            }
        },
        Commands::Health => {
            health::show_health(&client, format).await?;
        }
        Commands::Config { .. } => {}
    }

    Ok(())
}
