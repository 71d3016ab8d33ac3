use crate::commands::{run_clean, run_model_info, run_predict, CleanArgs, PredictArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use listing_price::config::{AppConfig, ModelConfig};
use listing_price::error::AppError;
use listing_price::serving::meta_path_for;
use listing_price::telemetry;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "Berlin Listing Price Service",
    about = "Serve and inspect nightly price predictions for Berlin short-term rentals",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Predict nightly prices for the listing(s) in a JSON file
    Predict(PredictArgs),
    /// Print the feature manifest of the configured model
    ModelInfo(ModelArgs),
    /// Clean a raw InsideAirbnb listings export into a feature table
    Clean(CleanArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
    #[command(flatten)]
    pub(crate) model: ModelArgs,
}

#[derive(Args, Debug, Default, Clone)]
pub(crate) struct ModelArgs {
    /// Model artifact to load instead of MODEL_PATH
    #[arg(long)]
    pub(crate) model_path: Option<PathBuf>,
    /// Manifest to load instead of META_PATH
    #[arg(long)]
    pub(crate) meta_path: Option<PathBuf>,
}

impl ModelArgs {
    /// Applies flag overrides on top of the environment-derived paths. A
    /// model override without a manifest override moves the sidecar along.
    pub(crate) fn apply(self, configured: ModelConfig) -> ModelConfig {
        let meta_path = match (&self.model_path, self.meta_path) {
            (_, Some(meta)) => meta,
            (Some(model), None) => meta_path_for(model),
            (None, None) => configured.meta_path,
        };
        ModelConfig {
            model_path: self.model_path.unwrap_or(configured.model_path),
            meta_path,
        }
    }
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Predict(args) => run_predict(args, prepare_one_shot()?),
        Command::ModelInfo(args) => run_model_info(args, prepare_one_shot()?),
        Command::Clean(args) => {
            prepare_one_shot()?;
            run_clean(args)
        }
    }
}

/// Config and logging for commands that run once and exit.
fn prepare_one_shot() -> Result<AppConfig, AppError> {
    let config = AppConfig::load()?;
    telemetry::init(&config.telemetry, config.environment)?;
    Ok(config)
}
