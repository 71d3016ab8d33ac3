use crate::cli::ModelArgs;
use clap::Args;
use listing_price::cleaning::ListingCleaner;
use listing_price::config::AppConfig;
use listing_price::error::AppError;
use listing_price::serving::{self, ListingRecord, PredictionService, ServingContext};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Args, Debug)]
pub(crate) struct PredictArgs {
    /// JSON file holding one listing object or an array of listings
    #[arg(long)]
    pub(crate) listing: PathBuf,
    #[command(flatten)]
    pub(crate) model: ModelArgs,
}

#[derive(Args, Debug)]
pub(crate) struct CleanArgs {
    /// Raw listings CSV export
    #[arg(long = "in", value_name = "PATH")]
    pub(crate) input: PathBuf,
    /// Destination for the cleaned feature table
    #[arg(long = "out", value_name = "PATH")]
    pub(crate) output: PathBuf,
}

/// Listings read from a predict input file.
#[derive(Debug, PartialEq)]
pub(crate) enum ListingInput {
    Single(ListingRecord),
    Batch(Vec<ListingRecord>),
}

pub(crate) fn parse_listing_input(raw: &str) -> Result<ListingInput, AppError> {
    let value: Value =
        serde_json::from_str(raw).map_err(|err| AppError::Input(err.to_string()))?;
    let input = if value.is_array() {
        ListingInput::Batch(
            serde_json::from_value(value).map_err(|err| AppError::Input(err.to_string()))?,
        )
    } else {
        ListingInput::Single(
            serde_json::from_value(value).map_err(|err| AppError::Input(err.to_string()))?,
        )
    };
    Ok(input)
}

fn load_context(args: ModelArgs, config: AppConfig) -> Result<ServingContext, AppError> {
    let model = args.apply(config.model);
    Ok(serving::load(&model.model_path, &model.meta_path)?)
}

pub(crate) fn run_predict(args: PredictArgs, config: AppConfig) -> Result<(), AppError> {
    let PredictArgs { listing, model } = args;
    let raw = std::fs::read_to_string(&listing)?;
    let input = parse_listing_input(&raw)?;

    let service = PredictionService::new(Arc::new(load_context(model, config)?));

    match input {
        ListingInput::Single(record) => {
            let price = service.predict(&record)?;
            println!("Predicted price: {price:.2} EUR per night");
        }
        ListingInput::Batch(records) => {
            let prices = service.predict_batch(&records)?;
            println!("Predicted prices for {} listings", prices.len());
            for (record, price) in records.iter().zip(&prices) {
                println!(
                    "- {} / {}: {price:.2} EUR per night",
                    record.neighbourhood, record.room_type
                );
            }
        }
    }

    Ok(())
}

pub(crate) fn run_model_info(args: ModelArgs, config: AppConfig) -> Result<(), AppError> {
    let context = load_context(args, config)?;
    let manifest = context.manifest();

    println!("Model: {}", context.model_path().display());
    match (manifest.created.as_deref(), manifest.created_at()) {
        (Some(_), Some(created)) => println!("Created: {created}"),
        (Some(raw), None) => println!("Created: {raw} (unrecognised format)"),
        (None, _) => println!("Created: unknown"),
    }
    println!("Target: {}", manifest.target);

    println!("\nFeature order");
    for (position, feature) in manifest.features.iter().enumerate() {
        println!("{:>2}. {}", position + 1, feature);
    }

    match &manifest.metrics {
        Some(metrics) if !metrics.is_empty() => {
            println!("\nValidation metrics");
            for (name, value) in metrics {
                println!("- {name}: {value}");
            }
        }
        _ => println!("\nValidation metrics: none recorded"),
    }

    Ok(())
}

pub(crate) fn run_clean(args: CleanArgs) -> Result<(), AppError> {
    println!("Loading {} ...", args.input.display());
    let summary = ListingCleaner::from_path(&args.input, &args.output)?;
    println!(
        "Saved {} | {} of {} rows kept",
        args.output.display(),
        summary.rows_written,
        summary.rows_read
    );
    println!("Columns: {}", summary.columns.join(", "));
    Ok(())
}
