use std::sync::Arc;

use tracing::{debug, warn};

use super::listing::{ListingRecord, ListingValidationError};
use super::manifest::{FeatureManifest, ServingContext};
use super::model::{FeatureFrame, ModelError};

/// Rounds a raw prediction to euro cents.
pub fn round_price(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Builds the model input for `records` with columns named and ordered by
/// `feature_order`. Values are always looked up by name.
pub fn project(
    records: &[ListingRecord],
    feature_order: &[String],
) -> Result<FeatureFrame, PredictionError> {
    let mut frame = FeatureFrame::new(feature_order.to_vec());
    for record in records {
        let row = feature_order
            .iter()
            .map(|feature| {
                record
                    .feature(feature)
                    .ok_or_else(|| PredictionError::MissingFeature(feature.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        frame.push_row(row);
    }
    Ok(frame)
}

/// Read-only prediction front end over a loaded [`ServingContext`].
#[derive(Debug, Clone)]
pub struct PredictionService {
    context: Arc<ServingContext>,
}

impl PredictionService {
    pub fn new(context: Arc<ServingContext>) -> Self {
        Self { context }
    }

    pub fn context(&self) -> &ServingContext {
        &self.context
    }

    pub fn manifest(&self) -> &FeatureManifest {
        self.context.manifest()
    }

    /// Predicts the nightly price of a single listing.
    pub fn predict(&self, record: &ListingRecord) -> Result<f64, PredictionError> {
        record.validate().map_err(|source| PredictionError::Validation {
            index: None,
            source,
        })?;
        let mut prices = self.run(std::slice::from_ref(record))?;
        prices.pop().ok_or(PredictionError::OutputLength {
            expected: 1,
            actual: 0,
        })
    }

    /// Predicts prices for `records`, preserving input order. An empty batch
    /// never reaches the model.
    pub fn predict_batch(&self, records: &[ListingRecord]) -> Result<Vec<f64>, PredictionError> {
        if records.is_empty() {
            return Ok(Vec::new());
        }

        for (index, record) in records.iter().enumerate() {
            record
                .validate()
                .map_err(|source| PredictionError::Validation {
                    index: Some(index),
                    source,
                })?;
        }

        self.run(records)
    }

    fn run(&self, records: &[ListingRecord]) -> Result<Vec<f64>, PredictionError> {
        let frame = project(records, self.context.feature_order())?;
        debug!(rows = frame.len(), columns = ?frame.columns(), "running model");

        let raw = self.context.model().predict(&frame)?;
        if raw.len() != records.len() {
            return Err(PredictionError::OutputLength {
                expected: records.len(),
                actual: raw.len(),
            });
        }

        raw.into_iter()
            .enumerate()
            .map(|(index, value)| {
                // Rounding scales by 100, so a huge finite value can overflow here.
                let price = round_price(value);
                if !price.is_finite() {
                    return Err(PredictionError::NonFinite { index });
                }
                if value < 0.0 {
                    warn!(index, value, "model produced a negative price, clamping to zero");
                    return Ok(0.0);
                }
                Ok(price)
            })
            .collect()
    }
}

/// Error raised while serving a prediction.
#[derive(Debug, thiserror::Error)]
pub enum PredictionError {
    #[error("{}{source}", index_prefix(.index))]
    Validation {
        index: Option<usize>,
        source: ListingValidationError,
    },
    #[error("listing does not provide manifest feature '{0}'")]
    MissingFeature(String),
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error("model returned {actual} predictions for {expected} rows")]
    OutputLength { expected: usize, actual: usize },
    #[error("model returned a non-finite prediction for row {index}")]
    NonFinite { index: usize },
}

fn index_prefix(index: &Option<usize>) -> String {
    match index {
        Some(index) => format!("listing {index}: "),
        None => String::new(),
    }
}
