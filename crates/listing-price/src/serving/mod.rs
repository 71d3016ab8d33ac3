//! Model-serving contract: manifest loading, listing validation, projection
//! into the manifest's feature order, and the HTTP surface over it.

pub mod listing;
pub mod manifest;
pub mod model;
pub mod onnx;
pub mod router;
pub mod service;

#[cfg(test)]
mod tests;

pub use listing::{FeatureValue, ListingRecord, ListingValidationError, LISTING_COLUMNS};
pub use manifest::{load, meta_path_for, FeatureManifest, ManifestError, ServingContext};
pub use model::{FeatureFrame, LinearPipeline, ModelArtifact, ModelError, PriceModel};
pub use onnx::{InputKind, OnnxInput, OnnxPriceModel};
pub use router::{
    prediction_router, BatchPredictionResponse, FeaturesResponse, ModelInfoResponse,
    PredictionResponse,
};
pub use service::{project, round_price, PredictionError, PredictionService};
