use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::response::Response;
use serde_json::Value;

use crate::serving::listing::{ListingRecord, LISTING_COLUMNS};
use crate::serving::manifest::{FeatureManifest, ServingContext};
use crate::serving::model::{FeatureFrame, ModelError, PriceModel};
use crate::serving::service::PredictionService;

pub(super) fn mitte() -> ListingRecord {
    ListingRecord {
        room_type: "Entire home/apt".to_string(),
        neighbourhood: "Mitte".to_string(),
        accommodates: 2,
        bedrooms: 1.0,
        bathrooms_num: 1.0,
        minimum_nights: 2,
        number_of_reviews: 10,
        reviews_per_month: 0.3,
        availability_365: 120,
    }
}

pub(super) fn kreuzberg() -> ListingRecord {
    ListingRecord {
        neighbourhood: "Kreuzberg".to_string(),
        accommodates: 4,
        bedrooms: 2.0,
        ..mitte()
    }
}

pub(super) fn mitte_json() -> Value {
    serde_json::json!({
        "room_type": "Entire home/apt",
        "neighbourhood": "Mitte",
        "accommodates": 2,
        "bedrooms": 1,
        "bathrooms_num": 1.0,
        "minimum_nights": 2,
        "number_of_reviews": 10,
        "reviews_per_month": 0.3,
        "availability_365": 120
    })
}

pub(super) fn manifest(features: &[&str]) -> FeatureManifest {
    FeatureManifest {
        features: features.iter().map(|f| f.to_string()).collect(),
        target: "price".to_string(),
        metrics: None,
        created: None,
    }
}

pub(super) fn training_manifest() -> FeatureManifest {
    manifest(&LISTING_COLUMNS)
}

/// Returns canned predictions and remembers every frame it was given.
#[derive(Default)]
pub(super) struct StubModel {
    outputs: Vec<f64>,
    calls: AtomicUsize,
    frames: Mutex<Vec<FeatureFrame>>,
    expected_columns: Option<Vec<String>>,
}

impl StubModel {
    pub(super) fn returning(outputs: &[f64]) -> Self {
        Self {
            outputs: outputs.to_vec(),
            ..Self::default()
        }
    }

    /// Fails the call unless the frame columns match `columns` exactly.
    pub(super) fn expecting_columns(mut self, columns: &[&str]) -> Self {
        self.expected_columns = Some(columns.iter().map(|c| c.to_string()).collect());
        self
    }

    pub(super) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(super) fn last_frame(&self) -> Option<FeatureFrame> {
        self.frames.lock().expect("frame mutex poisoned").last().cloned()
    }
}

impl PriceModel for StubModel {
    fn predict(&self, frame: &FeatureFrame) -> Result<Vec<f64>, ModelError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.frames
            .lock()
            .expect("frame mutex poisoned")
            .push(frame.clone());

        if let Some(expected) = &self.expected_columns {
            assert_eq!(frame.columns(), expected.as_slice(), "column order drifted");
        }

        Ok(self.outputs.iter().copied().take(frame.len()).collect())
    }
}

pub(super) struct FailingModel;

impl PriceModel for FailingModel {
    fn predict(&self, _frame: &FeatureFrame) -> Result<Vec<f64>, ModelError> {
        Err(ModelError::Invalid("tree ensemble corrupted".to_string()))
    }
}

pub(super) fn service_with<M>(model: Arc<M>, manifest: FeatureManifest) -> PredictionService
where
    M: PriceModel + 'static,
{
    let context = ServingContext::new(model, manifest, "models/stub.model.json");
    PredictionService::new(Arc::new(context))
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body readable");
    serde_json::from_slice(&bytes).expect("json body")
}
