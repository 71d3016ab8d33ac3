use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use listing_price::serving::{
    load, meta_path_for, prediction_router, ListingRecord, ManifestError, ModelError,
    PredictionService,
};
use serde_json::{json, Value};
use tower::ServiceExt;

const ARTIFACT: &str = r#"{
    "kind": "linear_pipeline",
    "intercept": 60.0,
    "numeric": [
        { "column": "accommodates", "mean": 2.0, "scale": 1.0, "weight": 20.0 },
        { "column": "bedrooms", "mean": 1.0, "scale": 1.0, "weight": 10.0 }
    ],
    "categorical": [
        { "column": "room_type", "levels": { "Entire home/apt": 30.0, "Private room": -10.0 } },
        { "column": "neighbourhood", "levels": { "Mitte": 15.0, "Kreuzberg": 5.0 } }
    ]
}"#;

const FEATURES: [&str; 9] = [
    "room_type",
    "neighbourhood",
    "accommodates",
    "bedrooms",
    "bathrooms_num",
    "minimum_nights",
    "number_of_reviews",
    "reviews_per_month",
    "availability_365",
];

struct ModelDir {
    root: PathBuf,
}

impl ModelDir {
    fn new() -> Self {
        static COUNTER: AtomicUsize = AtomicUsize::new(0);
        let root = std::env::temp_dir().join(format!(
            "listing-price-{}-{}",
            std::process::id(),
            COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        fs::create_dir_all(&root).expect("temp dir created");
        Self { root }
    }

    fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.root.join(name);
        fs::write(&path, contents).expect("file written");
        path
    }

    fn model_with_meta(&self, meta: &Value) -> (PathBuf, PathBuf) {
        let model_path = self.write("baseline.model.json", ARTIFACT);
        let meta_path = meta_path_for(&model_path);
        fs::write(&meta_path, meta.to_string()).expect("meta written");
        (model_path, meta_path)
    }
}

impl Drop for ModelDir {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.root);
    }
}

fn listing(neighbourhood: &str) -> ListingRecord {
    ListingRecord {
        room_type: "Entire home/apt".to_string(),
        neighbourhood: neighbourhood.to_string(),
        accommodates: 2,
        bedrooms: 1.0,
        bathrooms_num: 1.0,
        minimum_nights: 2,
        number_of_reviews: 10,
        reviews_per_month: 0.3,
        availability_365: 120,
    }
}

#[test]
fn loads_model_manifest_and_metadata() {
    let dir = ModelDir::new();
    let (model_path, meta_path) = dir.model_with_meta(&json!({
        "features": FEATURES,
        "target": "price",
        "metrics": { "mae": 12.5, "r2": 0.6 },
        "created": "2025-10-01T09:30:00"
    }));

    let context = load(&model_path, &meta_path).expect("context loads");

    assert_eq!(context.feature_order(), FEATURES);
    assert_eq!(context.model_path(), model_path.as_path());
    assert_eq!(
        context.manifest().created.as_deref(),
        Some("2025-10-01T09:30:00")
    );

    let service = PredictionService::new(Arc::new(context));
    assert_eq!(service.predict(&listing("Mitte")).expect("predicts"), 105.0);
    assert_eq!(
        service
            .predict_batch(&[listing("Kreuzberg"), listing("Wedding")])
            .expect("batch predicts"),
        vec![95.0, 90.0]
    );
}

#[test]
fn manifest_without_features_halts_startup() {
    let dir = ModelDir::new();
    let (model_path, meta_path) = dir.model_with_meta(&json!({
        "target": "price",
        "metrics": { "mae": 12.5 }
    }));

    let err = load(&model_path, &meta_path).expect_err("features are mandatory");
    assert!(matches!(err, ManifestError::MissingFeatures { .. }));
    assert!(err.to_string().contains("features"));
}

#[test]
fn manifest_naming_unknown_column_halts_startup() {
    let dir = ModelDir::new();
    let (model_path, meta_path) = dir.model_with_meta(&json!({
        "features": ["room_type", "neighbourhood", "accommodates", "bedrooms", "host_is_superhost"]
    }));

    let err = load(&model_path, &meta_path).expect_err("unknown column");
    assert!(matches!(err, ManifestError::UnknownFeature(name) if name == "host_is_superhost"));
}

#[test]
fn model_column_missing_from_manifest_halts_startup() {
    let dir = ModelDir::new();
    let (model_path, meta_path) = dir.model_with_meta(&json!({
        "features": ["room_type", "neighbourhood", "accommodates"]
    }));

    let err = load(&model_path, &meta_path).expect_err("bedrooms not in manifest");
    assert!(matches!(err, ManifestError::ModelColumnNotInManifest(name) if name == "bedrooms"));
}

#[test]
fn missing_files_are_configuration_errors() {
    let dir = ModelDir::new();
    let missing_model = dir.root.join("absent.model.json");

    let err = load(&missing_model, &meta_path_for(&missing_model)).expect_err("no manifest");
    assert!(matches!(err, ManifestError::Read { .. }));

    let meta_path = dir.write("orphan.meta.json", &json!({ "features": FEATURES }).to_string());
    let err = load(&missing_model, &meta_path).expect_err("no artifact");
    assert!(matches!(err, ManifestError::Model { .. }));
}

#[tokio::test]
async fn model_info_matches_loaded_manifest() {
    let dir = ModelDir::new();
    let (model_path, meta_path) = dir.model_with_meta(&json!({
        "features": FEATURES,
        "metrics": { "rmse": 20.0 }
    }));
    let context = load(&model_path, &meta_path).expect("context loads");
    let app = prediction_router(Arc::new(PredictionService::new(Arc::new(context))));

    let response = app
        .oneshot(
            Request::get("/model_info")
                .body(Body::empty())
                .expect("request builds"),
        )
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body readable");
    let payload: Value = serde_json::from_slice(&bytes).expect("json body");
    assert_eq!(payload["features"], json!(FEATURES));
    assert_eq!(payload["metrics"], json!({ "rmse": 20.0 }));
    assert_eq!(payload["created"], Value::Null);
    assert_eq!(payload["model_path"], json!(model_path.display().to_string()));
}

fn shipped_sample() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../../models/sample.model.json")
}

#[tokio::test]
async fn shipped_sample_serves_predictions() {
    let model_path = shipped_sample();
    let context = load(&model_path, &meta_path_for(&model_path)).expect("sample loads");
    let app = prediction_router(Arc::new(PredictionService::new(Arc::new(context))));

    let body = json!({
        "room_type": "Entire home/apt",
        "neighbourhood": "Mitte",
        "accommodates": 2,
        "bedrooms": 1,
        "bathrooms_num": 1.0,
        "minimum_nights": 2,
        "number_of_reviews": 10,
        "reviews_per_month": 0.3,
        "availability_365": 120
    });
    let response = app
        .oneshot(
            Request::post("/predict")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .expect("request builds"),
        )
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body readable");
    let payload: Value = serde_json::from_slice(&bytes).expect("json body");
    let price = payload["price_eur"].as_f64().expect("numeric price");
    assert!(price > 0.0);
    assert_eq!((price * 100.0).round() / 100.0, price);
}

#[test]
fn shipped_sample_claims_no_validation_metrics() {
    let model_path = shipped_sample();
    let context = load(&model_path, &meta_path_for(&model_path)).expect("sample loads");
    assert!(context.manifest().metrics.is_none());
}

#[test]
fn unsupported_artifact_extension_halts_startup() {
    let dir = ModelDir::new();
    let model_path = dir.write("baseline.joblib", "not a model");
    let meta_path = dir.write(
        "baseline.joblib.meta.json",
        &json!({ "features": FEATURES }).to_string(),
    );

    let err = load(&model_path, &meta_path).expect_err("joblib is not loadable");
    assert!(matches!(
        err,
        ManifestError::Model {
            source: ModelError::UnsupportedFormat(_),
            ..
        }
    ));
}
