use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info};

use crate::error::AppError;

use super::listing::ListingRecord;
use super::service::{PredictionError, PredictionService};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResponse {
    pub price_eur: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchPredictionResponse {
    pub prices_eur: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeaturesResponse {
    pub features: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfoResponse {
    pub features: Vec<String>,
    pub metrics: Option<BTreeMap<String, f64>>,
    pub created: Option<String>,
    pub model_path: String,
}

/// Router exposing prediction and model introspection endpoints.
pub fn prediction_router(service: Arc<PredictionService>) -> Router {
    Router::new()
        .route("/features", get(features_handler))
        .route("/model_info", get(model_info_handler))
        .route("/predict", post(predict_handler))
        .route("/predict_batch", post(predict_batch_handler))
        .with_state(service)
}

pub(crate) async fn features_handler(
    State(service): State<Arc<PredictionService>>,
) -> Json<FeaturesResponse> {
    Json(FeaturesResponse {
        features: service.manifest().features.clone(),
    })
}

pub(crate) async fn model_info_handler(
    State(service): State<Arc<PredictionService>>,
) -> Json<ModelInfoResponse> {
    let manifest = service.manifest();
    Json(ModelInfoResponse {
        features: manifest.features.clone(),
        metrics: manifest.metrics.clone(),
        created: manifest.created.clone(),
        model_path: service.context().model_path().display().to_string(),
    })
}

pub(crate) async fn predict_handler(
    State(service): State<Arc<PredictionService>>,
    payload: Result<Json<ListingRecord>, JsonRejection>,
) -> Response {
    let Json(record) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return rejection_response(rejection),
    };

    match service.predict(&record) {
        Ok(price_eur) => {
            info!(price_eur, neighbourhood = %record.neighbourhood, "prediction served");
            (StatusCode::OK, Json(PredictionResponse { price_eur })).into_response()
        }
        Err(err) => error_response(err),
    }
}

pub(crate) async fn predict_batch_handler(
    State(service): State<Arc<PredictionService>>,
    payload: Result<Json<Vec<ListingRecord>>, JsonRejection>,
) -> Response {
    let Json(records) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return rejection_response(rejection),
    };

    match service.predict_batch(&records) {
        Ok(prices_eur) => {
            info!(rows = prices_eur.len(), "batch prediction served");
            (StatusCode::OK, Json(BatchPredictionResponse { prices_eur })).into_response()
        }
        Err(err) => error_response(err),
    }
}

/// Unreadable listings are 422; transport problems keep axum's own status.
fn rejection_response(rejection: JsonRejection) -> Response {
    match rejection {
        JsonRejection::JsonDataError(_) | JsonRejection::JsonSyntaxError(_) => {
            AppError::Input(rejection.body_text()).into_response()
        }
        other => {
            let status = other.status();
            (status, Json(json!({ "error": other.body_text() }))).into_response()
        }
    }
}

fn error_response(err: PredictionError) -> Response {
    match err {
        PredictionError::Validation { index, ref source } => {
            let mut payload = json!({
                "error": source.to_string(),
            });
            if let Some(index) = index {
                payload["index"] = json!(index);
            }
            (StatusCode::UNPROCESSABLE_ENTITY, Json(payload)).into_response()
        }
        other => {
            error!(error = %other, "prediction failed");
            AppError::Prediction(other).into_response()
        }
    }
}
