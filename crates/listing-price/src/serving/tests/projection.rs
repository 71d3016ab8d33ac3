use std::sync::Arc;

use super::common::*;
use crate::serving::listing::FeatureValue;
use crate::serving::service::{project, PredictionError};

#[test]
fn projection_follows_manifest_order_not_declaration_order() {
    let order = [
        "availability_365",
        "neighbourhood",
        "accommodates",
        "room_type",
    ];
    let feature_order: Vec<String> = order.iter().map(|f| f.to_string()).collect();

    let frame = project(&[mitte()], &feature_order).expect("projection succeeds");

    assert_eq!(frame.columns(), feature_order.as_slice());
    assert_eq!(
        frame.rows()[0],
        vec![
            FeatureValue::Numeric(120.0),
            FeatureValue::Categorical("Mitte".to_string()),
            FeatureValue::Numeric(2.0),
            FeatureValue::Categorical("Entire home/apt".to_string()),
        ]
    );
}

#[test]
fn projection_drops_columns_the_manifest_does_not_list() {
    let feature_order = vec!["bedrooms".to_string()];
    let frame = project(&[mitte(), kreuzberg()], &feature_order).expect("projection succeeds");

    assert_eq!(frame.len(), 2);
    assert_eq!(frame.rows()[0], vec![FeatureValue::Numeric(1.0)]);
    assert_eq!(frame.rows()[1], vec![FeatureValue::Numeric(2.0)]);
}

#[test]
fn projection_refuses_to_guess_missing_features() {
    let feature_order = vec!["room_type".to_string(), "host_since".to_string()];
    let err = project(&[mitte()], &feature_order).expect_err("unknown feature");
    assert!(matches!(err, PredictionError::MissingFeature(name) if name == "host_since"));
}

#[test]
fn stub_model_sees_reordered_columns() {
    let order = [
        "reviews_per_month",
        "room_type",
        "bathrooms_num",
        "neighbourhood",
        "minimum_nights",
        "accommodates",
        "availability_365",
        "number_of_reviews",
        "bedrooms",
    ];
    let model = Arc::new(StubModel::returning(&[99.0]).expecting_columns(&order));
    let service = service_with(model.clone(), manifest(&order));

    let price = service.predict(&mitte()).expect("prediction succeeds");

    assert_eq!(price, 99.0);
    assert_eq!(model.calls(), 1);
    let frame = model.last_frame().expect("model saw a frame");
    assert_eq!(frame.rows()[0][0], FeatureValue::Numeric(0.3));
    assert_eq!(
        frame.rows()[0][3],
        FeatureValue::Categorical("Mitte".to_string())
    );
}
