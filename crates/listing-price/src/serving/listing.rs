use serde::{Deserialize, Serialize};

/// Upper bound for `availability_365`.
pub const MAX_AVAILABILITY_DAYS: i64 = 365;

/// Every column a listing can supply to a model, in schema declaration order.
///
/// Serving never relies on this order; rows are built from the manifest.
pub const LISTING_COLUMNS: [&str; 9] = [
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

/// One short-term rental listing as accepted by the prediction endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingRecord {
    pub room_type: String,
    pub neighbourhood: String,
    pub accommodates: i64,
    pub bedrooms: f64,
    pub bathrooms_num: f64,
    pub minimum_nights: i64,
    pub number_of_reviews: i64,
    pub reviews_per_month: f64,
    pub availability_365: i64,
}

/// A single cell of a model-input row.
#[derive(Debug, Clone, PartialEq)]
pub enum FeatureValue {
    Categorical(String),
    Numeric(f64),
}

impl FeatureValue {
    pub fn as_numeric(&self) -> Option<f64> {
        match self {
            FeatureValue::Numeric(value) => Some(*value),
            FeatureValue::Categorical(_) => None,
        }
    }

    pub fn as_categorical(&self) -> Option<&str> {
        match self {
            FeatureValue::Categorical(value) => Some(value.as_str()),
            FeatureValue::Numeric(_) => None,
        }
    }
}

/// Field-level schema violation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ListingValidationError {
    #[error("{field} must not be blank")]
    Blank { field: &'static str },
    #[error("{field} must be non-negative (got {value})")]
    Negative { field: &'static str, value: f64 },
    #[error("{field} must be within 0..={max} (got {value})")]
    OutOfRange {
        field: &'static str,
        value: i64,
        max: i64,
    },
    #[error("{field} must be a finite number")]
    NotFinite { field: &'static str },
}

impl ListingRecord {
    /// Checks the type and range constraints serde cannot express.
    pub fn validate(&self) -> Result<(), ListingValidationError> {
        for (field, value) in [
            ("room_type", &self.room_type),
            ("neighbourhood", &self.neighbourhood),
        ] {
            if value.trim().is_empty() {
                return Err(ListingValidationError::Blank { field });
            }
        }

        for (field, value) in [
            ("accommodates", self.accommodates),
            ("minimum_nights", self.minimum_nights),
            ("number_of_reviews", self.number_of_reviews),
            ("availability_365", self.availability_365),
        ] {
            if value < 0 {
                return Err(ListingValidationError::Negative {
                    field,
                    value: value as f64,
                });
            }
        }

        for (field, value) in [
            ("bedrooms", self.bedrooms),
            ("bathrooms_num", self.bathrooms_num),
            ("reviews_per_month", self.reviews_per_month),
        ] {
            if !value.is_finite() {
                return Err(ListingValidationError::NotFinite { field });
            }
            if value < 0.0 {
                return Err(ListingValidationError::Negative { field, value });
            }
        }

        if self.availability_365 > MAX_AVAILABILITY_DAYS {
            return Err(ListingValidationError::OutOfRange {
                field: "availability_365",
                value: self.availability_365,
                max: MAX_AVAILABILITY_DAYS,
            });
        }

        Ok(())
    }

    /// Looks a column up by name. `None` means the schema has no such column.
    pub fn feature(&self, name: &str) -> Option<FeatureValue> {
        let value = match name {
            "room_type" => FeatureValue::Categorical(self.room_type.clone()),
            "neighbourhood" => FeatureValue::Categorical(self.neighbourhood.clone()),
            "accommodates" => FeatureValue::Numeric(self.accommodates as f64),
            "bedrooms" => FeatureValue::Numeric(self.bedrooms),
            "bathrooms_num" => FeatureValue::Numeric(self.bathrooms_num),
            "minimum_nights" => FeatureValue::Numeric(self.minimum_nights as f64),
            "number_of_reviews" => FeatureValue::Numeric(self.number_of_reviews as f64),
            "reviews_per_month" => FeatureValue::Numeric(self.reviews_per_month),
            "availability_365" => FeatureValue::Numeric(self.availability_365 as f64),
            _ => return None,
        };
        Some(value)
    }
}

pub fn is_listing_column(name: &str) -> bool {
    LISTING_COLUMNS.contains(&name)
}
