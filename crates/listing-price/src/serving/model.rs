use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;
use tracing::debug;

use super::listing::FeatureValue;
use super::onnx::OnnxPriceModel;

/// Named, ordered columns plus the rows handed to a model in one call.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureFrame {
    columns: Vec<String>,
    rows: Vec<Vec<FeatureValue>>,
}

impl FeatureFrame {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn push_row(&mut self, row: Vec<FeatureValue>) {
        debug_assert_eq!(row.len(), self.columns.len());
        self.rows.push(row);
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<FeatureValue>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column == name)
    }
}

/// A trained regressor. Implementations must not mutate themselves on predict.
pub trait PriceModel: Send + Sync {
    /// Returns one raw prediction per row of `frame`, in row order.
    fn predict(&self, frame: &FeatureFrame) -> Result<Vec<f64>, ModelError>;

    /// Columns the model reads. Empty when the model cannot tell.
    fn input_columns(&self) -> Vec<String> {
        Vec::new()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("failed to read model artifact: {0}")]
    Io(#[from] std::io::Error),
    #[error("model artifact is not a valid pipeline: {0}")]
    Format(#[from] serde_json::Error),
    #[error("unsupported model artifact extension '{0}' (expected .onnx or .json)")]
    UnsupportedFormat(String),
    #[error("onnx runtime failure: {0}")]
    Runtime(String),
    #[error("model artifact is inconsistent: {0}")]
    Invalid(String),
    #[error("input is missing column '{0}' required by the model")]
    MissingColumn(String),
    #[error("column '{column}' holds a {found} value where the model expects {expected}")]
    ColumnType {
        column: String,
        expected: &'static str,
        found: &'static str,
    },
}

/// Standardised numeric term: `weight * (x - mean) / scale`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NumericTerm {
    pub column: String,
    pub mean: f64,
    pub scale: f64,
    pub weight: f64,
}

/// One-hot categorical term. Levels absent from `levels` add nothing.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CategoricalTerm {
    pub column: String,
    pub levels: BTreeMap<String, f64>,
}

/// A loaded model artifact. `.onnx` files hold the exported training
/// pipeline; `.json` files hold a linear pipeline document.
#[derive(Debug)]
pub enum ModelArtifact {
    Onnx(OnnxPriceModel),
    LinearPipeline(LinearPipeline),
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum JsonArtifact {
    LinearPipeline(LinearPipeline),
}

/// Preprocessing plus linear regression, serialised as JSON.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LinearPipeline {
    pub intercept: f64,
    #[serde(default)]
    pub numeric: Vec<NumericTerm>,
    #[serde(default)]
    pub categorical: Vec<CategoricalTerm>,
}

impl ModelArtifact {
    /// Loads an artifact, choosing the backend from the file extension.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, ModelError> {
        let path = path.as_ref();
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("onnx") => Ok(ModelArtifact::Onnx(OnnxPriceModel::from_path(path)?)),
            Some("json") => Self::from_json(&fs::read_to_string(path)?),
            other => Err(ModelError::UnsupportedFormat(
                other.unwrap_or_default().to_string(),
            )),
        }
    }

    pub fn from_json(raw: &str) -> Result<Self, ModelError> {
        let JsonArtifact::LinearPipeline(pipeline): JsonArtifact = serde_json::from_str(raw)?;
        pipeline.check()?;
        Ok(ModelArtifact::LinearPipeline(pipeline))
    }

    pub fn into_model(self) -> Arc<dyn PriceModel> {
        match self {
            ModelArtifact::Onnx(model) => Arc::new(model),
            ModelArtifact::LinearPipeline(pipeline) => Arc::new(pipeline),
        }
    }
}

impl LinearPipeline {
    fn check(&self) -> Result<(), ModelError> {
        if !self.intercept.is_finite() {
            return Err(ModelError::Invalid("intercept is not finite".to_string()));
        }
        for term in &self.numeric {
            if !(term.scale.is_finite() && term.scale > 0.0) {
                return Err(ModelError::Invalid(format!(
                    "scale for '{}' must be positive",
                    term.column
                )));
            }
            if !(term.mean.is_finite() && term.weight.is_finite()) {
                return Err(ModelError::Invalid(format!(
                    "coefficients for '{}' are not finite",
                    term.column
                )));
            }
        }
        for term in &self.categorical {
            if let Some((level, _)) = term.levels.iter().find(|(_, w)| !w.is_finite()) {
                return Err(ModelError::Invalid(format!(
                    "weight for '{}'='{}' is not finite",
                    term.column, level
                )));
            }
        }
        Ok(())
    }
}

impl PriceModel for LinearPipeline {
    fn predict(&self, frame: &FeatureFrame) -> Result<Vec<f64>, ModelError> {
        let numeric = self
            .numeric
            .iter()
            .map(|term| locate(frame, &term.column).map(|index| (term, index)))
            .collect::<Result<Vec<_>, _>>()?;
        let categorical = self
            .categorical
            .iter()
            .map(|term| locate(frame, &term.column).map(|index| (term, index)))
            .collect::<Result<Vec<_>, _>>()?;

        let mut predictions = Vec::with_capacity(frame.len());
        for row in frame.rows() {
            let mut total = self.intercept;

            for (term, index) in &numeric {
                let value = row[*index]
                    .as_numeric()
                    .ok_or_else(|| type_mismatch(&term.column, "numeric", "categorical"))?;
                total += term.weight * (value - term.mean) / term.scale;
            }

            for (term, index) in &categorical {
                let level = row[*index]
                    .as_categorical()
                    .ok_or_else(|| type_mismatch(&term.column, "categorical", "numeric"))?;
                match term.levels.get(level) {
                    Some(weight) => total += weight,
                    None => debug!(column = %term.column, category = level, "unseen category ignored"),
                }
            }

            predictions.push(total);
        }

        Ok(predictions)
    }

    fn input_columns(&self) -> Vec<String> {
        self.numeric
            .iter()
            .map(|term| term.column.clone())
            .chain(self.categorical.iter().map(|term| term.column.clone()))
            .collect()
    }
}

pub(super) fn locate(frame: &FeatureFrame, column: &str) -> Result<usize, ModelError> {
    frame
        .column_index(column)
        .ok_or_else(|| ModelError::MissingColumn(column.to_string()))
}

pub(super) fn type_mismatch(column: &str, expected: &'static str, found: &'static str) -> ModelError {
    ModelError::ColumnType {
        column: column.to_string(),
        expected,
        found,
    }
}
