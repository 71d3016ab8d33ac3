//! ONNX Runtime backend for trained price pipelines.
//!
//! The graph is expected to take one `[rows, 1]` input per listing column,
//! named after the column, which is how a column-transformer pipeline comes
//! out of `skl2onnx`. String inputs receive categorical values; float and
//! integer inputs receive numeric ones. The first graph output holds one
//! price per row.

use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::Mutex;

use ndarray::Array2;
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::tensor::TensorElementType;
use ort::value::{DynValue, Tensor, ValueType};
use tracing::debug;

use super::listing::FeatureValue;
use super::model::{locate, type_mismatch, FeatureFrame, ModelError, PriceModel};

/// Element type of a graph input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    Text,
    Float32,
    Float64,
    Int64,
}

impl InputKind {
    fn from_element(ty: TensorElementType) -> Option<Self> {
        match ty {
            TensorElementType::String => Some(InputKind::Text),
            TensorElementType::Float32 => Some(InputKind::Float32),
            TensorElementType::Float64 => Some(InputKind::Float64),
            TensorElementType::Int64 => Some(InputKind::Int64),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OnnxInput {
    pub name: String,
    pub kind: InputKind,
}

/// One input column, ready to become a `[rows, 1]` tensor.
#[derive(Debug, Clone, PartialEq)]
enum ColumnBatch {
    Text(Vec<String>),
    Float32(Vec<f32>),
    Float64(Vec<f64>),
    Int64(Vec<i64>),
}

impl ColumnBatch {
    fn into_value(self) -> Result<DynValue, ModelError> {
        let value = match self {
            ColumnBatch::Text(values) => Tensor::from_string_array(&column(values)?)
                .map_err(runtime)?
                .into_dyn(),
            ColumnBatch::Float32(values) => {
                Tensor::from_array(column(values)?).map_err(runtime)?.into_dyn()
            }
            ColumnBatch::Float64(values) => {
                Tensor::from_array(column(values)?).map_err(runtime)?.into_dyn()
            }
            ColumnBatch::Int64(values) => {
                Tensor::from_array(column(values)?).map_err(runtime)?.into_dyn()
            }
        };
        Ok(value)
    }
}

/// Trained pipeline exported to ONNX and evaluated by ONNX Runtime.
pub struct OnnxPriceModel {
    // `Session::run` needs exclusive access.
    session: Mutex<Session>,
    inputs: Vec<OnnxInput>,
    output: String,
}

impl fmt::Debug for OnnxPriceModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OnnxPriceModel")
            .field("inputs", &self.inputs)
            .field("output", &self.output)
            .finish_non_exhaustive()
    }
}

impl OnnxPriceModel {
    pub fn from_path(path: &Path) -> Result<Self, ModelError> {
        let bytes = fs::read(path)?;
        let session = Session::builder()
            .map_err(runtime)?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(runtime)?
            .with_intra_threads(1)
            .map_err(runtime)?
            .commit_from_memory(&bytes)
            .map_err(runtime)?;

        let inputs = session
            .inputs
            .iter()
            .map(|input| {
                let kind = match &input.input_type {
                    ValueType::Tensor { ty, .. } => InputKind::from_element(*ty),
                    _ => None,
                }
                .ok_or_else(|| {
                    ModelError::Invalid(format!(
                        "graph input '{}' is not a string, float or int64 tensor",
                        input.name
                    ))
                })?;
                Ok(OnnxInput {
                    name: input.name.clone(),
                    kind,
                })
            })
            .collect::<Result<Vec<_>, ModelError>>()?;

        let output = session
            .outputs
            .first()
            .map(|output| output.name.clone())
            .ok_or_else(|| ModelError::Invalid("graph declares no outputs".to_string()))?;

        debug!(
            path = %path.display(),
            inputs = inputs.len(),
            output = %output,
            "onnx session ready"
        );

        Ok(Self {
            session: Mutex::new(session),
            inputs,
            output,
        })
    }

    pub fn inputs(&self) -> &[OnnxInput] {
        &self.inputs
    }
}

impl PriceModel for OnnxPriceModel {
    fn predict(&self, frame: &FeatureFrame) -> Result<Vec<f64>, ModelError> {
        let feeds = self
            .inputs
            .iter()
            .map(|input| {
                let value = column_batch(frame, input)?.into_value()?;
                Ok((input.name.clone(), value))
            })
            .collect::<Result<Vec<(String, DynValue)>, ModelError>>()?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| ModelError::Runtime("onnx session lock poisoned".to_string()))?;
        let outputs = session.run(feeds).map_err(runtime)?;
        let output = outputs.get(self.output.as_str()).ok_or_else(|| {
            ModelError::Runtime(format!("graph produced no '{}' output", self.output))
        })?;

        let predictions = match output.try_extract_tensor::<f32>() {
            Ok((_, values)) => values.iter().map(|value| f64::from(*value)).collect(),
            Err(_) => {
                let (_, values) = output.try_extract_tensor::<f64>().map_err(runtime)?;
                values.to_vec()
            }
        };
        Ok(predictions)
    }

    fn input_columns(&self) -> Vec<String> {
        self.inputs.iter().map(|input| input.name.clone()).collect()
    }
}

fn column_batch(frame: &FeatureFrame, input: &OnnxInput) -> Result<ColumnBatch, ModelError> {
    let index = locate(frame, &input.name)?;
    let cells = frame.rows().iter().map(|row| &row[index]);
    let name = input.name.as_str();

    let batch = match input.kind {
        InputKind::Text => ColumnBatch::Text(
            cells
                .map(|cell| {
                    cell.as_categorical()
                        .map(str::to_string)
                        .ok_or_else(|| type_mismatch(name, "categorical", "numeric"))
                })
                .collect::<Result<_, _>>()?,
        ),
        InputKind::Float32 => ColumnBatch::Float32(
            cells
                .map(|cell| numeric(cell, name).map(|value| value as f32))
                .collect::<Result<_, _>>()?,
        ),
        InputKind::Float64 => ColumnBatch::Float64(
            cells
                .map(|cell| numeric(cell, name))
                .collect::<Result<_, _>>()?,
        ),
        InputKind::Int64 => ColumnBatch::Int64(
            cells
                .map(|cell| {
                    let value = numeric(cell, name)?;
                    if value.fract() != 0.0 {
                        return Err(type_mismatch(name, "integer", "fractional"));
                    }
                    Ok(value as i64)
                })
                .collect::<Result<_, _>>()?,
        ),
    };
    Ok(batch)
}

fn numeric(cell: &FeatureValue, column: &str) -> Result<f64, ModelError> {
    cell.as_numeric()
        .ok_or_else(|| type_mismatch(column, "numeric", "categorical"))
}

fn column<T>(values: Vec<T>) -> Result<Array2<T>, ModelError> {
    let rows = values.len();
    Array2::from_shape_vec((rows, 1), values).map_err(|err| ModelError::Invalid(err.to_string()))
}

fn runtime(err: impl fmt::Display) -> ModelError {
    ModelError::Runtime(err.to_string())
}
