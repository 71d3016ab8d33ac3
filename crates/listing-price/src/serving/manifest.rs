use std::collections::{BTreeMap, HashSet};
use std::ffi::OsString;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, NaiveDateTime};
use serde::Deserialize;
use tracing::{info, warn};

use super::listing::is_listing_column;
use super::model::{ModelArtifact, ModelError, PriceModel};

const META_SUFFIX: &str = ".meta.json";
const DEFAULT_TARGET: &str = "price";

/// Sidecar location for a model artifact: the artifact path plus `.meta.json`.
pub fn meta_path_for(model_path: &Path) -> PathBuf {
    let mut raw = OsString::from(model_path.as_os_str());
    raw.push(META_SUFFIX);
    PathBuf::from(raw)
}

/// Training-time description of the columns a model expects.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureManifest {
    pub features: Vec<String>,
    pub target: String,
    pub metrics: Option<BTreeMap<String, f64>>,
    pub created: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawManifest {
    #[serde(default)]
    features: Option<Vec<String>>,
    #[serde(default)]
    target: Option<String>,
    #[serde(default)]
    metrics: Option<BTreeMap<String, f64>>,
    #[serde(default)]
    created: Option<String>,
}

impl FeatureManifest {
    /// Parses a manifest document. `source` only labels errors.
    pub fn from_json(raw: &str, source: &Path) -> Result<Self, ManifestError> {
        let parsed: RawManifest =
            serde_json::from_str(raw).map_err(|err| ManifestError::Parse {
                path: source.to_path_buf(),
                source: err,
            })?;

        let features = match parsed.features {
            Some(features) if !features.is_empty() => features,
            _ => {
                return Err(ManifestError::MissingFeatures {
                    path: source.to_path_buf(),
                })
            }
        };

        let mut seen = HashSet::new();
        for feature in &features {
            if !seen.insert(feature.as_str()) {
                return Err(ManifestError::DuplicateFeature(feature.clone()));
            }
        }

        Ok(Self {
            features,
            target: parsed.target.unwrap_or_else(|| DEFAULT_TARGET.to_string()),
            metrics: parsed.metrics,
            created: parsed.created,
        })
    }

    /// `created` as a timestamp, accepting naive ISO-8601 and RFC 3339.
    pub fn created_at(&self) -> Option<NaiveDateTime> {
        let raw = self.created.as_deref()?.trim();
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Some(dt.naive_utc());
        }
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f").ok()
    }
}

/// Immutable state shared by every request: the model, its manifest, and
/// where the model came from.
#[derive(Clone)]
pub struct ServingContext {
    model: Arc<dyn PriceModel>,
    manifest: FeatureManifest,
    model_path: PathBuf,
}

impl fmt::Debug for ServingContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServingContext")
            .field("manifest", &self.manifest)
            .field("model_path", &self.model_path)
            .finish_non_exhaustive()
    }
}

impl ServingContext {
    pub fn new(
        model: Arc<dyn PriceModel>,
        manifest: FeatureManifest,
        model_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            model,
            manifest,
            model_path: model_path.into(),
        }
    }

    pub fn model(&self) -> &dyn PriceModel {
        self.model.as_ref()
    }

    pub fn manifest(&self) -> &FeatureManifest {
        &self.manifest
    }

    pub fn feature_order(&self) -> &[String] {
        &self.manifest.features
    }

    pub fn model_path(&self) -> &Path {
        &self.model_path
    }
}

/// Loads the model artifact and its manifest, refusing to start on any drift
/// between the manifest, the listing schema, and the model's own columns.
pub fn load(model_path: &Path, meta_path: &Path) -> Result<ServingContext, ManifestError> {
    let raw = fs::read_to_string(meta_path).map_err(|source| ManifestError::Read {
        path: meta_path.to_path_buf(),
        source,
    })?;
    let manifest = FeatureManifest::from_json(&raw, meta_path)?;

    if let Some(unknown) = manifest
        .features
        .iter()
        .find(|feature| !is_listing_column(feature))
    {
        return Err(ManifestError::UnknownFeature(unknown.clone()));
    }

    let model = ModelArtifact::from_path(model_path)
        .map_err(|source| ManifestError::Model {
            path: model_path.to_path_buf(),
            source,
        })?
        .into_model();

    if let Some(column) = model
        .input_columns()
        .into_iter()
        .find(|column| !manifest.features.contains(column))
    {
        return Err(ManifestError::ModelColumnNotInManifest(column));
    }

    if manifest.created.is_some() && manifest.created_at().is_none() {
        warn!(created = ?manifest.created, "manifest timestamp is not ISO-8601");
    }

    info!(
        model_path = %model_path.display(),
        meta_path = %meta_path.display(),
        features = manifest.features.len(),
        created = manifest.created.as_deref().unwrap_or("unknown"),
        "model and manifest loaded"
    );

    Ok(ServingContext::new(model, manifest, model_path))
}

#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("manifest {} is not valid JSON: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("no 'features' field in model manifest {}", .path.display())]
    MissingFeatures { path: PathBuf },
    #[error("manifest lists feature '{0}' more than once")]
    DuplicateFeature(String),
    #[error("manifest feature '{0}' is not a listing field")]
    UnknownFeature(String),
    #[error("failed to load model {}: {source}", .path.display())]
    Model { path: PathBuf, source: ModelError },
    #[error("model reads column '{0}' which the manifest does not list")]
    ModelColumnNotInManifest(String),
}
