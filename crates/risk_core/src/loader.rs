//! Model loading and shared read-only model handles
//!
//! A [`ModelHandle`] wraps the validated ensemble, its feature schema, the
//! optional scaler and the metadata computed once at load time. Handles are
//! cheap to clone and safe to share across threads without locking.

use crate::errors::{Result, RiskError};
use crate::features::FeatureSchema;
use crate::gbdt::{EnsembleModel, ModelArtifact};
use crate::scaler::Scaler;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Facts about a loaded model, derived once at load
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelMetadata {
    pub model_name: String,
    pub objective: String,
    pub num_classes: usize,
    pub num_trees: usize,
    pub total_nodes: usize,
    pub leaf_nodes: usize,
    pub max_depth: usize,
    pub learning_rate: f64,
    pub feature_count: usize,
    pub has_scaler: bool,
    /// Blake3 of the canonical artifact JSON
    pub model_hash: String,
    pub schema_fingerprint: String,
    pub level_thresholds: Vec<f64>,
    /// Largest attainable margin swing per class
    pub max_swing: Vec<f64>,
    /// Unconditional expected output of every tree
    pub root_expectations: Vec<f64>,
}

impl ModelMetadata {
    fn compute(model: &EnsembleModel, has_scaler: bool) -> Result<Self> {
        let trees = model.trees();
        Ok(Self {
            model_name: model.name().to_string(),
            objective: model.objective().name().to_string(),
            num_classes: model.num_classes(),
            num_trees: trees.len(),
            total_nodes: trees.iter().map(|t| t.nodes.len()).sum(),
            leaf_nodes: trees.iter().map(|t| t.num_leaves()).sum(),
            max_depth: trees.iter().map(|t| t.max_depth()).max().unwrap_or(0),
            learning_rate: model.learning_rate(),
            feature_count: model.schema().len(),
            has_scaler,
            model_hash: model.hash_hex()?,
            schema_fingerprint: model.schema().fingerprint_hex(),
            level_thresholds: model.level_thresholds().to_vec(),
            max_swing: (0..model.num_classes()).map(|k| model.max_swing(k)).collect(),
            root_expectations: (0..trees.len()).map(|i| model.expectations(i)[0]).collect(),
        })
    }
}

#[derive(Debug)]
struct LoadedModel {
    model: EnsembleModel,
    scaler: Option<Scaler>,
    metadata: ModelMetadata,
}

/// Immutable, shareable handle to a loaded model
#[derive(Debug, Clone)]
pub struct ModelHandle {
    inner: Arc<LoadedModel>,
}

impl ModelHandle {
    /// Load a model artifact and optional scaler artifact from disk
    ///
    /// Artifacts ending in `.bin` are read as bincode, everything else as JSON.
    #[instrument(skip_all, fields(model = %model_path.as_ref().display()))]
    pub fn load<P: AsRef<Path>>(model_path: P, scaler_path: Option<&Path>) -> Result<Self> {
        let model_path = model_path.as_ref();

        let artifact: ModelArtifact = if is_binary(model_path) {
            read_binary(model_path)?
        } else {
            read_json(model_path)?
        };
        let model = EnsembleModel::from_artifact(artifact)
            .map_err(|reason| RiskError::model_load(model_path, reason))?;

        let scaler = match scaler_path {
            Some(path) => {
                let scaler: Scaler = read_json(path)?;
                scaler
                    .validate(model.schema())
                    .map_err(|reason| RiskError::model_load(path, reason))?;
                debug!(scaler = %path.display(), "loaded feature scaler");
                Some(scaler)
            }
            None => None,
        };

        let handle = Self::from_parts(model, scaler)?;
        let meta = handle.metadata();
        info!(
            model_name = %meta.model_name,
            objective = %meta.objective,
            trees = meta.num_trees,
            features = meta.feature_count,
            hash = %meta.model_hash,
            "model loaded"
        );
        Ok(handle)
    }

    /// Wrap an already validated model, e.g. one built in memory
    pub fn from_parts(model: EnsembleModel, scaler: Option<Scaler>) -> Result<Self> {
        if let Some(scaler) = &scaler {
            scaler
                .validate(model.schema())
                .map_err(|reason| RiskError::model_load("<in-memory>", reason))?;
        }
        let metadata = ModelMetadata::compute(&model, scaler.is_some())?;
        Ok(Self {
            inner: Arc::new(LoadedModel {
                model,
                scaler,
                metadata,
            }),
        })
    }

    pub fn model(&self) -> &EnsembleModel {
        &self.inner.model
    }

    pub fn schema(&self) -> &Arc<FeatureSchema> {
        self.inner.model.schema()
    }

    pub fn scaler(&self) -> Option<&Scaler> {
        self.inner.scaler.as_ref()
    }

    pub fn metadata(&self) -> &ModelMetadata {
        &self.inner.metadata
    }

    /// Whether two handles share the same loaded model
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

fn is_binary(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("bin"))
}

fn open(path: &Path) -> Result<BufReader<File>> {
    let file = File::open(path).map_err(|e| RiskError::model_load(path, e.to_string()))?;
    Ok(BufReader::new(file))
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    serde_json::from_reader(open(path)?).map_err(|e| RiskError::model_load(path, e.to_string()))
}

fn read_binary<T: DeserializeOwned>(path: &Path) -> Result<T> {
    bincode::deserialize_from(open(path)?).map_err(|e| RiskError::model_load(path, e.to_string()))
}

type CacheKey = (PathBuf, Option<PathBuf>);

/// Explicitly constructed cache of loaded models keyed by artifact paths
///
/// Repeated loads of the same model and scaler paths return the same handle.
#[derive(Debug, Default)]
pub struct ModelCache {
    entries: RwLock<HashMap<CacheKey, ModelHandle>>,
}

impl ModelCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached handle for these paths, loading it on first use
    pub fn get_or_load(&self, model_path: &Path, scaler_path: Option<&Path>) -> Result<ModelHandle> {
        let key = (canonical(model_path), scaler_path.map(canonical));

        if let Some(handle) = self.entries.read().get(&key) {
            debug!(model = %model_path.display(), "model served from cache");
            return Ok(handle.clone());
        }

        // Loaded without holding the lock; a concurrent load of the same
        // paths may finish first, and its handle wins
        let loaded = ModelHandle::load(model_path, scaler_path)?;
        let handle = self.entries.write().entry(key).or_insert(loaded).clone();
        Ok(handle)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }
}

fn canonical(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}
