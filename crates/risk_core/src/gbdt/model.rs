//! Tree ensemble model
//!
//! Implements the persisted artifact and the validated in-memory ensemble:
//! - Canonical JSON serialization and Blake3 model hashing
//! - Per-class margins (`base_score + learning_rate * Σ leaf`)
//! - Subtree expectations precomputed once for attribution

use super::tree::Tree;
use crate::features::{FeatureSchema, FeatureSchemaSpec};
use crate::serde_canon::{hash_canonical_hex, to_canonical_json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Supported artifact format version
pub const MODEL_FORMAT_VERSION: u32 = 1;

/// Score boundaries between levels 1|2, 2|3, 3|4 and 4|5
pub const DEFAULT_LEVEL_THRESHOLDS: [f64; 4] = [20.0, 40.0, 60.0, 80.0];

/// Training objective of the ensemble
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Objective {
    /// One margin, used directly as the risk score
    Regression,
    /// One margin per class, turned into probabilities with softmax
    Multiclass { n_classes: usize },
}

impl Objective {
    pub fn num_classes(&self) -> usize {
        match self {
            Self::Regression => 1,
            Self::Multiclass { n_classes } => *n_classes,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Regression => "regression",
            Self::Multiclass { .. } => "multiclass",
        }
    }
}

fn default_model_name() -> String {
    "unnamed".to_string()
}

fn default_level_thresholds() -> Vec<f64> {
    DEFAULT_LEVEL_THRESHOLDS.to_vec()
}

/// Persisted model artifact
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelArtifact {
    /// Artifact format version (always 1 for now)
    pub version: u32,

    #[serde(default = "default_model_name")]
    pub model_name: String,

    pub objective: Objective,

    /// Shrinkage applied to every leaf value
    pub learning_rate: f64,

    /// Initial margin, one entry per class
    pub base_score: Vec<f64>,

    pub feature_schema: FeatureSchemaSpec,

    /// Trees in boosting order
    pub trees: Vec<Tree>,

    #[serde(default = "default_level_thresholds")]
    pub level_thresholds: Vec<f64>,

    /// Score anchor per class for multiclass models
    #[serde(default)]
    pub class_anchors: Option<Vec<f64>>,

    /// Slot whose raw value raises multiclass scores
    #[serde(default)]
    pub infection_rate_feature: Option<String>,
}

/// Validated, read-only tree ensemble
#[derive(Debug, Clone)]
pub struct EnsembleModel {
    artifact: ModelArtifact,
    schema: Arc<FeatureSchema>,
    expectations: Vec<Vec<f64>>,
    base_values: Vec<f64>,
    max_swing: Vec<f64>,
    class_anchors: Vec<f64>,
    infection_slot: Option<usize>,
}

impl EnsembleModel {
    /// Validate an artifact and precompute everything attribution needs
    pub fn from_artifact(artifact: ModelArtifact) -> Result<Self, String> {
        if artifact.version != MODEL_FORMAT_VERSION {
            return Err(format!("unsupported model version: {}", artifact.version));
        }
        if !artifact.learning_rate.is_finite() || artifact.learning_rate <= 0.0 {
            return Err(format!("invalid learning rate: {}", artifact.learning_rate));
        }

        let n_classes = artifact.objective.num_classes();
        if matches!(artifact.objective, Objective::Multiclass { .. }) && n_classes < 2 {
            return Err(format!("multiclass objective needs at least 2 classes, got {n_classes}"));
        }
        if artifact.base_score.len() != n_classes {
            return Err(format!(
                "base_score has {} entries, objective has {n_classes} classes",
                artifact.base_score.len()
            ));
        }
        if artifact.base_score.iter().any(|b| !b.is_finite()) {
            return Err("base_score contains a non-finite value".to_string());
        }

        let thresholds = &artifact.level_thresholds;
        if thresholds.len() != DEFAULT_LEVEL_THRESHOLDS.len() {
            return Err(format!(
                "expected {} level thresholds, got {}",
                DEFAULT_LEVEL_THRESHOLDS.len(),
                thresholds.len()
            ));
        }
        if thresholds.iter().any(|t| !t.is_finite()) || thresholds.windows(2).any(|w| w[0] >= w[1]) {
            return Err(format!("level thresholds must be finite and strictly increasing: {thresholds:?}"));
        }

        let schema = Arc::new(FeatureSchema::from_spec(artifact.feature_schema.clone())?);

        if artifact.trees.is_empty() {
            return Err("ensemble has no trees".to_string());
        }
        for (i, tree) in artifact.trees.iter().enumerate() {
            if tree.class_index >= n_classes {
                return Err(format!(
                    "tree {i} has class index {}, objective has {n_classes} classes",
                    tree.class_index
                ));
            }
            tree.validate(schema.len())
                .map_err(|e| format!("tree {i} validation failed: {e}"))?;
        }

        let class_anchors = match (&artifact.class_anchors, artifact.objective) {
            (Some(anchors), _) => {
                if anchors.len() != n_classes || anchors.iter().any(|a| !a.is_finite()) {
                    return Err(format!(
                        "class_anchors must hold {n_classes} finite values, got {anchors:?}"
                    ));
                }
                anchors.clone()
            }
            (None, Objective::Multiclass { n_classes }) => default_anchors(n_classes),
            (None, Objective::Regression) => Vec::new(),
        };

        let infection_slot = match (&artifact.infection_rate_feature, artifact.objective) {
            (Some(name), _) => Some(
                schema
                    .position(name)
                    .ok_or_else(|| format!("infection_rate_feature `{name}` is not in the schema"))?,
            ),
            (None, Objective::Multiclass { .. }) => schema.position("infection_rate"),
            (None, Objective::Regression) => None,
        };

        let expectations: Vec<Vec<f64>> = artifact.trees.iter().map(Tree::expectations).collect();

        let lr = artifact.learning_rate;
        let mut base_values = artifact.base_score.clone();
        let mut max_swing = vec![0.0; n_classes];
        for (tree, expected) in artifact.trees.iter().zip(&expectations) {
            base_values[tree.class_index] += lr * expected[0];
            max_swing[tree.class_index] += lr * tree.leaf_range();
        }

        Ok(Self {
            artifact,
            schema,
            expectations,
            base_values,
            max_swing,
            class_anchors,
            infection_slot,
        })
    }

    pub fn artifact(&self) -> &ModelArtifact {
        &self.artifact
    }

    pub fn schema(&self) -> &Arc<FeatureSchema> {
        &self.schema
    }

    pub fn name(&self) -> &str {
        &self.artifact.model_name
    }

    pub fn objective(&self) -> Objective {
        self.artifact.objective
    }

    pub fn num_classes(&self) -> usize {
        self.artifact.objective.num_classes()
    }

    pub fn learning_rate(&self) -> f64 {
        self.artifact.learning_rate
    }

    pub fn trees(&self) -> &[Tree] {
        &self.artifact.trees
    }

    pub fn num_trees(&self) -> usize {
        self.artifact.trees.len()
    }

    pub fn level_thresholds(&self) -> &[f64] {
        &self.artifact.level_thresholds
    }

    /// Score anchors per class (empty for regression)
    pub fn class_anchors(&self) -> &[f64] {
        &self.class_anchors
    }

    /// Schema position of the infection-rate adjustment input
    pub fn infection_slot(&self) -> Option<usize> {
        self.infection_slot
    }

    /// Subtree expectations of one tree, indexed like its nodes
    pub fn expectations(&self, tree: usize) -> &[f64] {
        &self.expectations[tree]
    }

    /// Unconditional expected margin of a class
    pub fn base_value(&self, class: usize) -> f64 {
        self.base_values[class]
    }

    /// Largest possible margin swing of a class
    pub fn max_swing(&self, class: usize) -> f64 {
        self.max_swing[class]
    }

    /// Trees contributing to one class, with their ensemble indices
    pub fn class_trees(&self, class: usize) -> impl Iterator<Item = (usize, &Tree)> {
        self.artifact
            .trees
            .iter()
            .enumerate()
            .filter(move |(_, tree)| tree.class_index == class)
    }

    /// Raw margin per class, `None` if a traversal fault occurs
    pub fn margins(&self, features: &[f64]) -> Option<Vec<f64>> {
        let lr = self.artifact.learning_rate;
        let mut margins = self.artifact.base_score.clone();
        for tree in &self.artifact.trees {
            margins[tree.class_index] += lr * tree.evaluate(features)?;
        }
        Some(margins)
    }

    /// Serialize the artifact to canonical JSON (sorted keys, no whitespace)
    pub fn to_canonical_json(&self) -> serde_json::Result<String> {
        to_canonical_json(&self.artifact)
    }

    /// Blake3 hash of the canonical artifact as hex
    pub fn hash_hex(&self) -> serde_json::Result<String> {
        hash_canonical_hex(&self.artifact)
    }
}

/// Evenly spaced anchors from 10 to 90
fn default_anchors(n_classes: usize) -> Vec<f64> {
    if n_classes < 2 {
        return vec![50.0; n_classes];
    }
    let step = 80.0 / (n_classes - 1) as f64;
    (0..n_classes).map(|k| 10.0 + step * k as f64).collect()
}
