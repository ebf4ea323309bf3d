//! Gradient boosted tree ensemble
//!
//! Floating-point tree ensembles with a deterministic traversal order and a
//! canonical JSON artifact format.
//!
//! # Model Format
//!
//! ```json
//! {
//!   "version": 1,
//!   "model_name": "regional-risk-gbdt",
//!   "objective": "regression",
//!   "learning_rate": 0.1,
//!   "base_score": [42.0],
//!   "feature_schema": {"slots": [{"name": "infection_rate", "prior": 1.3}]},
//!   "trees": [
//!     {
//!       "class_index": 0,
//!       "nodes": [
//!         {"feature": 0, "threshold": 0.35, "left": 1, "right": 2, "cover": 100.0},
//!         {"leaf": -8.5, "cover": 70.0},
//!         {"leaf": 19.0, "cover": 30.0}
//!       ]
//!     }
//!   ],
//!   "level_thresholds": [20.0, 40.0, 60.0, 80.0]
//! }
//! ```
//!
//! # Usage
//!
//! ```rust
//! use regional_risk_core::features::{FeatureSchemaSpec, FeatureSlot};
//! use regional_risk_core::gbdt::{EnsembleModel, ModelArtifact, Node, Objective, Tree};
//!
//! let artifact = ModelArtifact {
//!     version: 1,
//!     model_name: "stump".to_string(),
//!     objective: Objective::Regression,
//!     learning_rate: 1.0,
//!     base_score: vec![50.0],
//!     feature_schema: FeatureSchemaSpec {
//!         slots: vec![FeatureSlot::float("infection_rate")],
//!     },
//!     trees: vec![Tree::new(vec![
//!         Node::internal(0, 0.35, 1, 2),
//!         Node::leaf(-10.0),
//!         Node::leaf(20.0),
//!     ])],
//!     level_thresholds: vec![20.0, 40.0, 60.0, 80.0],
//!     class_anchors: None,
//!     infection_rate_feature: None,
//! };
//!
//! let model = EnsembleModel::from_artifact(artifact).unwrap();
//! assert_eq!(model.margins(&[0.5]), Some(vec![70.0]));
//! ```

pub mod model;
pub mod tree;

pub use model::{EnsembleModel, ModelArtifact, Objective, DEFAULT_LEVEL_THRESHOLDS, MODEL_FORMAT_VERSION};
pub use tree::{Node, Tree};
