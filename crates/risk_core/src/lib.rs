//! Regional Risk Inference & Explainability Engine
//!
//! Scores a region's epidemiological and socioeconomic indicators with a
//! gradient boosted tree ensemble and explains each score to a reviewer.
//!
//! Modules:
//! - `loader`: Model artifact loading, metadata and the explicit model cache
//! - `features`: Feature schema and feature vector construction with defaults
//! - `gbdt`: Tree ensemble structures, traversal and subtree expectations
//! - `predictor`: Risk score, 1-5 level, description and confidence
//! - `contributions`: Path-based per-feature contribution decomposition
//! - `attention`: Heuristic saliency weights derived from contributions
//! - `importance`: Global feature ranking from the ensemble structure
//! - `engine`: Single-prediction entry point
//! - `batch`: Order-preserving row-by-row scoring of region tables
//! - `table`: CSV and JSON table I/O
//! - `config`: TOML configuration with environment overrides

pub mod attention;
pub mod batch;
pub mod config;
pub mod contributions;
pub mod engine;
pub mod errors;
pub mod features;
pub mod gbdt;
pub mod importance;
pub mod loader;
pub mod predictor;
pub mod scaler;
pub mod serde_canon;
pub mod table;

pub use attention::{AttendedFeature, AttentionParams, AttentionWeights};
pub use batch::{BatchOutcome, BatchPipeline, BatchRow, BatchSummary, RowOutcome};
pub use config::{BatchConfig, EngineConfig, ExplainConfig};
pub use contributions::{ContributionBreakdown, FeatureContribution, SUM_TOLERANCE};
pub use engine::{ExplainedAssessment, PredictOptions, RiskEngine, RiskPrediction};
pub use errors::{Result, RiskError};
pub use features::{
    build_feature_vector, FeatureKind, FeatureSchema, FeatureSlot, FeatureVector, RawFeatures,
    DEFAULT_OPTIONAL_FIELDS, REQUIRED_FIELDS,
};
pub use gbdt::{EnsembleModel, ModelArtifact, Node, Objective, Tree};
pub use importance::FeatureImportance;
pub use loader::{ModelCache, ModelHandle, ModelMetadata};
pub use predictor::{RiskAssessment, LEVEL_DESCRIPTIONS};
pub use scaler::Scaler;
pub use table::{Table, TableFormat};

/// Crate version string for model info reports
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
