//! Single-prediction path: build, score, and optionally explain
//!
//! ```text
//! RawFeatures -> FeatureVector -> RiskAssessment -> ContributionBreakdown -> AttentionWeights
//! ```

use crate::attention::{self, AttentionWeights};
use crate::config::{EngineConfig, ExplainConfig};
use crate::contributions::{self, ContributionBreakdown};
use crate::errors::Result;
use crate::features::{build_feature_vector, FeatureVector, RawFeatures};
use crate::importance::{global_importance, FeatureImportance};
use crate::loader::{ModelHandle, ModelMetadata};
use crate::predictor::{self, RiskAssessment};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

/// Which explanations to compute alongside the score
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PredictOptions {
    pub include_contributions: bool,
    pub include_attention: bool,
}

impl PredictOptions {
    pub fn full() -> Self {
        Self {
            include_contributions: true,
            include_attention: true,
        }
    }
}

/// Public single-prediction record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskPrediction {
    pub risk_level: u8,
    pub risk_description: String,
    pub risk_score: f64,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature_contributions: Option<ContributionBreakdown>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attention_weights: Option<AttentionWeights>,
}

/// Assessment with class detail plus whatever explanations were requested
#[derive(Debug, Clone, PartialEq)]
pub struct ExplainedAssessment {
    pub assessment: RiskAssessment,
    pub contributions: Option<ContributionBreakdown>,
    pub attention: Option<AttentionWeights>,
}

impl ExplainedAssessment {
    pub fn into_prediction(self) -> RiskPrediction {
        RiskPrediction {
            risk_level: self.assessment.risk_level,
            risk_description: self.assessment.risk_description,
            risk_score: self.assessment.risk_score,
            confidence: self.assessment.confidence,
            feature_contributions: self.contributions,
            attention_weights: self.attention,
        }
    }
}

/// Scores raw feature mappings against one loaded model
#[derive(Debug, Clone)]
pub struct RiskEngine {
    handle: ModelHandle,
    explain: ExplainConfig,
}

impl RiskEngine {
    pub fn new(handle: ModelHandle, explain: ExplainConfig) -> Self {
        Self { handle, explain }
    }

    /// Load the configured model and wrap it in an engine
    pub fn from_config(config: &EngineConfig) -> Result<Self> {
        config.validate()?;
        let handle = ModelHandle::load(&config.model.path, config.model.scaler_path.as_deref())?;
        Ok(Self::new(handle, config.explain.clone()))
    }

    pub fn handle(&self) -> &ModelHandle {
        &self.handle
    }

    pub fn metadata(&self) -> &ModelMetadata {
        self.handle.metadata()
    }

    pub fn explain_config(&self) -> &ExplainConfig {
        &self.explain
    }

    pub fn build_vector(&self, input: &RawFeatures) -> Result<FeatureVector> {
        let vector = build_feature_vector(self.handle.schema(), input)?;
        if !vector.defaulted().is_empty() {
            trace!(
                defaulted = ?vector
                    .defaulted()
                    .iter()
                    .filter_map(|&i| self.handle.schema().name(i))
                    .collect::<Vec<_>>(),
                "optional features defaulted"
            );
        }
        Ok(vector)
    }

    /// Score one input with class detail
    pub fn assess(&self, input: &RawFeatures, options: PredictOptions) -> Result<ExplainedAssessment> {
        let vector = self.build_vector(input)?;
        self.assess_vector(&vector, options)
    }

    /// Score an already built vector
    pub fn assess_vector(&self, vector: &FeatureVector, options: PredictOptions) -> Result<ExplainedAssessment> {
        let assessment = predictor::predict(&self.handle, vector)?;

        let breakdown = if options.include_contributions || options.include_attention {
            Some(contributions::decompose(
                &self.handle,
                vector,
                assessment.predicted_class,
                self.explain.top_n,
            )?)
        } else {
            None
        };

        let attention = match (&breakdown, options.include_attention) {
            (Some(breakdown), true) => Some(attention::estimate(
                &self.handle,
                breakdown,
                &self.explain.attention_params(),
            )),
            _ => None,
        };

        debug!(
            level = assessment.risk_level,
            score = assessment.risk_score,
            contributions = options.include_contributions,
            attention = options.include_attention,
            "prediction complete"
        );

        Ok(ExplainedAssessment {
            assessment,
            contributions: breakdown.filter(|_| options.include_contributions),
            attention,
        })
    }

    /// Score one input; any failure is returned to the caller
    pub fn predict(&self, input: &RawFeatures, options: PredictOptions) -> Result<RiskPrediction> {
        Ok(self.assess(input, options)?.into_prediction())
    }

    /// Global feature ranking of the loaded model
    pub fn importance(&self, limit: Option<usize>) -> Vec<FeatureImportance> {
        global_importance(&self.handle, limit)
    }
}
