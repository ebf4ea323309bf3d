//! Heuristic feature saliency derived from contributions
//!
//! These weights are not a trained attention layer. They are a softmax over
//! absolute contribution magnitudes, nudged by per-feature domain priors, and
//! are recomputed for every prediction.

use crate::contributions::ContributionBreakdown;
use crate::loader::ModelHandle;
use crate::predictor::softmax;
use serde::{Deserialize, Serialize};

pub const DEFAULT_TOP_K: usize = 10;
pub const DEFAULT_TEMPERATURE: f64 = 0.1;
pub const DEFAULT_PRIOR_STRENGTH: f64 = 0.3;

/// Tuning for the saliency transform
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AttentionParams {
    /// Length of the ranked list
    pub top_k: usize,
    /// Softmax temperature over normalized magnitudes
    pub temperature: f64,
    /// Weight of `ln(prior)` added to each logit
    pub prior_strength: f64,
}

impl Default for AttentionParams {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            temperature: DEFAULT_TEMPERATURE,
            prior_strength: DEFAULT_PRIOR_STRENGTH,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendedFeature {
    pub feature: String,
    pub weight: f64,
}

/// Derived saliency for one prediction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttentionWeights {
    /// Non-negative weights in schema order, summing to 1
    pub feature_attention: Vec<f64>,
    /// Total contribution magnitude relative to the model's largest swing
    pub sample_attention: f64,
    /// Features with a non-zero contribution, by weight descending
    pub top_attended_features: Vec<AttendedFeature>,
}

impl AttentionWeights {
    pub fn weight_sum(&self) -> f64 {
        self.feature_attention.iter().sum()
    }
}

/// Derive attention weights from a contribution breakdown
pub fn estimate(
    handle: &ModelHandle,
    breakdown: &ContributionBreakdown,
    params: &AttentionParams,
) -> AttentionWeights {
    let slots = handle.schema().slots();
    let magnitudes: Vec<f64> = breakdown
        .features()
        .iter()
        .map(|f| f.contribution.abs())
        .collect();
    let total: f64 = magnitudes.iter().sum();
    let max = magnitudes.iter().copied().fold(0.0, f64::max);

    let feature_attention = if magnitudes.is_empty() {
        Vec::new()
    } else if max <= 0.0 {
        vec![1.0 / magnitudes.len() as f64; magnitudes.len()]
    } else {
        let scale = params.temperature * max;
        let logits: Vec<f64> = magnitudes
            .iter()
            .zip(slots)
            .map(|(m, slot)| m / scale + params.prior_strength * slot.prior.ln())
            .collect();
        softmax(&logits)
    };

    let swing = handle.model().max_swing(breakdown.explained_class());
    let sample_attention = if swing > 0.0 {
        (total / swing).clamp(0.0, 1.0)
    } else {
        0.0
    };

    let mut ranked: Vec<usize> = (0..magnitudes.len())
        .filter(|&i| magnitudes[i] > 0.0)
        .collect();
    ranked.sort_by(|&a, &b| {
        feature_attention[b]
            .total_cmp(&feature_attention[a])
            .then(a.cmp(&b))
    });
    let top_attended_features = ranked
        .into_iter()
        .take(params.top_k)
        .map(|i| AttendedFeature {
            feature: breakdown.features()[i].feature.clone(),
            weight: feature_attention[i],
        })
        .collect();

    AttentionWeights {
        feature_attention,
        sample_attention,
        top_attended_features,
    }
}
