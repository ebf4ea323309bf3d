//! Ensemble prediction and risk level mapping
//!
//! Regression models use the raw margin as the risk score and derive
//! confidence from how far the score sits from the nearest level boundary.
//! Multiclass models turn class probabilities into a 0-100 score anchored per
//! class and use the top-class probability as confidence.

use crate::errors::{Result, RiskError};
use crate::features::FeatureVector;
use crate::gbdt::Objective;
use crate::loader::ModelHandle;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::sync::Arc;
use tracing::debug;

/// Descriptions for levels 1 through 5
pub const LEVEL_DESCRIPTIONS: [&str; 5] = [
    "Very low risk",
    "Low risk",
    "Moderate risk",
    "High risk",
    "Very high risk",
];

/// Largest bonus the infection-rate adjustment may add to a multiclass score
pub const MAX_INFECTION_ADJUSTMENT: f64 = 15.0;
const INFECTION_ADJUSTMENT_FACTOR: f64 = 20.0;
const NEUTRAL_SCORE: f64 = 50.0;

/// Level for a score: one plus the number of thresholds at or below it
pub fn risk_level(score: f64, thresholds: &[f64]) -> u8 {
    let passed = thresholds.iter().filter(|t| score >= **t).count();
    (1 + passed).min(LEVEL_DESCRIPTIONS.len()) as u8
}

pub fn level_description(level: u8) -> &'static str {
    let idx = usize::from(level.clamp(1, 5)) - 1;
    LEVEL_DESCRIPTIONS[idx]
}

/// Confidence from the distance to the nearest level boundary
///
/// `0.5` on a boundary, `1.0` at the middle of an inner band or at least half
/// a band width beyond the outermost thresholds.
pub fn boundary_confidence(score: f64, thresholds: &[f64]) -> f64 {
    if thresholds.len() < 2 || !score.is_finite() {
        return 0.5;
    }

    let nearest = thresholds
        .iter()
        .map(|t| (score - t).abs())
        .fold(f64::INFINITY, f64::min);

    let last = thresholds.len() - 1;
    let band = thresholds.iter().filter(|t| score >= **t).count();
    let width = match band {
        0 => thresholds[1] - thresholds[0],
        b if b > last => thresholds[last] - thresholds[last - 1],
        b => thresholds[b] - thresholds[b - 1],
    };
    let half = width / 2.0;
    if half <= 0.0 {
        return 0.5;
    }

    (0.5 + 0.5 * (nearest / half).min(1.0)).clamp(0.0, 1.0)
}

/// Numerically stable softmax
pub fn softmax(margins: &[f64]) -> Vec<f64> {
    let max = margins.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = margins.iter().map(|m| (m - max).exp()).collect();
    let sum: f64 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

/// Full result of scoring one feature vector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub risk_level: u8,
    pub risk_description: String,
    pub risk_score: f64,
    pub confidence: f64,
    /// Class whose margin explanations refer to (0 for regression)
    pub predicted_class: usize,
    /// Raw margin per class
    pub margins: Vec<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_probabilities: Option<Vec<f64>>,
}

/// Values the trees see: schema-checked and scaled when the model has a scaler
pub(crate) fn model_input<'a>(handle: &ModelHandle, vector: &'a FeatureVector) -> Result<Cow<'a, [f64]>> {
    let expected = handle.schema();
    let found = vector.schema();
    let same_schema = Arc::ptr_eq(expected, found) || expected.fingerprint() == found.fingerprint();
    if !same_schema || vector.len() != expected.len() {
        return Err(RiskError::SchemaMismatch {
            expected: format!("{} slots ({})", expected.len(), &expected.fingerprint_hex()[..16]),
            found: format!("{} slots ({})", vector.len(), &found.fingerprint_hex()[..16]),
        });
    }

    Ok(match handle.scaler() {
        Some(scaler) => Cow::Owned(scaler.transform(vector.values())),
        None => Cow::Borrowed(vector.values()),
    })
}

/// Score a feature vector and map it to a risk level
pub fn predict(handle: &ModelHandle, vector: &FeatureVector) -> Result<RiskAssessment> {
    let input = model_input(handle, vector)?;
    let model = handle.model();

    let margins = model
        .margins(&input)
        .ok_or_else(|| RiskError::Inference("tree traversal left the node array".to_string()))?;
    if margins.iter().any(|m| !m.is_finite()) {
        return Err(RiskError::Inference(format!("non-finite margin: {margins:?}")));
    }

    let thresholds = model.level_thresholds();
    let (score, confidence, predicted_class, probabilities) = match model.objective() {
        Objective::Regression => {
            let score = margins[0];
            (score, boundary_confidence(score, thresholds), 0, None)
        }
        Objective::Multiclass { .. } => {
            let probabilities = softmax(&margins);
            let (top, top_p) = probabilities
                .iter()
                .copied()
                .enumerate()
                .fold((0, f64::NEG_INFINITY), |best, (k, p)| if p > best.1 { (k, p) } else { best });

            let mut score: f64 = probabilities
                .iter()
                .zip(model.class_anchors())
                .map(|(p, anchor)| p * anchor)
                .sum();
            if let Some(slot) = model.infection_slot() {
                let rate = vector.values()[slot].max(0.0);
                score += (rate * INFECTION_ADJUSTMENT_FACTOR).min(MAX_INFECTION_ADJUSTMENT);
            }
            let score = (score * top_p + NEUTRAL_SCORE * (1.0 - top_p)).clamp(0.0, 100.0);
            (score, top_p.clamp(0.0, 1.0), top, Some(probabilities))
        }
    };

    if !score.is_finite() {
        return Err(RiskError::Inference(format!("non-finite risk score {score}")));
    }

    let level = risk_level(score, thresholds);
    debug!(score, level, confidence, "scored feature vector");

    Ok(RiskAssessment {
        risk_level: level,
        risk_description: level_description(level).to_string(),
        risk_score: score,
        confidence,
        predicted_class,
        margins,
        class_probabilities: probabilities,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::{build_feature_vector, FeatureSchema, FeatureSchemaSpec, FeatureSlot, RawFeatures};
    use crate::gbdt::{EnsembleModel, ModelArtifact, Node, Tree, DEFAULT_LEVEL_THRESHOLDS};
    use crate::scaler::Scaler;
    use serde_json::json;

    const T: [f64; 4] = DEFAULT_LEVEL_THRESHOLDS;

    fn slots() -> Vec<FeatureSlot> {
        vec![
            FeatureSlot::float("infection_rate"),
            FeatureSlot::integer("survival_count"),
            FeatureSlot::integer("new_reports"),
        ]
    }

    fn artifact(objective: Objective) -> ModelArtifact {
        let classes = objective.num_classes();
        ModelArtifact {
            version: 1,
            model_name: "predictor-test".to_string(),
            objective,
            learning_rate: 1.0,
            base_score: vec![if classes == 1 { 30.0 } else { 0.0 }; classes],
            feature_schema: FeatureSchemaSpec { slots: slots() },
            trees: vec![Tree::for_class(
                classes - 1,
                vec![Node::internal(0, 0.3, 1, 2), Node::leaf(-5.0), Node::leaf(40.0)],
            )],
            level_thresholds: T.to_vec(),
            class_anchors: None,
            infection_rate_feature: None,
        }
    }

    fn handle(objective: Objective) -> ModelHandle {
        ModelHandle::from_parts(EnsembleModel::from_artifact(artifact(objective)).unwrap(), None).unwrap()
    }

    fn raw(rate: f64) -> RawFeatures {
        json!({"infection_rate": rate, "survival_count": 100, "new_reports": 5})
            .as_object()
            .cloned()
            .unwrap()
    }

    #[test]
    fn level_mapping_is_gap_free() {
        assert_eq!(risk_level(-1e9, &T), 1);
        assert_eq!(risk_level(19.999, &T), 1);
        assert_eq!(risk_level(20.0, &T), 2);
        assert_eq!(risk_level(59.9, &T), 3);
        assert_eq!(risk_level(60.0, &T), 4);
        assert_eq!(risk_level(80.0, &T), 5);
        assert_eq!(risk_level(1e9, &T), 5);
        assert_eq!(level_description(3), "Moderate risk");
        assert_eq!(level_description(5), "Very high risk");
    }

    #[test]
    fn boundary_confidence_shape() {
        assert!((boundary_confidence(40.0, &T) - 0.5).abs() < 1e-12);
        assert!((boundary_confidence(50.0, &T) - 1.0).abs() < 1e-12);
        assert!((boundary_confidence(45.0, &T) - 0.75).abs() < 1e-12);
        assert!((boundary_confidence(15.0, &T) - 0.75).abs() < 1e-12);
        assert!((boundary_confidence(-100.0, &T) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn softmax_is_normalized() {
        let p = softmax(&[1000.0, 1001.0, 999.0]);
        assert!((p.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        assert!(p[1] > p[0] && p[0] > p[2]);
    }

    #[test]
    fn regression_prediction() {
        let handle = handle(Objective::Regression);
        let vector = build_feature_vector(handle.schema(), &raw(0.5)).unwrap();
        let assessment = predict(&handle, &vector).unwrap();

        assert_eq!(assessment.risk_score, 70.0);
        assert_eq!(assessment.risk_level, 4);
        assert_eq!(assessment.risk_description, "High risk");
        assert!((assessment.confidence - 1.0).abs() < 1e-12);
        assert!(assessment.class_probabilities.is_none());

        let low = predict(&handle, &build_feature_vector(handle.schema(), &raw(0.1)).unwrap()).unwrap();
        assert_eq!(low.risk_score, 25.0);
        assert_eq!(low.risk_level, 2);
    }

    #[test]
    fn multiclass_prediction_blends_toward_midpoint() {
        let handle = handle(Objective::Multiclass { n_classes: 3 });
        let vector = build_feature_vector(handle.schema(), &raw(0.5)).unwrap();
        let assessment = predict(&handle, &vector).unwrap();

        let probabilities = assessment.class_probabilities.clone().unwrap();
        assert!((probabilities.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        assert_eq!(assessment.predicted_class, 2);

        let c = probabilities[2];
        let expected = (10.0 * probabilities[0] + 50.0 * probabilities[1] + 90.0 * c + 10.0) * c
            + 50.0 * (1.0 - c);
        assert!((assessment.risk_score - expected.clamp(0.0, 100.0)).abs() < 1e-9);
        assert!((assessment.confidence - c).abs() < 1e-12);
        assert!((0.0..=100.0).contains(&assessment.risk_score));
    }

    #[test]
    fn scaler_is_applied_before_traversal() {
        let model = EnsembleModel::from_artifact(artifact(Objective::Regression)).unwrap();
        let scaler = Scaler {
            feature_names: vec!["infection_rate".into(), "survival_count".into(), "new_reports".into()],
            mean: vec![0.4, 0.0, 0.0],
            scale: vec![0.1, 1.0, 1.0],
        };
        let handle = ModelHandle::from_parts(model, Some(scaler)).unwrap();

        // (0.42 - 0.4) / 0.1 = 0.2, below the 0.3 split
        let vector = build_feature_vector(handle.schema(), &raw(0.42)).unwrap();
        assert_eq!(predict(&handle, &vector).unwrap().risk_score, 25.0);
    }

    #[test]
    fn foreign_schema_is_rejected() {
        let handle = handle(Objective::Regression);
        let other = Arc::new(FeatureSchema::new(vec![FeatureSlot::float("infection_rate")]).unwrap());
        let vector = build_feature_vector(&other, &raw(0.5)).unwrap();

        let err = predict(&handle, &vector).unwrap_err();
        assert!(matches!(err, RiskError::SchemaMismatch { .. }));
    }

    #[test]
    fn repeated_predictions_are_bit_identical() {
        let handle = handle(Objective::Multiclass { n_classes: 3 });
        let vector = build_feature_vector(handle.schema(), &raw(0.37)).unwrap();
        let first = predict(&handle, &vector).unwrap();
        for _ in 0..10 {
            let again = predict(&handle, &vector).unwrap();
            assert_eq!(first.risk_score.to_bits(), again.risk_score.to_bits());
        }
    }
}
