//! Path-based contribution decomposition
//!
//! Every tree is walked along the path the prediction took. At each split the
//! change in subtree expectation between the node and the child actually
//! taken is credited to the split feature, scaled by the learning rate. The
//! increments telescope, so per tree they add up to `leaf - E[root]` and the
//! per-feature totals add up to `prediction - base_value`.

use crate::errors::{Result, RiskError};
use crate::features::FeatureVector;
use crate::loader::ModelHandle;
use crate::predictor::model_input;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Relative tolerance of the contribution-sum law
pub const SUM_TOLERANCE: f64 = 1e-3;

pub const DEFAULT_TOP_N: usize = 5;

/// Name of the attribution method
pub const METHOD: &str = "path_attribution";

/// One feature's share of the explained output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureContribution {
    pub feature: String,
    /// Raw input value, before any scaling
    pub value: f64,
    pub contribution: f64,
}

/// Attribution of one prediction to its input features
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContributionBreakdown {
    /// Unconditional expected output of the explained class
    pub base_value: f64,
    /// Explained raw margin
    pub prediction: f64,
    pub top_positive: Vec<FeatureContribution>,
    pub top_negative: Vec<FeatureContribution>,
    #[serde(skip)]
    explained_class: usize,
    #[serde(skip)]
    features: Vec<FeatureContribution>,
}

impl ContributionBreakdown {
    /// Every feature in schema order, including zero contributions
    pub fn features(&self) -> &[FeatureContribution] {
        &self.features
    }

    pub fn contribution(&self, feature: &str) -> Option<f64> {
        self.features
            .iter()
            .find(|f| f.feature == feature)
            .map(|f| f.contribution)
    }

    pub fn contribution_sum(&self) -> f64 {
        self.features.iter().map(|f| f.contribution).sum()
    }

    pub fn explained_class(&self) -> usize {
        self.explained_class
    }

    pub fn method(&self) -> &'static str {
        METHOD
    }

    /// Whether `base_value + Σ contributions` matches `prediction`
    pub fn satisfies_sum_law(&self) -> bool {
        let residual = (self.base_value + self.contribution_sum() - self.prediction).abs();
        residual <= SUM_TOLERANCE * self.prediction.abs().max(1.0)
    }
}

/// Decompose the margin of `class` for a feature vector
pub fn decompose(
    handle: &ModelHandle,
    vector: &FeatureVector,
    class: usize,
    top_n: usize,
) -> Result<ContributionBreakdown> {
    let model = handle.model();
    if class >= model.num_classes() {
        return Err(RiskError::Inference(format!(
            "class {class} out of range for {} classes",
            model.num_classes()
        )));
    }

    let input = model_input(handle, vector)?;
    let lr = model.learning_rate();
    let mut contributions = vec![0.0; vector.len()];
    let mut prediction = model.artifact().base_score[class];

    for (t, tree) in model.class_trees(class) {
        let expected = model.expectations(t);
        let path = tree
            .decision_path(&input)
            .ok_or_else(|| RiskError::Inference(format!("tree {t} traversal failed")))?;

        for step in path.windows(2) {
            let (node, child) = (step[0], step[1]);
            if let Some(feature) = tree.nodes[node].feature {
                contributions[feature] += lr * (expected[child] - expected[node]);
            }
        }

        let leaf = path
            .last()
            .and_then(|idx| tree.nodes[*idx].leaf)
            .ok_or_else(|| RiskError::Inference(format!("tree {t} path ended off a leaf")))?;
        prediction += lr * leaf;
    }

    let features: Vec<FeatureContribution> = vector
        .iter()
        .zip(contributions)
        .map(|((name, value), contribution)| FeatureContribution {
            feature: name.to_string(),
            value,
            contribution,
        })
        .collect();

    let top_positive = ranked(&features, top_n, |c| c > 0.0, |a, b| b.total_cmp(&a));
    let top_negative = ranked(&features, top_n, |c| c < 0.0, |a, b| a.total_cmp(&b));

    Ok(ContributionBreakdown {
        base_value: model.base_value(class),
        prediction,
        top_positive,
        top_negative,
        explained_class: class,
        features,
    })
}

/// Filtered top-N, ordered by `order` on contribution then by schema position
fn ranked(
    features: &[FeatureContribution],
    n: usize,
    keep: impl Fn(f64) -> bool,
    order: impl Fn(f64, f64) -> Ordering,
) -> Vec<FeatureContribution> {
    let mut picked: Vec<(usize, &FeatureContribution)> = features
        .iter()
        .enumerate()
        .filter(|(_, f)| keep(f.contribution))
        .collect();
    picked.sort_by(|(ia, a), (ib, b)| order(a.contribution, b.contribution).then(ia.cmp(ib)));
    picked.into_iter().take(n).map(|(_, f)| f.clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::{build_feature_vector, FeatureSchemaSpec, FeatureSlot, RawFeatures};
    use crate::gbdt::{EnsembleModel, ModelArtifact, Node, Objective, Tree};
    use serde_json::json;

    fn handle() -> ModelHandle {
        let artifact = ModelArtifact {
            version: 1,
            model_name: "contrib-test".to_string(),
            objective: Objective::Regression,
            learning_rate: 0.5,
            base_score: vec![40.0],
            feature_schema: FeatureSchemaSpec {
                slots: vec![
                    FeatureSlot::float("infection_rate"),
                    FeatureSlot::integer("survival_count"),
                    FeatureSlot::integer("new_reports"),
                    FeatureSlot::float("treatment_coverage"),
                ],
            },
            trees: vec![
                Tree::new(vec![
                    Node::internal(0, 0.3, 1, 2).with_cover(10.0),
                    Node::leaf(-10.0).with_cover(5.0),
                    Node::internal(2, 20.0, 3, 4).with_cover(5.0),
                    Node::leaf(10.0).with_cover(3.0),
                    Node::leaf(30.0).with_cover(2.0),
                ]),
                Tree::new(vec![
                    Node::internal(3, 70.0, 1, 2).with_cover(10.0),
                    Node::leaf(6.0).with_cover(4.0),
                    Node::leaf(-4.0).with_cover(6.0),
                ]),
            ],
            level_thresholds: vec![20.0, 40.0, 60.0, 80.0],
            class_anchors: None,
            infection_rate_feature: None,
        };
        ModelHandle::from_parts(EnsembleModel::from_artifact(artifact).unwrap(), None).unwrap()
    }

    fn raw(value: serde_json::Value) -> RawFeatures {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn contributions_follow_the_decision_path() {
        let handle = handle();
        let vector = build_feature_vector(
            handle.schema(),
            &raw(json!({"infection_rate": 0.5, "survival_count": 900, "new_reports": 50, "treatment_coverage": 85.0})),
        )
        .unwrap();
        let breakdown = decompose(&handle, &vector, 0, 5).unwrap();

        // Tree 1: E = [4, -10, 18, 10, 30]; path 0 -> 2 -> 4
        // Tree 2: E = [0, 6, -4]; path 0 -> 2
        assert!((breakdown.contribution("infection_rate").unwrap() - 0.5 * 14.0).abs() < 1e-12);
        assert!((breakdown.contribution("new_reports").unwrap() - 0.5 * 12.0).abs() < 1e-12);
        assert!((breakdown.contribution("treatment_coverage").unwrap() - 0.5 * -4.0).abs() < 1e-12);
        assert_eq!(breakdown.contribution("survival_count"), Some(0.0));

        assert!((breakdown.base_value - 42.0).abs() < 1e-12);
        assert!((breakdown.prediction - 53.0).abs() < 1e-12);
        assert!(breakdown.satisfies_sum_law());
        assert_eq!(breakdown.method(), "path_attribution");
    }

    #[test]
    fn top_lists_are_signed_and_ordered() {
        let handle = handle();
        let vector = build_feature_vector(
            handle.schema(),
            &raw(json!({"infection_rate": 0.5, "survival_count": 900, "new_reports": 50, "treatment_coverage": 85.0})),
        )
        .unwrap();
        let breakdown = decompose(&handle, &vector, 0, 5).unwrap();

        let positive: Vec<&str> = breakdown.top_positive.iter().map(|c| c.feature.as_str()).collect();
        assert_eq!(positive, vec!["infection_rate", "new_reports"]);
        assert_eq!(breakdown.top_negative.len(), 1);
        assert_eq!(breakdown.top_negative[0].feature, "treatment_coverage");
        assert_eq!(breakdown.top_negative[0].value, 85.0);

        let truncated = decompose(&handle, &vector, 0, 1).unwrap();
        assert_eq!(truncated.top_positive.len(), 1);
        assert_eq!(truncated.top_positive[0].feature, "infection_rate");
    }

    #[test]
    fn out_of_range_class_is_an_inference_error() {
        let handle = handle();
        let vector = build_feature_vector(
            handle.schema(),
            &raw(json!({"infection_rate": 0.1, "survival_count": 1, "new_reports": 1})),
        )
        .unwrap();
        let err = decompose(&handle, &vector, 3, 5).unwrap_err();
        assert_eq!(err.code(), "INFERENCE_ERROR");
    }

    #[test]
    fn serialized_breakdown_has_public_fields_only() {
        let handle = handle();
        let vector = build_feature_vector(
            handle.schema(),
            &raw(json!({"infection_rate": 0.1, "survival_count": 1, "new_reports": 1})),
        )
        .unwrap();
        let value = serde_json::to_value(decompose(&handle, &vector, 0, 5).unwrap()).unwrap();
        let mut keys: Vec<&str> = value.as_object().unwrap().keys().map(String::as_str).collect();
        keys.sort_unstable();
        assert_eq!(keys, vec!["base_value", "prediction", "top_negative", "top_positive"]);
    }
}
