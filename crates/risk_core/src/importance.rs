//! Global feature importance from the ensemble structure

use crate::loader::ModelHandle;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureImportance {
    pub rank: usize,
    pub feature: String,
    /// Share of total importance, in [0, 1]
    pub importance: f64,
    pub importance_percent: f64,
}

/// Rank features by cover-weighted split gain
///
/// Each split adds `cover * |E[left] - E[right]|` to its feature, with a
/// cover of 1 when the artifact carries none. Features that never split are
/// left out. Returns at most `limit` entries when given.
pub fn global_importance(handle: &ModelHandle, limit: Option<usize>) -> Vec<FeatureImportance> {
    let model = handle.model();
    let mut raw = vec![0.0; handle.schema().len()];

    for (t, tree) in model.trees().iter().enumerate() {
        let expected = model.expectations(t);
        for node in &tree.nodes {
            let (Some(feature), Some(left), Some(right)) = (node.feature, node.left, node.right) else {
                continue;
            };
            if node.is_leaf() {
                continue;
            }
            let cover = node.cover.filter(|c| *c > 0.0).unwrap_or(1.0);
            raw[feature] += cover * (expected[left] - expected[right]).abs();
        }
    }

    let total: f64 = raw.iter().sum();
    if total <= 0.0 {
        return Vec::new();
    }

    let mut order: Vec<usize> = (0..raw.len()).filter(|&i| raw[i] > 0.0).collect();
    order.sort_by(|&a, &b| raw[b].total_cmp(&raw[a]).then(a.cmp(&b)));

    order
        .into_iter()
        .take(limit.unwrap_or(usize::MAX))
        .enumerate()
        .map(|(rank, i)| {
            let share = raw[i] / total;
            FeatureImportance {
                rank: rank + 1,
                feature: handle.schema().name(i).unwrap_or_default().to_string(),
                importance: share,
                importance_percent: share * 100.0,
            }
        })
        .collect()
}
