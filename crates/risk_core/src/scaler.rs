//! Standard-score feature normalization applied before tree traversal

use crate::features::FeatureSchema;
use serde::{Deserialize, Serialize};

/// Per-feature `(x - mean) / scale` parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scaler {
    pub feature_names: Vec<String>,
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

impl Scaler {
    /// Check the parameters line up with a schema, slot for slot
    pub fn validate(&self, schema: &FeatureSchema) -> Result<(), String> {
        if self.mean.len() != self.feature_names.len() || self.scale.len() != self.feature_names.len() {
            return Err(format!(
                "scaler has {} names, {} means and {} scales",
                self.feature_names.len(),
                self.mean.len(),
                self.scale.len()
            ));
        }
        if self.feature_names.len() != schema.len() {
            return Err(format!(
                "scaler covers {} features, schema has {}",
                self.feature_names.len(),
                schema.len()
            ));
        }
        if let Some((position, (name, expected))) = self
            .feature_names
            .iter()
            .zip(schema.names())
            .enumerate()
            .find(|(_, (name, expected))| name.as_str() != *expected)
        {
            return Err(format!(
                "scaler feature {position} is `{name}`, schema expects `{expected}`"
            ));
        }
        if self.mean.iter().chain(&self.scale).any(|v| !v.is_finite()) {
            return Err("scaler contains non-finite parameters".to_string());
        }
        Ok(())
    }

    /// Normalize values in schema order; a zero scale leaves the centered value as is
    pub fn transform(&self, values: &[f64]) -> Vec<f64> {
        values
            .iter()
            .zip(self.mean.iter().zip(&self.scale))
            .map(|(x, (mean, scale))| {
                let scale = if *scale == 0.0 { 1.0 } else { *scale };
                (x - mean) / scale
            })
            .collect()
    }
}
