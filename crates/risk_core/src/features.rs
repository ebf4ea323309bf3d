//! Feature schema and feature vector construction
//!
//! The schema is fixed when a model is loaded. Every vector built against it
//! has a value in every slot: optional inputs that are missing, null, NaN or
//! not coercible fall back to the slot default, while the three core
//! epidemiological fields must be present, numeric and non-negative.

use crate::errors::{Result, RiskError};
use crate::serde_canon::hash_canonical;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, trace};

/// Raw named input for one region, as decoded from JSON or a table row
pub type RawFeatures = Map<String, Value>;

/// Core fields every input must carry
pub const REQUIRED_FIELDS: [&str; 3] = ["infection_rate", "survival_count", "new_reports"];

/// Documented defaults for optional fields that the schema does not override.
/// Any other slot defaults to zero.
pub const DEFAULT_OPTIONAL_FIELDS: [(&str, f64); 8] = [
    ("treatment_coverage", 0.0),
    ("testing_coverage", 0.0),
    ("prevention_coverage", 0.0),
    ("population", 0.0),
    ("gdp_per_capita", 0.0),
    ("healthcare_facilities", 0.0),
    ("education_level", 0.0),
    ("urbanization_rate", 0.0),
];

/// Value type of a schema slot. Categorical inputs are encoded as integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FeatureKind {
    #[default]
    #[serde(alias = "numeric")]
    Float,
    #[serde(alias = "int", alias = "categorical")]
    Integer,
}

/// One named slot of the feature schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSlot {
    pub name: String,
    #[serde(default)]
    pub kind: FeatureKind,
    /// Explicit default; falls back to the documented default table
    #[serde(default)]
    pub default: Option<f64>,
    /// Alternative input keys accepted for this slot
    #[serde(default)]
    pub aliases: Vec<String>,
    /// Domain prior weight used by the attention estimator (1.0 = neutral)
    #[serde(default = "neutral_prior")]
    pub prior: f64,
}

fn neutral_prior() -> f64 {
    1.0
}

impl FeatureSlot {
    pub fn float(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: FeatureKind::Float,
            default: None,
            aliases: Vec::new(),
            prior: 1.0,
        }
    }

    pub fn integer(name: impl Into<String>) -> Self {
        Self {
            kind: FeatureKind::Integer,
            ..Self::float(name)
        }
    }

    pub fn with_aliases<I, S>(mut self, aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.aliases = aliases.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_default(mut self, default: f64) -> Self {
        self.default = Some(default);
        self
    }

    pub fn with_prior(mut self, prior: f64) -> Self {
        self.prior = prior;
        self
    }

    /// Default value substituted when input is missing or unusable
    pub fn default_value(&self) -> f64 {
        let raw = self.default.unwrap_or_else(|| {
            DEFAULT_OPTIONAL_FIELDS
                .iter()
                .find(|(name, _)| *name == self.name)
                .map(|(_, value)| *value)
                .unwrap_or(0.0)
        });
        self.coerce_kind(raw)
    }

    fn coerce_kind(&self, value: f64) -> f64 {
        match self.kind {
            FeatureKind::Float => value,
            FeatureKind::Integer => value.trunc(),
        }
    }

    fn keys(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.name.as_str()).chain(self.aliases.iter().map(String::as_str))
    }
}

/// Serialized form of the schema inside a model artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSchemaSpec {
    pub slots: Vec<FeatureSlot>,
}

/// Ordered, immutable set of named slots a model expects
#[derive(Debug, Clone, Serialize)]
pub struct FeatureSchema {
    slots: Vec<FeatureSlot>,
    #[serde(skip)]
    index: HashMap<String, usize>,
    #[serde(skip)]
    fingerprint: [u8; 32],
}

impl PartialEq for FeatureSchema {
    fn eq(&self, other: &Self) -> bool {
        self.fingerprint == other.fingerprint
    }
}

impl FeatureSchema {
    /// Build a schema, rejecting empty, duplicate or ambiguous names
    pub fn new(slots: Vec<FeatureSlot>) -> std::result::Result<Self, String> {
        if slots.is_empty() {
            return Err("feature schema has no slots".to_string());
        }

        let mut index = HashMap::with_capacity(slots.len());
        for (position, slot) in slots.iter().enumerate() {
            if slot.name.trim().is_empty() {
                return Err(format!("slot {position} has an empty name"));
            }
            if !slot.prior.is_finite() || slot.prior <= 0.0 {
                return Err(format!(
                    "slot `{}` has invalid prior weight {}",
                    slot.name, slot.prior
                ));
            }
            if let Some(default) = slot.default {
                if !default.is_finite() {
                    return Err(format!("slot `{}` has a non-finite default", slot.name));
                }
            }
            for key in slot.keys() {
                if index.insert(key.to_string(), position).is_some() {
                    return Err(format!("duplicate feature name or alias `{key}`"));
                }
            }
        }

        let fingerprint = hash_canonical(&slots).map_err(|e| e.to_string())?;
        Ok(Self {
            slots,
            index,
            fingerprint,
        })
    }

    pub fn from_spec(spec: FeatureSchemaSpec) -> std::result::Result<Self, String> {
        Self::new(spec.slots)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn slots(&self) -> &[FeatureSlot] {
        &self.slots
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.slots.iter().map(|slot| slot.name.as_str())
    }

    pub fn name(&self, position: usize) -> Option<&str> {
        self.slots.get(position).map(|slot| slot.name.as_str())
    }

    /// Position of a slot by canonical name or alias
    pub fn position(&self, key: &str) -> Option<usize> {
        self.index.get(key).copied()
    }

    pub fn fingerprint(&self) -> &[u8; 32] {
        &self.fingerprint
    }

    pub fn fingerprint_hex(&self) -> String {
        hex::encode(self.fingerprint)
    }
}

/// Model-ready vector conforming exactly to one schema
#[derive(Debug, Clone)]
pub struct FeatureVector {
    schema: Arc<FeatureSchema>,
    values: Vec<f64>,
    defaulted: Vec<usize>,
}

impl FeatureVector {
    /// Values in schema order
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn schema(&self) -> &Arc<FeatureSchema> {
        &self.schema
    }

    /// Value of a slot by canonical name or alias
    pub fn get(&self, key: &str) -> Option<f64> {
        self.schema.position(key).map(|position| self.values[position])
    }

    /// Slot positions that received their default value
    pub fn defaulted(&self) -> &[usize] {
        &self.defaulted
    }

    /// `(name, value)` pairs in schema order
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.schema.names().zip(self.values.iter().copied())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Build a fully populated feature vector from raw named input
///
/// Unknown keys are ignored. Fails only when one of [`REQUIRED_FIELDS`] is
/// absent, non-numeric or negative.
pub fn build_feature_vector(schema: &Arc<FeatureSchema>, input: &RawFeatures) -> Result<FeatureVector> {
    for field in REQUIRED_FIELDS {
        validate_required(schema, input, field)?;
    }

    let mut values = Vec::with_capacity(schema.len());
    let mut defaulted = Vec::new();

    for (position, slot) in schema.slots().iter().enumerate() {
        let coerced = lookup(input, slot.keys()).and_then(coerce_number);
        match coerced {
            Some(value) => values.push(slot.coerce_kind(value)),
            None => {
                trace!(feature = %slot.name, "using default value");
                values.push(slot.default_value());
                defaulted.push(position);
            }
        }
    }

    debug!(
        slots = schema.len(),
        defaulted = defaulted.len(),
        "built feature vector"
    );

    Ok(FeatureVector {
        schema: Arc::clone(schema),
        values,
        defaulted,
    })
}

fn validate_required(schema: &FeatureSchema, input: &RawFeatures, field: &str) -> Result<()> {
    let value = match schema.position(field) {
        Some(position) => lookup(input, schema.slots()[position].keys()),
        None => lookup(input, std::iter::once(field)),
    };

    // Table cells arrive as text; a blank cell counts as missing
    let value = value
        .filter(|v| v.as_str().map_or(true, |s| !s.trim().is_empty()))
        .ok_or_else(|| RiskError::validation(field, "required field is missing"))?;
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .ok_or_else(|| RiskError::validation(field, format!("must be a number, got {value}")))?;

    if !number.is_finite() {
        return Err(RiskError::validation(field, "must be finite"));
    }
    if number < 0.0 {
        return Err(RiskError::validation(
            field,
            format!("cannot be negative, got {number}"),
        ));
    }
    Ok(())
}

/// First present, non-null value among the given keys
fn lookup<'a, 'k>(input: &'a RawFeatures, mut keys: impl Iterator<Item = &'k str>) -> Option<&'a Value> {
    keys.find_map(|key| input.get(key).filter(|value| !value.is_null()))
}

fn coerce_number(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    };
    number.filter(|v| v.is_finite())
}
