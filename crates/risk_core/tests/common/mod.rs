//! Shared fixtures: a 110-slot regional schema and small hand-checked ensembles
#![allow(dead_code)]

use regional_risk_core::config::ExplainConfig;
use regional_risk_core::features::FeatureSchemaSpec;
use regional_risk_core::gbdt::{EnsembleModel, ModelArtifact, Node, Objective, Tree};
use regional_risk_core::{FeatureSlot, ModelHandle, RawFeatures, RiskEngine, Table};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};

pub const INFECTION_RATE: usize = 0;
pub const SURVIVAL_COUNT: usize = 1;
pub const NEW_REPORTS: usize = 2;
pub const TREATMENT_COVERAGE: usize = 3;
pub const TESTING_COVERAGE: usize = 4;
pub const POPULATION: usize = 6;
pub const FIRST_INDICATOR: usize = 11;
pub const SCHEMA_LEN: usize = 110;

pub fn schema_slots() -> Vec<FeatureSlot> {
    let mut slots = vec![
        FeatureSlot::float("infection_rate").with_aliases(["感染率"]).with_prior(1.3),
        FeatureSlot::integer("survival_count").with_aliases(["存活数"]).with_prior(1.2),
        FeatureSlot::integer("new_reports").with_aliases(["新报告"]).with_prior(1.2),
        FeatureSlot::float("treatment_coverage").with_aliases(["治疗覆盖率"]).with_prior(1.1),
        FeatureSlot::float("testing_coverage").with_prior(1.1),
        FeatureSlot::float("prevention_coverage").with_prior(1.1),
        FeatureSlot::integer("population").with_aliases(["人口"]),
        FeatureSlot::float("gdp_per_capita"),
        FeatureSlot::integer("healthcare_facilities"),
        FeatureSlot::float("education_level"),
        FeatureSlot::float("urbanization_rate"),
    ];
    slots.extend((1..=SCHEMA_LEN - FIRST_INDICATOR).map(|i| FeatureSlot::float(format!("indicator_{i:03}"))));
    slots
}

fn split(feature: usize, threshold: f64, cover: f64, left: usize, right: usize) -> Node {
    Node::internal(feature, threshold, left, right).with_cover(cover)
}

fn leaf(value: f64, cover: f64) -> Node {
    Node::leaf(value).with_cover(cover)
}

/// Regression ensemble whose contributions carry both signs for typical inputs
pub fn regression_artifact() -> ModelArtifact {
    ModelArtifact {
        version: 1,
        model_name: "regional-risk-fixture".to_string(),
        objective: Objective::Regression,
        learning_rate: 1.0,
        base_score: vec![35.0],
        feature_schema: FeatureSchemaSpec { slots: schema_slots() },
        trees: vec![
            Tree::new(vec![
                split(INFECTION_RATE, 0.3, 100.0, 1, 2),
                leaf(-8.0, 60.0),
                split(NEW_REPORTS, 60.0, 40.0, 3, 4),
                leaf(12.0, 25.0),
                leaf(24.0, 15.0),
            ]),
            Tree::new(vec![
                split(TREATMENT_COVERAGE, 70.0, 100.0, 1, 2),
                leaf(10.0, 40.0),
                leaf(-9.0, 60.0),
            ]),
            Tree::new(vec![
                split(SURVIVAL_COUNT, 1200.0, 100.0, 1, 2),
                leaf(-3.0, 50.0),
                leaf(6.0, 50.0),
            ]),
            Tree::new(vec![
                split(POPULATION, 600_000.0, 100.0, 1, 2),
                leaf(-4.0, 55.0),
                leaf(5.0, 45.0),
            ]),
            Tree::new(vec![
                split(FIRST_INDICATOR, 0.5, 100.0, 1, 2),
                leaf(1.0, 70.0),
                leaf(-2.0, 30.0),
            ]),
            Tree::new(vec![
                split(TESTING_COVERAGE, 50.0, 100.0, 1, 2),
                leaf(3.0, 50.0),
                leaf(-3.0, 50.0),
            ]),
        ],
        level_thresholds: vec![20.0, 40.0, 60.0, 80.0],
        class_anchors: None,
        infection_rate_feature: None,
    }
}

/// Three-class ensemble (low / medium / high)
pub fn multiclass_artifact() -> ModelArtifact {
    ModelArtifact {
        version: 1,
        model_name: "regional-risk-multiclass-fixture".to_string(),
        objective: Objective::Multiclass { n_classes: 3 },
        learning_rate: 0.5,
        base_score: vec![0.0, 0.0, 0.0],
        feature_schema: FeatureSchemaSpec { slots: schema_slots() },
        trees: vec![
            Tree::for_class(
                0,
                vec![split(INFECTION_RATE, 0.3, 100.0, 1, 2), leaf(2.0, 60.0), leaf(-1.5, 40.0)],
            ),
            Tree::for_class(
                1,
                vec![split(NEW_REPORTS, 60.0, 100.0, 1, 2), leaf(0.5, 70.0), leaf(1.0, 30.0)],
            ),
            Tree::for_class(
                2,
                vec![split(INFECTION_RATE, 0.3, 100.0, 1, 2), leaf(-1.5, 60.0), leaf(2.5, 40.0)],
            ),
            Tree::for_class(
                2,
                vec![split(TREATMENT_COVERAGE, 70.0, 100.0, 1, 2), leaf(1.0, 40.0), leaf(-0.5, 60.0)],
            ),
        ],
        level_thresholds: vec![20.0, 40.0, 60.0, 80.0],
        class_anchors: None,
        infection_rate_feature: Some("infection_rate".to_string()),
    }
}

pub fn handle_for(artifact: ModelArtifact) -> ModelHandle {
    ModelHandle::from_parts(EnsembleModel::from_artifact(artifact).unwrap(), None).unwrap()
}

pub fn engine() -> RiskEngine {
    RiskEngine::new(handle_for(regression_artifact()), ExplainConfig::default())
}

pub fn multiclass_engine() -> RiskEngine {
    RiskEngine::new(handle_for(multiclass_artifact()), ExplainConfig::default())
}

pub fn raw(value: Value) -> RawFeatures {
    value.as_object().cloned().expect("fixture input must be an object")
}

/// Level 2 region whose contributions carry both signs
pub fn northfield() -> RawFeatures {
    raw(json!({
        "survival_count": 1000,
        "infection_rate": 0.5,
        "treatment_coverage": 85.0,
        "new_reports": 50,
        "population": 500000
    }))
}

/// Region dominated by its infection-rate split
pub fn eastvale() -> RawFeatures {
    raw(json!({
        "survival_count": 1500,
        "infection_rate": 0.25,
        "treatment_coverage": 78.0,
        "new_reports": 120,
        "population": 800000
    }))
}

/// `n` valid regions spread across the risk range
pub fn region_rows(n: usize) -> Vec<RawFeatures> {
    (0..n)
        .map(|i| {
            let i = i as f64;
            raw(json!({
                "region": format!("Region {:02}", i as usize + 1),
                "infection_rate": 0.02 + 0.05 * i,
                "survival_count": 500.0 + 100.0 * i,
                "new_reports": 5.0 * i,
                "treatment_coverage": 95.0 - 3.0 * i,
                "population": 200_000.0 + 40_000.0 * i,
                "testing_coverage": if (i as usize) % 2 == 0 { 30.0 } else { 70.0 },
            }))
        })
        .collect()
}

pub fn region_table(n: usize) -> Table {
    Table::from_rows(region_rows(n))
}

pub fn write_json(dir: &Path, name: &str, value: &impl serde::Serialize) -> PathBuf {
    let path = dir.join(name);
    let file = std::fs::File::create(&path).unwrap();
    serde_json::to_writer_pretty(file, value).unwrap();
    path
}
