use proptest::prelude::*;

mod common;

use common::*;
use regional_risk_core::features::{build_feature_vector, DEFAULT_OPTIONAL_FIELDS};
use regional_risk_core::predictor::risk_level;
use regional_risk_core::{PredictOptions, RawFeatures, SUM_TOLERANCE};
use serde_json::json;

// Property-based checks of the prediction invariants over the fixture model

fn arbitrary_region() -> impl Strategy<Value = RawFeatures> {
    (
        0.0f64..=2.0,          // infection rate
        0u32..=20_000,         // survival count
        0u32..=1_000,          // new reports
        0.0f64..=100.0,        // treatment coverage
        0.0f64..=100.0,        // testing coverage
        0u32..=5_000_000,      // population
        prop::option::of(-5.0f64..5.0),
    )
        .prop_map(|(rate, survival, reports, treatment, testing, population, indicator)| {
            let mut input = raw(json!({
                "infection_rate": rate,
                "survival_count": survival,
                "new_reports": reports,
                "treatment_coverage": treatment,
                "testing_coverage": testing,
                "population": population,
            }));
            if let Some(value) = indicator {
                input.insert("indicator_001".into(), json!(value));
            }
            input
        })
}

proptest! {
    #[test]
    fn levels_are_monotonic(a in -1_000.0f64..1_000.0, b in -1_000.0f64..1_000.0) {
        let thresholds = [20.0, 40.0, 60.0, 80.0];
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        let (l1, l2) = (risk_level(lo, &thresholds), risk_level(hi, &thresholds));
        prop_assert!(l1 <= l2);
        prop_assert!((1..=5).contains(&l1) && (1..=5).contains(&l2));
    }

    #[test]
    fn contributions_sum_to_prediction(input in arbitrary_region()) {
        for engine in [engine(), multiclass_engine()] {
            let explained = engine.assess(&input, PredictOptions::full()).unwrap();
            let breakdown = explained.contributions.unwrap();
            let residual = breakdown.base_value + breakdown.contribution_sum() - breakdown.prediction;
            prop_assert!(residual.abs() <= SUM_TOLERANCE * breakdown.prediction.abs().max(1.0));
        }
    }

    #[test]
    fn attention_is_a_distribution(input in arbitrary_region()) {
        for engine in [engine(), multiclass_engine()] {
            let prediction = engine.predict(&input, PredictOptions::full()).unwrap();
            let attention = prediction.attention_weights.unwrap();
            prop_assert!(attention.feature_attention.iter().all(|w| *w >= 0.0));
            prop_assert!((attention.weight_sum() - 1.0).abs() < 1e-9);
            prop_assert!(attention.top_attended_features.len() <= engine.explain_config().top_k);
            prop_assert!(attention
                .top_attended_features
                .windows(2)
                .all(|w| w[0].weight >= w[1].weight));
        }
    }

    #[test]
    fn predictions_are_deterministic(input in arbitrary_region()) {
        let engine = engine();
        let first = engine.predict(&input, PredictOptions::full()).unwrap();
        let second = engine.predict(&input, PredictOptions::full()).unwrap();
        prop_assert_eq!(first.risk_score.to_bits(), second.risk_score.to_bits());
        prop_assert_eq!(first, second);
    }

    #[test]
    fn confidence_stays_in_unit_interval(input in arbitrary_region()) {
        for engine in [engine(), multiclass_engine()] {
            let prediction = engine.predict(&input, PredictOptions::default()).unwrap();
            prop_assert!((0.0..=1.0).contains(&prediction.confidence));
        }
    }
}

#[test]
fn required_fields_only_uses_documented_defaults() {
    let engine = engine();
    let input = raw(json!({"infection_rate": 0.1, "survival_count": 10, "new_reports": 0}));
    let vector = build_feature_vector(engine.handle().schema(), &input).unwrap();

    assert_eq!(vector.len(), SCHEMA_LEN);
    assert_eq!(vector.defaulted().len(), SCHEMA_LEN - 3);
    for (name, default) in DEFAULT_OPTIONAL_FIELDS {
        assert_eq!(vector.get(name), Some(default), "{name}");
    }
    assert!(vector.values().iter().all(|v| v.is_finite()));
}

#[test]
fn nan_like_optional_inputs_never_raise() {
    let engine = engine();
    let input = raw(json!({
        "infection_rate": 0.4,
        "survival_count": 900,
        "new_reports": 12,
        "treatment_coverage": "NaN",
        "population": null,
        "gdp_per_capita": "n/a",
        "healthcare_facilities": [1, 2],
        "education_level": {"years": 9},
    }));
    let prediction = engine.predict(&input, PredictOptions::full()).unwrap();
    assert!(prediction.risk_score.is_finite());
}
