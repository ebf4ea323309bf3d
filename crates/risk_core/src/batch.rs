//! Row-by-row scoring of a region table
//!
//! Rows are independent, so they are scored on the rayon pool when enabled.
//! Results are collected by row index: the output always has the same rows in
//! the same order as the input, and a failing row is recorded, never dropped.

use crate::config::BatchConfig;
use crate::engine::{PredictOptions, RiskEngine, RiskPrediction};
use crate::errors::Result;
use crate::features::RawFeatures;
use crate::predictor::LEVEL_DESCRIPTIONS;
use crate::table::Table;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{info, instrument, warn};

/// Columns appended to every output table
pub const RESULT_COLUMNS: [&str; 5] = ["risk_level", "risk_description", "risk_score", "confidence", "error"];
pub const CONTRIBUTIONS_COLUMN: &str = "feature_contributions";
pub const ATTENTION_COLUMN: &str = "attention_weights";

/// Result for one input row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RowOutcome {
    Scored(RiskPrediction),
    Failed { code: String, message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchRow {
    /// Zero-based position in the input table
    pub index: usize,
    pub region: String,
    pub outcome: RowOutcome,
}

impl BatchRow {
    pub fn prediction(&self) -> Option<&RiskPrediction> {
        match &self.outcome {
            RowOutcome::Scored(prediction) => Some(prediction),
            RowOutcome::Failed { .. } => None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.prediction().is_some()
    }
}

/// Region singled out in the summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionRisk {
    pub region: String,
    pub risk_level: u8,
    pub risk_score: f64,
}

/// Aggregate view of a batch run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Mean level over successful rows
    pub average_level: Option<f64>,
    /// `level_1` .. `level_5` counts
    pub level_distribution: BTreeMap<String, usize>,
    /// Levels 4 and 5
    pub high_risk: usize,
    /// Level 3
    pub medium_risk: usize,
    /// Levels 1 and 2
    pub low_risk: usize,
    pub highest_risk: Option<RegionRisk>,
    pub lowest_risk: Option<RegionRisk>,
}

impl BatchSummary {
    fn from_rows(rows: &[BatchRow]) -> Self {
        let scored: Vec<(&BatchRow, &RiskPrediction)> = rows
            .iter()
            .filter_map(|row| row.prediction().map(|p| (row, p)))
            .collect();

        let mut level_distribution: BTreeMap<String, usize> = (1..=LEVEL_DESCRIPTIONS.len())
            .map(|level| (format!("level_{level}"), 0))
            .collect();
        for (_, prediction) in &scored {
            *level_distribution
                .entry(format!("level_{}", prediction.risk_level))
                .or_default() += 1;
        }

        let count = |pred: fn(u8) -> bool| scored.iter().filter(|(_, p)| pred(p.risk_level)).count();

        let average_level = (!scored.is_empty()).then(|| {
            scored.iter().map(|(_, p)| f64::from(p.risk_level)).sum::<f64>() / scored.len() as f64
        });

        let by_risk = |a: &&(&BatchRow, &RiskPrediction), b: &&(&BatchRow, &RiskPrediction)| {
            a.1.risk_level
                .cmp(&b.1.risk_level)
                .then(a.1.risk_score.total_cmp(&b.1.risk_score))
                .then(b.0.index.cmp(&a.0.index))
        };
        let region_risk = |(row, p): &(&BatchRow, &RiskPrediction)| RegionRisk {
            region: row.region.clone(),
            risk_level: p.risk_level,
            risk_score: p.risk_score,
        };

        Self {
            total: rows.len(),
            succeeded: scored.len(),
            failed: rows.len() - scored.len(),
            average_level,
            level_distribution,
            high_risk: count(|level| level >= 4),
            medium_risk: count(|level| level == 3),
            low_risk: count(|level| level <= 2),
            highest_risk: scored.iter().max_by(by_risk).map(region_risk),
            lowest_risk: scored.iter().min_by(by_risk).map(region_risk),
        }
    }
}

/// Everything a batch run produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchOutcome {
    pub rows: Vec<BatchRow>,
    pub summary: BatchSummary,
}

impl BatchOutcome {
    /// Successful rows partitioned by level; all five levels are present
    pub fn group_by_level(&self) -> BTreeMap<u8, Vec<&BatchRow>> {
        let mut groups: BTreeMap<u8, Vec<&BatchRow>> =
            (1..=LEVEL_DESCRIPTIONS.len() as u8).map(|level| (level, Vec::new())).collect();
        for row in &self.rows {
            if let Some(prediction) = row.prediction() {
                groups.entry(prediction.risk_level).or_default().push(row);
            }
        }
        groups
    }

    pub fn failures(&self) -> impl Iterator<Item = &BatchRow> {
        self.rows.iter().filter(|row| !row.is_success())
    }
}

/// Applies a [`RiskEngine`] to every row of a table
#[derive(Debug, Clone)]
pub struct BatchPipeline {
    engine: RiskEngine,
    config: BatchConfig,
}

impl BatchPipeline {
    pub fn new(engine: RiskEngine, config: BatchConfig) -> Self {
        Self { engine, config }
    }

    pub fn engine(&self) -> &RiskEngine {
        &self.engine
    }

    fn options(&self) -> PredictOptions {
        PredictOptions {
            include_contributions: self.config.include_contributions,
            include_attention: self.config.include_attention,
        }
    }

    /// Score every row; failures are recorded against their row
    #[instrument(skip_all, fields(rows = table.len(), parallel = self.config.parallel))]
    pub fn run(&self, table: &Table) -> BatchOutcome {
        let options = self.options();
        let score = |(index, row): (usize, &RawFeatures)| self.score_row(index, row, options);

        let rows: Vec<BatchRow> = if self.config.parallel {
            table.rows.par_iter().enumerate().map(score).collect()
        } else {
            table.rows.iter().enumerate().map(score).collect()
        };

        let summary = BatchSummary::from_rows(&rows);
        info!(
            total = summary.total,
            succeeded = summary.succeeded,
            failed = summary.failed,
            "batch scoring complete"
        );
        BatchOutcome { rows, summary }
    }

    fn score_row(&self, index: usize, row: &RawFeatures, options: PredictOptions) -> BatchRow {
        let region = self.region_name(index, row);
        let outcome = match self.engine.predict(row, options) {
            Ok(prediction) => RowOutcome::Scored(prediction),
            Err(e) => {
                warn!(row = index + 1, region = %region, code = e.code(), "row failed: {e}");
                RowOutcome::Failed {
                    code: e.code().to_string(),
                    message: e.to_string(),
                }
            }
        };
        BatchRow {
            index,
            region,
            outcome,
        }
    }

    /// First non-empty id column, else the 1-based row number
    fn region_name(&self, index: usize, row: &RawFeatures) -> String {
        self.config
            .id_columns
            .iter()
            .find_map(|column| match row.get(column) {
                Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
                Some(Value::Number(n)) => Some(n.to_string()),
                _ => None,
            })
            .unwrap_or_else(|| format!("row-{}", index + 1))
    }

    /// Columns `augment` appends, in order
    fn appended_columns(&self) -> Vec<&'static str> {
        let mut columns = RESULT_COLUMNS.to_vec();
        if self.config.include_contributions {
            columns.push(CONTRIBUTIONS_COLUMN);
        }
        if self.config.include_attention {
            columns.push(ATTENTION_COLUMN);
        }
        columns
    }

    /// Input table with result columns appended, one output row per input row
    ///
    /// An input column that shares a name with a result column is kept under
    /// `input_<name>`.
    pub fn augment(&self, table: &Table, outcome: &BatchOutcome) -> Table {
        let appended = self.appended_columns();
        let mut output = table.clone();
        for column in &appended {
            if !table.columns.iter().any(|c| c == column) {
                continue;
            }
            let mut renamed = format!("input_{column}");
            while output.columns.contains(&renamed) {
                renamed.insert_str(0, "input_");
            }
            warn!(column = %column, renamed = %renamed, "input column shares a result column name");
            output.rename_column(column, &renamed);
        }
        for column in &appended {
            output.push_column(column);
        }

        for (row, result) in output.rows.iter_mut().zip(&outcome.rows) {
            let cells = match &result.outcome {
                RowOutcome::Scored(p) => [
                    Value::from(p.risk_level),
                    Value::from(p.risk_description.clone()),
                    Value::from(p.risk_score),
                    Value::from(p.confidence),
                    Value::Null,
                ],
                RowOutcome::Failed { code, message } => [
                    Value::Null,
                    Value::Null,
                    Value::Null,
                    Value::Null,
                    Value::from(format!("{code}: {message}")),
                ],
            };
            for (column, cell) in RESULT_COLUMNS.iter().zip(cells) {
                row.insert(column.to_string(), cell);
            }

            let prediction = result.prediction();
            if self.config.include_contributions {
                let cell = json_cell(prediction.and_then(|p| p.feature_contributions.as_ref()));
                row.insert(CONTRIBUTIONS_COLUMN.to_string(), cell);
            }
            if self.config.include_attention {
                let cell = json_cell(prediction.and_then(|p| p.attention_weights.as_ref()));
                row.insert(ATTENTION_COLUMN.to_string(), cell);
            }
        }
        output
    }

    /// Read a table, score it and write the augmented table
    pub fn run_path(&self, input: &Path, output: &Path) -> Result<BatchOutcome> {
        let table = Table::read_path(input)?;
        let outcome = self.run(&table);
        self.augment(&table, &outcome).write_path(output)?;
        info!(input = %input.display(), output = %output.display(), "batch results written");
        Ok(outcome)
    }
}

/// Explanation serialized into a single string cell
fn json_cell<T: Serialize>(value: Option<&T>) -> Value {
    value
        .and_then(|v| serde_json::to_string(v).ok())
        .map(Value::String)
        .unwrap_or(Value::Null)
}
