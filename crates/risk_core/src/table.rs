//! Tabular input and output for batch scoring
//!
//! Rows are kept as loosely typed JSON maps so arbitrary passthrough columns
//! survive a round trip. CSV cells are kept as their original text (empty
//! cells become null); numeric interpretation happens in the feature builder,
//! so codes such as `01001` are written back unchanged.

use crate::errors::{Result, RiskError};
use crate::features::RawFeatures;
use serde_json::Value;
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

/// Supported table formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableFormat {
    Csv,
    /// Array of row objects
    Json,
}

impl TableFormat {
    /// Format from a file extension
    pub fn from_path(path: &Path) -> Result<Self> {
        match path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .as_deref()
        {
            Some("csv") => Ok(Self::Csv),
            Some("json") => Ok(Self::Json),
            _ => Err(RiskError::Table(format!(
                "unsupported table format: {}",
                path.display()
            ))),
        }
    }

    pub const fn extension(&self) -> &str {
        match self {
            Self::Csv => "csv",
            Self::Json => "json",
        }
    }
}

/// Ordered columns plus one raw mapping per row
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<RawFeatures>,
}

impl Table {
    pub fn new(columns: Vec<String>, rows: Vec<RawFeatures>) -> Self {
        Self { columns, rows }
    }

    /// Build from rows alone; columns appear in first-seen order
    pub fn from_rows(rows: Vec<RawFeatures>) -> Self {
        let mut seen = HashSet::new();
        let mut columns = Vec::new();
        for row in &rows {
            for key in row.keys() {
                if seen.insert(key.clone()) {
                    columns.push(key.clone());
                }
            }
        }
        Self { columns, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Add a column name if it is not present yet
    pub fn push_column(&mut self, name: &str) {
        if !self.columns.iter().any(|c| c == name) {
            self.columns.push(name.to_string());
        }
    }

    /// Rename a column, keeping its position in the header and in every row
    pub fn rename_column(&mut self, from: &str, to: &str) {
        for column in self.columns.iter_mut().filter(|c| c.as_str() == from) {
            *column = to.to_string();
        }
        for row in &mut self.rows {
            if row.contains_key(from) {
                *row = std::mem::take(row)
                    .into_iter()
                    .map(|(key, value)| if key == from { (to.to_string(), value) } else { (key, value) })
                    .collect();
            }
        }
    }

    pub fn read_path(path: &Path) -> Result<Self> {
        let format = TableFormat::from_path(path)?;
        let reader = BufReader::new(File::open(path)?);
        match format {
            TableFormat::Csv => Self::read_csv(reader),
            TableFormat::Json => Self::read_json(reader),
        }
    }

    pub fn write_path(&self, path: &Path) -> Result<()> {
        let format = TableFormat::from_path(path)?;
        let mut writer = BufWriter::new(File::create(path)?);
        match format {
            TableFormat::Csv => self.write_csv(&mut writer)?,
            TableFormat::Json => self.write_json(&mut writer, true)?,
        }
        writer.flush()?;
        Ok(())
    }

    pub fn read_csv<R: Read>(reader: R) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(false)
            .from_reader(reader);

        let columns: Vec<String> = rdr
            .headers()
            .map_err(table_error)?
            .iter()
            .map(str::to_string)
            .collect();
        let mut seen = HashSet::new();
        if let Some(dup) = columns.iter().find(|c| !seen.insert(c.as_str())) {
            return Err(RiskError::Table(format!("duplicate column `{dup}`")));
        }

        let mut rows = Vec::new();
        for record in rdr.records() {
            let record = record.map_err(table_error)?;
            let row: RawFeatures = columns
                .iter()
                .zip(record.iter())
                .map(|(column, cell)| (column.clone(), parse_cell(cell)))
                .collect();
            rows.push(row);
        }

        Ok(Self { columns, rows })
    }

    /// Read an array of objects, or a single object as one row
    pub fn read_json<R: Read>(reader: R) -> Result<Self> {
        let value: Value = serde_json::from_reader(reader)?;
        let rows = match value {
            Value::Array(items) => items
                .into_iter()
                .enumerate()
                .map(|(i, item)| match item {
                    Value::Object(map) => Ok(map),
                    other => Err(RiskError::Table(format!(
                        "row {} is not an object: {other}",
                        i + 1
                    ))),
                })
                .collect::<Result<Vec<_>>>()?,
            Value::Object(map) => vec![map],
            other => {
                return Err(RiskError::Table(format!(
                    "expected an array of rows, got {other}"
                )))
            }
        };
        Ok(Self::from_rows(rows))
    }

    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut wtr = csv::Writer::from_writer(writer);
        wtr.write_record(&self.columns).map_err(table_error)?;
        for row in &self.rows {
            let record: Vec<String> = self
                .columns
                .iter()
                .map(|column| format_cell(row.get(column)))
                .collect();
            wtr.write_record(&record).map_err(table_error)?;
        }
        wtr.flush()?;
        Ok(())
    }

    pub fn write_json<W: Write>(&self, writer: W, pretty: bool) -> Result<()> {
        if pretty {
            serde_json::to_writer_pretty(writer, &self.rows)?;
        } else {
            serde_json::to_writer(writer, &self.rows)?;
        }
        Ok(())
    }
}

fn table_error(e: csv::Error) -> RiskError {
    RiskError::Table(e.to_string())
}

/// CSV cell as a value: blank is null, anything else stays text
fn parse_cell(cell: &str) -> Value {
    if cell.is_empty() {
        Value::Null
    } else {
        Value::String(cell.to_string())
    }
}

fn format_cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}
