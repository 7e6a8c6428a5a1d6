use crate::error::{LedgerError, Result};
use crate::schema::{LedgerConfig, MovementKind, MovementRecord, UnknownKindPolicy};
use crate::utils::{parse_amount, parse_date, text_value};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::io::Read;

pub type RawRow = Map<String, Value>;

/// Row counts from one normalization pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizationSummary {
    pub input_rows: usize,
    pub kept: usize,
    pub dropped_invalid_amount: usize,
    pub dropped_invalid_date: usize,
    pub dropped_missing_kind: usize,
    pub dropped_unknown_kind: usize,
}

impl NormalizationSummary {
    pub fn dropped(&self) -> usize {
        self.dropped_invalid_amount
            + self.dropped_invalid_date
            + self.dropped_missing_kind
            + self.dropped_unknown_kind
    }
}

#[derive(Debug, Clone)]
pub struct NormalizedRows {
    pub records: Vec<MovementRecord>,
    pub summary: NormalizationSummary,
}

/// Why a single row was excluded. Never surfaced as an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowRejection {
    InvalidAmount,
    InvalidDate,
    MissingKind,
    UnknownKind(String),
}

pub struct Normalizer<'a> {
    config: &'a LedgerConfig,
}

impl<'a> Normalizer<'a> {
    pub fn new(config: &'a LedgerConfig) -> Self {
        Self { config }
    }

    /// Normalizes a JSON source, which must be an array of objects.
    pub fn normalize_value(&self, source: &Value) -> Result<NormalizedRows> {
        let items = source.as_array().ok_or_else(|| {
            LedgerError::InvalidInput(format!(
                "expected an array of row objects, got {}",
                json_type_name(source)
            ))
        })?;

        let rows = items
            .iter()
            .enumerate()
            .map(|(idx, item)| {
                item.as_object().cloned().ok_or_else(|| {
                    LedgerError::InvalidInput(format!(
                        "row #{} is {}, expected an object",
                        idx,
                        json_type_name(item)
                    ))
                })
            })
            .collect::<Result<Vec<RawRow>>>()?;

        self.normalize_rows(&rows)
    }

    pub fn normalize_rows(&self, rows: &[RawRow]) -> Result<NormalizedRows> {
        self.ensure_required_columns(rows)?;

        let mut summary = NormalizationSummary {
            input_rows: rows.len(),
            ..Default::default()
        };
        let mut records = Vec::with_capacity(rows.len());

        for (idx, row) in rows.iter().enumerate() {
            match self.normalize_row(row) {
                Ok(record) => records.push(record),
                Err(rejection) => {
                    debug!("Dropping row #{}: {:?}", idx, rejection);
                    match rejection {
                        RowRejection::InvalidAmount => summary.dropped_invalid_amount += 1,
                        RowRejection::InvalidDate => summary.dropped_invalid_date += 1,
                        RowRejection::MissingKind => summary.dropped_missing_kind += 1,
                        RowRejection::UnknownKind(_) => summary.dropped_unknown_kind += 1,
                    }
                }
            }
        }

        summary.kept = records.len();
        info!(
            "Normalized {} of {} rows ({} dropped)",
            summary.kept,
            summary.input_rows,
            summary.dropped()
        );
        if summary.kept == 0 && summary.input_rows > 0 {
            warn!("Every input row was dropped during normalization");
        }

        Ok(NormalizedRows { records, summary })
    }

    pub fn normalize_row(&self, row: &RawRow) -> std::result::Result<MovementRecord, RowRejection> {
        let fields = &self.config.fields;

        let amount = row
            .get(&fields.amount)
            .and_then(parse_amount)
            .ok_or(RowRejection::InvalidAmount)?;

        let posting_date = row
            .get(&fields.posting_date)
            .and_then(|value| parse_date(value, &self.config.date_formats))
            .ok_or(RowRejection::InvalidDate)?;

        let raw_kind = text_value(row.get(&fields.movement_kind)).ok_or(RowRejection::MissingKind)?;
        let movement_kind = MovementKind::parse(&raw_kind);
        if let MovementKind::Other(label) = &movement_kind {
            if self.config.unknown_kinds == UnknownKindPolicy::Drop {
                return Err(RowRejection::UnknownKind(label.clone()));
            }
        }

        let branch_value = match (&fields.legacy_branch, row.contains_key(&fields.branch)) {
            (Some(legacy), false) => row.get(legacy),
            _ => row.get(&fields.branch),
        };

        Ok(MovementRecord::new(movement_kind, amount, posting_date)
            .with_entity(self.descriptive(row.get(&fields.entity)))
            .with_group(self.descriptive(row.get(&fields.group)))
            .with_branch(self.descriptive(branch_value))
            .with_account_type(self.descriptive(row.get(&fields.account_type)))
            .with_account_code(self.descriptive(row.get(&fields.account_code))))
    }

    fn descriptive(&self, value: Option<&Value>) -> String {
        text_value(value).unwrap_or_else(|| self.config.sentinel.clone())
    }

    fn ensure_required_columns(&self, rows: &[RawRow]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }

        let fields = &self.config.fields;
        for column in [&fields.amount, &fields.posting_date, &fields.movement_kind] {
            if !rows.iter().any(|row| row.contains_key(column)) {
                return Err(LedgerError::MissingColumn(column.clone()));
            }
        }

        Ok(())
    }
}

/// Reads CSV rows keyed by the header line. Empty cells become null.
pub fn read_csv_rows<R: Read>(reader: R) -> Result<Vec<RawRow>> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = csv_reader.headers()?.clone();
    let mut rows = Vec::new();

    for result in csv_reader.records() {
        let record = result?;
        let row: RawRow = headers
            .iter()
            .zip(record.iter())
            .map(|(header, cell)| {
                let value = if cell.is_empty() {
                    Value::Null
                } else {
                    Value::String(cell.to_string())
                };
                (header.to_string(), value)
            })
            .collect();
        rows.push(row);
    }

    debug!("Read {} CSV rows with {} columns", rows.len(), headers.len());
    Ok(rows)
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
