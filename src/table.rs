use crate::error::{LedgerError, Result};
use serde_json::{Map, Value};

/// A rectangular report: a header plus one cell per header column in every row.
pub trait Table {
    fn header(&self) -> Vec<String>;

    fn cells(&self) -> Vec<Vec<Value>>;

    fn to_json_rows(&self) -> Vec<Map<String, Value>> {
        let header = self.header();
        self.cells()
            .into_iter()
            .map(|row| header.iter().cloned().zip(row).collect())
            .collect()
    }

    fn to_csv(&self) -> Result<String> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(self.header())?;
        for row in self.cells() {
            writer.write_record(row.iter().map(cell_text))?;
        }

        let bytes = writer
            .into_inner()
            .map_err(|e| LedgerError::IoError(e.into_error()))?;
        String::from_utf8(bytes).map_err(|e| LedgerError::InvalidInput(e.to_string()))
    }
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Array(items) => items.iter().map(cell_text).collect::<Vec<_>>().join(" / "),
        other => other.to_string(),
    }
}
