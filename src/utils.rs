use crate::error::{LedgerError, Result};
use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime};
use serde_json::Value;

/// Month names used for every month-labelled column, indexed by `month - 1`.
pub const MONTH_NAMES: [&str; 12] = [
    "Janeiro",
    "Fevereiro",
    "Março",
    "Abril",
    "Maio",
    "Junho",
    "Julho",
    "Agosto",
    "Setembro",
    "Outubro",
    "Novembro",
    "Dezembro",
];

pub fn month_name(month: u32) -> Option<&'static str> {
    month
        .checked_sub(1)
        .and_then(|idx| MONTH_NAMES.get(idx as usize))
        .copied()
}

/// Case-insensitive reverse lookup of [`MONTH_NAMES`].
pub fn month_number(name: &str) -> Option<u32> {
    let wanted = name.trim().to_lowercase();
    MONTH_NAMES
        .iter()
        .position(|m| m.to_lowercase() == wanted)
        .map(|idx| idx as u32 + 1)
}

/// Trims and capitalizes: first character upper case, the rest lower case.
pub fn capitalize(text: &str) -> String {
    let mut chars = text.trim().chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}

/// Reads a descriptive field as text. Null, missing and blank values yield `None`.
pub fn text_value(value: Option<&Value>) -> Option<String> {
    let text = match value? {
        Value::Null => return None,
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Array(_) | Value::Object(_) => return None,
    };

    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Coerces a JSON number or numeric string into a finite amount.
pub fn parse_amount(value: &Value) -> Option<f64> {
    let amount = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };

    amount.is_finite().then_some(amount)
}

/// Parses a posting date. Plain dates and RFC 3339 timestamps are always
/// accepted; `formats` are tried afterwards as datetime, date and offset
/// datetime patterns in that order. Time components are discarded.
pub fn parse_date(value: &Value, formats: &[String]) -> Option<NaiveDate> {
    let text = value.as_str()?.trim();
    if text.is_empty() {
        return None;
    }

    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return Some(date);
    }
    if let Ok(datetime) = DateTime::parse_from_rfc3339(text) {
        return Some(datetime.date_naive());
    }

    for format in formats {
        if let Ok(datetime) = NaiveDateTime::parse_from_str(text, format) {
            return Some(datetime.date());
        }
        if let Ok(date) = NaiveDate::parse_from_str(text, format) {
            return Some(date);
        }
        if let Ok(datetime) = DateTime::parse_from_str(text, format) {
            return Some(datetime.date_naive());
        }
    }

    None
}

/// Parses a period string in the format "YYYY-MM" into `(year, month)`.
pub fn parse_period_string(period: &str) -> Result<(i32, u32)> {
    let start_str = format!("{}-01", period.trim());
    let start_date = NaiveDate::parse_from_str(&start_str, "%Y-%m-%d")
        .map_err(|_| LedgerError::InvalidPeriod(period.to_string()))?;

    Ok((start_date.year(), start_date.month()))
}
