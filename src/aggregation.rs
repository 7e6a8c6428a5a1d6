//! Grouped sums, kind and time pivots, means and the DRE statement.
//!
//! Every function takes any iterator of record references, so callers can pass
//! a full snapshot (`&[MovementRecord]`) or the output of
//! [`filter_refs`](crate::filter::filter_refs) without copying.

use crate::schema::{Dimension, KeyValue, MovementKind, MovementRecord, PeriodKey, TimeAxis};
use crate::table::Table;
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// Keys of the detail table.
pub const DETAIL_DIMENSIONS: [Dimension; 7] = [
    Dimension::Entity,
    Dimension::Group,
    Dimension::Branch,
    Dimension::Year,
    Dimension::Month,
    Dimension::AccountType,
    Dimension::AccountCode,
];

/// Keys of the expense breakdown and mean-expense tables.
pub const ACCOUNT_DIMENSIONS: [Dimension; 5] = [
    Dimension::Entity,
    Dimension::Group,
    Dimension::Branch,
    Dimension::AccountType,
    Dimension::AccountCode,
];

pub const REVENUE_COLUMN: &str = "Revenue";
pub const EXPENSE_COLUMN: &str = "Expense";
pub const RESULT_COLUMN: &str = "Result";
pub const TOTAL_COLUMN: &str = "TOTAL";

/// Per-kind sums for one slice of the ledger. Revenue and expense are always
/// present; other kinds only when they occur.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KindTotals {
    pub revenue: f64,
    pub expense: f64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub other: BTreeMap<String, f64>,
}

impl KindTotals {
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a MovementRecord>) -> Self {
        let mut totals = Self::default();
        for record in records {
            totals.add(&record.movement_kind, record.amount);
        }
        totals
    }

    pub fn add(&mut self, kind: &MovementKind, amount: f64) {
        match kind {
            MovementKind::Revenue => self.revenue += amount,
            MovementKind::Expense => self.expense += amount,
            MovementKind::Other(label) => *self.other.entry(label.clone()).or_insert(0.0) += amount,
        }
    }

    pub fn get(&self, kind: &MovementKind) -> f64 {
        match kind {
            MovementKind::Revenue => self.revenue,
            MovementKind::Expense => self.expense,
            MovementKind::Other(label) => self.other.get(label).copied().unwrap_or(0.0),
        }
    }

    /// Net result. Kinds other than revenue and expense never contribute.
    pub fn result(&self) -> f64 {
        self.revenue + self.expense
    }
}

/// Sums `amount` per distinct key tuple. Keys come back in ascending order.
pub fn group_sum<'a>(
    records: impl IntoIterator<Item = &'a MovementRecord>,
    dimensions: &[Dimension],
) -> BTreeMap<Vec<KeyValue>, f64> {
    let mut groups = BTreeMap::new();
    for record in records {
        *groups.entry(key_for(record, dimensions)).or_insert(0.0) += record.amount;
    }
    groups
}

fn key_for(record: &MovementRecord, dimensions: &[Dimension]) -> Vec<KeyValue> {
    dimensions.iter().map(|d| d.key_of(record)).collect()
}

fn key_columns(dimensions: &[Dimension]) -> Vec<String> {
    dimensions.iter().map(|d| d.column_name().to_string()).collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KindPivotRow {
    pub key: Vec<KeyValue>,
    pub totals: KindTotals,
    pub result: f64,
}

/// Sums grouped by `dimensions` with the movement kind spread into columns.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KindPivot {
    pub dimensions: Vec<Dimension>,
    pub rows: Vec<KindPivotRow>,
}

impl KindPivot {
    /// Labels of the non revenue/expense kinds present in any row.
    pub fn other_kinds(&self) -> BTreeSet<String> {
        self.rows
            .iter()
            .flat_map(|row| row.totals.other.keys().cloned())
            .collect()
    }

    pub fn totals(&self) -> KindTotals {
        let mut totals = KindTotals::default();
        for row in &self.rows {
            totals.revenue += row.totals.revenue;
            totals.expense += row.totals.expense;
            for (label, amount) in &row.totals.other {
                *totals.other.entry(label.clone()).or_insert(0.0) += amount;
            }
        }
        totals
    }
}

impl Table for KindPivot {
    fn header(&self) -> Vec<String> {
        let mut header = key_columns(&self.dimensions);
        header.push(REVENUE_COLUMN.to_string());
        header.push(EXPENSE_COLUMN.to_string());
        header.extend(self.other_kinds());
        header.push(RESULT_COLUMN.to_string());
        header
    }

    fn cells(&self) -> Vec<Vec<Value>> {
        let others = self.other_kinds();
        self.rows
            .iter()
            .map(|row| {
                let mut cells: Vec<Value> = row.key.iter().map(KeyValue::to_json).collect();
                cells.push(Value::from(row.totals.revenue));
                cells.push(Value::from(row.totals.expense));
                for label in &others {
                    let amount = row.totals.other.get(label).copied().unwrap_or(0.0);
                    cells.push(Value::from(amount));
                }
                cells.push(Value::from(row.result));
                cells
            })
            .collect()
    }
}

/// Groups by `dimensions` and pivots the movement kind into columns. Missing
/// revenue or expense cells are zero, never absent.
pub fn pivot_by_kind<'a>(
    records: impl IntoIterator<Item = &'a MovementRecord>,
    dimensions: &[Dimension],
) -> KindPivot {
    let mut groups: BTreeMap<Vec<KeyValue>, KindTotals> = BTreeMap::new();
    for record in records {
        groups
            .entry(key_for(record, dimensions))
            .or_default()
            .add(&record.movement_kind, record.amount);
    }

    let rows = groups
        .into_iter()
        .map(|(key, totals)| KindPivotRow {
            result: totals.result(),
            key,
            totals,
        })
        .collect();

    KindPivot {
        dimensions: dimensions.to_vec(),
        rows,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimePivotRow {
    pub key: Vec<KeyValue>,
    pub values: Vec<f64>,
    pub total: f64,
}

/// Sums grouped by `dimensions` with one column per month (or period) present.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimePivot {
    pub dimensions: Vec<Dimension>,
    pub axis: TimeAxis,
    pub columns: Vec<KeyValue>,
    pub rows: Vec<TimePivotRow>,
}

impl TimePivot {
    pub fn column_totals(&self) -> Vec<f64> {
        let mut totals = vec![0.0; self.columns.len()];
        for row in &self.rows {
            for (total, value) in totals.iter_mut().zip(&row.values) {
                *total += value;
            }
        }
        totals
    }
}

impl Table for TimePivot {
    fn header(&self) -> Vec<String> {
        let mut header = key_columns(&self.dimensions);
        header.extend(self.columns.iter().map(|c| c.to_string()));
        header.push(TOTAL_COLUMN.to_string());
        header
    }

    fn cells(&self) -> Vec<Vec<Value>> {
        self.rows
            .iter()
            .map(|row| {
                let mut cells: Vec<Value> = row.key.iter().map(KeyValue::to_json).collect();
                cells.extend(row.values.iter().map(|v| Value::from(*v)));
                cells.push(Value::from(row.total));
                cells
            })
            .collect()
    }
}

/// Time columns present in `records`, in chronological order.
pub fn present_columns<'a>(
    records: impl IntoIterator<Item = &'a MovementRecord>,
    axis: TimeAxis,
) -> Vec<KeyValue> {
    let dimension = axis.dimension();
    records
        .into_iter()
        .map(|r| dimension.key_of(r))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Sums `amount` into a dense row over `columns`, which must be sorted.
pub(crate) fn sum_by_column<'a>(
    records: impl IntoIterator<Item = &'a MovementRecord>,
    columns: &[KeyValue],
    axis: TimeAxis,
) -> Vec<f64> {
    let dimension = axis.dimension();
    let mut values = vec![0.0; columns.len()];
    for record in records {
        if let Ok(idx) = columns.binary_search(&dimension.key_of(record)) {
            values[idx] += record.amount;
        }
    }
    values
}

pub fn pivot_by_time<'a>(
    records: impl IntoIterator<Item = &'a MovementRecord>,
    dimensions: &[Dimension],
    axis: TimeAxis,
) -> TimePivot {
    let records: Vec<&MovementRecord> = records.into_iter().collect();
    let columns = present_columns(records.iter().copied(), axis);

    let mut groups: BTreeMap<Vec<KeyValue>, Vec<&MovementRecord>> = BTreeMap::new();
    for record in records.iter().copied() {
        groups.entry(key_for(record, dimensions)).or_default().push(record);
    }

    let rows = groups
        .into_iter()
        .map(|(key, members)| {
            let values = sum_by_column(members, &columns, axis);
            TimePivotRow {
                total: values.iter().sum(),
                key,
                values,
            }
        })
        .collect();

    TimePivot {
        dimensions: dimensions.to_vec(),
        axis,
        columns,
        rows,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MeanRow {
    pub key: Vec<KeyValue>,
    pub mean: f64,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MeanTable {
    pub dimensions: Vec<Dimension>,
    pub rows: Vec<MeanRow>,
}

impl Table for MeanTable {
    fn header(&self) -> Vec<String> {
        let mut header = key_columns(&self.dimensions);
        header.push("mean".to_string());
        header.push("count".to_string());
        header
    }

    fn cells(&self) -> Vec<Vec<Value>> {
        self.rows
            .iter()
            .map(|row| {
                let mut cells: Vec<Value> = row.key.iter().map(KeyValue::to_json).collect();
                cells.push(Value::from(row.mean));
                cells.push(Value::from(row.count));
                cells
            })
            .collect()
    }
}

/// Mean of `amount` per key tuple, without any pivot.
pub fn group_mean<'a>(
    records: impl IntoIterator<Item = &'a MovementRecord>,
    dimensions: &[Dimension],
) -> MeanTable {
    let mut groups: BTreeMap<Vec<KeyValue>, (f64, usize)> = BTreeMap::new();
    for record in records {
        let entry = groups.entry(key_for(record, dimensions)).or_insert((0.0, 0));
        entry.0 += record.amount;
        entry.1 += 1;
    }

    let rows = groups
        .into_iter()
        .map(|(key, (sum, count))| MeanRow {
            key,
            mean: sum / count as f64,
            count,
        })
        .collect();

    MeanTable {
        dimensions: dimensions.to_vec(),
        rows,
    }
}

/// A line of the DRE statement.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum DreLine {
    Kind(MovementKind),
    Result,
}

impl DreLine {
    pub fn label(&self) -> &str {
        match self {
            DreLine::Kind(kind) => kind.label(),
            DreLine::Result => RESULT_COLUMN,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DreRow {
    pub line: DreLine,
    pub values: Vec<f64>,
    pub total: f64,
}

/// Profit and loss statement: one row per movement kind plus a synthesized
/// `Result` row, one column per month present.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DreStatement {
    pub axis: TimeAxis,
    pub columns: Vec<KeyValue>,
    pub rows: Vec<DreRow>,
}

impl DreStatement {
    pub fn row(&self, line: &DreLine) -> Option<&DreRow> {
        self.rows.iter().find(|r| &r.line == line)
    }
}

impl Table for DreStatement {
    fn header(&self) -> Vec<String> {
        let mut header = vec![Dimension::MovementKind.column_name().to_string()];
        header.extend(self.columns.iter().map(|c| c.to_string()));
        header.push(TOTAL_COLUMN.to_string());
        header
    }

    fn cells(&self) -> Vec<Vec<Value>> {
        self.rows
            .iter()
            .map(|row| {
                let mut cells = vec![Value::String(row.line.label().to_string())];
                cells.extend(row.values.iter().map(|v| Value::from(*v)));
                cells.push(Value::from(row.total));
                cells
            })
            .collect()
    }
}

/// Builds the DRE. Revenue and expense rows are zero-filled when absent; the
/// `Result` row is their column-wise sum. An empty input yields no rows.
pub fn dre_statement<'a>(
    records: impl IntoIterator<Item = &'a MovementRecord>,
    axis: TimeAxis,
) -> DreStatement {
    let records: Vec<&MovementRecord> = records.into_iter().collect();
    if records.is_empty() {
        return DreStatement {
            axis,
            columns: Vec::new(),
            rows: Vec::new(),
        };
    }

    let columns = present_columns(records.iter().copied(), axis);

    let mut by_kind: BTreeMap<MovementKind, Vec<&MovementRecord>> = BTreeMap::new();
    by_kind.entry(MovementKind::Revenue).or_default();
    by_kind.entry(MovementKind::Expense).or_default();
    for record in records.iter().copied() {
        by_kind
            .entry(record.movement_kind.clone())
            .or_default()
            .push(record);
    }

    let mut rows: Vec<DreRow> = by_kind
        .into_iter()
        .map(|(kind, members)| {
            let values = sum_by_column(members, &columns, axis);
            DreRow {
                line: DreLine::Kind(kind),
                total: values.iter().sum(),
                values,
            }
        })
        .collect();

    let result_values: Vec<f64> = {
        let revenue = &rows[0].values;
        let expense = &rows[1].values;
        revenue.iter().zip(expense).map(|(r, e)| r + e).collect()
    };
    rows.push(DreRow {
        line: DreLine::Result,
        total: result_values.iter().sum(),
        values: result_values,
    });

    DreStatement {
        axis,
        columns,
        rows,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyTotalRow {
    pub period: PeriodKey,
    pub revenue: f64,
    pub expense: f64,
    pub result: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MonthlyTotals {
    pub rows: Vec<MonthlyTotalRow>,
}

impl MonthlyTotals {
    pub fn get(&self, period: &PeriodKey) -> Option<&MonthlyTotalRow> {
        self.rows.iter().find(|r| &r.period == period)
    }
}

impl Table for MonthlyTotals {
    fn header(&self) -> Vec<String> {
        vec![
            Dimension::Period.column_name().to_string(),
            REVENUE_COLUMN.to_string(),
            EXPENSE_COLUMN.to_string(),
            RESULT_COLUMN.to_string(),
        ]
    }

    fn cells(&self) -> Vec<Vec<Value>> {
        self.rows
            .iter()
            .map(|row| {
                vec![
                    Value::String(row.period.to_string()),
                    Value::from(row.revenue),
                    Value::from(row.expense),
                    Value::from(row.result),
                ]
            })
            .collect()
    }
}

/// Revenue, expense and result per `YYYY-MM` period, chronologically.
pub fn monthly_totals<'a>(records: impl IntoIterator<Item = &'a MovementRecord>) -> MonthlyTotals {
    let mut periods: BTreeMap<PeriodKey, KindTotals> = BTreeMap::new();
    for record in records {
        periods
            .entry(record.period_key)
            .or_default()
            .add(&record.movement_kind, record.amount);
    }

    let rows = periods
        .into_iter()
        .map(|(period, totals)| MonthlyTotalRow {
            period,
            revenue: totals.revenue,
            expense: totals.expense,
            result: totals.result(),
        })
        .collect();

    MonthlyTotals { rows }
}

pub fn detail_table<'a>(records: impl IntoIterator<Item = &'a MovementRecord>) -> KindPivot {
    pivot_by_kind(records, &DETAIL_DIMENSIONS)
}

/// Expense records only, one column per month present.
pub fn expense_breakdown<'a>(
    records: impl IntoIterator<Item = &'a MovementRecord>,
    axis: TimeAxis,
) -> TimePivot {
    let expenses = records
        .into_iter()
        .filter(|r| r.movement_kind == MovementKind::Expense);
    let pivot = pivot_by_time(expenses, &ACCOUNT_DIMENSIONS, axis);
    debug!(
        "Expense breakdown: {} rows over {} columns",
        pivot.rows.len(),
        pivot.columns.len()
    );
    pivot
}

/// Mean expense amount per account key.
pub fn mean_expense<'a>(records: impl IntoIterator<Item = &'a MovementRecord>) -> MeanTable {
    let expenses = records
        .into_iter()
        .filter(|r| r.movement_kind == MovementKind::Expense);
    group_mean(expenses, &ACCOUNT_DIMENSIONS)
}
