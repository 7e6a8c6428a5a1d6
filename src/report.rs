use crate::aggregation::{
    detail_table, dre_statement, expense_breakdown, mean_expense, monthly_totals, DreStatement,
    KindPivot, KindTotals, MeanTable, MonthlyTotals, TimePivot,
};
use crate::error::Result;
use crate::filter::{apply_filter, filter_refs, FilterSelection};
use crate::hierarchy::{build_hierarchy, Hierarchy};
use crate::ingestion::{read_csv_rows, NormalizationSummary, Normalizer};
use crate::schema::{CalendarMonth, LedgerConfig, MovementKind, MovementRecord, TimeAxis};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::io::Read;

/// An immutable, normalized snapshot of the ledger for one reporting session.
#[derive(Debug, Clone)]
pub struct Ledger {
    records: Vec<MovementRecord>,
    summary: NormalizationSummary,
}

impl Ledger {
    pub fn from_json(source: &Value, config: &LedgerConfig) -> Result<Self> {
        config.validate()?;
        let normalized = Normalizer::new(config).normalize_value(source)?;
        Ok(Self {
            records: normalized.records,
            summary: normalized.summary,
        })
    }

    pub fn from_json_str(json: &str, config: &LedgerConfig) -> Result<Self> {
        let source: Value = serde_json::from_str(json)?;
        Self::from_json(&source, config)
    }

    pub fn from_csv_reader<R: Read>(reader: R, config: &LedgerConfig) -> Result<Self> {
        config.validate()?;
        let rows = read_csv_rows(reader)?;
        let normalized = Normalizer::new(config).normalize_rows(&rows)?;
        Ok(Self {
            records: normalized.records,
            summary: normalized.summary,
        })
    }

    /// Wraps records that are already normalized.
    pub fn from_records(records: Vec<MovementRecord>) -> Self {
        let summary = NormalizationSummary {
            input_rows: records.len(),
            kept: records.len(),
            ..Default::default()
        };
        Self { records, summary }
    }

    pub fn records(&self) -> &[MovementRecord] {
        &self.records
    }

    pub fn summary(&self) -> &NormalizationSummary {
        &self.summary
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn filter(&self, selection: &FilterSelection) -> Vec<MovementRecord> {
        apply_filter(&self.records, selection)
    }

    /// Totals over the whole snapshot, ignoring any selection.
    pub fn totals(&self) -> Totals {
        Totals::from(KindTotals::from_records(&self.records))
    }

    /// Distinct values per dimension, for populating selectors.
    pub fn filter_options(&self) -> FilterOptions {
        let mut years = BTreeSet::new();
        let mut months = BTreeSet::new();
        let mut entities = BTreeSet::new();
        let mut groups = BTreeSet::new();
        let mut branches = BTreeSet::new();
        let mut kinds = BTreeSet::new();
        let mut account_types = BTreeSet::new();
        let mut account_codes = BTreeSet::new();

        for record in &self.records {
            years.insert(record.year);
            months.insert(record.month);
            entities.insert(record.entity.clone());
            groups.insert(record.group.clone());
            branches.insert(record.branch.clone());
            kinds.insert(record.movement_kind.clone());
            account_types.insert(record.account_type.clone());
            account_codes.insert(record.account_code.clone());
        }

        FilterOptions {
            years: years.into_iter().collect(),
            months: months.into_iter().collect(),
            entities: entities.into_iter().collect(),
            groups: groups.into_iter().collect(),
            branches: branches.into_iter().collect(),
            movement_kinds: kinds.into_iter().collect(),
            account_types: account_types.into_iter().collect(),
            account_codes: account_codes.into_iter().collect(),
        }
    }

    pub fn dashboard(&self, selection: &FilterSelection) -> Dashboard {
        self.dashboard_with_axis(selection, TimeAxis::Month)
    }

    /// Runs every report for `selection`. The expense breakdown sees only the
    /// reduced selection from [`FilterSelection::expense_breakdown`].
    pub fn dashboard_with_axis(&self, selection: &FilterSelection, axis: TimeAxis) -> Dashboard {
        let filtered = filter_refs(&self.records, selection);
        let breakdown_selection = selection.expense_breakdown();
        let breakdown_records = filter_refs(&self.records, &breakdown_selection);

        info!(
            "Building dashboard over {} of {} records",
            filtered.len(),
            self.records.len()
        );
        debug!("Expense breakdown sees {} records", breakdown_records.len());

        Dashboard {
            overall: self.totals(),
            filtered: Totals::from(KindTotals::from_records(filtered.iter().copied())),
            filtered_rows: filtered.len(),
            monthly_totals: monthly_totals(filtered.iter().copied()),
            detail: detail_table(filtered.iter().copied()),
            expense_breakdown: expense_breakdown(breakdown_records.iter().copied(), axis),
            mean_expense: mean_expense(filtered.iter().copied()),
            dre: dre_statement(filtered.iter().copied(), axis),
            hierarchy: build_hierarchy(filtered.iter().copied(), axis),
        }
    }
}

/// Headline revenue, expense and net result.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Totals {
    pub revenue: f64,
    pub expense: f64,
    pub result: f64,
}

impl From<KindTotals> for Totals {
    fn from(totals: KindTotals) -> Self {
        Self {
            revenue: totals.revenue,
            expense: totals.expense,
            result: totals.result(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FilterOptions {
    pub years: Vec<i32>,
    pub months: Vec<CalendarMonth>,
    pub entities: Vec<String>,
    pub groups: Vec<String>,
    pub branches: Vec<String>,
    pub movement_kinds: Vec<MovementKind>,
    pub account_types: Vec<String>,
    pub account_codes: Vec<String>,
}

/// Every report for one filter selection.
#[derive(Debug, Clone, Serialize)]
pub struct Dashboard {
    pub overall: Totals,
    pub filtered: Totals,
    pub filtered_rows: usize,
    pub monthly_totals: MonthlyTotals,
    pub detail: KindPivot,
    pub expense_breakdown: TimePivot,
    pub mean_expense: MeanTable,
    pub dre: DreStatement,
    /// `None` when nothing matches the selection.
    pub hierarchy: Option<Hierarchy>,
}

impl Dashboard {
    pub fn has_data(&self) -> bool {
        self.filtered_rows > 0
    }

    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_ledger() -> Ledger {
        let source = json!([
            {"razao": "A", "grupo": "G1", "filial": "B1", "movimento": "Receita", "valor": 100, "dt_lancamento": "2024-01-15", "pcontas": "3.1"},
            {"razao": "A", "grupo": "G1", "filial": "B1", "movimento": "Despesa", "valor": -40, "dt_lancamento": "2024-01-20", "pcontas": "4.1"},
            {"razao": "A", "grupo": "G2", "fornecedor": "B2", "movimento": "despesa ", "valor": "-25.5", "dt_lancamento": "2024-03-02", "pcontas": "4.1"},
            {"razao": "C", "grupo": "G9", "filial": "B7", "movimento": "RECEITA", "valor": 10, "dt_lancamento": "2023-12-31", "pcontas": "3.1"},
            {"razao": "C", "movimento": "Receita", "valor": 10, "dt_lancamento": "31-31-2023"}
        ]);
        Ledger::from_json(&source, &LedgerConfig::default()).unwrap()
    }

    #[test]
    fn test_ledger_normalization_summary() {
        let ledger = sample_ledger();
        assert_eq!(ledger.len(), 4);
        assert_eq!(ledger.summary().input_rows, 5);
        assert_eq!(ledger.summary().dropped_invalid_date, 1);
    }

    #[test]
    fn test_filter_options_sorted() {
        let options = sample_ledger().filter_options();
        assert_eq!(options.years, vec![2023, 2024]);
        let months: Vec<&str> = options.months.iter().map(|m| m.name()).collect();
        assert_eq!(months, vec!["Janeiro", "Março", "Dezembro"]);
        assert_eq!(options.branches, vec!["B1", "B2", "B7"]);
        assert_eq!(
            options.movement_kinds,
            vec![MovementKind::Revenue, MovementKind::Expense]
        );
    }

    #[test]
    fn test_dashboard_uses_full_and_partial_selections() {
        let ledger = sample_ledger();
        let selection = FilterSelection::new()
            .with_entities(["A"])
            .with_months(["Janeiro"])
            .with_movement_kinds(["Receita"]);

        let dashboard = ledger.dashboard(&selection);

        assert_eq!(dashboard.filtered_rows, 1);
        assert_eq!(dashboard.filtered.revenue, 100.0);
        assert_eq!(dashboard.filtered.expense, 0.0);
        assert_eq!(dashboard.overall.result, 44.5);

        // month and kind are not applied to the expense breakdown
        let columns: Vec<String> = dashboard
            .expense_breakdown
            .columns
            .iter()
            .map(|c| c.to_string())
            .collect();
        assert_eq!(columns, vec!["Janeiro", "Março"]);
        assert_eq!(dashboard.expense_breakdown.column_totals(), vec![-40.0, -25.5]);

        assert!(dashboard.mean_expense.rows.is_empty());
        let hierarchy = dashboard.hierarchy.as_ref().unwrap();
        assert_eq!(hierarchy.grand_total(), 100.0);
    }

    #[test]
    fn test_dashboard_empty_selection_state() {
        let ledger = sample_ledger();
        let selection = FilterSelection::new().with_years([1999]);

        let dashboard = ledger.dashboard(&selection);
        assert!(!dashboard.has_data());
        assert!(dashboard.hierarchy.is_none());
        assert!(dashboard.detail.rows.is_empty());
        assert!(dashboard.dre.rows.is_empty());
        assert!(dashboard.to_json().unwrap().contains("\"hierarchy\": null"));
    }

    #[test]
    fn test_from_csv_reader() {
        let data = "\
razao,grupo,filial,movimento,valor,dt_lancamento
A,G1,B1,Receita,100,2024-01-15
A,G1,B1,Despesa,-40,2024-01-20
";
        let ledger = Ledger::from_csv_reader(data.as_bytes(), &LedgerConfig::default()).unwrap();
        assert_eq!(ledger.totals().result, 60.0);
    }
}
