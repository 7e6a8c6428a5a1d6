use crate::schema::{CalendarMonth, Dimension, MovementKind, MovementRecord};
use log::debug;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// The caller-owned filter selection. Every dimension is an allow-list; an empty
/// set places no restriction on that dimension. Dimensions combine with AND.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct FilterSelection {
    #[schemars(description = "Allowed posting years.")]
    pub year: BTreeSet<i32>,

    #[schemars(description = "Allowed month names (Janeiro … Dezembro), matched case-insensitively.")]
    pub month_name: BTreeSet<String>,

    #[schemars(description = "Allowed entities (razão).")]
    pub entity: BTreeSet<String>,

    #[schemars(description = "Allowed groups.")]
    pub group: BTreeSet<String>,

    #[schemars(description = "Allowed branches (filial).")]
    pub branch: BTreeSet<String>,

    #[schemars(description = "Allowed movement kinds. Receita/Revenue and Despesa/Expense are equivalent.")]
    pub movement_kind: BTreeSet<String>,

    #[schemars(description = "Allowed account types.")]
    pub account_type: BTreeSet<String>,

    #[schemars(description = "Allowed account codes.")]
    pub account_code: BTreeSet<String>,
}

impl FilterSelection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.year.is_empty()
            && self.month_name.is_empty()
            && self.entity.is_empty()
            && self.group.is_empty()
            && self.branch.is_empty()
            && self.movement_kind.is_empty()
            && self.account_type.is_empty()
            && self.account_code.is_empty()
    }

    /// Returns a copy that only restricts the listed dimensions. `Period` has no
    /// selection of its own and is ignored.
    pub fn project(&self, dimensions: &[Dimension]) -> Self {
        let keep = |dimension: Dimension| dimensions.contains(&dimension);
        let take = |dimension: Dimension, values: &BTreeSet<String>| {
            if keep(dimension) {
                values.clone()
            } else {
                BTreeSet::new()
            }
        };

        Self {
            year: if keep(Dimension::Year) {
                self.year.clone()
            } else {
                BTreeSet::new()
            },
            month_name: take(Dimension::Month, &self.month_name),
            entity: take(Dimension::Entity, &self.entity),
            group: take(Dimension::Group, &self.group),
            branch: take(Dimension::Branch, &self.branch),
            movement_kind: take(Dimension::MovementKind, &self.movement_kind),
            account_type: take(Dimension::AccountType, &self.account_type),
            account_code: take(Dimension::AccountCode, &self.account_code),
        }
    }

    /// The reduced selection seen by the month-by-month expense breakdown: it
    /// needs every month side by side and restricts the kind on its own.
    pub fn expense_breakdown(&self) -> Self {
        self.project(&[
            Dimension::Year,
            Dimension::Entity,
            Dimension::Group,
            Dimension::Branch,
            Dimension::AccountCode,
        ])
    }

    pub fn with_years(mut self, years: impl IntoIterator<Item = i32>) -> Self {
        self.year.extend(years);
        self
    }

    pub fn with_months<S: Into<String>>(mut self, months: impl IntoIterator<Item = S>) -> Self {
        self.month_name.extend(months.into_iter().map(Into::into));
        self
    }

    pub fn with_entities<S: Into<String>>(mut self, entities: impl IntoIterator<Item = S>) -> Self {
        self.entity.extend(entities.into_iter().map(Into::into));
        self
    }

    pub fn with_groups<S: Into<String>>(mut self, groups: impl IntoIterator<Item = S>) -> Self {
        self.group.extend(groups.into_iter().map(Into::into));
        self
    }

    pub fn with_branches<S: Into<String>>(mut self, branches: impl IntoIterator<Item = S>) -> Self {
        self.branch.extend(branches.into_iter().map(Into::into));
        self
    }

    pub fn with_movement_kinds<S: Into<String>>(mut self, kinds: impl IntoIterator<Item = S>) -> Self {
        self.movement_kind.extend(kinds.into_iter().map(Into::into));
        self
    }

    pub fn with_account_types<S: Into<String>>(mut self, types: impl IntoIterator<Item = S>) -> Self {
        self.account_type.extend(types.into_iter().map(Into::into));
        self
    }

    pub fn with_account_codes<S: Into<String>>(mut self, codes: impl IntoIterator<Item = S>) -> Self {
        self.account_code.extend(codes.into_iter().map(Into::into));
        self
    }

    pub fn matches(&self, record: &MovementRecord) -> bool {
        allows(&self.year, &record.year)
            && self.allows_month(record.month)
            && allows(&self.entity, &record.entity)
            && allows(&self.group, &record.group)
            && allows(&self.branch, &record.branch)
            && self.allows_kind(&record.movement_kind)
            && allows(&self.account_type, &record.account_type)
            && allows(&self.account_code, &record.account_code)
    }

    fn allows_month(&self, month: CalendarMonth) -> bool {
        self.month_name.is_empty()
            || self
                .month_name
                .iter()
                .any(|name| CalendarMonth::from_name(name).is_ok_and(|m| m == month))
    }

    fn allows_kind(&self, kind: &MovementKind) -> bool {
        self.movement_kind.is_empty()
            || self
                .movement_kind
                .iter()
                .any(|label| MovementKind::parse(label) == *kind)
    }

    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(FilterSelection)
    }

    pub fn schema_as_json() -> Result<String, serde_json::Error> {
        let schema = Self::generate_json_schema();
        serde_json::to_string_pretty(&schema)
    }
}

fn allows<T: Ord>(allowed: &BTreeSet<T>, value: &T) -> bool {
    allowed.is_empty() || allowed.contains(value)
}

/// Returns owned copies of the records matching `selection`. The input is not
/// modified and no selection state is retained.
pub fn apply_filter(records: &[MovementRecord], selection: &FilterSelection) -> Vec<MovementRecord> {
    filter_refs(records, selection).into_iter().cloned().collect()
}

pub fn filter_refs<'a>(
    records: &'a [MovementRecord],
    selection: &FilterSelection,
) -> Vec<&'a MovementRecord> {
    if selection.is_empty() {
        return records.iter().collect();
    }

    let filtered: Vec<&MovementRecord> = records.iter().filter(|r| selection.matches(r)).collect();
    debug!(
        "Filter selection kept {} of {} records",
        filtered.len(),
        records.len()
    );
    filtered
}
