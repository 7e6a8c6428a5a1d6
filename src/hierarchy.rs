//! Drill-down rows over entity → group → branch → movement kind.
//!
//! The output is flat: each row carries its `path` (ancestor labels plus its own)
//! and the presentation layer rebuilds the tree from it. Rows are emitted depth
//! first, children in ascending order, so a parent always precedes its subtree.
//!
//! Entity, group and branch rows hold the net result (revenue + expense) of
//! their slice. Movement-kind rows hold the raw sum of that kind.

use crate::aggregation::{present_columns, sum_by_column, TOTAL_COLUMN};
use crate::schema::{Dimension, KeyValue, MovementRecord, TimeAxis};
use crate::table::Table;
use log::{debug, info};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HierarchyLevel {
    Entity,
    Group,
    Branch,
    MovementKind,
}

impl HierarchyLevel {
    pub const ALL: [HierarchyLevel; 4] = [
        HierarchyLevel::Entity,
        HierarchyLevel::Group,
        HierarchyLevel::Branch,
        HierarchyLevel::MovementKind,
    ];

    pub fn dimension(&self) -> Dimension {
        match self {
            HierarchyLevel::Entity => Dimension::Entity,
            HierarchyLevel::Group => Dimension::Group,
            HierarchyLevel::Branch => Dimension::Branch,
            HierarchyLevel::MovementKind => Dimension::MovementKind,
        }
    }

    /// Length of the `path` of rows at this level.
    pub fn depth(&self) -> usize {
        *self as usize + 1
    }

    pub fn is_detail(&self) -> bool {
        matches!(self, HierarchyLevel::MovementKind)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HierarchyRow {
    pub path: Vec<String>,
    pub level: HierarchyLevel,
    pub values: Vec<f64>,
    pub total: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Hierarchy {
    pub axis: TimeAxis,
    pub columns: Vec<KeyValue>,
    pub rows: Vec<HierarchyRow>,
}

impl Hierarchy {
    pub fn find(&self, path: &[&str]) -> Option<&HierarchyRow> {
        self.rows
            .iter()
            .find(|row| row.path.len() == path.len() && row.path.iter().zip(path).all(|(a, b)| a == b))
    }

    /// Direct children of the row at `path`; an empty path yields the entities.
    pub fn children<'h>(&'h self, path: &'h [&'h str]) -> impl Iterator<Item = &'h HierarchyRow> + 'h {
        self.rows.iter().filter(move |row| {
            row.path.len() == path.len() + 1 && row.path.iter().zip(path).all(|(a, b)| a == b)
        })
    }

    pub fn rows_at(&self, level: HierarchyLevel) -> impl Iterator<Item = &HierarchyRow> {
        self.rows.iter().filter(move |row| row.level == level)
    }

    /// Net result over the whole filtered ledger.
    pub fn grand_total(&self) -> f64 {
        self.rows_at(HierarchyLevel::Entity).map(|row| row.total).sum()
    }
}

impl Table for Hierarchy {
    fn header(&self) -> Vec<String> {
        let mut header = vec!["path".to_string()];
        header.extend(self.columns.iter().map(|c| c.to_string()));
        header.push(TOTAL_COLUMN.to_string());
        header
    }

    fn cells(&self) -> Vec<Vec<Value>> {
        self.rows
            .iter()
            .map(|row| {
                let path = row.path.iter().cloned().map(Value::String).collect();
                let mut cells = vec![Value::Array(path)];
                cells.extend(row.values.iter().map(|v| Value::from(*v)));
                cells.push(Value::from(row.total));
                cells
            })
            .collect()
    }
}

/// Builds the drill-down rows. Returns `None` when there is no data for the
/// current filters instead of an empty tree.
pub fn build_hierarchy<'a>(
    records: impl IntoIterator<Item = &'a MovementRecord>,
    axis: TimeAxis,
) -> Option<Hierarchy> {
    let records: Vec<&MovementRecord> = records.into_iter().collect();
    if records.is_empty() {
        info!("No data for current filters; hierarchy not built");
        return None;
    }

    let columns = present_columns(records.iter().copied(), axis);
    let mut builder = HierarchyBuilder {
        axis,
        columns: &columns,
        rows: Vec::new(),
    };
    builder.descend(&records, 0, &mut Vec::new());
    let rows = builder.rows;

    debug!(
        "Built hierarchy with {} rows over {} columns",
        rows.len(),
        columns.len()
    );

    Some(Hierarchy {
        axis,
        columns,
        rows,
    })
}

struct HierarchyBuilder<'c> {
    axis: TimeAxis,
    columns: &'c [KeyValue],
    rows: Vec<HierarchyRow>,
}

impl HierarchyBuilder<'_> {
    fn descend(&mut self, records: &[&MovementRecord], depth: usize, path: &mut Vec<String>) {
        let Some(level) = HierarchyLevel::ALL.get(depth).copied() else {
            return;
        };

        for (key, members) in partition(records, level.dimension()) {
            path.push(key.to_string());

            let values = if level.is_detail() {
                sum_by_column(members.iter().copied(), self.columns, self.axis)
            } else {
                let net = members
                    .iter()
                    .copied()
                    .filter(|r| r.movement_kind.is_net_component());
                sum_by_column(net, self.columns, self.axis)
            };

            self.rows.push(HierarchyRow {
                path: path.clone(),
                level,
                total: values.iter().sum(),
                values,
            });

            self.descend(&members, depth + 1, path);
            path.pop();
        }
    }
}

fn partition<'r>(
    records: &[&'r MovementRecord],
    dimension: Dimension,
) -> BTreeMap<KeyValue, Vec<&'r MovementRecord>> {
    let mut groups: BTreeMap<KeyValue, Vec<&'r MovementRecord>> = BTreeMap::new();
    for record in records.iter().copied() {
        groups.entry(dimension.key_of(record)).or_default().push(record);
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::MovementKind;
    use chrono::NaiveDate;

    fn record(entity: &str, group: &str, branch: &str, kind: MovementKind, amount: f64, m: u32) -> MovementRecord {
        MovementRecord::new(kind, amount, NaiveDate::from_ymd_opt(2024, m, 10).unwrap())
            .with_entity(entity)
            .with_group(group)
            .with_branch(branch)
    }

    fn paths(hierarchy: &Hierarchy) -> Vec<Vec<&str>> {
        hierarchy
            .rows
            .iter()
            .map(|r| r.path.iter().map(String::as_str).collect())
            .collect()
    }

    #[test]
    fn test_end_to_end_example() {
        let records = vec![
            record("A", "G1", "B1", MovementKind::Revenue, 100.0, 1),
            record("A", "G1", "B1", MovementKind::Expense, -40.0, 1),
        ];

        let hierarchy = build_hierarchy(&records, TimeAxis::Month).unwrap();
        assert_eq!(
            paths(&hierarchy),
            vec![
                vec!["A"],
                vec!["A", "G1"],
                vec!["A", "G1", "B1"],
                vec!["A", "G1", "B1", "Revenue"],
                vec!["A", "G1", "B1", "Expense"],
            ]
        );
        let totals: Vec<f64> = hierarchy.rows.iter().map(|r| r.total).collect();
        assert_eq!(totals, vec![60.0, 60.0, 60.0, 100.0, -40.0]);
        assert_eq!(hierarchy.grand_total(), 60.0);
    }

    #[test]
    fn test_depth_first_order_and_levels() {
        let records = vec![
            record("B", "G1", "B1", MovementKind::Revenue, 5.0, 2),
            record("A", "G2", "B9", MovementKind::Expense, -3.0, 1),
            record("A", "G1", "B2", MovementKind::Revenue, 7.0, 3),
        ];

        let hierarchy = build_hierarchy(&records, TimeAxis::Month).unwrap();
        assert_eq!(
            paths(&hierarchy),
            vec![
                vec!["A"],
                vec!["A", "G1"],
                vec!["A", "G1", "B2"],
                vec!["A", "G1", "B2", "Revenue"],
                vec!["A", "G2"],
                vec!["A", "G2", "B9"],
                vec!["A", "G2", "B9", "Expense"],
                vec!["B"],
                vec!["B", "G1"],
                vec!["B", "G1", "B1"],
                vec!["B", "G1", "B1", "Revenue"],
            ]
        );
        assert!(hierarchy
            .rows
            .iter()
            .all(|r| r.path.len() == r.level.depth()));
    }

    #[test]
    fn test_parent_totals_equal_sum_of_children() {
        let records = vec![
            record("A", "G1", "B1", MovementKind::Revenue, 120.0, 1),
            record("A", "G1", "B1", MovementKind::Expense, -20.0, 2),
            record("A", "G1", "B2", MovementKind::Expense, -35.0, 2),
            record("A", "G2", "B3", MovementKind::Revenue, 80.0, 3),
            record("A", "G2", "B3", MovementKind::Expense, -10.0, 3),
        ];

        let hierarchy = build_hierarchy(&records, TimeAxis::Month).unwrap();

        for parent in hierarchy.rows.iter().filter(|r| r.level < HierarchyLevel::Branch) {
            let path: Vec<&str> = parent.path.iter().map(String::as_str).collect();
            let child_sum: f64 = hierarchy.children(&path).map(|c| c.total).sum();
            assert!(
                (parent.total - child_sum).abs() < 1e-9,
                "{:?} total {} != children {}",
                parent.path,
                parent.total,
                child_sum
            );
        }

        let entity = hierarchy.find(&["A"]).unwrap();
        assert_eq!(entity.values, vec![120.0, -55.0, 70.0]);
        assert_eq!(entity.total, 135.0);
    }

    #[test]
    fn test_other_kinds_are_leaves_but_not_net() {
        let records = vec![
            record("A", "G1", "B1", MovementKind::Revenue, 50.0, 1),
            record("A", "G1", "B1", MovementKind::Other("Estorno".to_string()), 9.0, 1),
        ];

        let hierarchy = build_hierarchy(&records, TimeAxis::Month).unwrap();
        assert_eq!(hierarchy.find(&["A", "G1", "B1"]).unwrap().total, 50.0);
        assert_eq!(hierarchy.find(&["A", "G1", "B1", "Estorno"]).unwrap().total, 9.0);
    }

    #[test]
    fn test_empty_input_signals_no_data() {
        let records: Vec<MovementRecord> = Vec::new();
        assert!(build_hierarchy(&records, TimeAxis::Month).is_none());
    }

    #[test]
    fn test_period_axis_and_json_rows() {
        let records = vec![
            record("A", "G1", "B1", MovementKind::Revenue, 10.0, 3),
            record("A", "G1", "B1", MovementKind::Revenue, 5.0, 1),
        ];

        let hierarchy = build_hierarchy(&records, TimeAxis::Period).unwrap();
        let header = hierarchy.header();
        assert_eq!(header, vec!["path", "2024-01", "2024-03", "TOTAL"]);

        let rows = hierarchy.to_json_rows();
        assert_eq!(rows[0]["path"], serde_json::json!(["A"]));
        assert_eq!(rows[0]["2024-01"], Value::from(5.0));
        assert_eq!(rows[0]["TOTAL"], Value::from(15.0));
    }
}
