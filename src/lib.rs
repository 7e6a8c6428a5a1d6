//! # Ledger Rollup
//!
//! A library for turning a flat ledger of financial movements (revenue and
//! expense postings tagged with entity, group, branch, account type, account
//! code and date) into the rollups of a financial dashboard.
//!
//! ## Core Concepts
//!
//! - **Normalization**: Raw rows are cleaned once into immutable [`MovementRecord`]s.
//!   Missing descriptive fields get a sentinel; rows with a bad amount or date are dropped.
//! - **Filter Selection**: The caller owns the selection and passes it on every call.
//!   Empty dimensions do not restrict anything.
//! - **Pivots**: Sums grouped by any key tuple with the movement kind or the month
//!   spread into columns. Month columns always follow the calendar.
//! - **DRE**: Revenue, expense and result per month.
//! - **Hierarchy**: Entity → group → branch → movement kind rows with per-month
//!   values and a `TOTAL`, encoded as flat rows with a `path`.
//!
//! ## Example
//!
//! ```rust,ignore
//! use ledger_rollup::*;
//! use serde_json::json;
//!
//! let rows = json!([
//!     {"razao": "A", "grupo": "G1", "filial": "B1", "movimento": "Receita",
//!      "valor": 100, "dt_lancamento": "2024-01-15"},
//!     {"razao": "A", "grupo": "G1", "filial": "B1", "movimento": "Despesa",
//!      "valor": -40, "dt_lancamento": "2024-01-20"},
//! ]);
//!
//! let ledger = Ledger::from_json(&rows, &LedgerConfig::default()).unwrap();
//! let dashboard = ledger.dashboard(&FilterSelection::new().with_years([2024]));
//!
//! assert_eq!(dashboard.filtered.result, 60.0);
//! ```

pub mod aggregation;
pub mod error;
pub mod filter;
pub mod hierarchy;
pub mod ingestion;
pub mod report;
pub mod schema;
pub mod table;
pub mod utils;

pub use aggregation::*;
pub use error::{LedgerError, Result};
pub use filter::{apply_filter, filter_refs, FilterSelection};
pub use hierarchy::{build_hierarchy, Hierarchy, HierarchyLevel, HierarchyRow};
pub use ingestion::{read_csv_rows, NormalizationSummary, NormalizedRows, Normalizer, RawRow};
pub use report::{Dashboard, FilterOptions, Ledger, Totals};
pub use schema::*;
pub use table::Table;
pub use utils::MONTH_NAMES;

use log::info;
use serde_json::Value;

/// Normalizes `source` with the default configuration and builds every report
/// for `selection`.
pub fn process_ledger(source: &Value, selection: &FilterSelection) -> Result<Dashboard> {
    let ledger = Ledger::from_json(source, &LedgerConfig::default())?;
    info!(
        "Processing ledger with {} records ({} dropped during normalization)",
        ledger.len(),
        ledger.summary().dropped()
    );
    Ok(ledger.dashboard(selection))
}
