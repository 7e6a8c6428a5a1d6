use chrono::NaiveDate;
use ledger_rollup::*;
use serde_json::{json, Value};

fn retail_ledger_rows() -> Value {
    json!([
        {"razao": "Holding Sul", "grupo": "Varejo", "filial": "Loja Centro", "tipo_conta": "Vendas", "pcontas": "3.1.01", "movimento": "Receita", "valor": 12000, "dt_lancamento": "2024-01-05"},
        {"razao": "Holding Sul", "grupo": "Varejo", "filial": "Loja Centro", "tipo_conta": "Pessoal", "pcontas": "4.1.01", "movimento": "Despesa", "valor": -4500, "dt_lancamento": "2024-01-28"},
        {"razao": "Holding Sul", "grupo": "Varejo", "filial": "Loja Centro", "tipo_conta": "Aluguel", "pcontas": "4.2.01", "movimento": "despesa", "valor": "-2000", "dt_lancamento": "2024-02-01"},
        {"razao": "Holding Sul", "grupo": "Varejo", "fornecedor": "Loja Norte", "tipo_conta": "Vendas", "pcontas": "3.1.01", "movimento": " RECEITA ", "valor": 8000.5, "dt_lancamento": "2024-02-14T09:30:00"},
        {"razao": "Holding Sul", "grupo": "Varejo", "fornecedor": "Loja Norte", "tipo_conta": "Pessoal", "pcontas": "4.1.01", "movimento": "Despesa", "valor": -3000, "dt_lancamento": "2024-03-10"},
        {"razao": "Holding Sul", "grupo": "Atacado", "filial": "CD Porto", "tipo_conta": "Vendas", "pcontas": "3.1.02", "movimento": "Receita", "valor": 25000, "dt_lancamento": "2024-03-20"},
        {"razao": "Holding Sul", "grupo": "Atacado", "filial": "CD Porto", "tipo_conta": null, "pcontas": null, "movimento": "Despesa", "valor": -9000, "dt_lancamento": "2024-12-02"},
        {"razao": "Holding Norte", "grupo": "Serviços", "filial": "Escritório", "tipo_conta": "Consultoria", "pcontas": "3.2.01", "movimento": "Receita", "valor": 4000, "dt_lancamento": "2023-11-11"},
        {"razao": "Holding Norte", "grupo": "Serviços", "filial": "Escritório", "tipo_conta": "Pessoal", "pcontas": "4.1.01", "movimento": "Despesa", "valor": -1500, "dt_lancamento": "2023-11-30"},
        {"razao": "Holding Norte", "grupo": null, "filial": null, "movimento": "Despesa", "valor": -100, "dt_lancamento": "2024-01-02"},
        {"razao": "Holding Norte", "grupo": "Serviços", "filial": "Escritório", "movimento": "Receita", "valor": "mil", "dt_lancamento": "2024-01-02"},
        {"razao": "Holding Norte", "grupo": "Serviços", "filial": "Escritório", "movimento": "Receita", "valor": 10, "dt_lancamento": "2024-02-30"},
        {"razao": "Holding Norte", "grupo": "Serviços", "filial": "Escritório", "movimento": "Transferência", "valor": 999, "dt_lancamento": "2024-01-02"}
    ])
}

fn retail_ledger() -> Ledger {
    Ledger::from_json(&retail_ledger_rows(), &LedgerConfig::default()).unwrap()
}

fn movement(entity: &str, group: &str, branch: &str, kind: MovementKind, amount: f64, date: (i32, u32, u32)) -> MovementRecord {
    MovementRecord::new(kind, amount, NaiveDate::from_ymd_opt(date.0, date.1, date.2).unwrap())
        .with_entity(entity)
        .with_group(group)
        .with_branch(branch)
}

#[test]
fn test_normalization_invariants() {
    let ledger = retail_ledger();

    assert_eq!(ledger.summary().input_rows, 13);
    assert_eq!(ledger.summary().dropped_invalid_amount, 1);
    assert_eq!(ledger.summary().dropped_invalid_date, 1);
    assert_eq!(ledger.summary().dropped_unknown_kind, 1);
    assert_eq!(ledger.len(), 10);

    for record in ledger.records() {
        for value in [
            &record.entity,
            &record.group,
            &record.branch,
            &record.account_type,
            &record.account_code,
        ] {
            assert!(!value.trim().is_empty(), "empty dimension in {:?}", record);
        }
        assert!(record.amount.is_finite());
        assert!(record.movement_kind.is_net_component());
        assert_eq!(record.period_key, PeriodKey::from_date(record.posting_date));
    }

    let sentinel_rows = ledger
        .records()
        .iter()
        .filter(|r| r.group == DEFAULT_SENTINEL && r.branch == DEFAULT_SENTINEL)
        .count();
    assert_eq!(sentinel_rows, 1);
}

#[test]
fn test_end_to_end_example() {
    let records = vec![
        movement("A", "G1", "B1", MovementKind::Revenue, 100.0, (2024, 1, 15)),
        movement("A", "G1", "B1", MovementKind::Expense, -40.0, (2024, 1, 20)),
    ];
    let ledger = Ledger::from_records(records);
    let dashboard = ledger.dashboard(&FilterSelection::new());

    let january = dashboard
        .monthly_totals
        .get(&"2024-01".parse().unwrap())
        .unwrap();
    assert_eq!(january.revenue, 100.0);
    assert_eq!(january.expense, -40.0);
    assert_eq!(january.result, 60.0);

    let hierarchy = dashboard.hierarchy.unwrap();
    let rows: Vec<(Vec<String>, f64)> = hierarchy
        .rows
        .iter()
        .map(|r| (r.path.clone(), r.total))
        .collect();
    let expected: Vec<(Vec<String>, f64)> = vec![
        (vec!["A".into()], 60.0),
        (vec!["A".into(), "G1".into()], 60.0),
        (vec!["A".into(), "G1".into(), "B1".into()], 60.0),
        (vec!["A".into(), "G1".into(), "B1".into(), "Revenue".into()], 100.0),
        (vec!["A".into(), "G1".into(), "B1".into(), "Expense".into()], -40.0),
    ];
    assert_eq!(rows, expected);
}

#[test]
fn test_net_result_identity_everywhere() {
    let ledger = retail_ledger();
    let dashboard = ledger.dashboard(&FilterSelection::new());

    for row in &dashboard.monthly_totals.rows {
        assert_eq!(row.result, row.revenue + row.expense);
    }
    for row in &dashboard.detail.rows {
        assert_eq!(row.result, row.totals.revenue + row.totals.expense);
    }

    let revenue = dashboard.dre.row(&DreLine::Kind(MovementKind::Revenue)).unwrap();
    let expense = dashboard.dre.row(&DreLine::Kind(MovementKind::Expense)).unwrap();
    let result = dashboard.dre.row(&DreLine::Result).unwrap();
    for idx in 0..dashboard.dre.columns.len() {
        assert_eq!(result.values[idx], revenue.values[idx] + expense.values[idx]);
    }

    let overall = dashboard.overall;
    assert_eq!(overall.result, overall.revenue + overall.expense);
}

#[test]
fn test_month_columns_follow_calendar_order() {
    let ledger = retail_ledger();
    let dashboard = ledger.dashboard(&FilterSelection::new());

    let dre_columns: Vec<String> = dashboard.dre.columns.iter().map(|c| c.to_string()).collect();
    assert_eq!(
        dre_columns,
        vec!["Janeiro", "Fevereiro", "Março", "Novembro", "Dezembro"]
    );

    let hierarchy = dashboard.hierarchy.as_ref().unwrap();
    let header = hierarchy.header();
    assert_eq!(
        header,
        vec!["path", "Janeiro", "Fevereiro", "Março", "Novembro", "Dezembro", "TOTAL"]
    );

    let expense_columns: Vec<u32> = dashboard
        .expense_breakdown
        .columns
        .iter()
        .map(|c| match c {
            KeyValue::Month(month) => month.number(),
            other => panic!("unexpected column {:?}", other),
        })
        .collect();
    let mut sorted = expense_columns.clone();
    sorted.sort_unstable();
    assert_eq!(expense_columns, sorted);
}

#[test]
fn test_filter_monotonicity_and_identity() {
    let ledger = retail_ledger();
    let all = ledger.filter(&FilterSelection::new());
    assert_eq!(all, ledger.records());

    let total_abs = |records: &[MovementRecord]| records.iter().map(|r| r.amount.abs()).sum::<f64>();

    let selections = vec![
        FilterSelection::new().with_years([2024]),
        FilterSelection::new().with_entities(["Holding Sul"]).with_groups(["Varejo"]),
        FilterSelection::new().with_months(["Janeiro", "Março"]),
        FilterSelection::new().with_movement_kinds(["Despesa"]).with_account_codes(["4.1.01"]),
        FilterSelection::new().with_branches(["Nowhere"]),
    ];

    for selection in &selections {
        let filtered = ledger.filter(selection);
        assert!(filtered.len() <= ledger.len());
        assert!(total_abs(&filtered) <= total_abs(ledger.records()));
        assert!(filtered.iter().all(|r| selection.matches(r)));
    }
}

#[test]
fn test_hierarchy_total_consistency() {
    let ledger = retail_ledger();
    let hierarchy = build_hierarchy(ledger.records(), TimeAxis::Period).unwrap();

    for parent in hierarchy
        .rows
        .iter()
        .filter(|r| r.level == HierarchyLevel::Entity || r.level == HierarchyLevel::Group)
    {
        let path: Vec<&str> = parent.path.iter().map(String::as_str).collect();
        let children_total: f64 = hierarchy.children(&path).map(|c| c.total).sum();
        assert!((parent.total - children_total).abs() < 1e-6);
    }

    for row in &hierarchy.rows {
        let sum: f64 = row.values.iter().sum();
        assert!((row.total - sum).abs() < 1e-6);
    }

    assert!((hierarchy.grand_total() - ledger.totals().result).abs() < 1e-6);
}

#[test]
fn test_pivot_zero_fill_with_revenue_only() {
    let ledger = retail_ledger();
    let selection = FilterSelection::new().with_movement_kinds(["Receita"]);
    let dashboard = ledger.dashboard(&selection);

    assert!(!dashboard.detail.rows.is_empty());
    assert!(dashboard.detail.rows.iter().all(|r| r.totals.expense == 0.0));
    assert!(dashboard.monthly_totals.rows.iter().all(|r| r.expense == 0.0));

    let expense_row = dashboard
        .dre
        .row(&DreLine::Kind(MovementKind::Expense))
        .unwrap();
    assert!(expense_row.values.iter().all(|v| *v == 0.0));

    for row in dashboard.detail.to_json_rows() {
        assert_eq!(row["Expense"], Value::from(0.0));
    }
}

#[test]
fn test_expense_breakdown_partial_selection() {
    let ledger = retail_ledger();
    let selection = FilterSelection::new()
        .with_years([2024])
        .with_entities(["Holding Sul"])
        .with_months(["Janeiro"])
        .with_movement_kinds(["Receita"])
        .with_account_types(["Vendas"]);

    let dashboard = ledger.dashboard(&selection);
    let breakdown = &dashboard.expense_breakdown;

    let columns: Vec<String> = breakdown.columns.iter().map(|c| c.to_string()).collect();
    assert_eq!(columns, vec!["Janeiro", "Fevereiro", "Março", "Dezembro"]);

    // account type is not part of the reduced selection
    assert_eq!(breakdown.rows.len(), 4);
    assert_eq!(breakdown.column_totals(), vec![-4500.0, -2000.0, -3000.0, -9000.0]);

    let sentinel_row = breakdown
        .rows
        .iter()
        .find(|r| r.key[3] == KeyValue::Text(DEFAULT_SENTINEL.to_string()))
        .unwrap();
    assert_eq!(sentinel_row.values, vec![0.0, 0.0, 0.0, -9000.0]);
}

#[test]
fn test_mean_expense_table() {
    let ledger = retail_ledger();
    let dashboard = ledger.dashboard(&FilterSelection::new().with_account_codes(["4.1.01"]));

    let means: Vec<(String, f64, usize)> = dashboard
        .mean_expense
        .rows
        .iter()
        .map(|r| (r.key[2].to_string(), r.mean, r.count))
        .collect();
    assert_eq!(
        means,
        vec![
            ("Escritório".to_string(), -1500.0, 1),
            ("Loja Centro".to_string(), -4500.0, 1),
            ("Loja Norte".to_string(), -3000.0, 1),
        ]
    );
}

#[test]
fn test_unknown_kinds_excluded_by_default() {
    let ledger = retail_ledger();
    assert!(ledger
        .records()
        .iter()
        .all(|r| r.movement_kind != MovementKind::Other("Transferência".to_string())));
}

#[test]
fn test_unknown_kinds_kept_outside_net_result() {
    let config = LedgerConfig {
        unknown_kinds: UnknownKindPolicy::Keep,
        ..Default::default()
    };
    let ledger = Ledger::from_json(&retail_ledger_rows(), &config).unwrap();
    assert_eq!(ledger.len(), 11);

    let default_result = retail_ledger().totals().result;
    assert_eq!(ledger.totals().result, default_result);

    let selection = FilterSelection::new().with_entities(["Holding Norte"]).with_years([2024]);
    let dashboard = ledger.dashboard(&selection);

    assert!(dashboard
        .detail
        .header()
        .contains(&"Transferência".to_string()));
    assert_eq!(dashboard.detail.totals().other.get("Transferência"), Some(&999.0));

    let hierarchy = dashboard.hierarchy.as_ref().unwrap();
    assert_eq!(hierarchy.find(&["Holding Norte"]).unwrap().total, -100.0);
    assert_eq!(
        hierarchy
            .find(&["Holding Norte", "Serviços", "Escritório", "Transferência"])
            .unwrap()
            .total,
        999.0
    );

    let dre_labels: Vec<&str> = dashboard.dre.rows.iter().map(|r| r.line.label()).collect();
    assert_eq!(dre_labels, vec!["Revenue", "Expense", "Transferência", "Result"]);
    assert_eq!(dashboard.dre.row(&DreLine::Result).unwrap().total, -100.0);
}

#[test]
fn test_no_data_for_current_filters() {
    let ledger = retail_ledger();
    let dashboard = ledger.dashboard(&FilterSelection::new().with_groups(["Inexistente"]));

    assert!(!dashboard.has_data());
    assert!(dashboard.hierarchy.is_none());
    assert!(dashboard.monthly_totals.rows.is_empty());
    assert_eq!(dashboard.monthly_totals.header().len(), 4);
    assert!(dashboard.detail.to_csv().unwrap().starts_with("entity,group,branch,year,month_name"));
}

#[test]
fn test_selection_and_config_from_json() -> anyhow::Result<()> {
    let config = LedgerConfig::from_json_str(
        r#"{"fields": {"entity": "holding", "amount": "value", "posting_date": "date", "movement_kind": "kind", "legacy_branch": null}, "sentinel": "unspecified"}"#,
    )?;
    let rows = json!([
        {"holding": "A", "kind": "revenue", "value": 10, "date": "2024-05-01", "fornecedor": "ignored"},
        {"holding": "A", "kind": "expense", "value": -4, "date": "2024-06-01"}
    ]);
    let ledger = Ledger::from_json(&rows, &config)?;
    assert!(ledger.records().iter().all(|r| r.branch == "unspecified"));

    let selection: FilterSelection = serde_json::from_str(r#"{"month_name": ["Junho"]}"#)?;
    let dashboard = ledger.dashboard(&selection);
    assert_eq!(dashboard.filtered.expense, -4.0);
    assert_eq!(dashboard.filtered.revenue, 0.0);

    let json = dashboard.to_json()?;
    assert!(json.contains("\"Junho\""));
    Ok(())
}
