//! Column aggregates
//!
//! Footer values follow what the user is looking at: the selected records
//! when there is a selection, otherwise the server totals. Those come from
//! a totals query when the root holds only part of the data, from the root
//! groups when every group is loaded, and from the records themselves in a
//! fully loaded ungrouped list.

use std::collections::BTreeSet;

use gridkit_core::{AggregateFn, ColumnSpec, FieldKind, RecordId, Value, ViewConfig};
use serde::Serialize;

use crate::tree::{GroupNode, RecordTree};

/// Shown for monetary totals that would add up different currencies
pub const MIXED_CURRENCY: &str = "—";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateCell {
    pub field: String,
    pub value: Option<f64>,
    pub display: String,
}

/// Fold raw values with an aggregate function
pub fn compute(function: AggregateFn, values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return match function {
            AggregateFn::Sum | AggregateFn::Count => Some(0.0),
            _ => None,
        };
    }
    let result = match function {
        AggregateFn::Sum => values.iter().sum(),
        AggregateFn::Avg => values.iter().sum::<f64>() / values.len() as f64,
        AggregateFn::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
        AggregateFn::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        AggregateFn::Count => values.len() as f64,
    };
    Some(result)
}

/// Combine per-group server aggregates into one total
fn combine_groups(function: AggregateFn, field: &str, groups: &[&GroupNode]) -> Option<f64> {
    let parts: Vec<(f64, usize)> = groups
        .iter()
        .filter_map(|g| g.aggregates.get(field).map(|v| (*v, g.count)))
        .collect();
    if parts.is_empty() {
        return None;
    }
    let result = match function {
        AggregateFn::Sum | AggregateFn::Count => parts.iter().map(|(v, _)| v).sum(),
        AggregateFn::Avg => {
            let count: usize = parts.iter().map(|(_, c)| c).sum();
            if count == 0 {
                return None;
            }
            parts.iter().map(|(v, c)| v * *c as f64).sum::<f64>() / count as f64
        }
        AggregateFn::Min => parts.iter().map(|(v, _)| *v).fold(f64::INFINITY, f64::min),
        AggregateFn::Max => parts.iter().map(|(v, _)| *v).fold(f64::NEG_INFINITY, f64::max),
    };
    Some(result)
}

/// Whether a monetary column can be totalled over these records
fn single_currency(config: &ViewConfig, column: &ColumnSpec, tree: &RecordTree, ids: &[RecordId]) -> bool {
    if column.kind != FieldKind::Monetary {
        return true;
    }
    let Some(currency_field) = &column.currency_field else {
        return false;
    };
    if config.column(currency_field).is_none() {
        return false;
    }
    let currencies: BTreeSet<String> = ids
        .iter()
        .filter_map(|id| tree.record(*id))
        .map(|r| r.get(currency_field).group_key())
        .collect();
    currencies.len() <= 1
}

fn cell(config: &ViewConfig, column: &ColumnSpec, value: Option<f64>) -> AggregateCell {
    let display = match value {
        Some(v) => config.renderer_for(&column.name).format_aggregate(v),
        None => String::new(),
    };
    AggregateCell {
        field: column.name.clone(),
        value,
        display,
    }
}

fn mixed(column: &ColumnSpec) -> AggregateCell {
    AggregateCell {
        field: column.name.clone(),
        value: None,
        display: MIXED_CURRENCY.to_string(),
    }
}

fn over_records(config: &ViewConfig, column: &ColumnSpec, tree: &RecordTree, ids: &[RecordId]) -> AggregateCell {
    if !single_currency(config, column, tree, ids) {
        return mixed(column);
    }
    let Some(function) = column.aggregate else {
        return cell(config, column, None);
    };
    let values: Vec<f64> = ids
        .iter()
        .filter_map(|id| tree.record(*id))
        .map(|r| match r.get(&column.name) {
            Value::Null => 0.0,
            v => v.as_f64().unwrap_or(0.0),
        })
        .collect();
    cell(config, column, compute(function, &values))
}

/// Footer aggregates of every aggregated column
pub fn footer(config: &ViewConfig, tree: &RecordTree, selected: &BTreeSet<RecordId>) -> Vec<AggregateCell> {
    let selected_loaded: Vec<RecordId> = selected
        .iter()
        .copied()
        .filter(|id| tree.record(*id).is_some())
        .collect();
    let loaded = tree.visible_records();
    let root = tree.root();
    let groups: Vec<&GroupNode> = root
        .group_children()
        .filter_map(|k| tree.group(k))
        .collect();

    let totals = tree.totals().filter(|_| tree.needs_totals(true));

    config
        .aggregated_columns()
        .map(|column| {
            if !selected_loaded.is_empty() {
                over_records(config, column, tree, &selected_loaded)
            } else if let Some(totals) = totals {
                if !single_currency(config, column, tree, &loaded) {
                    return mixed(column);
                }
                cell(config, column, totals.get(&column.name).copied())
            } else if tree.is_grouped() {
                if !single_currency(config, column, tree, &loaded) {
                    return mixed(column);
                }
                let function = column.aggregate.unwrap_or(AggregateFn::Sum);
                cell(config, column, combine_groups(function, &column.name, &groups))
            } else {
                over_records(config, column, tree, &loaded)
            }
        })
        .collect()
}

/// Aggregates displayed in a group header
pub fn group_aggregates(config: &ViewConfig, tree: &RecordTree, group: &GroupNode) -> Vec<AggregateCell> {
    let loaded: Vec<RecordId> = group.record_children().collect();
    config
        .aggregated_columns()
        .map(|column| {
            if !single_currency(config, column, tree, &loaded) {
                return mixed(column);
            }
            cell(config, column, group.aggregates.get(&column.name).copied())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::GroupKey;
    use gridkit_core::{GroupData, RecordData};
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;

    fn config() -> ViewConfig {
        ViewConfig::new(
            "foo",
            vec![
                ColumnSpec::new("int_field", FieldKind::Integer).with_aggregate(AggregateFn::Sum),
                ColumnSpec::new("qux", FieldKind::Float).with_aggregate(AggregateFn::Avg),
                ColumnSpec::new("amount", FieldKind::Monetary)
                    .with_aggregate(AggregateFn::Sum)
                    .with_currency("currency_id"),
                ColumnSpec::new("currency_id", FieldKind::Many2One),
            ],
        )
    }

    fn record(id: i64, int_field: i64, qux: f64, currency: i64) -> RecordData {
        RecordData::new(
            id,
            [
                ("int_field", Value::Integer(int_field)),
                ("qux", Value::Float(qux)),
                ("amount", Value::Float(10.0)),
                ("currency_id", Value::Reference(currency, format!("C{}", currency))),
            ],
        )
    }

    fn displays(cells: &[AggregateCell]) -> Vec<&str> {
        cells.iter().map(|c| c.display.as_str()).collect()
    }

    #[test]
    fn test_compute() {
        assert_eq!(compute(AggregateFn::Sum, &[1.0, 2.0]), Some(3.0));
        assert_eq!(compute(AggregateFn::Avg, &[1.0, 2.0]), Some(1.5));
        assert_eq!(compute(AggregateFn::Max, &[1.0, -2.0]), Some(1.0));
        assert_eq!(compute(AggregateFn::Avg, &[]), None);
        assert_eq!(compute(AggregateFn::Sum, &[]), Some(0.0));
    }

    #[test]
    fn test_footer_follows_selection() {
        let config = config();
        let mut tree = RecordTree::new(Vec::new(), 80, 80);
        tree.apply_records(
            &GroupKey::root(),
            0,
            vec![record(1, 10, 0.4, 1), record(2, 9, 13.0, 1), record(3, 17, -3.0, 1)],
            Some(3),
            10_000,
        )
        .unwrap();

        let none = BTreeSet::new();
        assert_eq!(displays(&footer(&config, &tree, &none)), vec!["36", "3.47", "30.00"]);

        let selected: BTreeSet<RecordId> = [RecordId(1), RecordId(2)].into_iter().collect();
        assert_eq!(displays(&footer(&config, &tree, &selected)), vec!["19", "6.70", "20.00"]);
    }

    #[test]
    fn test_mixed_currencies() {
        let config = config();
        let mut tree = RecordTree::new(Vec::new(), 80, 80);
        tree.apply_records(
            &GroupKey::root(),
            0,
            vec![record(1, 1, 1.0, 1), record(2, 1, 1.0, 2)],
            Some(2),
            10_000,
        )
        .unwrap();
        let cells = footer(&config, &tree, &BTreeSet::new());
        assert_eq!(cells[2].display, MIXED_CURRENCY);

        let without_currency_column = ViewConfig::new(
            "foo",
            vec![ColumnSpec::new("amount", FieldKind::Monetary)
                .with_aggregate(AggregateFn::Sum)
                .with_currency("currency_id")],
        );
        let cells = footer(&without_currency_column, &tree, &BTreeSet::new());
        assert_eq!(cells[0].display, MIXED_CURRENCY);
    }

    #[test]
    fn test_grouped_footer_uses_server_totals() {
        let config = config();
        let mut tree = RecordTree::new(vec!["bar".into()], 80, 80);
        let group = |value: bool, count: usize, sum: f64, avg: f64| GroupData {
            value: Value::Bool(value),
            count,
            aggregates: BTreeMap::from([("int_field".to_string(), sum), ("qux".to_string(), avg)]),
        };
        tree.apply_groups(
            &GroupKey::root(),
            0,
            vec![group(false, 1, 17.0, 2.0), group(true, 3, 15.0, 4.0)],
            None,
            false,
        )
        .unwrap();

        let cells = footer(&config, &tree, &BTreeSet::new());
        assert_eq!(cells[0].value, Some(32.0));
        assert_eq!(cells[1].value, Some(3.5));
        assert_eq!(cells[2].value, None);
    }

    #[test]
    fn test_partial_page_footer_waits_for_totals() {
        let config = config();
        let mut tree = RecordTree::new(Vec::new(), 2, 80);
        tree.apply_records(
            &GroupKey::root(),
            0,
            vec![record(1, 10, 0.4, 1), record(2, 9, 13.0, 1)],
            Some(4),
            10_000,
        )
        .unwrap();
        assert!(tree.needs_totals(true));
        assert_eq!(footer(&config, &tree, &BTreeSet::new())[0].display, "19");

        tree.apply_totals(
            4,
            BTreeMap::from([("int_field".to_string(), 32.0), ("amount".to_string(), 40.0)]),
        );
        assert_eq!(displays(&footer(&config, &tree, &BTreeSet::new())), vec!["32", "", "40.00"]);
        assert_eq!(tree.root().count, 4);

        let selected: BTreeSet<RecordId> = [RecordId(2)].into_iter().collect();
        assert_eq!(footer(&config, &tree, &selected)[0].display, "9");
    }

    #[test]
    fn test_paged_groups_take_count_and_footer_from_totals() {
        let config = config();
        let mut tree = RecordTree::new(vec!["bar".into()], 80, 1);
        tree.apply_groups(
            &GroupKey::root(),
            0,
            vec![GroupData {
                value: Value::Bool(false),
                count: 1,
                aggregates: BTreeMap::from([("int_field".to_string(), -4.0)]),
            }],
            Some(2),
            false,
        )
        .unwrap();
        assert!(tree.needs_totals(true));
        assert_eq!(tree.root().count, 1);

        tree.apply_totals(4, BTreeMap::from([("int_field".to_string(), 32.0)]));
        assert_eq!(tree.root().count, 4);
        assert_eq!(footer(&config, &tree, &BTreeSet::new())[0].value, Some(32.0));
    }
}
