//! Display snapshot of the list
//!
//! Plain data for the renderer: header cells, the ordered rows (group
//! headers and records), footer aggregates and pager texts.

use gridkit_core::{AggregateFn, FieldName, RecordId, SortDirection};
use serde::Serialize;

use super::ListState;
use crate::aggregate::{self, AggregateCell};
use crate::tree::{GroupKey, TreeRow};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HeaderView {
    pub field: FieldName,
    pub label: String,
    pub sortable: bool,
    pub direction: Option<SortDirection>,
    pub aggregate: Option<AggregateFn>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CellView {
    pub field: FieldName,
    pub text: String,
    pub readonly: bool,
    pub invalid: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RowView {
    Group {
        key: GroupKey,
        level: usize,
        label: String,
        count: usize,
        is_open: bool,
        aggregates: Vec<AggregateCell>,
        buttons: Vec<String>,
        /// Only shown when the group has more children than one page
        pager: Option<String>,
    },
    Record {
        id: RecordId,
        level: usize,
        selected: bool,
        in_edition: bool,
        dirty: bool,
        cells: Vec<CellView>,
    },
}

impl ListState {
    pub fn headers(&self) -> Vec<HeaderView> {
        self.columns
            .displayed_columns(&self.config)
            .into_iter()
            .map(|column| HeaderView {
                field: column.name.clone(),
                label: column.label.clone(),
                sortable: column.sortable,
                direction: self.sort.header_direction(&column.name),
                aggregate: column.aggregate,
            })
            .collect()
    }

    pub fn rows(&self) -> Vec<RowView> {
        let columns = self.columns.displayed_columns(&self.config);
        self.tree
            .rows()
            .into_iter()
            .filter_map(|row| match row {
                TreeRow::Group { key, level } => {
                    let group = self.tree.group(&key)?;
                    let pager = (group.is_open && group.pager.total() > group.pager.limit)
                        .then(|| group.pager.display());
                    Some(RowView::Group {
                        label: group.label(),
                        count: group.count,
                        is_open: group.is_open,
                        aggregates: aggregate::group_aggregates(&self.config, &self.tree, group),
                        buttons: self
                            .group_header_buttons(&key)
                            .map(|names| names.into_iter().map(String::from).collect())
                            .unwrap_or_default(),
                        pager,
                        key,
                        level,
                    })
                }
                TreeRow::Record { id, level } => {
                    let record = self.tree.record(id)?;
                    let cells = columns
                        .iter()
                        .map(|column| {
                            let text = if column.is_invisible(&record.values) || column.is_button {
                                String::new()
                            } else {
                                self.config
                                    .renderer_for(&column.name)
                                    .format(record.get(&column.name))
                            };
                            CellView {
                                field: column.name.clone(),
                                text,
                                readonly: !column.is_editable_for(&record.values),
                                invalid: record.errors.contains_key(&column.name),
                            }
                        })
                        .collect();
                    Some(RowView::Record {
                        id,
                        level,
                        selected: self.selection.is_selected(id),
                        in_edition: self.edit.is_editing(id),
                        dirty: record.is_dirty(),
                        cells,
                    })
                }
            })
            .collect()
    }

    /// Footer aggregates
    pub fn aggregates(&self) -> Vec<AggregateCell> {
        aggregate::footer(&self.config, &self.tree, self.selection.selected_ids())
    }

    /// Pager text of a node, e.g. `"1-80 / 10000+"`
    pub fn pager_text(&self, key: &GroupKey) -> Option<String> {
        self.tree.group(key).map(|g| g.pager.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::NodeResponse;
    use gridkit_core::{
        ColumnSpec, Condition, FieldKind, MemoryKeyValueStore, RecordData, SearchReadResponse,
        Value, ViewConfig,
    };
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    #[test]
    fn test_rows_render_cells_and_pager() {
        let config = ViewConfig::new(
            "foo",
            vec![
                ColumnSpec::new("foo", FieldKind::Char),
                ColumnSpec::new("qux", FieldKind::FloatTime)
                    .invisible_when(vec![Condition::eq("foo", "blip")])
                    .with_aggregate(AggregateFn::Sum),
            ],
        )
        .with_limit(2);
        let mut state = ListState::new(config, Arc::new(MemoryKeyValueStore::new())).unwrap();
        let fetch = state.begin_reload(None, None);
        state
            .finish_node_fetch(
                fetch,
                Ok(NodeResponse::Records(SearchReadResponse {
                    records: vec![
                        RecordData::new(1, [("foo", Value::from("yop")), ("qux", Value::Float(1.5))]),
                        RecordData::new(2, [("foo", Value::from("blip")), ("qux", Value::Float(0.25))]),
                    ],
                    exact_count: None,
                })),
            )
            .unwrap();

        let rows = state.rows();
        let RowView::Record { cells, .. } = &rows[0] else {
            panic!("expected a record row");
        };
        assert_eq!(cells[1].text, "01:30");
        let RowView::Record { cells, .. } = &rows[1] else {
            panic!("expected a record row");
        };
        assert_eq!(cells[1].text, "");

        assert_eq!(state.aggregates()[0].display, "01:45");
        assert_eq!(state.pager_text(&GroupKey::root()).as_deref(), Some("1-2 / 10000+"));
    }
}
