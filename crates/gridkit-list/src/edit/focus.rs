//! Keyboard focus order
//!
//! The focus order lists, in display order, every group header, every
//! editable cell of every displayed record and the "add a line" link of
//! editable leaf groups. Tab moves through the cells of that list and wraps
//! around at the end.

use std::collections::BTreeSet;

use gridkit_core::{FieldName, RecordId, ViewConfig};
use serde::Serialize;

use crate::tree::{GroupKey, RecordTree, TreeRow};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FocusTarget {
    Cell { record: RecordId, field: FieldName },
    GroupHeader { group: GroupKey },
    AddRowLink { group: GroupKey },
}

impl FocusTarget {
    pub fn record(&self) -> Option<RecordId> {
        match self {
            Self::Cell { record, .. } => Some(*record),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FocusOrder {
    targets: Vec<FocusTarget>,
}

impl FocusOrder {
    /// Build the order for what is currently displayed
    pub fn build(tree: &RecordTree, config: &ViewConfig, hidden: &BTreeSet<FieldName>) -> Self {
        let mut targets = Vec::new();
        let editable = config.editable.is_editable();
        let rows = tree.rows();

        let push_cells = |targets: &mut Vec<FocusTarget>, id: RecordId| {
            let Some(record) = tree.record(id) else {
                return;
            };
            for column in &config.columns {
                if hidden.contains(&column.name) || column.editable_while_readonly {
                    continue;
                }
                if column.is_editable_for(&record.values) {
                    targets.push(FocusTarget::Cell {
                        record: id,
                        field: column.name.clone(),
                    });
                }
            }
        };

        for (i, row) in rows.iter().enumerate() {
            match row {
                TreeRow::Group { key, .. } => {
                    targets.push(FocusTarget::GroupHeader { group: key.clone() });
                    let empty_open_leaf = tree.is_leaf(key)
                        && tree
                            .group(key)
                            .is_some_and(|g| g.is_open && g.children.is_empty());
                    if editable && empty_open_leaf {
                        targets.push(FocusTarget::AddRowLink { group: key.clone() });
                    }
                }
                TreeRow::Record { id, .. } => {
                    push_cells(&mut targets, *id);
                    let Some(parent) = tree.record(*id).map(|r| r.parent.clone()) else {
                        continue;
                    };
                    // The link closes the last record of a leaf group
                    let next_is_sibling = matches!(
                        rows.get(i + 1),
                        Some(TreeRow::Record { id: next, .. })
                            if tree.record(*next).is_some_and(|r| r.parent == parent)
                    );
                    if editable && !next_is_sibling && !parent.is_root() {
                        targets.push(FocusTarget::AddRowLink { group: parent });
                    }
                }
            }
        }
        if editable && !tree.is_grouped() {
            targets.push(FocusTarget::AddRowLink {
                group: GroupKey::root(),
            });
        }
        Self { targets }
    }

    pub fn targets(&self) -> &[FocusTarget] {
        &self.targets
    }

    pub fn position(&self, target: &FocusTarget) -> Option<usize> {
        self.targets.iter().position(|t| t == target)
    }

    fn cells(&self) -> impl DoubleEndedIterator<Item = (RecordId, &FieldName)> + '_ {
        self.targets.iter().filter_map(|t| match t {
            FocusTarget::Cell { record, field } => Some((*record, field)),
            _ => None,
        })
    }

    /// Editable fields of a record, in column order
    pub fn cells_of(&self, record: RecordId) -> Vec<&FieldName> {
        self.cells()
            .filter(|(id, _)| *id == record)
            .map(|(_, f)| f)
            .collect()
    }

    /// Records that have at least one editable cell, in display order
    pub fn records(&self) -> Vec<RecordId> {
        let mut seen = Vec::new();
        for (id, _) in self.cells() {
            if seen.last() != Some(&id) {
                seen.push(id);
            }
        }
        seen
    }

    /// Whether `field` is the last editable cell of its row
    pub fn is_last_cell(&self, record: RecordId, field: &str) -> bool {
        self.cells_of(record).last().is_some_and(|f| *f == field)
    }

    pub fn is_first_cell(&self, record: RecordId, field: &str) -> bool {
        self.cells_of(record).first().is_some_and(|f| *f == field)
    }

    /// Cell after the given one, wrapping to the first cell of the table
    pub fn next_cell(&self, record: RecordId, field: &str) -> Option<(RecordId, FieldName)> {
        let cells: Vec<(RecordId, &FieldName)> = self.cells().collect();
        let index = cells.iter().position(|(id, f)| *id == record && *f == field)?;
        let (id, f) = cells.get(index + 1).or_else(|| cells.first())?;
        Some((*id, (*f).clone()))
    }

    /// Cell before the given one, wrapping to the last cell of the table
    pub fn previous_cell(&self, record: RecordId, field: &str) -> Option<(RecordId, FieldName)> {
        let cells: Vec<(RecordId, &FieldName)> = self.cells().collect();
        let index = cells.iter().position(|(id, f)| *id == record && *f == field)?;
        let (id, f) = if index == 0 {
            cells.last()?
        } else {
            cells.get(index - 1)?
        };
        Some((*id, (*f).clone()))
    }

    /// Neighbouring row with editable cells (no wrapping)
    pub fn adjacent_record(&self, record: RecordId, forward: bool) -> Option<RecordId> {
        let records = self.records();
        let index = records.iter().position(|id| *id == record)?;
        if forward {
            records.get(index + 1).copied()
        } else {
            index.checked_sub(1).and_then(|i| records.get(i).copied())
        }
    }
}
