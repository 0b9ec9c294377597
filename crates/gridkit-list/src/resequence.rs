//! Manual reordering through the handle field
//!
//! Dropping a row rewrites the handle values of the contiguous range of
//! rows whose position changed. The new order is shown at once and
//! reverted if the store rejects it.

use gridkit_core::{OrderSpec, RecordId, RecordValues, Value};

use crate::error::{ListError, ListResult};
use crate::tree::{GroupKey, RecordTree};

/// A computed reorder, with what is needed to undo it
#[derive(Debug, Clone, PartialEq)]
pub struct ResequencePlan {
    pub parent: GroupKey,
    pub field: String,
    /// Records whose position changed, in their new order
    pub ids: Vec<RecordId>,
    /// Handle value given to the first of `ids`
    pub offset: i64,
    previous_order: Vec<RecordId>,
    previous_values: Vec<(RecordId, Value)>,
}

/// Reordering is only meaningful while the list is ordered by the handle
pub fn check_unlocked(handle: &str, orders: &[OrderSpec]) -> ListResult<()> {
    match orders.first() {
        Some(primary) if primary.field != handle => {
            Err(ListError::HandleLocked(primary.field.clone()))
        }
        _ => Ok(()),
    }
}

/// Plan moving `moved` right before `before` (or to the end when `None`).
///
/// Returns `None` when the drop does not change the order.
pub fn plan(
    tree: &RecordTree,
    handle: &str,
    moved: RecordId,
    before: Option<RecordId>,
) -> ListResult<Option<ResequencePlan>> {
    let parent = tree.require_record(moved)?.parent.clone();
    let previous_order = tree.children_records(&parent);

    let mut order: Vec<RecordId> = previous_order.iter().copied().filter(|id| *id != moved).collect();
    let target = match before {
        Some(id) => order
            .iter()
            .position(|candidate| *candidate == id)
            .ok_or(ListError::RecordNotFound(id))?,
        None => order.len(),
    };
    order.insert(target, moved);

    let Some(first) = order.iter().zip(&previous_order).position(|(a, b)| a != b) else {
        return Ok(None);
    };
    let last = order
        .iter()
        .zip(&previous_order)
        .rposition(|(a, b)| a != b)
        .unwrap_or(first);
    let ids = order[first..=last].to_vec();

    let previous_values: Vec<(RecordId, Value)> = ids
        .iter()
        .filter_map(|id| tree.record(*id).map(|r| (*id, r.get(handle).clone())))
        .collect();
    let offset = previous_values
        .iter()
        .filter_map(|(_, v)| v.as_i64())
        .min()
        .unwrap_or(first as i64);

    Ok(Some(ResequencePlan {
        parent,
        field: handle.to_string(),
        ids,
        offset,
        previous_order,
        previous_values,
    }))
}

impl ResequencePlan {
    /// Show the new order and handle values locally
    pub fn apply(&self, tree: &mut RecordTree) -> ListResult<()> {
        let mut order = self.previous_order.clone();
        let first = order
            .iter()
            .position(|id| self.ids.contains(id))
            .unwrap_or(0);
        order.retain(|id| !self.ids.contains(id));
        for (i, id) in self.ids.iter().enumerate() {
            order.insert(first + i, *id);
        }
        tree.set_record_order(&self.parent, &order)?;

        for (i, id) in self.ids.iter().enumerate() {
            let patch = RecordValues::from([(self.field.clone(), Value::Integer(self.offset + i as i64))]);
            tree.apply_values(*id, &patch)?;
        }
        Ok(())
    }

    /// Restore the order and handle values from before the drop
    pub fn revert(&self, tree: &mut RecordTree) -> ListResult<()> {
        let current = tree.children_records(&self.parent);
        let order: Vec<RecordId> = self
            .previous_order
            .iter()
            .copied()
            .filter(|id| current.contains(id))
            .collect();
        tree.set_record_order(&self.parent, &order)?;
        for (id, value) in &self.previous_values {
            if tree.record(*id).is_some() {
                tree.apply_values(*id, &RecordValues::from([(self.field.clone(), value.clone())]))?;
            }
        }
        Ok(())
    }
}
