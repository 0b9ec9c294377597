//! Row edition
//!
//! At most one row is in edition at a time. Leaving it validates the row
//! and turns its pending changes into a [`SavePlan`]; an invalid row keeps
//! the edition. In multi-edit mode a change on the anchor row is proposed
//! for every selected record and only applied once confirmed.

mod focus;

pub use focus::{FocusOrder, FocusTarget};

use std::collections::{BTreeMap, BTreeSet};

use gridkit_core::{ColumnSpec, FieldErrorKind, FieldName, GridError, RecordId, RecordValues, Value, ViewConfig};
use serde::Serialize;

use crate::error::{ListError, ListResult, ValidationFailure};
use crate::tree::{RecordNode, RecordTree};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum EditMode {
    #[default]
    Readonly,
    Single(RecordId),
    /// Edition of `anchor` propagates to all `targets`
    Multi {
        anchor: RecordId,
        targets: BTreeSet<RecordId>,
    },
}

/// One write to perform: the same patch on every id
#[derive(Debug, Clone, PartialEq)]
pub struct SavePlan {
    pub ids: Vec<RecordId>,
    pub patch: RecordValues,
}

/// A multi-edit change waiting for confirmation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MultiEditProposal {
    pub field: FieldName,
    pub value: Value,
    pub anchor: RecordId,
    /// Targets that accept the value
    pub valid_ids: Vec<RecordId>,
    pub total: usize,
}

impl MultiEditProposal {
    pub fn message(&self) -> String {
        format!(
            "{} of {} records are valid for this update",
            self.valid_ids.len(),
            self.total
        )
    }
}

/// A rejected write waiting for the user to acknowledge it
#[derive(Debug, Clone, PartialEq)]
pub struct FailedWrite {
    pub plan: SavePlan,
    pub error: GridError,
}

/// Result of leaving the row in edition
#[derive(Debug, Clone, PartialEq)]
pub enum LeaveOutcome {
    Nothing,
    /// A pristine new row was dropped
    Discarded(RecordId),
    Save(SavePlan),
}

/// Result of changing a field value
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOutcome {
    /// Kept on the row until it is left
    Staged,
    NeedsConfirmation(MultiEditProposal),
}

/// Problem with one field value, if any
pub fn field_error(config: &ViewConfig, column: &ColumnSpec, values: &RecordValues) -> Option<FieldErrorKind> {
    if column.is_button || column.is_invisible(values) {
        return None;
    }
    let value = values.get(&column.name).unwrap_or(&Value::Null);
    if column.is_required(values) && value.is_empty() {
        return Some(FieldErrorKind::Required);
    }
    config.renderer_for(&column.name).validate(value).err()
}

/// Validate every column of a record, recording the invalid fields on it
pub fn validate_record(config: &ViewConfig, record: &mut RecordNode) -> Result<(), ValidationFailure> {
    let errors: BTreeMap<FieldName, FieldErrorKind> = config
        .columns
        .iter()
        .filter_map(|column| {
            field_error(config, column, &record.values).map(|kind| (column.name.clone(), kind))
        })
        .collect();
    record.errors = errors;
    if record.errors.is_empty() {
        Ok(())
    } else {
        Err(ValidationFailure {
            record: record.id,
            fields: record.errors.iter().map(|(f, k)| (f.clone(), *k)).collect(),
        })
    }
}

/// First column a user can type into for this record
pub fn first_editable_field(config: &ViewConfig, values: &RecordValues) -> Option<FieldName> {
    config
        .columns
        .iter()
        .find(|c| c.is_editable_for(values) && !c.editable_while_readonly)
        .map(|c| c.name.clone())
}

#[derive(Debug, Default)]
pub struct EditController {
    mode: EditMode,
    field: Option<FieldName>,
    proposal: Option<MultiEditProposal>,
    failed_writes: Vec<FailedWrite>,
}

impl EditController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(&self) -> &EditMode {
        &self.mode
    }

    pub fn active_field(&self) -> Option<&str> {
        self.field.as_deref()
    }

    pub fn set_active_field(&mut self, field: FieldName) {
        self.field = Some(field);
    }

    /// The row in edition (the anchor in multi-edit)
    pub fn editing_record(&self) -> Option<RecordId> {
        match &self.mode {
            EditMode::Readonly => None,
            EditMode::Single(id) => Some(*id),
            EditMode::Multi { anchor, .. } => Some(*anchor),
        }
    }

    pub fn is_editing(&self, id: RecordId) -> bool {
        self.editing_record() == Some(id)
    }

    pub fn proposal(&self) -> Option<&MultiEditProposal> {
        self.proposal.as_ref()
    }

    pub fn failed_writes(&self) -> &[FailedWrite] {
        &self.failed_writes
    }

    /// Put a row in edition.
    ///
    /// With multi-edit enabled and the row part of a selection of two or
    /// more, the whole selection is edited through it.
    pub fn enter(
        &mut self,
        tree: &RecordTree,
        config: &ViewConfig,
        id: RecordId,
        field: Option<&str>,
        selection: &BTreeSet<RecordId>,
    ) -> ListResult<()> {
        let record = tree.require_record(id)?;
        self.mode = if config.multi_edit && selection.len() >= 2 && selection.contains(&id) {
            EditMode::Multi {
                anchor: id,
                targets: selection.clone(),
            }
        } else {
            EditMode::Single(id)
        };
        let requested = field.filter(|f| {
            config
                .column(f)
                .is_some_and(|c| c.is_editable_for(&record.values))
        });
        self.field = requested
            .map(String::from)
            .or_else(|| first_editable_field(config, &record.values));
        tracing::debug!(record = %id, field = ?self.field, mode = ?self.mode, "Entered edition");
        Ok(())
    }

    /// Leave the row in edition.
    ///
    /// Fails with a validation error (keeping the edition) when the row has
    /// invalid fields.
    pub fn leave(&mut self, tree: &mut RecordTree, config: &ViewConfig) -> ListResult<LeaveOutcome> {
        let id = match &self.mode {
            EditMode::Readonly => return Ok(LeaveOutcome::Nothing),
            EditMode::Multi { .. } => {
                self.cancel_proposal(tree);
                self.exit();
                return Ok(LeaveOutcome::Nothing);
            }
            EditMode::Single(id) => *id,
        };
        let Some(record) = tree.record_mut(id) else {
            self.exit();
            return Ok(LeaveOutcome::Nothing);
        };

        if record.is_new && !record.is_dirty() {
            record.errors.clear();
            tree.remove_record(id)?;
            self.exit();
            tracing::debug!(record = %id, "Discarded pristine new row");
            return Ok(LeaveOutcome::Discarded(id));
        }

        validate_record(config, record).map_err(ListError::Validation)?;

        let outcome = if record.is_dirty() {
            LeaveOutcome::Save(SavePlan {
                ids: vec![id],
                patch: record.pending_patch(),
            })
        } else {
            LeaveOutcome::Nothing
        };
        self.exit();
        Ok(outcome)
    }

    fn exit(&mut self) {
        self.mode = EditMode::Readonly;
        self.field = None;
    }

    /// Drop the pending changes of the row in edition (Escape)
    pub fn discard(&mut self, tree: &mut RecordTree) -> ListResult<Option<RecordId>> {
        let removed = match &self.mode {
            EditMode::Readonly => None,
            EditMode::Multi { .. } => {
                self.cancel_proposal(tree);
                None
            }
            EditMode::Single(id) => {
                let id = *id;
                match tree.record(id).map(|r| r.is_new) {
                    Some(true) => {
                        tree.remove_record(id)?;
                        Some(id)
                    }
                    Some(false) => {
                        if let Some(record) = tree.record_mut(id) {
                            record.revert_all();
                        }
                        None
                    }
                    None => None,
                }
            }
        };
        self.exit();
        Ok(removed)
    }

    /// Change a field of the row in edition
    pub fn update_field(
        &mut self,
        tree: &mut RecordTree,
        config: &ViewConfig,
        id: RecordId,
        field: &str,
        value: Value,
    ) -> ListResult<UpdateOutcome> {
        if !self.is_editing(id) {
            return Err(ListError::InvalidOperation(format!("record {} is not in edition", id)));
        }
        let column = config
            .column(field)
            .ok_or_else(|| ListError::UnknownField(field.to_string()))?;
        let record = tree.require_record_mut(id)?;
        if !column.is_editable_for(&record.values) {
            return Err(ListError::ReadonlyField(field.to_string()));
        }
        self.field = Some(field.to_string());

        let targets = match &self.mode {
            EditMode::Multi { targets, .. } => targets.clone(),
            _ => {
                record.set_value(field, value);
                match field_error(config, column, &record.values) {
                    Some(kind) => record.errors.insert(field.to_string(), kind),
                    None => record.errors.remove(field),
                };
                return Ok(UpdateOutcome::Staged);
            }
        };

        // Multi-edit: stage on the anchor and propose for the selection
        self.cancel_proposal(tree);
        let valid_ids: Vec<RecordId> = targets
            .iter()
            .copied()
            .filter(|target| {
                tree.record(*target).is_some_and(|r| {
                    if !column.is_editable_for(&r.values) {
                        return false;
                    }
                    let mut values = r.values.clone();
                    values.insert(field.to_string(), value.clone());
                    field_error(config, column, &values).is_none()
                })
            })
            .collect();

        if !valid_ids.contains(&id) {
            let kind = {
                let record = tree.require_record(id)?;
                let mut values = record.values.clone();
                values.insert(field.to_string(), value.clone());
                field_error(config, column, &values).unwrap_or(FieldErrorKind::InvalidFormat)
            };
            return Err(ListError::Validation(ValidationFailure {
                record: id,
                fields: vec![(field.to_string(), kind)],
            }));
        }

        tree.require_record_mut(id)?.set_value(field, value.clone());
        let proposal = MultiEditProposal {
            field: field.to_string(),
            value,
            anchor: id,
            valid_ids,
            total: targets.len(),
        };
        tracing::debug!(field, valid = proposal.valid_ids.len(), total = proposal.total, "Multi-edit proposal");
        self.proposal = Some(proposal.clone());
        Ok(UpdateOutcome::NeedsConfirmation(proposal))
    }

    /// Apply the pending multi-edit change to every valid record
    pub fn confirm(&mut self, tree: &mut RecordTree) -> ListResult<SavePlan> {
        let proposal = self
            .proposal
            .take()
            .ok_or_else(|| ListError::InvalidOperation("no multi-edit change to confirm".into()))?;
        for id in &proposal.valid_ids {
            if let Some(record) = tree.record_mut(*id) {
                record.set_value(&proposal.field, proposal.value.clone());
            }
        }
        self.exit();
        let mut patch = RecordValues::new();
        patch.insert(proposal.field, proposal.value);
        Ok(SavePlan {
            ids: proposal.valid_ids,
            patch,
        })
    }

    /// Drop the pending multi-edit change; the anchor gets its value back
    pub fn cancel(&mut self, tree: &mut RecordTree) {
        self.cancel_proposal(tree);
        self.exit();
    }

    fn cancel_proposal(&mut self, tree: &mut RecordTree) {
        if let Some(proposal) = self.proposal.take()
            && let Some(record) = tree.record_mut(proposal.anchor)
        {
            record.revert_fields(std::iter::once(&proposal.field));
        }
    }

    /// Record a successful write. Returns `(old, new)` id pairs of created rows.
    pub fn commit(
        &mut self,
        tree: &mut RecordTree,
        plan: &SavePlan,
        saved_ids: &[RecordId],
    ) -> ListResult<Vec<(RecordId, RecordId)>> {
        let mut renamed = Vec::new();
        for (i, id) in plan.ids.iter().enumerate() {
            let Some(record) = tree.record_mut(*id) else {
                continue;
            };
            record.commit(&plan.patch);
            let new_id = saved_ids.get(i).copied().unwrap_or(*id);
            if new_id != *id {
                tree.replace_record_id(*id, new_id)?;
                if self.is_editing(*id) {
                    self.mode = EditMode::Single(new_id);
                }
                renamed.push((*id, new_id));
            }
        }
        Ok(renamed)
    }

    pub fn fail(&mut self, plan: SavePlan, error: GridError) {
        self.failed_writes.push(FailedWrite { plan, error });
    }

    /// The user dismissed the write error dialog: revert the rejected changes.
    ///
    /// Returns the ids of rejected new rows, which are dropped.
    pub fn acknowledge_failures(&mut self, tree: &mut RecordTree) -> ListResult<Vec<RecordId>> {
        let mut removed = Vec::new();
        for failed in std::mem::take(&mut self.failed_writes) {
            for id in &failed.plan.ids {
                let Some(record) = tree.record_mut(*id) else {
                    continue;
                };
                if record.is_new {
                    tree.remove_record(*id)?;
                    removed.push(*id);
                } else {
                    record.revert_fields(failed.plan.patch.keys());
                }
                if self.is_editing(*id) {
                    self.exit();
                }
            }
        }
        Ok(removed)
    }

    /// Forget everything (the tree was rebuilt)
    pub fn reset(&mut self) {
        self.exit();
        self.proposal = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::{GroupKey, InsertPosition};
    use gridkit_core::{Condition, Editable, FieldKind, Modifier, RecordData};
    use pretty_assertions::assert_eq;

    fn config() -> ViewConfig {
        ViewConfig::new(
            "foo",
            vec![
                ColumnSpec::new("foo", FieldKind::Char).required(),
                ColumnSpec::new("int_field", FieldKind::Integer),
                ColumnSpec::new("date", FieldKind::Date).readonly(),
            ],
        )
        .with_editable(Editable::Bottom)
    }

    fn tree() -> RecordTree {
        let mut tree = RecordTree::new(Vec::new(), 80, 80);
        tree.apply_records(
            &GroupKey::root(),
            0,
            vec![
                RecordData::new(1, [("foo", Value::from("yop")), ("int_field", Value::Integer(10))]),
                RecordData::new(2, [("foo", Value::from("blip")), ("int_field", Value::Integer(9))]),
                RecordData::new(3, [("foo", Value::from("gnap")), ("int_field", Value::Integer(17))]),
            ],
            Some(3),
            10_000,
        )
        .unwrap();
        tree
    }

    #[test]
    fn test_leave_plans_save_of_dirty_fields() {
        let config = config();
        let mut tree = tree();
        let mut edit = EditController::new();
        edit.enter(&tree, &config, RecordId(1), Some("int_field"), &BTreeSet::new())
            .unwrap();
        assert_eq!(edit.active_field(), Some("int_field"));

        edit.update_field(&mut tree, &config, RecordId(1), "int_field", Value::Integer(11))
            .unwrap();
        let outcome = edit.leave(&mut tree, &config).unwrap();
        assert_eq!(
            outcome,
            LeaveOutcome::Save(SavePlan {
                ids: vec![RecordId(1)],
                patch: [("int_field".to_string(), Value::Integer(11))].into_iter().collect(),
            })
        );
        assert_eq!(edit.mode(), &EditMode::Readonly);
    }

    #[test]
    fn test_invalid_row_keeps_edition() {
        let config = config();
        let mut tree = tree();
        let mut edit = EditController::new();
        edit.enter(&tree, &config, RecordId(1), None, &BTreeSet::new()).unwrap();
        edit.update_field(&mut tree, &config, RecordId(1), "foo", Value::from(""))
            .unwrap();

        let err = edit.leave(&mut tree, &config).unwrap_err();
        match err {
            ListError::Validation(failure) => {
                assert_eq!(failure.field_names(), vec!["foo"]);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(edit.mode(), &EditMode::Single(RecordId(1)));
        assert_eq!(tree.record(RecordId(1)).unwrap().errors.len(), 1);
    }

    #[test]
    fn test_readonly_field_rejected() {
        let config = config();
        let mut tree = tree();
        let mut edit = EditController::new();
        edit.enter(&tree, &config, RecordId(1), Some("date"), &BTreeSet::new())
            .unwrap();
        // Readonly field requested: falls back to the first editable one
        assert_eq!(edit.active_field(), Some("foo"));
        assert_eq!(
            edit.update_field(&mut tree, &config, RecordId(1), "date", Value::Null),
            Err(ListError::ReadonlyField("date".into()))
        );
    }

    #[test]
    fn test_pristine_new_row_is_discarded_on_leave() {
        let config = config();
        let mut tree = tree();
        let id = tree
            .insert_new_record(&GroupKey::root(), InsertPosition::Bottom, RecordValues::new())
            .unwrap();
        let mut edit = EditController::new();
        edit.enter(&tree, &config, id, None, &BTreeSet::new()).unwrap();

        assert_eq!(edit.leave(&mut tree, &config).unwrap(), LeaveOutcome::Discarded(id));
        assert!(tree.record(id).is_none());
        assert_eq!(tree.root().count, 3);
    }

    #[test]
    fn test_multi_edit_proposal() {
        let mut config = config().with_multi_edit().with_editable(Editable::None);
        config.columns[1].readonly = Modifier::When(vec![Condition::eq("foo", "gnap")]);
        let mut tree = tree();
        let selection: BTreeSet<RecordId> = [RecordId(1), RecordId(2), RecordId(3)].into_iter().collect();

        let mut edit = EditController::new();
        edit.enter(&tree, &config, RecordId(1), Some("int_field"), &selection)
            .unwrap();
        let outcome = edit
            .update_field(&mut tree, &config, RecordId(1), "int_field", Value::Integer(5))
            .unwrap();
        let UpdateOutcome::NeedsConfirmation(proposal) = outcome else {
            panic!("expected a proposal");
        };
        assert_eq!(proposal.message(), "2 of 3 records are valid for this update");

        let plan = edit.confirm(&mut tree).unwrap();
        assert_eq!(plan.ids, vec![RecordId(1), RecordId(2)]);
        assert_eq!(tree.record(RecordId(2)).unwrap().get("int_field"), &Value::Integer(5));
        assert_eq!(tree.record(RecordId(3)).unwrap().get("int_field"), &Value::Integer(17));
    }

    #[test]
    fn test_cancel_multi_edit_restores_anchor() {
        let config = config().with_multi_edit();
        let mut tree = tree();
        let selection: BTreeSet<RecordId> = [RecordId(1), RecordId(2)].into_iter().collect();
        let mut edit = EditController::new();
        edit.enter(&tree, &config, RecordId(1), Some("int_field"), &selection)
            .unwrap();
        edit.update_field(&mut tree, &config, RecordId(1), "int_field", Value::Integer(5))
            .unwrap();

        edit.cancel(&mut tree);
        assert_eq!(tree.record(RecordId(1)).unwrap().get("int_field"), &Value::Integer(10));
        assert!(!tree.record(RecordId(1)).unwrap().is_dirty());
        assert_eq!(edit.mode(), &EditMode::Readonly);
    }

    #[test]
    fn test_failed_write_reverts_on_acknowledge() {
        let config = config();
        let mut tree = tree();
        let mut edit = EditController::new();
        edit.enter(&tree, &config, RecordId(2), Some("foo"), &BTreeSet::new())
            .unwrap();
        edit.update_field(&mut tree, &config, RecordId(2), "foo", Value::from("rejected"))
            .unwrap();
        let LeaveOutcome::Save(plan) = edit.leave(&mut tree, &config).unwrap() else {
            panic!("expected a save");
        };

        edit.fail(plan, GridError::Rejected("constraint".into()));
        // Nothing reverts until the dialog is dismissed
        assert_eq!(tree.record(RecordId(2)).unwrap().get("foo"), &Value::from("rejected"));
        edit.acknowledge_failures(&mut tree).unwrap();
        assert_eq!(tree.record(RecordId(2)).unwrap().get("foo"), &Value::from("blip"));
    }

    #[test]
    fn test_commit_renames_created_rows() {
        let config = config();
        let mut tree = tree();
        let id = tree
            .insert_new_record(&GroupKey::root(), InsertPosition::Bottom, RecordValues::new())
            .unwrap();
        let mut edit = EditController::new();
        edit.enter(&tree, &config, id, Some("foo"), &BTreeSet::new()).unwrap();
        edit.update_field(&mut tree, &config, id, "foo", Value::from("new"))
            .unwrap();
        let LeaveOutcome::Save(plan) = edit.leave(&mut tree, &config).unwrap() else {
            panic!("expected a save");
        };

        let renamed = edit.commit(&mut tree, &plan, &[RecordId(42)]).unwrap();
        assert_eq!(renamed, vec![(id, RecordId(42))]);
        let record = tree.record(RecordId(42)).unwrap();
        assert!(!record.is_new);
        assert!(!record.is_dirty());
        assert_eq!(tree.visible_records().last(), Some(&RecordId(42)));
    }
}
