//! Keyboard navigation
//!
//! In edition, Tab and Shift-Tab walk the editable cells of the focus order,
//! Enter and the arrows move to the same field of the adjacent row. Moving
//! to another row leaves the current one first, with the usual validation
//! and save. Outside edition the keys move the focus and Enter activates
//! the focused target.

use gridkit_core::{Editable, FieldName, RecordId};

use super::ListState;
use crate::edit::{FocusOrder, FocusTarget, LeaveOutcome, SavePlan};
use crate::error::ListResult;
use crate::tree::GroupKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Enter,
    Escape,
    Tab,
    ShiftTab,
    ArrowUp,
    ArrowDown,
}

/// Where edition continues once the current row is left
#[derive(Debug, Clone, PartialEq)]
pub enum NextFocus {
    Readonly,
    Cell {
        record: RecordId,
        field: Option<FieldName>,
    },
    /// Create a new row in the group and edit it
    NewRow(GroupKey),
}

/// What a key press leads to
#[derive(Debug, Clone, PartialEq)]
pub enum KeyPlan {
    /// Handled locally
    Done,
    /// The row in edition was left; write `save`, then go to `next`
    Leave {
        save: Option<SavePlan>,
        next: NextFocus,
    },
    /// Enter on a focused cell outside edition
    Click { record: RecordId, field: FieldName },
    /// Enter on an "add a line" link
    AddRow(GroupKey),
    /// Enter on a group header
    ToggleGroup(GroupKey),
}

impl ListState {
    pub fn plan_key(&mut self, key: Key) -> ListResult<KeyPlan> {
        let Some(record) = self.edit.editing_record() else {
            return Ok(self.plan_readonly_key(key));
        };
        let field = self.edit.active_field().map(String::from);
        let order = self.focus_order();

        match key {
            Key::Escape => {
                self.discard_edition()?;
                self.focus = None;
                Ok(KeyPlan::Done)
            }
            Key::Tab => {
                if let Some(field) = &field
                    && !order.is_last_cell(record, field)
                    && let Some((_, next)) = order.next_cell(record, field)
                {
                    self.edit.set_active_field(next);
                    self.focus_edited_cell();
                    return Ok(KeyPlan::Done);
                }
                if self.creates_row_after(record) {
                    return self.leave_for_new_row(record);
                }
                let next = match &field {
                    Some(field) => order.next_cell(record, field),
                    None => None,
                }
                .map(|(record, field)| NextFocus::Cell {
                    record,
                    field: Some(field),
                })
                .or_else(|| first_cell(&order))
                .unwrap_or(NextFocus::Readonly);
                self.leave_to(next)
            }
            Key::ShiftTab => {
                if let Some(field) = &field
                    && !order.is_first_cell(record, field)
                    && let Some((_, previous)) = order.previous_cell(record, field)
                {
                    self.edit.set_active_field(previous);
                    self.focus_edited_cell();
                    return Ok(KeyPlan::Done);
                }
                let next = match &field {
                    Some(field) => order.previous_cell(record, field),
                    None => None,
                }
                .map(|(record, field)| NextFocus::Cell {
                    record,
                    field: Some(field),
                })
                .unwrap_or(NextFocus::Readonly);
                self.leave_to(next)
            }
            Key::Enter => {
                if self.creates_row_after(record) {
                    return self.leave_for_new_row(record);
                }
                let next = match order.adjacent_record(record, true) {
                    Some(next) => NextFocus::Cell { record: next, field },
                    None => NextFocus::Readonly,
                };
                self.leave_to(next)
            }
            Key::ArrowDown | Key::ArrowUp => {
                match order.adjacent_record(record, key == Key::ArrowDown) {
                    Some(next) => self.leave_to(NextFocus::Cell { record: next, field }),
                    None => Ok(KeyPlan::Done),
                }
            }
        }
    }

    fn plan_readonly_key(&mut self, key: Key) -> KeyPlan {
        let order = self.focus_order();
        let targets = order.targets();
        if targets.is_empty() {
            return KeyPlan::Done;
        }
        let position = self.focus.as_ref().and_then(|f| order.position(f));
        let step = |forward: bool| -> FocusTarget {
            let index = match (position, forward) {
                (None, _) => 0,
                (Some(i), true) => (i + 1) % targets.len(),
                (Some(0), false) => targets.len() - 1,
                (Some(i), false) => i - 1,
            };
            targets[index].clone()
        };
        match key {
            Key::Tab | Key::ArrowDown => {
                self.focus = Some(step(true));
                KeyPlan::Done
            }
            Key::ShiftTab | Key::ArrowUp => {
                self.focus = Some(step(false));
                KeyPlan::Done
            }
            Key::Escape => KeyPlan::Done,
            Key::Enter => match self.focus.clone() {
                Some(FocusTarget::Cell { record, field }) => KeyPlan::Click { record, field },
                Some(FocusTarget::AddRowLink { group }) => KeyPlan::AddRow(group),
                Some(FocusTarget::GroupHeader { group }) => KeyPlan::ToggleGroup(group),
                None => KeyPlan::Done,
            },
        }
    }

    /// Whether leaving `record` forward creates a new row: bottom-editable
    /// lists grow from their last row
    fn creates_row_after(&self, record: RecordId) -> bool {
        if self.config.editable != Editable::Bottom {
            return false;
        }
        self.tree
            .record(record)
            .is_some_and(|r| self.tree.children_records(&r.parent).last() == Some(&record))
    }

    /// Leave the last row forward.
    ///
    /// A pristine new row is dropped and focus cycles to the first row
    /// instead of piling up empty rows.
    fn leave_for_new_row(&mut self, record: RecordId) -> ListResult<KeyPlan> {
        let Some(node) = self.tree.record(record) else {
            return Ok(KeyPlan::Done);
        };
        let parent = node.parent.clone();
        let pristine_new = node.is_new && !node.is_dirty();

        let outcome = self.leave_edition()?;
        if pristine_new {
            let next = first_cell(&self.focus_order()).unwrap_or(NextFocus::Readonly);
            return Ok(KeyPlan::Leave { save: None, next });
        }
        let save = match outcome {
            LeaveOutcome::Save(plan) => Some(plan),
            LeaveOutcome::Nothing | LeaveOutcome::Discarded(_) => None,
        };
        Ok(KeyPlan::Leave {
            save,
            next: NextFocus::NewRow(parent),
        })
    }

    fn leave_to(&mut self, next: NextFocus) -> ListResult<KeyPlan> {
        let save = match self.leave_edition()? {
            LeaveOutcome::Save(plan) => Some(plan),
            LeaveOutcome::Nothing | LeaveOutcome::Discarded(_) => None,
        };
        // The target may have been the pristine row that was just dropped
        let next = match next {
            NextFocus::Cell { record, .. } if self.tree.record(record).is_none() => {
                first_cell(&self.focus_order()).unwrap_or(NextFocus::Readonly)
            }
            other => other,
        };
        Ok(KeyPlan::Leave { save, next })
    }
}

fn first_cell(order: &FocusOrder) -> Option<NextFocus> {
    order.targets().iter().find_map(|target| match target {
        FocusTarget::Cell { record, field } => Some(NextFocus::Cell {
            record: *record,
            field: Some(field.clone()),
        }),
        _ => None,
    })
}
