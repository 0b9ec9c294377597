//! List state
//!
//! [`ListState`] owns every part of the list (tree, edition, selection,
//! sort, column visibility, pending requests) and applies user intents to
//! them synchronously. Work that needs the store is split in two: a
//! `begin_*`/`plan_*` step describing the request and a `finish_*` step
//! applying the response, if it is still current. The
//! [`ListController`](crate::ListController) awaits the store in between.

mod fetch;
mod keyboard;
mod render;

pub use fetch::{BulkPlan, NodeFetch, NodeQuery, NodeResponse, ResequenceStart};
pub use keyboard::{Key, KeyPlan, NextFocus};
pub use render::{CellView, HeaderView, RowView};

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use gridkit_core::{
    Domain, Editable, FieldKind, FieldName, GridError, KeyValueStore, RecordId, RecordValues,
    RpcContext, SaveRequest, SaveResponse, Value, ViewConfig,
};

use crate::column_visibility::ColumnVisibilityState;
use crate::coordinator::RequestCoordinator;
use crate::edit::{EditController, FocusOrder, FocusTarget, LeaveOutcome, SavePlan, UpdateOutcome};
use crate::error::{ListError, ListResult};
use crate::notifications::{Notification, NotificationQueue};
use crate::selection::SelectionManager;
use crate::sorting::{SortAction, SortState};
use crate::tree::{GroupKey, InsertPosition, RecordTree};

/// What a cell click leads to
#[derive(Debug, Clone, PartialEq)]
pub enum ClickStep {
    /// Button, toggle widget or non-editable list: nothing to enter
    Ignored,
    /// The row is being resequenced; the click is replayed afterwards
    Deferred,
    /// The row was already in edition; only the active field moved
    Focused,
    /// Enter edition on `record`, once `save` (the row left) is written
    Enter {
        record: RecordId,
        field: FieldName,
        save: Option<SavePlan>,
    },
}

pub struct ListState {
    config: Arc<ViewConfig>,
    domain: Domain,
    context: RpcContext,
    tree: RecordTree,
    edit: EditController,
    selection: SelectionManager,
    sort: SortState,
    coordinator: RequestCoordinator,
    columns: ColumnVisibilityState,
    notifications: NotificationQueue,
    focus: Option<FocusTarget>,
    /// Records whose resequence call has not resolved yet
    resequencing: BTreeSet<RecordId>,
    deferred_edit: Option<(RecordId, FieldName)>,
    /// Virtual ids of saved rows and the ids the store gave them
    renamed: HashMap<RecordId, RecordId>,
    /// The root only holds part of the query; its totals must be read
    totals_pending: bool,
}

impl std::fmt::Debug for ListState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListState")
            .field("model", &self.config.model)
            .field("domain", &self.domain)
            .field("group_by", &self.tree.group_by())
            .field("edit", &self.edit.mode())
            .field("selected", &self.selection.len())
            .finish()
    }
}

impl ListState {
    pub fn new(config: ViewConfig, preferences: Arc<dyn KeyValueStore>) -> ListResult<Self> {
        config
            .validate()
            .map_err(|e| ListError::Configuration(e.to_string()))?;
        let columns = ColumnVisibilityState::load(preferences, &config);
        let sort = SortState::new(config.default_order.clone());
        let tree = RecordTree::new(config.group_by.clone(), config.limit, config.groups_limit);
        Ok(Self {
            config: Arc::new(config),
            domain: Domain::all(),
            context: RpcContext::new(),
            tree,
            edit: EditController::new(),
            selection: SelectionManager::new(),
            sort,
            coordinator: RequestCoordinator::new(),
            columns,
            notifications: NotificationQueue::default(),
            focus: None,
            resequencing: BTreeSet::new(),
            deferred_edit: None,
            renamed: HashMap::new(),
            totals_pending: false,
        })
    }

    /// Initial domain, used by the first load
    pub fn with_domain(mut self, domain: Domain) -> Self {
        self.domain = domain;
        self
    }

    /// Context forwarded with every write
    pub fn with_context(mut self, context: RpcContext) -> Self {
        self.context = context;
        self
    }

    pub fn config(&self) -> &ViewConfig {
        &self.config
    }

    pub fn domain(&self) -> &Domain {
        &self.domain
    }

    pub fn tree(&self) -> &RecordTree {
        &self.tree
    }

    pub fn edit(&self) -> &EditController {
        &self.edit
    }

    pub fn selection(&self) -> &SelectionManager {
        &self.selection
    }

    pub fn sort(&self) -> &SortState {
        &self.sort
    }

    pub fn columns(&self) -> &ColumnVisibilityState {
        &self.columns
    }

    pub fn coordinator(&self) -> &RequestCoordinator {
        &self.coordinator
    }

    pub fn notifications(&self) -> &[Notification] {
        self.notifications.pending()
    }

    pub fn take_notifications(&mut self) -> Vec<Notification> {
        self.notifications.take()
    }

    pub fn focus(&self) -> Option<&FocusTarget> {
        self.focus.as_ref()
    }

    pub fn set_focus(&mut self, target: Option<FocusTarget>) {
        self.focus = target;
    }

    pub fn is_resequencing(&self, id: RecordId) -> bool {
        self.resequencing.contains(&self.resolve(id))
    }

    /// Current id of a record, following the ids given to saved new rows
    pub fn resolve(&self, id: RecordId) -> RecordId {
        let mut current = id;
        while let Some(next) = self.renamed.get(&current) {
            current = *next;
        }
        current
    }

    fn hidden_columns(&self) -> BTreeSet<FieldName> {
        self.config
            .columns
            .iter()
            .filter(|c| c.column_invisible || !self.columns.is_visible(&c.name))
            .map(|c| c.name.clone())
            .collect()
    }

    pub fn focus_order(&self) -> FocusOrder {
        FocusOrder::build(&self.tree, &self.config, &self.hidden_columns())
    }

    fn focus_edited_cell(&mut self) {
        self.focus = match (self.edit.editing_record(), self.edit.active_field()) {
            (Some(record), Some(field)) => Some(FocusTarget::Cell {
                record,
                field: field.to_string(),
            }),
            _ => None,
        };
    }

    /// A record left the tree
    fn forget_record(&mut self, id: RecordId) {
        self.selection.forget(&[id]);
        self.coordinator.forget_record(id);
        if self.focus.as_ref().and_then(FocusTarget::record) == Some(id) {
            self.focus = None;
        }
    }

    /// Reset edition if the record in edition is gone
    fn drop_stale_edit(&mut self) {
        if let Some(id) = self.edit.editing_record()
            && self.tree.record(id).is_none()
        {
            tracing::debug!(record = %id, "Record in edition was unloaded");
            self.edit.reset();
            self.focus = None;
        }
    }

    // Edition

    /// Decide what clicking a cell does
    pub fn plan_click(&mut self, id: RecordId, field: &str) -> ListResult<ClickStep> {
        let id = self.resolve(id);
        let record = self.tree.require_record(id)?;
        let column = self
            .config
            .column(field)
            .ok_or_else(|| ListError::UnknownField(field.to_string()))?;
        if column.is_button || column.editable_while_readonly {
            return Ok(ClickStep::Ignored);
        }
        let editable_here = column.is_editable_for(&record.values);
        let multi = self.config.multi_edit && self.selection.len() >= 2 && self.selection.is_selected(id);
        if !self.config.editable.is_editable() && !multi {
            self.focus = Some(FocusTarget::Cell {
                record: id,
                field: field.to_string(),
            });
            return Ok(ClickStep::Ignored);
        }
        if self.resequencing.contains(&id) {
            tracing::debug!(record = %id, field, "Deferring edition until resequence resolves");
            self.deferred_edit = Some((id, field.to_string()));
            return Ok(ClickStep::Deferred);
        }
        if self.edit.is_editing(id) {
            if editable_here {
                self.edit.set_active_field(field.to_string());
                self.focus_edited_cell();
            }
            return Ok(ClickStep::Focused);
        }

        let save = match self.leave_edition()? {
            LeaveOutcome::Save(plan) => Some(plan),
            LeaveOutcome::Nothing | LeaveOutcome::Discarded(_) => None,
        };
        Ok(ClickStep::Enter {
            record: id,
            field: field.to_string(),
            save,
        })
    }

    /// Put a row in edition (after the previous one was left)
    pub fn enter_edit(&mut self, id: RecordId, field: Option<&str>) -> ListResult<()> {
        let id = self.resolve(id);
        let selected = self.selection.selected_ids().clone();
        self.edit
            .enter(&self.tree, &self.config, id, field, &selected)?;
        self.focus_edited_cell();
        Ok(())
    }

    /// Leave the row in edition.
    ///
    /// An invalid row stays in edition and a warning is raised.
    pub fn leave_edition(&mut self) -> ListResult<LeaveOutcome> {
        match self.edit.leave(&mut self.tree, &self.config) {
            Ok(LeaveOutcome::Discarded(id)) => {
                self.forget_record(id);
                Ok(LeaveOutcome::Discarded(id))
            }
            Ok(outcome) => Ok(outcome),
            Err(ListError::Validation(failure)) => {
                self.notifications.push(Notification::warning(format!(
                    "Invalid fields: {}",
                    failure.field_names().join(", ")
                )));
                Err(ListError::Validation(failure))
            }
            Err(e) => Err(e),
        }
    }

    /// Escape: drop the changes of the row in edition
    pub fn discard_edition(&mut self) -> ListResult<()> {
        if let Some(removed) = self.edit.discard(&mut self.tree)? {
            self.forget_record(removed);
        }
        Ok(())
    }

    pub fn update_field(&mut self, id: RecordId, field: &str, value: Value) -> ListResult<UpdateOutcome> {
        let id = self.resolve(id);
        let outcome = self
            .edit
            .update_field(&mut self.tree, &self.config, id, field, value)?;
        self.focus_edited_cell();
        Ok(outcome)
    }

    pub fn confirm_multi_edit(&mut self) -> ListResult<SavePlan> {
        let plan = self.edit.confirm(&mut self.tree)?;
        self.focus = None;
        Ok(plan)
    }

    pub fn cancel_multi_edit(&mut self) {
        self.edit.cancel(&mut self.tree);
        self.focus = None;
    }

    fn default_values(&self) -> RecordValues {
        let booleans: Vec<FieldName> = self
            .config
            .columns
            .iter()
            .filter(|c| c.kind == FieldKind::Boolean)
            .map(|c| c.name.clone())
            .collect();
        RecordTree::default_values(&self.config.field_names(), &booleans)
    }

    fn insert_position(&self) -> ListResult<InsertPosition> {
        match self.config.editable {
            Editable::Top => Ok(InsertPosition::Top),
            Editable::Bottom => Ok(InsertPosition::Bottom),
            Editable::None => Err(ListError::NotEditable),
        }
    }

    /// Create a new row in `parent` (the root when ungrouped) and edit it.
    ///
    /// The row in edition must have been left already.
    pub fn add_new_row(&mut self, parent: Option<GroupKey>) -> ListResult<RecordId> {
        let position = self.insert_position()?;
        let parent = match parent {
            Some(key) => key,
            None if !self.tree.is_grouped() => GroupKey::root(),
            None => {
                return Err(ListError::InvalidOperation(
                    "a group is required to add a record to a grouped list".into(),
                ));
            }
        };
        self.insert_and_edit(parent, position, self.default_values())
    }

    /// Create a new row with some values already set.
    ///
    /// In a grouped list the row goes to the deepest loaded group matching
    /// the values; without one nothing is created.
    pub fn add_new_row_with_values(&mut self, values: RecordValues) -> ListResult<RecordId> {
        let position = self.insert_position()?;
        let mut merged = self.default_values();
        merged.extend(values);
        let Some(parent) = self.tree.find_group_for(&merged) else {
            self.notifications.push(Notification::warning(
                "The new record does not belong to any displayed group",
            ));
            return Err(ListError::NoMatchingGroup);
        };
        self.insert_and_edit(parent, position, merged)
    }

    fn insert_and_edit(
        &mut self,
        parent: GroupKey,
        position: InsertPosition,
        values: RecordValues,
    ) -> ListResult<RecordId> {
        if let Some(current) = self.edit.editing_record() {
            return Err(ListError::InvalidOperation(format!(
                "record {} is still in edition",
                current
            )));
        }
        let id = self.tree.insert_new_record(&parent, position, values)?;
        self.edit
            .enter(&self.tree, &self.config, id, None, &BTreeSet::new())?;
        self.focus_edited_cell();
        tracing::debug!(record = %id, group = %parent, "Added new row");
        Ok(id)
    }

    /// Force-write a toggle widget outside edition.
    ///
    /// When the row is part of a selection, every selected row that accepts
    /// the value gets it. Unsaved rows only change locally.
    pub fn plan_toggle(&mut self, id: RecordId, field: &str, value: Value) -> ListResult<Option<SavePlan>> {
        let id = self.resolve(id);
        let column = self
            .config
            .column(field)
            .ok_or_else(|| ListError::UnknownField(field.to_string()))?
            .clone();
        if !column.editable_while_readonly {
            return Err(ListError::ReadonlyField(field.to_string()));
        }
        let record = self.tree.require_record(id)?;
        if column.is_readonly(&record.values) {
            return Err(ListError::ReadonlyField(field.to_string()));
        }

        let candidates: Vec<RecordId> = if self.selection.is_selected(id) && self.selection.len() >= 2 {
            self.selection.selected_ids().iter().copied().collect()
        } else {
            vec![id]
        };
        let mut targets = Vec::with_capacity(candidates.len());
        for target in candidates {
            let Some(record) = self.tree.record_mut(target) else {
                continue;
            };
            if column.is_readonly(&record.values) {
                continue;
            }
            record.set_value(field, value.clone());
            if !record.is_new {
                targets.push(target);
            }
        }
        if targets.is_empty() {
            return Ok(None);
        }
        let mut patch = RecordValues::new();
        patch.insert(field.to_string(), value);
        Ok(Some(SavePlan { ids: targets, patch }))
    }

    /// The user dismissed the write error dialog
    pub fn acknowledge_errors(&mut self) -> ListResult<()> {
        let removed = self.edit.acknowledge_failures(&mut self.tree)?;
        for id in removed {
            self.forget_record(id);
        }
        self.drop_stale_edit();
        Ok(())
    }

    // Saving

    /// Locks to hold while writing these records, in a fixed order
    pub fn save_locks(&mut self, ids: &[RecordId]) -> Vec<Arc<tokio::sync::Mutex<()>>> {
        let mut ids: Vec<RecordId> = ids.to_vec();
        ids.sort();
        ids.dedup();
        ids.into_iter()
            .map(|id| self.coordinator.save_lock(id))
            .collect()
    }

    pub fn save_request(&self, plan: &SavePlan) -> SaveRequest {
        SaveRequest {
            model: self.config.model.clone(),
            ids: plan.ids.iter().map(|id| self.resolve(*id)).collect(),
            patch: plan.patch.clone(),
            context: self.context.clone(),
        }
    }

    /// Apply the outcome of a write
    pub fn finish_save(&mut self, plan: SavePlan, result: Result<SaveResponse, GridError>) -> ListResult<()> {
        let plan = SavePlan {
            ids: plan.ids.iter().map(|id| self.resolve(*id)).collect(),
            patch: plan.patch,
        };
        match result {
            Ok(response) => {
                let renamed = self.edit.commit(&mut self.tree, &plan, &response.ids)?;
                for (old, new) in renamed {
                    self.selection.rename(old, new);
                    self.renamed.insert(old, new);
                    if let Some(FocusTarget::Cell { record, .. }) = &mut self.focus
                        && *record == old
                    {
                        *record = new;
                    }
                    self.coordinator.forget_record(old);
                }
                if self.tree.totals().is_some() {
                    self.totals_pending = true;
                }
                tracing::info!(model = %self.config.model, records = plan.ids.len(), "Saved records");
                Ok(())
            }
            Err(error) => {
                tracing::warn!(model = %self.config.model, error = %error, "Write rejected");
                self.notifications
                    .push(Notification::dialog("Validation Error", error.to_string()));
                self.edit.fail(plan, error.clone());
                Err(ListError::RemoteWrite(error))
            }
        }
    }

    // Selection

    pub fn toggle_selection(&mut self, id: RecordId) -> ListResult<bool> {
        let id = self.resolve(id);
        if self.tree.require_record(id)?.is_new {
            return Err(ListError::InvalidOperation("unsaved rows cannot be selected".into()));
        }
        Ok(self.selection.toggle(id))
    }

    fn selectable_records(&self) -> Vec<RecordId> {
        self.tree
            .visible_records()
            .into_iter()
            .filter(|id| !id.is_virtual())
            .collect()
    }

    /// Select every row of the page and of the open groups, or clear
    pub fn toggle_all(&mut self) {
        let loaded = self.selectable_records();
        self.selection.toggle_all(&loaded);
    }

    pub fn can_select_domain(&self) -> bool {
        self.selection
            .can_select_domain(&self.selectable_records(), self.tree.root().count)
    }

    pub fn select_domain(&mut self) -> bool {
        let loaded = self.selectable_records();
        self.selection.select_domain(&loaded, self.tree.root().count)
    }

    pub fn clear_selection(&mut self) {
        self.selection.clear();
    }

    // Groups

    /// Close a group, dropping its records (and their selection)
    pub fn close_group(&mut self, key: &GroupKey) -> ListResult<()> {
        self.coordinator.cancel_subtree(key);
        let removed = self.tree.close(key)?;
        for id in &removed {
            self.forget_record(*id);
        }
        self.drop_stale_edit();
        tracing::debug!(group = %key, records = removed.len(), "Closed group");
        Ok(())
    }

    /// Groups whose header buttons are visible for the group values
    pub fn group_header_buttons(&self, key: &GroupKey) -> ListResult<Vec<&str>> {
        let group = self
            .tree
            .group(key)
            .ok_or_else(|| ListError::GroupNotFound(key.to_string()))?;
        let values = group.header_values();
        Ok(self
            .config
            .header_buttons
            .iter()
            .filter(|button| button.visible_when.iter().all(|c| c.matches(&values)))
            .map(|button| button.name.as_str())
            .collect())
    }

    // Sorting

    /// Apply a header click. Records of open groups are sorted in place when
    /// the sort cannot be delegated to the store.
    pub fn click_header(&mut self, field: &str) -> ListResult<SortAction> {
        let action = self.sort.click_header(&self.config, &self.tree, field)?;
        if let SortAction::SortLoadedRecords(groups) = &action {
            for key in groups {
                self.sort_loaded_records(key)?;
            }
        }
        Ok(action)
    }

    fn sort_loaded_records(&mut self, key: &GroupKey) -> ListResult<()> {
        let mut ids = self.tree.children_records(key);
        let tree = &self.tree;
        let sort = &self.sort;
        ids.sort_by(|a, b| match (tree.record(*a), tree.record(*b)) {
            (Some(a), Some(b)) => sort.compare(&a.values, &b.values),
            _ => std::cmp::Ordering::Equal,
        });
        self.tree.set_record_order(key, &ids)
    }

    // Optional columns

    pub fn toggle_optional_column(&mut self, field: &str) -> ListResult<bool> {
        self.columns
            .toggle_column(field)
            .ok_or_else(|| ListError::UnknownField(field.to_string()))
    }
}
