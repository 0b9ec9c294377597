//! List controller
//!
//! Async entry points for user intents. Each one plans its work on the
//! [`ListState`] under the lock, awaits the store with the lock released,
//! then hands the response back to the state. Responses that were
//! superseded in the meantime are dropped by the state.

use std::collections::VecDeque;
use std::sync::Arc;

use gridkit_core::{Domain, FieldName, GridError, RecordId, RecordValues, RemoteStore, Value};
use parking_lot::{Mutex, MutexGuard};

use crate::coordinator::FetchKind;
use crate::edit::{FocusTarget, LeaveOutcome, SavePlan, UpdateOutcome};
use crate::error::{ListError, ListResult};
use crate::notifications::Notification;
use crate::sorting::SortAction;
use crate::state::{BulkPlan, ClickStep, Key, KeyPlan, ListState, NextFocus, NodeFetch, NodeQuery, NodeResponse};
use crate::tree::{GroupKey, PageJump};

/// Drives a [`ListState`] against a [`RemoteStore`]
///
/// Cloning is cheap; clones share the same state.
#[derive(Clone)]
pub struct ListController {
    store: Arc<dyn RemoteStore>,
    state: Arc<Mutex<ListState>>,
}

impl std::fmt::Debug for ListController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListController")
            .field("state", &*self.state.lock())
            .finish()
    }
}

impl ListController {
    pub fn new(store: Arc<dyn RemoteStore>, state: ListState) -> Self {
        Self {
            store,
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// Lock the state for reading or synchronous changes.
    ///
    /// Do not hold the guard across an await.
    pub fn state(&self) -> MutexGuard<'_, ListState> {
        self.state.lock()
    }

    pub fn take_notifications(&self) -> Vec<Notification> {
        self.state.lock().take_notifications()
    }

    // Loading

    /// First load of the list
    #[tracing::instrument(skip(self))]
    pub async fn load(&self) -> ListResult<()> {
        self.run_reload(None, None).await
    }

    /// Reload with the current query
    #[tracing::instrument(skip(self))]
    pub async fn reload(&self) -> ListResult<()> {
        self.run_reload(None, None).await
    }

    /// Switch to another domain; the sort goes back to the view default
    #[tracing::instrument(skip(self))]
    pub async fn set_domain(&self, domain: Domain) -> ListResult<()> {
        self.run_reload(Some(domain), None).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn set_group_by(&self, group_by: Vec<FieldName>) -> ListResult<()> {
        self.run_reload(None, Some(group_by)).await
    }

    async fn run_reload(&self, domain: Option<Domain>, group_by: Option<Vec<FieldName>>) -> ListResult<()> {
        self.leave_edition().await?;
        let fetch = self.state.lock().begin_reload(domain, group_by);
        self.run_fetches(fetch).await
    }

    async fn execute(&self, query: &NodeQuery) -> Result<NodeResponse, GridError> {
        match query {
            NodeQuery::Groups(request) => self
                .store
                .read_group(request.clone())
                .await
                .map(NodeResponse::Groups),
            NodeQuery::Records(request) => self
                .store
                .search_read(request.clone())
                .await
                .map(NodeResponse::Records),
            NodeQuery::Count { model, domain } => self
                .store
                .search_count(model, domain)
                .await
                .map(NodeResponse::Count),
            NodeQuery::Totals(request) => self
                .store
                .read_group(request.clone())
                .await
                .map(NodeResponse::Totals),
        }
    }

    /// Run a fetch and every load it leads to (reopened subgroups, totals)
    async fn run_fetches(&self, first: NodeFetch) -> ListResult<()> {
        let mut queue = VecDeque::from([first]);
        loop {
            let fetch = match queue.pop_front() {
                Some(fetch) => fetch,
                None => {
                    let totals = self.state.lock().begin_totals_fetch();
                    match totals {
                        Some(fetch) => fetch,
                        None => break,
                    }
                }
            };
            let response = self.execute(&fetch.query).await;
            let follow_ups = self.state.lock().finish_node_fetch(fetch, response)?;
            for key in follow_ups {
                let next = self
                    .state
                    .lock()
                    .begin_node_fetch(&key, FetchKind::Reload, Some(0));
                match next {
                    Ok(fetch) => queue.push_back(fetch),
                    Err(e) => tracing::debug!(group = %key, error = %e, "Skipping follow-up load"),
                }
            }
        }
        self.state.lock().prune_selection();
        Ok(())
    }

    // Groups

    #[tracing::instrument(skip(self))]
    pub async fn open_group(&self, key: GroupKey) -> ListResult<()> {
        let fetch = self.state.lock().open_group(&key)?;
        self.run_fetches(fetch).await
    }

    /// Close a group; the row in edition is left first if it lives there
    #[tracing::instrument(skip(self))]
    pub async fn close_group(&self, key: GroupKey) -> ListResult<()> {
        let editing_inside = {
            let state = self.state.lock();
            state
                .edit()
                .editing_record()
                .and_then(|id| state.tree().record(id))
                .is_some_and(|r| r.parent.is_within(&key))
        };
        if editing_inside {
            self.leave_edition().await?;
        }
        self.state.lock().close_group(&key)
    }

    pub async fn toggle_group(&self, key: GroupKey) -> ListResult<()> {
        let is_open = self.state.lock().tree().group(&key).is_some_and(|g| g.is_open);
        if is_open {
            self.close_group(key).await
        } else {
            self.open_group(key).await
        }
    }

    // Paging

    #[tracing::instrument(skip(self))]
    pub async fn next_page(&self, key: GroupKey) -> ListResult<()> {
        let offset = self
            .state
            .lock()
            .tree()
            .group(&key)
            .and_then(|g| g.pager.next_offset());
        match offset {
            Some(offset) => self.load_window(key, offset).await,
            None => Ok(()),
        }
    }

    #[tracing::instrument(skip(self))]
    pub async fn previous_page(&self, key: GroupKey) -> ListResult<()> {
        let offset = self
            .state
            .lock()
            .tree()
            .group(&key)
            .and_then(|g| g.pager.previous_offset());
        match offset {
            Some(offset) => self.load_window(key, offset).await,
            None => Ok(()),
        }
    }

    /// Jump to an offset. Past an estimated count the exact count is
    /// fetched first and the offset clamped to the last page.
    #[tracing::instrument(skip(self))]
    pub async fn jump_to(&self, key: GroupKey, offset: usize) -> ListResult<()> {
        let jump = self.state.lock().plan_jump(&key, offset)?;
        let offset = match jump {
            PageJump::Direct(offset) => offset,
            PageJump::NeedsExactCount(offset) => {
                self.fetch_exact_count(key.clone()).await?;
                let clamped = self.state.lock().plan_jump(&key, offset)?;
                match clamped {
                    PageJump::Direct(offset) | PageJump::NeedsExactCount(offset) => offset,
                }
            }
        };
        self.load_window(key, offset).await
    }

    async fn load_window(&self, key: GroupKey, offset: usize) -> ListResult<()> {
        self.leave_edition().await?;
        let fetch = self
            .state
            .lock()
            .begin_node_fetch(&key, FetchKind::Window, Some(offset))?;
        self.run_fetches(fetch).await
    }

    /// Replace an estimated count ("10000+") by the exact one
    #[tracing::instrument(skip(self))]
    pub async fn fetch_exact_count(&self, key: GroupKey) -> ListResult<()> {
        let fetch = self
            .state
            .lock()
            .begin_node_fetch(&key, FetchKind::Count, None)?;
        self.run_fetches(fetch).await
    }

    // Sorting

    #[tracing::instrument(skip(self))]
    pub async fn click_header(&self, field: &str) -> ListResult<()> {
        self.leave_edition().await?;
        let action = self.state.lock().click_header(field)?;
        match action {
            SortAction::Refetch | SortAction::RefetchGroups => {
                let fetch = self
                    .state
                    .lock()
                    .begin_node_fetch(&GroupKey::root(), FetchKind::Reload, None)?;
                self.run_fetches(fetch).await
            }
            SortAction::SortLoadedRecords(_) => Ok(()),
        }
    }

    // Edition

    /// Click a cell. Returns the focus afterwards.
    #[tracing::instrument(skip(self))]
    pub async fn click_cell(&self, id: RecordId, field: &str) -> ListResult<Option<FocusTarget>> {
        let step = self.state.lock().plan_click(id, field)?;
        if let ClickStep::Enter { record, field, save } = step {
            if let Some(plan) = save {
                self.run_save(plan).await?;
            }
            self.state.lock().enter_edit(record, Some(&field))?;
        }
        Ok(self.state.lock().focus().cloned())
    }

    /// Change a value of the row in edition
    #[tracing::instrument(skip(self))]
    pub fn update_field(&self, id: RecordId, field: &str, value: Value) -> ListResult<UpdateOutcome> {
        self.state.lock().update_field(id, field, value)
    }

    /// Write the confirmed multi-edit change to every valid record
    #[tracing::instrument(skip(self))]
    pub async fn confirm_multi_edit(&self) -> ListResult<()> {
        let plan = self.state.lock().confirm_multi_edit()?;
        self.run_save(plan).await
    }

    pub fn cancel_multi_edit(&self) {
        self.state.lock().cancel_multi_edit();
    }

    /// Leave the row in edition, writing it when dirty
    #[tracing::instrument(skip(self))]
    pub async fn leave_edition(&self) -> ListResult<()> {
        let outcome = self.state.lock().leave_edition()?;
        if let LeaveOutcome::Save(plan) = outcome {
            self.run_save(plan).await?;
        }
        Ok(())
    }

    /// Escape
    pub fn discard_edition(&self) -> ListResult<()> {
        self.state.lock().discard_edition()
    }

    /// Handle a key press. Returns the focus afterwards.
    #[tracing::instrument(skip(self))]
    pub async fn press_key(&self, key: Key) -> ListResult<Option<FocusTarget>> {
        let plan = self.state.lock().plan_key(key)?;
        match plan {
            KeyPlan::Done => {}
            KeyPlan::Leave { save, next } => {
                if let Some(plan) = save {
                    self.run_save(plan).await?;
                }
                match next {
                    NextFocus::Readonly => {}
                    NextFocus::Cell { record, field } => {
                        self.state.lock().enter_edit(record, field.as_deref())?;
                    }
                    NextFocus::NewRow(parent) => {
                        self.state.lock().add_new_row(Some(parent))?;
                    }
                }
            }
            KeyPlan::Click { record, field } => {
                self.click_cell(record, &field).await?;
            }
            KeyPlan::AddRow(parent) => {
                self.add_record(Some(parent)).await?;
            }
            KeyPlan::ToggleGroup(key) => self.toggle_group(key).await?,
        }
        Ok(self.state.lock().focus().cloned())
    }

    /// "Add a line": leave the current row, then create and edit a new one
    #[tracing::instrument(skip(self))]
    pub async fn add_record(&self, group: Option<GroupKey>) -> ListResult<RecordId> {
        self.leave_edition().await?;
        self.state.lock().add_new_row(group)
    }

    /// Create a row with preset values in the group they belong to
    #[tracing::instrument(skip(self))]
    pub async fn add_record_with_values(&self, values: RecordValues) -> ListResult<RecordId> {
        self.leave_edition().await?;
        self.state.lock().add_new_row_with_values(values)
    }

    /// Write a toggle widget without entering edition
    #[tracing::instrument(skip(self))]
    pub async fn toggle_field(&self, id: RecordId, field: &str, value: Value) -> ListResult<()> {
        let plan = self.state.lock().plan_toggle(id, field, value)?;
        match plan {
            Some(plan) => self.run_save(plan).await,
            None => Ok(()),
        }
    }

    /// Dismiss the write error dialog; rejected changes are reverted
    pub fn acknowledge_error(&self) -> ListResult<()> {
        self.state.lock().acknowledge_errors()
    }

    /// Reread the totals of the query if a root load or a write made them stale
    async fn refresh_totals(&self) -> ListResult<()> {
        let Some(fetch) = self.state.lock().begin_totals_fetch() else {
            return Ok(());
        };
        let response = self.execute(&fetch.query).await;
        self.state.lock().finish_node_fetch(fetch, response).map(|_| ())
    }

    async fn run_save(&self, plan: SavePlan) -> ListResult<()> {
        self.write(plan).await?;
        if let Err(error) = self.refresh_totals().await {
            tracing::debug!(error = %error, "Totals left stale after save");
        }
        Ok(())
    }

    /// Write a plan while holding the save lock of every record in it
    async fn write(&self, plan: SavePlan) -> ListResult<()> {
        let locks = self.state.lock().save_locks(&plan.ids);
        let mut guards = Vec::with_capacity(locks.len());
        for lock in locks {
            guards.push(lock.lock_owned().await);
        }
        let request = self.state.lock().save_request(&plan);
        tracing::debug!(model = %request.model, ids = ?request.ids, "Saving");
        let result = self.store.save(request).await;
        let outcome = self.state.lock().finish_save(plan, result);
        drop(guards);
        outcome
    }

    // Selection

    pub fn toggle_selection(&self, id: RecordId) -> ListResult<bool> {
        self.state.lock().toggle_selection(id)
    }

    pub fn toggle_all(&self) {
        self.state.lock().toggle_all();
    }

    pub fn select_domain(&self) -> bool {
        self.state.lock().select_domain()
    }

    pub fn clear_selection(&self) {
        self.state.lock().clear_selection();
    }

    /// Archive (or unarchive) the selected records.
    ///
    /// Returns the number of records written.
    #[tracing::instrument(skip(self))]
    pub async fn archive_selected(&self, archive: bool) -> ListResult<usize> {
        self.leave_edition().await?;
        let bulk = self.state.lock().plan_bulk()?;
        let (ids, whole_domain) = match bulk {
            BulkPlan::Ready(ids) => (ids, false),
            BulkPlan::ResolveDomain { request, count } => {
                let response = self
                    .store
                    .search_read(request)
                    .await
                    .map_err(ListError::RemoteRead)?;
                let ids = self.state.lock().resolve_domain_ids(count, response);
                (ids, true)
            }
        };
        let written = ids.len();
        let plan = self.state.lock().archive_plan(ids.clone(), archive);
        self.write(plan).await?;
        tracing::info!(records = written, archive, "Archived selection");

        if whole_domain {
            return self.reload().await.map(|()| written);
        }
        let refetch = self.state.lock().finish_archive(&ids)?;
        for key in refetch {
            let fetch = self
                .state
                .lock()
                .begin_node_fetch(&key, FetchKind::Reload, None)?;
            self.run_fetches(fetch).await?;
        }
        self.refresh_totals().await?;
        Ok(written)
    }

    // Reordering

    /// Drop `moved` before `before` (or at the end)
    #[tracing::instrument(skip(self))]
    pub async fn reorder(&self, moved: RecordId, before: Option<RecordId>) -> ListResult<()> {
        self.leave_edition().await?;
        let start = self.state.lock().begin_resequence(moved, before)?;
        let Some(start) = start else {
            return Ok(());
        };
        let result = self.store.resequence(start.request).await;
        let deferred = self
            .state
            .lock()
            .finish_resequence(start.ticket, start.plan, result)?;
        if let Some((record, field)) = deferred {
            self.click_cell(record, &field).await?;
        }
        Ok(())
    }

    // Optional columns

    pub fn toggle_optional_column(&self, field: &str) -> ListResult<bool> {
        self.state.lock().toggle_optional_column(field)
    }
}
