//! Store round trips of the list state: node loads, counts, bulk writes and
//! resequencing

use gridkit_core::{
    AggregateSpec, Domain, FieldName, GridError, OrderSpec, ReadGroupRequest, ReadGroupResponse,
    RecordId, RecordValues, ResequenceRequest, SearchReadRequest, SearchReadResponse, Value,
};

use super::ListState;
use crate::coordinator::{FetchKind, Scope, Ticket};
use crate::edit::SavePlan;
use crate::error::{ListError, ListResult};
use crate::notifications::Notification;
use crate::resequence::{self, ResequencePlan};
use crate::selection::BulkTarget;
use crate::tree::{GroupKey, PageJump, RecordTree};

/// Store call that loads a node
#[derive(Debug, Clone, PartialEq)]
pub enum NodeQuery {
    Groups(ReadGroupRequest),
    Records(SearchReadRequest),
    Count { model: String, domain: Domain },
    /// Ungrouped `read_group`: one group holding the totals of the query
    Totals(ReadGroupRequest),
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeResponse {
    Groups(ReadGroupResponse),
    Records(SearchReadResponse),
    Count(usize),
    Totals(ReadGroupResponse),
}

/// Query a full reload switches to once its first response arrives
#[derive(Debug, Clone, PartialEq)]
struct QuerySnapshot {
    domain: Domain,
    group_by: Vec<FieldName>,
    orders: Vec<OrderSpec>,
}

/// An issued node fetch
#[derive(Debug, Clone)]
pub struct NodeFetch {
    pub ticket: Ticket,
    pub key: GroupKey,
    pub offset: usize,
    pub query: NodeQuery,
    rebuild: Option<QuerySnapshot>,
}

impl NodeFetch {
    /// Whether applying this fetch rebuilds the whole tree
    pub fn is_reload(&self) -> bool {
        self.rebuild.is_some()
    }
}

/// Ids a bulk operation applies to
#[derive(Debug, Clone, PartialEq)]
pub enum BulkPlan {
    Ready(Vec<RecordId>),
    /// Domain selection: the ids must be searched first
    ResolveDomain {
        request: SearchReadRequest,
        count: usize,
    },
}

/// A resequence applied locally, waiting for the store
#[derive(Debug, Clone)]
pub struct ResequenceStart {
    pub ticket: Ticket,
    pub plan: ResequencePlan,
    pub request: ResequenceRequest,
}

impl ListState {
    fn aggregate_specs(&self) -> Vec<AggregateSpec> {
        self.config
            .aggregated_columns()
            .filter_map(|c| {
                c.aggregate.map(|function| AggregateSpec {
                    field: c.name.clone(),
                    function,
                })
            })
            .collect()
    }

    fn records_query(&self, domain: Domain, orders: Vec<OrderSpec>, offset: usize, limit: usize, root: bool) -> NodeQuery {
        NodeQuery::Records(SearchReadRequest {
            model: self.config.model.clone(),
            domain,
            fields: self.config.field_names(),
            order: orders,
            offset,
            limit,
            count_limit: root.then_some(self.config.count_limit),
        })
    }

    fn groups_query(&self, domain: Domain, group_by: Vec<FieldName>, offset: usize, limit: usize) -> NodeQuery {
        let order = self.sort.group_orders(&self.config, &group_by);
        NodeQuery::Groups(ReadGroupRequest {
            model: self.config.model.clone(),
            domain,
            group_by,
            aggregates: self.aggregate_specs(),
            order,
            offset,
            limit,
        })
    }

    /// Reload the whole list, optionally switching domain or grouping.
    ///
    /// Every outstanding response becomes stale. The current tree stays on
    /// display until the first response arrives; a failed reload keeps it.
    pub fn begin_reload(&mut self, domain: Option<Domain>, group_by: Option<Vec<FieldName>>) -> NodeFetch {
        let domain_changed = domain.as_ref().is_some_and(|d| d != &self.domain);
        let snapshot = QuerySnapshot {
            domain: domain.unwrap_or_else(|| self.domain.clone()),
            group_by: group_by.unwrap_or_else(|| self.tree.group_by().to_vec()),
            orders: if domain_changed {
                self.sort.default_orders().to_vec()
            } else {
                self.sort.orders().to_vec()
            },
        };

        self.coordinator.invalidate_all();
        let key = GroupKey::root();
        let query = if snapshot.group_by.is_empty() {
            self.records_query(
                snapshot.domain.clone(),
                snapshot.orders.clone(),
                0,
                self.config.limit,
                true,
            )
        } else {
            let order = snapshot
                .orders
                .iter()
                .filter(|o| {
                    snapshot.group_by.contains(&o.field)
                        || self.config.column(&o.field).is_some_and(|c| c.aggregate.is_some())
                })
                .cloned()
                .collect();
            NodeQuery::Groups(ReadGroupRequest {
                model: self.config.model.clone(),
                domain: snapshot.domain.clone(),
                group_by: snapshot.group_by.clone(),
                aggregates: self.aggregate_specs(),
                order,
                offset: 0,
                limit: self.config.groups_limit,
            })
        };
        // Reloads are never refused
        let ticket = match self.coordinator.begin_fetch(&key, FetchKind::Reload) {
            Ok(ticket) => ticket,
            Err(_) => self.coordinator.issue(Scope::Node(key.clone())),
        };
        tracing::debug!(
            model = %self.config.model,
            domain_changed,
            group_by = ?snapshot.group_by,
            "Reloading list"
        );
        NodeFetch {
            ticket,
            key,
            offset: 0,
            query,
            rebuild: Some(snapshot),
        }
    }

    /// Load the children of a node at `offset` (its current offset if `None`)
    pub fn begin_node_fetch(&mut self, key: &GroupKey, kind: FetchKind, offset: Option<usize>) -> ListResult<NodeFetch> {
        let group = self
            .tree
            .group(key)
            .ok_or_else(|| ListError::GroupNotFound(key.to_string()))?;
        if !group.is_open {
            return Err(ListError::InvalidOperation(format!("group {} is closed", key)));
        }
        let offset = offset.unwrap_or(group.pager.offset);
        let limit = group.pager.limit;
        let domain = group.domain(&self.domain);

        let query = match kind {
            FetchKind::Count => NodeQuery::Count {
                model: self.config.model.clone(),
                domain,
            },
            _ if self.tree.is_leaf(key) => {
                self.records_query(domain, self.sort.orders().to_vec(), offset, limit, key.is_root())
            }
            _ => {
                let group_by = self.tree.group_by()[key.level()..].to_vec();
                self.groups_query(domain, group_by, offset, limit)
            }
        };
        let ticket = self.coordinator.begin_fetch(key, kind)?;
        tracing::debug!(group = %key, ?kind, offset, generation = ticket.generation, "Fetching node");
        Ok(NodeFetch {
            ticket,
            key: key.clone(),
            offset,
            query,
            rebuild: None,
        })
    }

    /// Describe the totals query, if the last root load asked for one
    pub fn begin_totals_fetch(&mut self) -> Option<NodeFetch> {
        if !std::mem::take(&mut self.totals_pending) {
            return None;
        }
        let ticket = self.coordinator.issue(Scope::Totals);
        tracing::debug!(model = %self.config.model, generation = ticket.generation, "Fetching totals");
        Some(NodeFetch {
            ticket,
            key: GroupKey::root(),
            offset: 0,
            query: NodeQuery::Totals(ReadGroupRequest {
                model: self.config.model.clone(),
                domain: self.domain.clone(),
                group_by: Vec::new(),
                aggregates: self.aggregate_specs(),
                order: Vec::new(),
                offset: 0,
                limit: 1,
            }),
            rebuild: None,
        })
    }

    fn schedule_totals(&mut self) {
        let has_aggregates = self.config.aggregated_columns().next().is_some();
        self.totals_pending = self.tree.needs_totals(has_aggregates);
    }

    /// Open a group and describe the load of its first page
    pub fn open_group(&mut self, key: &GroupKey) -> ListResult<NodeFetch> {
        self.tree.open(key)?;
        self.begin_node_fetch(key, FetchKind::Reload, Some(0))
    }

    /// Where a pager jump lands
    pub fn plan_jump(&self, key: &GroupKey, offset: usize) -> ListResult<PageJump> {
        let group = self
            .tree
            .group(key)
            .ok_or_else(|| ListError::GroupNotFound(key.to_string()))?;
        Ok(group.pager.jump(offset))
    }

    /// Apply a node response.
    ///
    /// Returns the groups that must be loaded next (reopened or expanded
    /// subgroups). Stale responses are dropped without error.
    pub fn finish_node_fetch(
        &mut self,
        fetch: NodeFetch,
        response: Result<NodeResponse, GridError>,
    ) -> ListResult<Vec<GroupKey>> {
        if !self.coordinator.finish(&fetch.ticket) {
            return Ok(Vec::new());
        }
        let response = match response {
            Ok(response) => response,
            Err(error) => {
                tracing::warn!(group = %fetch.key, error = %error, "Fetch failed");
                self.notifications
                    .push(Notification::danger(format!("Could not load records: {}", error)));
                return Err(ListError::RemoteRead(error));
            }
        };

        if let Some(snapshot) = fetch.rebuild {
            self.rebuild(snapshot);
        }
        let key = &fetch.key;
        if self.tree.group(key).is_none_or(|g| !g.is_open) {
            tracing::debug!(group = %key, "Dropping response for a closed group");
            return Ok(Vec::new());
        }

        match response {
            NodeResponse::Groups(response) => {
                let to_open = self.tree.apply_groups(
                    key,
                    fetch.offset,
                    response.groups,
                    response.exact_group_count,
                    self.config.expand,
                )?;
                if key.is_root() {
                    self.schedule_totals();
                }
                self.drop_stale_edit();
                Ok(to_open)
            }
            NodeResponse::Records(response) => {
                let previous = self.tree.children_records(key);
                let ids = self.tree.apply_records(
                    key,
                    fetch.offset,
                    response.records,
                    response.exact_count,
                    self.config.count_limit,
                )?;
                let gone: Vec<RecordId> = previous.into_iter().filter(|id| !ids.contains(id)).collect();
                for id in gone {
                    self.forget_record(id);
                }
                self.selection.on_records_loaded(&ids);
                if key.is_root() {
                    self.schedule_totals();
                }
                self.drop_stale_edit();
                tracing::debug!(group = %key, records = ids.len(), "Loaded records");
                Ok(Vec::new())
            }
            NodeResponse::Count(count) => {
                self.tree.apply_exact_count(key, count)?;
                tracing::debug!(group = %key, count, "Loaded exact count");
                Ok(Vec::new())
            }
            NodeResponse::Totals(response) => {
                let (count, aggregates) = response
                    .groups
                    .into_iter()
                    .next()
                    .map(|g| (g.count, g.aggregates))
                    .unwrap_or_default();
                self.tree.apply_totals(count, aggregates);
                tracing::debug!(model = %self.config.model, count, "Loaded totals");
                Ok(Vec::new())
            }
        }
    }

    /// Swap in an empty tree for a new query, keeping open groups open
    fn rebuild(&mut self, snapshot: QuerySnapshot) {
        let open = self.tree.open_group_keys();
        let mut tree = RecordTree::new(
            snapshot.group_by,
            self.config.limit,
            self.config.groups_limit,
        );
        tree.remember_open(open);
        self.tree = tree;
        self.domain = snapshot.domain;
        self.sort.set_orders(snapshot.orders);
        self.selection.clear();
        self.edit.reset();
        self.focus = None;
        self.resequencing.clear();
        self.deferred_edit = None;
        self.renamed.clear();
        self.totals_pending = false;
    }

    /// Drop selected ids that are no longer loaded
    pub fn prune_selection(&mut self) {
        let tree = &self.tree;
        self.selection.retain(|id| tree.record(id).is_some());
    }

    // Bulk operations

    /// Ids the selection designates for a bulk operation
    pub fn plan_bulk(&mut self) -> ListResult<BulkPlan> {
        let limit = self.config.active_ids_limit;
        match self.selection.bulk_target(self.tree.root().count) {
            BulkTarget::Ids(ids) if ids.is_empty() => {
                Err(ListError::InvalidOperation("no record selected".into()))
            }
            BulkTarget::Ids(mut ids) => {
                if ids.len() > limit {
                    self.warn_active_ids_limit(ids.len());
                    ids.truncate(limit);
                }
                Ok(BulkPlan::Ready(ids))
            }
            BulkTarget::Domain { count } => Ok(BulkPlan::ResolveDomain {
                request: SearchReadRequest {
                    model: self.config.model.clone(),
                    domain: self.domain.clone(),
                    fields: Vec::new(),
                    order: self.sort.orders().to_vec(),
                    offset: 0,
                    limit,
                    count_limit: None,
                },
                count,
            }),
        }
    }

    /// Ids found for a domain selection; warns when the safety limit cut them
    pub fn resolve_domain_ids(&mut self, count: usize, response: SearchReadResponse) -> Vec<RecordId> {
        let ids: Vec<RecordId> = response
            .records
            .iter()
            .map(|r| r.id)
            .take(self.config.active_ids_limit)
            .collect();
        let matching = response.exact_count.unwrap_or(count).max(count);
        if matching > self.config.active_ids_limit {
            self.warn_active_ids_limit(matching);
        }
        ids
    }

    fn warn_active_ids_limit(&mut self, selected: usize) {
        self.notifications.push(Notification::warning(format!(
            "Only the first {} records have been processed (out of {} selected)",
            self.config.active_ids_limit, selected
        )));
    }

    /// Write `active` on the given records
    pub fn archive_plan(&self, ids: Vec<RecordId>, archive: bool) -> SavePlan {
        let mut patch = RecordValues::new();
        patch.insert("active".to_string(), Value::Bool(!archive));
        SavePlan { ids, patch }
    }

    /// Drop (un)archived records from the view.
    ///
    /// Returns the nodes whose window moved and must be reloaded.
    pub fn finish_archive(&mut self, ids: &[RecordId]) -> ListResult<Vec<GroupKey>> {
        let mut refetch: Vec<GroupKey> = Vec::new();
        for id in ids {
            if self.tree.record(*id).is_none() {
                continue;
            }
            let removal = self.tree.remove_record(*id)?;
            self.forget_record(*id);
            for group in &removal.removed_groups {
                self.coordinator.cancel_subtree(group);
            }
            if let Some(key) = removal.refetch
                && !refetch.contains(&key)
            {
                refetch.push(key);
            }
        }
        refetch.retain(|key| self.tree.group(key).is_some());
        self.selection.clear();
        self.drop_stale_edit();
        if self.tree.totals().is_some() {
            self.totals_pending = true;
        }
        Ok(refetch)
    }

    // Resequencing

    /// Move `moved` before `before` (or last) and describe the store call.
    ///
    /// The new order is applied at once. `None` when nothing moves.
    pub fn begin_resequence(&mut self, moved: RecordId, before: Option<RecordId>) -> ListResult<Option<ResequenceStart>> {
        let handle = self
            .config
            .handle_field()
            .ok_or(ListError::NoHandleField)?
            .to_string();
        resequence::check_unlocked(&handle, self.sort.orders())?;
        let moved = self.resolve(moved);
        let before = before.map(|id| self.resolve(id));
        let Some(plan) = resequence::plan(&self.tree, &handle, moved, before)? else {
            return Ok(None);
        };
        plan.apply(&mut self.tree)?;
        self.resequencing.extend(plan.ids.iter().copied());

        let ticket = self.coordinator.issue(Scope::Resequence);
        let request = ResequenceRequest {
            model: self.config.model.clone(),
            ids: plan.ids.clone(),
            offset: plan.offset,
            field: handle,
            context: self.context.clone(),
        };
        tracing::debug!(ids = ?request.ids, offset = request.offset, "Resequencing");
        Ok(Some(ResequenceStart { ticket, plan, request }))
    }

    /// Settle a resequence call.
    ///
    /// Returns an edition deferred while it was pending, to replay now. A
    /// rejected call reverts the order unless a newer change superseded it.
    pub fn finish_resequence(
        &mut self,
        ticket: Ticket,
        plan: ResequencePlan,
        result: Result<(), GridError>,
    ) -> ListResult<Option<(RecordId, FieldName)>> {
        for id in &plan.ids {
            self.resequencing.remove(id);
        }
        let current = self.coordinator.finish(&ticket);
        let deferred = match &self.deferred_edit {
            Some((id, _)) if !self.resequencing.contains(id) => self.deferred_edit.take(),
            _ => None,
        };

        match result {
            Ok(()) => Ok(deferred),
            Err(error) => {
                if current {
                    plan.revert(&mut self.tree)?;
                }
                tracing::warn!(error = %error, reverted = current, "Resequence rejected");
                self.notifications
                    .push(Notification::dialog("Validation Error", error.to_string()));
                Err(ListError::RemoteWrite(error))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridkit_core::{
        ColumnSpec, Editable, FieldKind, GroupData, MemoryKeyValueStore, RecordData, SaveResponse,
        ViewConfig,
    };
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    fn state(config: ViewConfig) -> ListState {
        ListState::new(config, Arc::new(MemoryKeyValueStore::new())).unwrap()
    }

    fn config() -> ViewConfig {
        ViewConfig::new(
            "foo",
            vec![
                ColumnSpec::new("int_field", FieldKind::Handle),
                ColumnSpec::new("foo", FieldKind::Char),
                ColumnSpec::new("bar", FieldKind::Boolean),
            ],
        )
        .with_editable(Editable::Bottom)
    }

    fn records(rows: &[(i64, &str)]) -> NodeResponse {
        NodeResponse::Records(SearchReadResponse {
            records: rows
                .iter()
                .enumerate()
                .map(|(i, (id, foo))| {
                    RecordData::new(*id, [("foo", Value::from(*foo)), ("int_field", Value::Integer(i as i64))])
                })
                .collect(),
            exact_count: Some(rows.len()),
        })
    }

    fn group(value: bool, count: usize) -> GroupData {
        GroupData {
            value: Value::Bool(value),
            count,
            aggregates: BTreeMap::new(),
        }
    }

    #[test]
    fn test_later_reload_wins_over_earlier_response() {
        let mut state = state(config());
        let first = state.begin_reload(None, None);
        let second = state.begin_reload(Some(Domain::all().and(gridkit_core::Condition::eq("bar", true))), None);

        state
            .finish_node_fetch(second, Ok(records(&[(2, "blip")])))
            .unwrap();
        // The earlier response resolves last and is ignored
        state
            .finish_node_fetch(first, Ok(records(&[(1, "yop"), (2, "blip")])))
            .unwrap();
        assert_eq!(state.tree().visible_records(), vec![RecordId(2)]);
        assert!(!state.domain().is_empty());
    }

    #[test]
    fn test_failed_reload_keeps_tree() {
        let mut state = state(config());
        let fetch = state.begin_reload(None, None);
        state
            .finish_node_fetch(fetch, Ok(records(&[(1, "yop")])))
            .unwrap();

        let fetch = state.begin_reload(None, Some(vec!["bar".into()]));
        let err = state
            .finish_node_fetch(fetch, Err(GridError::Transport("down".into())))
            .unwrap_err();
        assert_eq!(err, ListError::RemoteRead(GridError::Transport("down".into())));
        assert!(!state.tree().is_grouped());
        assert_eq!(state.tree().visible_records(), vec![RecordId(1)]);
        assert_eq!(state.notifications().len(), 1);
        assert!(!state.notifications()[0].blocking);
    }

    #[test]
    fn test_window_and_count_exclude_each_other() {
        let mut state = state(config());
        let fetch = state.begin_reload(None, None);
        state
            .finish_node_fetch(fetch, Ok(records(&[(1, "yop")])))
            .unwrap();

        let root = GroupKey::root();
        let window = state.begin_node_fetch(&root, FetchKind::Window, Some(0)).unwrap();
        assert_eq!(
            state.begin_node_fetch(&root, FetchKind::Count, None).unwrap_err(),
            ListError::FetchInFlight
        );
        state
            .finish_node_fetch(window, Ok(records(&[(1, "yop")])))
            .unwrap();
        assert!(state.begin_node_fetch(&root, FetchKind::Count, None).is_ok());
    }

    #[test]
    fn test_reload_reopens_groups_and_clears_selection() {
        let mut state = state(config().with_group_by(vec!["bar"]));
        let fetch = state.begin_reload(None, None);
        let to_open = state
            .finish_node_fetch(
                fetch,
                Ok(NodeResponse::Groups(ReadGroupResponse {
                    groups: vec![group(false, 1), group(true, 2)],
                    exact_group_count: None,
                })),
            )
            .unwrap();
        assert!(to_open.is_empty());
        assert_eq!(state.tree().root().count, 3);

        let yes = GroupKey::root().child("bar", &Value::Bool(true));
        let fetch = state.open_group(&yes).unwrap();
        let NodeQuery::Records(request) = &fetch.query else {
            panic!("leaf groups load records");
        };
        assert_eq!(request.count_limit, None);
        state
            .finish_node_fetch(fetch, Ok(records(&[(1, "yop"), (2, "blip")])))
            .unwrap();
        state.toggle_selection(RecordId(1)).unwrap();

        let fetch = state.begin_reload(None, None);
        let to_open = state
            .finish_node_fetch(
                fetch,
                Ok(NodeResponse::Groups(ReadGroupResponse {
                    groups: vec![group(false, 1), group(true, 2)],
                    exact_group_count: None,
                })),
            )
            .unwrap();
        assert_eq!(to_open, vec![yes]);
        assert!(state.selection().is_empty());
    }

    #[test]
    fn test_paged_groups_ask_for_totals() {
        let mut state = state(config().with_group_by(vec!["bar"]).with_groups_limit(1));
        let fetch = state.begin_reload(None, None);
        state
            .finish_node_fetch(
                fetch,
                Ok(NodeResponse::Groups(ReadGroupResponse {
                    groups: vec![group(false, 1)],
                    exact_group_count: Some(2),
                })),
            )
            .unwrap();
        assert_eq!(state.tree().root().count, 1);

        let totals = state.begin_totals_fetch().expect("paged groups need totals");
        let NodeQuery::Totals(request) = &totals.query else {
            panic!("totals are read with an ungrouped read_group");
        };
        assert!(request.group_by.is_empty());
        assert!(state.begin_totals_fetch().is_none());

        state
            .finish_node_fetch(
                totals,
                Ok(NodeResponse::Totals(ReadGroupResponse {
                    groups: vec![group(false, 3)],
                    exact_group_count: None,
                })),
            )
            .unwrap();
        assert_eq!(state.tree().root().count, 3);
    }

    #[test]
    fn test_reload_makes_pending_totals_stale() {
        let mut state = state(config().with_group_by(vec!["bar"]).with_groups_limit(1));
        let paged = NodeResponse::Groups(ReadGroupResponse {
            groups: vec![group(true, 2)],
            exact_group_count: Some(2),
        });
        let fetch = state.begin_reload(None, None);
        state.finish_node_fetch(fetch, Ok(paged.clone())).unwrap();
        let totals = state.begin_totals_fetch().unwrap();

        let fetch = state.begin_reload(None, None);
        state
            .finish_node_fetch(
                totals,
                Ok(NodeResponse::Totals(ReadGroupResponse {
                    groups: vec![group(false, 9)],
                    exact_group_count: None,
                })),
            )
            .unwrap();
        assert!(state.tree().totals().is_none());

        state.finish_node_fetch(fetch, Ok(paged)).unwrap();
        assert_eq!(state.tree().root().count, 2);
    }

    #[test]
    fn test_close_makes_pending_load_stale() {
        let mut state = state(config().with_group_by(vec!["bar"]));
        let fetch = state.begin_reload(None, None);
        state
            .finish_node_fetch(
                fetch,
                Ok(NodeResponse::Groups(ReadGroupResponse {
                    groups: vec![group(true, 2)],
                    exact_group_count: None,
                })),
            )
            .unwrap();
        let yes = GroupKey::root().child("bar", &Value::Bool(true));
        let fetch = state.open_group(&yes).unwrap();
        state.close_group(&yes).unwrap();
        state
            .finish_node_fetch(fetch, Ok(records(&[(1, "yop"), (2, "blip")])))
            .unwrap();
        assert!(state.tree().visible_records().is_empty());
        assert!(!state.tree().group(&yes).unwrap().is_open);
    }

    #[test]
    fn test_resequence_defers_edition_until_resolved() {
        let mut state = state(config());
        let fetch = state.begin_reload(None, None);
        state
            .finish_node_fetch(fetch, Ok(records(&[(4, "a"), (2, "b"), (1, "c"), (3, "d")])))
            .unwrap();

        let start = state
            .begin_resequence(RecordId(3), Some(RecordId(2)))
            .unwrap()
            .expect("order changed");
        assert_eq!(start.request.ids, vec![RecordId(3), RecordId(2), RecordId(1)]);
        assert_eq!(start.request.offset, 1);
        assert_eq!(
            state.tree().visible_records(),
            vec![RecordId(4), RecordId(3), RecordId(2), RecordId(1)]
        );

        assert_eq!(state.plan_click(RecordId(3), "foo").unwrap(), crate::state::ClickStep::Deferred);
        let deferred = state
            .finish_resequence(start.ticket, start.plan, Ok(()))
            .unwrap();
        assert_eq!(deferred, Some((RecordId(3), "foo".to_string())));
    }

    #[test]
    fn test_rejected_resequence_reverts() {
        let mut state = state(config());
        let fetch = state.begin_reload(None, None);
        state
            .finish_node_fetch(fetch, Ok(records(&[(1, "a"), (2, "b"), (3, "c")])))
            .unwrap();
        let start = state
            .begin_resequence(RecordId(3), Some(RecordId(1)))
            .unwrap()
            .expect("order changed");
        let err = state
            .finish_resequence(start.ticket, start.plan, Err(GridError::Rejected("locked".into())))
            .unwrap_err();
        assert!(matches!(err, ListError::RemoteWrite(_)));
        assert_eq!(
            state.tree().visible_records(),
            vec![RecordId(1), RecordId(2), RecordId(3)]
        );
        assert!(state.notifications.has_blocking());
    }

    #[test]
    fn test_archive_removes_records_and_steps_back() {
        let mut state = state(config().with_limit(2));
        let fetch = state.begin_reload(None, None);
        state
            .finish_node_fetch(
                fetch,
                Ok(NodeResponse::Records(SearchReadResponse {
                    records: vec![RecordData::new(3, [("foo", Value::from("c"))])],
                    exact_count: Some(3),
                })),
            )
            .unwrap();
        // Pretend the second page is shown
        let root = GroupKey::root();
        let fetch = state.begin_node_fetch(&root, FetchKind::Window, Some(2)).unwrap();
        state
            .finish_node_fetch(
                fetch,
                Ok(NodeResponse::Records(SearchReadResponse {
                    records: vec![RecordData::new(3, [("foo", Value::from("c"))])],
                    exact_count: Some(3),
                })),
            )
            .unwrap();
        state.toggle_selection(RecordId(3)).unwrap();

        let BulkPlan::Ready(ids) = state.plan_bulk().unwrap() else {
            panic!("explicit selection");
        };
        let plan = state.archive_plan(ids.clone(), true);
        assert_eq!(plan.patch.get("active"), Some(&Value::Bool(false)));
        state
            .finish_save(plan, Ok(SaveResponse { ids: ids.clone() }))
            .unwrap();
        let refetch = state.finish_archive(&ids).unwrap();
        assert_eq!(refetch, vec![root.clone()]);
        assert_eq!(state.tree().root().pager.offset, 0);
        assert_eq!(state.tree().root().count, 2);
    }

    #[test]
    fn test_domain_selection_warns_past_active_ids_limit() {
        let mut state = state(config().with_limit(2).with_active_ids_limit(3));
        let fetch = state.begin_reload(None, None);
        state
            .finish_node_fetch(
                fetch,
                Ok(NodeResponse::Records(SearchReadResponse {
                    records: vec![
                        RecordData::new(1, [("foo", Value::from("a"))]),
                        RecordData::new(2, [("foo", Value::from("b"))]),
                    ],
                    exact_count: Some(5),
                })),
            )
            .unwrap();
        state.toggle_all();
        assert!(state.select_domain());

        let BulkPlan::ResolveDomain { request, count } = state.plan_bulk().unwrap() else {
            panic!("domain selection");
        };
        assert_eq!(request.limit, 3);
        let ids = state.resolve_domain_ids(
            count,
            SearchReadResponse {
                records: (1..=3).map(|id| RecordData::new(id, [("foo", Value::from("x"))])).collect(),
                exact_count: Some(5),
            },
        );
        assert_eq!(ids.len(), 3);
        assert_eq!(
            state.notifications()[0].message,
            "Only the first 3 records have been processed (out of 5 selected)"
        );
        assert!(!state.notifications()[0].blocking);
    }
}
