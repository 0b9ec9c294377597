//! Request coordination
//!
//! Every store call is stamped with a [`Ticket`] when it is issued. A
//! response is applied only if its ticket is still the newest one of its
//! scope and the tree has not been rebuilt since (`revision`). Anything
//! else is stale and dropped.
//!
//! Per node, the pager's window fetch and the exact-count fetch exclude each
//! other while one is in flight. Reloads always supersede.
//!
//! Saves do not go stale (the write happened); instead they are serialized
//! per record through an async lock.

use std::collections::HashMap;
use std::sync::Arc;

use gridkit_core::RecordId;

use crate::error::{ListError, ListResult};
use crate::tree::GroupKey;

/// What a ticket is about
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Scope {
    /// Loading the children of a node
    Node(GroupKey),
    /// Counting the records of a node exactly
    Count(GroupKey),
    /// Totals of the whole query, read alongside a paged root
    Totals,
    /// Persisting a manual order
    Resequence,
}

/// Kind of fetch on a node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchKind {
    /// Opening, reloading or re-sorting: supersedes anything in flight
    Reload,
    /// Pager window move
    Window,
    /// Exact count request
    Count,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    pub scope: Scope,
    pub generation: u64,
    pub revision: u64,
}

#[derive(Debug, Default)]
pub struct RequestCoordinator {
    /// Bumped whenever the whole tree is rebuilt
    revision: u64,
    next_generation: u64,
    latest: HashMap<Scope, u64>,
    in_flight: HashMap<GroupKey, (FetchKind, u64)>,
    save_locks: HashMap<RecordId, Arc<tokio::sync::Mutex<()>>>,
}

impl RequestCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Stamp a new request of the given scope, superseding older ones
    pub fn issue(&mut self, scope: Scope) -> Ticket {
        self.next_generation += 1;
        let generation = self.next_generation;
        self.latest.insert(scope.clone(), generation);
        Ticket {
            scope,
            generation,
            revision: self.revision,
        }
    }

    /// Start a fetch on a node.
    ///
    /// Window and count fetches are refused while any fetch of the node is
    /// in flight; reloads take over.
    pub fn begin_fetch(&mut self, node: &GroupKey, kind: FetchKind) -> ListResult<Ticket> {
        if kind != FetchKind::Reload && self.in_flight.contains_key(node) {
            return Err(ListError::FetchInFlight);
        }
        let scope = match kind {
            FetchKind::Count => Scope::Count(node.clone()),
            FetchKind::Reload | FetchKind::Window => Scope::Node(node.clone()),
        };
        let ticket = self.issue(scope);
        self.in_flight
            .insert(node.clone(), (kind, ticket.generation));
        Ok(ticket)
    }

    /// Kind of fetch currently running on a node
    pub fn fetch_in_flight(&self, node: &GroupKey) -> Option<FetchKind> {
        self.in_flight.get(node).map(|(kind, _)| *kind)
    }

    pub fn is_current(&self, ticket: &Ticket) -> bool {
        ticket.revision == self.revision && self.latest.get(&ticket.scope) == Some(&ticket.generation)
    }

    /// Settle a ticket; returns whether its response may be applied
    pub fn finish(&mut self, ticket: &Ticket) -> bool {
        if let Scope::Node(node) | Scope::Count(node) = &ticket.scope
            && self
                .in_flight
                .get(node)
                .is_some_and(|(_, generation)| *generation == ticket.generation)
        {
            self.in_flight.remove(node);
        }
        let current = self.is_current(ticket);
        if !current {
            tracing::debug!(
                scope = ?ticket.scope,
                generation = ticket.generation,
                "Dropping stale response"
            );
        }
        current
    }

    /// Make every outstanding node response for `node` and its subtree stale
    pub fn cancel_subtree(&mut self, node: &GroupKey) {
        let scopes: Vec<Scope> = self
            .latest
            .keys()
            .filter(|scope| match scope {
                Scope::Node(key) | Scope::Count(key) => key.is_within(node),
                Scope::Totals | Scope::Resequence => false,
            })
            .cloned()
            .collect();
        for scope in scopes {
            self.issue(scope);
        }
        self.in_flight.retain(|key, _| !key.is_within(node));
    }

    /// Make every outstanding response stale (full reload)
    pub fn invalidate_all(&mut self) {
        self.revision += 1;
        self.in_flight.clear();
    }

    /// Async lock serializing writes to one record
    pub fn save_lock(&mut self, id: RecordId) -> Arc<tokio::sync::Mutex<()>> {
        self.save_locks.entry(id).or_default().clone()
    }

    /// Drop the lock of a record that is gone (or got a real id)
    pub fn forget_record(&mut self, id: RecordId) {
        if let Some(lock) = self.save_locks.get(&id)
            && Arc::strong_count(lock) == 1
        {
            self.save_locks.remove(&id);
        }
    }
}
