//! Row selection
//!
//! Selection is scoped to loaded records, except in domain mode where the
//! user asked to act on every record matching the query.

use std::collections::BTreeSet;

use gridkit_core::RecordId;

/// Records a bulk operation applies to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BulkTarget {
    Ids(Vec<RecordId>),
    /// Every record matching the current domain (`count` of them)
    Domain { count: usize },
}

#[derive(Debug, Clone, Default)]
pub struct SelectionManager {
    selected: BTreeSet<RecordId>,
    domain_selected: bool,
}

impl SelectionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_selected(&self, id: RecordId) -> bool {
        self.selected.contains(&id)
    }

    pub fn selected_ids(&self) -> &BTreeSet<RecordId> {
        &self.selected
    }

    pub fn len(&self) -> usize {
        self.selected.len()
    }

    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }

    pub fn is_domain_selected(&self) -> bool {
        self.domain_selected
    }

    /// Toggle one record; leaves domain mode
    pub fn toggle(&mut self, id: RecordId) -> bool {
        self.domain_selected = false;
        if self.selected.remove(&id) {
            false
        } else {
            self.selected.insert(id);
            true
        }
    }

    /// Whether every loaded record is selected
    pub fn is_all_selected(&self, loaded: &[RecordId]) -> bool {
        !loaded.is_empty() && loaded.iter().all(|id| self.selected.contains(id))
    }

    /// Select every loaded record, or clear when all already are
    pub fn toggle_all(&mut self, loaded: &[RecordId]) {
        if self.is_all_selected(loaded) {
            self.clear();
        } else {
            self.selected.extend(loaded.iter().copied());
        }
    }

    /// Domain selection is offered once every loaded record is selected and
    /// more records match the query
    pub fn can_select_domain(&self, loaded: &[RecordId], total: usize) -> bool {
        !self.domain_selected && self.is_all_selected(loaded) && total > self.selected.len()
    }

    pub fn select_domain(&mut self, loaded: &[RecordId], total: usize) -> bool {
        if !self.can_select_domain(loaded, total) {
            return false;
        }
        self.domain_selected = true;
        true
    }

    pub fn clear(&mut self) {
        self.selected.clear();
        self.domain_selected = false;
    }

    /// Drop records that are no longer loaded
    pub fn forget(&mut self, ids: &[RecordId]) {
        for id in ids {
            self.selected.remove(id);
        }
    }

    pub fn retain(&mut self, mut keep: impl FnMut(RecordId) -> bool) {
        self.selected.retain(|id| keep(*id));
    }

    /// Track newly loaded records: in domain mode they are selected too
    pub fn on_records_loaded(&mut self, ids: &[RecordId]) {
        if self.domain_selected {
            self.selected.extend(ids.iter().copied());
        }
    }

    /// A saved row changed id
    pub fn rename(&mut self, old: RecordId, new: RecordId) {
        if self.selected.remove(&old) {
            self.selected.insert(new);
        }
    }

    pub fn bulk_target(&self, total: usize) -> BulkTarget {
        if self.domain_selected {
            BulkTarget::Domain { count: total }
        } else {
            BulkTarget::Ids(self.selected.iter().copied().collect())
        }
    }
}
