//! Record tree
//!
//! The loaded part of the list: a root node, one level of groups per
//! group-by field, and records under the leaf groups (or directly under the
//! root when the list is not grouped). Nodes live in flat maps keyed by
//! group signature and record id; parents refer to children by key.

mod node;
mod pager;

pub use node::{GroupKey, GroupNode, NodeRef, RecordNode};
pub use pager::{PageJump, Pager, RecordCount};

use std::collections::{BTreeMap, BTreeSet, HashMap};

use gridkit_core::{FieldName, GroupData, RecordData, RecordId, RecordValues, Value};

use crate::error::{ListError, ListResult};

/// Where a new row is placed among its siblings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertPosition {
    Top,
    Bottom,
}

/// Side effects of removing a record
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Removal {
    /// Groups dropped because their count reached zero
    pub removed_groups: Vec<GroupKey>,
    /// Node whose window stepped back a page and must be refetched
    pub refetch: Option<GroupKey>,
}

/// One displayed line, in display order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeRow {
    Group { key: GroupKey, level: usize },
    Record { id: RecordId, level: usize },
}

#[derive(Debug)]
pub struct RecordTree {
    group_by: Vec<FieldName>,
    limit: usize,
    groups_limit: usize,
    groups: HashMap<GroupKey, GroupNode>,
    records: HashMap<RecordId, RecordNode>,
    /// Groups to reopen when they reappear after their parent reloads
    reopen: BTreeSet<GroupKey>,
    /// Server aggregates over the whole query, when not every record is loaded
    totals: Option<BTreeMap<FieldName, f64>>,
}

impl RecordTree {
    pub fn new(group_by: Vec<FieldName>, limit: usize, groups_limit: usize) -> Self {
        let root_limit = if group_by.is_empty() { limit } else { groups_limit };
        let mut groups = HashMap::new();
        groups.insert(GroupKey::root(), GroupNode::root(root_limit));
        Self {
            group_by,
            limit,
            groups_limit,
            groups,
            records: HashMap::new(),
            reopen: BTreeSet::new(),
            totals: None,
        }
    }

    pub fn group_by(&self) -> &[FieldName] {
        &self.group_by
    }

    pub fn is_grouped(&self) -> bool {
        !self.group_by.is_empty()
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn root(&self) -> &GroupNode {
        // The root is inserted at construction and never removed
        &self.groups[&GroupKey::root()]
    }

    pub fn group(&self, key: &GroupKey) -> Option<&GroupNode> {
        self.groups.get(key)
    }

    pub fn group_mut(&mut self, key: &GroupKey) -> Option<&mut GroupNode> {
        self.groups.get_mut(key)
    }

    fn require_group(&self, key: &GroupKey) -> ListResult<&GroupNode> {
        self.groups
            .get(key)
            .ok_or_else(|| ListError::GroupNotFound(key.to_string()))
    }

    fn require_group_mut(&mut self, key: &GroupKey) -> ListResult<&mut GroupNode> {
        self.groups
            .get_mut(key)
            .ok_or_else(|| ListError::GroupNotFound(key.to_string()))
    }

    pub fn record(&self, id: RecordId) -> Option<&RecordNode> {
        self.records.get(&id)
    }

    pub fn record_mut(&mut self, id: RecordId) -> Option<&mut RecordNode> {
        self.records.get_mut(&id)
    }

    pub fn require_record(&self, id: RecordId) -> ListResult<&RecordNode> {
        self.records.get(&id).ok_or(ListError::RecordNotFound(id))
    }

    pub fn require_record_mut(&mut self, id: RecordId) -> ListResult<&mut RecordNode> {
        self.records.get_mut(&id).ok_or(ListError::RecordNotFound(id))
    }

    pub fn records(&self) -> impl Iterator<Item = &RecordNode> {
        self.records.values()
    }

    /// Write values known to be persisted; pending edits of other fields stay
    pub fn apply_values(&mut self, id: RecordId, patch: &RecordValues) -> ListResult<()> {
        let record = self.require_record_mut(id)?;
        for (field, value) in patch {
            record.values.insert(field.clone(), value.clone());
            record.committed.insert(field.clone(), value.clone());
            record.dirty_fields.remove(field);
        }
        Ok(())
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// Whether the children of this group are records
    pub fn is_leaf(&self, key: &GroupKey) -> bool {
        key.level() == self.group_by.len()
    }

    /// Group-by field used to split the children of a group at this level
    pub fn group_by_at(&self, level: usize) -> Option<&FieldName> {
        self.group_by.get(level)
    }

    /// Remember groups to reopen once they are loaded again
    pub fn remember_open(&mut self, keys: impl IntoIterator<Item = GroupKey>) {
        self.reopen.extend(keys);
    }

    /// Every open group below the root
    pub fn open_group_keys(&self) -> BTreeSet<GroupKey> {
        self.groups
            .values()
            .filter(|g| g.is_open && !g.key.is_root())
            .map(|g| g.key.clone())
            .collect()
    }

    /// Open leaf groups (the root when ungrouped)
    pub fn open_leaf_groups(&self) -> Vec<GroupKey> {
        let mut keys: Vec<GroupKey> = self
            .groups
            .values()
            .filter(|g| g.is_open && self.is_leaf(&g.key) && self.is_displayed(&g.key))
            .map(|g| g.key.clone())
            .collect();
        keys.sort();
        keys
    }

    /// Whether every ancestor of the group is open
    fn is_displayed(&self, key: &GroupKey) -> bool {
        let mut current = key.parent();
        while let Some(parent) = current {
            match self.groups.get(&parent) {
                Some(group) if group.is_open => current = parent.parent(),
                _ => return false,
            }
        }
        true
    }

    pub fn open(&mut self, key: &GroupKey) -> ListResult<()> {
        self.require_group_mut(key)?.is_open = true;
        Ok(())
    }

    /// Close a group and discard everything loaded below it.
    ///
    /// Returns the ids of the discarded records.
    pub fn close(&mut self, key: &GroupKey) -> ListResult<Vec<RecordId>> {
        let group = self.require_group_mut(key)?;
        if key.is_root() {
            return Err(ListError::InvalidOperation("the root cannot be closed".into()));
        }
        group.is_open = false;
        group.pager.offset = 0;
        let removed = self.discard_children(key);
        self.reopen.retain(|k| !k.is_within(key) || k == key);
        self.reopen.remove(key);
        Ok(removed)
    }

    fn discard_children(&mut self, key: &GroupKey) -> Vec<RecordId> {
        let Some(group) = self.groups.get_mut(key) else {
            return Vec::new();
        };
        let children = std::mem::take(&mut group.children);
        let mut removed = Vec::new();
        for child in children {
            match child {
                NodeRef::Record(id) => {
                    self.records.remove(&id);
                    removed.push(id);
                }
                NodeRef::Group(child_key) => {
                    removed.extend(self.discard_children(&child_key));
                    self.groups.remove(&child_key);
                }
            }
        }
        removed
    }

    /// Replace the subgroups of `parent` with a freshly loaded level.
    ///
    /// Returns the new groups that should be opened (previously open ones,
    /// or all of them with `expand`), which the caller then loads.
    pub fn apply_groups(
        &mut self,
        parent: &GroupKey,
        offset: usize,
        groups: Vec<GroupData>,
        exact_group_count: Option<usize>,
        expand: bool,
    ) -> ListResult<Vec<GroupKey>> {
        let parent_node = self.require_group(parent)?;
        let level = parent.level();
        let Some(field) = self.group_by_at(level).cloned() else {
            return Err(ListError::InvalidOperation(format!(
                "group {} has no subgroups",
                parent
            )));
        };
        let parent_path = parent_node.path.clone();

        // Keep open subgroups open across the reload
        let previously_open: Vec<GroupKey> = self
            .open_group_keys()
            .into_iter()
            .filter(|k| k.is_within(parent) && k != parent)
            .collect();
        self.reopen.extend(previously_open);
        let discarded = self.discard_children(parent);
        if !discarded.is_empty() {
            tracing::debug!(group = %parent, records = discarded.len(), "Discarded records on group reload");
        }

        let group_count = groups.len();
        let total: usize = groups.iter().map(|g| g.count).sum();
        let child_limit = if level + 1 == self.group_by.len() {
            self.limit
        } else {
            self.groups_limit
        };

        let mut to_open = Vec::new();
        let mut children = Vec::with_capacity(group_count);
        for data in groups {
            let key = parent.child(&field, &data.value);
            let mut path = parent_path.clone();
            path.push((field.clone(), data.value));
            let is_open = expand || self.reopen.remove(&key);
            if is_open {
                to_open.push(key.clone());
            }
            self.groups.insert(
                key.clone(),
                GroupNode {
                    key: key.clone(),
                    path,
                    count: data.count,
                    aggregates: data.aggregates,
                    is_open,
                    pager: Pager::new(child_limit),
                    children: Vec::new(),
                },
            );
            children.push(NodeRef::Group(key));
        }

        let node = self.require_group_mut(parent)?;
        node.children = children;
        node.pager.offset = offset;
        node.pager.count = RecordCount::Exact(exact_group_count.unwrap_or(offset + group_count));
        if parent.is_root() {
            node.count = match exact_group_count {
                None => total,
                // Lower bound until the totals arrive
                Some(_) => node.count.max(total),
            };
        }
        Ok(to_open)
    }

    /// Replace the records of a leaf node with a freshly loaded window.
    pub fn apply_records(
        &mut self,
        parent: &GroupKey,
        offset: usize,
        records: Vec<RecordData>,
        exact_count: Option<usize>,
        count_limit: usize,
    ) -> ListResult<Vec<RecordId>> {
        if !self.is_leaf(parent) {
            return Err(ListError::InvalidOperation(format!(
                "group {} holds subgroups, not records",
                parent
            )));
        }
        self.require_group(parent)?;
        self.discard_children(parent);

        let loaded = records.len();
        let mut ids = Vec::with_capacity(loaded);
        for data in records {
            let id = data.id;
            self.records
                .insert(id, RecordNode::loaded(id, parent.clone(), data.values));
            ids.push(id);
        }

        let node = self.require_group_mut(parent)?;
        node.children = ids.iter().copied().map(NodeRef::Record).collect();
        node.pager.offset = offset;
        node.pager.count =
            RecordCount::from_response(exact_count, count_limit.max(offset + loaded));
        if let Some(count) = exact_count {
            node.count = count;
        } else if parent.is_root() {
            node.count = node.pager.total();
        }
        Ok(ids)
    }

    /// Record an exact count for a node
    pub fn apply_exact_count(&mut self, key: &GroupKey, count: usize) -> ListResult<()> {
        let node = self.require_group_mut(key)?;
        node.pager.count = RecordCount::Exact(count);
        if self.is_leaf(key) {
            self.require_group_mut(key)?.count = count;
        }
        Ok(())
    }

    /// Whether the root holds only part of the matching data, so footer
    /// totals and the root count need a separate totals query
    pub fn needs_totals(&self, has_aggregates: bool) -> bool {
        let root = self.root();
        if self.is_grouped() {
            return root.pager.count != RecordCount::Exact(root.children.len()) || root.pager.offset > 0;
        }
        has_aggregates && (root.pager.offset > 0 || root.pager.total() > root.children.len())
    }

    /// Server totals over the whole query, if fetched
    pub fn totals(&self) -> Option<&BTreeMap<FieldName, f64>> {
        self.totals.as_ref()
    }

    /// Record the totals of the whole query.
    ///
    /// In a grouped list `count` becomes the root count; an ungrouped root
    /// keeps the count its pager reports.
    pub fn apply_totals(&mut self, count: usize, aggregates: BTreeMap<FieldName, f64>) {
        if self.is_grouped()
            && let Some(root) = self.groups.get_mut(&GroupKey::root())
        {
            root.count = count;
        }
        self.totals = Some(aggregates);
    }

    /// Deepest loaded group whose path matches the values.
    ///
    /// Only leaf groups hold records, so a match that stops above the leaf
    /// level yields `None`.
    pub fn find_group_for(&self, values: &RecordValues) -> Option<GroupKey> {
        let mut current = GroupKey::root();
        loop {
            if self.is_leaf(&current) {
                return Some(current);
            }
            let group = self.groups.get(&current)?;
            let next = group
                .group_children()
                .find(|k| self.groups.get(*k).is_some_and(|g| g.matches(values)))?;
            current = next.clone();
        }
    }

    /// Insert a locally created row into an open leaf node
    pub fn insert_new_record(
        &mut self,
        parent: &GroupKey,
        position: InsertPosition,
        mut values: RecordValues,
    ) -> ListResult<RecordId> {
        if !self.is_leaf(parent) {
            return Err(ListError::InvalidOperation(format!(
                "records cannot be added to group {}",
                parent
            )));
        }
        let node = self.require_group(parent)?;
        if !node.is_open {
            return Err(ListError::InvalidOperation(format!("group {} is closed", parent)));
        }
        for (field, value) in &node.path {
            values.insert(field.clone(), value.clone());
        }

        let record = RecordNode::new_row(parent.clone(), values);
        let id = record.id;
        self.records.insert(id, record);

        let node = self.require_group_mut(parent)?;
        match position {
            InsertPosition::Top => node.children.insert(0, NodeRef::Record(id)),
            InsertPosition::Bottom => node.children.push(NodeRef::Record(id)),
        }
        node.pager.adjust_count(1);
        self.adjust_counts(parent, 1);
        Ok(id)
    }

    /// Add `delta` to the count of a group and all its ancestors
    fn adjust_counts(&mut self, key: &GroupKey, delta: isize) {
        let mut current = Some(key.clone());
        while let Some(key) = current {
            if let Some(group) = self.groups.get_mut(&key) {
                group.count = group.count.saturating_add_signed(delta);
            }
            current = key.parent();
        }
    }

    /// Remove a record, keeping ancestor counts and windows consistent
    pub fn remove_record(&mut self, id: RecordId) -> ListResult<Removal> {
        let record = self.records.remove(&id).ok_or(ListError::RecordNotFound(id))?;
        let parent = record.parent;
        let mut removal = Removal::default();

        if let Some(node) = self.groups.get_mut(&parent) {
            node.children.retain(|c| c != &NodeRef::Record(id));
            node.pager.adjust_count(-1);
            if node.children.is_empty() && node.pager.offset > 0 {
                node.pager.offset = node.pager.offset.saturating_sub(node.pager.limit);
                removal.refetch = Some(parent.clone());
            }
        }
        self.adjust_counts(&parent, -1);

        // Drop groups that no longer match any record
        let mut current = Some(parent);
        while let Some(key) = current {
            if key.is_root() {
                break;
            }
            let empty = self.groups.get(&key).is_some_and(|g| g.count == 0);
            if !empty {
                break;
            }
            self.discard_children(&key);
            self.groups.remove(&key);
            let parent = key.parent();
            if let Some(parent_key) = &parent
                && let Some(parent_node) = self.groups.get_mut(parent_key)
            {
                parent_node.children.retain(|c| c != &NodeRef::Group(key.clone()));
                parent_node.pager.adjust_count(-1);
            }
            if removal.refetch.as_ref() == Some(&key) {
                removal.refetch = None;
            }
            removal.removed_groups.push(key);
            current = parent;
        }
        Ok(removal)
    }

    /// Give a saved row the id the store assigned to it
    pub fn replace_record_id(&mut self, old: RecordId, new: RecordId) -> ListResult<()> {
        if old == new {
            return Ok(());
        }
        let mut record = self.records.remove(&old).ok_or(ListError::RecordNotFound(old))?;
        record.id = new;
        if let Some(node) = self.groups.get_mut(&record.parent) {
            for child in node.children.iter_mut() {
                if child == &NodeRef::Record(old) {
                    *child = NodeRef::Record(new);
                }
            }
        }
        self.records.insert(new, record);
        Ok(())
    }

    /// Records of a leaf node in display order
    pub fn children_records(&self, key: &GroupKey) -> Vec<RecordId> {
        self.groups
            .get(key)
            .map(|g| g.record_children().collect())
            .unwrap_or_default()
    }

    /// Reorder the records of a node
    pub fn set_record_order(&mut self, key: &GroupKey, order: &[RecordId]) -> ListResult<()> {
        let node = self.require_group_mut(key)?;
        node.children = order.iter().copied().map(NodeRef::Record).collect();
        Ok(())
    }

    /// Displayed lines: group headers and the records of open groups
    pub fn rows(&self) -> Vec<TreeRow> {
        let mut rows = Vec::new();
        self.collect_rows(&GroupKey::root(), &mut rows);
        rows
    }

    fn collect_rows(&self, key: &GroupKey, rows: &mut Vec<TreeRow>) {
        let Some(group) = self.groups.get(key) else {
            return;
        };
        for child in &group.children {
            match child {
                NodeRef::Record(id) => rows.push(TreeRow::Record {
                    id: *id,
                    level: key.level(),
                }),
                NodeRef::Group(child_key) => {
                    rows.push(TreeRow::Group {
                        key: child_key.clone(),
                        level: child_key.level(),
                    });
                    if self.groups.get(child_key).is_some_and(|g| g.is_open) {
                        self.collect_rows(child_key, rows);
                    }
                }
            }
        }
    }

    /// Displayed records, in display order
    pub fn visible_records(&self) -> Vec<RecordId> {
        self.rows()
            .into_iter()
            .filter_map(|row| match row {
                TreeRow::Record { id, .. } => Some(id),
                TreeRow::Group { .. } => None,
            })
            .collect()
    }

    /// Whether the loaded subgroups of a group account for its whole count
    pub fn is_count_consistent(&self, key: &GroupKey) -> bool {
        let Some(group) = self.groups.get(key) else {
            return false;
        };
        if self.is_leaf(key) {
            return true;
        }
        let all_loaded = group.pager.offset == 0
            && group.pager.count == RecordCount::Exact(group.children.len());
        if !all_loaded {
            return true;
        }
        let sum: usize = group
            .group_children()
            .filter_map(|k| self.groups.get(k))
            .map(|g| g.count)
            .sum();
        sum == group.count
    }

    /// Default values of a new row
    pub fn default_values(fields: &[FieldName], boolean_fields: &[FieldName]) -> RecordValues {
        fields
            .iter()
            .map(|f| {
                let value = if boolean_fields.contains(f) {
                    Value::Bool(false)
                } else {
                    Value::Null
                };
                (f.clone(), value)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;

    fn group(value: Value, count: usize) -> GroupData {
        GroupData {
            value,
            count,
            aggregates: BTreeMap::new(),
        }
    }

    fn record(id: i64, bar: bool) -> RecordData {
        RecordData::new(id, [("bar", Value::Bool(bar)), ("foo", Value::from("yop"))])
    }

    fn grouped_tree() -> (RecordTree, GroupKey, GroupKey) {
        let mut tree = RecordTree::new(vec!["bar".into()], 80, 80);
        tree.apply_groups(
            &GroupKey::root(),
            0,
            vec![group(Value::Bool(false), 1), group(Value::Bool(true), 3)],
            None,
            false,
        )
        .unwrap();
        let no = GroupKey::root().child("bar", &Value::Bool(false));
        let yes = GroupKey::root().child("bar", &Value::Bool(true));
        (tree, no, yes)
    }

    #[test]
    fn test_apply_groups_sets_counts() {
        let (tree, no, yes) = grouped_tree();
        assert_eq!(tree.root().count, 4);
        assert_eq!(tree.group(&no).unwrap().count, 1);
        assert_eq!(tree.group(&yes).unwrap().label(), "true");
        assert_eq!(tree.group(&no).unwrap().label(), "None");
        assert!(tree.is_count_consistent(&GroupKey::root()));
    }

    #[test]
    fn test_apply_values_keeps_other_pending_edits() {
        let (mut tree, _, yes) = grouped_tree();
        tree.open(&yes).unwrap();
        tree.apply_records(&yes, 0, vec![record(1, true)], Some(1), 10_000)
            .unwrap();
        tree.record_mut(RecordId(1)).unwrap().set_value("foo", Value::from("draft"));

        tree.apply_values(RecordId(1), &RecordValues::from([("sequence".to_string(), Value::Integer(7))]))
            .unwrap();

        let record = tree.record(RecordId(1)).unwrap();
        assert_eq!(record.get("sequence"), &Value::Integer(7));
        assert_eq!(record.get("foo"), &Value::from("draft"));
        assert!(record.dirty_fields.contains("foo"));
        assert!(!record.dirty_fields.contains("sequence"));
        assert_eq!(
            tree.apply_values(RecordId(9), &RecordValues::new()),
            Err(ListError::RecordNotFound(RecordId(9)))
        );
    }

    #[test]
    fn test_close_discards_records_and_reload_reopens() {
        let (mut tree, _, yes) = grouped_tree();
        tree.open(&yes).unwrap();
        tree.apply_records(&yes, 0, vec![record(1, true), record(2, true), record(3, true)], Some(3), 10_000)
            .unwrap();
        assert_eq!(tree.visible_records(), vec![RecordId(1), RecordId(2), RecordId(3)]);

        // Reloading the root keeps the group open
        let reopened = tree
            .apply_groups(
                &GroupKey::root(),
                0,
                vec![group(Value::Bool(false), 1), group(Value::Bool(true), 3)],
                None,
                false,
            )
            .unwrap();
        assert_eq!(reopened, vec![yes.clone()]);
        assert!(tree.record(RecordId(1)).is_none());

        tree.apply_records(&yes, 0, vec![record(1, true)], Some(3), 10_000).unwrap();
        let removed = tree.close(&yes).unwrap();
        assert_eq!(removed, vec![RecordId(1)]);
        assert!(tree.visible_records().is_empty());
    }

    #[test]
    fn test_insert_and_remove_keep_counts_consistent() {
        let (mut tree, no, _) = grouped_tree();
        tree.open(&no).unwrap();
        tree.apply_records(&no, 0, vec![record(4, false)], Some(1), 10_000).unwrap();

        let id = tree
            .insert_new_record(&no, InsertPosition::Bottom, RecordValues::new())
            .unwrap();
        assert!(id.is_virtual());
        assert_eq!(tree.record(id).unwrap().get("bar"), &Value::Bool(false));
        assert_eq!(tree.group(&no).unwrap().count, 2);
        assert_eq!(tree.root().count, 5);
        assert!(tree.is_count_consistent(&GroupKey::root()));

        tree.remove_record(id).unwrap();
        let removal = tree.remove_record(RecordId(4)).unwrap();
        assert_eq!(removal.removed_groups, vec![no.clone()]);
        assert!(tree.group(&no).is_none());
        assert_eq!(tree.root().count, 3);
        assert!(tree.is_count_consistent(&GroupKey::root()));
    }

    #[test]
    fn test_removing_last_record_of_page_steps_back() {
        let mut tree = RecordTree::new(Vec::new(), 2, 80);
        let root = GroupKey::root();
        tree.apply_records(&root, 2, vec![record(3, true)], Some(3), 10_000).unwrap();

        let removal = tree.remove_record(RecordId(3)).unwrap();
        assert_eq!(removal.refetch, Some(root.clone()));
        assert_eq!(tree.root().pager.offset, 0);
        assert_eq!(tree.root().pager.count, RecordCount::Exact(2));
    }

    #[test]
    fn test_estimated_count() {
        let mut tree = RecordTree::new(Vec::new(), 2, 80);
        let root = GroupKey::root();
        tree.apply_records(&root, 0, vec![record(1, true), record(2, true)], None, 10_000)
            .unwrap();
        assert_eq!(tree.root().pager.count, RecordCount::AtLeast(10_000));
        assert_eq!(tree.root().pager.display(), "1-2 / 10000+");

        tree.apply_exact_count(&root, 12_345).unwrap();
        assert_eq!(tree.root().pager.display(), "1-2 / 12345");
        assert_eq!(tree.root().count, 12_345);
    }

    #[test]
    fn test_find_group_for_values() {
        let (tree, no, _) = grouped_tree();
        let mut values = RecordValues::new();
        assert_eq!(tree.find_group_for(&values), Some(no));
        values.insert("bar".into(), Value::Bool(true));
        assert!(tree.find_group_for(&values).is_some());

        let nested = RecordTree::new(vec!["bar".into(), "foo".into()], 80, 80);
        assert_eq!(nested.find_group_for(&values), None);
    }
}
