//! Nodes of the record tree

use std::collections::{BTreeMap, BTreeSet};

use gridkit_core::{
    Condition, Domain, FieldErrorKind, FieldName, RecordId, RecordValues, Value, values_equal,
};
use serde::Serialize;

use super::pager::Pager;

/// Signature of a group: the `field=value` path from the root.
///
/// The root node has the empty path. Signatures survive reloads, which is
/// what lets open groups stay open when the tree is rebuilt.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize)]
#[serde(transparent)]
pub struct GroupKey(Vec<String>);

impl GroupKey {
    pub fn root() -> Self {
        Self(Vec::new())
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Depth below the root (root = 0)
    pub fn level(&self) -> usize {
        self.0.len()
    }

    pub fn child(&self, field: &str, value: &Value) -> Self {
        let mut path = self.0.clone();
        path.push(format!("{}={}", field, value.group_key()));
        Self(path)
    }

    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            return None;
        }
        Some(Self(self.0[..self.0.len() - 1].to_vec()))
    }

    /// Whether `self` lies in the subtree rooted at `other` (inclusive)
    pub fn is_within(&self, other: &GroupKey) -> bool {
        self.0.starts_with(&other.0)
    }
}

impl std::fmt::Display for GroupKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_root() {
            write!(f, "root")
        } else {
            write!(f, "{}", self.0.join("/"))
        }
    }
}

/// Reference from a group to one of its children
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum NodeRef {
    Group(GroupKey),
    Record(RecordId),
}

/// A group (or the root) in the record tree
#[derive(Debug, Clone)]
pub struct GroupNode {
    pub key: GroupKey,
    /// `(field, value)` pairs from the root down to this group
    pub path: Vec<(FieldName, Value)>,
    /// Number of records matching this group
    pub count: usize,
    pub aggregates: BTreeMap<FieldName, f64>,
    pub is_open: bool,
    /// Window over the children (subgroups or records)
    pub pager: Pager,
    pub children: Vec<NodeRef>,
}

impl GroupNode {
    pub(crate) fn root(limit: usize) -> Self {
        Self {
            key: GroupKey::root(),
            path: Vec::new(),
            count: 0,
            aggregates: BTreeMap::new(),
            is_open: true,
            pager: Pager::new(limit),
            children: Vec::new(),
        }
    }

    pub fn level(&self) -> usize {
        self.key.level()
    }

    /// Field and value this group was formed by (`None` for the root)
    pub fn grouped_value(&self) -> Option<(&FieldName, &Value)> {
        self.path.last().map(|(f, v)| (f, v))
    }

    /// Header text: the group value, or "None" when unset
    pub fn label(&self) -> String {
        match self.grouped_value() {
            Some((_, value)) if value.is_empty() || value == &Value::Bool(false) => {
                "None".to_string()
            }
            Some((_, value)) => value.to_string(),
            None => String::new(),
        }
    }

    /// Narrow a base domain to the records of this group
    pub fn domain(&self, base: &Domain) -> Domain {
        self.path
            .iter()
            .fold(base.clone(), |domain, (field, value)| {
                domain.and(Condition::eq(field.clone(), value.clone()))
            })
    }

    /// Values a record must carry to belong here
    pub fn matches(&self, values: &RecordValues) -> bool {
        self.path.iter().all(|(field, value)| {
            values_equal(values.get(field).unwrap_or(&Value::Null), value)
        })
    }

    /// Values used to evaluate header button visibility
    pub fn header_values(&self) -> RecordValues {
        let mut values: RecordValues = self.path.iter().cloned().collect();
        values.insert("__count".to_string(), Value::Integer(self.count as i64));
        for (field, aggregate) in &self.aggregates {
            values
                .entry(field.clone())
                .or_insert(Value::Float(*aggregate));
        }
        values
    }

    pub fn record_children(&self) -> impl Iterator<Item = RecordId> + '_ {
        self.children.iter().filter_map(|c| match c {
            NodeRef::Record(id) => Some(*id),
            NodeRef::Group(_) => None,
        })
    }

    pub fn group_children(&self) -> impl Iterator<Item = &GroupKey> + '_ {
        self.children.iter().filter_map(|c| match c {
            NodeRef::Group(key) => Some(key),
            NodeRef::Record(_) => None,
        })
    }
}

/// A loaded record
#[derive(Debug, Clone)]
pub struct RecordNode {
    pub id: RecordId,
    pub parent: GroupKey,
    /// Current values, including unsaved edits
    pub values: RecordValues,
    /// Last values known to be persisted
    pub committed: RecordValues,
    pub dirty_fields: BTreeSet<FieldName>,
    pub errors: BTreeMap<FieldName, FieldErrorKind>,
    /// Created locally and never saved
    pub is_new: bool,
}

impl RecordNode {
    pub(crate) fn loaded(id: RecordId, parent: GroupKey, values: RecordValues) -> Self {
        Self {
            id,
            parent,
            committed: values.clone(),
            values,
            dirty_fields: BTreeSet::new(),
            errors: BTreeMap::new(),
            is_new: false,
        }
    }

    pub(crate) fn new_row(parent: GroupKey, values: RecordValues) -> Self {
        Self {
            is_new: true,
            ..Self::loaded(RecordId::new_virtual(), parent, values)
        }
    }

    pub fn get(&self, field: &str) -> &Value {
        self.values.get(field).unwrap_or(&Value::Null)
    }

    pub fn is_dirty(&self) -> bool {
        !self.dirty_fields.is_empty()
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Stage a value; the field is dirty while it differs from the committed one
    pub fn set_value(&mut self, field: &str, value: Value) {
        let committed = self.committed.get(field).unwrap_or(&Value::Null);
        if values_equal(committed, &value) && !self.is_new {
            self.dirty_fields.remove(field);
        } else {
            self.dirty_fields.insert(field.to_string());
        }
        self.values.insert(field.to_string(), value);
    }

    /// Values to send when saving
    pub fn pending_patch(&self) -> RecordValues {
        if self.is_new {
            return self.values.clone();
        }
        self.dirty_fields
            .iter()
            .map(|f| (f.clone(), self.get(f).clone()))
            .collect()
    }

    /// Record a successful write of `patch`.
    ///
    /// Fields the user changed again since the write was planned keep their
    /// newer value and stay dirty.
    pub fn commit(&mut self, patch: &RecordValues) {
        for (field, written) in patch {
            self.committed.insert(field.clone(), written.clone());
        }
        self.is_new = false;
        self.refresh_dirty();
    }

    /// Restore fields to their last committed value
    pub fn revert_fields<'a>(&mut self, fields: impl IntoIterator<Item = &'a FieldName>) {
        for field in fields {
            match self.committed.get(field) {
                Some(value) => {
                    self.values.insert(field.clone(), value.clone());
                }
                None => {
                    self.values.remove(field);
                }
            }
            self.errors.remove(field);
        }
        self.refresh_dirty();
    }

    pub fn revert_all(&mut self) {
        self.values = self.committed.clone();
        self.errors.clear();
        self.dirty_fields.clear();
    }

    fn refresh_dirty(&mut self) {
        let empty = Value::Null;
        let fields: BTreeSet<&FieldName> = self.values.keys().chain(self.committed.keys()).collect();
        self.dirty_fields = fields
            .into_iter()
            .filter(|f| {
                !values_equal(
                    self.values.get(*f).unwrap_or(&empty),
                    self.committed.get(*f).unwrap_or(&empty),
                )
            })
            .cloned()
            .collect();
    }
}
