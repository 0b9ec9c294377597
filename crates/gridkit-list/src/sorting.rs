//! Column header sorting
//!
//! Clicking a header moves its field to the front of the order list and
//! flips its direction on subsequent clicks. How the new order is applied
//! depends on the grouping:
//!
//! - ungrouped lists refetch the records
//! - grouped lists sorted by a group-by or aggregated field refetch the groups
//! - grouped lists sorted by any other field sort the records already loaded
//!   in open groups, and refuse when no group is open

use std::cmp::Ordering;

use gridkit_core::{OrderSpec, RecordValues, SortDirection, Value, ViewConfig, compare_non_null_values};

use crate::error::{ListError, ListResult};
use crate::tree::{GroupKey, RecordTree};

/// How the new order must be applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SortAction {
    /// Reload the records of the root
    Refetch,
    /// Reload the root groups (open groups reload with them)
    RefetchGroups,
    /// Sort the loaded records of these groups locally
    SortLoadedRecords(Vec<GroupKey>),
}

/// Where null values go in locally sorted records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NullPosition {
    First,
    #[default]
    Last,
}

#[derive(Debug, Clone, Default)]
pub struct SortState {
    orders: Vec<OrderSpec>,
    default_orders: Vec<OrderSpec>,
    null_position: NullPosition,
}

impl SortState {
    pub fn new(default_orders: Vec<OrderSpec>) -> Self {
        Self {
            orders: default_orders.clone(),
            default_orders,
            null_position: NullPosition::default(),
        }
    }

    pub fn orders(&self) -> &[OrderSpec] {
        &self.orders
    }

    pub fn primary(&self) -> Option<&OrderSpec> {
        self.orders.first()
    }

    pub fn set_orders(&mut self, orders: Vec<OrderSpec>) {
        self.orders = orders;
    }

    /// Back to the view's default order
    pub fn reset(&mut self) {
        self.orders = self.default_orders.clone();
    }

    pub fn default_orders(&self) -> &[OrderSpec] {
        &self.default_orders
    }

    /// Direction shown on a header, if it is the primary sort
    pub fn header_direction(&self, field: &str) -> Option<SortDirection> {
        self.primary()
            .filter(|o| o.field == field)
            .map(|o| o.direction)
    }

    /// Order list after clicking `field`
    fn clicked(&self, field: &str) -> Vec<OrderSpec> {
        let direction = match self.primary() {
            Some(primary) if primary.field == field => primary.direction.flipped(),
            _ => SortDirection::Asc,
        };
        let mut orders = vec![OrderSpec {
            field: field.to_string(),
            direction,
        }];
        orders.extend(self.orders.iter().filter(|o| o.field != field).cloned());
        orders
    }

    /// Apply a header click; the state only changes when the sort is legal
    pub fn click_header(
        &mut self,
        config: &ViewConfig,
        tree: &RecordTree,
        field: &str,
    ) -> ListResult<SortAction> {
        let column = config
            .column(field)
            .ok_or_else(|| ListError::UnknownField(field.to_string()))?;
        if !column.sortable {
            return Err(ListError::NotSortable(field.to_string()));
        }

        let action = if !tree.is_grouped() {
            SortAction::Refetch
        } else if tree.group_by().iter().any(|f| f == field) || column.aggregate.is_some() {
            SortAction::RefetchGroups
        } else {
            let open = tree.open_leaf_groups();
            if open.is_empty() {
                return Err(ListError::SortNotAllowed(field.to_string()));
            }
            SortAction::SortLoadedRecords(open)
        };

        self.orders = self.clicked(field);
        tracing::debug!(field, orders = ?self.orders, "Sort changed");
        Ok(action)
    }

    /// Orders a group query may use: only group-by fields and aggregates
    pub fn group_orders(&self, config: &ViewConfig, group_by: &[String]) -> Vec<OrderSpec> {
        self.orders
            .iter()
            .filter(|o| {
                group_by.contains(&o.field)
                    || config.column(&o.field).is_some_and(|c| c.aggregate.is_some())
            })
            .cloned()
            .collect()
    }

    pub fn compare(&self, a: &RecordValues, b: &RecordValues) -> Ordering {
        compare_records(a, b, &self.orders, self.null_position)
    }
}

/// Compare two records by an order list
pub fn compare_records(
    a: &RecordValues,
    b: &RecordValues,
    orders: &[OrderSpec],
    null_position: NullPosition,
) -> Ordering {
    for order in orders {
        let va = a.get(&order.field).unwrap_or(&Value::Null);
        let vb = b.get(&order.field).unwrap_or(&Value::Null);
        let ordering = match (va.is_null(), vb.is_null()) {
            (true, true) => Ordering::Equal,
            (true, false) => match null_position {
                NullPosition::First => Ordering::Less,
                NullPosition::Last => Ordering::Greater,
            },
            (false, true) => match null_position {
                NullPosition::First => Ordering::Greater,
                NullPosition::Last => Ordering::Less,
            },
            (false, false) => match order.direction {
                SortDirection::Asc => compare_non_null_values(va, vb),
                SortDirection::Desc => compare_non_null_values(va, vb).reverse(),
            },
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}
