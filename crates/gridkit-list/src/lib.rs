//! gridkit list - editable, groupable list view state machine
//!
//! This crate holds everything a list view knows between two renders:
//! the loaded record tree, the row in edition, the selection, the sort,
//! optional columns and the pending store requests.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │  UI / renderer  │  rows(), headers(), aggregates(), notifications
//! └────────┬────────┘
//!          │ user intents
//! ┌────────▼────────┐
//! │ ListController  │  async, awaits the store without holding the state
//! └────────┬────────┘
//!          │ plan / finish
//! ┌────────▼────────┐
//! │   ListState     │  tree, edition, selection, sort, coordinator
//! └────────┬────────┘
//!          │ requests
//! ┌────────▼────────┐
//! │  RemoteStore    │  search_read, read_group, save, resequence
//! └─────────────────┘
//! ```
//!
//! # Parts
//!
//! - **RecordTree**: groups, records and per-node pagers
//! - **EditController**: single and multi-record edition, validation, failed writes
//! - **SelectionManager**: explicit ids or the whole domain
//! - **SortState**: header sorting and its lock on reordering
//! - **RequestCoordinator**: generation tickets and per-record save locks
//! - **ColumnVisibilityState**: optional columns persisted per view

mod aggregate;
mod column_visibility;
mod controller;
mod coordinator;
mod edit;
mod error;
mod notifications;
mod resequence;
mod selection;
mod sorting;
mod state;
mod tree;

pub use aggregate::{AggregateCell, compute as compute_aggregate};
pub use column_visibility::{ColumnVisibility, ColumnVisibilityState};
pub use controller::ListController;
pub use coordinator::{FetchKind, RequestCoordinator, Scope, Ticket};
pub use edit::{
    EditController, EditMode, FailedWrite, FocusOrder, FocusTarget, LeaveOutcome, MultiEditProposal, SavePlan,
    UpdateOutcome,
};
pub use error::{ListError, ListResult, ValidationFailure};
pub use notifications::{Notification, NotificationKind, NotificationQueue};
pub use resequence::ResequencePlan;
pub use selection::{BulkTarget, SelectionManager};
pub use sorting::{NullPosition, SortAction, SortState, compare_records};
pub use state::{
    BulkPlan, CellView, ClickStep, HeaderView, Key, KeyPlan, ListState, NextFocus, NodeFetch, NodeQuery, NodeResponse,
    ResequenceStart, RowView,
};
pub use tree::{GroupKey, GroupNode, InsertPosition, PageJump, Pager, RecordCount, RecordNode, RecordTree, TreeRow};
