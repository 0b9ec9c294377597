use gridkit_core::{FieldErrorKind, FieldName, GridError, RecordId};
use thiserror::Error;

pub type ListResult<T> = Result<T, ListError>;

/// Field-level validation failures of one record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationFailure {
    pub record: RecordId,
    pub fields: Vec<(FieldName, FieldErrorKind)>,
}

impl ValidationFailure {
    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|(f, _)| f.as_str()).collect()
    }
}

impl std::fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let fields = self
            .fields
            .iter()
            .map(|(name, kind)| format!("{} ({})", name, kind.label()))
            .collect::<Vec<_>>()
            .join(", ");
        write!(f, "record {}: {}", self.record, fields)
    }
}

/// List-level errors with user-facing messages
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ListError {
    #[error("Invalid fields: {0}")]
    Validation(ValidationFailure),

    #[error("Write rejected: {0}")]
    RemoteWrite(GridError),

    #[error("Read failed: {0}")]
    RemoteRead(GridError),

    #[error("A conflicting fetch is already in flight for this group")]
    FetchInFlight,

    #[error("Cannot sort a grouped list by '{0}'")]
    SortNotAllowed(FieldName),

    #[error("Column '{0}' is not sortable")]
    NotSortable(FieldName),

    #[error("Reordering is locked while the list is sorted by '{0}'")]
    HandleLocked(FieldName),

    #[error("This list has no handle field")]
    NoHandleField,

    #[error("Group not found: {0}")]
    GroupNotFound(String),

    #[error("Record not found: {0}")]
    RecordNotFound(RecordId),

    #[error("Unknown field: {0}")]
    UnknownField(FieldName),

    #[error("Field '{0}' is read-only for this record")]
    ReadonlyField(FieldName),

    #[error("No group matches the values of the new record")]
    NoMatchingGroup,

    #[error("This list is not editable")]
    NotEditable,

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("{0}")]
    InvalidOperation(String),
}
