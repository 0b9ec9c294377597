//! View configuration
//!
//! The compiled description of a list view: its columns, edit policy,
//! default order, page sizes and grouping. Arch compilation lives outside
//! this workspace; the result is handed over as a [`ViewConfig`], either
//! built in code or loaded from TOML.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{
    Condition, FieldKind, FieldName, FieldRenderer, GridError, KindRenderer, OrderSpec,
    RecordValues, Result,
};

pub const DEFAULT_LIMIT: usize = 80;
pub const DEFAULT_GROUPS_LIMIT: usize = 80;
pub const DEFAULT_COUNT_LIMIT: usize = 10_000;
pub const DEFAULT_ACTIVE_IDS_LIMIT: usize = 20_000;

/// Where new rows are created, if the list is editable at all
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Editable {
    #[default]
    None,
    Top,
    Bottom,
}

impl Editable {
    pub fn is_editable(&self) -> bool {
        !matches!(self, Self::None)
    }
}

/// Aggregate function declared on a column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregateFn {
    Sum,
    Avg,
    Min,
    Max,
    Count,
}

impl AggregateFn {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Sum => "sum",
            Self::Avg => "avg",
            Self::Min => "min",
            Self::Max => "max",
            Self::Count => "count",
        }
    }
}

/// Default visibility of an optional column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionalVisibility {
    Show,
    Hide,
}

/// A boolean attribute that is either constant or depends on record values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Modifier {
    Always(bool),
    /// True when every condition matches the record
    When(Vec<Condition>),
}

impl Default for Modifier {
    fn default() -> Self {
        Modifier::Always(false)
    }
}

impl Modifier {
    pub fn evaluate(&self, values: &RecordValues) -> bool {
        match self {
            Modifier::Always(v) => *v,
            Modifier::When(conditions) => conditions.iter().all(|c| c.matches(values)),
        }
    }

    /// Whether the modifier can be true for some record
    pub fn is_possible(&self) -> bool {
        !matches!(self, Modifier::Always(false))
    }
}

fn default_true() -> bool {
    true
}

/// One column of the list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: FieldName,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub kind: FieldKind,
    #[serde(default)]
    pub required: Modifier,
    #[serde(default)]
    pub readonly: Modifier,
    /// Hides the cell of matching records (the column stays)
    #[serde(default)]
    pub invisible: Modifier,
    /// Hides the whole column
    #[serde(default)]
    pub column_invisible: bool,
    #[serde(default)]
    pub aggregate: Option<AggregateFn>,
    #[serde(default = "default_true")]
    pub sortable: bool,
    #[serde(default)]
    pub optional: Option<OptionalVisibility>,
    /// Field holding the currency of a monetary column
    #[serde(default)]
    pub currency_field: Option<FieldName>,
    /// Widget writes directly even when the row is not in edition (boolean toggle)
    #[serde(default)]
    pub editable_while_readonly: bool,
    /// Button cells never start an edition
    #[serde(default)]
    pub is_button: bool,
}

impl ColumnSpec {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        let name = name.into();
        Self {
            label: name.clone(),
            name,
            kind,
            required: Modifier::default(),
            readonly: Modifier::default(),
            invisible: Modifier::default(),
            column_invisible: false,
            aggregate: None,
            sortable: true,
            optional: None,
            currency_field: None,
            editable_while_readonly: false,
            is_button: false,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = Modifier::Always(true);
        self
    }

    pub fn readonly(mut self) -> Self {
        self.readonly = Modifier::Always(true);
        self
    }

    pub fn readonly_when(mut self, conditions: Vec<Condition>) -> Self {
        self.readonly = Modifier::When(conditions);
        self
    }

    pub fn invisible_when(mut self, conditions: Vec<Condition>) -> Self {
        self.invisible = Modifier::When(conditions);
        self
    }

    pub fn with_aggregate(mut self, aggregate: AggregateFn) -> Self {
        self.aggregate = Some(aggregate);
        self
    }

    pub fn not_sortable(mut self) -> Self {
        self.sortable = false;
        self
    }

    pub fn optional(mut self, visibility: OptionalVisibility) -> Self {
        self.optional = Some(visibility);
        self
    }

    pub fn with_currency(mut self, field: impl Into<String>) -> Self {
        self.currency_field = Some(field.into());
        self
    }

    pub fn toggle_widget(mut self) -> Self {
        self.editable_while_readonly = true;
        self
    }

    pub fn button(mut self) -> Self {
        self.is_button = true;
        self
    }

    pub fn is_required(&self, values: &RecordValues) -> bool {
        self.required.evaluate(values)
    }

    pub fn is_readonly(&self, values: &RecordValues) -> bool {
        self.kind == FieldKind::Handle || self.is_button || self.readonly.evaluate(values)
    }

    pub fn is_invisible(&self, values: &RecordValues) -> bool {
        self.column_invisible || self.invisible.evaluate(values)
    }

    /// Whether a user can type into this cell for the given record
    pub fn is_editable_for(&self, values: &RecordValues) -> bool {
        !self.is_readonly(values) && !self.is_invisible(values)
    }
}

/// Action button displayed in group headers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupHeaderButton {
    pub name: String,
    #[serde(default)]
    pub label: String,
    /// Button is visible when every condition matches the group values
    #[serde(default)]
    pub visible_when: Vec<Condition>,
}

fn default_limit() -> usize {
    DEFAULT_LIMIT
}

fn default_groups_limit() -> usize {
    DEFAULT_GROUPS_LIMIT
}

fn default_count_limit() -> usize {
    DEFAULT_COUNT_LIMIT
}

fn default_active_ids_limit() -> usize {
    DEFAULT_ACTIVE_IDS_LIMIT
}

/// Compiled list view configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewConfig {
    pub model: String,
    #[serde(default)]
    pub view_id: Option<String>,
    #[serde(default)]
    pub columns: Vec<ColumnSpec>,
    #[serde(default)]
    pub editable: Editable,
    #[serde(default)]
    pub multi_edit: bool,
    #[serde(default)]
    pub default_order: Vec<OrderSpec>,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default = "default_groups_limit")]
    pub groups_limit: usize,
    #[serde(default = "default_count_limit")]
    pub count_limit: usize,
    /// Server-advertised maximum number of ids a bulk operation handles at once
    #[serde(default = "default_active_ids_limit")]
    pub active_ids_limit: usize,
    /// Open every group when groups are loaded
    #[serde(default)]
    pub expand: bool,
    #[serde(default)]
    pub group_by: Vec<FieldName>,
    #[serde(default)]
    pub header_buttons: Vec<GroupHeaderButton>,
    #[serde(skip)]
    renderer_overrides: HashMap<FieldName, Arc<dyn FieldRenderer>>,
}

impl ViewConfig {
    pub fn new(model: impl Into<String>, columns: Vec<ColumnSpec>) -> Self {
        Self {
            model: model.into(),
            view_id: None,
            columns,
            editable: Editable::None,
            multi_edit: false,
            default_order: Vec::new(),
            limit: DEFAULT_LIMIT,
            groups_limit: DEFAULT_GROUPS_LIMIT,
            count_limit: DEFAULT_COUNT_LIMIT,
            active_ids_limit: DEFAULT_ACTIVE_IDS_LIMIT,
            expand: false,
            group_by: Vec::new(),
            header_buttons: Vec::new(),
            renderer_overrides: HashMap::new(),
        }
    }

    /// Parse and validate a configuration from TOML
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: ViewConfig = toml::from_str(source)?;
        config.validate()?;
        tracing::debug!(
            model = %config.model,
            columns = config.columns.len(),
            "Loaded view configuration"
        );
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.model.trim().is_empty() {
            return Err(GridError::Configuration("model must not be empty".into()));
        }
        if self.limit == 0 || self.groups_limit == 0 {
            return Err(GridError::Configuration(
                "limit and groups_limit must be positive".into(),
            ));
        }
        let mut seen = HashSet::new();
        for column in &self.columns {
            if !seen.insert(column.name.as_str()) {
                return Err(GridError::Configuration(format!(
                    "duplicate column '{}'",
                    column.name
                )));
            }
        }
        let handles = self
            .columns
            .iter()
            .filter(|c| c.kind == FieldKind::Handle)
            .count();
        if handles > 1 {
            return Err(GridError::Configuration(
                "a list declares at most one handle field".into(),
            ));
        }
        if let Some(field) = self.group_by.iter().find(|f| !seen.contains(f.as_str())) {
            return Err(GridError::Configuration(format!(
                "cannot group by unknown field '{}'",
                field
            )));
        }
        Ok(())
    }

    pub fn with_editable(mut self, editable: Editable) -> Self {
        self.editable = editable;
        self
    }

    pub fn with_multi_edit(mut self) -> Self {
        self.multi_edit = true;
        self
    }

    pub fn with_default_order(mut self, order: Vec<OrderSpec>) -> Self {
        self.default_order = order;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_groups_limit(mut self, limit: usize) -> Self {
        self.groups_limit = limit;
        self
    }

    pub fn with_count_limit(mut self, limit: usize) -> Self {
        self.count_limit = limit;
        self
    }

    pub fn with_active_ids_limit(mut self, limit: usize) -> Self {
        self.active_ids_limit = limit;
        self
    }

    pub fn with_group_by(mut self, group_by: Vec<&str>) -> Self {
        self.group_by = group_by.into_iter().map(String::from).collect();
        self
    }

    pub fn with_expand(mut self) -> Self {
        self.expand = true;
        self
    }

    pub fn with_header_button(mut self, button: GroupHeaderButton) -> Self {
        self.header_buttons.push(button);
        self
    }

    /// Replace the default renderer of a column
    pub fn with_renderer(mut self, field: impl Into<String>, renderer: Arc<dyn FieldRenderer>) -> Self {
        self.renderer_overrides.insert(field.into(), renderer);
        self
    }

    pub fn column(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// The manual-order field, if the view declares a drag handle
    pub fn handle_field(&self) -> Option<&str> {
        self.columns
            .iter()
            .find(|c| c.kind == FieldKind::Handle)
            .map(|c| c.name.as_str())
    }

    /// Fields to read for every record
    pub fn field_names(&self) -> Vec<FieldName> {
        let mut fields: Vec<FieldName> = self.columns.iter().map(|c| c.name.clone()).collect();
        for column in &self.columns {
            if let Some(currency) = &column.currency_field {
                if !fields.contains(currency) {
                    fields.push(currency.clone());
                }
            }
        }
        fields
    }

    /// Columns that declare an aggregate function
    pub fn aggregated_columns(&self) -> impl Iterator<Item = &ColumnSpec> {
        self.columns.iter().filter(|c| c.aggregate.is_some())
    }

    pub fn renderer_for(&self, field: &str) -> Arc<dyn FieldRenderer> {
        if let Some(renderer) = self.renderer_overrides.get(field) {
            return renderer.clone();
        }
        let kind = self.column(field).map(|c| c.kind).unwrap_or_default();
        Arc::new(KindRenderer::new(kind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ConditionOp, SortDirection, Value};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_from_toml_defaults() {
        let config = ViewConfig::from_toml_str(
            r#"
            model = "sale.order"
            editable = "bottom"
            multi_edit = true
            group_by = ["state"]

            [[default_order]]
            field = "sequence"

            [[columns]]
            name = "sequence"
            kind = "handle"

            [[columns]]
            name = "name"
            required = true

            [[columns]]
            name = "amount"
            kind = "monetary"
            aggregate = "sum"
            currency_field = "currency_id"

            [[columns]]
            name = "state"
            "#,
        )
        .expect("valid config");

        assert_eq!(config.limit, DEFAULT_LIMIT);
        assert_eq!(config.count_limit, DEFAULT_COUNT_LIMIT);
        assert_eq!(config.editable, Editable::Bottom);
        assert_eq!(config.handle_field(), Some("sequence"));
        assert_eq!(config.default_order[0].direction, SortDirection::Asc);
        assert!(config.column("name").map(|c| c.required == Modifier::Always(true)).unwrap_or(false));
        assert_eq!(
            config.field_names(),
            vec!["sequence", "name", "amount", "state", "currency_id"]
        );
    }

    #[test]
    fn test_conditional_modifier_from_toml() {
        let config = ViewConfig::from_toml_str(
            r#"
            model = "task"

            [[columns]]
            name = "name"
            readonly = [{ field = "state", op = "equal", value = { type = "string", value = "done" } }]
            "#,
        )
        .expect("valid config");

        let column = config.column("name").expect("column");
        let mut values = RecordValues::new();
        values.insert("state".into(), Value::from("done"));
        assert!(column.is_readonly(&values));
        values.insert("state".into(), Value::from("draft"));
        assert!(!column.is_readonly(&values));
    }

    #[test]
    fn test_rejects_two_handles() {
        let config = ViewConfig::new(
            "task",
            vec![
                ColumnSpec::new("a", FieldKind::Handle),
                ColumnSpec::new("b", FieldKind::Handle),
            ],
        );
        assert!(matches!(config.validate(), Err(GridError::Configuration(_))));
    }

    #[test]
    fn test_rejects_unknown_group_by() {
        let config = ViewConfig::new("task", vec![ColumnSpec::new("a", FieldKind::Char)])
            .with_group_by(vec!["b"]);
        assert!(matches!(config.validate(), Err(GridError::Configuration(_))));
        assert!(config.with_group_by(vec!["a"]).validate().is_ok());
    }

    #[test]
    fn test_invisible_cells_are_not_editable() {
        let column = ColumnSpec::new("qty", FieldKind::Integer)
            .invisible_when(vec![Condition::new("qty", ConditionOp::LessThan, 0i64)]);
        let mut values = RecordValues::new();
        values.insert("qty".into(), Value::Integer(-1));
        assert!(!column.is_editable_for(&values));
        values.insert("qty".into(), Value::Integer(1));
        assert!(column.is_editable_for(&values));
    }
}
