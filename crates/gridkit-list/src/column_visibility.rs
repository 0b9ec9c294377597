//! Optional column visibility
//!
//! Columns declared `optional` can be shown or hidden by the user. The
//! choice is persisted per model and view through the [`KeyValueStore`].

use std::sync::Arc;

use gridkit_core::{ColumnSpec, FieldName, KeyValueStore, OptionalVisibility, ViewConfig};

/// Visibility of one optional column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnVisibility {
    pub name: FieldName,
    pub label: String,
    pub visible: bool,
}

pub struct ColumnVisibilityState {
    store: Arc<dyn KeyValueStore>,
    storage_key: String,
    columns: Vec<ColumnVisibility>,
}

impl std::fmt::Debug for ColumnVisibilityState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ColumnVisibilityState")
            .field("storage_key", &self.storage_key)
            .field("columns", &self.columns)
            .finish()
    }
}

impl ColumnVisibilityState {
    /// Load the persisted choice, falling back to each column's default
    pub fn load(store: Arc<dyn KeyValueStore>, config: &ViewConfig) -> Self {
        let storage_key = format!(
            "optional_fields,{},{}",
            config.model,
            config.view_id.as_deref().unwrap_or("default")
        );
        let persisted: Option<Vec<FieldName>> = store.get(&storage_key).and_then(|raw| {
            serde_json::from_str(&raw)
                .map_err(|e| {
                    tracing::warn!(key = %storage_key, error = %e, "Ignoring unreadable column preferences");
                })
                .ok()
        });

        let columns = config
            .columns
            .iter()
            .filter_map(|column| {
                let default = column.optional?;
                let visible = match &persisted {
                    Some(shown) => shown.contains(&column.name),
                    None => default == OptionalVisibility::Show,
                };
                Some(ColumnVisibility {
                    name: column.name.clone(),
                    label: column.label.clone(),
                    visible,
                })
            })
            .collect();

        Self {
            store,
            storage_key,
            columns,
        }
    }

    pub fn optional_columns(&self) -> &[ColumnVisibility] {
        &self.columns
    }

    /// Non-optional columns are always visible
    pub fn is_visible(&self, field: &str) -> bool {
        self.columns
            .iter()
            .find(|c| c.name == field)
            .is_none_or(|c| c.visible)
    }

    /// Toggle an optional column and persist the new choice
    pub fn toggle_column(&mut self, field: &str) -> Option<bool> {
        let column = self.columns.iter_mut().find(|c| c.name == field)?;
        column.visible = !column.visible;
        let visible = column.visible;
        self.persist();
        tracing::debug!(field, visible, "Toggled optional column");
        Some(visible)
    }

    /// Columns to display: not column-invisible and not hidden optionals
    pub fn displayed_columns<'a>(&self, config: &'a ViewConfig) -> Vec<&'a ColumnSpec> {
        config
            .columns
            .iter()
            .filter(|c| !c.column_invisible && self.is_visible(&c.name))
            .collect()
    }

    fn persist(&self) {
        let shown: Vec<&FieldName> = self
            .columns
            .iter()
            .filter(|c| c.visible)
            .map(|c| &c.name)
            .collect();
        match serde_json::to_string(&shown) {
            Ok(raw) => self.store.set(&self.storage_key, raw),
            Err(e) => tracing::warn!(error = %e, "Failed to serialize column preferences"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridkit_core::{FieldKind, MemoryKeyValueStore};

    fn config() -> ViewConfig {
        ViewConfig::new(
            "task",
            vec![
                ColumnSpec::new("name", FieldKind::Char),
                ColumnSpec::new("notes", FieldKind::Text).optional(OptionalVisibility::Hide),
                ColumnSpec::new("date", FieldKind::Date).optional(OptionalVisibility::Show),
            ],
        )
    }

    #[test]
    fn test_defaults_apply_without_stored_choice() {
        let state = ColumnVisibilityState::load(Arc::new(MemoryKeyValueStore::new()), &config());
        assert!(state.is_visible("name"));
        assert!(!state.is_visible("notes"));
        assert!(state.is_visible("date"));
    }

    #[test]
    fn test_choice_is_persisted() {
        let store = Arc::new(MemoryKeyValueStore::new());
        let config = config();
        let mut state = ColumnVisibilityState::load(store.clone(), &config);
        assert_eq!(state.toggle_column("notes"), Some(true));
        assert_eq!(state.toggle_column("date"), Some(false));
        assert_eq!(state.toggle_column("name"), None);

        let reloaded = ColumnVisibilityState::load(store, &config);
        assert!(reloaded.is_visible("notes"));
        assert!(!reloaded.is_visible("date"));
        let names: Vec<&str> = reloaded
            .displayed_columns(&config)
            .iter()
            .map(|c| c.name.as_str())
            .collect();
        assert_eq!(names, vec!["name", "notes"]);
    }
}
