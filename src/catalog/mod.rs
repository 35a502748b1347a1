//! Binding catalog: the two lookup tables a conversion consults.
//!
//! - control bindings: `"<owner>.<control>"` (sanitized) → the
//!   `(table, column)` the control is bound to
//! - column types: bare `column` or `table.column` (lowercase) → the
//!   target PostgreSQL type name
//!
//! Both tables are optional; an absent catalog simply means no type
//! refinement and no reference resolution beyond the fallback paths.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::utils::sanitize::{sanitize, sanitize_key};

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read catalog file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse catalog JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Where a bound control stores its value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnBinding {
    pub table: String,
    pub column: String,
}

/// Immutable lookup tables for one conversion run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BindingCatalog {
    /// Keyed by sanitized `"owner.control"`.
    #[serde(default)]
    control_bindings: HashMap<String, ColumnBinding>,
    /// Keyed by lowercase bare `column` or `table.column`.
    #[serde(default)]
    column_types: HashMap<String, String>,
}

impl BindingCatalog {
    pub fn new(
        control_bindings: HashMap<String, ColumnBinding>,
        column_types: HashMap<String, String>,
    ) -> Self {
        // Re-key through the sanitizer so callers may pass raw names.
        let control_bindings = control_bindings
            .into_iter()
            .map(|(k, v)| {
                let key = match k.split_once('.') {
                    Some((owner, control)) => sanitize_key(owner, control),
                    None => sanitize(&k),
                };
                (key, v)
            })
            .collect();
        let column_types = column_types
            .into_iter()
            .map(|(k, v)| (k.to_lowercase(), v))
            .collect();
        Self {
            control_bindings,
            column_types,
        }
    }

    pub fn from_json_file(path: &Path) -> Result<Self, CatalogError> {
        let raw = std::fs::read_to_string(path)?;
        let catalog: BindingCatalog = serde_json::from_str(&raw)?;
        Ok(Self::new(catalog.control_bindings, catalog.column_types))
    }

    pub fn add_control_binding(&mut self, owner: &str, control: &str, binding: ColumnBinding) {
        self.control_bindings
            .insert(sanitize_key(owner, control), binding);
    }

    pub fn add_column_type(&mut self, key: &str, pg_type: &str) {
        self.column_types
            .insert(key.to_lowercase(), pg_type.to_string());
    }

    /// Resolve an owner-qualified control reference.
    pub fn lookup_control(&self, owner: &str, control: &str) -> Option<&ColumnBinding> {
        self.control_bindings.get(&sanitize_key(owner, control))
    }

    /// Resolve a control by name alone, ignoring the owner component.
    /// Used for 2-part and ancestor-chained references.
    pub fn search_by_control(&self, control: &str) -> Option<&ColumnBinding> {
        let wanted = sanitize(control);
        self.control_bindings
            .iter()
            .find(|(key, _)| key.split_once('.').map(|(_, c)| c) == Some(wanted.as_str()))
            .map(|(_, binding)| binding)
    }

    /// Type of a column, preferring the table-qualified key.
    pub fn column_type(&self, table: Option<&str>, column: &str) -> Option<&str> {
        if let Some(table) = table {
            let qualified = format!("{}.{}", table.to_lowercase(), column.to_lowercase());
            if let Some(t) = self.column_types.get(&qualified) {
                return Some(t.as_str());
            }
        }
        self.column_types
            .get(&column.to_lowercase())
            .map(|t| t.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.control_bindings.is_empty() && self.column_types.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn catalog() -> BindingCatalog {
        let mut c = BindingCatalog::default();
        c.add_control_binding(
            "frmRecipe",
            "txtRecipeId",
            ColumnBinding {
                table: "recipe".into(),
                column: "id".into(),
            },
        );
        c.add_column_type("recipe.id", "bigint");
        c.add_column_type("name", "text");
        c
    }

    #[test]
    fn test_lookup_is_case_insensitive_via_sanitize() {
        let c = catalog();
        assert!(c.lookup_control("FRMRECIPE", "TXTRECIPEID").is_some());
        assert!(c.lookup_control("frm recipe", "txtRecipeId").is_none());
    }

    #[test]
    fn test_search_by_control_ignores_owner() {
        let c = catalog();
        let b = c.search_by_control("TxtRecipeId").unwrap();
        assert_eq!(b.table, "recipe");
        assert!(c.search_by_control("missing").is_none());
    }

    #[test]
    fn test_column_type_prefers_qualified() {
        let c = catalog();
        assert_eq!(c.column_type(Some("Recipe"), "Id"), Some("bigint"));
        assert_eq!(c.column_type(None, "NAME"), Some("text"));
        assert_eq!(c.column_type(None, "id"), None);
    }

    #[test]
    fn test_from_json_file() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(
            f,
            r#"{{
                "control_bindings": {{"frmMain.txtId": {{"table": "orders", "column": "order_id"}}}},
                "column_types": {{"Orders.Order_Id": "bigint"}}
            }}"#
        )
        .unwrap();
        let c = BindingCatalog::from_json_file(f.path()).unwrap();
        assert!(c.lookup_control("frmMain", "txtId").is_some());
        assert_eq!(c.column_type(Some("orders"), "order_id"), Some("bigint"));
    }
}
