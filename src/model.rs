//! Input and output types for the query conversion pipeline.

use serde::{Deserialize, Serialize};

/// One query definition extracted from the legacy database file.
///
/// `type_code` carries the legacy engine's saved-query type; see
/// [`QueryKind::from_code`] for the recognized values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryDescriptor {
    pub name: String,
    #[serde(default)]
    pub type_label: String,
    pub type_code: i32,
    pub raw_text: String,
    #[serde(default)]
    pub declared_parameters: Vec<DeclaredParameter>,
}

/// A parameter declared on the legacy query (PARAMETERS clause).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeclaredParameter {
    pub name: String,
    #[serde(default)]
    pub declared_type: String,
}

/// Legacy saved-query type, decoded from the descriptor's type code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    Select,
    Crosstab,
    Delete,
    Update,
    Append,
    MakeTable,
    Union,
    Unknown,
}

impl QueryKind {
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => QueryKind::Select,
            16 => QueryKind::Crosstab,
            32 => QueryKind::Delete,
            48 => QueryKind::Update,
            64 => QueryKind::Append,
            80 => QueryKind::MakeTable,
            128 => QueryKind::Union,
            _ => QueryKind::Unknown,
        }
    }

    /// Action queries wrap their statement in a row-count procedure.
    pub fn is_action(self) -> bool {
        matches!(
            self,
            QueryKind::Delete | QueryKind::Update | QueryKind::Append | QueryKind::MakeTable
        )
    }
}

/// Shape of the generated database object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectType {
    View,
    Procedure,
    None,
}

/// A `(table, column)` pair a bound control reference reads from the
/// session state relation. One entry per textual occurrence, in
/// resolution order. Session-variable lookups carry no control binding
/// and are not listed; their `_tempvars` filter sits in the statement
/// text itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateEntry {
    pub table: String,
    pub column: String,
}

/// A parameter that survived filtering, renamed for the target signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedParameter {
    pub source_name: String,
    pub target_identifier: String,
    pub target_type: String,
}

impl ResolvedParameter {
    pub fn new(source_name: &str, target_identifier: &str, target_type: &str) -> Self {
        Self {
            source_name: source_name.to_string(),
            target_identifier: target_identifier.to_string(),
            target_type: target_type.to_string(),
        }
    }
}

/// Everything one conversion call produces. Statements are ordered:
/// bootstrap statements (custom aggregates), if any, precede the main
/// statement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionResult {
    pub object_name: String,
    pub object_type: ObjectType,
    pub statements: Vec<String>,
    pub warnings: Vec<String>,
    pub referenced_state_entries: Vec<StateEntry>,
    /// Reserved extension point for calculated-column helper extraction.
    /// Always empty; kept for downstream interface compatibility.
    pub extracted_helpers: Vec<String>,
}

impl ConversionResult {
    /// Serialize for downstream consumers (statement runners, state-entry
    /// trackers).
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn empty(object_name: &str) -> Self {
        Self {
            object_name: object_name.to_string(),
            object_type: ObjectType::None,
            statements: Vec::new(),
            warnings: Vec::new(),
            referenced_state_entries: Vec::new(),
            extracted_helpers: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_from_code() {
        assert_eq!(QueryKind::from_code(0), QueryKind::Select);
        assert_eq!(QueryKind::from_code(16), QueryKind::Crosstab);
        assert_eq!(QueryKind::from_code(32), QueryKind::Delete);
        assert_eq!(QueryKind::from_code(48), QueryKind::Update);
        assert_eq!(QueryKind::from_code(64), QueryKind::Append);
        assert_eq!(QueryKind::from_code(80), QueryKind::MakeTable);
        assert_eq!(QueryKind::from_code(128), QueryKind::Union);
        assert_eq!(QueryKind::from_code(7), QueryKind::Unknown);
    }

    #[test]
    fn test_descriptor_deserializes_with_defaults() {
        let d: QueryDescriptor = serde_json::from_str(
            r#"{"name": "qryOrders", "type_code": 0, "raw_text": "SELECT 1"}"#,
        )
        .unwrap();
        assert!(d.declared_parameters.is_empty());
        assert_eq!(d.type_label, "");
    }
}
