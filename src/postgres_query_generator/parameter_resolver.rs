//! Declared-parameter filtering, renaming and type inference.
//!
//! The legacy engine declares live references (session variables, form
//! and parent controls) as if they were query parameters. Those resolve
//! through the reference resolver to state-table joins, not function
//! arguments, so they are filtered out here — and their presence or
//! absence is exactly what decides whether the converted object becomes
//! a view or a procedure.

use std::sync::LazyLock;

use regex::Regex;

use crate::catalog::BindingCatalog;
use crate::model::{DeclaredParameter, ResolvedParameter};
use crate::utils::sanitize::sanitize;

/// Generic default type for parameters nothing refined.
pub const DEFAULT_PARAM_TYPE: &str = "text";

/// Owner-reference markers that flag a declared parameter as a live
/// reference rather than a real scalar argument.
const LIVE_MARKERS: [&str; 9] = [
    "tempvars", "forms", "form", "reports", "report", "parent", "me", "screen", "activeform",
];

static SEGMENT_SPLIT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[!.\[\]]+").unwrap());

/// True when a declared parameter's name is itself a live reference
/// (dotted/banged, or any segment is an owner marker).
pub fn is_live_reference_name(name: &str) -> bool {
    SEGMENT_SPLIT
        .split(name)
        .filter(|s| !s.is_empty())
        .any(|segment| LIVE_MARKERS.contains(&segment.to_lowercase().as_str()))
}

/// Declared parameters that survive live-reference filtering, as
/// `(sanitized source name, target identifier)` pairs. The syntax
/// translator uses this to rewrite bracketed occurrences in the text.
pub fn surviving_params(declared: &[DeclaredParameter]) -> Vec<(String, String)> {
    declared
        .iter()
        .filter(|p| !is_live_reference_name(&p.name))
        .map(|p| {
            let source = sanitize(&p.name);
            let target = format!("p_{}", source);
            (source, target)
        })
        .collect()
}

/// Outcome of the parameter pass: the final signature list plus the
/// working text with bare parameter occurrences renamed.
#[derive(Debug)]
pub struct ParameterResolution {
    pub parameters: Vec<ResolvedParameter>,
    pub text: String,
}

/// Build the final parameter list and rename bare occurrences.
///
/// `tempvar_params` are the parameters synthesized from resolved
/// session-variable references; form/report references never become
/// parameters.
pub fn resolve(
    text: &str,
    declared: &[DeclaredParameter],
    tempvar_params: &[ResolvedParameter],
    catalog: &BindingCatalog,
) -> ParameterResolution {
    let mut parameters: Vec<ResolvedParameter> = Vec::new();
    let mut out = text.to_string();

    for p in declared.iter().filter(|p| !is_live_reference_name(&p.name)) {
        let source = sanitize(&p.name);
        let target = format!("p_{}", source);
        out = rename_bare_occurrences(&out, &p.name, &target);
        parameters.push(ResolvedParameter::new(
            &p.name,
            &target,
            map_declared_type(&p.declared_type),
        ));
    }
    parameters.extend(tempvar_params.iter().cloned());

    // Dedupe by target identifier, first declaration wins.
    let mut seen = std::collections::HashSet::new();
    parameters.retain(|p| seen.insert(p.target_identifier.clone()));

    for p in parameters.iter_mut() {
        if p.target_type == DEFAULT_PARAM_TYPE {
            if let Some(inferred) = infer_type(&out, &p.target_identifier, catalog) {
                p.target_type = inferred;
            }
        }
    }

    ParameterResolution {
        parameters,
        text: out,
    }
}

fn map_declared_type(declared: &str) -> &'static str {
    match declared.to_lowercase().as_str() {
        "long" => "bigint",
        "integer" | "int" | "short" | "byte" => "integer",
        "datetime" | "date" | "date/time" | "date with time" => "timestamp",
        "currency" => "numeric",
        "double" => "double precision",
        "single" => "real",
        "bit" | "yesno" | "yes/no" | "boolean" => "boolean",
        _ => DEFAULT_PARAM_TYPE,
    }
}

/// Replace whole-word occurrences of a single-word parameter name with
/// its target identifier. Multi-word names only ever appear bracketed
/// and are handled during bracket conversion.
fn rename_bare_occurrences(text: &str, source_name: &str, target: &str) -> String {
    if !source_name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return text.to_string();
    }
    let pattern = Regex::new(&format!(r"(?i)\b{}\b", regex::escape(source_name))).unwrap();
    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;
    for m in pattern.find_iter(text) {
        let preceded = text[..m.start()].chars().next_back();
        out.push_str(&text[cursor..m.start()]);
        if matches!(preceded, Some('.') | Some('"') | Some('\'') | Some('[')) {
            out.push_str(m.as_str());
        } else {
            out.push_str(target);
        }
        cursor = m.end();
    }
    out.push_str(&text[cursor..]);
    out
}

/// Comparison between a parameter and a known column reference.
/// Captures either side so `col = p_x` and `p_x = col` both infer.
fn infer_type(text: &str, target: &str, catalog: &BindingCatalog) -> Option<String> {
    let column_then_param = Regex::new(&format!(
        r#"(?i)([\w"]+(?:\.[\w"]+)?)\s*(?:=|<>|!=|<=|>=|<|>)\s*{}\b"#,
        regex::escape(target)
    ))
    .unwrap();
    let param_then_column = Regex::new(&format!(
        r#"(?i)\b{}\s*(?:=|<>|!=|<=|>=|<|>)\s*([\w"]+(?:\.[\w"]+)?)"#,
        regex::escape(target)
    ))
    .unwrap();

    for caps in column_then_param
        .captures_iter(text)
        .chain(param_then_column.captures_iter(text))
    {
        let column_ref = caps[1].replace('"', "");
        let (table, column) = match column_ref.split_once('.') {
            Some((t, c)) => (Some(t.to_string()), c.to_string()),
            None => (None, column_ref.clone()),
        };
        if let Some(t) = catalog.column_type(table.as_deref(), &column) {
            return Some(t.to_string());
        }
    }
    None
}
