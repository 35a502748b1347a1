//! Live reference resolution: session variables, form/report controls,
//! parent-chained controls.
//!
//! A live reference names runtime UI or session state with no
//! compile-time value. Each textual occurrence is replaced by a fresh
//! `ssN.value` lookup against the session state relation, and the join
//! plus its filter condition are recorded on an explicit [`ResolverState`]
//! that the caller folds back into the statement. Session-variable
//! references resolve before form/report references, so alias numbering
//! is stable regardless of where each kind appears in the text.
//!
//! Every occurrence gets its own alias: two identical references in one
//! filter produce `ss1` and `ss2`, never a shared join.

use std::sync::LazyLock;

use regex::Regex;

use crate::catalog::BindingCatalog;
use crate::model::{ResolvedParameter, StateEntry};
use crate::utils::sanitize::sanitize;

use super::scanner::find_top_level_keyword;

/// Table literal the session-variable rows live under.
pub const TEMPVARS_TABLE: &str = "_tempvars";
/// The session-scoped read surface for live values. Pre-exists in the
/// target database; never schema-qualified by the pipeline.
pub const STATE_RELATION: &str = "session_state";

/// Session-variable reference in bracket, bang or call syntax:
/// `[TempVars]![x]`, `TempVars!x`, `TempVars("x")`.
static TEMPVAR_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)\[?TempVars\]?(?:\s*!\s*\[(?P<b>[^\]]+)\]|\s*!\s*(?P<w>[A-Za-z_]\w*)|\s*\(\s*['"](?P<q>[^'"]+)['"]\s*\))"#,
    )
    .unwrap()
});

/// Owner-qualified control reference:
/// `Forms!frmMain!txtId`, `[Forms]![frm Main]![txt Id]`, `Reports.rpt.ctl`.
static THREE_PART_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\[?(?:Forms|Reports)\]?\s*[!.]\s*(?:\[(?P<ob>[^\]]+)\]|(?P<ow>[A-Za-z_]\w*))\s*[!.]\s*(?:\[(?P<cb>[^\]]+)\]|(?P<cw>[A-Za-z_]\w*))",
    )
    .unwrap()
});

/// Chained-ancestor reference: `Parent!x`, `Me.Parent!Parent!x`. The
/// ancestor chain is discarded once a concrete control name is reached.
static PARENT_CHAIN_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(?:\[?Me\]?\s*[!.]\s*)?(?:\[?Parent\]?\s*[!.]\s*)+(?:\[(?P<cb>[^\]]+)\]|(?P<cw>[A-Za-z_]\w*))",
    )
    .unwrap()
});

/// Unqualified control reference: `Me!x`, `Me.x`, `Form!x`, `Report!x`.
/// The dot form is accepted for `Me` only; `form.x` / `report.x` would
/// collide with ordinary table-qualified column references.
static TWO_PART_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(?:\[|\b)(?:(?:Form|Report)\]?\s*!|Me\]?\s*[!.])\s*(?:\[(?P<cb>[^\]]+)\]|(?P<cw>[A-Za-z_]\w*))",
    )
    .unwrap()
});

/// Accumulated output of the resolution pass. The alias counter is
/// threaded through this value, never global.
#[derive(Debug, Default)]
pub struct ResolverState {
    next_alias: usize,
    /// `session_state ssN` source entries, in alias order.
    pub joins: Vec<String>,
    /// `ssN.table_name = '...' AND ssN.column_name = '...'` filters.
    pub conditions: Vec<String>,
    pub entries: Vec<StateEntry>,
    /// Parameters synthesized from resolved session-variable references.
    pub tempvar_params: Vec<ResolvedParameter>,
    pub warnings: Vec<String>,
}

impl ResolverState {
    fn fresh_alias(&mut self) -> String {
        self.next_alias += 1;
        format!("ss{}", self.next_alias)
    }

    fn emit_join(&mut self, table: &str, column: &str) -> String {
        let alias = self.fresh_alias();
        self.joins.push(format!("{} {}", STATE_RELATION, alias));
        self.conditions.push(format!(
            "{a}.table_name = '{t}' AND {a}.column_name = '{c}'",
            a = alias,
            t = table,
            c = column
        ));
        alias
    }
}

/// Resolve every live reference in `text`, in source order per kind.
pub fn resolve(text: &str, catalog: &BindingCatalog) -> (String, ResolverState) {
    let mut state = ResolverState::default();

    // Session variables first: alias numbering is test-observable.
    let out = replace_matches(text, &TEMPVAR_PATTERN, |caps, state: &mut ResolverState| {
        let var = capture_name(caps, &["b", "w", "q"]);
        let column = sanitize(&var);
        let alias = state.emit_join(TEMPVARS_TABLE, &column);
        state
            .tempvar_params
            .push(ResolvedParameter::new(&var, &format!("p_{}", column), "text"));
        format!("{}.value", alias)
    }, &mut state);

    let out = replace_matches(&out, &THREE_PART_PATTERN, |caps, state: &mut ResolverState| {
        let owner = capture_name(caps, &["ob", "ow"]);
        let control = capture_name(caps, &["cb", "cw"]);
        let (owner_s, control_s) = (sanitize(&owner), sanitize(&control));
        match catalog.lookup_control(&owner, &control) {
            Some(binding) => {
                let alias = state.emit_join(&binding.table, &binding.column);
                state.entries.push(StateEntry {
                    table: binding.table.clone(),
                    column: binding.column.clone(),
                });
                format!("{}.value", alias)
            }
            None => {
                // Best-effort fallback: raw sanitized names as the lookup key.
                state.warnings.push(format!(
                    "Control reference {}.{} is not in the binding map; \
                     using raw names as the state lookup key",
                    owner_s, control_s
                ));
                let alias = state.emit_join(&owner_s, &control_s);
                format!("{}.value", alias)
            }
        }
    }, &mut state);

    let out = replace_matches(&out, &PARENT_CHAIN_PATTERN, |caps, state: &mut ResolverState| {
        resolve_by_control_name(&capture_name(caps, &["cb", "cw"]), catalog, state)
    }, &mut state);

    let out = replace_matches(&out, &TWO_PART_PATTERN, |caps, state: &mut ResolverState| {
        resolve_by_control_name(&capture_name(caps, &["cb", "cw"]), catalog, state)
    }, &mut state);

    (out, state)
}

/// 2-part and ancestor-chained references share the owner-independent
/// search. No safe fallback table name exists without an owner, so a
/// miss substitutes an annotated null instead of a join.
fn resolve_by_control_name(
    control: &str,
    catalog: &BindingCatalog,
    state: &mut ResolverState,
) -> String {
    match catalog.search_by_control(control) {
        Some(binding) => {
            let alias = state.emit_join(&binding.table, &binding.column);
            state.entries.push(StateEntry {
                table: binding.table.clone(),
                column: binding.column.clone(),
            });
            format!("{}.value", alias)
        }
        None => {
            let name = sanitize(control);
            state.warnings.push(format!(
                "Control reference {} has no owner and no binding map entry; \
                 substituting NULL",
                name
            ));
            format!("NULL /* unresolved control reference: {} */", name)
        }
    }
}

fn capture_name(caps: &regex::Captures, groups: &[&str]) -> String {
    groups
        .iter()
        .find_map(|g| caps.name(g))
        .map(|m| m.as_str().to_string())
        .unwrap_or_default()
}

/// Replace all matches in source order, building the output forward so
/// alias numbering follows textual order.
fn replace_matches<F>(
    text: &str,
    pattern: &Regex,
    mut rewrite: F,
    state: &mut ResolverState,
) -> String
where
    F: FnMut(&regex::Captures, &mut ResolverState) -> String,
{
    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;
    for caps in pattern.captures_iter(text) {
        let m = caps.get(0).unwrap();
        out.push_str(&text[cursor..m.start()]);
        out.push_str(&rewrite(&caps, state));
        cursor = m.end();
    }
    out.push_str(&text[cursor..]);
    out
}

/// Fold the accumulated joins and filter conditions back into the
/// statement. Join placement depends on the statement verb: selects get
/// CROSS JOINs after the source list, UPDATE gets a FROM list, DELETE a
/// USING list, so the emitted statement stays valid PostgreSQL.
pub fn apply_state_joins(text: &str, state: &mut ResolverState) -> String {
    if state.joins.is_empty() {
        return text.to_string();
    }
    if find_top_level_keyword(text, &["union"], 0).is_some() {
        state.warnings.push(
            "Statement has a top-level UNION; state joins are attached to \
             the first branch only"
                .to_string(),
        );
    }
    let verb = text
        .trim_start()
        .split_whitespace()
        .next()
        .unwrap_or("")
        .to_lowercase();

    let mut out = text.to_string();
    let join_clause = match verb.as_str() {
        "update" => format!(" FROM {}", state.joins.join(", ")),
        "delete" => format!(" USING {}", state.joins.join(", ")),
        _ => state
            .joins
            .iter()
            .map(|j| format!(" CROSS JOIN {}", j))
            .collect::<Vec<_>>()
            .join(""),
    };

    let insert_at = match verb.as_str() {
        "update" | "delete" => clause_boundary(&out, &["where"]),
        _ => match find_top_level_keyword(&out, &["from"], 0) {
            Some(from_pos) => clause_boundary_from(&out, from_pos + 4),
            None => {
                // SELECT without a source list
                let at = clause_boundary(&out, &["where"]);
                splice(
                    &mut out,
                    at,
                    &format!(" FROM {}", state.joins.join(" CROSS JOIN ")),
                );
                return conjoin_conditions(&out, state);
            }
        },
    };
    splice(&mut out, insert_at, &join_clause);
    conjoin_conditions(&out, state)
}

/// Insert `clause` at the trimmed end of `text[..at]`. The whitespace
/// between the insertion point and whatever follows is preserved, so a
/// clause spliced before a trailing keyword keeps a token boundary on
/// both sides.
fn splice(text: &mut String, at: usize, clause: &str) {
    let pos = text[..at].trim_end().len();
    text.insert_str(pos, clause);
}

/// End of the clause that starts the statement body: the position of the
/// first top-level trailing keyword, or the end of the text.
fn clause_boundary(text: &str, extra: &[&str]) -> usize {
    let mut keywords = vec!["group by", "having", "order by", "limit", "union"];
    keywords.extend_from_slice(extra);
    find_top_level_keyword(text, &keywords, 0).unwrap_or(text.len())
}

fn clause_boundary_from(text: &str, from: usize) -> usize {
    find_top_level_keyword(
        text,
        &["where", "group by", "having", "order by", "limit", "union"],
        from,
    )
    .unwrap_or(text.len())
}

/// Conjoin the join filter conditions into the WHERE clause, creating
/// one when the statement had no filter.
fn conjoin_conditions(text: &str, state: &ResolverState) -> String {
    let conds = state.conditions.join(" AND ");
    let mut out = text.to_string();
    match find_top_level_keyword(&out, &["where"], 0) {
        Some(where_pos) => {
            let body_start = where_pos + "where".len();
            let body_end = find_top_level_keyword(
                &out,
                &["group by", "having", "order by", "limit", "union"],
                body_start,
            )
            .unwrap_or(out.len());
            let existing = out[body_start..body_end].trim().to_string();
            let mut replacement = format!(" ({}) AND {}", existing, conds);
            if body_end < out.len() {
                replacement.push(' ');
            }
            out.replace_range(body_start..body_end, &replacement);
        }
        None => {
            let at = clause_boundary(&out, &[]);
            splice(&mut out, at, &format!(" WHERE {}", conds));
        }
    }
    out
}
