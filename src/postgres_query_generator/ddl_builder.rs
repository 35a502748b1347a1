//! Final stage: route the converted text to an output shape and wrap it
//! in the matching DDL statement(s).
//!
//! The routing table, from the legacy saved-query type:
//!
//! | kind                      | shape                                      |
//! |---------------------------|--------------------------------------------|
//! | select / union, no params | view                                       |
//! | select / union, params    | table-returning function (record fallback) |
//! | update / delete / append  | integer-returning row-count function       |
//! | make-table                | drop-recreate row-count function           |
//! | crosstab                  | none, warning                              |
//! | unknown / empty input     | none, warning                              |

use crate::model::{ObjectType, QueryKind, ResolvedParameter};
use crate::postgres_query_generator::scanner;
use crate::utils::sanitize::sanitize;

/// What the builder hands back to `convert`.
#[derive(Debug)]
pub struct DdlOutput {
    pub object_type: ObjectType,
    pub statements: Vec<String>,
    pub warnings: Vec<String>,
}

impl DdlOutput {
    fn none(warning: String) -> Self {
        Self {
            object_type: ObjectType::None,
            statements: Vec::new(),
            warnings: vec![warning],
        }
    }
}

/// Build the DDL for one converted query.
///
/// `text` is the fully rewritten statement body; `object_name` is the
/// already-sanitized target object name. `has_real_parameters` is true
/// only when a *declared* parameter survived live-reference filtering —
/// parameters synthesized from session-variable references ride along in
/// `parameters` for procedure signatures but never flip a read query
/// from view to procedure. Bootstrap statements for the custom
/// `first`/`last` aggregates are prepended when the function translator
/// flagged a use.
pub fn build(
    object_name: &str,
    kind: QueryKind,
    text: &str,
    schema: &str,
    parameters: &[ResolvedParameter],
    has_real_parameters: bool,
    needs_first_last: bool,
) -> DdlOutput {
    if text.trim().is_empty() {
        return DdlOutput::none(format!(
            "query '{}' has empty input text; nothing to convert",
            object_name
        ));
    }

    let mut out = match kind {
        QueryKind::Crosstab => {
            return DdlOutput::none(format!(
                "query '{}' is a crosstab query, which is unsupported; skipped",
                object_name
            ));
        }
        QueryKind::Unknown => {
            return DdlOutput::none(format!(
                "query '{}' has an unsupported type code; skipped",
                object_name
            ));
        }
        QueryKind::Select | QueryKind::Union => {
            if !has_real_parameters {
                build_view(object_name, text, schema)
            } else {
                build_table_function(object_name, text, schema, parameters)
            }
        }
        QueryKind::Update | QueryKind::Delete | QueryKind::Append => {
            build_row_count_function(object_name, text, schema, parameters)
        }
        QueryKind::MakeTable => build_make_table_function(object_name, text, schema, parameters),
    };

    if needs_first_last {
        let mut statements = bootstrap_aggregates(schema);
        statements.append(&mut out.statements);
        out.statements = statements;
    }
    out
}

fn build_view(object_name: &str, text: &str, schema: &str) -> DdlOutput {
    DdlOutput {
        object_type: ObjectType::View,
        statements: vec![format!(
            "CREATE OR REPLACE VIEW {}.\"{}\" AS\n{}",
            schema,
            object_name,
            text.trim().trim_end_matches(';').trim_end()
        )],
        warnings: Vec::new(),
    }
}

fn build_table_function(
    object_name: &str,
    text: &str,
    schema: &str,
    parameters: &[ResolvedParameter],
) -> DdlOutput {
    let mut warnings = Vec::new();
    let returns = match infer_return_columns(text) {
        Some(columns) => {
            let list = columns
                .iter()
                .map(|c| format!("{} text", c))
                .collect::<Vec<_>>()
                .join(", ");
            format!("RETURNS TABLE({})", list)
        }
        None => {
            warnings.push(format!(
                "query '{}': could not infer return columns from the select list; \
                 falling back to SETOF record (callers must supply a column definition list)",
                object_name
            ));
            "RETURNS SETOF record".to_string()
        }
    };

    let statement = format!(
        "CREATE OR REPLACE FUNCTION {}.\"{}\"({})\n\
         {}\n\
         LANGUAGE plpgsql\n\
         AS $$\n\
         BEGIN\n\
             RETURN QUERY\n\
             {};\n\
         END;\n\
         $$",
        schema,
        object_name,
        signature(parameters),
        returns,
        text.trim().trim_end_matches(';')
    );

    DdlOutput {
        object_type: ObjectType::Procedure,
        statements: vec![statement],
        warnings,
    }
}

fn build_row_count_function(
    object_name: &str,
    text: &str,
    schema: &str,
    parameters: &[ResolvedParameter],
) -> DdlOutput {
    let statement = format!(
        "CREATE OR REPLACE FUNCTION {}.\"{}\"({})\n\
         RETURNS integer\n\
         LANGUAGE plpgsql\n\
         AS $$\n\
         DECLARE\n\
             affected integer;\n\
         BEGIN\n\
             {};\n\
             GET DIAGNOSTICS affected = ROW_COUNT;\n\
             RETURN affected;\n\
         END;\n\
         $$",
        schema,
        object_name,
        signature(parameters),
        text.trim().trim_end_matches(';')
    );

    DdlOutput {
        object_type: ObjectType::Procedure,
        statements: vec![statement],
        warnings: Vec::new(),
    }
}

fn build_make_table_function(
    object_name: &str,
    text: &str,
    schema: &str,
    parameters: &[ResolvedParameter],
) -> DdlOutput {
    let (target, select) = match extract_into_target(text) {
        Some(pair) => pair,
        None => {
            let mut out = build_row_count_function(object_name, text, schema, parameters);
            out.warnings.push(format!(
                "query '{}' is a make-table query but no INTO target was found; \
                 wrapping the statement unchanged",
                object_name
            ));
            return out;
        }
    };

    let statement = format!(
        "CREATE OR REPLACE FUNCTION {}.\"{}\"({})\n\
         RETURNS integer\n\
         LANGUAGE plpgsql\n\
         AS $$\n\
         DECLARE\n\
             affected integer;\n\
         BEGIN\n\
             DROP TABLE IF EXISTS {};\n\
             CREATE TABLE {} AS\n\
             {};\n\
             GET DIAGNOSTICS affected = ROW_COUNT;\n\
             RETURN affected;\n\
         END;\n\
         $$",
        schema,
        object_name,
        signature(parameters),
        target,
        target,
        select.trim().trim_end_matches(';')
    );

    DdlOutput {
        object_type: ObjectType::Procedure,
        statements: vec![statement],
        warnings: Vec::new(),
    }
}

fn signature(parameters: &[ResolvedParameter]) -> String {
    parameters
        .iter()
        .map(|p| format!("{} {}", p.target_identifier, p.target_type))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Custom `first`/`last` aggregate definitions the translated text
/// depends on. Prepended so they exist before the main statement runs.
/// Aggregates have no REPLACE form on older engine versions, so each is
/// dropped and recreated.
fn bootstrap_aggregates(schema: &str) -> Vec<String> {
    vec![
        format!(
            "CREATE OR REPLACE FUNCTION {s}.first_agg(anyelement, anyelement)\n\
             RETURNS anyelement\n\
             LANGUAGE sql IMMUTABLE STRICT PARALLEL SAFE\n\
             AS 'SELECT $1'",
            s = schema
        ),
        format!("DROP AGGREGATE IF EXISTS {s}.first(anyelement)", s = schema),
        format!(
            "CREATE AGGREGATE {s}.first(anyelement)\n\
             (SFUNC = {s}.first_agg, STYPE = anyelement, PARALLEL = safe)",
            s = schema
        ),
        format!(
            "CREATE OR REPLACE FUNCTION {s}.last_agg(anyelement, anyelement)\n\
             RETURNS anyelement\n\
             LANGUAGE sql IMMUTABLE STRICT PARALLEL SAFE\n\
             AS 'SELECT $2'",
            s = schema
        ),
        format!("DROP AGGREGATE IF EXISTS {s}.last(anyelement)", s = schema),
        format!(
            "CREATE AGGREGATE {s}.last(anyelement)\n\
             (SFUNC = {s}.last_agg, STYPE = anyelement, PARALLEL = safe)",
            s = schema
        ),
    ]
}

/// Parse the top-level select list into named return columns.
///
/// Accepted item forms: `expr AS alias`, qualified `table.column`, bare
/// `column`. Anything else (star, bare expression) returns `None` so the
/// caller falls back to `SETOF record`.
fn infer_return_columns(text: &str) -> Option<Vec<String>> {
    let select = scanner::find_keyword(text, "select", 0)?;
    if select.depth != 0 {
        return None;
    }
    let mut list_start = select.pos + "select".len();
    if let Some((tok, _, end)) = scanner::next_token(text, list_start) {
        if tok.eq_ignore_ascii_case("distinct") {
            list_start = end;
        }
    }
    let list_end = match find_select_list_end(text, list_start) {
        Some(p) => p,
        None => text.len(),
    };

    let mut columns = Vec::new();
    for item in scanner::split_top_level_commas(&text[list_start..list_end]) {
        columns.push(column_name_for_item(item.trim())?);
    }
    if columns.is_empty() {
        None
    } else {
        Some(columns)
    }
}

/// Top-level FROM that ends the select list, ignoring any
/// `EXTRACT(... FROM ...)` occurrences (those sit at depth > 0).
fn find_select_list_end(text: &str, from: usize) -> Option<usize> {
    let mut at = from;
    while let Some(hit) = scanner::find_keyword(text, "from", at) {
        if hit.depth == 0 {
            return Some(hit.pos);
        }
        at = hit.pos + "from".len();
    }
    None
}

fn column_name_for_item(item: &str) -> Option<String> {
    // expr AS alias: take the alias after the last top-level AS.
    let mut at = 0;
    let mut alias_pos = None;
    while let Some(hit) = scanner::find_keyword(item, "as", at) {
        if hit.depth == 0 {
            alias_pos = Some(hit.pos + 2);
        }
        at = hit.pos + 2;
    }
    if let Some(p) = alias_pos {
        let (tok, _, end) = scanner::next_token(item, p)?;
        if scanner::next_token(item, end).is_some() {
            return None;
        }
        return Some(sanitize(tok.trim_matches(['"', '[', ']'])));
    }

    // table.column or bare column. Quoted parts allowed.
    let mut parts = Vec::new();
    let mut pos = 0;
    loop {
        let (tok, _, end) = scanner::next_token(item, pos)?;
        if !tok.chars().next().is_some_and(|c| c == '"' || c.is_ascii_alphabetic() || c == '_') {
            return None;
        }
        parts.push(tok);
        match scanner::next_token(item, end) {
            None => break,
            Some((".", _, dot_end)) => pos = dot_end,
            Some(_) => return None,
        }
    }
    if parts.len() > 2 {
        return None;
    }
    let last = parts.last()?;
    let name = sanitize(last.trim_matches('"'));
    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}

/// Split a `SELECT ... INTO target FROM ...` into the (possibly
/// schema-qualified) target and the same select with the INTO clause
/// removed. The qualifier has already run, so the target may span
/// several dotted tokens (`app."t_new"`).
fn extract_into_target(text: &str) -> Option<(String, String)> {
    let mut at = 0;
    let hit = loop {
        let hit = scanner::find_keyword(text, "into", at)?;
        if hit.depth == 0 {
            break hit;
        }
        at = hit.pos + "into".len();
    };

    let mut target = String::new();
    let mut pos = hit.pos + "into".len();
    loop {
        let (tok, _, end) = scanner::next_token(text, pos)?;
        target.push_str(tok);
        pos = end;
        match scanner::next_token(text, pos) {
            Some((".", _, dot_end)) => {
                target.push('.');
                pos = dot_end;
            }
            _ => break,
        }
    }
    if target.is_empty() {
        return None;
    }

    let mut select = String::with_capacity(text.len());
    select.push_str(text[..hit.pos].trim_end());
    select.push(' ');
    select.push_str(text[pos..].trim_start());
    Some((target, select))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn param(target: &str, ty: &str) -> ResolvedParameter {
        ResolvedParameter::new(target.trim_start_matches("p_"), target, ty)
    }

    #[test]
    fn test_select_without_params_is_view() {
        let out = build(
            "qry_orders",
            QueryKind::Select,
            "SELECT a FROM app.\"orders\" AS orders",
            "app",
            &[],
            false,
            false,
        );
        assert_eq!(out.object_type, ObjectType::View);
        assert_eq!(out.statements.len(), 1);
        assert!(out.statements[0].starts_with("CREATE OR REPLACE VIEW app.\"qry_orders\" AS"));
    }

    #[test]
    fn test_select_with_params_is_table_function() {
        let out = build(
            "qry_by_date",
            QueryKind::Select,
            "SELECT id, placed AS order_date FROM app.\"orders\" AS orders WHERE placed >= p_start",
            "app",
            &[param("p_start", "timestamp")],
            true,
            false,
        );
        assert_eq!(out.object_type, ObjectType::Procedure);
        let sql = &out.statements[0];
        assert!(sql.contains("FUNCTION app.\"qry_by_date\"(p_start timestamp)"));
        assert!(sql.contains("RETURNS TABLE(id text, order_date text)"));
        assert!(sql.contains("RETURN QUERY"));
        assert!(out.warnings.is_empty());
    }

    #[test]
    fn test_star_select_falls_back_to_record() {
        let out = build(
            "qry_all",
            QueryKind::Select,
            "SELECT * FROM app.\"orders\" AS orders WHERE id = p_id",
            "app",
            &[param("p_id", "bigint")],
            true,
            false,
        );
        assert_eq!(out.object_type, ObjectType::Procedure);
        assert!(out.statements[0].contains("RETURNS SETOF record"));
        assert_eq!(out.warnings.len(), 1);
        assert!(out.warnings[0].contains("return columns"));
    }

    #[test]
    fn test_expression_item_without_alias_falls_back() {
        let out = build(
            "qry_calc",
            QueryKind::Select,
            "SELECT qty * price FROM app.\"lines\" AS lines WHERE id = p_id",
            "app",
            &[param("p_id", "bigint")],
            true,
            false,
        );
        assert!(out.statements[0].contains("RETURNS SETOF record"));
    }

    #[test]
    fn test_update_wraps_in_row_count_function() {
        let out = build(
            "qry_close",
            QueryKind::Update,
            "UPDATE app.\"orders\" AS orders SET closed = TRUE WHERE id = p_id",
            "app",
            &[param("p_id", "bigint")],
            true,
            false,
        );
        assert_eq!(out.object_type, ObjectType::Procedure);
        let sql = &out.statements[0];
        assert!(sql.contains("RETURNS integer"));
        assert!(sql.contains("GET DIAGNOSTICS affected = ROW_COUNT"));
        assert!(sql.contains("LANGUAGE plpgsql"));
    }

    #[test]
    fn test_make_table_drops_and_recreates() {
        let out = build(
            "qry_snapshot",
            QueryKind::MakeTable,
            "SELECT id, total INTO app.\"t_snapshot\" FROM app.\"orders\" AS orders",
            "app",
            &[],
            false,
            false,
        );
        let sql = &out.statements[0];
        assert!(sql.contains("DROP TABLE IF EXISTS app.\"t_snapshot\""));
        assert!(sql.contains("CREATE TABLE app.\"t_snapshot\" AS"));
        assert!(!sql.to_lowercase().contains(" into "));
    }

    #[test]
    fn test_crosstab_is_skipped() {
        let out = build("qry_pivot", QueryKind::Crosstab, "TRANSFORM ...", "app", &[], false, false);
        assert_eq!(out.object_type, ObjectType::None);
        assert!(out.statements.is_empty());
        assert!(out.warnings[0].contains("unsupported"));
    }

    #[test]
    fn test_unknown_type_is_skipped() {
        let out = build("qry_odd", QueryKind::Unknown, "SELECT 1", "app", &[], false, false);
        assert_eq!(out.object_type, ObjectType::None);
        assert!(out.statements.is_empty());
        assert!(out.warnings[0].contains("unsupported"));
    }

    #[test]
    fn test_empty_input_is_skipped() {
        let out = build("qry_blank", QueryKind::Select, "   ", "app", &[], false, false);
        assert_eq!(out.object_type, ObjectType::None);
        assert!(out.statements.is_empty());
        assert!(out.warnings[0].contains("empty"));
    }

    #[test]
    fn test_bootstrap_statements_precede_main() {
        let out = build(
            "qry_latest",
            QueryKind::Select,
            "SELECT app.last(name) AS last_name FROM app.\"recipe\" AS recipe",
            "app",
            &[],
            false,
            true,
        );
        assert_eq!(out.statements.len(), 7);
        assert!(out.statements[0].contains("first_agg"));
        assert!(out.statements[1].starts_with("DROP AGGREGATE IF EXISTS app.first"));
        assert!(out.statements[2].starts_with("CREATE AGGREGATE app.first"));
        assert!(out.statements[6].starts_with("CREATE OR REPLACE VIEW"));
    }

    #[test]
    fn test_extract_into_target_dotted() {
        let (target, select) =
            extract_into_target("SELECT a INTO app.\"t_new\" FROM app.\"src\" AS src").unwrap();
        assert_eq!(target, "app.\"t_new\"");
        assert_eq!(select, "SELECT a FROM app.\"src\" AS src");
    }

    #[test]
    fn test_infer_columns_mixed_forms() {
        let cols = infer_return_columns(
            "SELECT orders.id, \"Order Total\" AS total, placed FROM app.\"orders\" AS orders",
        )
        .unwrap();
        assert_eq!(cols, vec!["id", "total", "placed"]);
    }
}
