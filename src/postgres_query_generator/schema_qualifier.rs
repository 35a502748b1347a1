//! Table and user-defined-function name qualification.
//!
//! Two independent sub-passes over the working text:
//! - table sources after clause-introducing keywords (FROM, JOIN, INTO,
//!   UPDATE, TABLE) become `<schema>."<sanitized>"`, with a synthesized
//!   alias equal to the sanitized bare name when the source had none, so
//!   dot-qualified references elsewhere in the query keep resolving;
//! - bare `name(` calls that are neither reserved words nor known
//!   PostgreSQL built-ins become `"<schema>"."<name>"(`.
//!
//! The synthesized state relation and its `ssN` aliases are never
//! qualified; the state relation resolves via the search path.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use super::reference_resolver::STATE_RELATION;
use super::scanner::{enclosing_open_paren, find_keyword, ident_before, next_token};
use crate::utils::sanitize::sanitize;

static SS_ALIAS_PATTERN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^ss\d+$").unwrap());

/// Bare call-site candidate for function qualification.
static CALL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([A-Za-z_]\w*)\s*\(").unwrap());

lazy_static::lazy_static! {
    /// Words that can follow a table source without being its alias.
    static ref RESERVED: HashSet<&'static str> = [
        "select", "from", "where", "group", "order", "by", "having",
        "limit", "offset", "union", "all", "distinct", "as", "on",
        "inner", "left", "right", "full", "outer", "cross", "join",
        "and", "or", "not", "null", "like", "between", "in", "is",
        "exists", "case", "when", "then", "else", "end", "insert",
        "into", "update", "delete", "set", "values", "using", "returning",
        "table", "interval", "asc", "desc", "over", "filter", "any",
        "some", "row",
    ]
    .into_iter()
    .collect();

    /// Target-engine built-ins that must not be treated as user-defined
    /// functions: aggregates, string, numeric, date/time, JSON, window,
    /// casting.
    static ref BUILTIN_FUNCTIONS: HashSet<&'static str> = [
        // aggregates
        "count", "sum", "avg", "min", "max", "string_agg", "array_agg",
        "bool_and", "bool_or", "every",
        // conditional / comparison
        "coalesce", "nullif", "greatest", "least",
        // string
        "upper", "lower", "substr", "substring", "length", "char_length",
        "btrim", "ltrim", "rtrim", "trim", "strpos", "position", "replace",
        "repeat", "reverse", "left", "right", "lpad", "rpad", "split_part",
        "concat", "concat_ws", "format", "chr", "ascii", "initcap",
        "translate", "regexp_replace", "regexp_matches", "quote_literal",
        "quote_ident",
        // numeric
        "abs", "ceil", "ceiling", "floor", "round", "trunc", "sqrt",
        "power", "pow", "exp", "ln", "log", "mod", "sign", "random", "pi",
        "width_bucket",
        // date/time
        "extract", "date_part", "date_trunc", "age", "now", "to_char",
        "to_date", "to_timestamp", "to_number", "make_date",
        "make_timestamp", "justify_days",
        // json
        "row_to_json", "to_json", "to_jsonb", "json_agg", "jsonb_agg",
        "json_build_object", "jsonb_build_object", "json_object",
        // window
        "row_number", "rank", "dense_rank", "percent_rank", "cume_dist",
        "ntile", "lag", "lead", "first_value", "last_value", "nth_value",
        // casting / misc
        "cast", "generate_series", "unnest", "current_setting", "version",
    ]
    .into_iter()
    .collect();
}

/// Keywords whose parenthesized argument lists reuse FROM for an
/// unrelated meaning.
const FROM_EXPRESSION_FUNCTIONS: [&str; 6] =
    ["extract", "substring", "trim", "btrim", "position", "overlay"];

/// Run both qualification sub-passes.
pub fn qualify(text: &str, schema: &str) -> String {
    let out = qualify_tables(text, schema);
    qualify_functions(&out, schema)
}

fn qualify_tables(text: &str, schema: &str) -> String {
    let mut out = text.to_string();
    for keyword in ["from", "join", "into", "update", "table"] {
        let mut at = 0;
        while let Some(hit) = find_keyword(&out, keyword, at) {
            at = hit.pos + keyword.len();
            if keyword == "from" && is_expression_from(&out, hit.pos) {
                continue;
            }
            at = qualify_source_list(&mut out, at, schema, keyword);
        }
    }
    out
}

/// A FROM inside an extract/substring/trim-family call is not a clause.
fn is_expression_from(text: &str, from_pos: usize) -> bool {
    if let Some(open) = enclosing_open_paren(text, from_pos) {
        if let Some(name) = ident_before(text, open) {
            return FROM_EXPRESSION_FUNCTIONS.contains(&name.to_lowercase().as_str());
        }
    }
    false
}

/// Qualify the identifier after a clause keyword, then follow a
/// comma-separated source list. Returns the position to resume scanning.
fn qualify_source_list(out: &mut String, mut at: usize, schema: &str, keyword: &str) -> usize {
    let synthesize_alias = matches!(keyword, "from" | "join" | "update");
    loop {
        let Some((token, start, end)) = next_token(out, at) else {
            return at;
        };
        if !is_table_candidate(out, token, end) {
            return at;
        }
        let bare = token.trim_matches('"');
        let sanitized = sanitize(bare);
        let mut replacement = format!("{}.\"{}\"", schema, sanitized);
        let had_alias = has_real_alias(out, end);
        if synthesize_alias && !had_alias {
            replacement.push_str(&format!(" AS {}", sanitized));
        }
        out.replace_range(start..end, &replacement);
        at = start + replacement.len();

        // Comma-separated source lists chain off the qualified entry.
        let after_alias = if had_alias {
            match next_token(out, at) {
                Some((_, _, alias_end)) => alias_end,
                None => return at,
            }
        } else {
            at
        };
        match next_token(out, after_alias) {
            Some((",", _, comma_end)) if keyword != "update" => at = comma_end,
            _ => return at,
        }
    }
}

fn is_table_candidate(text: &str, token: &str, end: usize) -> bool {
    if token.starts_with('(') || token.starts_with('\'') {
        return false;
    }
    let bare = token.trim_matches('"');
    if bare.is_empty()
        || bare.contains('.')
        || bare == STATE_RELATION
        || SS_ALIAS_PATTERN.is_match(bare)
        || RESERVED.contains(bare.to_lowercase().as_str())
    {
        return false;
    }
    // already qualified: the token is followed by a dot
    if text[end..].starts_with('.') {
        return false;
    }
    // first character must be able to start an identifier
    token.starts_with('"') || token.chars().next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
}

/// Distinguish a real alias from a trailing SQL keyword.
fn has_real_alias(text: &str, after: usize) -> bool {
    match next_token(text, after) {
        Some((token, _, _)) => {
            if token.eq_ignore_ascii_case("as") {
                return true;
            }
            let bare = token.trim_matches('"');
            bare.chars().next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
                && !RESERVED.contains(bare.to_lowercase().as_str())
                && !SS_ALIAS_PATTERN.is_match(bare)
        }
        None => false,
    }
}

fn qualify_functions(text: &str, schema: &str) -> String {
    let mask = single_quote_mask(text);
    let mut out = text.to_string();
    let matches: Vec<(usize, usize, String)> = CALL_PATTERN
        .captures_iter(text)
        .filter_map(|caps| {
            let name_match = caps.get(1).unwrap();
            let name = name_match.as_str();
            let start = name_match.start();
            if mask[start] {
                return None;
            }
            let lower = name.to_lowercase();
            if RESERVED.contains(lower.as_str()) || BUILTIN_FUNCTIONS.contains(lower.as_str()) {
                return None;
            }
            if SS_ALIAS_PATTERN.is_match(&lower) {
                return None;
            }
            // already qualified or a quoted identifier
            if matches!(
                text[..start].trim_end().chars().next_back(),
                Some('.') | Some('"')
            ) {
                return None;
            }
            Some((start, name_match.end(), lower))
        })
        .collect();
    // reverse order keeps byte offsets valid while splicing
    for (start, end, lower) in matches.into_iter().rev() {
        let replacement = format!("\"{}\".\"{}\"", schema, lower);
        out.replace_range(start..end, &replacement);
    }
    out
}

/// `true` at byte positions inside single-quoted string literals.
fn single_quote_mask(text: &str) -> Vec<bool> {
    let mut mask = vec![false; text.len()];
    let mut inside = false;
    for (i, c) in text.char_indices() {
        if c == '\'' {
            inside = !inside;
            mask[i] = true;
        } else if inside {
            mask[i] = true;
        }
    }
    mask
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_table_gets_schema_and_alias() {
        let out = qualify("SELECT r.Id FROM recipe WHERE r.Id = 1", "public");
        assert!(out.contains("FROM public.\"recipe\" AS recipe"));
    }

    #[test]
    fn test_existing_alias_preserved() {
        let out = qualify("SELECT r.Id FROM recipe r", "public");
        assert!(out.contains("FROM public.\"recipe\" r"));
        assert!(!out.contains("AS recipe"));
        let out = qualify("SELECT r.Id FROM recipe AS r", "public");
        assert!(out.contains("FROM public.\"recipe\" AS r"));
    }

    #[test]
    fn test_trailing_keyword_is_not_an_alias() {
        let out = qualify("SELECT Id FROM recipe WHERE Id = 1", "public");
        assert!(out.contains("public.\"recipe\" AS recipe WHERE"));
        let out = qualify("SELECT Id FROM recipe ORDER BY Id", "public");
        assert!(out.contains("public.\"recipe\" AS recipe ORDER BY"));
    }

    #[test]
    fn test_join_and_comma_list() {
        let out = qualify("SELECT * FROM a INNER JOIN b ON a.x = b.x", "app");
        assert!(out.contains("FROM app.\"a\" AS a"));
        assert!(out.contains("JOIN app.\"b\" AS b ON"));
        let out = qualify("SELECT * FROM a, b WHERE a.x = b.x", "app");
        assert!(out.contains("app.\"a\" AS a"));
        assert!(out.contains("app.\"b\" AS b WHERE"));
    }

    #[test]
    fn test_already_qualified_skipped() {
        let out = qualify("SELECT * FROM public.recipe", "public");
        assert_eq!(out, "SELECT * FROM public.recipe");
    }

    #[test]
    fn test_state_relation_never_qualified() {
        let q = "SELECT Id FROM recipe CROSS JOIN session_state ss1 WHERE Id::text = ss1.value";
        let out = qualify(q, "public");
        assert!(out.contains("CROSS JOIN session_state ss1"));
        assert!(!out.contains("public.\"session_state\""));
    }

    #[test]
    fn test_expression_from_skipped() {
        let q = "SELECT EXTRACT(YEAR FROM d) FROM recipe";
        let out = qualify(q, "public");
        assert!(out.contains("EXTRACT(YEAR FROM d)"));
        assert!(out.contains("FROM public.\"recipe\" AS recipe"));
    }

    #[test]
    fn test_subquery_from_qualified() {
        let q = "SELECT * FROM a WHERE x IN (SELECT y FROM b)";
        let out = qualify(q, "app");
        assert!(out.contains("FROM app.\"a\" AS a"));
        assert!(out.contains("FROM app.\"b\" AS b)"));
    }

    #[test]
    fn test_insert_update_targets() {
        let out = qualify("INSERT INTO orders (a) VALUES (1)", "app");
        assert!(out.contains("INTO app.\"orders\" (a)"));
        let out = qualify("UPDATE orders SET a = 1", "app");
        assert!(out.contains("UPDATE app.\"orders\" AS orders SET"));
    }

    #[test]
    fn test_udf_qualified_builtin_not() {
        let q = "SELECT MyCalc(x), upper(y) FROM t";
        let out = qualify(q, "app");
        assert!(out.contains("\"app\".\"mycalc\"(x)"));
        assert!(out.contains("upper(y)"));
    }

    #[test]
    fn test_already_qualified_call_untouched() {
        let q = "SELECT \"app\".first(x) FROM t";
        let out = qualify(q, "app");
        assert!(out.contains("\"app\".first(x)"));
    }

    #[test]
    fn test_call_inside_string_untouched() {
        let q = "SELECT 'call MyCalc(1)' FROM t";
        let out = qualify(q, "app");
        assert!(out.contains("'call MyCalc(1)'"));
    }
}
