//! Dialect syntax passes: keywords, literals, operators, quoting.
//!
//! Split into `early_passes` (run before function translation and
//! reference resolution: keyword normalization, row-limit capture,
//! boolean and date literals, concatenation) and `late_passes` (run
//! after references are resolved: state-lookup casts, string quoting,
//! LIKE wildcards, bracket identifiers, row-limit re-append). The order
//! is load-bearing: literal handling must precede bracket removal, and
//! reference resolution depends on bracket-delimited syntax.

use std::sync::LazyLock;

use chrono::{NaiveDate, NaiveDateTime};
use regex::Regex;

use super::scanner::{find_keyword, next_token};
use crate::utils::sanitize::sanitize;

/// Matches `SELECT [DISTINCT] TOP n` at the head of the column list.
/// Captures: (1) the SELECT prefix, (2) the count.
static TOP_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(SELECT(?:\s+DISTINCT)?)\s+TOP\s+(\d+)\s+").unwrap()
});

/// Matches zero-argument current-date/time calls.
static DATE_FN_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(date|now|time)\s*\(\s*\)").unwrap());

/// Matches `#...#` bracketed date literals.
static DATE_LITERAL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"#([^#\r\n]+)#").unwrap());

/// Comparison whose right-hand side is a synthesized state lookup.
/// Captures: (1) lhs, (2) operator, (3) the `ssN.value` expression.
static STATE_COMPARE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([^\s=<>!()]+)\s*(=|<>|!=|<=|>=|<|>)\s*(ss\d+\.value)\b").unwrap()
});

/// A double-quoted legacy string literal (no embedded double quotes).
static DOUBLE_QUOTED_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""([^"]*)""#).unwrap());

/// A bracket-delimited legacy identifier.
static BRACKET_IDENT_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([^\]\[]+)\]").unwrap());

/// Outcome of the early passes.
#[derive(Debug)]
pub struct EarlyPass {
    pub text: String,
    /// Row count captured from a leading TOP-style modifier.
    pub row_limit: Option<String>,
    pub warnings: Vec<String>,
}

/// Passes 1-6: keyword synonyms, row-limit capture, boolean literals,
/// current-date/time functions, date literals, concatenation operator.
pub fn early_passes(text: &str) -> EarlyPass {
    let mut warnings = Vec::new();

    // 1. DISTINCTROW is a row-level DISTINCT synonym in the legacy dialect.
    let mut out = replace_keyword(text, "distinctrow", "DISTINCT");

    // 2. Capture and strip the leading row-limit modifier.
    let mut row_limit = None;
    if let Some(caps) = TOP_PATTERN.captures(&out) {
        row_limit = Some(caps[2].to_string());
        let replacement = format!("{} ", &caps[1]);
        let m = caps.get(0).unwrap();
        out.replace_range(m.start()..m.end(), &replacement);
    }

    // 3. Boolean literal canonicalization.
    out = replace_keyword(&out, "true", "TRUE");
    out = replace_keyword(&out, "false", "FALSE");

    // 4. Zero-argument current-date/time functions.
    out = DATE_FN_PATTERN
        .replace_all(&out, |caps: &regex::Captures| {
            match caps[1].to_lowercase().as_str() {
                "date" => "CURRENT_DATE",
                "now" => "CURRENT_TIMESTAMP",
                _ => "CURRENT_TIME",
            }
        })
        .into_owned();

    // 5. Bracketed date literals with explicit casts.
    out = DATE_LITERAL_PATTERN
        .replace_all(&out, |caps: &regex::Captures| {
            match convert_date_literal(caps[1].trim()) {
                Some(converted) => converted,
                None => {
                    warnings.push(format!(
                        "Date literal #{}# is not in a recognized format; left unchanged",
                        &caps[1]
                    ));
                    caps[0].to_string()
                }
            }
        })
        .into_owned();

    // 6. String concatenation operator.
    out = replace_char_outside_quotes(&out, '&', "||");

    EarlyPass {
        text: out,
        row_limit,
        warnings,
    }
}

/// Passes 8-12, run after reference resolution. `params` maps each
/// surviving declared parameter's sanitized source name to its target
/// identifier, so bracketed occurrences become parameter references
/// instead of quoted column identifiers.
pub fn late_passes(text: &str, row_limit: Option<&str>, params: &[(String, String)]) -> String {
    // 8. The state value column is untyped text; the engine will not
    // implicitly compare it against a typed column.
    let mut out = STATE_COMPARE_PATTERN
        .replace_all(text, |caps: &regex::Captures| {
            let lhs = &caps[1];
            if lhs.contains("::") || lhs.starts_with("ss") {
                caps[0].to_string()
            } else {
                format!("{}::text {} {}", lhs, &caps[2], &caps[3])
            }
        })
        .into_owned();

    // 9. Legacy double-quoted string literals. The only quoted
    // identifiers in the text at this point are schema qualifications
    // emitted by function rewriting, recognizable by an adjacent dot;
    // every other double-quoted token is a string literal.
    out = convert_double_quoted_literals(&out);

    // 10. Pattern-match wildcards inside LIKE literals.
    out = translate_like_wildcards(&out);

    // 11. Bracket-delimited identifiers.
    out = BRACKET_IDENT_PATTERN
        .replace_all(&out, |caps: &regex::Captures| {
            let name = sanitize(&caps[1]);
            match params.iter().find(|(source, _)| *source == name) {
                Some((_, target)) => target.clone(),
                None => format!("\"{}\"", name),
            }
        })
        .into_owned();

    // 12. Re-append the captured row limit after the statement terminator.
    out = out.trim_end().trim_end_matches(';').trim_end().to_string();
    if let Some(limit) = row_limit {
        out.push_str(&format!(" LIMIT {}", limit));
    }
    out
}

/// Rewrite double-quoted tokens as single-quoted string literals unless
/// the token is part of a dotted qualification (`"schema".name` or
/// `name."object"`).
fn convert_double_quoted_literals(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;
    for caps in DOUBLE_QUOTED_PATTERN.captures_iter(text) {
        let m = caps.get(0).unwrap();
        out.push_str(&text[cursor..m.start()]);
        let after_dot = text[..m.start()].ends_with('.');
        let before_dot = text[m.end()..].starts_with('.');
        if after_dot || before_dot {
            out.push_str(m.as_str());
        } else {
            out.push('\'');
            out.push_str(&caps[1].replace('\'', "''"));
            out.push('\'');
        }
        cursor = m.end();
    }
    out.push_str(&text[cursor..]);
    out
}

/// Replace whole-word, quote-aware occurrences of `keyword`.
fn replace_keyword(text: &str, keyword: &str, replacement: &str) -> String {
    let mut out = text.to_string();
    let mut at = 0;
    while let Some(hit) = find_keyword(&out, keyword, at) {
        out.replace_range(hit.pos..hit.pos + keyword.len(), replacement);
        at = hit.pos + replacement.len();
    }
    out
}

/// Replace a single operator character outside quoted regions.
fn replace_char_outside_quotes(text: &str, needle: char, replacement: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_single = false;
    let mut in_double = false;
    let mut in_bracket = false;
    for c in text.chars() {
        match c {
            '\'' if !in_double && !in_bracket => in_single = !in_single,
            '"' if !in_single && !in_bracket => in_double = !in_double,
            '[' if !in_single && !in_double => in_bracket = true,
            ']' if in_bracket => in_bracket = false,
            _ => {}
        }
        if c == needle && !in_single && !in_double && !in_bracket {
            out.push_str(replacement);
        } else {
            out.push(c);
        }
    }
    out
}

fn convert_date_literal(content: &str) -> Option<String> {
    // timestamp forms first, then date-only
    for fmt in ["%m/%d/%Y %H:%M:%S", "%m/%d/%Y %I:%M:%S %p", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(ts) = NaiveDateTime::parse_from_str(content, fmt) {
            return Some(format!("'{}'::timestamp", ts.format("%Y-%m-%d %H:%M:%S")));
        }
    }
    for fmt in ["%m/%d/%Y", "%Y-%m-%d"] {
        if let Ok(d) = NaiveDate::parse_from_str(content, fmt) {
            return Some(format!("'{}'::date", d.format("%Y-%m-%d")));
        }
    }
    None
}

fn translate_like_wildcards(text: &str) -> String {
    let mut out = text.to_string();
    let mut at = 0;
    while let Some(hit) = find_keyword(&out, "like", at) {
        let after = hit.pos + "like".len();
        at = after;
        if let Some((token, start, end)) = next_token(&out, after) {
            if token.starts_with('\'') && token.ends_with('\'') && token.len() >= 2 {
                let translated = token.replace('*', "%").replace('?', "_");
                out.replace_range(start..end, &translated);
                at = start + translated.len();
            }
        }
    }
    out
}
