//! Rewrite engine for legacy built-in function calls.
//!
//! Walks the working text left to right looking for registered function
//! names followed by an argument list, translates the arguments
//! recursively first, then applies the registry's rewrite strategy.
//! Because arguments are translated before the enclosing call is
//! rebuilt, arbitrarily nested calls compose (`Nz(IIf(...), 0)` sees the
//! ternary already expanded). The cursor always advances past each
//! rewritten call, so self-named mappings (`chr` -> `chr`) terminate.

use super::function_registry::{
    extract_field_for_unit, get_function_mapping, interval_for_unit, named_format_pattern,
    registered_names, Rewrite,
};
use super::scanner::{find_keyword, find_matching_paren, split_top_level_commas};

/// Outcome of the function translation pass.
#[derive(Debug, Default)]
pub struct FunctionTranslation {
    pub text: String,
    pub warnings: Vec<String>,
    pub uses_first: bool,
    pub uses_last: bool,
}

struct Ctx<'a> {
    schema: &'a str,
    warnings: Vec<String>,
    uses_first: bool,
    uses_last: bool,
}

/// Translate every registered legacy function call in `text`.
pub fn translate(text: &str, schema: &str) -> FunctionTranslation {
    let mut ctx = Ctx {
        schema,
        warnings: Vec::new(),
        uses_first: false,
        uses_last: false,
    };
    let translated = translate_segment(text, &mut ctx);
    FunctionTranslation {
        text: translated,
        warnings: ctx.warnings,
        uses_first: ctx.uses_first,
        uses_last: ctx.uses_last,
    }
}

/// One registered call site: name span plus its argument-list span.
struct CallSite {
    name_start: usize,
    name_end: usize,
    open: usize,
    close: usize,
}

fn find_next_call(text: &str, from: usize) -> Option<CallSite> {
    let mut best: Option<CallSite> = None;
    for name in registered_names() {
        let mut at = from;
        while let Some(hit) = find_keyword(text, name, at) {
            let name_end = hit.pos + name.len();
            // Skip already-qualified or member-style occurrences.
            let preceded = text[..hit.pos].trim_end().chars().next_back();
            if matches!(preceded, Some('.') | Some('"') | Some('!')) {
                at = name_end;
                continue;
            }
            let after = text[name_end..].trim_start();
            if !after.starts_with('(') {
                at = name_end;
                continue;
            }
            let open = name_end + (text[name_end..].len() - after.len());
            if let Some(close) = find_matching_paren(text, open) {
                if best.as_ref().is_none_or(|b| hit.pos < b.name_start) {
                    best = Some(CallSite {
                        name_start: hit.pos,
                        name_end,
                        open,
                        close,
                    });
                }
            }
            break;
        }
    }
    best
}

fn translate_segment(text: &str, ctx: &mut Ctx) -> String {
    let mut out = text.to_string();
    let mut pos = 0;
    while let Some(site) = find_next_call(&out, pos) {
        let name = out[site.name_start..site.name_end].to_string();
        let inner = &out[site.open + 1..site.close];
        let args: Vec<String> = if inner.trim().is_empty() {
            Vec::new()
        } else {
            split_top_level_commas(inner)
                .iter()
                .map(|a| translate_segment(a.trim(), ctx))
                .collect()
        };
        let replacement = apply_rewrite(&name, &args, ctx);
        out.replace_range(site.name_start..site.close + 1, &replacement);
        pos = site.name_start + replacement.len();
    }
    out
}

fn apply_rewrite(name: &str, args: &[String], ctx: &mut Ctx) -> String {
    let mapping = match get_function_mapping(name) {
        Some(m) => m,
        None => return passthrough(name, args),
    };
    match mapping.rewrite {
        Rewrite::Rename(target) => format!("{}({})", target, args.join(", ")),
        Rewrite::Template(pattern) => apply_template(name, pattern, args, ctx),
        Rewrite::NullCoalesce => match args {
            [x] => format!("COALESCE({}, '')", x),
            [x, fallback] => format!("COALESCE({}, {})", x, fallback),
            _ => arity_warning(name, args, ctx),
        },
        Rewrite::Ternary => match args {
            [cond, then, other] => {
                format!("CASE WHEN {} THEN {} ELSE {} END", cond, then, other)
            }
            _ => arity_warning(name, args, ctx),
        },
        Rewrite::Switch => {
            if args.is_empty() || args.len() % 2 != 0 {
                return arity_warning(name, args, ctx);
            }
            let mut expr = String::from("CASE");
            for pair in args.chunks(2) {
                expr.push_str(&format!(" WHEN {} THEN {}", pair[0], pair[1]));
            }
            expr.push_str(" ELSE NULL END");
            expr
        }
        Rewrite::DateAdd => match args {
            [unit, n, d] => match interval_for_unit(&unquote(unit).to_lowercase()) {
                Some(interval) => format!("({} + ({}) * INTERVAL '{}')", d, n, interval),
                None => unit_warning(name, unit, args, ctx),
            },
            _ => arity_warning(name, args, ctx),
        },
        Rewrite::DateDiff => match args {
            [unit, a, b] => date_diff(name, &unquote(unit).to_lowercase(), a, b, args, ctx),
            _ => arity_warning(name, args, ctx),
        },
        Rewrite::DatePart => match args {
            [unit, d] => {
                let unit = unquote(unit).to_lowercase();
                if unit == "w" {
                    format!("(EXTRACT(DOW FROM {})::integer + 1)", d)
                } else {
                    match extract_field_for_unit(&unit) {
                        Some(field) => format!("EXTRACT({} FROM {})::integer", field, d),
                        None => unit_warning(name, &args[0], args, ctx),
                    }
                }
            }
            _ => arity_warning(name, args, ctx),
        },
        Rewrite::Format => match args {
            [value, fmt] => match named_format_pattern(&unquote(fmt)) {
                Some(pattern) => format!("to_char({}, '{}')", value, pattern),
                None => {
                    ctx.warnings.push(format!(
                        "Format name {} is not recognized; call passed through unchanged",
                        fmt
                    ));
                    passthrough(name, args)
                }
            },
            _ => arity_warning(name, args, ctx),
        },
        Rewrite::CustomAggregate(agg) => {
            match agg {
                "first" => ctx.uses_first = true,
                _ => ctx.uses_last = true,
            }
            format!("\"{}\".{}({})", ctx.schema, agg, args.join(", "))
        }
    }
}

fn apply_template(name: &str, pattern: &str, args: &[String], ctx: &mut Ctx) -> String {
    let mut result = pattern.to_string();
    for (i, arg) in args.iter().enumerate() {
        result = result.replace(&format!("{{{}}}", i), arg);
    }
    if result.contains('{') {
        // a slot had no argument to fill
        return arity_warning(name, args, ctx);
    }
    result
}

fn date_diff(
    name: &str,
    unit: &str,
    a: &str,
    b: &str,
    args: &[String],
    ctx: &mut Ctx,
) -> String {
    match unit {
        "d" | "y" | "w" => format!("(({})::date - ({})::date)", b, a),
        "ww" => format!("((({})::date - ({})::date) / 7)", b, a),
        "h" | "n" | "s" => {
            let divisor = match unit {
                "h" => 3600,
                "n" => 60,
                _ => 1,
            };
            format!(
                "(EXTRACT(EPOCH FROM (({})::timestamp - ({})::timestamp)) / {})::integer",
                b, a, divisor
            )
        }
        "yyyy" => format!(
            "(EXTRACT(YEAR FROM ({})::timestamp) - EXTRACT(YEAR FROM ({})::timestamp))::integer",
            b, a
        ),
        "m" => format!(
            "((EXTRACT(YEAR FROM ({b})::timestamp) - EXTRACT(YEAR FROM ({a})::timestamp)) * 12 \
             + EXTRACT(MONTH FROM ({b})::timestamp) - EXTRACT(MONTH FROM ({a})::timestamp))::integer",
            a = a,
            b = b
        ),
        "q" => format!(
            "((EXTRACT(YEAR FROM ({b})::timestamp) - EXTRACT(YEAR FROM ({a})::timestamp)) * 4 \
             + EXTRACT(QUARTER FROM ({b})::timestamp) - EXTRACT(QUARTER FROM ({a})::timestamp))::integer",
            a = a,
            b = b
        ),
        _ => unit_warning(name, &args[0], args, ctx),
    }
}

fn unit_warning(name: &str, unit: &str, args: &[String], ctx: &mut Ctx) -> String {
    ctx.warnings.push(format!(
        "{}: unit {} is not recognized; call passed through unchanged",
        name, unit
    ));
    passthrough(name, args)
}

fn arity_warning(name: &str, args: &[String], ctx: &mut Ctx) -> String {
    ctx.warnings.push(format!(
        "{}: unexpected argument count {}; call passed through unchanged",
        name,
        args.len()
    ));
    passthrough(name, args)
}

fn passthrough(name: &str, args: &[String]) -> String {
    format!("{}({})", name, args.join(", "))
}

/// Strip one layer of matching single or double quotes.
fn unquote(s: &str) -> String {
    let t = s.trim();
    if t.len() >= 2
        && ((t.starts_with('\'') && t.ends_with('\'')) || (t.starts_with('"') && t.ends_with('"')))
    {
        t[1..t.len() - 1].to_string()
    } else {
        t.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(text: &str) -> FunctionTranslation {
        translate(text, "public")
    }

    #[test]
    fn test_rename() {
        let r = run("SELECT UCase(name) FROM t");
        assert_eq!(r.text, "SELECT upper(name) FROM t");
        assert!(r.warnings.is_empty());
    }

    #[test]
    fn test_nz_one_and_two_args() {
        assert_eq!(run("Nz(a)").text, "COALESCE(a, '')");
        assert_eq!(run("Nz(a, 0)").text, "COALESCE(a, 0)");
    }

    #[test]
    fn test_iif_expansion() {
        let r = run("SELECT IIf(qty > 5, 'big', 'small') FROM t");
        assert_eq!(
            r.text,
            "SELECT CASE WHEN qty > 5 THEN 'big' ELSE 'small' END FROM t"
        );
    }

    #[test]
    fn test_switch_expansion() {
        let r = run("Switch(a = 1, 'one', a = 2, 'two')");
        assert_eq!(
            r.text,
            "CASE WHEN a = 1 THEN 'one' WHEN a = 2 THEN 'two' ELSE NULL END"
        );
    }

    #[test]
    fn test_nested_calls_compose() {
        // the coalescing wrapper must see the ternary already expanded
        let r = run("Nz(IIf(a > b, a, b), 0)");
        assert_eq!(r.text, "COALESCE(CASE WHEN a > b THEN a ELSE b END, 0)");
        assert!(!r.text.to_lowercase().contains("iif"));
        assert!(!r.text.to_lowercase().contains("nz("));
    }

    #[test]
    fn test_cast_rewrite() {
        assert_eq!(run("CInt(x)").text, "(x)::integer");
        assert_eq!(run("CStr(total)").text, "(total)::text");
    }

    #[test]
    fn test_date_decomposition() {
        assert_eq!(run("Year(d)").text, "EXTRACT(YEAR FROM d)::integer");
        assert_eq!(run("Weekday(d)").text, "(EXTRACT(DOW FROM d)::integer + 1)");
    }

    #[test]
    fn test_dateadd_and_datediff() {
        assert_eq!(
            run("DateAdd(\"m\", 3, d)").text,
            "(d + (3) * INTERVAL '1 month')"
        );
        assert_eq!(
            run("DateDiff(\"d\", a, b)").text,
            "((b)::date - (a)::date)"
        );
    }

    #[test]
    fn test_format_known_and_unknown() {
        let known = run("Format(d, \"Short Date\")");
        assert_eq!(known.text, "to_char(d, 'MM/DD/YYYY')");
        let unknown = run("Format(d, \"mystery\")");
        assert!(unknown.text.contains("Format(d"));
        assert_eq!(unknown.warnings.len(), 1);
    }

    #[test]
    fn test_custom_aggregates_flag_bootstrap() {
        let r = run("SELECT First(name), Last(id) FROM t");
        assert_eq!(r.text, "SELECT \"public\".first(name), \"public\".last(id) FROM t");
        assert!(r.uses_first);
        assert!(r.uses_last);
    }

    #[test]
    fn test_self_named_mapping_terminates() {
        assert_eq!(run("chr(65)").text, "chr(65)");
        assert_eq!(run("ltrim(x)").text, "ltrim(x)");
    }

    #[test]
    fn test_qualified_call_not_touched() {
        let r = run("SELECT \"public\".first(x) FROM t");
        assert_eq!(r.text, "SELECT \"public\".first(x) FROM t");
        assert!(!r.uses_first);
    }

    #[test]
    fn test_quoted_names_ignored() {
        let r = run("SELECT 'Nz(a)' FROM t");
        assert_eq!(r.text, "SELECT 'Nz(a)' FROM t");
    }
}
