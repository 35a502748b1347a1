/// Legacy-dialect to PostgreSQL function registry.
///
/// Maps legacy built-in function names to a rewrite strategy. The
/// strategies that need structural work (conditional expansion, date
/// arithmetic, format patterns) are applied by `function_translator`;
/// this module only owns the tables.
use std::collections::HashMap;

/// How a legacy function call is rewritten.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Rewrite {
    /// Direct rename, argument list unchanged: `UCase(x)` -> `upper(x)`.
    Rename(&'static str),
    /// Expand into a pattern with `{0}`, `{1}`, ... argument slots:
    /// `Year(d)` -> `EXTRACT(YEAR FROM d)::integer`.
    Template(&'static str),
    /// Null-coalescing with an optional second argument: `Nz(x)` ->
    /// `COALESCE(x, '')`, `Nz(x, y)` -> `COALESCE(x, y)`.
    NullCoalesce,
    /// Ternary conditional: `IIf(c, t, f)` -> `CASE WHEN c THEN t ELSE f END`.
    Ternary,
    /// Multi-branch switch: `Switch(c1, v1, c2, v2)` ->
    /// `CASE WHEN c1 THEN v1 WHEN c2 THEN v2 ELSE NULL END`.
    Switch,
    /// `DateAdd("unit", n, d)` -> interval addition.
    DateAdd,
    /// `DateDiff("unit", a, b)` -> typed subtraction / field difference.
    DateDiff,
    /// `DatePart("unit", d)` -> field extraction with integer cast.
    DatePart,
    /// `Format(x, "name")` -> `to_char(x, 'pattern')` for known names.
    Format,
    /// First/Last aggregate -> schema-qualified custom aggregate that
    /// must be bootstrapped wherever used.
    CustomAggregate(&'static str),
}

#[derive(Clone, Copy)]
pub struct FunctionMapping {
    pub legacy_name: &'static str,
    pub rewrite: Rewrite,
}

/// Get the mapping for a legacy function name (case-insensitive).
pub fn get_function_mapping(legacy_fn: &str) -> Option<&'static FunctionMapping> {
    FUNCTION_MAPPINGS.get(legacy_fn.to_lowercase().as_str())
}

/// All registered legacy names, longest first so that scanning never
/// matches a name inside a longer one.
pub fn registered_names() -> &'static [&'static str] {
    &REGISTERED_NAMES
}

// Static function mapping table
lazy_static::lazy_static! {
    static ref FUNCTION_MAPPINGS: HashMap<&'static str, FunctionMapping> = {
        let mut m = HashMap::new();
        let mut add = |name: &'static str, rewrite: Rewrite| {
            m.insert(name, FunctionMapping { legacy_name: name, rewrite });
        };

        // ===== STRING FUNCTIONS =====

        // UCase(x) -> upper(x)
        add("ucase", Rewrite::Rename("upper"));
        // LCase(x) -> lower(x)
        add("lcase", Rewrite::Rename("lower"));
        // Len(x) -> length(x)
        add("len", Rewrite::Rename("length"));
        // Trim(x) -> btrim(x)
        add("trim", Rewrite::Rename("btrim"));
        // LTrim(x) -> ltrim(x)
        add("ltrim", Rewrite::Rename("ltrim"));
        // RTrim(x) -> rtrim(x)
        add("rtrim", Rewrite::Rename("rtrim"));
        // Mid(s, start [, len]) -> substr(s, start [, len]) [both 1-indexed]
        add("mid", Rewrite::Rename("substr"));
        // InStr(s, find) -> strpos(s, find)
        add("instr", Rewrite::Rename("strpos"));
        // Chr(n) -> chr(n)
        add("chr", Rewrite::Rename("chr"));
        // Asc(s) -> ascii(s)
        add("asc", Rewrite::Rename("ascii"));
        // Space(n) -> repeat(' ', n)
        add("space", Rewrite::Template("repeat(' ', {0})"));

        // ===== MATH FUNCTIONS =====

        // Sqr(x) -> sqrt(x)
        add("sqr", Rewrite::Rename("sqrt"));
        // Int(x) -> floor(x)
        add("int", Rewrite::Template("floor({0})"));
        // Fix(x) -> trunc(x)
        add("fix", Rewrite::Template("trunc({0})"));
        // Val(s) -> (s)::numeric [Val parses a leading number; cast is
        // the closest total equivalent]
        add("val", Rewrite::Template("({0})::numeric"));

        // ===== NULL / CONDITIONAL =====

        // Nz(x [, replacement]) -> COALESCE(x, replacement | '')
        add("nz", Rewrite::NullCoalesce);
        // IIf(c, t, f) -> CASE WHEN c THEN t ELSE f END
        add("iif", Rewrite::Ternary);
        // Switch(c1, v1, ...) -> CASE WHEN c1 THEN v1 ... ELSE NULL END
        add("switch", Rewrite::Switch);
        // IsNull(x) -> (x IS NULL)
        add("isnull", Rewrite::Template("({0} IS NULL)"));

        // ===== TYPE CONVERSION (cast-syntax rewrites) =====

        // CInt(x) -> (x)::integer
        add("cint", Rewrite::Template("({0})::integer"));
        // CLng(x) -> (x)::bigint
        add("clng", Rewrite::Template("({0})::bigint"));
        // CSng(x) -> (x)::real
        add("csng", Rewrite::Template("({0})::real"));
        // CDbl(x) -> (x)::double precision
        add("cdbl", Rewrite::Template("({0})::double precision"));
        // CCur(x) -> (x)::numeric
        add("ccur", Rewrite::Template("({0})::numeric"));
        // CStr(x) -> (x)::text
        add("cstr", Rewrite::Template("({0})::text"));
        // CDate(x) / CVDate(x) -> (x)::timestamp
        add("cdate", Rewrite::Template("({0})::timestamp"));
        add("cvdate", Rewrite::Template("({0})::timestamp"));
        // CBool(x) -> (x)::boolean
        add("cbool", Rewrite::Template("({0})::boolean"));

        // ===== DATE/TIME DECOMPOSITION =====

        // Year(d) -> EXTRACT(YEAR FROM d)::integer
        add("year", Rewrite::Template("EXTRACT(YEAR FROM {0})::integer"));
        add("month", Rewrite::Template("EXTRACT(MONTH FROM {0})::integer"));
        add("day", Rewrite::Template("EXTRACT(DAY FROM {0})::integer"));
        add("hour", Rewrite::Template("EXTRACT(HOUR FROM {0})::integer"));
        add("minute", Rewrite::Template("EXTRACT(MINUTE FROM {0})::integer"));
        add("second", Rewrite::Template("EXTRACT(SECOND FROM {0})::integer"));
        // Weekday(d) -> DOW is 0-based Sunday; legacy is 1-based Sunday
        add("weekday", Rewrite::Template("(EXTRACT(DOW FROM {0})::integer + 1)"));

        // ===== DATE ARITHMETIC =====

        add("dateadd", Rewrite::DateAdd);
        add("datediff", Rewrite::DateDiff);
        add("datepart", Rewrite::DatePart);

        // ===== FORMATTING =====

        add("format", Rewrite::Format);

        // ===== AGGREGATES =====

        // First(x) / Last(x) -> custom aggregates, bootstrapped on use
        add("first", Rewrite::CustomAggregate("first"));
        add("last", Rewrite::CustomAggregate("last"));

        m
    };

    static ref REGISTERED_NAMES: Vec<&'static str> = {
        let mut names: Vec<&'static str> = FUNCTION_MAPPINGS.keys().copied().collect();
        names.sort_by(|a, b| b.len().cmp(&a.len()).then(a.cmp(b)));
        names
    };
}

/// Interval literal for a DateAdd unit code, e.g. `"m"` -> `1 month`.
pub fn interval_for_unit(unit: &str) -> Option<&'static str> {
    Some(match unit {
        "yyyy" => "1 year",
        "q" => "3 months",
        "m" => "1 month",
        "ww" => "7 days",
        "d" | "y" | "w" => "1 day",
        "h" => "1 hour",
        "n" => "1 minute",
        "s" => "1 second",
        _ => return None,
    })
}

/// EXTRACT field for a DatePart unit code. `"w"` is handled separately
/// because of the weekday offset.
pub fn extract_field_for_unit(unit: &str) -> Option<&'static str> {
    Some(match unit {
        "yyyy" => "YEAR",
        "q" => "QUARTER",
        "m" => "MONTH",
        "d" => "DAY",
        "y" => "DOY",
        "ww" => "WEEK",
        "h" => "HOUR",
        "n" => "MINUTE",
        "s" => "SECOND",
        _ => return None,
    })
}

/// `to_char` pattern for a recognized named format.
pub fn named_format_pattern(format_name: &str) -> Option<&'static str> {
    Some(match format_name.to_lowercase().as_str() {
        "short date" => "MM/DD/YYYY",
        "medium date" => "DD-Mon-YY",
        "long date" => "FMDay, FMMonth DD, YYYY",
        "general date" => "MM/DD/YYYY HH24:MI:SS",
        "short time" => "HH24:MI",
        "medium time" => "HH12:MI AM",
        "long time" => "HH24:MI:SS",
        "currency" => "FM$999,999,990.00",
        "fixed" => "FM990.00",
        "standard" => "FM999,999,990.00",
        "percent" => "FM990.00%",
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("UCase", Rewrite::Rename("upper"))]
    #[test_case("lcase", Rewrite::Rename("lower"))]
    #[test_case("LEN", Rewrite::Rename("length"))]
    #[test_case("Mid", Rewrite::Rename("substr"))]
    fn test_renames(name: &str, expected: Rewrite) {
        assert_eq!(get_function_mapping(name).unwrap().rewrite, expected);
    }

    #[test]
    fn test_conditionals_and_casts() {
        assert_eq!(get_function_mapping("IIf").unwrap().rewrite, Rewrite::Ternary);
        assert_eq!(get_function_mapping("nz").unwrap().rewrite, Rewrite::NullCoalesce);
        assert_eq!(get_function_mapping("Switch").unwrap().rewrite, Rewrite::Switch);
        assert_eq!(
            get_function_mapping("CInt").unwrap().rewrite,
            Rewrite::Template("({0})::integer")
        );
    }

    #[test]
    fn test_unknown_function() {
        assert!(get_function_mapping("DLookup").is_none());
    }

    #[test]
    fn test_registered_names_longest_first() {
        let names = registered_names();
        assert!(!names.is_empty());
        for pair in names.windows(2) {
            assert!(pair[0].len() >= pair[1].len());
        }
        // "minute" must come before "min"-like prefixes when scanning
        assert!(names.contains(&"iif"));
    }

    #[test]
    fn test_unit_tables() {
        assert_eq!(interval_for_unit("m"), Some("1 month"));
        assert_eq!(interval_for_unit("d"), Some("1 day"));
        assert_eq!(interval_for_unit("bogus"), None);
        assert_eq!(extract_field_for_unit("yyyy"), Some("YEAR"));
        assert_eq!(named_format_pattern("Short Date"), Some("MM/DD/YYYY"));
        assert_eq!(named_format_pattern("nope"), None);
    }

    #[test]
    fn test_aggregates_flagged() {
        assert_eq!(
            get_function_mapping("First").unwrap().rewrite,
            Rewrite::CustomAggregate("first")
        );
        assert_eq!(
            get_function_mapping("LAST").unwrap().rewrite,
            Rewrite::CustomAggregate("last")
        );
    }
}
