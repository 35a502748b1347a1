//! Centralized identifier sanitization used by every pipeline stage.
//!
//! Legacy object, control and parameter names carry spaces, punctuation
//! and mixed case (`Qry Open Orders`, `txtRecipe ID#`). All of them pass
//! through `sanitize` before they appear in generated SQL or are used as
//! a lookup key, so the same source name always maps to the same target
//! name no matter which stage produced it.
//!
//! Format: lowercase, `[a-z0-9_]` only, no doubled and no leading or
//! trailing underscores.
//!
//! Examples:
//! - `"Qry Open Orders"` → `"qry_open_orders"`
//! - `"txtRecipe ID#"` → `"txtrecipe_id"`
//! - `"already_clean"` → `"already_clean"`

/// Sanitize a legacy identifier into a PostgreSQL-safe lowercase name.
///
/// Idempotent: `sanitize(sanitize(x)) == sanitize(x)` for every input.
pub fn sanitize(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut last_was_underscore = false;
    for ch in name.trim().chars() {
        let mapped = if ch.is_ascii_alphanumeric() {
            ch.to_ascii_lowercase()
        } else {
            '_'
        };
        if mapped == '_' {
            if last_was_underscore || out.is_empty() {
                continue;
            }
            last_was_underscore = true;
        } else {
            last_was_underscore = false;
        }
        out.push(mapped);
    }
    if out.ends_with('_') {
        out.pop();
    }
    out
}

/// Sanitize a compound `owner.control` key the way the binding map is keyed.
pub fn sanitize_key(owner: &str, control: &str) -> String {
    format!("{}.{}", sanitize(owner), sanitize(control))
}
