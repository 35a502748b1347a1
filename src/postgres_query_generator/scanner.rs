//! Quote- and paren-aware scanning primitives shared by the pipeline.
//!
//! Every stage that needs structural awareness (return-column parsing,
//! table qualification skip rules, function rewriting) consumes these
//! helpers instead of ad hoc patterns, so nested parentheses and quoted
//! strings are handled once, in one place.
//!
//! Quoting rules observed: `'...'` string literals with `''` escaping,
//! `"..."` quoted identifiers/legacy strings, `[...]` legacy bracketed
//! identifiers. Keyword matches never fire inside any of the three.

/// A keyword occurrence found by [`find_keyword`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeywordHit {
    /// Byte offset of the first character of the keyword.
    pub pos: usize,
    /// Parenthesis nesting depth at that offset (0 = top level).
    pub depth: usize,
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Iterate character positions that are outside quotes, tracking paren depth.
/// Calls `f(pos, ch, depth)`; stops early if `f` returns `true`.
fn scan_unquoted<F: FnMut(usize, char, usize) -> bool>(text: &str, mut f: F) {
    let mut depth: usize = 0;
    let mut chars = text.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        match c {
            '\'' => {
                // skip string literal, honoring '' escapes
                while let Some((_, c2)) = chars.next() {
                    if c2 == '\'' {
                        if let Some(&(_, '\'')) = chars.peek() {
                            chars.next();
                        } else {
                            break;
                        }
                    }
                }
            }
            '"' => {
                for (_, c2) in chars.by_ref() {
                    if c2 == '"' {
                        break;
                    }
                }
            }
            '[' => {
                for (_, c2) in chars.by_ref() {
                    if c2 == ']' {
                        break;
                    }
                }
            }
            '(' => {
                if f(i, c, depth) {
                    return;
                }
                depth += 1;
                continue;
            }
            ')' => {
                depth = depth.saturating_sub(1);
            }
            _ => {}
        }
        if f(i, c, depth) {
            return;
        }
    }
}

/// Find the next occurrence of `keyword` (case-insensitive, whole word)
/// outside quotes, starting at byte offset `from`. Any paren depth.
pub fn find_keyword(text: &str, keyword: &str, from: usize) -> Option<KeywordHit> {
    let mut hit = None;
    scan_unquoted(text, |i, c, depth| {
        if i < from || hit.is_some() {
            return hit.is_some();
        }
        if c.is_ascii_alphabetic() {
            if let Some(candidate) = text.get(i..i + keyword.len()) {
                let before_ok =
                    i == 0 || !is_ident_char(text[..i].chars().next_back().unwrap_or(' '));
                let after_ok = text[i + keyword.len()..]
                    .chars()
                    .next()
                    .is_none_or(|n| !is_ident_char(n));
                if before_ok && after_ok && candidate.eq_ignore_ascii_case(keyword) {
                    hit = Some(KeywordHit { pos: i, depth });
                    return true;
                }
            }
        }
        false
    });
    hit
}

/// Find the next top-level (depth 0) occurrence of any of `keywords`,
/// outside quotes, starting at `from`. Returns the earliest hit.
pub fn find_top_level_keyword(text: &str, keywords: &[&str], from: usize) -> Option<usize> {
    let mut best: Option<usize> = None;
    for kw in keywords {
        let mut at = from;
        while let Some(hit) = find_keyword(text, kw, at) {
            if hit.depth == 0 {
                if best.is_none_or(|b| hit.pos < b) {
                    best = Some(hit.pos);
                }
                break;
            }
            at = hit.pos + kw.len();
        }
    }
    best
}

/// Given the byte offset of an opening parenthesis, find its matching
/// closing parenthesis. Returns `None` when the text is unbalanced.
pub fn find_matching_paren(text: &str, open_pos: usize) -> Option<usize> {
    debug_assert_eq!(text[open_pos..].chars().next(), Some('('));
    let mut found = None;
    let mut open_depth = None;
    scan_unquoted(text, |i, c, depth| {
        if i == open_pos {
            open_depth = Some(depth);
        } else if let Some(od) = open_depth {
            if c == ')' && depth == od {
                found = Some(i);
                return true;
            }
        }
        false
    });
    found
}

/// Split a string on commas that sit at paren depth 0 and outside quotes.
/// `split_top_level_commas("a, f(b, c), 'x,y'")` → `["a", " f(b, c)", " 'x,y'"]`.
pub fn split_top_level_commas(text: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    scan_unquoted(text, |i, c, depth| {
        if c == ',' && depth == 0 {
            parts.push(&text[start..i]);
            start = i + 1;
        }
        false
    });
    parts.push(&text[start..]);
    parts
}

/// The next whitespace-delimited token starting at or after `from`.
///
/// A token is either a run of identifier characters, a `"quoted"` or
/// `[bracketed]` identifier (returned with its delimiters), or a single
/// punctuation character. Returns `(token, start, end)` byte offsets.
pub fn next_token(text: &str, from: usize) -> Option<(&str, usize, usize)> {
    let rest = &text[from..];
    let offset = rest.find(|c: char| !c.is_whitespace())?;
    let start = from + offset;
    let first = text[start..].chars().next()?;
    let end = match first {
        '"' => start + text[start + 1..].find('"').map(|p| p + 2)?,
        '[' => start + text[start + 1..].find(']').map(|p| p + 2)?,
        '\'' => {
            // string literal with '' escaping
            let mut iter = text[start + 1..].char_indices().peekable();
            let mut close = None;
            while let Some((i, c)) = iter.next() {
                if c == '\'' {
                    if let Some(&(_, '\'')) = iter.peek() {
                        iter.next();
                    } else {
                        close = Some(start + 1 + i + 1);
                        break;
                    }
                }
            }
            close?
        }
        c if is_ident_char(c) => {
            let len = text[start..]
                .find(|c: char| !is_ident_char(c))
                .unwrap_or(text.len() - start);
            start + len
        }
        c => start + c.len_utf8(),
    };
    Some((&text[start..end], start, end))
}

/// Identifier token immediately before byte offset `pos`, skipping
/// whitespace. Used to decide whether a `FROM` belongs to an
/// `EXTRACT(... FROM ...)`-family call rather than a table source.
pub fn ident_before(text: &str, pos: usize) -> Option<&str> {
    let trimmed = text[..pos].trim_end();
    let end = trimmed.len();
    if end == 0 {
        return None;
    }
    let start = trimmed
        .rfind(|c: char| !is_ident_char(c))
        .map(|p| p + 1)
        .unwrap_or(0);
    if start == end {
        None
    } else {
        Some(&trimmed[start..end])
    }
}

/// Byte offset of the innermost unclosed `(` strictly before `pos`,
/// outside quotes. `None` when `pos` is at top level.
pub fn enclosing_open_paren(text: &str, pos: usize) -> Option<usize> {
    let mut stack: Vec<usize> = Vec::new();
    let mut result = None;
    scan_unquoted(text, |i, c, _| {
        if i >= pos {
            result = stack.last().copied();
            return true;
        }
        match c {
            '(' => stack.push(i),
            ')' => {
                stack.pop();
            }
            _ => {}
        }
        false
    });
    result.or_else(|| stack.last().copied())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_keyword_skips_quotes() {
        let q = "SELECT 'from here', \"from\" FROM t";
        let hit = find_keyword(q, "from", 0).unwrap();
        assert_eq!(&q[hit.pos..hit.pos + 4], "FROM");
        assert_eq!(hit.depth, 0);
    }

    #[test]
    fn test_find_keyword_word_boundary() {
        let q = "SELECT performer FROM t";
        let hit = find_keyword(q, "from", 0).unwrap();
        assert_eq!(hit.pos, q.find("FROM").unwrap());
    }

    #[test]
    fn test_find_keyword_depth() {
        let q = "SELECT (SELECT x FROM u) FROM t";
        let first = find_keyword(q, "from", 0).unwrap();
        assert_eq!(first.depth, 1);
        let second = find_keyword(q, "from", first.pos + 4).unwrap();
        assert_eq!(second.depth, 0);
    }

    #[test]
    fn test_top_level_keyword() {
        let q = "SELECT a FROM t WHERE x IN (SELECT y FROM u GROUP BY y) ORDER BY a";
        let pos = find_top_level_keyword(q, &["group by", "order by"], 0).unwrap();
        assert_eq!(&q[pos..pos + 8], "ORDER BY");
    }

    #[test]
    fn test_matching_paren() {
        let q = "iif(a, nz(b, ')'), c)";
        let close = find_matching_paren(q, 3).unwrap();
        assert_eq!(close, q.len() - 1);
        let inner = find_matching_paren(q, q.find("nz(").unwrap() + 2).unwrap();
        assert_eq!(&q[inner..inner + 1], ")");
        assert_eq!(inner, q.find("), c").unwrap());
    }

    #[test]
    fn test_split_commas() {
        let parts = split_top_level_commas("a, f(b, c), 'x,y'");
        assert_eq!(parts, vec!["a", " f(b, c)", " 'x,y'"]);
        assert_eq!(split_top_level_commas("one"), vec!["one"]);
    }

    #[test]
    fn test_next_token() {
        let q = "  \"My Table\" AS t";
        let (tok, _, end) = next_token(q, 0).unwrap();
        assert_eq!(tok, "\"My Table\"");
        let (tok2, _, _) = next_token(q, end).unwrap();
        assert_eq!(tok2, "AS");
    }

    #[test]
    fn test_ident_before_and_enclosing_paren() {
        let q = "SELECT extract(year FROM d) FROM t";
        let inner_from = find_keyword(q, "from", 0).unwrap();
        assert_eq!(inner_from.depth, 1);
        let open = enclosing_open_paren(q, inner_from.pos).unwrap();
        assert_eq!(ident_before(q, open), Some("extract"));
    }
}
