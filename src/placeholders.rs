use std::borrow::Cow;

use crate::translate::Dialect;

/// Parameter placeholder syntax understood by an engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceholderStyle {
    /// `$1, $2, ...`
    Dollar,
    /// `?1, ?2, ...`
    Question,
}

impl From<Dialect> for PlaceholderStyle {
    fn from(dialect: Dialect) -> Self {
        match dialect {
            Dialect::Postgres => PlaceholderStyle::Dollar,
            Dialect::Sqlite => PlaceholderStyle::Question,
        }
    }
}

#[derive(Clone)]
enum Scan {
    Code,
    SingleQuote,
    DoubleQuote,
    LineComment,
    BlockComment(u32),
    DollarQuote(String),
}

/// Rewrite positional placeholders for `target`.
///
/// Accepts `$N`, `?N` and bare `?` (numbered in order of appearance). Text inside
/// string literals, quoted identifiers, comments and `$tag$` blocks is never touched.
/// Returns the input unchanged (borrowed) when nothing needed rewriting.
#[must_use]
pub fn rewrite_placeholders(sql: &str, target: PlaceholderStyle) -> Cow<'_, str> {
    let bytes = sql.as_bytes();
    let mut out: Option<String> = None;
    let mut state = Scan::Code;
    let mut bare_count = 0_usize;
    let mut idx = 0;

    while idx < bytes.len() {
        let b = bytes[idx];
        // (text to emit instead of the consumed bytes, index after them)
        let mut replacement: Option<(String, usize)> = None;

        match state {
            Scan::Code => match b {
                b'\'' => state = Scan::SingleQuote,
                b'"' => state = Scan::DoubleQuote,
                b'-' if bytes.get(idx + 1) == Some(&b'-') => state = Scan::LineComment,
                b'/' if bytes.get(idx + 1) == Some(&b'*') => state = Scan::BlockComment(1),
                b'$' => {
                    if let Some(end) = digits_end(bytes, idx + 1) {
                        if target == PlaceholderStyle::Question {
                            replacement = Some((format!("?{}", &sql[idx + 1..end]), end));
                        }
                    } else if let Some((tag, close)) = dollar_tag(bytes, idx) {
                        state = Scan::DollarQuote(tag);
                        flush(&mut out, sql, idx, close + 1);
                        idx = close + 1;
                        continue;
                    }
                }
                b'?' => match digits_end(bytes, idx + 1) {
                    Some(end) if target == PlaceholderStyle::Dollar => {
                        replacement = Some((format!("${}", &sql[idx + 1..end]), end));
                    }
                    Some(_) => {}
                    None => {
                        bare_count += 1;
                        let marker = match target {
                            PlaceholderStyle::Dollar => '$',
                            PlaceholderStyle::Question => '?',
                        };
                        replacement = Some((format!("{marker}{bare_count}"), idx + 1));
                    }
                },
                _ => {}
            },
            Scan::SingleQuote | Scan::DoubleQuote => {
                let quote = if matches!(state, Scan::SingleQuote) { b'\'' } else { b'"' };
                if b == quote {
                    if bytes.get(idx + 1) == Some(&quote) {
                        flush(&mut out, sql, idx, idx + 2);
                        idx += 2;
                        continue;
                    }
                    state = Scan::Code;
                }
            }
            Scan::LineComment => {
                if b == b'\n' {
                    state = Scan::Code;
                }
            }
            Scan::BlockComment(depth) => {
                if b == b'/' && bytes.get(idx + 1) == Some(&b'*') {
                    state = Scan::BlockComment(depth + 1);
                    flush(&mut out, sql, idx, idx + 2);
                    idx += 2;
                    continue;
                }
                if b == b'*' && bytes.get(idx + 1) == Some(&b'/') {
                    state = if depth == 1 {
                        Scan::Code
                    } else {
                        Scan::BlockComment(depth - 1)
                    };
                    flush(&mut out, sql, idx, idx + 2);
                    idx += 2;
                    continue;
                }
            }
            Scan::DollarQuote(ref tag) => {
                if b == b'$' && closes_tag(bytes, idx, tag) {
                    let end = idx + tag.len() + 2;
                    state = Scan::Code;
                    flush(&mut out, sql, idx, end);
                    idx = end;
                    continue;
                }
            }
        }

        if let Some((text, next)) = replacement {
            out.get_or_insert_with(|| sql[..idx].to_string())
                .push_str(&text);
            idx = next;
        } else {
            let next = idx + utf8_len(b);
            flush(&mut out, sql, idx, next);
            idx = next;
        }
    }

    match out {
        Some(buf) => Cow::Owned(buf),
        None => Cow::Borrowed(sql),
    }
}

/// Split a script at top-level `;`. Semicolons inside literals, quoted identifiers,
/// comments and `$tag$` blocks do not end a statement. Empty statements are dropped
/// and each piece is trimmed.
#[must_use]
pub fn split_statements(sql: &str) -> Vec<&str> {
    let bytes = sql.as_bytes();
    let mut statements = Vec::new();
    let mut state = Scan::Code;
    let mut start = 0;
    let mut idx = 0;

    while idx < bytes.len() {
        let b = bytes[idx];
        match state {
            Scan::Code => match b {
                b';' => {
                    push_trimmed(&mut statements, &sql[start..idx]);
                    start = idx + 1;
                }
                b'\'' => state = Scan::SingleQuote,
                b'"' => state = Scan::DoubleQuote,
                b'-' if bytes.get(idx + 1) == Some(&b'-') => state = Scan::LineComment,
                b'/' if bytes.get(idx + 1) == Some(&b'*') => {
                    state = Scan::BlockComment(1);
                    idx += 2;
                    continue;
                }
                b'$' if digits_end(bytes, idx + 1).is_none() => {
                    if let Some((tag, close)) = dollar_tag(bytes, idx) {
                        state = Scan::DollarQuote(tag);
                        idx = close + 1;
                        continue;
                    }
                }
                _ => {}
            },
            Scan::SingleQuote | Scan::DoubleQuote => {
                let quote = if matches!(state, Scan::SingleQuote) { b'\'' } else { b'"' };
                if b == quote {
                    if bytes.get(idx + 1) == Some(&quote) {
                        idx += 2;
                        continue;
                    }
                    state = Scan::Code;
                }
            }
            Scan::LineComment => {
                if b == b'\n' {
                    state = Scan::Code;
                }
            }
            Scan::BlockComment(depth) => {
                if b == b'/' && bytes.get(idx + 1) == Some(&b'*') {
                    state = Scan::BlockComment(depth + 1);
                    idx += 2;
                    continue;
                }
                if b == b'*' && bytes.get(idx + 1) == Some(&b'/') {
                    state = if depth == 1 {
                        Scan::Code
                    } else {
                        Scan::BlockComment(depth - 1)
                    };
                    idx += 2;
                    continue;
                }
            }
            Scan::DollarQuote(ref tag) => {
                if b == b'$' && closes_tag(bytes, idx, tag) {
                    idx += tag.len() + 2;
                    state = Scan::Code;
                    continue;
                }
            }
        }
        idx += utf8_len(b);
    }
    push_trimmed(&mut statements, &sql[start.min(sql.len())..]);
    statements
}

fn push_trimmed<'a>(statements: &mut Vec<&'a str>, piece: &'a str) {
    let piece = piece.trim();
    if !piece.is_empty() {
        statements.push(piece);
    }
}

fn flush(out: &mut Option<String>, sql: &str, from: usize, to: usize) {
    if let Some(buf) = out {
        buf.push_str(&sql[from..to.min(sql.len())]);
    }
}

fn utf8_len(first: u8) -> usize {
    match first {
        0xF0..=0xFF => 4,
        0xE0..=0xEF => 3,
        0xC0..=0xDF => 2,
        _ => 1,
    }
}

fn digits_end(bytes: &[u8], start: usize) -> Option<usize> {
    let end = start
        + bytes[start.min(bytes.len())..]
            .iter()
            .take_while(|b| b.is_ascii_digit())
            .count();
    (end > start).then_some(end)
}

/// `$tag$` opener starting at `start`; returns the tag and the index of its closing `$`.
fn dollar_tag(bytes: &[u8], start: usize) -> Option<(String, usize)> {
    let mut idx = start + 1;
    while idx < bytes.len() && bytes[idx] != b'$' {
        if !(bytes[idx].is_ascii_alphanumeric() || bytes[idx] == b'_') {
            return None;
        }
        idx += 1;
    }
    if idx >= bytes.len() {
        return None;
    }
    let tag = std::str::from_utf8(&bytes[start + 1..idx]).ok()?.to_string();
    Some((tag, idx))
}

fn closes_tag(bytes: &[u8], idx: usize, tag: &str) -> bool {
    let tag_end = idx + 1 + tag.len();
    tag_end < bytes.len()
        && &bytes[idx + 1..tag_end] == tag.as_bytes()
        && bytes[tag_end] == b'$'
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dollar_to_question() {
        let sql = "SELECT id FROM users WHERE username = $1 OR email = $2";
        assert_eq!(
            rewrite_placeholders(sql, PlaceholderStyle::Question),
            "SELECT id FROM users WHERE username = ?1 OR email = ?2"
        );
    }

    #[test]
    fn question_to_dollar_numbered_and_bare() {
        assert_eq!(
            rewrite_placeholders("UPDATE t SET a = ?2 WHERE id = ?1", PlaceholderStyle::Dollar),
            "UPDATE t SET a = $2 WHERE id = $1"
        );
        assert_eq!(
            rewrite_placeholders("INSERT INTO t (a, b) VALUES (?, ?)", PlaceholderStyle::Dollar),
            "INSERT INTO t (a, b) VALUES ($1, $2)"
        );
    }

    #[test]
    fn bare_question_marks_numbered_for_sqlite_too() {
        assert_eq!(
            rewrite_placeholders("VALUES (?, ?)", PlaceholderStyle::Question),
            "VALUES (?1, ?2)"
        );
    }

    #[test]
    fn literals_comments_and_dollar_blocks_untouched() {
        let sql = "SELECT '$1', \"?\" -- $2\n/* ?3 /* $4 */ */ FROM t WHERE a = $1";
        assert_eq!(
            rewrite_placeholders(sql, PlaceholderStyle::Question),
            "SELECT '$1', \"?\" -- $2\n/* ?3 /* $4 */ */ FROM t WHERE a = ?1"
        );
        let body = "$fn$ BEGIN RETURN $1; END; $fn$ WHERE x = $1";
        assert_eq!(
            rewrite_placeholders(body, PlaceholderStyle::Question),
            "$fn$ BEGIN RETURN $1; END; $fn$ WHERE x = ?1"
        );
    }

    #[test]
    fn escaped_quotes_and_unicode_pass_through() {
        let sql = "SELECT 'it''s ?', 'илья' WHERE u = ?";
        assert_eq!(
            rewrite_placeholders(sql, PlaceholderStyle::Dollar),
            "SELECT 'it''s ?', 'илья' WHERE u = $1"
        );
    }

    #[test]
    fn unchanged_sql_is_borrowed() {
        let sql = "SELECT 1 FROM applied_migrations WHERE name = $1";
        assert!(matches!(
            rewrite_placeholders(sql, PlaceholderStyle::Dollar),
            Cow::Borrowed(_)
        ));
    }

    #[test]
    fn statements_split_outside_literals_only() {
        let sql = "CREATE TABLE a (s TEXT DEFAULT ';');\n-- note; still comment\nCREATE TABLE b (x INT);;\n\
                   CREATE FUNCTION f() RETURNS TRIGGER AS $$ BEGIN RETURN NEW; END; $$ LANGUAGE plpgsql";
        let parts = split_statements(sql);
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "CREATE TABLE a (s TEXT DEFAULT ';')");
        assert!(parts[1].ends_with("CREATE TABLE b (x INT)"));
        assert!(parts[2].ends_with("LANGUAGE plpgsql"));
        assert!(split_statements(" ; \n").is_empty());
    }
}
