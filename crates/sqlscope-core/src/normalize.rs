//! Lexical normalization of SQL text into grouping patterns.
//!
//! Quoted literals and digit runs are replaced with `?` placeholders so that
//! statements differing only in parameter values share one pattern:
//! `SELECT * FROM t WHERE id=42 AND name='bob'` and
//! `SELECT * FROM t WHERE id=7 AND name='alice'` both become
//! `SELECT * FROM t WHERE id=? AND name='?'`.
//!
//! This is not a SQL parser. Double-quoted identifiers are treated as
//! literals too, and patterns are truncated, so distinct statements can merge.

use xxhash_rust::xxh3::xxh3_64;

/// Maximum length (in characters) of a normalized pattern.
///
/// Truncation happens after normalization, so two statements that differ
/// only past this point collide into one group.
pub const MAX_PATTERN_LEN: usize = 150;

/// Normalize statement text into its grouping pattern.
///
/// Pure and deterministic: the same input always yields the same output.
pub fn normalize(text: &str) -> String {
    // 1. Quoted literals → '?' / "?"
    let s = replace_quoted_literals(text);

    // 2. Digit runs → ?
    let s = replace_digit_runs(&s);

    // 3. Collapse whitespace
    let mut s = collapse_whitespace(&s);

    // 4. Truncate
    if let Some((idx, _)) = s.char_indices().nth(MAX_PATTERN_LEN) {
        s.truncate(idx);
    }

    s
}

/// Stable 64-bit id of a normalized pattern.
pub fn fingerprint(pattern: &str) -> u64 {
    xxh3_64(pattern.as_bytes())
}

/// Leading keyword of a statement, upper-cased (`SELECT`, `INSERT`, ...).
///
/// Returns `UNKNOWN` for blank text.
pub fn statement_kind(text: &str) -> String {
    text.split_whitespace()
        .next()
        .map(|word| word.trim_start_matches('('))
        .filter(|word| !word.is_empty())
        .map(|word| {
            word.chars()
                .take_while(|c| c.is_ascii_alphabetic())
                .collect::<String>()
                .to_ascii_uppercase()
        })
        .filter(|word| !word.is_empty())
        .unwrap_or_else(|| "UNKNOWN".to_string())
}

/// Replace every `'...'` and `"..."` span with `'?'` / `"?"`.
///
/// A doubled quote inside a literal is an escaped quote and does not end it.
/// An unterminated literal is left as is.
fn replace_quoted_literals(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut rest = s;

    while let Some(start) = rest.find(['\'', '"']) {
        let quote = rest.as_bytes()[start] as char;
        result.push_str(&rest[..start]);

        match literal_end(&rest[start + 1..], quote) {
            Some(len) => {
                result.push(quote);
                result.push('?');
                result.push(quote);
                rest = &rest[start + 1 + len + 1..];
            }
            None => {
                // Unterminated
                result.push_str(&rest[start..]);
                rest = "";
            }
        }
    }

    result.push_str(rest);
    result
}

/// Byte length of the literal body before its closing quote.
fn literal_end(body: &str, quote: char) -> Option<usize> {
    let bytes = body.as_bytes();
    let q = quote as u8;
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == q {
            if bytes.get(i + 1) == Some(&q) {
                i += 2;
                continue;
            }
            return Some(i);
        }
        i += 1;
    }
    None
}

fn replace_digit_runs(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut in_digits = false;

    for c in s.chars() {
        if c.is_ascii_digit() {
            if !in_digits {
                result.push('?');
                in_digits = true;
            }
        } else {
            in_digits = false;
            result.push(c);
        }
    }

    result
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_literal_and_number() {
        assert_eq!(
            normalize("SELECT * FROM t WHERE id=42 AND name='bob'"),
            "SELECT * FROM t WHERE id=? AND name='?'"
        );
    }

    #[test]
    fn test_normalize_values_collide() {
        assert_eq!(
            normalize("SELECT * FROM t WHERE id=42 AND name='bob'"),
            normalize("SELECT * FROM t WHERE id=7 AND name='alice smith'")
        );
    }

    #[test]
    fn test_normalize_double_quoted() {
        assert_eq!(
            normalize(r#"SELECT "blog_post"."id" FROM "blog_post" WHERE "blog_post"."id" = 3"#),
            r#"SELECT "?"."?" FROM "?" WHERE "?"."?" = ?"#
        );
    }

    #[test]
    fn test_normalize_escaped_quote() {
        assert_eq!(
            normalize("INSERT INTO c (body) VALUES ('it''s fine')"),
            "INSERT INTO c (body) VALUES ('?')"
        );
    }

    #[test]
    fn test_normalize_empty_literal() {
        assert_eq!(normalize("WHERE a = '' AND b = 'x'"), "WHERE a = '?' AND b = '?'");
    }

    #[test]
    fn test_normalize_unterminated_literal() {
        assert_eq!(normalize("SELECT 'abc"), "SELECT 'abc");
    }

    #[test]
    fn test_normalize_digits_inside_quotes_are_one_placeholder() {
        assert_eq!(normalize("WHERE d = '2024-01-01'"), "WHERE d = '?'");
    }

    #[test]
    fn test_normalize_digit_runs() {
        assert_eq!(
            normalize("SELECT 1.25 FROM t1 LIMIT 10 OFFSET 200"),
            "SELECT ?.? FROM t? LIMIT ? OFFSET ?"
        );
    }

    #[test]
    fn test_normalize_whitespace() {
        assert_eq!(
            normalize("  SELECT *\n\tFROM   t\r\n WHERE id = 1  "),
            "SELECT * FROM t WHERE id = ?"
        );
    }

    #[test]
    fn test_normalize_truncation_merges_tails() {
        let prefix = "SELECT ".to_string() + &"x, ".repeat(60);
        let a = normalize(&format!("{prefix} FROM alpha"));
        let b = normalize(&format!("{prefix} FROM beta"));
        assert_eq!(a.chars().count(), MAX_PATTERN_LEN);
        assert_eq!(a, b);
    }

    #[test]
    fn test_normalize_truncation_multibyte() {
        let text = "é".repeat(400);
        assert_eq!(normalize(&text).chars().count(), MAX_PATTERN_LEN);
    }

    #[test]
    fn test_normalize_empty() {
        assert_eq!(normalize(""), "");
        assert_eq!(normalize("   "), "");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let once = normalize("UPDATE t SET v = 'a' WHERE id = 99");
        assert_eq!(normalize(&once), once);
    }

    #[test]
    fn test_fingerprint_stable() {
        assert_eq!(fingerprint("SELECT ?"), fingerprint("SELECT ?"));
        assert_ne!(fingerprint("SELECT ?"), fingerprint("DELETE ?"));
    }

    #[test]
    fn test_statement_kind() {
        assert_eq!(statement_kind("select * from t"), "SELECT");
        assert_eq!(statement_kind("  INSERT INTO t VALUES (1)"), "INSERT");
        assert_eq!(statement_kind("(SELECT 1) UNION (SELECT 2)"), "SELECT");
        assert_eq!(statement_kind("SAVEPOINT \"s1\""), "SAVEPOINT");
        assert_eq!(statement_kind(""), "UNKNOWN");
        assert_eq!(statement_kind("42"), "UNKNOWN");
    }
}
