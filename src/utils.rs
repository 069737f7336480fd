//! String utilities shared by the equation model and the code generators.
//!
//! Expressions are handled as text at several points (substituting static equations,
//! computing the variable footprint of abstract code, filling templates), so these
//! helpers work on identifiers and indentation rather than on a parsed tree.

use std::collections::{BTreeSet, HashMap};

/// Spans of all identifiers in `code`, skipping exponents of numeric literals such as `1e3`.
fn identifier_spans(code: &str) -> Vec<(usize, usize)> {
    let bytes = code.as_bytes();
    let mut spans = Vec::new();
    let mut pos = 0;
    while pos < bytes.len() {
        let c = bytes[pos];
        if c.is_ascii_digit() || (c == b'.' && bytes.get(pos + 1).is_some_and(u8::is_ascii_digit))
        {
            // numeric literal, including an exponent part
            pos += 1;
            while pos < bytes.len() {
                let d = bytes[pos];
                if d.is_ascii_digit() || d == b'.' {
                    pos += 1;
                } else if (d == b'e' || d == b'E')
                    && bytes
                        .get(pos + 1)
                        .is_some_and(|n| n.is_ascii_digit() || *n == b'-' || *n == b'+')
                {
                    pos += 2;
                } else {
                    break;
                }
            }
        } else if c.is_ascii_alphabetic() || c == b'_' {
            let start = pos;
            while pos < bytes.len() && (bytes[pos].is_ascii_alphanumeric() || bytes[pos] == b'_') {
                pos += 1;
            }
            spans.push((start, pos));
        } else {
            pos += 1;
        }
    }
    spans
}

/// Returns all identifiers appearing in `code`, including function names.
///
/// # Example
/// ```rust
/// use diffeq_codegen::utils::get_identifiers;
///
/// let ids = get_identifiers("a*b + 1e-3*exp(c_2)");
/// assert_eq!(ids.into_iter().collect::<Vec<_>>(), vec!["a", "b", "c_2", "exp"]);
/// ```
pub fn get_identifiers(code: &str) -> BTreeSet<String> {
    identifier_spans(code)
        .into_iter()
        .map(|(start, end)| code[start..end].to_string())
        .collect()
}

/// Replaces whole identifiers in `code` according to `substitutions`.
///
/// Only complete words are replaced: substituting `v` leaves `v0` and `dv` untouched.
pub fn word_substitute(code: &str, substitutions: &HashMap<String, String>) -> String {
    let mut result = String::with_capacity(code.len());
    let mut last = 0;
    for (start, end) in identifier_spans(code) {
        if let Some(replacement) = substitutions.get(&code[start..end]) {
            result.push_str(&code[last..start]);
            result.push_str(replacement);
            last = end;
        }
    }
    result.push_str(&code[last..]);
    result
}

fn indent_width(line: &str) -> usize {
    line.len() - line.trim_start_matches(' ').len()
}

/// Removes the indentation common to all non-blank lines. Tabs count as four spaces.
pub fn deindent(text: &str) -> String {
    let text = text.replace('\t', "    ");
    let common = text
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(indent_width)
        .min()
        .unwrap_or(0);
    text.split('\n')
        .map(|line| line.get(common..).unwrap_or("").trim_end_matches(' '))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Prefixes every line but the first with `prefix`.
pub fn indent_continuation(text: &str, prefix: &str) -> String {
    text.split('\n')
        .enumerate()
        .map(|(i, line)| {
            if i == 0 || line.is_empty() {
                line.to_string()
            } else {
                format!("{prefix}{line}")
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_identifiers() {
        let ids = get_identifiers("-v / tau + sin(2 * pi * t * f)");
        let expected: BTreeSet<String> = ["v", "tau", "sin", "pi", "t", "f"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(ids, expected);

        assert!(get_identifiers("3.5e-3 + 2E4").is_empty());
        assert_eq!(get_identifiers("x1e3").len(), 1);
    }

    #[test]
    fn test_word_substitute() {
        let subs: HashMap<String, String> = [("v".to_string(), "(w + 1)".to_string())]
            .into_iter()
            .collect();
        assert_eq!(word_substitute("v + v0 * dv / v", &subs), "(w + 1) + v0 * dv / (w + 1)");
        assert_eq!(word_substitute("1e3 * x", &subs), "1e3 * x");
    }

    #[test]
    fn test_deindent() {
        let text = "    a = 1\n      b = 2\n\n    c = 3";
        assert_eq!(deindent(text), "a = 1\n  b = 2\n\nc = 3");
        assert_eq!(deindent("\tx"), "x");
        assert_eq!(deindent("no indent"), "no indent");
    }

    #[test]
    fn test_indent_continuation() {
        assert_eq!(indent_continuation("a\nb\n\nc", "  "), "a\n  b\n\n  c");
    }
}
