//! Lowers structured `if`/`while` source into flat, label-based
//! conditional-jump lines. A bracket-aware scan builds a nested statement
//! tree which is then lowered bottom-up, innermost bodies first.

use std::collections::HashSet;

use crate::error::Error;

/// Comparison operators in match order: two-character operators must be
/// tested before their single-character prefixes.
pub const OPERATORS: &[&str] = &["==", "!=", "<=", ">=", "<", ">"];

/// Encoded operator values used by the `if <op> …` sugar.
pub const OPERATOR_CODES: &[(&str, u32)] = &[
    ("==", 1),
    ("!=", 5),
    ("<", 0),
    (">", 2),
    ("<=", 3),
    (">=", 4),
];

fn opposite(op: &str) -> &'static str {
    match op {
        "==" => "!=",
        "!=" => "==",
        "<" => ">=",
        ">" => "<=",
        "<=" => ">",
        ">=" => "<",
        _ => unreachable!("unknown operator"),
    }
}

/// Find the span inside the first balanced `open`…`close` pair at or after
/// `from`. Returns byte offsets of the content (exclusive of the
/// delimiters); nesting-aware.
pub fn match_block(
    text: &str,
    from: usize,
    open: char,
    close: char,
) -> Result<(usize, usize), Error> {
    let open_at = text[from..]
        .find(open)
        .ok_or(Error::UnmatchedDelimiter { close })?
        + from;
    let mut depth = 1i32;
    for (i, ch) in text[open_at + 1..].char_indices() {
        if ch == open {
            depth += 1;
        } else if ch == close {
            depth -= 1;
            if depth == 0 {
                return Ok((open_at + 1, open_at + 1 + i));
            }
        }
    }
    Err(Error::UnmatchedDelimiter { close })
}

#[derive(Debug)]
enum Stmt {
    Plain(String),
    If {
        cond: String,
        body: Vec<Stmt>,
        else_body: Option<Vec<Stmt>>,
    },
    While {
        cond: String,
        body: Vec<Stmt>,
    },
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// Earliest `if (`/`while (` construct start, skipping keyword look-alikes
/// inside words and literal `=` text lines.
fn find_construct(text: &str) -> Option<(usize, &'static str)> {
    let bytes = text.as_bytes();
    let mut best: Option<(usize, &'static str)> = None;
    for kw in ["while", "if"] {
        let mut at = 0;
        while let Some(pos) = text[at..].find(kw) {
            let i = at + pos;
            at = i + 1;
            if i > 0 && is_word_byte(bytes[i - 1]) {
                continue;
            }
            let after = i + kw.len();
            if after < bytes.len() && is_word_byte(bytes[after]) {
                continue;
            }
            if !text[after..].trim_start_matches([' ', '\t']).starts_with('(') {
                continue;
            }
            let line_start = text[..i].rfind('\n').map_or(0, |p| p + 1);
            if text[line_start..].trim_start().starts_with('=') {
                continue;
            }
            if best.map_or(true, |(b, _)| i < b) {
                best = Some((i, kw));
            }
            break;
        }
    }
    best
}

fn push_plain(text: &str, out: &mut Vec<Stmt>) {
    for line in text.lines() {
        let line = line.trim();
        if !line.is_empty() {
            out.push(Stmt::Plain(line.to_string()));
        }
    }
}

fn parse_stmts(text: &str) -> Result<Vec<Stmt>, Error> {
    let mut out = Vec::new();
    let mut rest = text;
    while let Some((start, kw)) = find_construct(rest) {
        push_plain(&rest[..start], &mut out);
        let (cs, ce) = match_block(rest, start, '(', ')')?;
        let cond = rest[cs..ce].trim().to_string();
        let (bs, be) = match_block(rest, ce, '{', '}')?;
        let body = parse_stmts(&rest[bs..be])?;
        let mut consumed = be + 1;
        let stmt = if kw == "while" {
            Stmt::While { cond, body }
        } else {
            let tail = rest[consumed..].trim_start();
            let else_body = match tail.strip_prefix("else") {
                Some(t) if t.trim_start().starts_with('{') => {
                    let (es, ee) = match_block(rest, consumed, '{', '}')?;
                    consumed = ee + 1;
                    Some(parse_stmts(&rest[es..ee])?)
                }
                _ => None,
            };
            Stmt::If {
                cond,
                body,
                else_body,
            }
        };
        out.push(stmt);
        rest = &rest[consumed..];
    }
    push_plain(rest, &mut out);
    Ok(out)
}

/// `compare`/`checkflag` plus the skip-if-false jump to `target`.
fn condition_lines(cond: &str, target: &str, out: &mut Vec<String>) {
    for &op in OPERATORS {
        if let Some((var, lit)) = cond.split_once(op) {
            out.push(format!("compare {} {}", var.trim(), lit.trim()));
            out.push(format!("if {} jump {}", opposite(op), target));
            return;
        }
    }
    // No comparison operator: a bare flag test, possibly negated.
    let (flag, sense) = match cond.strip_prefix('!') {
        Some(f) => (f.trim(), "=="),
        None => (cond, "!="),
    };
    out.push(format!("checkflag {flag}"));
    out.push(format!("if {sense} jump {target}"));
}

fn emit_stmts(stmts: &[Stmt], out: &mut Vec<String>, counter: &mut usize) {
    for stmt in stmts {
        match stmt {
            Stmt::Plain(line) => out.push(line.clone()),
            Stmt::If {
                cond,
                body,
                else_body,
            } => {
                let mut body_lines = Vec::new();
                emit_stmts(body, &mut body_lines, counter);
                let mut else_lines = Vec::new();
                if let Some(eb) = else_body {
                    emit_stmts(eb, &mut else_lines, counter);
                }
                let n = *counter;
                *counter += 1;
                condition_lines(cond, &format!(":if_end{n}"), out);
                out.append(&mut body_lines);
                if else_body.is_some() {
                    out.push(format!("jump :else_end{n}"));
                    out.push(format!(":if_end{n}"));
                    out.append(&mut else_lines);
                    out.push(format!(":else_end{n}"));
                } else {
                    out.push(format!(":if_end{n}"));
                }
            }
            Stmt::While { cond, body } => {
                let mut body_lines = Vec::new();
                emit_stmts(body, &mut body_lines, counter);
                let n = *counter;
                *counter += 1;
                out.push(format!(":while_start{n}"));
                condition_lines(cond, &format!(":while_end{n}"), out);
                out.append(&mut body_lines);
                out.push(format!("jump :while_start{n}"));
                out.push(format!(":while_end{n}"));
            }
        }
    }
}

/// Every `@name` mentioned anywhere must have a matching `#org @name`.
fn check_dynamic_refs(text: &str) -> Result<(), Error> {
    let mut defined: HashSet<&str> = HashSet::new();
    for line in text.lines() {
        let mut words = line.split_whitespace();
        if words.next() == Some("#org") {
            if let Some(addr) = words.next() {
                if let Some(name) = addr.strip_prefix('@') {
                    defined.insert(name);
                }
            }
        }
    }
    for token in text.split_whitespace() {
        if let Some(name) = token.strip_prefix('@') {
            if !defined.contains(name) {
                return Err(Error::UndefinedDynamic { name: name.into() });
            }
        }
    }
    Ok(())
}

/// Lower all structured control flow in preprocessed script text to flat
/// lines. Labels are numbered from one counter, incremented once per
/// construct, so siblings and nested constructs never collide.
pub fn lower(text: &str) -> Result<String, Error> {
    check_dynamic_refs(text)?;
    let stmts = parse_stmts(text)?;
    let mut out = Vec::new();
    let mut counter = 0usize;
    emit_stmts(&stmts, &mut out, &mut counter);
    Ok(out.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matcher_returns_the_outer_span() {
        let (s, e) = match_block("{ { } }", 0, '{', '}').unwrap();
        assert_eq!(&"{ { } }"[s..e], " { } ");
    }

    #[test]
    fn matcher_rejects_unbalanced_input() {
        assert!(matches!(
            match_block("{ {", 0, '{', '}').unwrap_err(),
            Error::UnmatchedDelimiter { close: '}' }
        ));
    }

    #[test]
    fn construct_scan_skips_words_and_text_lines() {
        assert!(find_construct("jumpif (x)").is_none());
        assert!(find_construct("= ask me if (you dare)").is_none());
        assert_eq!(find_construct("while (x) {"), Some((0, "while")));
    }

    #[test]
    fn dynamic_reference_without_definition_is_fatal() {
        let err = lower("#org @main\njump @other\nend").unwrap_err();
        assert!(matches!(err, Error::UndefinedDynamic { name } if name == "other"));
    }
}
