//! Source preprocessing: comment removal, line continuation joining,
//! `#include` expansion, `#define` substitution, indentation stripping.
//! Runs before control-flow lowering.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::Error;

const MAX_INCLUDE_DEPTH: usize = 16;

/// Strip `//`, `/* */` and `'` comments. A `'` opens a comment only at line
/// start or after whitespace, so apostrophes inside words survive. Lines
/// starting with `=` are literal text and pass through untouched.
pub fn remove_comments(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_block = false;
    for line in text.lines() {
        if !in_block && line.trim_start().starts_with('=') {
            out.push_str(line);
            out.push('\n');
            continue;
        }
        let bytes = line.as_bytes();
        let mut i = 0;
        while i < bytes.len() {
            if in_block {
                match line[i..].find("*/") {
                    Some(p) => {
                        in_block = false;
                        i += p + 2;
                    }
                    None => {
                        i = bytes.len();
                    }
                }
            } else if line[i..].starts_with("//") {
                break;
            } else if line[i..].starts_with("/*") {
                in_block = true;
                i += 2;
            } else if bytes[i] == b'\''
                && (i == 0 || bytes[i - 1] == b' ' || bytes[i - 1] == b'\t')
            {
                break;
            } else {
                let ch = line[i..].chars().next().unwrap();
                out.push(ch);
                i += ch.len_utf8();
            }
        }
        out.push('\n');
    }
    out
}

fn find_include(name: &str, dirs: &[PathBuf]) -> Option<PathBuf> {
    dirs.iter()
        .map(|d| d.join(name))
        .find(|p| p.is_file())
        .or_else(|| {
            let p = Path::new(name);
            p.is_file().then(|| p.to_path_buf())
        })
}

fn expand_includes(text: &str, dirs: &[PathBuf], depth: usize) -> Result<String, Error> {
    let mut out = String::with_capacity(text.len());
    for line in text.lines() {
        let trimmed = line.trim();
        if let Some(rest) = trimmed.strip_prefix("#include") {
            let name = rest.trim().trim_matches('"');
            if depth >= MAX_INCLUDE_DEPTH {
                return Err(Error::IncludeTooDeep { name: name.into() });
            }
            let path = find_include(name, dirs).ok_or_else(|| Error::IncludeNotFound {
                name: name.into(),
            })?;
            let included = std::fs::read_to_string(&path)
                .map_err(|_| Error::IncludeNotFound { name: name.into() })?
                .replace("\r\n", "\n");
            let included = remove_comments(&included).replace("\\\n", "");
            out.push_str(&expand_includes(&included, dirs, depth + 1)?);
        } else {
            out.push_str(line);
            out.push('\n');
        }
    }
    Ok(out)
}

/// Collect `#define NAME [VALUE]` lines, strip them, and substitute
/// whole-token occurrences in the rest. `=` lines are left alone.
fn apply_defines(text: &str) -> String {
    let mut defines: HashMap<&str, &str> = HashMap::new();
    for line in text.lines() {
        if let Some(rest) = line.trim().strip_prefix("#define") {
            let mut words = rest.split_whitespace();
            if let Some(name) = words.next() {
                defines.insert(name, words.next().unwrap_or(""));
            }
        }
    }
    let mut out = String::with_capacity(text.len());
    for line in text.lines() {
        if line.trim().starts_with("#define") {
            continue;
        }
        if line.trim_start().starts_with('=') || defines.is_empty() {
            out.push_str(line);
        } else {
            let replaced: Vec<&str> = line
                .split(' ')
                .map(|tok| defines.get(tok).copied().unwrap_or(tok))
                .collect();
            out.push_str(&replaced.join(" "));
        }
        out.push('\n');
    }
    out
}

/// Full preprocessing pass over raw script text.
pub fn preprocess(text: &str, include_dirs: &[PathBuf]) -> Result<String, Error> {
    let text = text.replace("\r\n", "\n");
    let text = remove_comments(&text);
    // Join lines ending with a backslash.
    let text = text.replace("\\\n", "");
    let text = expand_includes(&text, include_dirs, 0)?;
    let text = apply_defines(&text);
    // Strip leading indentation.
    let stripped: Vec<&str> = text.lines().map(|l| l.trim_start()).collect();
    Ok(stripped.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_line_and_block_comments() {
        let src = "lock // greet\nfaceplayer ' also this\n/* gone\nstill gone */release\n";
        let out = remove_comments(src);
        assert_eq!(out, "lock \nfaceplayer \n\nrelease\n");
    }

    #[test]
    fn apostrophes_inside_words_survive() {
        let out = remove_comments("= It's fine\nmsgbox @x ' note\n");
        assert_eq!(out, "= It's fine\nmsgbox @x \n");
    }

    #[test]
    fn joins_continued_lines_and_strips_indent() {
        let out = preprocess("  setvar \\\n0x8000 0x1\n", &[]).unwrap();
        assert_eq!(out.trim_end(), "setvar 0x8000 0x1");
    }

    #[test]
    fn defines_replace_whole_tokens_only() {
        let out = preprocess("#define FLAG 0x828\ncheckflag FLAG\nsetvar FLAGX 1\n", &[])
            .unwrap();
        assert!(out.contains("checkflag 0x828"));
        assert!(out.contains("setvar FLAGX 1"));
    }

    #[test]
    fn missing_include_is_fatal() {
        let err = preprocess("#include \"nope.inc\"\n", &[]).unwrap_err();
        assert!(matches!(err, Error::IncludeNotFound { .. }));
    }
}
