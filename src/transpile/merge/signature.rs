/*!
 * Structural signatures for translated segments.
 *
 * Two segments are considered duplicates when they declare the same set of
 * items, regardless of what the function bodies contain. This catches
 * the common case where the same helper or struct is emitted by several
 * segment translations.
 */

use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};

/// Leading outer/inner attributes on a declaration
static ATTRIBUTES_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:#!?\[[^\]]*\]\s*)+").unwrap()
});

/// Item keywords, optionally preceded by visibility and qualifiers
static DECLARATION_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"^(?:pub(?:\([^)]*\))?\s+)?(?:(?:unsafe|async|const|default|extern(?:\s+"[^"]*")?)\s+)*(?:(?:fn|struct|enum|union|trait|impl|type|const|static|mod)\b|macro_rules!)"#,
    )
    .unwrap()
});

/// Compute the structural fingerprint of a translated segment.
///
/// Headers are sorted before hashing so that item order does not matter.
/// Text without any declaration header is fingerprinted by its
/// whitespace-normalized content instead.
pub fn compute_signature(text: &str) -> String {
    let mut headers = declaration_headers(text);

    let material = if headers.is_empty() {
        format!("body:{}", collapse_whitespace(text))
    } else {
        headers.sort();
        headers.join("\n")
    };

    let mut hasher = Sha256::new();
    hasher.update(material.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Header of an item whose body holds further items
static CONTAINER_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:pub(?:\([^)]*\))?\s+)?(?:(?:unsafe|default)\s+)*(?:impl|trait|mod)\b").unwrap()
});

/// Collect the declaration headers of a Rust text.
///
/// A header is everything from the start of an item up to its opening brace
/// or terminating semicolon, with whitespace collapsed. Items inside `impl`,
/// `trait` and `mod` bodies are collected too, prefixed with the enclosing
/// header (`impl Point::pub fn new() -> Self`), so two blocks for the same
/// type only match when they declare the same members.
pub fn declaration_headers(text: &str) -> Vec<String> {
    let mut headers = Vec::new();
    let mut current = String::new();
    // One entry per open brace: the member prefix when its body holds items
    let mut scopes: Vec<Option<String>> = Vec::new();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        let collecting = matches!(scopes.last(), None | Some(Some(_)));
        match c {
            '/' if chars.peek() == Some(&'/') => {
                for next in chars.by_ref() {
                    if next == '\n' {
                        break;
                    }
                }
                if collecting {
                    current.push(' ');
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = ' ';
                for next in chars.by_ref() {
                    if prev == '*' && next == '/' {
                        break;
                    }
                    prev = next;
                }
                if collecting {
                    current.push(' ');
                }
            }
            '"' => {
                let mut escaped = false;
                if collecting {
                    current.push('"');
                }
                for next in chars.by_ref() {
                    if collecting {
                        current.push(next);
                    }
                    if escaped {
                        escaped = false;
                    } else if next == '\\' {
                        escaped = true;
                    } else if next == '"' {
                        break;
                    }
                }
            }
            '{' => {
                let scope = if collecting {
                    let prefix = member_prefix(&scopes);
                    let header = push_header(&mut headers, prefix, &current);
                    current.clear();
                    header
                        .filter(|h| CONTAINER_REGEX.is_match(&h[prefix.len()..]))
                        .map(|h| format!("{}::", h))
                } else {
                    None
                };
                scopes.push(scope);
            }
            '}' => {
                scopes.pop();
                current.clear();
            }
            ';' if collecting => {
                push_header(&mut headers, member_prefix(&scopes), &current);
                current.clear();
            }
            _ if collecting => current.push(c),
            _ => {}
        }
    }

    headers
}

fn member_prefix(scopes: &[Option<String>]) -> &str {
    scopes.last().and_then(|s| s.as_deref()).unwrap_or("")
}

/// Record `raw` as a header if it starts an item; returns the recorded header
fn push_header(headers: &mut Vec<String>, prefix: &str, raw: &str) -> Option<String> {
    let collapsed = collapse_whitespace(raw);
    let stripped = ATTRIBUTES_REGEX.replace(&collapsed, "");
    let header = stripped.trim();
    if DECLARATION_REGEX.is_match(header) {
        let header = format!("{}{}", prefix, header);
        headers.push(header.clone());
        Some(header)
    } else {
        None
    }
}

pub(crate) fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
