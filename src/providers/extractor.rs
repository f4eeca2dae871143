/*!
 * Symbol extraction for preprocessed C sources.
 *
 * `CDeclarationScanner` is a lightweight brace-aware scanner rather than a
 * full C parser. It finds top-level function definitions and struct/union
 * definitions, reports their line ranges in the normalized text and collects
 * the names each of them refers to.
 *
 * Preprocessor line markers (`# 12 "file.c" 1`) are honored: only items that
 * start in the main file (the first file named by a marker) are returned, so
 * declarations pulled in from headers never become segments.
 */

use log::{debug, info};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{HashMap, HashSet};

use crate::errors::ExtractionError;
use crate::transpile::symbols::{Symbol, SymbolKind};

use super::SymbolExtractor;

/// `# <line> "<file>" [flags]` emitted by the preprocessor
static LINE_MARKER_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^#\s*(?:line\s+)?\d+\s+"([^"]*)""#).unwrap()
});

/// Header of a struct/union definition, capturing kind and optional tag
static RECORD_HEADER_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(typedef\s+)?(?:(?:static|const|volatile|extern)\s+)*(struct|union)(?:\s+([A-Za-z_]\w*))?$").unwrap()
});

static IDENTIFIER_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"[A-Za-z_]\w*").unwrap());

const C_KEYWORDS: &[&str] = &[
    "auto", "break", "case", "char", "const", "continue", "default", "do", "double", "else", "enum",
    "extern", "float", "for", "goto", "if", "inline", "int", "long", "register", "restrict", "return",
    "short", "signed", "sizeof", "static", "struct", "switch", "typedef", "union", "unsigned", "void",
    "volatile", "while", "_Bool", "_Complex", "_Alignof", "_Alignas", "_Static_assert", "_Noreturn",
];

/// One line of source with comments, literals and directives blanked out
#[derive(Debug)]
struct CleanLine {
    text: String,
    in_main: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LexState {
    Code,
    BlockComment,
    Str,
    Char,
}

/// What kind of item an opening brace at file scope belongs to
#[derive(Debug)]
enum OpenKind {
    Function(String),
    Record { kind: SymbolKind, tag: Option<String>, typedef: bool },
    /// Function-like block without a usable name; ends at its closing brace
    Block,
    /// Initializer or enum body; ends at the following `;`
    Other,
}

#[derive(Debug)]
struct OpenItem {
    kind: OpenKind,
    start_line: usize,
    in_main: bool,
    text: String,
}

/// Item found by the scanner, before dependency resolution
#[derive(Debug)]
struct RawItem {
    symbol: Symbol,
    text: String,
    alias: Option<String>,
}

/// Brace-aware scanner for top-level C declarations
#[derive(Debug, Clone, Default)]
pub struct CDeclarationScanner;

impl CDeclarationScanner {
    pub fn new() -> Self {
        Self
    }

    fn scan(&self, lines: &[CleanLine]) -> Result<Vec<RawItem>, ExtractionError> {
        let mut items = Vec::new();
        let mut depth: usize = 0;
        let mut header = String::new();
        let mut header_start: Option<(usize, bool)> = None;
        let mut open: Option<OpenItem> = None;
        // Record whose body closed, waiting for its terminating `;`
        let mut closing: Option<(OpenItem, String)> = None;

        for (idx, line) in lines.iter().enumerate() {
            let line_no = idx + 1;

            for c in line.text.chars() {
                if let Some((_, trailer)) = closing.as_mut() {
                    if c == ';' {
                        if let Some((item, trailer)) = closing.take() {
                            if let Some(raw) = finish_record(item, &trailer, line_no) {
                                items.push(raw);
                            }
                        }
                    } else {
                        trailer.push(c);
                    }
                    continue;
                }

                if depth == 0 {
                    match c {
                        '{' => {
                            let (start_line, in_main) = header_start.unwrap_or((line_no, line.in_main));
                            let kind = classify_header(&header);
                            open = Some(OpenItem {
                                kind,
                                start_line,
                                in_main,
                                text: format!("{} {{", header.trim()),
                            });
                            header.clear();
                            header_start = None;
                            depth = 1;
                        }
                        '}' => {
                            return Err(ExtractionError::Unparsable {
                                line: line_no,
                                reason: "unmatched closing brace".to_string(),
                            });
                        }
                        ';' => {
                            header.clear();
                            header_start = None;
                        }
                        _ => {
                            if header_start.is_none() && !c.is_whitespace() {
                                header_start = Some((line_no, line.in_main));
                            }
                            header.push(c);
                        }
                    }
                    continue;
                }

                if let Some(item) = open.as_mut() {
                    item.text.push(c);
                }
                match c {
                    '{' => depth += 1,
                    '}' => {
                        depth -= 1;
                        if depth == 0 {
                            if let Some(item) = open.take() {
                                match item.kind {
                                    OpenKind::Function(ref name) => {
                                        if item.in_main {
                                            let symbol = Symbol::new(name, SymbolKind::Function, item.start_line, line_no);
                                            items.push(RawItem { symbol, text: item.text, alias: None });
                                        }
                                    }
                                    OpenKind::Block => {
                                        debug!("Skipping unnamed block at line {}", item.start_line);
                                    }
                                    OpenKind::Record { .. } | OpenKind::Other => {
                                        closing = Some((item, String::new()));
                                    }
                                }
                            }
                        }
                    }
                    _ => {}
                }
            }

            if depth == 0 && closing.is_none() {
                header.push(' ');
            } else if let Some(item) = open.as_mut() {
                item.text.push('\n');
            }
        }

        if let Some(item) = open {
            return Err(ExtractionError::Unparsable {
                line: item.start_line,
                reason: "unterminated block at end of input".to_string(),
            });
        }

        Ok(items)
    }
}

impl SymbolExtractor for CDeclarationScanner {
    fn extract(&self, normalized_source: &str) -> Result<Vec<Symbol>, ExtractionError> {
        let lines = clean_lines(normalized_source);
        let items = self.scan(&lines)?;

        // Names (and typedef aliases) that other items may refer to
        let mut known: HashMap<String, String> = HashMap::new();
        for item in &items {
            known.entry(item.symbol.name.clone()).or_insert_with(|| item.symbol.name.clone());
            if let Some(alias) = &item.alias {
                known.entry(alias.clone()).or_insert_with(|| item.symbol.name.clone());
            }
        }

        let symbols: Vec<Symbol> = items
            .into_iter()
            .map(|item| {
                let deps = collect_dependencies(&item.text, &item.symbol.name, &known);
                info!(
                    "Extracted symbol: {} ({}) from lines {}-{}",
                    item.symbol.name, item.symbol.kind, item.symbol.start_line, item.symbol.end_line
                );
                item.symbol.with_dependencies(deps)
            })
            .collect();

        debug!("Extracted {} symbol(s)", symbols.len());
        Ok(symbols)
    }
}

fn classify_header(header: &str) -> OpenKind {
    let collapsed = header.split_whitespace().collect::<Vec<_>>().join(" ");

    if let Some(caps) = RECORD_HEADER_REGEX.captures(&collapsed) {
        let kind = if &caps[2] == "union" { SymbolKind::Union } else { SymbolKind::Struct };
        return OpenKind::Record {
            kind,
            tag: caps.get(3).map(|m| m.as_str().to_string()),
            typedef: caps.get(1).is_some(),
        };
    }

    if collapsed.contains('=') || collapsed.starts_with("typedef") {
        return OpenKind::Other;
    }

    // Anything not shaped like a function declarator (enum bodies) ends at `;`
    let declarator = strip_extensions(&collapsed);
    let declarator = declarator.trim();
    if !(declarator.ends_with(')') && declarator.contains('(')) {
        return OpenKind::Other;
    }
    match function_name(declarator) {
        Some(name) if !C_KEYWORDS.contains(&name) => OpenKind::Function(name.to_string()),
        _ => OpenKind::Block,
    }
}

/// Remove `__attribute__((...))`, `__asm__(...)` and similar `__name(...)`
/// groups so they are never mistaken for the declarator
fn strip_extensions(header: &str) -> String {
    let bytes = header.as_bytes();
    let mut out: Vec<u8> = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        let at_word_start = i == 0 || !is_ident_byte(bytes[i - 1]);
        if at_word_start && bytes[i..].starts_with(b"__") {
            let word_end = i + bytes[i..].iter().take_while(|b| is_ident_byte(**b)).count();
            let open = word_end + bytes[word_end..].iter().take_while(|b| **b == b' ').count();
            if bytes.get(open) == Some(&b'(') {
                if let Some(close) = matching_close(bytes, open) {
                    out.push(b' ');
                    i = close + 1;
                    continue;
                }
            }
            out.extend_from_slice(&bytes[i..word_end]);
            i = word_end;
            continue;
        }
        out.push(bytes[i]);
        i += 1;
    }

    String::from_utf8_lossy(&out).into_owned()
}

/// Name of the function a definition header declares.
///
/// The trailing parenthesized group is the parameter list. The name is the
/// identifier right before it, or, when a `)` precedes it, the name found by
/// the same rule inside that grouping, as in `int (*get_op(void))(int)`.
fn function_name(declarator: &str) -> Option<&str> {
    let bytes = declarator.as_bytes();
    let close = declarator.rfind(')')?;
    let open = matching_open(bytes, close)?;
    let before = declarator[..open].trim_end();

    if before.ends_with(')') {
        let inner_close = before.len() - 1;
        let inner_open = matching_open(bytes, inner_close)?;
        return function_name(declarator[inner_open + 1..inner_close].trim());
    }

    let start = before
        .bytes()
        .rev()
        .take_while(|b| is_ident_byte(*b))
        .count();
    let name = &before[before.len() - start..];
    match name.bytes().next() {
        Some(first) if !first.is_ascii_digit() => Some(name),
        _ => None,
    }
}

fn matching_open(bytes: &[u8], close: usize) -> Option<usize> {
    let mut depth = 0usize;
    for i in (0..=close).rev() {
        match bytes[i] {
            b')' => depth += 1,
            b'(' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

fn matching_close(bytes: &[u8], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (i, b) in bytes.iter().enumerate().skip(open) {
        match b {
            b'(' => depth += 1,
            b')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

fn finish_record(item: OpenItem, trailer: &str, end_line: usize) -> Option<RawItem> {
    let OpenKind::Record { kind, tag, typedef } = item.kind else {
        return None;
    };
    if !item.in_main {
        return None;
    }

    let declarator = IDENTIFIER_REGEX
        .find_iter(trailer)
        .map(|m| m.as_str().to_string())
        .last();
    let alias = if typedef { declarator } else { None };
    let name = tag.or_else(|| alias.clone())?;

    let symbol = Symbol::new(&name, kind, item.start_line, end_line);
    let alias = alias.filter(|a| a != &name);
    Some(RawItem { symbol, text: item.text, alias })
}

fn collect_dependencies(text: &str, own_name: &str, known: &HashMap<String, String>) -> Vec<String> {
    let mut deps: Vec<String> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    let mut previous: Option<&str> = None;

    for m in IDENTIFIER_REGEX.find_iter(text) {
        let token = m.as_str();
        let is_call = text[m.end()..].trim_start().starts_with('(');
        let after_tag = matches!(previous, Some("struct") | Some("union"));
        previous = Some(token);

        // Keywords, and reserved `__name`s such as attributes and builtins
        if C_KEYWORDS.contains(&token) || token.starts_with("__") {
            continue;
        }

        let resolved = if let Some(target) = known.get(token) {
            Some(target.clone())
        } else if is_call || after_tag {
            Some(token.to_string())
        } else {
            None
        };

        if let Some(name) = resolved {
            if name != own_name && seen.insert(name.clone()) {
                deps.push(name);
            }
        }
    }

    deps
}

/// Blank out comments, string/char literals and preprocessor directives,
/// tracking which lines belong to the main file.
fn clean_lines(source: &str) -> Vec<CleanLine> {
    let mut out = Vec::new();
    let mut state = LexState::Code;
    let mut main_file: Option<String> = None;
    let mut current_file: Option<String> = None;
    let mut continued_directive = false;

    for raw in source.lines() {
        let in_main = match (&main_file, &current_file) {
            (Some(main), Some(current)) => main == current,
            _ => true,
        };
        let trimmed = raw.trim_start();

        if continued_directive || (state == LexState::Code && trimmed.starts_with('#')) {
            if !continued_directive {
                if let Some(caps) = LINE_MARKER_REGEX.captures(trimmed) {
                    let file = caps[1].to_string();
                    if main_file.is_none() {
                        main_file = Some(file.clone());
                    }
                    current_file = Some(file);
                }
            }
            continued_directive = raw.trim_end().ends_with('\\');
            out.push(CleanLine { text: String::new(), in_main });
            continue;
        }

        let mut text = String::with_capacity(raw.len());
        let mut chars = raw.chars().peekable();
        while let Some(c) = chars.next() {
            match state {
                LexState::Code => match c {
                    '/' if chars.peek() == Some(&'/') => break,
                    '/' if chars.peek() == Some(&'*') => {
                        chars.next();
                        state = LexState::BlockComment;
                        text.push_str("  ");
                    }
                    '"' => {
                        state = LexState::Str;
                        text.push(' ');
                    }
                    '\'' => {
                        state = LexState::Char;
                        text.push(' ');
                    }
                    _ => text.push(c),
                },
                LexState::BlockComment => {
                    if c == '*' && chars.peek() == Some(&'/') {
                        chars.next();
                        state = LexState::Code;
                        text.push(' ');
                    }
                    text.push(' ');
                }
                LexState::Str | LexState::Char => {
                    let closing = if state == LexState::Str { '"' } else { '\'' };
                    if c == '\\' {
                        chars.next();
                        text.push(' ');
                    } else if c == closing {
                        state = LexState::Code;
                    }
                    text.push(' ');
                }
            }
        }

        // Literals never span lines without an explicit continuation
        if matches!(state, LexState::Str | LexState::Char) && !raw.ends_with('\\') {
            state = LexState::Code;
        }

        out.push(CleanLine { text, in_main });
    }

    out
}
