/*!
 * Import handling for translated segments.
 *
 * Each translated segment carries its own `use` declarations. Before the
 * segments are concatenated these are pulled out, deduplicated across all
 * segments and emitted once at the top of the merged file.
 */

use once_cell::sync::Lazy;
use regex::Regex;

/// `use ...;` / `extern crate ...;` at line start; the statement may span lines
static IMPORT_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^[ \t]*(?:pub(?:\([^)]*\))?[ \t]+)?(?:use|extern[ \t]+crate)\b[^;]*;[ \t]*(?:\r?\n)?")
        .unwrap()
});

static COMMA_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*,\s*").unwrap());
static BRACE_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*([{}])\s*").unwrap());
static PATH_SEP_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*::\s*").unwrap());
static SEMICOLON_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*;").unwrap());

/// Extract the import declarations of a segment in order of appearance.
///
/// Statements are returned in a canonical single-line form so that the same
/// import written across several lines compares equal to its one-line form.
pub fn extract_imports(text: &str) -> Vec<String> {
    IMPORT_REGEX
        .find_iter(text)
        .map(|m| canonical_import(m.as_str()))
        .collect()
}

/// Remove every import declaration from a segment body
pub fn strip_imports(text: &str) -> String {
    IMPORT_REGEX.replace_all(text, "").trim().to_string()
}

/// Extract and strip in one pass
pub fn split_imports(text: &str) -> (Vec<String>, String) {
    (extract_imports(text), strip_imports(text))
}

/// Deduplicate imports across segment bodies, keeping first-seen order.
///
/// Returns the unique imports and the bodies with their imports removed,
/// in the same order as the input.
pub fn consolidate_imports<'a, I>(bodies: I) -> (Vec<String>, Vec<String>)
where
    I: IntoIterator<Item = &'a str>,
{
    let mut unique: Vec<String> = Vec::new();
    let mut stripped = Vec::new();

    for body in bodies {
        let (imports, rest) = split_imports(body);
        for import in imports {
            if !unique.contains(&import) {
                unique.push(import);
            }
        }
        stripped.push(rest);
    }

    (unique, stripped)
}

fn canonical_import(raw: &str) -> String {
    let collapsed = super::signature::collapse_whitespace(raw);
    let spaced = COMMA_REGEX.replace_all(&collapsed, ", ");
    let braced = BRACE_REGEX.replace_all(&spaced, "$1");
    let pathed = PATH_SEP_REGEX.replace_all(&braced, "::");
    let braced_use = pathed.replacen("use{", "use {", 1);
    SEMICOLON_REGEX.replace_all(&braced_use, ";").to_string()
}
