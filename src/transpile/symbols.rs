/*!
 * Symbol model shared by extraction, graph building and segmentation.
 */

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of declarative unit a symbol describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SymbolKind {
    Function,
    Struct,
    Union,
}

impl fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Function => "function",
            Self::Struct => "struct",
            Self::Union => "union",
        };
        write!(f, "{}", name)
    }
}

/// A named declaration extracted from the normalized source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Symbol {
    /// Declared name; not necessarily unique within a file
    pub name: String,

    /// Declaration kind
    pub kind: SymbolKind,

    /// First line of the declaration (1-indexed)
    pub start_line: usize,

    /// Last line of the declaration (1-indexed, inclusive)
    pub end_line: usize,

    /// Referenced names in first-seen order
    #[serde(default)]
    pub dependencies: Vec<String>,
}

impl Symbol {
    /// Create a symbol without dependencies
    pub fn new(name: &str, kind: SymbolKind, start_line: usize, end_line: usize) -> Self {
        Self {
            name: name.to_string(),
            kind,
            start_line,
            end_line,
            dependencies: Vec::new(),
        }
    }

    /// Builder-style helper to attach dependencies
    pub fn with_dependencies<I, S>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for dep in dependencies {
            let dep = dep.into();
            if !self.dependencies.contains(&dep) {
                self.dependencies.push(dep);
            }
        }
        self
    }

    /// Number of lines the symbol spans
    pub fn line_span(&self) -> usize {
        (self.end_line + 1).saturating_sub(self.start_line)
    }
}
