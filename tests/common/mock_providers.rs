/*!
 * Mock adapters for testing
 *
 * The library ships `MockTranslator`; these cover the other two seams so
 * tests can feed the engine hand-written symbols or a broken preprocessor.
 */

use async_trait::async_trait;
use std::path::PathBuf;

use c2rust_pipeline::errors::{ExtractionError, PreprocessError};
use c2rust_pipeline::providers::{Preprocessor, SymbolExtractor};
use c2rust_pipeline::transpile::{Symbol, SymbolKind};

/// Extractor returning a fixed symbol list whatever the source
#[derive(Debug, Clone, Default)]
pub struct FixedExtractor {
    symbols: Vec<Symbol>,
}

impl FixedExtractor {
    pub fn new(symbols: Vec<Symbol>) -> Self {
        Self { symbols }
    }

    /// One function per line `1..=count`, each named `f<line>`
    pub fn one_per_line(count: usize) -> Self {
        let symbols = (1..=count)
            .map(|line| Symbol::new(&format!("f{}", line), SymbolKind::Function, line, line))
            .collect();
        Self { symbols }
    }
}

impl SymbolExtractor for FixedExtractor {
    fn extract(&self, _normalized_source: &str) -> Result<Vec<Symbol>, ExtractionError> {
        Ok(self.symbols.clone())
    }
}

/// Preprocessor that always fails like a gcc run with a syntax error
#[derive(Debug, Clone, Default)]
pub struct BrokenPreprocessor;

#[async_trait]
impl Preprocessor for BrokenPreprocessor {
    async fn normalize(&self, _raw_source: &str, _include_paths: &[PathBuf]) -> Result<String, PreprocessError> {
        Err(PreprocessError::CommandFailed {
            command_line: "gcc -E -P -x c -".to_string(),
            exit_code: Some(1),
            stderr: "<stdin>:1:1: error: expected identifier".to_string(),
        })
    }
}
