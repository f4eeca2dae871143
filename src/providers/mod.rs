/*!
 * Adapters to the external capabilities the pipeline depends on.
 *
 * The pipeline core only sees three traits:
 * - `Preprocessor`: raw source -> normalized source (gcc, passthrough)
 * - `SymbolExtractor`: normalized source -> ordered symbol list
 * - `Translator`: one segment's source -> translated text (Ollama, OpenAI-compatible, mock)
 *
 * Concrete backends can be swapped without touching the pipeline.
 */

use async_trait::async_trait;
use std::fmt::Debug;
use std::path::PathBuf;

use crate::errors::{ExtractionError, PreprocessError, TranslationError};
use crate::transpile::symbols::Symbol;

pub mod extractor;
pub mod mock;
pub mod ollama;
pub mod openai;
pub mod preprocessor;

pub use extractor::CDeclarationScanner;
pub use mock::MockTranslator;
pub use ollama::OllamaTranslator;
pub use openai::OpenAiTranslator;
pub use preprocessor::{GccPreprocessor, PassthroughPreprocessor};

/// Normalizes raw source text (macro expansion, include removal)
#[async_trait]
pub trait Preprocessor: Send + Sync + Debug {
    /// Produce the normalized source
    ///
    /// # Arguments
    /// * `raw_source` - Source text as submitted
    /// * `include_paths` - Extra include directories for the environment
    async fn normalize(&self, raw_source: &str, include_paths: &[PathBuf]) -> Result<String, PreprocessError>;
}

/// Extracts declarative symbols located inside the given source
pub trait SymbolExtractor: Send + Sync + Debug {
    /// Extract symbols in source order
    fn extract(&self, normalized_source: &str) -> Result<Vec<Symbol>, ExtractionError>;
}

/// Translates one segment of source text
#[async_trait]
pub trait Translator: Send + Sync + Debug {
    /// Translate a segment
    ///
    /// # Returns
    /// * `Result<String, TranslationError>` - Target-language text or a structured failure
    async fn translate(&self, segment_source: &str) -> Result<String, TranslationError>;

    /// Short backend name for logs
    fn name(&self) -> String;
}

/// Default prompt sent to LLM-backed translators
pub const DEFAULT_PROMPT_TEMPLATE: &str = "Translate the following C code to idiomatic, safe Rust. \
Reply with only the Rust code, no explanations. If the code cannot be translated, reply with a single line \
starting with `// Transpilation Error:` followed by the reason.\n\n{source}";

/// Markers that identify a diagnostic instead of code in translator output
pub fn default_diagnostic_markers() -> Vec<String> {
    vec!["// Transpilation Error:".to_string(), "// Translation Error:".to_string()]
}

/// Prompt and output handling shared by the LLM-backed translators
#[derive(Debug, Clone)]
pub struct PromptSettings {
    /// Prompt template containing `{source}`
    pub template: String,
    /// Sampling temperature
    pub temperature: f32,
    /// First-line prefixes that mark a diagnostic response
    pub diagnostic_markers: Vec<String>,
}

impl Default for PromptSettings {
    fn default() -> Self {
        Self {
            template: DEFAULT_PROMPT_TEMPLATE.to_string(),
            temperature: 0.2,
            diagnostic_markers: default_diagnostic_markers(),
        }
    }
}

/// Render a prompt template; `{source}` is replaced by the segment text
pub fn render_prompt(template: &str, segment_source: &str) -> String {
    template.replace("{source}", segment_source)
}

/// Turn raw translator output into a structured result.
///
/// Text-only backends report failures inline; any output whose first
/// non-blank line starts with one of `diagnostic_markers` is a failure.
/// Markdown code fences around the code are removed.
pub fn classify_output(output: &str, diagnostic_markers: &[String]) -> Result<String, TranslationError> {
    let trimmed = output.trim();
    if trimmed.is_empty() {
        return Err(TranslationError::Empty);
    }

    let first_line = trimmed.lines().next().unwrap_or_default().trim();
    if let Some(marker) = diagnostic_markers
        .iter()
        .find(|m| !m.is_empty() && first_line.starts_with(m.as_str()))
    {
        let detail = first_line[marker.len()..].trim();
        return Err(TranslationError::Diagnostic(detail.to_string()));
    }

    let code = strip_code_fence(trimmed);
    if code.trim().is_empty() {
        return Err(TranslationError::Empty);
    }
    Ok(code)
}

fn strip_code_fence(text: &str) -> String {
    if !text.starts_with("```") {
        return text.to_string();
    }
    let mut lines: Vec<&str> = text.lines().skip(1).collect();
    if lines.last().is_some_and(|l| l.trim_start().starts_with("```")) {
        lines.pop();
    }
    let mut code = lines.join("\n");
    code.push('\n');
    code
}
