/*!
 * Source normalization adapters.
 *
 * `GccPreprocessor` shells out to the C preprocessor and reports failures as
 * structured errors carrying the command line, exit code and captured stderr.
 * `PassthroughPreprocessor` only drops `#include` lines and is used when no
 * compiler is available.
 */

use async_trait::async_trait;
use log::{debug, error, info};
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::errors::PreprocessError;

use super::Preprocessor;

/// `#include <...>` / `#include "..."` directives
static INCLUDE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?m)^[ \t]*#[ \t]*include[ \t]*[<"].*?[>"][ \t]*$"#).unwrap()
});

/// Macros that trip up freestanding preprocessing of glibc-style code
const NEUTRALIZING_FLAGS: &[&str] = &[
    "-D__attribute__(x)=",
    "-D__filename=",
    "-D__modes=",
    "-D__stream=",
    "-D__buf=",
    "-D__has_feature(x)=0",
];

/// Remove include directives, keeping the line so line numbers do not shift
pub fn strip_includes(source: &str) -> String {
    INCLUDE_REGEX.replace_all(source, "").to_string()
}

/// Runs `gcc -E` (or a compatible command) over the source
#[derive(Debug, Clone)]
pub struct GccPreprocessor {
    command: String,
    extra_flags: Vec<String>,
}

impl GccPreprocessor {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            extra_flags: Vec::new(),
        }
    }

    pub fn with_extra_flags(mut self, flags: Vec<String>) -> Self {
        self.extra_flags = flags;
        self
    }

    /// Arguments passed to the preprocessor, source read from stdin
    pub fn arguments(&self, include_paths: &[PathBuf]) -> Vec<String> {
        let mut args: Vec<String> = ["-E", "-std=c99", "-nostdinc", "-ffreestanding", "-dD"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        args.extend(NEUTRALIZING_FLAGS.iter().map(|s| s.to_string()));
        args.extend(self.extra_flags.iter().cloned());
        for path in include_paths {
            args.push(format!("-I{}", path.display()));
        }
        args.extend(["-x", "c", "-"].iter().map(|s| s.to_string()));
        args
    }
}

impl Default for GccPreprocessor {
    fn default() -> Self {
        Self::new("gcc")
    }
}

#[async_trait]
impl Preprocessor for GccPreprocessor {
    async fn normalize(&self, raw_source: &str, include_paths: &[PathBuf]) -> Result<String, PreprocessError> {
        if raw_source.trim().is_empty() {
            return Err(PreprocessError::EmptyInput);
        }

        let args = self.arguments(include_paths);
        let command_line = format!("{} {}", self.command, args.join(" "));
        info!("Running command: {}", command_line);

        let mut child = Command::new(&self.command)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| PreprocessError::Spawn {
                command_line: command_line.clone(),
                reason: e.to_string(),
            })?;

        // Feed stdin from a separate task so a full stdout pipe cannot deadlock us
        let input = strip_includes(raw_source);
        let writer = child.stdin.take().map(|mut stdin| {
            tokio::spawn(async move {
                let result = stdin.write_all(input.as_bytes()).await;
                drop(stdin);
                result
            })
        });

        let output = child.wait_with_output().await.map_err(|e| PreprocessError::Io {
            path: PathBuf::from(&self.command),
            reason: e.to_string(),
        })?;

        if let Some(writer) = writer {
            match writer.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => debug!("Preprocessor closed stdin early: {}", e),
                Err(e) => debug!("Preprocessor stdin writer did not finish: {}", e),
            }
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let stderr = if stderr.is_empty() { "No error output.".to_string() } else { stderr };
            error!("Preprocessing failed:\nCommand: {}\nError: {}", command_line, stderr);
            return Err(PreprocessError::CommandFailed {
                command_line,
                exit_code: output.status.code(),
                stderr,
            });
        }

        let normalized = String::from_utf8_lossy(&output.stdout).to_string();
        debug!("Preprocessor produced {} line(s)", normalized.lines().count());
        Ok(normalized)
    }
}

/// Drops include directives and otherwise returns the source unchanged
#[derive(Debug, Clone, Default)]
pub struct PassthroughPreprocessor;

#[async_trait]
impl Preprocessor for PassthroughPreprocessor {
    async fn normalize(&self, raw_source: &str, _include_paths: &[PathBuf]) -> Result<String, PreprocessError> {
        if raw_source.trim().is_empty() {
            return Err(PreprocessError::EmptyInput);
        }
        Ok(strip_includes(raw_source))
    }
}
