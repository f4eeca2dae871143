/*!
 * Mock translator for tests and dry runs.
 *
 * This module provides a scripted translator that simulates different behaviors:
 * - `MockTranslator::working()` - Always succeeds with a Rust stub for the segment
 * - `MockTranslator::failing()` - Always fails with a permanent error
 * - `MockTranslator::diagnostic()` - Returns a diagnostic line instead of code
 * - `MockTranslator::empty()` - Returns an empty response
 *
 * Working mocks can additionally fail segments containing given text,
 * fail the first N attempts per segment with a transient error, or sleep
 * before answering.
 */

use async_trait::async_trait;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use regex::Regex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::errors::{ProviderError, TranslationError};

use super::{classify_output, default_diagnostic_markers, Translator};

static RECORD_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(?:typedef\s+)?(struct|union)\s+([A-Za-z_]\w*)").unwrap()
});

static CALLABLE_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"([A-Za-z_]\w*)\s*\(").unwrap());

/// Behavior mode for the mock translator
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MockBehavior {
    /// Succeeds with a Rust stub derived from the segment
    Working,
    /// Always fails with a permanent error
    Failing,
    /// Returns a diagnostic line instead of code
    Diagnostic,
    /// Returns an empty response
    Empty,
}

/// Scripted translator
#[derive(Debug)]
pub struct MockTranslator {
    /// Behavior mode
    behavior: MockBehavior,
    /// Segments containing any of these strings fail permanently
    fail_matching: Vec<String>,
    /// Transient failures to produce per distinct segment before succeeding
    transient_failures: usize,
    /// Simulated latency
    delay: Option<Duration>,
    /// Custom response generator (optional)
    custom_response: Option<fn(&str) -> String>,
    /// Request counter
    request_count: Arc<AtomicUsize>,
    /// Attempts seen per segment text
    attempts: Arc<Mutex<HashMap<String, usize>>>,
}

impl MockTranslator {
    /// Create a new mock translator with the specified behavior
    pub fn new(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            fail_matching: Vec::new(),
            transient_failures: 0,
            delay: None,
            custom_response: None,
            request_count: Arc::new(AtomicUsize::new(0)),
            attempts: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Create a working mock translator that always succeeds
    pub fn working() -> Self {
        Self::new(MockBehavior::Working)
    }

    /// Create a mock translator that always fails
    pub fn failing() -> Self {
        Self::new(MockBehavior::Failing)
    }

    /// Create a mock translator answering with a diagnostic marker
    pub fn diagnostic() -> Self {
        Self::new(MockBehavior::Diagnostic)
    }

    /// Create a mock that returns empty responses
    pub fn empty() -> Self {
        Self::new(MockBehavior::Empty)
    }

    /// Fail permanently for any segment containing `needle`
    pub fn failing_on(mut self, needle: impl Into<String>) -> Self {
        self.fail_matching.push(needle.into());
        self
    }

    /// Fail the first `count` attempts of every segment with a transient error
    pub fn with_transient_failures(mut self, count: usize) -> Self {
        self.transient_failures = count;
        self
    }

    /// Sleep before every answer
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Set a custom response generator
    pub fn with_custom_response(mut self, generator: fn(&str) -> String) -> Self {
        self.custom_response = Some(generator);
        self
    }

    /// Total number of translate calls so far
    pub fn request_count(&self) -> usize {
        self.request_count.load(Ordering::SeqCst)
    }

    /// Rust stub for a C segment: a `#[repr(C)]` struct for records, a function otherwise
    pub fn stub_for(segment_source: &str) -> String {
        if let Some(caps) = RECORD_REGEX.captures(segment_source) {
            return format!("#[repr(C)]\npub struct {} {{\n}}\n", &caps[2]);
        }
        match CALLABLE_REGEX.captures(segment_source) {
            Some(caps) => format!(
                "use std::os::raw::c_int;\n\npub fn {}() -> c_int {{\n    0\n}}\n",
                &caps[1]
            ),
            None => "pub fn translated_fragment() {}\n".to_string(),
        }
    }
}

impl Clone for MockTranslator {
    fn clone(&self) -> Self {
        Self {
            behavior: self.behavior,
            fail_matching: self.fail_matching.clone(),
            transient_failures: self.transient_failures,
            delay: self.delay,
            custom_response: self.custom_response,
            request_count: Arc::clone(&self.request_count),
            attempts: Arc::clone(&self.attempts),
        }
    }
}

#[async_trait]
impl Translator for MockTranslator {
    async fn translate(&self, segment_source: &str) -> Result<String, TranslationError> {
        self.request_count.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let attempt = {
            let mut attempts = self.attempts.lock();
            let counter = attempts.entry(segment_source.to_string()).or_insert(0);
            *counter += 1;
            *counter
        };

        match self.behavior {
            MockBehavior::Working => {
                if let Some(needle) = self.fail_matching.iter().find(|n| segment_source.contains(n.as_str())) {
                    return Err(TranslationError::Rejected(format!("mock refuses segments containing `{}`", needle)));
                }
                if attempt <= self.transient_failures {
                    return Err(TranslationError::Provider(ProviderError::ApiError {
                        status_code: 503,
                        message: format!("Simulated transient failure (attempt {})", attempt),
                    }));
                }

                let text = match self.custom_response {
                    Some(generator) => generator(segment_source),
                    None => Self::stub_for(segment_source),
                };
                classify_output(&text, &default_diagnostic_markers())
            }

            MockBehavior::Failing => Err(TranslationError::Provider(ProviderError::ApiError {
                status_code: 400,
                message: "Simulated API failure".to_string(),
            })),

            MockBehavior::Diagnostic => classify_output(
                "// Transpilation Error: unsupported construct\n",
                &default_diagnostic_markers(),
            ),

            MockBehavior::Empty => classify_output("", &default_diagnostic_markers()),
        }
    }

    fn name(&self) -> String {
        "mock".to_string()
    }
}
