/*!
 * Error types for the c2rust-pipeline crate.
 *
 * Every stage of the pipeline has its own error type so that callers can tell
 * a fatal failure (preprocessing, extraction, dependency cycles) apart from a
 * recoverable one (an out-of-range segment, a single failed translation).
 * All of them use the thiserror crate for ergonomic definitions.
 */

use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

use crate::pipeline::stages::JobStage;

/// Errors that can occur when talking to a remote translation provider
#[derive(Error, Debug, Clone)]
pub enum ProviderError {
    /// Error when making an API request fails
    #[error("API request failed: {0}")]
    RequestFailed(String),

    /// Error when parsing an API response fails
    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    /// Error returned by the API itself
    #[error("API responded with error: {status_code} - {message}")]
    ApiError {
        /// HTTP status code
        status_code: u16,
        /// Error message from the API
        message: String,
    },

    /// Error establishing or maintaining a connection
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Error related to rate limiting
    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    /// Error with authentication
    #[error("Authentication error: {0}")]
    AuthenticationError(String),
}

impl ProviderError {
    /// Whether retrying the same request may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            Self::RequestFailed(_) | Self::ConnectionError(_) | Self::RateLimitExceeded(_) => true,
            Self::ApiError { status_code, .. } => *status_code == 429 || *status_code >= 500,
            Self::ParseError(_) | Self::AuthenticationError(_) => false,
        }
    }
}

/// Errors raised by the external preprocessing step
#[derive(Error, Debug, Clone)]
pub enum PreprocessError {
    /// No source text was provided
    #[error("Input source was empty")]
    EmptyInput,

    /// The preprocessor could not be started at all
    #[error("Failed to start preprocessor `{command_line}`: {reason}")]
    Spawn {
        /// Full command line that was attempted
        command_line: String,
        /// Reason reported by the operating system
        reason: String,
    },

    /// The preprocessor ran but reported a failure
    #[error("Preprocessing failed (exit code {exit_code:?}) running `{command_line}`: {stderr}")]
    CommandFailed {
        /// Full command line that was run
        command_line: String,
        /// Process exit code, if the process was not killed by a signal
        exit_code: Option<i32>,
        /// Captured standard error
        stderr: String,
    },

    /// Reading or writing the temporary files around the preprocessor failed
    #[error("Preprocessor I/O error on {path:?}: {reason}")]
    Io {
        /// File involved
        path: PathBuf,
        /// Underlying error message
        reason: String,
    },
}

/// Errors raised by the symbol extraction capability
#[derive(Error, Debug, Clone)]
pub enum ExtractionError {
    /// The normalized source could not be parsed
    #[error("Unparsable source at line {line}: {reason}")]
    Unparsable {
        /// 1-indexed line where parsing gave up
        line: usize,
        /// Human readable reason
        reason: String,
    },
}

/// The dependency graph is not a DAG
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Dependency graph contains a cycle between: {}", .participants.join(", "))]
pub struct CycleError {
    /// Names of the nodes taking part in at least one cycle
    pub participants: Vec<String>,
}

/// A symbol's line range does not fit inside the normalized source
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Skipping symbol `{symbol}`: lines {start_line}-{end_line} are outside 1-{line_count}")]
pub struct SegmentRangeError {
    /// Name of the skipped symbol
    pub symbol: String,
    /// Declared first line (1-indexed)
    pub start_line: usize,
    /// Declared last line (1-indexed, inclusive)
    pub end_line: usize,
    /// Number of lines in the source
    pub line_count: usize,
}

/// Errors for a single segment translation attempt
#[derive(Error, Debug, Clone)]
pub enum TranslationError {
    /// A failure that is worth retrying
    #[error("Transient translation failure: {0}")]
    Transient(String),

    /// The backend refused the request; retrying will not help
    #[error("Translation rejected: {0}")]
    Rejected(String),

    /// The backend returned text that is a diagnostic rather than code
    #[error("Translator returned a diagnostic: {0}")]
    Diagnostic(String),

    /// The backend returned nothing
    #[error("Translator returned an empty response")]
    Empty,

    /// The attempt did not finish in time
    #[error("Translation timed out after {0} seconds")]
    Timeout(u64),

    /// Error from the provider API
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),
}

impl TranslationError {
    /// Whether another attempt with the same input may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transient(_) | Self::Timeout(_) => true,
            Self::Provider(e) => e.is_transient(),
            Self::Rejected(_) | Self::Diagnostic(_) | Self::Empty => false,
        }
    }
}

/// Reading or writing a job artifact failed
#[derive(Error, Debug, Clone)]
#[error("Artifact I/O error on {path:?}: {source}")]
pub struct MergeIoError {
    /// Artifact path
    pub path: PathBuf,
    /// Underlying error
    #[source]
    pub source: Arc<std::io::Error>,
}

impl MergeIoError {
    pub fn new(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self { path: path.into(), source: Arc::new(source) }
    }
}

/// Umbrella error for a pipeline job
#[derive(Error, Debug, Clone)]
pub enum PipelineError {
    /// Preprocessing failed
    #[error("Preprocess error: {0}")]
    Preprocess(#[from] PreprocessError),

    /// Symbol extraction failed
    #[error("Extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    /// Dependency graph is cyclic
    #[error("{0}")]
    Cycle(#[from] CycleError),

    /// A segment failed under the strict failure policy
    #[error("Translation of segment {segment_id} failed: {reason}")]
    TranslationFailure {
        /// Segment whose translation failed
        segment_id: String,
        /// Last error message
        reason: String,
    },

    /// Artifact read/write failure
    #[error("{0}")]
    MergeIo(#[from] MergeIoError),

    /// The job was cancelled by the caller
    #[error("Pipeline cancelled")]
    Cancelled,

    /// Waiting for the job exceeded the caller's timeout
    #[error("Timed out after {0:?} waiting for job")]
    Timeout(std::time::Duration),

    /// The job id is not known to the job manager
    #[error("Unknown job: {0}")]
    UnknownJob(String),

    /// The job's result was already taken or its task vanished
    #[error("Job result unavailable: {0}")]
    ResultUnavailable(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Stages ran out of order or the job state machine was violated
    #[error("Internal pipeline error: {0}")]
    Internal(String),
}

impl PipelineError {
    /// Stage the job was in when this error ended it
    pub fn stage(&self) -> Option<JobStage> {
        match self {
            Self::Preprocess(_) => Some(JobStage::Normalizing),
            Self::Extraction(_) => Some(JobStage::Extracting),
            Self::Cycle(_) => Some(JobStage::GraphBuilding),
            Self::TranslationFailure { .. } => Some(JobStage::Translating),
            Self::MergeIo(_) => Some(JobStage::Merging),
            _ => None,
        }
    }

    /// Fatal errors abort the whole job
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Timeout(_))
    }
}

/// Main application error type used at the binary boundary
#[derive(Error, Debug)]
pub enum AppError {
    /// Error from a file operation
    #[error("File error: {0}")]
    File(String),

    /// Error from the pipeline
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// Error from a provider
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Any other error
    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        Self::Unknown(error.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(error: std::io::Error) -> Self {
        Self::File(error.to_string())
    }
}
