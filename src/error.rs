//! Error types for the manuscript-annotate library.
//!
//! Two layers of failure exist:
//!
//! * [`CompletionError`] — what a [`crate::pipeline::gateway::CompletionGateway`]
//!   reports for one call. It knows nothing about passes or steps.
//!
//! * [`AnnotateError`] — **Fatal** for a submission. Every gateway-backed step
//!   that fails is surfaced here with the step index and pass name attached, so
//!   callers can tell a failure in scripture tagging from a failure in
//!   reference-section synthesis. No partial document is ever returned
//!   alongside it.
//!
//! [`PassFailure`] sits between the two: the Pass Executor only knows its pass
//! name, and the orchestrator adds the position in the plan.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the manuscript-annotate library.
#[derive(Debug, Error)]
pub enum AnnotateError {
    // ── Submission errors ─────────────────────────────────────────────────
    /// The submitted document was empty or whitespace-only. No pass ran.
    #[error("No input: the submitted document is empty")]
    EmptyInput,

    // ── Pass errors ───────────────────────────────────────────────────────
    /// The gateway reported an unsuccessful completion (quota, malformed
    /// request, content policy rejection, …).
    #[error("Step {step} of {total} ({pass}) failed: {message}")]
    GatewayFailure {
        step: usize,
        total: usize,
        pass: String,
        message: String,
    },

    /// The gateway call raised a transport-level or unexpected error,
    /// including a per-call timeout enforced by the adapter.
    #[error("Step {step} of {total} ({pass}) raised an exception: {message}")]
    GatewayException {
        step: usize,
        total: usize,
        pass: String,
        message: String,
    },

    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Manuscript not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The file exists but could not be read as UTF-8 text.
    #[error("Failed to read '{path}': {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The input string is not usable as a file path, `-`, or URL.
    #[error("Invalid input '{input}': not a file path, '-', or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    // ── Provider errors ───────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// A pass plan failed validation or could not be parsed.
    #[error("Invalid pass plan: {0}")]
    InvalidPlan(String),

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AnnotateError {
    /// Attach the step position to a failure reported by the Pass Executor.
    pub fn from_pass_failure(step: usize, total: usize, failure: PassFailure) -> Self {
        let PassFailure { pass, cause } = failure;
        match cause {
            CompletionError::Failed(message) => AnnotateError::GatewayFailure {
                step,
                total,
                pass,
                message,
            },
            other => AnnotateError::GatewayException {
                step,
                total,
                pass,
                message: other.to_string(),
            },
        }
    }

    /// Name of the pass that failed, when the failure came from a step.
    pub fn step_name(&self) -> Option<&str> {
        match self {
            AnnotateError::GatewayFailure { pass, .. }
            | AnnotateError::GatewayException { pass, .. } => Some(pass),
            _ => None,
        }
    }

    /// 1-based index of the step that failed, when the failure came from a step.
    pub fn step_index(&self) -> Option<usize> {
        match self {
            AnnotateError::GatewayFailure { step, .. }
            | AnnotateError::GatewayException { step, .. } => Some(*step),
            _ => None,
        }
    }

    /// Upstream message for step failures.
    pub fn step_message(&self) -> Option<&str> {
        match self {
            AnnotateError::GatewayFailure { message, .. }
            | AnnotateError::GatewayException { message, .. } => Some(message),
            _ => None,
        }
    }

    /// True when the caller supplied something unusable, as opposed to a
    /// provider or system fault.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            AnnotateError::EmptyInput
                | AnnotateError::FileNotFound { .. }
                | AnnotateError::PermissionDenied { .. }
                | AnnotateError::InvalidInput { .. }
                | AnnotateError::InvalidPlan(_)
                | AnnotateError::InvalidConfig(_)
        )
    }
}

/// Outcome of a single unsuccessful gateway call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CompletionError {
    /// The provider answered, but with an unsuccessful result.
    #[error("{0}")]
    Failed(String),

    /// Transport-level or otherwise unexpected error.
    #[error("{0}")]
    Exception(String),

    /// The adapter's per-call deadline elapsed.
    #[error("completion timed out after {secs}s")]
    Timeout { secs: u64 },
}

/// A failed pass, as reported by the Pass Executor.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("pass '{pass}' failed: {cause}")]
pub struct PassFailure {
    pub pass: String,
    #[source]
    pub cause: CompletionError,
}
