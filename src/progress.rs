//! Progress-callback trait for per-step pipeline events.
//!
//! Inject an [`Arc<dyn AnnotateProgressCallback>`] via
//! [`crate::config::AnnotateConfigBuilder::progress_callback`] to receive
//! events as the orchestrator works through the plan. The orchestrator never
//! knows how progress is surfaced: a terminal bar or a channel feeding a web
//! page that polls "Step k of N" are both just implementations.
//!
//! # Example
//!
//! ```rust
//! use manuscript_annotate::{AnnotateConfig, AnnotateProgressCallback};
//! use std::sync::Arc;
//!
//! struct PrintLabels;
//!
//! impl AnnotateProgressCallback for PrintLabels {
//!     fn on_step_start(&self, label: &str, _step: usize, _total: usize) {
//!         eprintln!("{label}");
//!     }
//! }
//!
//! let config = AnnotateConfig::builder()
//!     .progress_callback(Arc::new(PrintLabels) as Arc<dyn AnnotateProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the orchestrator as it runs each step.
///
/// Implementations must be `Send + Sync`: batch runs share one callback across
/// concurrently running submissions. Steps of a *single* submission are never
/// reported concurrently. All methods default to no-ops.
pub trait AnnotateProgressCallback: Send + Sync {
    /// Called once, after the input passed the empty check.
    fn on_run_start(&self, total_steps: usize) {
        let _ = total_steps;
    }

    /// Called before a step runs. `label` is `"Step k of N: <description>"`.
    fn on_step_start(&self, label: &str, step: usize, total_steps: usize) {
        let _ = (label, step, total_steps);
    }

    /// Called after a step succeeded.
    ///
    /// * `output_len` — byte length of the document after the step
    fn on_step_complete(&self, step: usize, total_steps: usize, output_len: usize) {
        let _ = (step, total_steps, output_len);
    }

    /// Called when a step failed. No later step will run.
    fn on_step_error(&self, step: usize, total_steps: usize, pass: &str, error: &str) {
        let _ = (step, total_steps, pass, error);
    }

    /// Called once when the run finished.
    ///
    /// * `completed_steps` — equals `total_steps` only on success
    fn on_run_complete(&self, total_steps: usize, completed_steps: usize) {
        let _ = (total_steps, completed_steps);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl AnnotateProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::AnnotateConfig`].
pub type ProgressCallback = Arc<dyn AnnotateProgressCallback>;

/// Format the human-readable label for a step.
pub fn step_label(step: usize, total_steps: usize, description: &str) -> String {
    format!("Step {step} of {total_steps}: {description}")
}
