//! Result types returned by a successful run.

use serde::{Deserialize, Serialize};

/// The annotated document plus the ordered trail of steps that produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnnotateOutput {
    /// Final HTML document, reference section last.
    pub document: String,
    /// One record per step, in execution order.
    pub steps: Vec<StepRecord>,
    pub stats: AnnotateStats,
}

/// What kind of work a step did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    /// Gateway-backed pass whose output replaced the document.
    Transform,
    /// Gateway-backed pass whose output was appended to the document.
    Append,
    /// Local reference renumbering.
    Normalize,
}

/// Diagnostics for one step of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    /// 1-based position in the plan.
    pub step: usize,
    pub name: String,
    /// `"Step k of N: <description>"`.
    pub label: String,
    pub kind: StepKind,
    pub input_chars: usize,
    pub output_chars: usize,
    pub duration_ms: u64,
    /// Copy of the document after this step, when snapshots are enabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<String>,
}

/// Aggregate statistics for a run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnnotateStats {
    pub total_steps: usize,
    pub gateway_calls: usize,
    /// Markers renumbered by the normalisation step(s).
    pub reference_markers: usize,
    pub input_chars: usize,
    pub output_chars: usize,
    pub total_duration_ms: u64,
}
