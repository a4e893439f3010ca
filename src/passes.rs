//! Pass definitions and the ordered plan the orchestrator folds over.
//!
//! A [`PassPlan`] is data, not code: the built-in plan is the latest nine-step
//! configuration, and alternative plans (new prompt revisions, different
//! models) can be loaded from TOML without touching the orchestrator.
//!
//! ```toml
//! version = "custom-1"
//!
//! [[steps]]
//! kind = "llm"
//! name = "titles"
//! description = "Formatting titles and headers"
//! task = "STAGE: TITLES AND HEADERS ..."
//!
//! [steps.params]
//! model = "gpt-4.1-mini"
//! max_tokens = 16384
//! temperature = 0.2
//!
//! [[steps]]
//! kind = "normalize_references"
//! name = "normalize_references"
//! description = "Renumbering reference markers"
//! ```

use crate::error::AnnotateError;
use crate::pipeline::gateway::GenerationParams;
use crate::prompts;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Post-processing applied to a successful completion.
///
/// Whitespace is always trimmed; `StripFences` additionally removes literal
/// ```` ```html ```` and ```` ``` ```` markers wherever they occur.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostProcess {
    Trim,
    #[default]
    StripFences,
}

/// How a pass's output combines with the document it was given.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputMode {
    /// The output becomes the document.
    #[default]
    Replace,
    /// The output is a trailing block: `document + "\n" + output`.
    Append,
}

/// One gateway-backed pass. Immutable for the lifetime of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassDefinition {
    pub name: String,
    /// Short human-readable description used in progress labels.
    pub description: String,
    /// Task text appended to the shared preamble.
    pub task: String,
    #[serde(default)]
    pub post_process: PostProcess,
    #[serde(default)]
    pub output: OutputMode,
    #[serde(default)]
    pub params: GenerationParams,
}

impl PassDefinition {
    pub fn new(name: impl Into<String>, description: impl Into<String>, task: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            task: task.into(),
            post_process: PostProcess::default(),
            output: OutputMode::default(),
            params: GenerationParams::default(),
        }
    }

    pub fn post_process(mut self, rule: PostProcess) -> Self {
        self.post_process = rule;
        self
    }

    pub fn output(mut self, mode: OutputMode) -> Self {
        self.output = mode;
        self
    }

    pub fn params(mut self, params: GenerationParams) -> Self {
        self.params = params;
        self
    }

    /// The system-role instruction sent for this pass.
    pub fn instruction(&self) -> String {
        prompts::build_instruction(&self.task)
    }
}

/// One entry in a plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Step {
    /// A pass delegated to the completion gateway.
    Llm(PassDefinition),
    /// Local, synchronous renumbering of `[n]` markers.
    NormalizeReferences { name: String, description: String },
}

impl Step {
    pub fn name(&self) -> &str {
        match self {
            Step::Llm(pass) => &pass.name,
            Step::NormalizeReferences { name, .. } => name,
        }
    }

    pub fn description(&self) -> &str {
        match self {
            Step::Llm(pass) => &pass.description,
            Step::NormalizeReferences { description, .. } => description,
        }
    }

    /// True when the step never calls the gateway.
    pub fn is_local(&self) -> bool {
        matches!(self, Step::NormalizeReferences { .. })
    }
}

/// Ordered, versioned list of steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassPlan {
    pub version: String,
    pub steps: Vec<Step>,
}

impl Default for PassPlan {
    fn default() -> Self {
        Self::builtin()
    }
}

impl PassPlan {
    /// The latest and most complete nine-step configuration.
    pub fn builtin() -> Self {
        let structural = GenerationParams::default();
        let bibliography = GenerationParams {
            max_tokens: 4096,
            ..GenerationParams::default()
        };

        Self {
            version: "builtin-9".to_string(),
            steps: vec![
                Step::Llm(
                    PassDefinition::new("mark_unclear", "Marking unclear content", prompts::TASK_MARK_UNCLEAR)
                        .post_process(PostProcess::Trim)
                        .params(structural.clone()),
                ),
                Step::Llm(
                    PassDefinition::new("titles", "Formatting titles and headers", prompts::TASK_TITLES)
                        .params(structural.clone()),
                ),
                Step::Llm(
                    PassDefinition::new("lists", "Formatting lists", prompts::TASK_LISTS)
                        .params(structural.clone()),
                ),
                Step::Llm(
                    PassDefinition::new("quotes", "Formatting quotes", prompts::TASK_QUOTES)
                        .params(structural.clone()),
                ),
                Step::Llm(
                    PassDefinition::new(
                        "explicit_scripture",
                        "Tagging explicit scripture references",
                        prompts::TASK_EXPLICIT_SCRIPTURE,
                    )
                    .params(structural.clone()),
                ),
                Step::Llm(
                    PassDefinition::new(
                        "implicit_scripture",
                        "Resolving implicit scripture references",
                        prompts::TASK_IMPLICIT_SCRIPTURE,
                    )
                    .params(structural.clone()),
                ),
                Step::NormalizeReferences {
                    name: "normalize_references".to_string(),
                    description: "Renumbering reference markers".to_string(),
                },
                Step::Llm(
                    PassDefinition::new("structure", "Formatting paragraphs and structure", prompts::TASK_STRUCTURE)
                        .params(structural),
                ),
                Step::Llm(
                    PassDefinition::new("references", "Building reference section", prompts::TASK_REFERENCES)
                        .output(OutputMode::Append)
                        .params(bibliography),
                ),
            ],
        }
    }

    /// Parse and validate a TOML plan.
    pub fn from_toml_str(s: &str) -> Result<Self, AnnotateError> {
        let plan: PassPlan =
            toml::from_str(s).map_err(|e| AnnotateError::InvalidPlan(e.to_string()))?;
        plan.validate()?;
        Ok(plan)
    }

    /// Read, parse, and validate a TOML plan file.
    pub fn load(path: &Path) -> Result<Self, AnnotateError> {
        let text = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => AnnotateError::FileNotFound {
                path: path.to_path_buf(),
            },
            _ => AnnotateError::ReadFailed {
                path: path.to_path_buf(),
                source: e,
            },
        })?;
        Self::from_toml_str(&text).map_err(|e| match e {
            AnnotateError::InvalidPlan(msg) => {
                AnnotateError::InvalidPlan(format!("{}: {msg}", path.display()))
            }
            other => other,
        })
    }

    /// Serialise the plan as TOML.
    pub fn to_toml(&self) -> Result<String, AnnotateError> {
        toml::to_string_pretty(self).map_err(|e| AnnotateError::Internal(format!("plan serialisation: {e}")))
    }

    /// Number of steps that call the gateway.
    pub fn gateway_steps(&self) -> usize {
        self.steps.iter().filter(|s| !s.is_local()).count()
    }

    pub fn validate(&self) -> Result<(), AnnotateError> {
        if self.steps.is_empty() {
            return Err(AnnotateError::InvalidPlan("plan has no steps".into()));
        }

        let mut seen = HashSet::new();
        for step in &self.steps {
            let name = step.name();
            if name.trim().is_empty() {
                return Err(AnnotateError::InvalidPlan("step with empty name".into()));
            }
            if !seen.insert(name) {
                return Err(AnnotateError::InvalidPlan(format!("duplicate step name '{name}'")));
            }
            if let Step::Llm(pass) = step {
                validate_pass(pass)?;
            }
        }
        Ok(())
    }
}

fn validate_pass(pass: &PassDefinition) -> Result<(), AnnotateError> {
    let invalid = |what: String| AnnotateError::InvalidPlan(format!("step '{}': {what}", pass.name));
    let p = &pass.params;

    if pass.task.trim().is_empty() {
        return Err(invalid("task text is empty".into()));
    }
    if p.model.trim().is_empty() {
        return Err(invalid("model id is empty".into()));
    }
    if p.max_tokens == 0 {
        return Err(invalid("max_tokens must be > 0".into()));
    }
    if let Some(t) = p.temperature {
        if !(0.0..=2.0).contains(&t) {
            return Err(invalid(format!("temperature must be 0–2, got {t}")));
        }
    }
    if let Some(tp) = p.top_p {
        if !(0.0..=1.0).contains(&tp) {
            return Err(invalid(format!("top_p must be 0–1, got {tp}")));
        }
    }
    for (label, value) in [
        ("frequency_penalty", p.frequency_penalty),
        ("presence_penalty", p.presence_penalty),
    ] {
        if let Some(v) = value {
            if !(-2.0..=2.0).contains(&v) {
                return Err(invalid(format!("{label} must be -2–2, got {v}")));
            }
        }
    }
    Ok(())
}
