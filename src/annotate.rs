//! Pipeline Orchestrator and eager (whole-document) entry points.
//!
//! A run is a single fold over the plan: the document value goes in, each
//! step returns either the next document or an abort, and the first abort
//! ends the run. All per-run state lives in locals of [`run_plan`], so
//! concurrent submissions never share state.
//!
//! Use [`crate::stream::annotate_stream`] to process many manuscripts at once.

use crate::config::AnnotateConfig;
use crate::error::{AnnotateError, PassFailure};
use crate::output::{AnnotateOutput, AnnotateStats, StepKind, StepRecord};
use crate::passes::{OutputMode, Step};
use crate::pipeline::gateway::{CompletionGateway, LlmGateway};
use crate::pipeline::{executor, input, references};
use crate::progress::{step_label, AnnotateProgressCallback, NoopProgressCallback};
use edgequake_llm::ProviderFactory;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Result of one step inside the fold.
enum StepOutcome {
    Continue(String),
    Abort(PassFailure),
}

/// Annotate one manuscript.
///
/// This is the primary entry point for the library.
///
/// # Errors
/// - [`AnnotateError::EmptyInput`] when `text` is empty or whitespace-only;
///   no gateway is resolved and no pass runs.
/// - [`AnnotateError::GatewayFailure`] / [`AnnotateError::GatewayException`]
///   naming the first step that failed. Later steps never run.
/// - [`AnnotateError::ProviderNotConfigured`] when no gateway can be built.
pub async fn annotate(text: &str, config: &AnnotateConfig) -> Result<AnnotateOutput, AnnotateError> {
    if text.trim().is_empty() {
        info!("Empty input received; pipeline not started");
        return Err(AnnotateError::EmptyInput);
    }

    let gateway = resolve_gateway(config)?;
    run_plan(gateway.as_ref(), text, config).await
}

/// Read a manuscript from a path, `-` (stdin), or URL and annotate it.
pub async fn annotate_input(
    input_str: impl AsRef<str>,
    config: &AnnotateConfig,
) -> Result<AnnotateOutput, AnnotateError> {
    let input_str = input_str.as_ref();
    info!("Reading manuscript: {}", input_str);
    let text = input::resolve_input(input_str, config.download_timeout_secs).await?;
    annotate(&text, config).await
}

/// Annotate a manuscript and write the document directly to a file.
///
/// Uses atomic write (temp file + rename) so a failed run never leaves a
/// partial document behind.
pub async fn annotate_to_file(
    input_str: impl AsRef<str>,
    output_path: impl AsRef<Path>,
    config: &AnnotateConfig,
) -> Result<AnnotateStats, AnnotateError> {
    let output = annotate_input(input_str, config).await?;
    write_atomic(output_path.as_ref(), &output.document).await?;
    Ok(output.stats)
}

/// Synchronous wrapper around [`annotate`].
///
/// Creates a temporary tokio runtime internally.
pub fn annotate_sync(text: &str, config: &AnnotateConfig) -> Result<AnnotateOutput, AnnotateError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| AnnotateError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(annotate(text, config))
}

/// Run every step of `config.plan` against `text`.
///
/// Callers are expected to have rejected empty input already.
pub(crate) async fn run_plan(
    gateway: &dyn CompletionGateway,
    text: &str,
    config: &AnnotateConfig,
) -> Result<AnnotateOutput, AnnotateError> {
    let run_start = Instant::now();
    let steps = &config.plan.steps;
    let total = steps.len();
    let progress: &dyn AnnotateProgressCallback = config
        .progress_callback
        .as_deref()
        .unwrap_or(&NoopProgressCallback);
    let model_override = config.model.as_deref();

    info!(
        "Starting annotation: {} chars, plan '{}' with {} steps",
        text.len(),
        config.plan.version,
        total
    );
    progress.on_run_start(total);

    let mut document = text.to_string();
    let mut records: Vec<StepRecord> = Vec::with_capacity(total);
    let mut stats = AnnotateStats {
        total_steps: total,
        input_chars: text.len(),
        ..AnnotateStats::default()
    };

    for (idx, step) in steps.iter().enumerate() {
        let step_num = idx + 1;
        let label = step_label(step_num, total, step.description());
        info!("{}", label);
        progress.on_step_start(&label, step_num, total);

        let started = Instant::now();
        let input_chars = document.len();
        if !step.is_local() {
            stats.gateway_calls += 1;
        }

        match run_step(gateway, step, &document, model_override).await {
            StepOutcome::Continue(next) => {
                let kind = step_kind(step);
                if kind == StepKind::Normalize {
                    stats.reference_markers += references::count_markers(&next);
                }
                document = next;

                let duration_ms = started.elapsed().as_millis() as u64;
                debug!(
                    "{} done: {} → {} chars in {}ms",
                    step.name(),
                    input_chars,
                    document.len(),
                    duration_ms
                );
                progress.on_step_complete(step_num, total, document.len());
                records.push(StepRecord {
                    step: step_num,
                    name: step.name().to_string(),
                    label,
                    kind,
                    input_chars,
                    output_chars: document.len(),
                    duration_ms,
                    snapshot: config.keep_snapshots.then(|| document.clone()),
                });
            }
            StepOutcome::Abort(failure) => {
                let err = AnnotateError::from_pass_failure(step_num, total, failure);
                warn!("Annotation aborted: {}", err);
                progress.on_step_error(
                    step_num,
                    total,
                    step.name(),
                    err.step_message().unwrap_or_default(),
                );
                progress.on_run_complete(total, idx);
                return Err(err);
            }
        }
    }

    stats.output_chars = document.len();
    stats.total_duration_ms = run_start.elapsed().as_millis() as u64;
    info!(
        "Annotation complete: {} steps, {} gateway calls, {}ms total",
        total, stats.gateway_calls, stats.total_duration_ms
    );
    progress.on_run_complete(total, total);

    Ok(AnnotateOutput {
        document,
        steps: records,
        stats,
    })
}

async fn run_step(
    gateway: &dyn CompletionGateway,
    step: &Step,
    document: &str,
    model_override: Option<&str>,
) -> StepOutcome {
    match step {
        Step::NormalizeReferences { .. } => StepOutcome::Continue(references::normalize(document)),
        Step::Llm(pass) => match executor::execute_pass(gateway, pass, document, model_override).await {
            Ok(out) => match pass.output {
                OutputMode::Replace => StepOutcome::Continue(out),
                OutputMode::Append => StepOutcome::Continue(format!("{document}\n{out}")),
            },
            Err(failure) => StepOutcome::Abort(failure),
        },
    }
}

fn step_kind(step: &Step) -> StepKind {
    match step {
        Step::NormalizeReferences { .. } => StepKind::Normalize,
        Step::Llm(pass) => match pass.output {
            OutputMode::Replace => StepKind::Transform,
            OutputMode::Append => StepKind::Append,
        },
    }
}

pub(crate) async fn write_atomic(path: &Path, contents: &str) -> Result<(), AnnotateError> {
    let write_err = |e: std::io::Error| AnnotateError::OutputWriteFailed {
        path: path.to_path_buf(),
        source: e,
    };

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
        }
    }

    let tmp_path = path.with_extension("html.tmp");
    tokio::fs::write(&tmp_path, contents).await.map_err(write_err)?;
    tokio::fs::rename(&tmp_path, path).await.map_err(write_err)?;
    Ok(())
}

// ── Gateway resolution ───────────────────────────────────────────────────

/// Resolve the completion gateway, from most-specific to least-specific.
///
/// 1. **Pre-built gateway** (`config.gateway`) — used as-is.
/// 2. **Pre-built provider** (`config.provider`) — wrapped in [`LlmGateway`].
/// 3. **Named provider** (`config.provider_name`) — providers are created
///    per model id via [`ProviderFactory::create_llm_provider`].
/// 4. **`EDGEQUAKE_LLM_PROVIDER`** — same as 3, chosen by the environment.
/// 5. **`OPENAI_API_KEY`** present — OpenAI, even if other keys exist.
/// 6. **Full auto-detection** via [`ProviderFactory::from_env`].
///
/// Named providers are created for the first pass's model up front so a
/// missing API key is reported before any pass runs.
pub fn resolve_gateway(config: &AnnotateConfig) -> Result<Arc<dyn CompletionGateway>, AnnotateError> {
    if let Some(ref gateway) = config.gateway {
        return Ok(Arc::clone(gateway));
    }

    let adapter = if let Some(ref provider) = config.provider {
        LlmGateway::with_provider(Arc::clone(provider))
    } else if let Some(name) = provider_name_from(config) {
        let gateway = LlmGateway::named(name.clone());
        if let Some(model) = first_model(config) {
            gateway
                .preload(model)
                .map_err(|e| AnnotateError::ProviderNotConfigured {
                    provider: name,
                    hint: e.to_string(),
                })?;
        }
        gateway
    } else {
        let (llm_provider, _embedding) =
            ProviderFactory::from_env().map_err(|e| AnnotateError::ProviderNotConfigured {
                provider: "auto".to_string(),
                hint: format!(
                    "No LLM provider could be auto-detected from environment.\n\
                    Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or configure a provider.\n\
                    Error: {}",
                    e
                ),
            })?;
        LlmGateway::with_provider(llm_provider)
    };

    Ok(Arc::new(
        adapter
            .call_timeout(config.api_timeout_secs)
            .max_retries(config.max_retries)
            .retry_backoff_ms(config.retry_backoff_ms),
    ))
}

fn provider_name_from(config: &AnnotateConfig) -> Option<String> {
    if let Some(ref name) = config.provider_name {
        return Some(name.clone());
    }
    if let Ok(name) = std::env::var("EDGEQUAKE_LLM_PROVIDER") {
        if !name.is_empty() {
            return Some(name);
        }
    }
    if let Ok(key) = std::env::var("OPENAI_API_KEY") {
        if !key.is_empty() {
            return Some("openai".to_string());
        }
    }
    None
}

fn first_model(config: &AnnotateConfig) -> Option<&str> {
    config.model.as_deref().or_else(|| {
        config.plan.steps.iter().find_map(|step| match step {
            Step::Llm(pass) => Some(pass.params.model.as_str()),
            Step::NormalizeReferences { .. } => None,
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::passes::{PassDefinition, PassPlan};

    #[test]
    fn step_kinds_follow_output_mode() {
        let plan = PassPlan::builtin();
        let kinds: Vec<StepKind> = plan.steps.iter().map(step_kind).collect();
        assert_eq!(kinds[0], StepKind::Transform);
        assert_eq!(kinds[6], StepKind::Normalize);
        assert_eq!(kinds[8], StepKind::Append);
    }

    #[test]
    fn first_model_prefers_override() {
        let config = AnnotateConfig::builder().model("gpt-4.1").build().unwrap();
        assert_eq!(first_model(&config), Some("gpt-4.1"));
    }

    #[test]
    fn first_model_skips_local_steps() {
        let plan = PassPlan {
            version: "t".into(),
            steps: vec![
                Step::NormalizeReferences {
                    name: "n".into(),
                    description: "n".into(),
                },
                Step::Llm(PassDefinition::new("p", "p", "task")),
            ],
        };
        let config = AnnotateConfig::builder().plan(plan).build().unwrap();
        assert_eq!(first_model(&config), Some("gpt-4.1-mini"));
    }

    #[test]
    fn empty_input_never_resolves_a_gateway() {
        // No gateway or provider configured: resolution would fail, so an
        // EmptyInput result proves the check runs first.
        let config = AnnotateConfig::default();
        let err = annotate_sync("   \n\t", &config).unwrap_err();
        assert!(matches!(err, AnnotateError::EmptyInput));
    }

    #[tokio::test]
    async fn write_atomic_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/out.html");
        write_atomic(&path, "<p>x</p>").await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "<p>x</p>");
        assert!(!path.with_extension("html.tmp").exists());
    }
}
