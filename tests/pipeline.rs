//! Orchestrator tests against scripted in-process gateways.
//!
//! No network: every test injects a [`CompletionGateway`] through
//! `AnnotateConfig::builder().gateway(..)`.

use async_trait::async_trait;
use futures::StreamExt;
use manuscript_annotate::{
    annotate, annotate_batch, annotate_stream, annotate_to_file, AnnotateConfig, AnnotateError,
    AnnotateProgressCallback, CompletionError, CompletionGateway, GenerationParams, Message,
    PassPlan, Role, StepKind,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

// ── Test helpers ─────────────────────────────────────────────────────────────

/// Replies `<outN>` to the N-th call unless a reply was scripted, and fails
/// on one chosen call.
#[derive(Default)]
struct ScriptedGateway {
    calls: AtomicUsize,
    requests: Mutex<Vec<(Vec<Message>, GenerationParams)>>,
    replies: HashMap<usize, String>,
    fail_on: Option<(usize, CompletionError)>,
}

impl ScriptedGateway {
    fn new() -> Self {
        Self::default()
    }

    fn reply(mut self, call: usize, text: &str) -> Self {
        self.replies.insert(call, text.to_string());
        self
    }

    fn fail_on(mut self, call: usize, err: CompletionError) -> Self {
        self.fail_on = Some((call, err));
        self
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// User-message content of the N-th call (1-based).
    fn user_content(&self, call: usize) -> String {
        let requests = self.requests.lock().unwrap();
        let (messages, _) = &requests[call - 1];
        messages
            .iter()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.clone())
            .expect("user message present")
    }
}

#[async_trait]
impl CompletionGateway for ScriptedGateway {
    async fn complete(
        &self,
        messages: &[Message],
        params: &GenerationParams,
    ) -> Result<String, CompletionError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.requests
            .lock()
            .unwrap()
            .push((messages.to_vec(), params.clone()));

        if let Some((fail_call, ref err)) = self.fail_on {
            if fail_call == n {
                return Err(err.clone());
            }
        }
        Ok(self
            .replies
            .get(&n)
            .cloned()
            .unwrap_or_else(|| format!("<out{n}>")))
    }
}

/// Returns the user message unchanged.
#[derive(Default)]
struct EchoGateway {
    calls: AtomicUsize,
}

#[async_trait]
impl CompletionGateway for EchoGateway {
    async fn complete(
        &self,
        messages: &[Message],
        _params: &GenerationParams,
    ) -> Result<String, CompletionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        Ok(messages
            .iter()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.clone())
            .unwrap_or_default())
    }
}

#[derive(Default)]
struct RecordingProgress {
    labels: Mutex<Vec<String>>,
    errors: Mutex<Vec<(usize, String)>>,
    finished: Mutex<Option<(usize, usize)>>,
}

impl AnnotateProgressCallback for RecordingProgress {
    fn on_step_start(&self, label: &str, _step: usize, _total: usize) {
        self.labels.lock().unwrap().push(label.to_string());
    }

    fn on_step_error(&self, step: usize, _total: usize, pass: &str, _error: &str) {
        self.errors.lock().unwrap().push((step, pass.to_string()));
    }

    fn on_run_complete(&self, total_steps: usize, completed_steps: usize) {
        *self.finished.lock().unwrap() = Some((total_steps, completed_steps));
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new("manuscript_annotate=debug"))
        .with_test_writer()
        .try_init();
}

fn config_with(gateway: Arc<dyn CompletionGateway>) -> AnnotateConfig {
    AnnotateConfig::builder().gateway(gateway).build().unwrap()
}

const MANUSCRIPT: &str = "Walking by faith\n\nAs Paul wrote in Romans 8:28, all things work together.";

// ── Empty input ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn empty_input_makes_no_gateway_calls() {
    let gw = Arc::new(ScriptedGateway::new());
    let config = config_with(gw.clone());

    for text in ["", "   ", "\n\t  \n"] {
        let err = annotate(text, &config).await.unwrap_err();
        assert!(matches!(err, AnnotateError::EmptyInput), "got: {err:?}");
    }
    assert_eq!(gw.calls(), 0);
}

// ── Abort policy ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn failure_on_step_three_stops_the_run() {
    init_tracing();
    let gw = Arc::new(ScriptedGateway::new().fail_on(3, CompletionError::Failed("quota exceeded".into())));
    let progress = Arc::new(RecordingProgress::default());
    let config = AnnotateConfig::builder()
        .gateway(gw.clone())
        .progress_callback(progress.clone())
        .build()
        .unwrap();

    let err = annotate(MANUSCRIPT, &config).await.unwrap_err();

    assert_eq!(gw.calls(), 3);
    assert!(matches!(err, AnnotateError::GatewayFailure { .. }), "got: {err:?}");
    assert_eq!(err.step_index(), Some(3));
    assert_eq!(err.step_name(), Some("lists"));
    assert_eq!(err.step_message(), Some("quota exceeded"));
    assert!(err.to_string().contains("Step 3 of 9"), "got: {err}");

    assert_eq!(*progress.errors.lock().unwrap(), vec![(3, "lists".to_string())]);
    assert_eq!(*progress.finished.lock().unwrap(), Some((9, 2)));
    assert_eq!(progress.labels.lock().unwrap().len(), 3);
}

#[tokio::test]
async fn failure_in_reference_section_is_distinguishable() {
    // Step 9 is the 8th gateway call: step 7 is local.
    let gw = Arc::new(ScriptedGateway::new().fail_on(8, CompletionError::Failed("content policy".into())));
    let err = annotate(MANUSCRIPT, &config_with(gw.clone())).await.unwrap_err();

    assert_eq!(gw.calls(), 8);
    assert_eq!(err.step_index(), Some(9));
    assert_eq!(err.step_name(), Some("references"));
}

#[tokio::test]
async fn transport_errors_are_gateway_exceptions() {
    let gw = Arc::new(ScriptedGateway::new().fail_on(1, CompletionError::Timeout { secs: 60 }));
    let err = annotate(MANUSCRIPT, &config_with(gw.clone())).await.unwrap_err();

    assert_eq!(gw.calls(), 1);
    assert!(matches!(err, AnnotateError::GatewayException { step: 1, .. }), "got: {err:?}");
    assert_eq!(err.step_name(), Some("mark_unclear"));
    assert!(!err.is_user_error());
}

// ── Successful runs ──────────────────────────────────────────────────────────

#[tokio::test]
async fn reference_section_is_appended_after_one_newline() {
    init_tracing();
    let gw = Arc::new(ScriptedGateway::new());
    let output = annotate(MANUSCRIPT, &config_with(gw.clone())).await.unwrap();

    assert_eq!(gw.calls(), 8);
    // Step 8 (structure) is call 7, step 9 (references) is call 8.
    assert_eq!(output.document, "<out7>\n<out8>");
    assert!(output.document.ends_with("<out8>"));
    assert!(!output.document.contains("\n\n"));
    // The reference pass sees the structured document, not its own output.
    assert_eq!(gw.user_content(8), "<out7>");
}

#[tokio::test]
async fn each_pass_receives_previous_post_processed_output() {
    let gw = Arc::new(
        ScriptedGateway::new()
            .reply(1, "```html\n<p>one</p>\n```")
            .reply(2, "   <h1>two</h1>\n\n"),
    );
    annotate(MANUSCRIPT, &config_with(gw.clone())).await.unwrap();

    assert_eq!(gw.user_content(1), MANUSCRIPT);
    assert_eq!(gw.user_content(2), "<p>one</p>");
    assert_eq!(gw.user_content(3), "<h1>two</h1>");
    assert_eq!(gw.user_content(4), "<out3>");
}

#[tokio::test]
async fn markers_are_renumbered_before_structure_pass() {
    // Call 6 is the implicit-scripture pass; call 7 is the structure pass.
    let gw = Arc::new(ScriptedGateway::new().reply(6, "a[5] b[2] c[5]"));
    let output = annotate(MANUSCRIPT, &config_with(gw.clone())).await.unwrap();

    assert_eq!(gw.user_content(7), "a[1] b[2] c[3]");
    assert_eq!(output.stats.reference_markers, 3);
}

#[tokio::test]
async fn system_message_carries_the_pass_instruction() {
    let gw = Arc::new(ScriptedGateway::new());
    annotate(MANUSCRIPT, &config_with(gw.clone())).await.unwrap();

    let plan = PassPlan::builtin();
    let requests = gw.requests.lock().unwrap();
    let llm_passes: Vec<_> = plan
        .steps
        .iter()
        .filter_map(|s| match s {
            manuscript_annotate::Step::Llm(p) => Some(p),
            _ => None,
        })
        .collect();

    assert_eq!(requests.len(), llm_passes.len());
    for ((messages, params), pass) in requests.iter().zip(llm_passes) {
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[0].content, pass.instruction());
        assert_eq!(params, &pass.params);
    }
}

#[tokio::test]
async fn progress_labels_cover_every_step_in_order() {
    let progress = Arc::new(RecordingProgress::default());
    let config = AnnotateConfig::builder()
        .gateway(Arc::new(ScriptedGateway::new()))
        .progress_callback(progress.clone())
        .build()
        .unwrap();

    annotate(MANUSCRIPT, &config).await.unwrap();

    let labels = progress.labels.lock().unwrap();
    assert_eq!(labels.len(), 9);
    assert_eq!(labels[0], "Step 1 of 9: Marking unclear content");
    assert_eq!(labels[6], "Step 7 of 9: Renumbering reference markers");
    assert_eq!(labels[8], "Step 9 of 9: Building reference section");
    assert_eq!(*progress.finished.lock().unwrap(), Some((9, 9)));
}

#[tokio::test]
async fn trail_records_every_step_with_optional_snapshots() {
    let config = AnnotateConfig::builder()
        .gateway(Arc::new(ScriptedGateway::new()))
        .keep_snapshots(true)
        .build()
        .unwrap();

    let output = annotate(MANUSCRIPT, &config).await.unwrap();

    assert_eq!(output.steps.len(), 9);
    assert_eq!(output.stats.total_steps, 9);
    assert_eq!(output.stats.gateway_calls, 8);
    assert_eq!(output.steps[0].input_chars, MANUSCRIPT.len());
    assert_eq!(output.steps[6].kind, StepKind::Normalize);
    assert_eq!(output.steps[8].kind, StepKind::Append);
    assert_eq!(output.steps[1].snapshot.as_deref(), Some("<out2>"));
    assert_eq!(output.steps[8].snapshot.as_deref(), Some(output.document.as_str()));

    let plain = annotate(MANUSCRIPT, &config_with(Arc::new(ScriptedGateway::new())))
        .await
        .unwrap();
    assert!(plain.steps.iter().all(|s| s.snapshot.is_none()));
}

#[tokio::test]
async fn model_override_reaches_every_call() {
    let gw = Arc::new(ScriptedGateway::new());
    let config = AnnotateConfig::builder()
        .gateway(gw.clone())
        .model("local-llama")
        .build()
        .unwrap();

    annotate(MANUSCRIPT, &config).await.unwrap();

    let requests = gw.requests.lock().unwrap();
    assert!(requests.iter().all(|(_, p)| p.model == "local-llama"));
}

// ── Plans ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn custom_plan_from_toml_drives_the_run() {
    let plan = PassPlan::from_toml_str(
        r#"
version = "two-step"

[[steps]]
kind = "normalize_references"
name = "renumber"
description = "Renumbering"

[[steps]]
kind = "llm"
name = "bibliography"
description = "Bibliography"
task = "List the references."
output = "append"
"#,
    )
    .unwrap();

    let gw = Arc::new(ScriptedGateway::new().reply(1, "<ol></ol>"));
    let config = AnnotateConfig::builder().gateway(gw.clone()).plan(plan).build().unwrap();

    let output = annotate("x[9] y[9]", &config).await.unwrap();
    assert_eq!(gw.calls(), 1);
    assert_eq!(gw.user_content(1), "x[1] y[2]");
    assert_eq!(output.document, "x[1] y[2]\n<ol></ol>");
}

#[test]
fn builtin_plan_survives_toml_round_trip() {
    let plan = PassPlan::builtin();
    let text = plan.to_toml().unwrap();
    assert!(text.contains("kind = \"normalize_references\""), "got:\n{text}");
    let parsed = PassPlan::from_toml_str(&text).unwrap();
    assert_eq!(parsed, plan);
}

// ── Files and batches ────────────────────────────────────────────────────────

#[tokio::test]
async fn annotate_to_file_writes_the_final_document() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("sermon.txt");
    let output = dir.path().join("out/sermon.html");
    std::fs::write(&input, MANUSCRIPT).unwrap();

    let stats = annotate_to_file(
        input.to_str().unwrap(),
        &output,
        &config_with(Arc::new(ScriptedGateway::new())),
    )
    .await
    .unwrap();

    assert_eq!(std::fs::read_to_string(&output).unwrap(), "<out7>\n<out8>");
    assert_eq!(stats.input_chars, MANUSCRIPT.len());
}

#[tokio::test]
async fn failed_run_writes_no_file() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("sermon.txt");
    let output = dir.path().join("sermon.html");
    std::fs::write(&input, MANUSCRIPT).unwrap();

    let gw = Arc::new(ScriptedGateway::new().fail_on(5, CompletionError::Exception("reset".into())));
    let err = annotate_to_file(input.to_str().unwrap(), &output, &config_with(gw))
        .await
        .unwrap_err();

    assert_eq!(err.step_index(), Some(5));
    assert!(!output.exists());
}

#[tokio::test]
async fn batch_runs_are_isolated() {
    let gw = Arc::new(EchoGateway::default());
    let config = AnnotateConfig::builder()
        .gateway(gw.clone())
        .concurrency(3)
        .build()
        .unwrap();

    let texts = vec![
        "first manuscript".to_string(),
        "  ".to_string(),
        "second manuscript".to_string(),
        "third manuscript".to_string(),
    ];
    let results = annotate_batch(texts, &config).await.unwrap();

    assert_eq!(results.len(), 4);
    assert!(matches!(results[1], Err(AnnotateError::EmptyInput)));
    for (idx, name) in [(0, "first"), (2, "second"), (3, "third")] {
        let doc = &results[idx].as_ref().unwrap().document;
        let expected = format!("{name} manuscript\n{name} manuscript");
        assert_eq!(doc, &expected);
    }
    assert_eq!(gw.calls.load(Ordering::SeqCst), 3 * 8);
}

#[tokio::test]
async fn stream_reports_each_input_separately() {
    let dir = tempfile::tempdir().unwrap();
    let good = dir.path().join("good.txt");
    let empty = dir.path().join("empty.txt");
    let missing = dir.path().join("missing.txt");
    std::fs::write(&good, "grace and peace").unwrap();
    std::fs::write(&empty, "  \n").unwrap();

    let gw = Arc::new(EchoGateway::default());
    let config = AnnotateConfig::builder()
        .gateway(gw.clone())
        .concurrency(2)
        .build()
        .unwrap();

    let inputs: Vec<String> = [&good, &missing, &empty]
        .iter()
        .map(|p| p.to_str().unwrap().to_string())
        .collect();
    let mut items: Vec<_> = annotate_stream(inputs.clone(), &config)
        .await
        .unwrap()
        .collect()
        .await;
    items.sort_by_key(|item| item.index);

    assert_eq!(items.len(), 3);
    for (i, item) in items.iter().enumerate() {
        assert_eq!(item.index, i);
        assert_eq!(item.source, inputs[i]);
    }
    assert_eq!(
        items[0].result.as_ref().unwrap().document,
        "grace and peace\ngrace and peace"
    );
    assert!(
        matches!(items[1].result, Err(AnnotateError::FileNotFound { .. })),
        "got: {:?}",
        items[1].result
    );
    assert!(matches!(items[2].result, Err(AnnotateError::EmptyInput)));
    assert_eq!(gw.calls.load(Ordering::SeqCst), 8);
}

#[tokio::test]
async fn batch_of_only_empty_texts_needs_no_gateway() {
    // No gateway or provider configured at all.
    let results = annotate_batch(vec![String::new(), " ".into()], &AnnotateConfig::default())
        .await
        .unwrap();
    assert!(results.iter().all(|r| matches!(r, Err(AnnotateError::EmptyInput))));
}
