//! CLI binary for manuscript-annotate.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `AnnotateConfig` and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use futures::StreamExt;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use manuscript_annotate::pipeline::input::{unique_stems, InputSource};
use manuscript_annotate::{
    annotate_input, annotate_stream, AnnotateConfig, AnnotateError, AnnotateOutput,
    AnnotateProgressCallback, PassPlan, ProgressCallback,
};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: one bar across the steps of a single run,
/// with a log line per finished step.
struct CliProgressCallback {
    bar: ProgressBar,
    step_started: Mutex<Option<Instant>>,
}

impl CliProgressCallback {
    /// The bar stays hidden until a run starts, so a run that fails while
    /// reading input or resolving the provider leaves nothing on screen.
    fn new() -> Arc<Self> {
        let bar = ProgressBar::hidden();

        Arc::new(Self {
            bar,
            step_started: Mutex::new(None),
        })
    }

    fn elapsed_secs(&self) -> f64 {
        self.step_started
            .lock()
            .ok()
            .and_then(|mut t| t.take())
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl AnnotateProgressCallback for CliProgressCallback {
    fn on_run_start(&self, total_steps: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>2}/{len} steps  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_draw_target(ProgressDrawTarget::stderr());
        self.bar.set_length(total_steps as u64);
        self.bar.set_style(style);
        self.bar.set_prefix("Annotating");
        self.bar.enable_steady_tick(Duration::from_millis(80));
    }

    fn on_step_start(&self, label: &str, _step: usize, _total: usize) {
        if let Ok(mut t) = self.step_started.lock() {
            *t = Some(Instant::now());
        }
        self.bar.set_message(label.to_string());
    }

    fn on_step_complete(&self, step: usize, total: usize, output_len: usize) {
        let secs = self.elapsed_secs();
        self.bar.println(format!(
            "  {} Step {:>2}/{:<2}  {:<14}  {}",
            green("✓"),
            step,
            total,
            dim(&format!("{output_len:>7} chars")),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_step_error(&self, step: usize, total: usize, pass: &str, error: &str) {
        let secs = self.elapsed_secs();
        let msg: String = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "  {} Step {:>2}/{:<2}  {}  {}  {}",
            red("✗"),
            step,
            total,
            bold(pass),
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
    }

    fn on_run_complete(&self, total_steps: usize, completed_steps: usize) {
        self.bar.finish_and_clear();
        if completed_steps == total_steps {
            eprintln!("{} {} steps completed", green("✔"), bold(&total_steps.to_string()));
        } else {
            eprintln!(
                "{} stopped after {}/{} steps",
                red("✘"),
                completed_steps,
                total_steps
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Annotate a manuscript (HTML to stdout)
  annotate sermon.txt

  # Write to a file
  annotate sermon.txt -o sermon.html

  # Read from stdin
  cat notes.txt | annotate - > notes.html

  # Several manuscripts, four at a time
  annotate --out-dir html/ --concurrency 4 notes/*.txt

  # Use one model for every pass
  annotate --provider anthropic --model claude-sonnet-4-20250514 sermon.txt

  # Inspect and customise the pass plan
  annotate --print-plan > plan.toml
  annotate --plan plan.toml sermon.txt

  # Full diagnostic trail as JSON
  annotate --json --snapshots sermon.txt > run.json

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID for every pass
  RUST_LOG                Log filter (overrides -v / -q)
"#;

/// Annotate plain-text study manuscripts into structured HTML.
#[derive(Parser, Debug)]
#[command(
    name = "annotate",
    version,
    about = "Annotate plain-text study manuscripts into structured HTML using a chain of LLM passes",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Manuscript file paths, HTTP/HTTPS URLs, or `-` for stdin.
    #[arg(required_unless_present = "print_plan")]
    inputs: Vec<String>,

    /// Write HTML to this file instead of stdout (single input only).
    #[arg(short, long, env = "ANNOTATE_OUTPUT", conflicts_with = "out_dir")]
    output: Option<PathBuf>,

    /// Write one `<stem>.html` per input into this directory.
    #[arg(long, env = "ANNOTATE_OUT_DIR")]
    out_dir: Option<PathBuf>,

    /// LLM model ID used for every pass (overrides the plan).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// TOML pass plan to use instead of the built-in one.
    #[arg(long, env = "ANNOTATE_PLAN")]
    plan: Option<PathBuf>,

    /// Print the active pass plan as TOML and exit.
    #[arg(long)]
    print_plan: bool,

    /// Per-call LLM timeout in seconds.
    #[arg(long, env = "ANNOTATE_API_TIMEOUT", default_value_t = 60)]
    api_timeout: u64,

    /// Transient retries inside one LLM call.
    #[arg(long, env = "ANNOTATE_MAX_RETRIES", default_value_t = 2)]
    max_retries: u32,

    /// Manuscripts processed at once when several inputs are given.
    #[arg(short, long, env = "ANNOTATE_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// HTTP download timeout in seconds for URL inputs.
    #[arg(long, env = "ANNOTATE_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Output structured JSON (AnnotateOutput) instead of HTML.
    #[arg(long, env = "ANNOTATE_JSON")]
    json: bool,

    /// Keep the document after every step in the JSON trail.
    #[arg(long)]
    snapshots: bool,

    /// Disable progress bar.
    #[arg(long, env = "ANNOTATE_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "ANNOTATE_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "ANNOTATE_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let batch = cli.inputs.len() > 1;

    // ── Logging setup ────────────────────────────────────────────────────
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !batch;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Plan ─────────────────────────────────────────────────────────────
    let plan = match cli.plan {
        Some(ref path) => PassPlan::load(path).context("Failed to load pass plan")?,
        None => PassPlan::builtin(),
    };

    if cli.print_plan {
        print!("{}", plan.to_toml().context("Failed to serialise pass plan")?);
        return Ok(());
    }

    if batch && cli.out_dir.is_none() {
        anyhow::bail!("Several inputs need --out-dir");
    }

    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn AnnotateProgressCallback>)
    } else {
        None
    };

    let config = build_config(&cli, plan, progress_cb)?;

    if batch {
        return run_batch(&cli, &config).await;
    }

    // ── Single manuscript ────────────────────────────────────────────────
    let input = &cli.inputs[0];
    let output = match annotate_input(input, &config).await {
        Ok(output) => output,
        Err(AnnotateError::EmptyInput) => {
            anyhow::bail!("'{input}' contains no text; nothing to annotate")
        }
        Err(e) => return Err(e).context("Annotation failed"),
    };

    let target = match (&cli.output, &cli.out_dir) {
        (Some(path), _) => Some(path.clone()),
        (None, Some(dir)) => Some(dir.join(format!("{}.html", InputSource::parse(input)?.stem()))),
        (None, None) => None,
    };

    match target {
        Some(path) => {
            write_output(&cli, &path, &output)?;
            if !cli.quiet {
                print_summary(&output, &path);
            }
        }
        None => {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            let body = render(&cli, &output)?;
            handle
                .write_all(body.as_bytes())
                .context("Failed to write to stdout")?;
            if !body.ends_with('\n') {
                handle.write_all(b"\n").ok();
            }
        }
    }

    Ok(())
}

/// Run several inputs concurrently, writing each into `--out-dir`.
async fn run_batch(cli: &Cli, config: &AnnotateConfig) -> Result<()> {
    let out_dir = cli
        .out_dir
        .as_ref()
        .context("Several inputs need --out-dir")?;
    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("Failed to create {}", out_dir.display()))?;

    let stems = unique_stems(&cli.inputs)?;
    let total = cli.inputs.len();
    let mut failed = 0usize;
    let mut results = annotate_stream(cli.inputs.clone(), config)
        .await
        .context("Annotation failed")?;

    while let Some(item) = results.next().await {
        match item.result {
            Ok(output) => {
                let path = out_dir.join(format!("{}.html", stems[item.index]));
                write_output(cli, &path, &output)?;
                if !cli.quiet {
                    eprintln!(
                        "  {} {}  →  {}  {}",
                        green("✓"),
                        item.source,
                        bold(&path.display().to_string()),
                        dim(&format!("{}ms", output.stats.total_duration_ms)),
                    );
                }
            }
            Err(e) => {
                failed += 1;
                eprintln!("  {} {}  {}", red("✗"), item.source, red(&e.to_string()));
            }
        }
    }

    if !cli.quiet {
        eprintln!(
            "{} {}/{} manuscripts annotated",
            if failed == 0 { green("✔") } else { cyan("⚠") },
            total - failed,
            total
        );
    }

    if failed > 0 {
        anyhow::bail!("{failed} of {total} manuscripts failed");
    }
    Ok(())
}

/// Map CLI args to `AnnotateConfig`.
fn build_config(cli: &Cli, plan: PassPlan, progress: Option<ProgressCallback>) -> Result<AnnotateConfig> {
    let mut builder = AnnotateConfig::builder()
        .plan(plan)
        .api_timeout_secs(cli.api_timeout)
        .max_retries(cli.max_retries)
        .concurrency(cli.concurrency)
        .download_timeout_secs(cli.download_timeout)
        .keep_snapshots(cli.snapshots);

    if let Some(ref model) = cli.model {
        builder = builder.model(model.clone());
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

fn render(cli: &Cli, output: &AnnotateOutput) -> Result<String> {
    if cli.json {
        serde_json::to_string_pretty(output).context("Failed to serialise output")
    } else {
        Ok(output.document.clone())
    }
}

fn write_output(cli: &Cli, path: &Path, output: &AnnotateOutput) -> Result<()> {
    let path = if cli.json {
        path.with_extension("json")
    } else {
        path.to_path_buf()
    };
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
    }
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, render(cli, output)?)
        .with_context(|| format!("Failed to write {}", tmp.display()))?;
    std::fs::rename(&tmp, &path).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

fn print_summary(output: &AnnotateOutput, path: &Path) {
    let stats = &output.stats;
    eprintln!(
        "{}  {} steps  {}ms  →  {}",
        green("✔"),
        stats.total_steps,
        stats.total_duration_ms,
        bold(&path.display().to_string()),
    );
    eprintln!(
        "   {} chars in  /  {} chars out  /  {} reference markers",
        dim(&stats.input_chars.to_string()),
        dim(&stats.output_chars.to_string()),
        dim(&stats.reference_markers.to_string()),
    );
}
