//! # manuscript-annotate
//!
//! Turn plain-text religious-study manuscripts into structured HTML by
//! running them through an ordered chain of LLM passes.
//!
//! ## Why a chain of passes?
//!
//! Asking one model call to find titles, lists, quotes, scripture citations,
//! implicit scripture, paragraph structure *and* a reference section at once
//! produces output that silently drops text or half-applies rules. Each pass
//! here does one job on the whole document and hands the result to the next.
//! The model is treated as an untrusted text transformer: every output is
//! post-processed, reference numbering is reconciled locally, and the first
//! failed pass aborts the run rather than returning a half-annotated document.
//!
//! ## Pipeline Overview
//!
//! ```text
//! text
//!  │
//!  ├─ 1. Mark unclear content       (gateway)
//!  ├─ 2. Titles and headers         (gateway)
//!  ├─ 3. Lists                      (gateway)
//!  ├─ 4. Quotes                     (gateway)
//!  ├─ 5. Explicit scripture refs    (gateway)
//!  ├─ 6. Implicit scripture refs    (gateway)
//!  ├─ 7. Renumber [n] markers       (local)
//!  ├─ 8. Paragraphs and structure   (gateway)
//!  └─ 9. Reference section          (gateway, appended after one newline)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use manuscript_annotate::{annotate, AnnotateConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / GEMINI_API_KEY
//!     let config = AnnotateConfig::default();
//!     let output = annotate("Sermon notes on Romans 8:28 ...", &config).await?;
//!     println!("{}", output.document);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `annotate` binary (clap + anyhow + tracing-subscriber + indicatif) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod annotate;
pub mod config;
pub mod error;
pub mod output;
pub mod passes;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod stream;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use annotate::{annotate, annotate_input, annotate_sync, annotate_to_file, resolve_gateway};
pub use config::{AnnotateConfig, AnnotateConfigBuilder};
pub use error::{AnnotateError, CompletionError, PassFailure};
pub use output::{AnnotateOutput, AnnotateStats, StepKind, StepRecord};
pub use passes::{OutputMode, PassDefinition, PassPlan, PostProcess, Step};
pub use pipeline::gateway::{CompletionGateway, GenerationParams, LlmGateway, Message, Role};
pub use pipeline::references::normalize as normalize_references;
pub use progress::{AnnotateProgressCallback, NoopProgressCallback, ProgressCallback};
pub use stream::{annotate_batch, annotate_stream, AnnotateStream, BatchItem};
