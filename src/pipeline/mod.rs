//! Building blocks the orchestrator in [`crate::annotate`] sequences.
//!
//! Each submodule owns exactly one concern, so each is testable without the
//! others and the gateway can be swapped without touching pass logic.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ executor ──▶ … ──▶ references ──▶ executor ──▶ executor (append)
//! (text)    (gateway +       (local renumber)  (structure)  (reference section)
//!            postprocess)
//! ```
//!
//! 1. [`input`]       — read manuscript text from a path, stdin, or URL
//! 2. [`gateway`]     — the completion capability and its edgequake-llm adapter;
//!    the only stage with network I/O
//! 3. [`executor`]    — one pass: build messages, one gateway call, post-process
//! 4. [`postprocess`] — fence stripping and trimming of raw completions
//! 5. [`references`]  — deterministic `[n]` renumbering, no gateway call

pub mod executor;
pub mod gateway;
pub mod input;
pub mod postprocess;
pub mod references;
