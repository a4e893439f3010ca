//! Batch API: many independent submissions, one gateway.
//!
//! Each manuscript gets its own run, so runs proceed concurrently without
//! locking. Only the gateway and config are shared, and both are read-only.
//!
//! [`annotate_stream`] yields results in completion order; sort by `index`
//! if order matters. [`annotate_batch`] returns them in input order.

use crate::annotate::{resolve_gateway, run_plan};
use crate::config::AnnotateConfig;
use crate::error::AnnotateError;
use crate::output::AnnotateOutput;
use crate::pipeline::gateway::CompletionGateway;
use crate::pipeline::input;
use futures::stream::{self, StreamExt};
use std::pin::Pin;
use std::sync::Arc;
use tokio_stream::Stream;
use tracing::info;

/// One finished submission.
#[derive(Debug)]
pub struct BatchItem {
    /// Position of the submission in the input list.
    pub index: usize,
    /// The path, `-`, or URL the manuscript was read from.
    pub source: String,
    pub result: Result<AnnotateOutput, AnnotateError>,
}

/// A boxed stream of finished submissions.
pub type AnnotateStream = Pin<Box<dyn Stream<Item = BatchItem> + Send>>;

/// Annotate several manuscripts (paths, `-`, or URLs), streaming each result
/// as soon as its run finishes.
///
/// At most `config.concurrency` runs are in flight at once.
///
/// # Returns
/// - `Ok(AnnotateStream)` — one [`BatchItem`] per input; per-manuscript
///   failures (unreadable file, empty text, failed step) live in `result`
/// - `Err(AnnotateError)` — fatal: no gateway could be resolved
pub async fn annotate_stream(
    inputs: Vec<String>,
    config: &AnnotateConfig,
) -> Result<AnnotateStream, AnnotateError> {
    info!("Starting batch annotation of {} inputs", inputs.len());
    let gateway = resolve_gateway(config)?;
    let concurrency = config.concurrency;
    let config = config.clone();

    let s = stream::iter(inputs.into_iter().enumerate().map(move |(index, source)| {
        let gateway = Arc::clone(&gateway);
        let cfg = config.clone();
        async move {
            let result = match input::resolve_input(&source, cfg.download_timeout_secs).await {
                Ok(text) => run_submission(gateway.as_ref(), &text, &cfg).await,
                Err(e) => Err(e),
            };
            BatchItem {
                index,
                source,
                result,
            }
        }
    }))
    .buffer_unordered(concurrency);

    Ok(Box::pin(s))
}

/// Annotate several in-memory manuscripts concurrently, returning results in
/// input order.
///
/// The gateway is only resolved when at least one text is non-empty.
pub async fn annotate_batch(
    texts: Vec<String>,
    config: &AnnotateConfig,
) -> Result<Vec<Result<AnnotateOutput, AnnotateError>>, AnnotateError> {
    if texts.iter().all(|t| t.trim().is_empty()) {
        return Ok(texts.iter().map(|_| Err(AnnotateError::EmptyInput)).collect());
    }

    let gateway = resolve_gateway(config)?;
    let results = stream::iter(texts.iter().map(|text| {
        let gateway = Arc::clone(&gateway);
        async move { run_submission(gateway.as_ref(), text, config).await }
    }))
    .buffered(config.concurrency)
    .collect()
    .await;

    Ok(results)
}

async fn run_submission(
    gateway: &dyn CompletionGateway,
    text: &str,
    config: &AnnotateConfig,
) -> Result<AnnotateOutput, AnnotateError> {
    if text.trim().is_empty() {
        return Err(AnnotateError::EmptyInput);
    }
    run_plan(gateway, text, config).await
}
