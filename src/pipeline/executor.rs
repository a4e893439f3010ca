//! Pass Executor: one gateway call under a fixed contract.
//!
//! The executor is intentionally thin. Prompt text lives in
//! [`crate::prompts`], retries live in the gateway adapter, and sequencing
//! lives in the orchestrator. What remains is the contract every pass obeys:
//!
//! 1. messages = `[system: instruction, user: document]`
//! 2. exactly one gateway call with the pass's parameters
//! 3. on success, apply the pass's post-processing rule
//! 4. on failure, return [`PassFailure`], never partial text

use crate::error::PassFailure;
use crate::passes::PassDefinition;
use crate::pipeline::gateway::{CompletionGateway, GenerationParams, Message};
use crate::pipeline::postprocess;
use std::borrow::Cow;
use std::time::Instant;
use tracing::debug;

/// Build the two messages sent for a pass.
pub fn build_messages(pass: &PassDefinition, document: &str) -> Vec<Message> {
    vec![Message::system(pass.instruction()), Message::user(document)]
}

/// Run one pass against `document`.
///
/// `model_override`, when set, replaces the pass's model id for this call
/// only; the pass definition itself is never mutated.
pub async fn execute_pass(
    gateway: &dyn CompletionGateway,
    pass: &PassDefinition,
    document: &str,
    model_override: Option<&str>,
) -> Result<String, PassFailure> {
    let start = Instant::now();
    let messages = build_messages(pass, document);

    let params: Cow<'_, GenerationParams> = match model_override {
        Some(model) => Cow::Owned(GenerationParams {
            model: model.to_string(),
            ..pass.params.clone()
        }),
        None => Cow::Borrowed(&pass.params),
    };

    let raw = gateway
        .complete(&messages, &params)
        .await
        .map_err(|cause| PassFailure {
            pass: pass.name.clone(),
            cause,
        })?;

    let text = postprocess::apply(pass.post_process, &raw);
    debug!(
        "pass {}: {} chars in, {} chars raw, {} chars out, {:?}",
        pass.name,
        document.len(),
        raw.len(),
        text.len(),
        start.elapsed()
    );
    Ok(text)
}
