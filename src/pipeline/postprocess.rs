//! Post-processing: deterministic cleanup of a pass's raw completion.
//!
//! Models are told not to fence their output and not to pad it, and they
//! still do both. Two rules exist:
//!
//! 1. Strip literal ```` ```html ```` and ```` ``` ```` markers. These are
//!    removed *anywhere* in the text, not only at the edges: models sometimes
//!    close a fence mid-document and reopen it after a long block.
//! 2. Trim leading and trailing whitespace. Always applied.
//!
//! Fence stripping runs first so the whitespace that surrounded a fence is
//! caught by the trim.

use crate::passes::PostProcess;

const HTML_FENCE: &str = "```html";
const FENCE: &str = "```";

/// Apply a pass's post-processing rule to its raw completion.
pub fn apply(rule: PostProcess, raw: &str) -> String {
    match rule {
        PostProcess::Trim => raw.trim().to_string(),
        PostProcess::StripFences => strip_code_fences(raw).trim().to_string(),
    }
}

/// Remove every ```` ```html ```` and ```` ``` ```` marker.
pub fn strip_code_fences(input: &str) -> String {
    input.replace(HTML_FENCE, "").replace(FENCE, "")
}
