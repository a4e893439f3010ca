//! Prompt text for the annotation passes.
//!
//! Every pass sends the same shared preamble ([`GLOBAL_PROMPT`]) so the model
//! knows where its job sits in the overall annotation scheme, followed by the
//! pass-specific task, followed by [`CLOSING_DIRECTIVE`]. The document itself
//! always travels as the user message and is never spliced into the prompt.
//!
//! The task constants below feed [`crate::passes::PassPlan::builtin`]. Plans
//! loaded from TOML carry their own task text and reuse only the preamble and
//! closing directive.

/// Shared description of the whole annotation process.
pub const GLOBAL_PROMPT: &str = r#"You are one stage in a multi-stage process that converts a plain-text religious-study manuscript into structured HTML. The complete process has eight responsibilities:

1. TITLES AND HEADERS
   - Identify the document title and section headers and mark them up as <h1>, <h2>, <h3>.

2. SCRIPTURE TAGGING
   - Wrap scripture references in <span class="scripture"> and attach a reference marker [n].

3. PARAGRAPHS AND STRUCTURAL BREAKS
   - Wrap running text in <p> elements and separate logical sections.

4. TIMEFRAMES AND BLOCKQUOTES
   - Mark historical timeframes with <span class="timeframe"> and long quotations with <blockquote>.

5. LISTS
   - Convert enumerations and bullet-like runs of lines into <ul>/<ol> with <li> items.

6. QUOTES VERSUS SCRIPTURE
   - Distinguish quoted scripture from quotations attributed to people; only scripture receives scripture markup.

7. UNCLEAR CONTENT
   - Content wrapped in <span class="unclear">…</span> is ambiguous or incomplete. Never transform anything inside such a span.

8. OUT-OF-SCOPE CONTENT
   - Do not add commentary, summaries, corrections, or content that is not in the manuscript.

You perform ONLY the stage described below."#;

/// Appended after every task description.
pub const CLOSING_DIRECTIVE: &str = r#"OUTPUT RULES
- Return the ENTIRE document, from the first character to the last.
- Apply only the transformation assigned to this stage.
- Preserve every other character, tag, attribute, and reference marker exactly as received.
- Do NOT wrap the output in ```html fences.
- Do NOT add explanations before or after the document."#;

/// Stage 1: mark ambiguous or incomplete spans.
pub const TASK_MARK_UNCLEAR: &str = r#"STAGE: MARK UNCLEAR CONTENT
Find sentences or fragments that are incomplete, garbled, or whose meaning cannot be determined with confidence. Wrap each such span in <span class="unclear">…</span>. Every later stage will skip content inside these spans, so mark only what is genuinely unclear."#;

/// Stage 2: titles and headers.
pub const TASK_TITLES: &str = r#"STAGE: TITLES AND HEADERS
Identify the main title and every section or subsection header. Wrap the main title in <h1>, sections in <h2>, and subsections in <h3>. Do not turn ordinary sentences into headers."#;

/// Stage 3: lists.
pub const TASK_LISTS: &str = r#"STAGE: LISTS
Convert numbered enumerations into <ol> and bulleted or dashed runs of lines into <ul>, one <li> per item. Keep item text unchanged and keep nested lists nested."#;

/// Stage 4: quotes.
pub const TASK_QUOTES: &str = r#"STAGE: QUOTES
Find quotations attributed to people (authors, preachers, historical figures) and wrap them in <q class="attributed">…</q>, keeping the attribution text outside the tag. Quotations of scripture are NOT attributed quotes: leave them for the scripture stages."#;

/// Stage 5: explicit scripture references.
pub const TASK_EXPLICIT_SCRIPTURE: &str = r#"STAGE: EXPLICIT SCRIPTURE REFERENCES
Find every explicit scripture citation (for example "John 3:16" or "Romans 8:28-30"). Wrap the citation in <span class="scripture">…</span> and place a reference marker of the form [n] immediately after the span, where n is a positive integer. Numbering does not need to be final; it is reconciled later."#;

/// Stage 6: implicit scripture references.
pub const TASK_IMPLICIT_SCRIPTURE: &str = r#"STAGE: IMPLICIT SCRIPTURE REFERENCES
Find scripture that is quoted or closely paraphrased without a citation. Wrap the text in <span class="scripture implicit" data-ref="Book Chapter:Verse">…</span> using the verse you are confident it comes from, and place a reference marker [n] immediately after the span. Leave existing markers untouched. If you are not confident of the source, leave the text unchanged."#;

/// Stage 8: general structure.
pub const TASK_STRUCTURE: &str = r#"STAGE: GENERAL STRUCTURE
Wrap running text in <p> elements, mark historical timeframes with <span class="timeframe">, wrap long quotations in <blockquote>, and place attributions in <cite>. Reference markers [n] must stay exactly where and as they are."#;

/// Stage 9: reference section.
pub const TASK_REFERENCES: &str = r#"STAGE: REFERENCE SECTION
Scan the document for reference markers [n]. Produce ONLY a reference section, not the document: a <section class="references"> containing an <ol> with one <li id="ref-n"> per marker, in marker order, giving the scripture reference for that marker. Do not repeat the document."#;

/// Build the system-role instruction for one pass.
///
/// Pure function of `task`: preamble, the task verbatim, then the closing
/// directive.
pub fn build_instruction(task: &str) -> String {
    let mut out = String::with_capacity(GLOBAL_PROMPT.len() + task.len() + CLOSING_DIRECTIVE.len() + 4);
    out.push_str(GLOBAL_PROMPT);
    out.push_str("\n\n");
    out.push_str(task);
    out.push_str("\n\n");
    out.push_str(CLOSING_DIRECTIVE);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instruction_contains_task_verbatim_between_preamble_and_directive() {
        let task = "STAGE: TEST\nDo one thing.";
        let out = build_instruction(task);
        let preamble_end = out.find(task).expect("task present");
        assert!(out.starts_with(GLOBAL_PROMPT));
        assert!(preamble_end >= GLOBAL_PROMPT.len());
        assert!(out.ends_with(CLOSING_DIRECTIVE));
    }

    #[test]
    fn instruction_is_deterministic() {
        assert_eq!(build_instruction(TASK_LISTS), build_instruction(TASK_LISTS));
    }

    #[test]
    fn preamble_names_all_eight_responsibilities() {
        for n in 1..=8 {
            assert!(GLOBAL_PROMPT.contains(&format!("\n{n}. ")), "missing item {n}");
        }
    }
}
