//! Grounded question-answering prompt.
//!
//! Every generator that talks to a language model renders the same template:
//! retrieved contexts are numbered, joined by blank lines, and placed above
//! the question. The model is told to answer only from that context and to
//! reply with [`UNKNOWN_ANSWER`] otherwise.

/// The answer a grounded generator gives when the context lacks one.
pub const UNKNOWN_ANSWER: &str = "I don't know";

const PREAMBLE: &str = "You are a helpful assistant. Use the provided context to answer the question concisely.\n\
If the answer is not in the context, say \"I don't know\".";

/// Render the prompt for `question` over `contexts`, in retrieval order.
///
/// ```rust
/// use doc_qa_core::prompt::render;
///
/// let p = render(&["The sky is blue.".to_string()], "What color is the sky?");
/// assert!(p.contains("[1] The sky is blue."));
/// assert!(p.ends_with("Question: What color is the sky?\n\nAnswer:"));
/// ```
pub fn render(contexts: &[String], question: &str) -> String {
    let context = if contexts.is_empty() {
        "(no context)".to_string()
    } else {
        contexts
            .iter()
            .enumerate()
            .map(|(i, c)| format!("[{}] {}", i + 1, c.trim()))
            .collect::<Vec<_>>()
            .join("\n\n")
    };

    format!(
        "{}\n\nContext:\n{}\n\nQuestion: {}\n\nAnswer:",
        PREAMBLE,
        context,
        question.trim()
    )
}
