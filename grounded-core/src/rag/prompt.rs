//! Deterministic prompt assembly under a character budget.
//!
//! The rendered prompt has a fixed shape:
//!
//! ```text
//! <preamble>
//! ====== RETRIEVED CONTEXT ======
//! [1] source: guide.txt (chunk 0)
//! <chunk text>
//! ---
//! [2] source: faq.txt (chunk 4)
//! <chunk text>
//! ====== QUESTION ======
//! <question>
//!
//! <instruction>
//! ```
//!
//! Passages keep their retrieval rank. When the prompt would exceed the
//! budget, passages are dropped from the tail (least relevant first); a
//! passage is never cut in half.

use crate::corpus::Chunk;
use thiserror::Error;

const PREAMBLE: &str =
    "You are an assistant that answers questions using only the provided context.\n";
const CONTEXT_HEADER: &str = "====== RETRIEVED CONTEXT ======\n";
const QUESTION_HEADER: &str = "\n====== QUESTION ======\n";
const INSTRUCTION: &str = "Answer objectively using only the context above. \
If the context does not contain the answer, say that you do not know.";

/// Line placed between two context passages.
pub const CONTEXT_DELIMITER: &str = "\n---\n";

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PromptError {
    /// Even the closest passage alone does not fit.
    #[error("Prompt needs {required} characters but the budget is {budget}")]
    PromptTooLarge { required: usize, budget: usize },

    #[error("No context passages to build a prompt from")]
    NoContext,
}

pub type Result<T> = std::result::Result<T, PromptError>;

/// A rendered prompt and how many of the ranked passages made it in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltPrompt {
    pub text: String,
    /// Number of leading passages included; the rest were dropped.
    pub included: usize,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PromptBuilder;

impl PromptBuilder {
    pub fn new() -> Self {
        Self
    }

    /// Builds the generation prompt for `question` from `ranked_chunks`.
    ///
    /// `max_context_length` bounds the whole rendered prompt, counted in
    /// `char`s. The result is a pure function of the three inputs.
    ///
    /// # Errors
    ///
    /// - [`PromptError::NoContext`] if `ranked_chunks` is empty
    /// - [`PromptError::PromptTooLarge`] if the closest passage plus the
    ///   question already exceed the budget
    pub fn build<'a, I>(
        &self,
        question: &str,
        ranked_chunks: I,
        max_context_length: usize,
    ) -> Result<BuiltPrompt>
    where
        I: IntoIterator<Item = &'a Chunk>,
    {
        let sections: Vec<String> = ranked_chunks
            .into_iter()
            .enumerate()
            .map(|(rank, chunk)| render_section(rank, chunk))
            .collect();
        if sections.is_empty() {
            return Err(PromptError::NoContext);
        }

        let fixed = char_len(PREAMBLE)
            + char_len(CONTEXT_HEADER)
            + char_len(QUESTION_HEADER)
            + char_len(question)
            + 2
            + char_len(INSTRUCTION);
        let delimiter = char_len(CONTEXT_DELIMITER);

        // Totals grow with every passage, so the first fit from the top wins.
        let mut total = fixed;
        let mut included = 0;
        for (i, section) in sections.iter().enumerate() {
            let next = total + char_len(section) + if i > 0 { delimiter } else { 0 };
            if next > max_context_length {
                if i == 0 {
                    return Err(PromptError::PromptTooLarge {
                        required: next,
                        budget: max_context_length,
                    });
                }
                break;
            }
            total = next;
            included += 1;
        }

        let text = render(question, &sections[..included]);
        debug_assert_eq!(char_len(&text), total);

        Ok(BuiltPrompt { text, included })
    }
}

fn render_section(rank: usize, chunk: &Chunk) -> String {
    format!(
        "[{}] source: {} (chunk {})\n{}",
        rank + 1,
        chunk.document_name,
        chunk.chunk_index,
        chunk.text
    )
}

fn render(question: &str, sections: &[String]) -> String {
    let mut prompt = String::from(PREAMBLE);
    prompt.push_str(CONTEXT_HEADER);
    prompt.push_str(&sections.join(CONTEXT_DELIMITER));
    prompt.push_str(QUESTION_HEADER);
    prompt.push_str(question);
    prompt.push_str("\n\n");
    prompt.push_str(INSTRUCTION);
    prompt
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunks() -> Vec<Chunk> {
        vec![
            Chunk::new(0, "guide.txt", 0, "The capital of France is Paris."),
            Chunk::new(1, "guide.txt", 1, "Paris hosts the Louvre museum."),
            Chunk::new(2, "faq.txt", 4, "The Seine flows through Paris."),
        ]
    }

    #[test]
    fn test_build_includes_all_within_budget() {
        let chunks = chunks();
        let prompt = PromptBuilder::new()
            .build("What is the capital of France?", &chunks, 10_000)
            .unwrap();

        assert_eq!(prompt.included, 3);
        assert!(prompt.text.starts_with(PREAMBLE));
        assert!(prompt.text.contains("[1] source: guide.txt (chunk 0)\nThe capital of France is Paris."));
        assert!(prompt.text.contains("[3] source: faq.txt (chunk 4)"));
        assert!(prompt.text.ends_with(INSTRUCTION));

        let first = prompt.text.find("[1]").unwrap();
        let second = prompt.text.find("[2]").unwrap();
        assert!(first < second);
    }

    #[test]
    fn test_build_is_deterministic() {
        let chunks = chunks();
        let builder = PromptBuilder::new();
        let a = builder.build("q?", &chunks, 500).unwrap();
        let b = builder.build("q?", &chunks, 500).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_build_drops_tail_chunks() {
        let chunks = chunks();
        let builder = PromptBuilder::new();
        let full = builder.build("q?", &chunks, 10_000).unwrap();

        // One character short of the full prompt: the last passage must go.
        let trimmed = builder
            .build("q?", &chunks, char_len(&full.text) - 1)
            .unwrap();
        assert_eq!(trimmed.included, 2);
        assert!(!trimmed.text.contains("The Seine flows through Paris."));
        assert!(trimmed.text.contains("Paris hosts the Louvre museum."));
        assert!(char_len(&trimmed.text) < char_len(&full.text));
    }

    #[test]
    fn test_build_exact_budget_fits() {
        let chunks = chunks();
        let builder = PromptBuilder::new();
        let full = builder.build("q?", &chunks, 10_000).unwrap();
        let exact = builder.build("q?", &chunks, char_len(&full.text)).unwrap();
        assert_eq!(exact, full);
    }

    #[test]
    fn test_build_too_large() {
        let chunks = chunks();
        let question = "What is the capital of France?";
        let budget = char_len(&chunks[0].text) + char_len(question) - 1;

        let err = PromptBuilder::new()
            .build(question, &chunks, budget)
            .unwrap_err();
        assert!(matches!(err, PromptError::PromptTooLarge { budget: b, .. } if b == budget));
    }

    #[test]
    fn test_build_counts_chars_not_bytes() {
        let chunks = vec![Chunk::new(0, "é.txt", 0, "ééé")];
        let prompt = PromptBuilder::new().build("ü?", &chunks, 10_000).unwrap();
        let required = char_len(&prompt.text);

        assert!(PromptBuilder::new().build("ü?", &chunks, required).is_ok());
        assert!(prompt.text.len() > required);
    }

    #[test]
    fn test_build_without_chunks() {
        let none: Vec<Chunk> = Vec::new();
        let err = PromptBuilder::new().build("q?", &none, 100).unwrap_err();
        assert_eq!(err, PromptError::NoContext);
    }
}
