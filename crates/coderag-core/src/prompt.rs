//! Code-generation prompt template.

use coderag_llm::{LlmError, LlmProvider};

/// Returned in place of an empty model answer.
pub const EMPTY_RESPONSE_PLACEHOLDER: &str = "No valid response received.";

const CODE_PROMPT_TEMPLATE: &str = "\
You are a coding assistant specializing in software development. Your task is to generate only executable code. Follow these strict rules:

1. Output only functional code.
2. Do not include print statements, comments, explanations, or UI components (e.g., Streamlit).
3. Ensure the code is complete, syntactically correct, and ready to run without modification.

## Task
{question}

## Context (if relevant)
{context}

## Output (Code Only)
";

/// Renders the code-only instruction and drives a single generation call.
#[derive(Debug, Clone, Copy, Default)]
pub struct Prompter;

impl Prompter {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Substitute both slots in one pass, so slot markers inside the question
    /// are never expanded again.
    #[must_use]
    pub fn render(&self, question: &str, context: &str) -> String {
        let mut out = String::with_capacity(CODE_PROMPT_TEMPLATE.len() + question.len() + context.len());
        let mut rest = CODE_PROMPT_TEMPLATE;
        while let Some(start) = rest.find('{') {
            out.push_str(&rest[..start]);
            let tail = &rest[start..];
            if let Some(after) = tail.strip_prefix("{question}") {
                out.push_str(question);
                rest = after;
            } else if let Some(after) = tail.strip_prefix("{context}") {
                out.push_str(context);
                rest = after;
            } else {
                out.push('{');
                rest = &tail[1..];
            }
        }
        out.push_str(rest);
        out
    }

    /// Render the prompt, run the model and clean up its answer.
    ///
    /// # Errors
    ///
    /// Propagates provider failures.
    pub async fn generate<P: LlmProvider>(
        &self,
        query: &str,
        provider: &P,
        context: &str,
    ) -> Result<String, LlmError> {
        let prompt = self.render(query, context);
        tracing::debug!(
            provider = provider.name(),
            prompt_len = prompt.len(),
            "generating response"
        );
        let response = provider.generate(&prompt).await?;
        let cleaned = response.trim();
        if cleaned.is_empty() {
            tracing::warn!("model returned an empty response");
            return Ok(EMPTY_RESPONSE_PLACEHOLDER.to_owned());
        }
        Ok(cleaned.to_owned())
    }
}
