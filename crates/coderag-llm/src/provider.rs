use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::error::LlmError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Text in, generated text out.
pub trait LlmProvider: Send + Sync {
    /// Generate a completion for a fully rendered prompt.
    ///
    /// The returned text excludes the prompt itself and is bounded by the
    /// provider's configured token budget.
    ///
    /// # Errors
    ///
    /// Returns an error if tokenization, the forward pass, or decoding fails.
    fn generate(&self, prompt: &str) -> impl Future<Output = Result<String, LlmError>> + Send;

    fn name(&self) -> &str;
}

/// Text in, fixed-length vector out. Deterministic for a given model and text.
pub trait EmbeddingProvider: Send + Sync {
    /// # Errors
    ///
    /// Returns an error if the embedding model fails.
    fn embed(&self, text: &str) -> impl Future<Output = Result<Vec<f32>, LlmError>> + Send;

    /// Embed several texts. The default implementation calls [`Self::embed`]
    /// once per text, in order.
    ///
    /// # Errors
    ///
    /// Returns the first embedding error encountered.
    fn embed_batch(
        &self,
        texts: &[String],
    ) -> impl Future<Output = Result<Vec<Vec<f32>>, LlmError>> + Send {
        async move {
            let mut out = Vec::with_capacity(texts.len());
            for text in texts {
                out.push(self.embed(text).await?);
            }
            Ok(out)
        }
    }

    fn name(&self) -> &str;
}

impl<T: LlmProvider> LlmProvider for std::sync::Arc<T> {
    fn generate(&self, prompt: &str) -> impl Future<Output = Result<String, LlmError>> + Send {
        (**self).generate(prompt)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

impl<T: EmbeddingProvider> EmbeddingProvider for std::sync::Arc<T> {
    fn embed(&self, text: &str) -> impl Future<Output = Result<Vec<f32>, LlmError>> + Send {
        (**self).embed(text)
    }

    fn embed_batch(
        &self,
        texts: &[String],
    ) -> impl Future<Output = Result<Vec<Vec<f32>>, LlmError>> + Send {
        (**self).embed_batch(texts)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct LengthEmbedder;

    impl EmbeddingProvider for LengthEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
            #[allow(clippy::cast_precision_loss)]
            Ok(vec![text.len() as f32])
        }

        fn name(&self) -> &'static str {
            "length"
        }
    }

    #[tokio::test]
    async fn default_embed_batch_preserves_order() {
        let texts = vec!["a".to_owned(), "abc".to_owned(), "ab".to_owned()];
        let out = LengthEmbedder.embed_batch(&texts).await.unwrap();
        assert_eq!(out, vec![vec![1.0], vec![3.0], vec![2.0]]);
    }

    #[tokio::test]
    async fn arc_forwards_to_inner() {
        let embedder = std::sync::Arc::new(LengthEmbedder);
        assert_eq!(embedder.embed("abcd").await.unwrap(), vec![4.0]);
        assert_eq!(EmbeddingProvider::name(&embedder), "length");
    }

    #[test]
    fn user_message_role() {
        let msg = Message::user("hi");
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.content, "hi");
    }

    #[test]
    fn role_serializes_lowercase() {
        let json = serde_json::to_string(&Role::Assistant).unwrap();
        assert_eq!(json, "\"assistant\"");
    }
}
