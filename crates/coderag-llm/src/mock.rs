//! Test-only mock providers.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::provider::{EmbeddingProvider, LlmProvider};

#[derive(Debug, Clone)]
pub struct MockProvider {
    responses: Arc<Mutex<Vec<String>>>,
    prompts: Arc<Mutex<Vec<String>>>,
    pub default_response: String,
    pub fail_generate: bool,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self {
            responses: Arc::new(Mutex::new(Vec::new())),
            prompts: Arc::new(Mutex::new(Vec::new())),
            default_response: "mock response".into(),
            fail_generate: false,
        }
    }
}

impl MockProvider {
    #[must_use]
    pub fn with_responses(responses: Vec<String>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses)),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn failing() -> Self {
        Self {
            fail_generate: true,
            ..Self::default()
        }
    }

    /// Prompts received so far, in call order.
    #[must_use]
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

impl LlmProvider for MockProvider {
    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "mock"
    }

    async fn generate(&self, prompt: &str) -> Result<String, crate::LlmError> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_owned());
        }
        if self.fail_generate {
            return Err(crate::LlmError::Other("mock LLM error".into()));
        }
        let mut responses = self
            .responses
            .lock()
            .map_err(|e| crate::LlmError::Other(format!("mock lock poisoned: {e}")))?;
        if responses.is_empty() {
            Ok(self.default_response.clone())
        } else {
            Ok(responses.remove(0))
        }
    }
}

/// Deterministic bag-of-words embedder.
///
/// Each whitespace token is hashed into one of `dim` buckets; the result is
/// L2-normalized, so texts sharing words score higher under cosine similarity.
#[derive(Debug, Clone)]
pub struct MockEmbedder {
    pub dim: usize,
    pub fail_embed: bool,
    calls: Arc<AtomicUsize>,
}

impl Default for MockEmbedder {
    fn default() -> Self {
        Self::new(32)
    }
}

impl MockEmbedder {
    #[must_use]
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            fail_embed: false,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    #[must_use]
    pub fn failing() -> Self {
        Self {
            fail_embed: true,
            ..Self::default()
        }
    }

    /// Number of `embed` calls made against this embedder or any of its clones.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn bucket(&self, token: &str) -> usize {
        // FNV-1a
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in token.to_lowercase().bytes() {
            hash ^= u64::from(byte);
            hash = hash.wrapping_mul(0x0100_0000_01b3);
        }
        #[allow(clippy::cast_possible_truncation)]
        let idx = (hash % self.dim.max(1) as u64) as usize;
        idx
    }
}

impl EmbeddingProvider for MockEmbedder {
    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "mock"
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, crate::LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_embed {
            return Err(crate::LlmError::Other("mock embed error".into()));
        }
        let mut v = vec![0.0f32; self.dim.max(1)];
        for token in text.split_whitespace() {
            v[self.bucket(token)] += 1.0;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut v {
                *x /= norm;
            }
        } else {
            v[0] = 1.0;
        }
        Ok(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn responses_are_consumed_in_order() {
        let p = MockProvider::with_responses(vec!["one".into(), "two".into()]);
        assert_eq!(p.generate("a").await.unwrap(), "one");
        assert_eq!(p.generate("b").await.unwrap(), "two");
        assert_eq!(p.generate("c").await.unwrap(), "mock response");
        assert_eq!(p.prompts(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn failing_provider_errors() {
        assert!(MockProvider::failing().generate("x").await.is_err());
    }

    #[tokio::test]
    async fn embedder_is_unit_length_and_deterministic() {
        let e = MockEmbedder::new(16);
        let a = e.embed("fn main() { println }").await.unwrap();
        let b = e.embed("fn main() { println }").await.unwrap();
        assert_eq!(a, b);
        let norm = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
        assert_eq!(e.calls(), 2);
    }

    #[tokio::test]
    async fn empty_text_still_yields_unit_vector() {
        let v = MockEmbedder::new(4).embed("   ").await.unwrap();
        assert_eq!(v, vec![1.0, 0.0, 0.0, 0.0]);
    }

    #[tokio::test]
    async fn clones_share_call_counter() {
        let e = MockEmbedder::default();
        let c = e.clone();
        c.embed("x").await.unwrap();
        assert_eq!(e.calls(), 1);
    }
}
