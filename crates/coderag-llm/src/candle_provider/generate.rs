use candle_core::{DType, Tensor};
use candle_transformers::generation::{LogitsProcessor, Sampling};

use crate::error::LlmError;

#[derive(Debug, Clone)]
pub struct GenerationConfig {
    pub temperature: f64,
    pub top_p: Option<f64>,
    pub top_k: Option<usize>,
    pub max_new_tokens: usize,
    pub seed: u64,
    pub repeat_penalty: f32,
    pub repeat_last_n: usize,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: 0.6,
            top_p: Some(0.9),
            top_k: None,
            max_new_tokens: 1000,
            seed: 42,
            repeat_penalty: 1.1,
            repeat_last_n: 64,
        }
    }
}

impl GenerationConfig {
    fn sampling(&self) -> Sampling {
        if self.temperature <= 0.0 {
            return Sampling::ArgMax;
        }
        match (self.top_k, self.top_p) {
            (Some(k), Some(p)) => Sampling::TopKThenTopP {
                k,
                p,
                temperature: self.temperature,
            },
            (Some(k), None) => Sampling::TopK {
                k,
                temperature: self.temperature,
            },
            (None, Some(p)) => Sampling::TopP {
                p,
                temperature: self.temperature,
            },
            (None, None) => Sampling::All {
                temperature: self.temperature,
            },
        }
    }
}

pub struct GenerationOutput {
    pub text: String,
    pub tokens_generated: usize,
}

/// Autoregressive decoding loop.
///
/// `forward_fn` receives a `[1, seq]` token tensor plus the absolute position
/// of its first token and returns last-position logits. Decoding stops at any
/// of `eos_token_ids` or after `max_new_tokens`; stop tokens are not decoded.
///
/// # Errors
///
/// Returns an error if the forward pass, sampling, or token decoding fails.
pub fn generate_tokens<F>(
    forward_fn: &mut F,
    tokenizer: &tokenizers::Tokenizer,
    input_tokens: &[u32],
    config: &GenerationConfig,
    eos_token_ids: &[u32],
    device: &candle_core::Device,
) -> Result<GenerationOutput, LlmError>
where
    F: FnMut(&Tensor, usize) -> Result<Tensor, LlmError>,
{
    if config.max_new_tokens == 0 || input_tokens.is_empty() {
        return Ok(GenerationOutput {
            text: String::new(),
            tokens_generated: 0,
        });
    }

    let mut logits_processor = LogitsProcessor::from_sampling(config.seed, config.sampling());
    let mut all_tokens: Vec<u32> = input_tokens.to_vec();
    let mut generated: Vec<u32> = Vec::with_capacity(config.max_new_tokens);

    let mut input = Tensor::new(input_tokens, device)?.unsqueeze(0)?;
    let mut pos = 0;
    while generated.len() < config.max_new_tokens {
        let step_len = input.dim(1)?;
        let logits = last_position(&forward_fn(&input, pos)?)?;
        pos += step_len;

        let logits = apply_repeat_penalty(
            &logits,
            &all_tokens,
            config.repeat_penalty,
            config.repeat_last_n,
        )?;
        let next_token = logits_processor.sample(&logits)?;
        if eos_token_ids.contains(&next_token) {
            break;
        }
        generated.push(next_token);
        all_tokens.push(next_token);
        input = Tensor::new(&[next_token], device)?.unsqueeze(0)?;
    }

    let text = decode_tokens(tokenizer, &generated)?;
    Ok(GenerationOutput {
        text,
        tokens_generated: generated.len(),
    })
}

/// Reduce `[1, vocab]`, `[1, seq, vocab]` or `[vocab]` logits to an f32 `[vocab]`.
fn last_position(logits: &Tensor) -> Result<Tensor, LlmError> {
    let mut logits = logits.to_dtype(DType::F32)?;
    while logits.rank() > 1 {
        logits = if logits.dim(0)? == 1 {
            logits.squeeze(0)?
        } else {
            let last = logits.dim(0)? - 1;
            logits.get(last)?
        };
    }
    Ok(logits)
}

fn apply_repeat_penalty(
    logits: &Tensor,
    tokens: &[u32],
    penalty: f32,
    last_n: usize,
) -> Result<Tensor, LlmError> {
    if (penalty - 1.0).abs() < f32::EPSILON {
        return Ok(logits.clone());
    }
    let start = tokens.len().saturating_sub(last_n);
    let recent = &tokens[start..];
    candle_transformers::utils::apply_repeat_penalty(logits, penalty, recent)
        .map_err(LlmError::Candle)
}

fn decode_tokens(tokenizer: &tokenizers::Tokenizer, tokens: &[u32]) -> Result<String, LlmError> {
    tokenizer
        .decode(tokens, true)
        .map_err(|e| LlmError::Inference(format!("tokenizer decode failed: {e}")))
}

#[cfg(test)]
mod tests {
    use candle_core::Device;

    use super::*;

    const VOCAB_TOKENIZER: &str = r#"{
        "version": "1.0",
        "truncation": null,
        "padding": null,
        "added_tokens": [],
        "normalizer": null,
        "pre_tokenizer": {"type": "Whitespace"},
        "post_processor": null,
        "decoder": null,
        "model": {
            "type": "WordLevel",
            "vocab": {"<unk>": 0, "import": 1, "os": 2, "</s>": 3},
            "unk_token": "<unk>"
        }
    }"#;

    fn tokenizer() -> tokenizers::Tokenizer {
        tokenizers::Tokenizer::from_bytes(VOCAB_TOKENIZER.as_bytes()).unwrap()
    }

    fn greedy(max_new_tokens: usize) -> GenerationConfig {
        GenerationConfig {
            temperature: 0.0,
            max_new_tokens,
            repeat_penalty: 1.0,
            ..GenerationConfig::default()
        }
    }

    /// Emits `script[i]` as the argmax on the i-th call, recording each input shape.
    fn scripted(
        script: Vec<u32>,
        shapes: &mut Vec<(Vec<usize>, usize)>,
    ) -> impl FnMut(&Tensor, usize) -> Result<Tensor, LlmError> + '_ {
        let mut step = 0;
        move |input: &Tensor, pos: usize| {
            shapes.push((input.dims().to_vec(), pos));
            let mut logits = vec![0.0_f32; 4];
            logits[script[step] as usize] = 10.0;
            step += 1;
            Ok(Tensor::new(logits.as_slice(), &Device::Cpu)?.unsqueeze(0)?)
        }
    }

    #[test]
    fn default_generation_config() {
        let config = GenerationConfig::default();
        assert_eq!(config.max_new_tokens, 1000);
        assert_eq!(config.seed, 42);
        assert!((config.repeat_penalty - 1.1).abs() < f32::EPSILON);
        assert_eq!(config.repeat_last_n, 64);
    }

    #[test]
    fn zero_temperature_is_greedy() {
        assert!(matches!(greedy(1).sampling(), Sampling::ArgMax));
    }

    #[test]
    fn stops_at_eos_without_decoding_it() {
        let mut shapes = Vec::new();
        let mut forward = scripted(vec![1, 2, 3, 1], &mut shapes);
        let out = generate_tokens(
            &mut forward,
            &tokenizer(),
            &[1, 2],
            &greedy(10),
            &[3],
            &Device::Cpu,
        )
        .unwrap();
        assert_eq!(out.tokens_generated, 2);
        assert_eq!(out.text, "import os");
        drop(forward);
        assert_eq!(shapes, vec![(vec![1, 2], 0), (vec![1, 1], 2), (vec![1, 1], 3)]);
    }

    #[test]
    fn truncates_at_max_new_tokens() {
        let mut shapes = Vec::new();
        let mut forward = scripted(vec![1, 1, 1, 1, 1], &mut shapes);
        let out = generate_tokens(
            &mut forward,
            &tokenizer(),
            &[2],
            &greedy(3),
            &[3],
            &Device::Cpu,
        )
        .unwrap();
        assert_eq!(out.tokens_generated, 3);
    }

    #[test]
    fn zero_budget_skips_the_model() {
        let mut calls = 0;
        let mut forward = |_: &Tensor, _: usize| -> Result<Tensor, LlmError> {
            calls += 1;
            Err(LlmError::Inference("unreachable".into()))
        };
        let out = generate_tokens(
            &mut forward,
            &tokenizer(),
            &[1],
            &greedy(0),
            &[3],
            &Device::Cpu,
        )
        .unwrap();
        assert!(out.text.is_empty());
        assert_eq!(calls, 0);
    }

    #[test]
    fn last_position_handles_sequence_logits() {
        let logits = Tensor::new(&[[[0.0_f32, 1.0], [2.0, 3.0]]], &Device::Cpu).unwrap();
        let vals: Vec<f32> = last_position(&logits).unwrap().to_vec1().unwrap();
        assert_eq!(vals, vec![2.0, 3.0]);
    }

    #[test]
    fn repeat_penalty_no_op_when_one() {
        let logits = Tensor::new(&[1.0_f32, 2.0, 3.0], &Device::Cpu).unwrap();
        let result = apply_repeat_penalty(&logits, &[0, 1], 1.0, 64).unwrap();
        let vals: Vec<f32> = result.to_vec1().unwrap();
        assert_eq!(vals, vec![1.0, 2.0, 3.0]);
    }
}
