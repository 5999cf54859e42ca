use anyhow::{bail, Context, Error, Result};
use candle_core::{DType, Device, Tensor};
use candle_transformers::generation::LogitsProcessor;
use candle_transformers::models::quantized_mixformer::MixFormerSequentialForCausalLM as Phi2;
use candle_transformers::quantized_var_builder::VarBuilder;
use hf_hub::api::sync::ApiRepo;
use rand::random;
use serde::{Deserialize, Serialize};
use tokenizers::Tokenizer;

use crate::inference::model_config::{GenerationConfig, ModelSource};

/// One candidate produced by a pipeline: the prompt followed by its continuation.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct GeneratedText {
    pub generated_text: String,
}

/// A loaded model that turns a prompt into one or more candidates.
///
/// Implementations are shared between concurrent requests and must keep any
/// per-call state (KV cache, sampler) local to the call.
pub trait TextGeneration: Send + Sync {
    fn generate(&self, prompt: &str) -> Result<Vec<GeneratedText>>;
}

// Adapted from
// https://github.com/huggingface/candle/blob/main/candle-examples/examples/phi/main.rs
#[derive(Clone)]
pub struct TextGeneratorPipeline {
    model: Phi2,
    device: Device,
    tokenizer: Tokenizer,
    eos_token: u32,
    config: GenerationConfig,
}

impl TextGeneratorPipeline {
    pub fn with_quantized_gguf(
        repo: &ApiRepo,
        source: &ModelSource,
        config: GenerationConfig,
    ) -> Result<TextGeneratorPipeline> {
        let tokenizer_file = repo
            .get(&source.tokenizer_file)
            .with_context(|| format!("Failed to fetch {}", source.tokenizer_file))?;
        let gguf_file = repo
            .get(&source.weights_file)
            .with_context(|| format!("Failed to fetch {}", source.weights_file))?;

        let device = Device::Cpu;
        let vb = VarBuilder::from_gguf(gguf_file, &device)?;
        let model = Phi2::new(&source.architecture.mixformer_config(), vb)?;
        let tokenizer = Tokenizer::from_file(tokenizer_file).map_err(Error::msg)?;

        Self::new(model, device, tokenizer, config)
    }

    fn new(
        model: Phi2,
        device: Device,
        tokenizer: Tokenizer,
        config: GenerationConfig,
    ) -> Result<TextGeneratorPipeline> {
        if config.num_return_sequences == 0 {
            bail!("num_return_sequences must be at least 1");
        }
        let eos_token = match tokenizer.get_vocab(true).get("<|endoftext|>") {
            Some(token) => *token,
            None => bail!("Cannot find the <|endoftext|> token"),
        };

        Ok(TextGeneratorPipeline {
            model,
            device,
            tokenizer,
            eos_token,
            config,
        })
    }

    /// Samples a continuation of `prompt_tokens` and returns only the new tokens.
    fn sample_continuation(&self, prompt_tokens: &[u32], seed: u64) -> Result<Vec<u32>> {
        let mut model = self.model.clone();
        model.clear_kv_cache();
        let mut logits_processor =
            LogitsProcessor::new(seed, Some(self.config.temperature), self.config.top_p);

        let mut tokens = prompt_tokens.to_vec();
        let budget = self.config.max_length.saturating_sub(tokens.len());
        for index in 0..budget {
            let context_size = if index > 0 { 1 } else { tokens.len() };
            let start_pos = tokens.len().saturating_sub(context_size);
            let input = Tensor::new(&tokens[start_pos..], &self.device)?.unsqueeze(0)?;

            let logits = model.forward(&input)?;
            let logits = logits.squeeze(0)?.to_dtype(DType::F32)?;
            let logits = if (self.config.repeat_penalty - 1.).abs() < f32::EPSILON {
                logits
            } else {
                let start_at = tokens.len().saturating_sub(self.config.repeat_context_size);
                candle_transformers::utils::apply_repeat_penalty(
                    &logits,
                    self.config.repeat_penalty,
                    &tokens[start_at..],
                )?
            };

            let next_token = logits_processor.sample(&logits)?;
            if next_token == self.eos_token {
                break;
            }
            tokens.push(next_token);
        }

        Ok(tokens.split_off(prompt_tokens.len()))
    }
}

impl TextGeneration for TextGeneratorPipeline {
    #[tracing::instrument(level = "info", skip(self, prompt), fields(prompt_len = prompt.len()))]
    fn generate(&self, prompt: &str) -> Result<Vec<GeneratedText>> {
        let encoding = self.tokenizer.encode(prompt, true).map_err(Error::msg)?;
        let prompt_tokens = encoding.get_ids();
        if prompt_tokens.is_empty() {
            bail!("Prompt is empty");
        }

        let base_seed = self.config.seed.unwrap_or_else(random);
        let start_gen = std::time::Instant::now();
        let mut candidates = Vec::with_capacity(self.config.num_return_sequences);
        for index in 0..self.config.num_return_sequences {
            let continuation =
                self.sample_continuation(prompt_tokens, base_seed.wrapping_add(index as u64))?;
            let text = match self.tokenizer.decode(&continuation, true) {
                Ok(text) => text,
                Err(err) => bail!("Cannot decode tokens: {err}"),
            };
            candidates.push(GeneratedText {
                generated_text: format!("{prompt}{text}"),
            });
        }
        tracing::debug!(
            elapsed = start_gen.elapsed().as_secs_f64(),
            candidates = candidates.len(),
            "Generation finished"
        );

        Ok(candidates)
    }
}
