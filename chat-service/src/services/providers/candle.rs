//! Local inference with candle.
//!
//! Downloads a Llama-architecture checkpoint from the Hugging Face hub and
//! runs it on the configured device.

use super::{GenerationParams, PipelineError, TextPipeline};
use crate::config::{DeviceKind, ModelDType, ModelSettings};
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::generation::{LogitsProcessor, Sampling};
use candle_transformers::models::llama::{Cache, Config, Llama, LlamaConfig, LlamaEosToks};
use hf_hub::api::sync::{Api, ApiRepo};
use hf_hub::{Repo, RepoType};
use std::path::PathBuf;
use tokenizers::Tokenizer;

/// Tokens tried, in order, when a prompt encodes to nothing and generation
/// needs a starting token.
const BOS_CANDIDATES: &[&str] = &["<|endoftext|>", "<s>", "<|begin_of_text|>"];

impl From<ModelDType> for DType {
    fn from(dtype: ModelDType) -> Self {
        match dtype {
            ModelDType::F32 => DType::F32,
            ModelDType::F16 => DType::F16,
            ModelDType::Bf16 => DType::BF16,
        }
    }
}

fn open_device(kind: DeviceKind) -> Result<Device, PipelineError> {
    let device = match kind {
        DeviceKind::Cpu => Device::Cpu,
        DeviceKind::Cuda => Device::new_cuda(0)
            .map_err(|e| PipelineError::Load(format!("cuda device: {}", e)))?,
        DeviceKind::Metal => Device::new_metal(0)
            .map_err(|e| PipelineError::Load(format!("metal device: {}", e)))?,
    };
    Ok(device)
}

/// Text-generation pipeline backed by a candle Llama model.
pub struct CandlePipeline {
    model_id: String,
    model: Llama,
    tokenizer: Tokenizer,
    config: Config,
    device: Device,
    dtype: DType,
    eos_token_id: Option<LlamaEosToks>,
    bos_token_id: Option<u32>,
}

impl CandlePipeline {
    /// Fetch tokenizer, config and weights and build the model.
    ///
    /// Blocks on network and disk I/O; call it from a blocking context.
    pub fn load(settings: &ModelSettings) -> Result<Self, PipelineError> {
        let device = open_device(settings.device)?;
        let dtype = DType::from(settings.dtype);

        let api = Api::new().map_err(|e| PipelineError::Load(e.to_string()))?;
        let repo = api.repo(Repo::with_revision(
            settings.model_id.clone(),
            RepoType::Model,
            settings.revision.clone(),
        ));

        tracing::info!(model = %settings.model_id, "Loading tokenizer");
        let tokenizer_file = repo
            .get("tokenizer.json")
            .map_err(|e| PipelineError::Load(format!("tokenizer.json: {}", e)))?;
        let tokenizer = Tokenizer::from_file(&tokenizer_file)
            .map_err(|e| PipelineError::Load(format!("tokenizer: {}", e)))?;

        tracing::info!(model = %settings.model_id, "Loading model config");
        let config_file = repo
            .get("config.json")
            .map_err(|e| PipelineError::Load(format!("config.json: {}", e)))?;
        let raw_config = std::fs::read(&config_file)
            .map_err(|e| PipelineError::Load(format!("config.json: {}", e)))?;
        let llama_config: LlamaConfig = serde_json::from_slice(&raw_config)
            .map_err(|e| PipelineError::Unsupported(format!("config.json: {}", e)))?;
        let config = llama_config.into_config(false);

        let eos_token_id = config
            .eos_token_id
            .clone()
            .or_else(|| tokenizer.token_to_id("</s>").map(LlamaEosToks::Single));
        let bos_token_id = config
            .bos_token_id
            .or_else(|| BOS_CANDIDATES.iter().find_map(|t| tokenizer.token_to_id(t)));

        tracing::info!(model = %settings.model_id, "Loading model weights");
        let filenames = weight_files(&repo)?;
        // SAFETY: the files are owned by the hub cache and not modified while mapped.
        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&filenames, dtype, &device) }
            .map_err(|e| PipelineError::Load(format!("weights: {}", e)))?;
        let model = Llama::load(vb, &config)
            .map_err(|e| PipelineError::Load(format!("weights: {}", e)))?;

        Ok(Self {
            model_id: settings.model_id.clone(),
            model,
            tokenizer,
            config,
            device,
            dtype,
            eos_token_id,
            bos_token_id,
        })
    }

    pub fn vocab_size(&self) -> usize {
        self.config.vocab_size
    }

    pub fn hidden_size(&self) -> usize {
        self.config.hidden_size
    }

    pub fn num_layers(&self) -> usize {
        self.config.num_hidden_layers
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    fn is_eos(&self, token: u32) -> bool {
        match &self.eos_token_id {
            Some(LlamaEosToks::Single(id)) => *id == token,
            Some(LlamaEosToks::Multiple(ids)) => ids.contains(&token),
            None => false,
        }
    }

    fn encode(&self, prompt: &str) -> Result<Vec<u32>, PipelineError> {
        let encoding = self
            .tokenizer
            .encode(prompt, true)
            .map_err(|e| PipelineError::Tokenization(e.to_string()))?;
        let mut tokens = encoding.get_ids().to_vec();
        if tokens.is_empty() {
            let bos = self.bos_token_id.ok_or_else(|| {
                PipelineError::Tokenization("prompt is empty and model has no BOS token".into())
            })?;
            tokens.push(bos);
        }
        Ok(tokens)
    }

    fn decode(&self, tokens: &[u32]) -> Result<String, PipelineError> {
        self.tokenizer
            .decode(tokens, true)
            .map_err(|e| PipelineError::Tokenization(e.to_string()))
    }

    /// Sample continuation token ids for an already-encoded prompt.
    fn sample_continuation(
        &self,
        prompt_tokens: &[u32],
        params: &GenerationParams,
        seed: u64,
    ) -> Result<Vec<u32>, PipelineError> {
        let max_positions = self.config.max_position_embeddings;
        if prompt_tokens.len() >= max_positions {
            return Err(PipelineError::Inference(format!(
                "prompt is {} tokens, model context is {}",
                prompt_tokens.len(),
                max_positions
            )));
        }

        let sampling = if !params.do_sample || params.temperature <= 0.0 {
            Sampling::ArgMax
        } else {
            Sampling::All {
                temperature: params.temperature,
            }
        };
        let mut logits_processor = LogitsProcessor::from_sampling(seed, sampling);
        let mut cache = Cache::new(true, self.dtype, &self.config, &self.device)?;

        let budget = params.max_new_tokens.min(max_positions - prompt_tokens.len());
        let mut generated = Vec::with_capacity(budget);

        // Prefill with the whole prompt, then feed one token at a time.
        let mut input = Tensor::new(prompt_tokens, &self.device)?.unsqueeze(0)?;
        let mut index_pos = 0;

        while generated.len() < budget {
            let seq_len = input.dim(1)?;
            let logits = self.model.forward(&input, index_pos, &mut cache)?;
            let logits = logits.squeeze(0)?;
            index_pos += seq_len;

            let next_token = logits_processor.sample(&logits)?;
            if self.is_eos(next_token) {
                break;
            }
            generated.push(next_token);
            input = Tensor::new(&[next_token], &self.device)?.unsqueeze(0)?;
        }

        Ok(generated)
    }
}

impl TextPipeline for CandlePipeline {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn generate(
        &self,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<Vec<String>, PipelineError> {
        let prompt_tokens = self.encode(prompt)?;
        let decoded_prompt = self.decode(&prompt_tokens)?;
        let base_seed = params.seed.unwrap_or_else(rand::random);

        let mut sequences = Vec::with_capacity(params.num_return_sequences);
        for i in 0..params.num_return_sequences {
            let seed = base_seed.wrapping_add(i as u64);
            let generated = self.sample_continuation(&prompt_tokens, params, seed)?;

            let mut all_tokens = prompt_tokens.clone();
            all_tokens.extend_from_slice(&generated);
            let full = self.decode(&all_tokens)?;
            let generated_only = self.decode(&generated)?;

            sequences.push(attach_prompt(prompt, &decoded_prompt, &full, &generated_only));
        }

        Ok(sequences)
    }
}

/// Put the caller's prompt back in front of the continuation.
///
/// Detokenization may not reproduce the prompt byte for byte, so the
/// continuation is cut from `full` after `decoded_prompt`. When `full` does
/// not start with it, the separately decoded `generated_only` is used.
fn attach_prompt(prompt: &str, decoded_prompt: &str, full: &str, generated_only: &str) -> String {
    let continuation = full.strip_prefix(decoded_prompt).unwrap_or(generated_only);
    format!("{}{}", prompt, continuation)
}

/// Weight files for a repository: a single `model.safetensors`, or every shard
/// listed in `model.safetensors.index.json`.
fn weight_files(repo: &ApiRepo) -> Result<Vec<PathBuf>, PipelineError> {
    if let Ok(single) = repo.get("model.safetensors") {
        return Ok(vec![single]);
    }

    let index_file = repo
        .get("model.safetensors.index.json")
        .map_err(|e| PipelineError::Load(format!("no safetensors weights found: {}", e)))?;
    let index_bytes =
        std::fs::read(&index_file).map_err(|e| PipelineError::Load(e.to_string()))?;
    let index: serde_json::Value =
        serde_json::from_slice(&index_bytes).map_err(|e| PipelineError::Load(e.to_string()))?;
    let weight_map = match index.get("weight_map") {
        Some(serde_json::Value::Object(map)) => map,
        _ => {
            return Err(PipelineError::Load(format!(
                "no weight map in {:?}",
                index_file
            )))
        }
    };

    let mut shards: Vec<&str> = weight_map.values().filter_map(|v| v.as_str()).collect();
    shards.sort_unstable();
    shards.dedup();

    shards
        .into_iter()
        .map(|shard| {
            repo.get(shard)
                .map_err(|e| PipelineError::Load(format!("{}: {}", shard, e)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dtype_maps_to_candle() {
        assert_eq!(DType::from(ModelDType::F32), DType::F32);
        assert_eq!(DType::from(ModelDType::Bf16), DType::BF16);
    }

    #[test]
    fn cpu_device_always_opens() {
        assert!(matches!(open_device(DeviceKind::Cpu), Ok(Device::Cpu)));
    }

    #[test]
    fn attach_prompt_cuts_after_decoded_prompt() {
        let text = attach_prompt("Hello", "Hello", "Hello, world", ", world");
        assert_eq!(text, "Hello, world");
    }

    #[test]
    fn attach_prompt_keeps_caller_whitespace() {
        // The tokenizer collapsed the double space in the prompt.
        let text = attach_prompt(
            "Hello  there",
            "Hello there",
            "Hello there, friend",
            " friend",
        );
        assert_eq!(text, "Hello  there, friend");
    }

    #[test]
    fn attach_prompt_falls_back_when_prefix_differs() {
        let text = attach_prompt("hello", "hello", "Hello again", " again");
        assert_eq!(text, "hello again");
    }

    #[test]
    fn attach_prompt_handles_multibyte_boundaries() {
        // Byte 2 of "aé" falls inside the "é", so no cut is possible there.
        let text = attach_prompt("ab", "ab", "aé!", "é!");
        assert_eq!(text, "abé!");

        let text = attach_prompt("héllo", "héllo", "héllo wörld", " wörld");
        assert_eq!(text, "héllo wörld");
    }

    #[test]
    fn attach_prompt_with_empty_prompt_returns_continuation() {
        assert_eq!(attach_prompt("", "", "Once upon", "Once upon"), "Once upon");
    }
}
