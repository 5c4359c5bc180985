//! Text-generation pipeline abstraction and implementations.
//!
//! A pipeline owns a loaded model and turns a prompt into one or more
//! generated sequences. The adapter in `services::generator` is the only
//! caller; HTTP code never touches a pipeline directly.

pub mod candle;
pub mod mock;

use thiserror::Error;

/// Error type for pipeline operations.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Model load failed: {0}")]
    Load(String),

    #[error("Tokenization failed: {0}")]
    Tokenization(String),

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Pipeline returned no sequences")]
    EmptyOutput,

    #[error("Unsupported: {0}")]
    Unsupported(String),
}

impl PipelineError {
    /// Short label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Load(_) => "load",
            PipelineError::Tokenization(_) => "tokenization",
            PipelineError::Inference(_) => "inference",
            PipelineError::EmptyOutput => "empty_output",
            PipelineError::Unsupported(_) => "unsupported",
        }
    }
}

impl From<candle_core::Error> for PipelineError {
    fn from(err: candle_core::Error) -> Self {
        PipelineError::Inference(err.to_string())
    }
}

/// Sampling configuration for one generation call.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationParams {
    /// Sample from the distribution; greedy decoding when false.
    pub do_sample: bool,

    pub temperature: f64,

    /// Upper bound on tokens generated after the prompt.
    pub max_new_tokens: usize,

    pub num_return_sequences: usize,

    /// Fixed RNG seed; a fresh random seed per call when `None`.
    pub seed: Option<u64>,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            do_sample: true,
            temperature: 0.7,
            max_new_tokens: 50,
            num_return_sequences: 1,
            seed: None,
        }
    }
}

/// A loaded text-generation model.
///
/// Implementations are shared read-only across requests, so `generate` takes
/// `&self` and keeps all per-call state (KV cache, sampler) on the stack.
/// Calls block the current thread until generation finishes.
pub trait TextPipeline: Send + Sync {
    /// Identifier of the loaded model.
    fn model_id(&self) -> &str;

    /// Generate `params.num_return_sequences` texts. Each text is the prompt
    /// followed by its continuation.
    fn generate(&self, prompt: &str, params: &GenerationParams)
        -> Result<Vec<String>, PipelineError>;
}
