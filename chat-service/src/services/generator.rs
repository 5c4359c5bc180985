//! Adapter between the HTTP layer and the text-generation pipeline.
//!
//! The model is loaded once at startup. If loading fails the generator stays
//! permanently unavailable and every call returns the load-failure message.
//! Pipeline errors and panics never escape: they are logged and reported as
//! [`GenerationOutcome::Failed`].

use super::metrics::record_generation;
use super::providers::candle::CandlePipeline;
use super::providers::{GenerationParams, PipelineError, TextPipeline};
use crate::config::ModelSettings;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

pub const MODEL_UNAVAILABLE_TEXT: &str = "Sorry, the language model failed to load.";
pub const GENERATION_FAILED_TEXT: &str =
    "An error occurred while generating a response from the model.";

/// Result of one generation call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationOutcome {
    /// Post-processed model output.
    Generated(String),
    /// No model is loaded.
    ModelUnavailable,
    /// The pipeline returned an error or panicked; details were logged.
    Failed,
}

impl GenerationOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            GenerationOutcome::Generated(_) => "generated",
            GenerationOutcome::ModelUnavailable => "model_unavailable",
            GenerationOutcome::Failed => "failed",
        }
    }

    /// Text shown to the user.
    pub fn into_text(self) -> String {
        match self {
            GenerationOutcome::Generated(text) => text,
            GenerationOutcome::ModelUnavailable => MODEL_UNAVAILABLE_TEXT.to_string(),
            GenerationOutcome::Failed => GENERATION_FAILED_TEXT.to_string(),
        }
    }
}

/// Process-wide text generator.
pub struct TextGenerator {
    pipeline: Option<Arc<dyn TextPipeline>>,
    params: GenerationParams,
}

impl TextGenerator {
    pub fn new(pipeline: Arc<dyn TextPipeline>) -> Self {
        Self {
            pipeline: Some(pipeline),
            params: GenerationParams::default(),
        }
    }

    /// A generator whose model failed to load.
    pub fn unavailable() -> Self {
        Self {
            pipeline: None,
            params: GenerationParams::default(),
        }
    }

    /// Load the configured model. Never fails: a load error or a panic in the
    /// loader is logged and yields an unavailable generator.
    ///
    /// Blocks on download and weight loading.
    pub fn load(settings: &ModelSettings) -> Self {
        Self::load_with(settings, |settings| {
            let pipeline = CandlePipeline::load(settings)?;
            tracing::info!(
                model = %settings.model_id,
                vocab_size = pipeline.vocab_size(),
                hidden_size = pipeline.hidden_size(),
                layers = pipeline.num_layers(),
                device = ?pipeline.device(),
                "Model weights ready"
            );
            let pipeline: Arc<dyn TextPipeline> = Arc::new(pipeline);
            Ok(pipeline)
        })
    }

    fn load_with<F>(settings: &ModelSettings, loader: F) -> Self
    where
        F: FnOnce(&ModelSettings) -> Result<Arc<dyn TextPipeline>, PipelineError>,
    {
        if !settings.enabled {
            tracing::warn!(
                model = %settings.model_id,
                "Model loading disabled by configuration"
            );
            return Self::unavailable();
        }

        tracing::info!(
            model = %settings.model_id,
            revision = %settings.revision,
            "Loading the language model. This will take a moment..."
        );
        let start = Instant::now();

        match panic::catch_unwind(AssertUnwindSafe(|| loader(settings))) {
            Ok(Ok(pipeline)) => {
                tracing::info!(
                    model = %settings.model_id,
                    elapsed = ?start.elapsed(),
                    "Model loaded successfully"
                );
                Self::new(pipeline)
            }
            Ok(Err(e)) => {
                tracing::error!(
                    model = %settings.model_id,
                    error = %e,
                    "An error occurred while loading the model"
                );
                Self::unavailable()
            }
            Err(payload) => {
                tracing::error!(
                    model = %settings.model_id,
                    panic = panic_message(payload.as_ref()),
                    "Model loader panicked"
                );
                Self::unavailable()
            }
        }
    }

    pub fn is_available(&self) -> bool {
        self.pipeline.is_some()
    }

    pub fn model_id(&self) -> Option<&str> {
        self.pipeline.as_deref().map(|p| p.model_id())
    }

    /// Continue `prompt`. Blocks until the pipeline finishes.
    pub fn generate(&self, prompt: &str) -> GenerationOutcome {
        let start = Instant::now();
        let outcome = self.run(prompt);
        record_generation(outcome.label(), start.elapsed().as_secs_f64());
        outcome
    }

    fn run(&self, prompt: &str) -> GenerationOutcome {
        let Some(pipeline) = &self.pipeline else {
            return GenerationOutcome::ModelUnavailable;
        };

        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            pipeline.generate(prompt, &self.params)
        }));
        let sequences = match result {
            Ok(sequences) => sequences,
            Err(payload) => {
                tracing::error!(
                    model = %pipeline.model_id(),
                    error_type = "panic",
                    panic = panic_message(payload.as_ref()),
                    "Pipeline panicked while generating a response"
                );
                return GenerationOutcome::Failed;
            }
        };

        let first = sequences.and_then(|sequences| {
            sequences
                .into_iter()
                .next()
                .ok_or(PipelineError::EmptyOutput)
        });

        match first {
            Ok(generated) => GenerationOutcome::Generated(strip_prompt(prompt, &generated)),
            Err(e) => {
                tracing::error!(
                    model = %pipeline.model_id(),
                    error_type = e.kind(),
                    error = %e,
                    "Error generating response"
                );
                GenerationOutcome::Failed
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

/// Drop an echoed prompt from the front of `generated` and trim whitespace.
pub fn strip_prompt(prompt: &str, generated: &str) -> String {
    generated
        .strip_prefix(prompt)
        .unwrap_or(generated)
        .trim()
        .to_string()
}
