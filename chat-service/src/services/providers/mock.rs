//! Mock pipeline for testing.

use super::{GenerationParams, PipelineError, TextPipeline};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// What the mock does when called.
#[derive(Debug, Clone)]
pub enum MockBehavior {
    /// Return the prompt followed by this continuation, the way a real
    /// pipeline echoes its input.
    Echo(String),
    /// Return this text verbatim, without the prompt in front.
    Fixed(String),
    /// Fail with an inference error.
    Fail(String),
    /// Return zero sequences.
    Empty,
    /// Panic inside the pipeline call.
    Panic,
}

/// Scripted pipeline that records how it was called.
pub struct MockPipeline {
    behavior: MockBehavior,
    calls: AtomicUsize,
    last_params: Mutex<Option<GenerationParams>>,
}

impl MockPipeline {
    pub fn new(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            calls: AtomicUsize::new(0),
            last_params: Mutex::new(None),
        }
    }

    /// Number of `generate` invocations so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Parameters of the most recent call.
    pub fn last_params(&self) -> Option<GenerationParams> {
        self.last_params
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl TextPipeline for MockPipeline {
    fn model_id(&self) -> &str {
        "mock-model"
    }

    fn generate(
        &self,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<Vec<String>, PipelineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self
            .last_params
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(params.clone());

        match &self.behavior {
            MockBehavior::Echo(continuation) => {
                Ok(vec![format!("{}{}", prompt, continuation); params.num_return_sequences])
            }
            MockBehavior::Fixed(text) => Ok(vec![text.clone(); params.num_return_sequences]),
            MockBehavior::Fail(reason) => Err(PipelineError::Inference(reason.clone())),
            MockBehavior::Empty => Ok(Vec::new()),
            MockBehavior::Panic => panic!("mock pipeline panicked"),
        }
    }
}
