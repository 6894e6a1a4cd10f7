//! Model handles used by the two flows.
//!
//! The flows only see the `HeadlineGenerator` and `HeadlineClassifier`
//! traits; `CandleModelSource` builds the real GPT-2 and DistilBERT backends
//! and `ModelRegistry` memoizes whatever a `ModelSource` produces.

use crate::error::InferenceError;
use serde::Serialize;
use std::sync::Arc;

pub mod distilbert;
pub mod gpt2;
pub mod registry;
pub mod sampling;
pub mod source;

pub use registry::{ModelRegistry, ModelSource};
pub use source::CandleModelSource;

/// Decoding parameters handed to `HeadlineGenerator::generate`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SamplingParams {
    /// Total sequence length including the prompt tokens.
    pub max_length: usize,
    pub num_return_sequences: usize,
    pub do_sample: bool,
    pub top_k: usize,
    pub seed: Option<u64>,
}

impl SamplingParams {
    /// Settings used for every headline: 35 tokens, one sample, top-k 50.
    pub const fn headline() -> Self {
        Self { max_length: 35, num_return_sequences: 1, do_sample: true, top_k: 50, seed: None }
    }

    pub fn with_seed(mut self, seed: Option<u64>) -> Self { self.seed = seed; self }
}

impl Default for SamplingParams { fn default() -> Self { Self::headline() } }

/// A tokenizer plus causal language model.
pub trait HeadlineGenerator: Send + Sync {
    fn encode(&self, text: &str) -> Result<Vec<u32>, InferenceError>;
    /// Returns `num_return_sequences` full sequences, prompt ids included.
    fn generate(&self, input_ids: &[u32], params: &SamplingParams) -> Result<Vec<Vec<u32>>, InferenceError>;
    fn decode(&self, ids: &[u32], skip_special_tokens: bool) -> Result<String, InferenceError>;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    pub label: String,
    pub score: f32,
}

/// A text classifier returning labels ordered by descending score.
pub trait HeadlineClassifier: Send + Sync {
    fn classify(&self, text: &str) -> Result<Vec<Prediction>, InferenceError>;
}

pub type GeneratorHandle = Arc<dyn HeadlineGenerator>;
pub type ClassifierHandle = Arc<dyn HeadlineClassifier>;
