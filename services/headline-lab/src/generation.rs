use crate::error::InferenceError;
use crate::models::{HeadlineGenerator, SamplingParams};
use tracing::debug;

/// Encode, sample, decode and reduce the output to one headline line.
pub fn generate_headline(prompt: &str, generator: &dyn HeadlineGenerator, params: &SamplingParams) -> Result<String, InferenceError> {
    let input_ids = generator.encode(prompt)?;
    let sequences = generator.generate(&input_ids, params)?;
    let first = sequences.first().ok_or(InferenceError::EmptyGeneration)?;
    let text = generator.decode(first, true)?;
    debug!(prompt_tokens = input_ids.len(), total_tokens = first.len(), "headline sampled");
    Ok(extract_headline(&text, prompt))
}

/// Drops the echoed prompt, keeps the first line, trims it. The result never
/// contains a line break and never starts with the prompt.
pub fn extract_headline(generated: &str, prompt: &str) -> String {
    if prompt.is_empty() {
        return first_line(generated).trim().to_string();
    }
    let without_prompt = generated.replace(prompt, "");
    let mut line = first_line(&without_prompt).trim();
    while let Some(rest) = line.strip_prefix(prompt) {
        line = rest.trim();
    }
    line.to_string()
}

fn first_line(s: &str) -> &str {
    s.split(['\n', '\r']).next().unwrap_or("")
}
