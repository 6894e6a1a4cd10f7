use std::path::PathBuf;
use thiserror::Error;

/// Startup failure while checking or rewriting the classifier's `config.json`.
#[derive(Debug, Error)]
pub enum ConfigRepairError {
    #[error("model config {path} could not be read: {source}")]
    Read { path: PathBuf, #[source] source: std::io::Error },
    #[error("model config {path} is not valid JSON: {source}")]
    Parse { path: PathBuf, #[source] source: serde_json::Error },
    #[error("model config {path} must hold a JSON object at the top level")]
    NotAnObject { path: PathBuf },
    #[error("model config {path} could not be serialized: {source}")]
    Serialize { path: PathBuf, #[source] source: serde_json::Error },
    #[error("model config {path} could not be written: {source}")]
    Write { path: PathBuf, #[source] source: std::io::Error },
    #[error("model config {path} declares model_type {found:?}, expected {expected:?}")]
    ArchitectureMismatch { path: PathBuf, found: Option<String>, expected: String },
}

/// Startup failure while constructing a model handle.
#[derive(Debug, Error)]
pub enum ModelLoadError {
    #[error("missing model artifact {0}")]
    MissingArtifact(PathBuf),
    #[error("unsupported architecture {found:?}, supported: {supported:?}")]
    UnsupportedArchitecture { found: Option<String>, supported: &'static [&'static str] },
    #[error("invalid model config {path}: {source}")]
    Config { path: PathBuf, #[source] source: serde_json::Error },
    #[error("tokenizer load failed: {0}")]
    Tokenizer(String),
    #[error("model hub error: {0}")]
    Hub(String),
    #[error("unknown device {0:?}")]
    Device(String),
    #[error("tensor error: {0}")]
    Tensor(#[from] candle_core::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure of a single generation or detection call. Never fatal to the process.
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("tokenization failed: {0}")]
    Tokenize(String),
    #[error("decoding failed: {0}")]
    Decode(String),
    #[error("tensor error: {0}")]
    Tensor(#[from] candle_core::Error),
    #[error("sampling failed: {0}")]
    Sampling(String),
    #[error("generator returned no sequences")]
    EmptyGeneration,
    #[error("classifier returned no predictions")]
    NoPrediction,
    #[error("classifier returned unrecognized label {0:?}")]
    UnrecognizedLabel(String),
    #[error("confidence {0} outside [0, 1]")]
    ConfidenceOutOfRange(f32),
    #[error("inference task failed: {0}")]
    Task(String),
}
