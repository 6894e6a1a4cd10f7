use super::{ClassifierHandle, GeneratorHandle};
use crate::error::ModelLoadError;
use once_cell::sync::OnceCell;
use std::time::Instant;
use tracing::{error, info};

/// Produces fresh model handles. Called at most once per model by `ModelRegistry`.
pub trait ModelSource: Send + Sync {
    fn load_classifier(&self) -> Result<ClassifierHandle, ModelLoadError>;
    fn load_generator(&self) -> Result<GeneratorHandle, ModelLoadError>;
}

/// Process-wide memo of the two model handles. Concurrent first callers block
/// until the single in-flight load finishes; a failed load is not cached.
pub struct ModelRegistry {
    source: Box<dyn ModelSource>,
    classifier: OnceCell<ClassifierHandle>,
    generator: OnceCell<GeneratorHandle>,
}

impl ModelRegistry {
    pub fn new(source: Box<dyn ModelSource>) -> Self {
        Self { source, classifier: OnceCell::new(), generator: OnceCell::new() }
    }

    pub fn classifier(&self) -> Result<ClassifierHandle, ModelLoadError> {
        self.classifier.get_or_try_init(|| timed_load("classifier", || self.source.load_classifier())).cloned()
    }

    pub fn generator(&self) -> Result<GeneratorHandle, ModelLoadError> {
        self.generator.get_or_try_init(|| timed_load("generator", || self.source.load_generator())).cloned()
    }

    /// Loads both handles; used at startup so the first request does not pay for it.
    pub fn preload(&self) -> Result<(), ModelLoadError> {
        self.classifier()?;
        self.generator()?;
        Ok(())
    }

    pub fn is_loaded(&self) -> bool { self.classifier.get().is_some() && self.generator.get().is_some() }
}

fn timed_load<T>(model: &str, load: impl FnOnce() -> Result<T, ModelLoadError>) -> Result<T, ModelLoadError> {
    let start = Instant::now();
    let res = load();
    let ms = start.elapsed().as_secs_f64() * 1000.0;
    newsdesk_core::record_model_load(model, res.is_ok(), ms);
    match &res {
        Ok(_) => info!(model, took_ms = ms, "model loaded"),
        Err(e) => error!(model, error = %e, "model load failed"),
    }
    res
}
