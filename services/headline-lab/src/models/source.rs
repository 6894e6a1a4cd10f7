use super::distilbert::DistilBertClassifier;
use super::gpt2::{Gpt2Config, Gpt2Generator, Gpt2Model};
use super::{ClassifierHandle, GeneratorHandle, ModelSource};
use crate::error::ModelLoadError;
use crate::settings::ModelSettings;
use candle_core::{DType, Device};
use candle_nn::VarBuilder;
use hf_hub::api::sync::Api;
use hf_hub::{Repo, RepoType};
use std::path::PathBuf;
use std::sync::Arc;
use tokenizers::Tokenizer;
use tracing::info;

/// Builds the real candle backends: the classifier from a local directory and
/// the generator from the Hugging Face Hub (or a local directory).
pub struct CandleModelSource {
    settings: ModelSettings,
    device: Device,
}

impl CandleModelSource {
    pub fn new(settings: ModelSettings) -> Result<Self, ModelLoadError> {
        let device = parse_device(&settings.device)?;
        Ok(Self { settings, device })
    }

    fn generator_files(&self) -> Result<GeneratorFiles, ModelLoadError> {
        let local = PathBuf::from(&self.settings.generator_repo);
        if local.is_dir() {
            let files = GeneratorFiles { config: local.join("config.json"), tokenizer: local.join("tokenizer.json"), weights: local.join("model.safetensors") };
            for p in [&files.config, &files.tokenizer, &files.weights] {
                if !p.exists() { return Err(ModelLoadError::MissingArtifact(p.clone())); }
            }
            return Ok(files);
        }
        info!(repo = %self.settings.generator_repo, revision = %self.settings.generator_revision, "fetching generator from hub");
        let api = Api::new().map_err(|e| ModelLoadError::Hub(e.to_string()))?;
        let repo = api.repo(Repo::with_revision(self.settings.generator_repo.clone(), RepoType::Model, self.settings.generator_revision.clone()));
        let get = |name: &str| repo.get(name).map_err(|e| ModelLoadError::Hub(format!("{name}: {e}")));
        Ok(GeneratorFiles { config: get("config.json")?, tokenizer: get("tokenizer.json")?, weights: get("model.safetensors")? })
    }
}

struct GeneratorFiles { config: PathBuf, tokenizer: PathBuf, weights: PathBuf }

impl ModelSource for CandleModelSource {
    fn load_classifier(&self) -> Result<ClassifierHandle, ModelLoadError> {
        let classifier = DistilBertClassifier::load_dir(&self.settings.classifier_dir, &self.device)?;
        Ok(Arc::new(classifier))
    }

    fn load_generator(&self) -> Result<GeneratorHandle, ModelLoadError> {
        let files = self.generator_files()?;
        let raw = std::fs::read_to_string(&files.config)?;
        let cfg: Gpt2Config = serde_json::from_str(&raw).map_err(|source| ModelLoadError::Config { path: files.config.clone(), source })?;
        let tokenizer = Tokenizer::from_file(&files.tokenizer).map_err(|e| ModelLoadError::Tokenizer(e.to_string()))?;
        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&[files.weights], DType::F32, &self.device)? };
        let model = Gpt2Model::load(vb, &cfg)?;
        let generator = Gpt2Generator::new(tokenizer, model);
        info!(eos = generator.eos_token_id(), pad = ?generator.pad_token_id(), "generator pad token bound to eos");
        Ok(Arc::new(generator))
    }
}

/// `cpu`, `cuda` or `cuda:N`.
pub fn parse_device(name: &str) -> Result<Device, ModelLoadError> {
    match name.trim().to_ascii_lowercase().as_str() {
        "cpu" => Ok(Device::Cpu),
        "cuda" => Ok(Device::new_cuda(0)?),
        other => match other.strip_prefix("cuda:").and_then(|n| n.parse::<usize>().ok()) {
            Some(ordinal) => Ok(Device::new_cuda(ordinal)?),
            None => Err(ModelLoadError::Device(name.to_string())),
        },
    }
}
