//! DistilBERT sequence classifier: the candle encoder plus the
//! `pre_classifier -> relu -> classifier` head applied to the first token.

use super::{HeadlineClassifier, Prediction};
use crate::config_repair::DISTILBERT_TAG;
use crate::error::{InferenceError, ModelLoadError};
use candle_core::{DType, Device, IndexOp, Module, Tensor};
use candle_nn::{linear, Linear, VarBuilder};
use candle_transformers::models::distilbert::{Config as DistilBertConfig, DistilBertModel};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use tokenizers::Tokenizer;

pub const SUPPORTED_ARCHITECTURES: &[&str] = &[DISTILBERT_TAG];

/// Fields of `config.json` the classification head needs beyond the encoder config.
#[derive(Debug, Clone, Deserialize)]
pub struct ClassifierConfig {
    pub dim: usize,
    #[serde(default = "default_max_positions")]
    pub max_position_embeddings: usize,
    #[serde(default)]
    pub model_type: Option<String>,
    #[serde(default)]
    pub id2label: BTreeMap<String, String>,
}

fn default_max_positions() -> usize { 512 }

impl ClassifierConfig {
    /// Labels ordered by class index; defaults to `LABEL_0`, `LABEL_1`.
    pub fn labels(&self) -> Vec<String> {
        if self.id2label.is_empty() { return vec!["LABEL_0".to_string(), "LABEL_1".to_string()]; }
        let mut pairs: Vec<(usize, &String)> = self.id2label.iter()
            .filter_map(|(k, v)| k.parse::<usize>().ok().map(|i| (i, v)))
            .collect();
        pairs.sort_by_key(|(i, _)| *i);
        pairs.into_iter().map(|(_, v)| v.clone()).collect()
    }

    pub fn check_architecture(&self) -> Result<(), ModelLoadError> {
        match self.model_type.as_deref() {
            Some(t) if SUPPORTED_ARCHITECTURES.contains(&t) => Ok(()),
            other => Err(ModelLoadError::UnsupportedArchitecture { found: other.map(str::to_string), supported: SUPPORTED_ARCHITECTURES }),
        }
    }
}

pub struct DistilBertClassifier {
    tokenizer: Tokenizer,
    encoder: DistilBertModel,
    pre_classifier: Linear,
    classifier: Linear,
    labels: Vec<String>,
    max_len: usize,
    device: Device,
}

impl DistilBertClassifier {
    /// Loads `config.json`, `tokenizer.json` and `model.safetensors` from `dir`.
    pub fn load_dir(dir: &Path, device: &Device) -> Result<Self, ModelLoadError> {
        let config_path = dir.join("config.json");
        let tokenizer_path = dir.join("tokenizer.json");
        let weights_path = dir.join("model.safetensors");
        for p in [&config_path, &tokenizer_path, &weights_path] {
            if !p.exists() { return Err(ModelLoadError::MissingArtifact(p.clone())); }
        }
        let raw = std::fs::read_to_string(&config_path)?;
        let head_cfg: ClassifierConfig = serde_json::from_str(&raw)
            .map_err(|source| ModelLoadError::Config { path: config_path.clone(), source })?;
        head_cfg.check_architecture()?;
        let encoder_cfg: DistilBertConfig = serde_json::from_str(&raw)
            .map_err(|source| ModelLoadError::Config { path: config_path.clone(), source })?;
        let tokenizer = Tokenizer::from_file(&tokenizer_path).map_err(|e| ModelLoadError::Tokenizer(e.to_string()))?;
        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&[weights_path], DType::F32, device)? };
        Self::new(tokenizer, vb, &encoder_cfg, &head_cfg)
    }

    pub fn new(tokenizer: Tokenizer, vb: VarBuilder, encoder_cfg: &DistilBertConfig, head_cfg: &ClassifierConfig) -> Result<Self, ModelLoadError> {
        let labels = head_cfg.labels();
        let prefix = head_cfg.model_type.as_deref().unwrap_or(DISTILBERT_TAG);
        let encoder_vb = if vb.contains_tensor(&format!("{prefix}.embeddings.word_embeddings.weight")) { vb.pp(prefix) } else { vb.clone() };
        let encoder = DistilBertModel::load(encoder_vb, encoder_cfg)?;
        let pre_classifier = linear(head_cfg.dim, head_cfg.dim, vb.pp("pre_classifier"))?;
        let classifier = linear(head_cfg.dim, labels.len(), vb.pp("classifier"))?;
        tracing::debug!(labels = ?labels, prefix, "distilbert classifier assembled");
        Ok(Self { tokenizer, encoder, pre_classifier, classifier, labels, max_len: head_cfg.max_position_embeddings, device: vb.device().clone() })
    }

    /// Class probabilities for one unpadded sequence.
    fn probabilities(&self, ids: &[u32]) -> candle_core::Result<Vec<f32>> {
        let t = ids.len();
        let input = Tensor::new(ids, &self.device)?.unsqueeze(0)?;
        // nothing is masked for a single unpadded sequence
        let mask = Tensor::zeros((t, t), DType::U8, &self.device)?;
        let hidden = self.encoder.forward(&input, &mask)?;
        let cls = hidden.i((.., 0))?;
        let xs = self.pre_classifier.forward(&cls)?.relu()?;
        let logits = self.classifier.forward(&xs)?;
        candle_nn::ops::softmax_last_dim(&logits)?.squeeze(0)?.to_dtype(DType::F32)?.to_vec1::<f32>()
    }
}

impl HeadlineClassifier for DistilBertClassifier {
    fn classify(&self, text: &str) -> Result<Vec<Prediction>, InferenceError> {
        let enc = self.tokenizer.encode(text, true).map_err(|e| InferenceError::Tokenize(e.to_string()))?;
        let ids = truncate_keeping_last(enc.get_ids().to_vec(), self.max_len);
        let probs = self.probabilities(&ids)?;
        Ok(rank(&self.labels, &probs))
    }
}

/// Cuts `ids` to `max_len`, keeping the final (separator) token in place.
pub fn truncate_keeping_last(mut ids: Vec<u32>, max_len: usize) -> Vec<u32> {
    if max_len == 0 || ids.len() <= max_len { return ids; }
    let last = ids[ids.len() - 1];
    ids.truncate(max_len);
    ids[max_len - 1] = last;
    ids
}

/// Pairs labels with probabilities, highest first. Unnamed classes get `LABEL_{i}`.
pub fn rank(labels: &[String], probs: &[f32]) -> Vec<Prediction> {
    let mut out: Vec<Prediction> = probs.iter().enumerate()
        .map(|(i, p)| Prediction { label: labels.get(i).cloned().unwrap_or_else(|| format!("LABEL_{i}")), score: *p })
        .collect();
    out.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    out
}
