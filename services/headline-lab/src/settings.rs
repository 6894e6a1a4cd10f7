use anyhow::Result;
use config::builder::DefaultState;
use config::{ConfigBuilder, ConfigError};
use newsdesk_core::{load_config, load_config_with, ConfigSources};
use serde::Deserialize;
use std::path::PathBuf;

pub const SERVICE_NAME: &str = "headline-lab";

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub service_name: String,
    pub log_level: String,
    pub http_port: u16,
    pub health_port: u16,
    #[serde(default)]
    pub config_version: Option<String>,
    pub model: ModelSettings,
    #[serde(default)]
    pub generation: GenerationSettings,
    pub session: SessionSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelSettings {
    /// Directory holding the fine-tuned classifier's config, weights and tokenizer.
    pub classifier_dir: PathBuf,
    pub architecture_tag: String,
    /// Rewrite the architecture tag at startup; when false the tag is only checked.
    pub repair_config: bool,
    /// Hub repo id or a local directory with GPT-2 style artifacts.
    pub generator_repo: String,
    pub generator_revision: String,
    pub device: String,
}

impl ModelSettings {
    pub fn classifier_config_path(&self) -> PathBuf { self.classifier_dir.join("config.json") }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GenerationSettings {
    #[serde(default)]
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionSettings {
    pub ttl_secs: u64,
    pub default_headline: String,
    pub default_prompt: String,
}

fn defaults(b: ConfigBuilder<DefaultState>) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    b.set_default("http_port", 8501_i64)?
        .set_default("health_port", 9091_i64)?
        .set_default("model.classifier_dir", "my_fake_news_detector")?
        .set_default("model.architecture_tag", crate::config_repair::DISTILBERT_TAG)?
        .set_default("model.repair_config", true)?
        .set_default("model.generator_repo", "gpt2")?
        .set_default("model.generator_revision", "main")?
        .set_default("model.device", "cpu")?
        .set_default("session.ttl_secs", 3600_i64)?
        .set_default("session.default_headline", "The stock market closed with a 2% gain today.")?
        .set_default("session.default_prompt", "In a surprising turn of events,")
}

impl Settings {
    pub fn load() -> Result<Self> { load_config(SERVICE_NAME, defaults) }

    pub fn load_from(sources: &ConfigSources) -> Result<Self> { load_config_with(SERVICE_NAME, sources, defaults) }
}
