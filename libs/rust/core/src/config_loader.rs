//! Layered service configuration: built-in defaults, an optional file named by
//! `NEWSDESK_CONFIG_FILE`, then `NEWSDESK__SECTION__KEY` environment variables.

use anyhow::Result;
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, Environment, File};
use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use std::path::PathBuf;

static CONFIG_VERSION: OnceCell<RwLock<Option<String>>> = OnceCell::new();

pub const DEFAULT_ENV_PREFIX: &str = "NEWSDESK";

#[derive(Debug, Clone)]
pub struct ConfigSources {
    pub file: Option<PathBuf>,
    pub env_prefix: String,
}

impl ConfigSources {
    pub fn from_env() -> Self {
        Self {
            file: std::env::var("NEWSDESK_CONFIG_FILE").ok().map(PathBuf::from),
            env_prefix: DEFAULT_ENV_PREFIX.to_string(),
        }
    }
}

pub fn load_config<T, F>(service: &str, defaults: F) -> Result<T>
where
    T: DeserializeOwned,
    F: FnOnce(ConfigBuilder<DefaultState>) -> Result<ConfigBuilder<DefaultState>, ConfigError>,
{
    load_config_with(service, &ConfigSources::from_env(), defaults)
}

pub fn load_config_with<T, F>(service: &str, sources: &ConfigSources, defaults: F) -> Result<T>
where
    T: DeserializeOwned,
    F: FnOnce(ConfigBuilder<DefaultState>) -> Result<ConfigBuilder<DefaultState>, ConfigError>,
{
    let mut builder = Config::builder()
        .set_default("service_name", service)?
        .set_default("log_level", "info")?;
    builder = defaults(builder)?;
    if let Some(file) = &sources.file {
        builder = builder.add_source(File::from(file.clone()).required(false));
    }
    builder = builder.add_source(
        Environment::with_prefix(&sources.env_prefix)
            .separator("__")
            .try_parsing(true),
    );
    let cfg = builder.build()?;
    let version = cfg.get_string("config_version").ok();
    let slot = CONFIG_VERSION.get_or_init(|| RwLock::new(None));
    *slot.write() = version;
    Ok(cfg.try_deserialize()?)
}

/// Version string of the most recently loaded configuration, if it declared one.
pub fn config_version() -> Option<String> {
    CONFIG_VERSION.get().and_then(|v| v.read().clone())
}
