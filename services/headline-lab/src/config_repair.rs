//! Startup check of the classifier's `config.json` architecture tag.
//!
//! The fine-tuned classifier directory ships without a `model_type` field, which
//! the loader needs to pick the DistilBERT implementation and weight prefix.
//! In repair mode the field is set (insert or overwrite) and the document is
//! written back with 2-space indentation keeping the existing key order. In
//! validate mode nothing is written and a missing or different tag is an error.

use crate::error::ConfigRepairError;
use serde_json::{Map, Value};
use std::path::Path;
use tracing::{info, warn};

pub const ARCHITECTURE_FIELD: &str = "model_type";
pub const DISTILBERT_TAG: &str = "distilbert";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairMode { Repair, ValidateOnly }

impl RepairMode {
    pub fn from_flag(repair: bool) -> Self { if repair { RepairMode::Repair } else { RepairMode::ValidateOnly } }
    pub fn as_str(&self) -> &'static str { match self { RepairMode::Repair => "repair", RepairMode::ValidateOnly => "validate" } }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepairReport {
    pub mode: RepairMode,
    /// Tag found before the step ran.
    pub previous: Option<String>,
}

impl RepairReport {
    pub fn changed(&self, tag: &str) -> bool { self.mode == RepairMode::Repair && self.previous.as_deref() != Some(tag) }

    /// Operator-facing confirmation shown once on the page.
    pub fn notice(&self) -> String {
        match self.mode {
            RepairMode::Repair => "Successfully fixed the configuration file!".to_string(),
            RepairMode::ValidateOnly => "Model configuration verified.".to_string(),
        }
    }
}

pub fn ensure_model_config(path: &Path, tag: &str, mode: RepairMode) -> Result<RepairReport, ConfigRepairError> {
    let res = match mode {
        RepairMode::Repair => repair_model_config(path, tag),
        RepairMode::ValidateOnly => validate_model_config(path, tag),
    };
    newsdesk_core::record_config_repair(mode.as_str(), res.is_ok());
    let previous = res?;
    let report = RepairReport { mode, previous };
    if report.changed(tag) {
        info!(path = %path.display(), previous = ?report.previous, tag, "model config architecture tag rewritten");
    } else {
        info!(path = %path.display(), tag, mode = mode.as_str(), "model config architecture tag ok");
    }
    Ok(report)
}

/// Sets `model_type` to `tag` and rewrites the file. Returns the previous tag.
pub fn repair_model_config(path: &Path, tag: &str) -> Result<Option<String>, ConfigRepairError> {
    let mut doc = read_document(path)?;
    let previous = doc.get(ARCHITECTURE_FIELD).and_then(Value::as_str).map(str::to_string);
    doc.insert(ARCHITECTURE_FIELD.to_string(), Value::String(tag.to_string()));
    let text = serde_json::to_string_pretty(&Value::Object(doc))
        .map_err(|source| ConfigRepairError::Serialize { path: path.to_path_buf(), source })?;
    std::fs::write(path, text).map_err(|source| ConfigRepairError::Write { path: path.to_path_buf(), source })?;
    Ok(previous)
}

/// Checks `model_type` without writing. Returns the tag found.
pub fn validate_model_config(path: &Path, tag: &str) -> Result<Option<String>, ConfigRepairError> {
    let doc = read_document(path)?;
    let found = doc.get(ARCHITECTURE_FIELD).and_then(Value::as_str).map(str::to_string);
    if found.as_deref() != Some(tag) {
        warn!(path = %path.display(), ?found, expected = tag, "model config architecture tag mismatch");
        return Err(ConfigRepairError::ArchitectureMismatch { path: path.to_path_buf(), found, expected: tag.to_string() });
    }
    Ok(found)
}

fn read_document(path: &Path) -> Result<Map<String, Value>, ConfigRepairError> {
    let raw = std::fs::read(path).map_err(|source| ConfigRepairError::Read { path: path.to_path_buf(), source })?;
    match serde_json::from_slice::<Value>(&raw) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(ConfigRepairError::NotAnObject { path: path.to_path_buf() }),
        Err(source) => Err(ConfigRepairError::Parse { path: path.to_path_buf(), source }),
    }
}
