//! Runs the two flows for a session: input validation, the busy guard, the
//! blocking model call, and committing results to the session only on success.

use crate::detection::{detect, Verdict};
use crate::error::{InferenceError, ModelLoadError};
use crate::generation::generate_headline;
use crate::models::{ModelRegistry, SamplingParams};
use crate::session::{begin, Notice, NoticeLevel, SessionHandle, SessionState, SessionStore};
use newsdesk_core::record_flow;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{info, instrument, warn};

pub const EMPTY_PROMPT_WARNING: &str = "Please enter a prompt first.";
pub const EMPTY_HEADLINE_WARNING: &str = "Please enter a headline to analyze.";
pub const BUSY_WARNING: &str = "A request is already running for this session.";

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    Completed(T),
    /// Input failed validation; no model was invoked and no state changed.
    Warning(&'static str),
}

#[derive(Debug, Error)]
pub enum FlowError {
    #[error("{}", BUSY_WARNING)]
    Busy,
    #[error(transparent)]
    Inference(#[from] InferenceError),
    #[error(transparent)]
    Model(#[from] ModelLoadError),
}

pub struct HeadlineService {
    models: Arc<ModelRegistry>,
    sessions: SessionStore,
    sampling: SamplingParams,
}

impl HeadlineService {
    pub fn new(models: Arc<ModelRegistry>, sessions: SessionStore, sampling: SamplingParams) -> Self {
        Self { models, sessions, sampling }
    }

    pub fn sessions(&self) -> &SessionStore { &self.sessions }
    pub fn sampling(&self) -> &SamplingParams { &self.sampling }

    #[instrument(skip(self, session, prompt), fields(prompt_len = prompt.len()))]
    pub async fn generate(&self, session: &SessionHandle, prompt: &str) -> Result<Outcome<String>, FlowError> {
        if prompt.is_empty() {
            session.lock().push_notice(Notice::new(NoticeLevel::Warning, EMPTY_PROMPT_WARNING));
            record_flow("generate", "skipped", 0.0);
            return Ok(Outcome::Warning(EMPTY_PROMPT_WARNING));
        }
        let Some(_busy) = begin(session, SessionState::Generating) else {
            session.lock().push_notice(Notice::new(NoticeLevel::Warning, BUSY_WARNING));
            record_flow("generate", "busy", 0.0);
            return Err(FlowError::Busy);
        };
        session.lock().last_prompt = prompt.to_string();
        let start = Instant::now();
        let res = self.run_generation(prompt).await;
        let ms = start.elapsed().as_secs_f64() * 1000.0;
        let mut s = session.lock();
        match res {
            Ok(headline) => {
                record_flow("generate", "ok", ms);
                info!(took_ms = ms, headline_len = headline.len(), "headline generated");
                s.current_headline = headline.clone();
                s.last_generated = Some(headline.clone());
                Ok(Outcome::Completed(headline))
            }
            Err(e) => {
                record_flow("generate", "error", ms);
                warn!(error = %e, "generation failed");
                s.push_notice(Notice::new(NoticeLevel::Error, format!("Generation failed: {e}")));
                Err(e)
            }
        }
    }

    #[instrument(skip(self, session, headline), fields(headline_len = headline.len()))]
    pub async fn analyze(&self, session: &SessionHandle, headline: &str) -> Result<Outcome<Verdict>, FlowError> {
        if headline.is_empty() {
            session.lock().push_notice(Notice::new(NoticeLevel::Warning, EMPTY_HEADLINE_WARNING));
            record_flow("detect", "skipped", 0.0);
            return Ok(Outcome::Warning(EMPTY_HEADLINE_WARNING));
        }
        let Some(_busy) = begin(session, SessionState::Detecting) else {
            session.lock().push_notice(Notice::new(NoticeLevel::Warning, BUSY_WARNING));
            record_flow("detect", "busy", 0.0);
            return Err(FlowError::Busy);
        };
        // the text being analyzed becomes the current headline (direct user edit wins)
        session.lock().current_headline = headline.to_string();
        let start = Instant::now();
        let res = self.run_detection(headline).await;
        let ms = start.elapsed().as_secs_f64() * 1000.0;
        let mut s = session.lock();
        match res {
            Ok(verdict) => {
                record_flow("detect", "ok", ms);
                info!(took_ms = ms, label = %verdict.label, confidence = verdict.confidence, "headline analyzed");
                s.last_verdict = Some(verdict.clone());
                Ok(Outcome::Completed(verdict))
            }
            Err(e) => {
                record_flow("detect", "error", ms);
                warn!(error = %e, "detection failed");
                s.last_verdict = None;
                s.push_notice(Notice::new(NoticeLevel::Error, format!("Analysis failed: {e}")));
                Err(e)
            }
        }
    }

    // Registry access stays on the blocking pool: a first access loads weights.
    async fn run_generation(&self, prompt: &str) -> Result<String, FlowError> {
        let models = self.models.clone();
        let prompt = prompt.to_string();
        let params = self.sampling.clone();
        tokio::task::spawn_blocking(move || -> Result<String, FlowError> {
            let generator = models.generator()?;
            Ok(generate_headline(&prompt, generator.as_ref(), &params)?)
        })
        .await
        .map_err(|e| InferenceError::Task(e.to_string()))?
    }

    async fn run_detection(&self, headline: &str) -> Result<Verdict, FlowError> {
        let models = self.models.clone();
        let headline = headline.to_string();
        tokio::task::spawn_blocking(move || -> Result<Verdict, FlowError> {
            let classifier = models.classifier()?;
            Ok(detect(&headline, classifier.as_ref())?)
        })
        .await
        .map_err(|e| InferenceError::Task(e.to_string()))?
    }
}
