use crate::error::InferenceError;
use crate::models::HeadlineClassifier;
use serde::Serialize;
use std::fmt;

pub const REAL_LABEL: &str = "LABEL_0";
pub const FAKE_LABEL: &str = "LABEL_1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum VerdictLabel { Real, Fake }

impl VerdictLabel {
    /// Raw classifier labels other than the two trained classes are rejected.
    pub fn from_raw(raw: &str) -> Result<Self, InferenceError> {
        match raw {
            REAL_LABEL => Ok(VerdictLabel::Real),
            FAKE_LABEL => Ok(VerdictLabel::Fake),
            other => Err(InferenceError::UnrecognizedLabel(other.to_string())),
        }
    }
}

impl fmt::Display for VerdictLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self { VerdictLabel::Real => "REAL", VerdictLabel::Fake => "FAKE" })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Verdict {
    pub label: VerdictLabel,
    pub confidence: f32,
}

impl Verdict {
    /// `REAL News (Confidence: 0.87)`
    pub fn display(&self) -> String {
        format!("{} News (Confidence: {:.2})", self.label, self.confidence)
    }
}

pub fn detect(headline: &str, classifier: &dyn HeadlineClassifier) -> Result<Verdict, InferenceError> {
    let predictions = classifier.classify(headline)?;
    let top = predictions.into_iter()
        .max_by(|a, b| a.score.partial_cmp(&b.score).unwrap_or(std::cmp::Ordering::Equal))
        .ok_or(InferenceError::NoPrediction)?;
    if !(0.0..=1.0).contains(&top.score) {
        return Err(InferenceError::ConfidenceOutOfRange(top.score));
    }
    let label = VerdictLabel::from_raw(&top.label)?;
    Ok(Verdict { label, confidence: top.score })
}
