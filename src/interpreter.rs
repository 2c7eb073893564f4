use crate::{
    api::ClassificationResult,
    error::ClassifyError,
    taxonomy::{severity_class, SeverityClass, Tone, CLASS_COUNT, SEVERITY_CLASSES},
};
use serde::Serialize;

const NOT_AVAILABLE: &str = "N/A";

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
pub enum Reliability {
    Reliable,
    NeedsVerification,
    /// The backend did not say. No badge is shown.
    Unknown,
}

impl Reliability {
    pub fn badge(&self) -> Option<&'static str> {
        match self {
            Reliability::Reliable => Some("Reliable prediction"),
            Reliability::NeedsVerification => Some("Prediction needs verification"),
            Reliability::Unknown => None,
        }
    }
}

impl From<Option<bool>> for Reliability {
    fn from(value: Option<bool>) -> Self {
        match value {
            Some(true) => Reliability::Reliable,
            Some(false) => Reliability::NeedsVerification,
            None => Reliability::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProbabilityBar {
    pub label: &'static str,
    #[serde(skip)]
    pub tone: Tone,
    pub probability: f64,
    pub percent_text: String,
    /// Fraction of the bar to fill, within [0, 1].
    pub fill: f64,
}

/// Display ready view of a classification.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DisplayRecord {
    #[serde(skip)]
    pub class: &'static SeverityClass,
    pub label: &'static str,
    pub description: &'static str,
    pub confidence_text: String,
    pub confidence_level: Option<String>,
    pub reliability: Reliability,
    pub uncertainty_text: String,
    pub uncertainty_level: String,
    /// One bar per taxonomy entry, in taxonomy order.
    pub bars: Vec<ProbabilityBar>,
    pub explanation: Option<String>,
}

pub fn percent(value: f64) -> String {
    format!("{:.1}%", value * 100.0)
}

pub fn interpret(result: &ClassificationResult) -> Result<DisplayRecord, ClassifyError> {
    let class = usize::try_from(result.predicted_class)
        .ok()
        .and_then(severity_class)
        .ok_or_else(|| ClassifyError::InterpretationFault {
            reason: format!("predicted_class {} is outside the taxonomy", result.predicted_class),
        })?;

    if result.probabilities.len() != CLASS_COUNT {
        return Err(ClassifyError::InterpretationFault {
            reason: format!(
                "expected {} probabilities, got {}",
                CLASS_COUNT,
                result.probabilities.len()
            ),
        });
    }

    let bars = SEVERITY_CLASSES
        .iter()
        .zip(result.probabilities.iter())
        .map(|(class, &probability)| ProbabilityBar {
            label: class.label,
            tone: class.tone,
            probability,
            percent_text: percent(probability),
            fill: if probability.is_finite() {
                probability.clamp(0.0, 1.0)
            } else {
                0.0
            },
        })
        .collect();

    Ok(DisplayRecord {
        class,
        label: class.label,
        description: class.description,
        confidence_text: percent(result.confidence),
        confidence_level: result.confidence_level.clone(),
        reliability: result.reliable_prediction.into(),
        uncertainty_text: result
            .uncertainty
            .map(|u| format!("{:.4}", u))
            .unwrap_or_else(|| NOT_AVAILABLE.to_string()),
        uncertainty_level: result
            .uncertainty_level
            .clone()
            .filter(|level| !level.is_empty())
            .unwrap_or_else(|| NOT_AVAILABLE.to_string()),
        bars,
        explanation: result.explanation.clone(),
    })
}
