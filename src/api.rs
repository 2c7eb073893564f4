use crate::error::{ClassifyError, GENERIC_CLASSIFY_FAILURE, GENERIC_HTTP_FAILURE};
use axum::body::Bytes;
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const CLASSIFY_PATH: &str = "api/classify";
pub const HEALTH_PATH: &str = "api/health";
/// Multipart field carrying the image.
pub const IMAGE_FIELD: &str = "image";

#[derive(Serialize, Deserialize, Default, Debug, Clone, PartialEq)]
pub struct ClassifyResponse {
    /// True if successful.
    pub success: bool,
    /// A human readable description of the failure.
    pub message: Option<String>,
    /// Short error tag if success was false.
    pub error: Option<String>,
    /// Extra context the backend attaches to failures.
    pub details: Option<String>,

    /// Index into the severity taxonomy.
    pub predicted_class: Option<i64>,
    pub class_name: Option<String>,
    pub class_label: Option<String>,
    /// Probability of the predicted class.
    pub confidence: Option<f64>,
    pub confidence_level: Option<String>,

    /// Mean standard deviation over the Monte Carlo passes.
    pub uncertainty: Option<f64>,
    pub class_uncertainty: Option<f64>,
    pub predictive_entropy: Option<f64>,
    pub uncertainty_level: Option<String>,
    pub reliable_prediction: Option<bool>,

    /// Per class mean probability, taxonomy order.
    pub probabilities: Option<Vec<f64>>,
    pub std_deviations: Option<Vec<f64>>,
    pub class_names: Option<Vec<String>>,
    pub n_iterations: Option<u32>,

    pub explanation: Option<String>,
    pub filename: Option<String>,
    pub file_size_kb: Option<f64>,
}

/// A successful classification with every required field present.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ClassificationResult {
    pub predicted_class: i64,
    pub confidence: f64,
    pub probabilities: Vec<f64>,
    pub uncertainty: Option<f64>,
    pub uncertainty_level: Option<String>,
    pub reliable_prediction: Option<bool>,
    pub confidence_level: Option<String>,
    pub explanation: Option<String>,
    pub n_iterations: Option<u32>,
}

impl TryFrom<ClassifyResponse> for ClassificationResult {
    type Error = ClassifyError;

    fn try_from(response: ClassifyResponse) -> Result<Self, Self::Error> {
        let missing = |field: &str| ClassifyError::BackendFailure {
            status: None,
            message: format!("Malformed response from server: missing {}", field),
        };

        Ok(ClassificationResult {
            predicted_class: response
                .predicted_class
                .ok_or_else(|| missing("predicted_class"))?,
            confidence: response.confidence.ok_or_else(|| missing("confidence"))?,
            probabilities: response
                .probabilities
                .ok_or_else(|| missing("probabilities"))?,
            uncertainty: response.uncertainty,
            uncertainty_level: response.uncertainty_level,
            reliable_prediction: response.reliable_prediction,
            confidence_level: response.confidence_level,
            explanation: response.explanation,
            n_iterations: response.n_iterations,
        })
    }
}

/// Raw HTTP outcome of a classification request.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpReply {
    pub status: u16,
    pub body: Bytes,
}

impl HttpReply {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Turns a reply into a result. A non-2xx status and `success: false` are treated alike.
pub fn interpret_reply(reply: &HttpReply) -> Result<ClassificationResult, ClassifyError> {
    let response = match serde_json::from_slice::<ClassifyResponse>(&reply.body) {
        Ok(response) => response,
        Err(e) => {
            debug!("Response body is not a classification payload: {}", e);
            let message = if reply.is_success() {
                "Malformed response from server".to_string()
            } else {
                loose_message(&reply.body)
                    .unwrap_or_else(|| format!("{} (HTTP {})", GENERIC_HTTP_FAILURE, reply.status))
            };
            return Err(ClassifyError::BackendFailure {
                status: Some(reply.status),
                message,
            });
        }
    };

    if !reply.is_success() || !response.success {
        let fallback = if reply.is_success() {
            GENERIC_CLASSIFY_FAILURE
        } else {
            GENERIC_HTTP_FAILURE
        };
        let message = response
            .message
            .or(response.error)
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| fallback.to_string());
        return Err(ClassifyError::BackendFailure {
            status: Some(reply.status),
            message,
        });
    }

    let result = ClassificationResult::try_from(response).map_err(|e| match e {
        ClassifyError::BackendFailure { message, .. } => ClassifyError::BackendFailure {
            status: Some(reply.status),
            message,
        },
        other => other,
    })?;
    Ok(result)
}

/// `message` or `error` from any JSON object, for error bodies that don't match
/// [`ClassifyResponse`] (proxies, framework error handlers).
fn loose_message(body: &[u8]) -> Option<String> {
    let value = serde_json::from_slice::<serde_json::Value>(body).ok()?;
    ["message", "error"]
        .iter()
        .filter_map(|key| value.get(key).and_then(|v| v.as_str()))
        .find(|m| !m.is_empty())
        .map(str::to_string)
}

#[derive(Serialize, Deserialize, Default, Debug, Clone, PartialEq)]
pub struct HealthResponse {
    pub status: String,
    pub model_loaded: Option<bool>,
    pub model_input_shape: Option<String>,
    pub model_output_shape: Option<String>,
    pub error: Option<String>,
}

impl HealthResponse {
    pub fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }
}
