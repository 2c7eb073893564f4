use crate::guard::Rejection;
use thiserror::Error;

pub const GENERIC_HTTP_FAILURE: &str = "An error occurred during classification";
pub const GENERIC_CLASSIFY_FAILURE: &str = "Classification failed";
pub const GENERIC_DISPLAY_FAILURE: &str = "The classification result could not be displayed";

/// Everything that can go wrong between selecting an image and showing its result.
///
/// The `Display` text is the message shown to the user. None of these are fatal,
/// the controller records them and stays usable.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClassifyError {
    #[error("{0}")]
    ValidationRejected(Rejection),

    #[error("Unable to connect to the server. Make sure the backend is running at {endpoint}")]
    TransportFailure { endpoint: String, reason: String },

    #[error("{message}")]
    BackendFailure {
        status: Option<u16>,
        message: String,
    },

    #[error("The classification result could not be displayed")]
    InterpretationFault { reason: String },
}

impl ClassifyError {
    pub fn kind(&self) -> &'static str {
        match self {
            ClassifyError::ValidationRejected(_) => "validation",
            ClassifyError::TransportFailure { .. } => "transport",
            ClassifyError::BackendFailure { .. } => "backend",
            ClassifyError::InterpretationFault { .. } => "interpretation",
        }
    }
}

impl From<Rejection> for ClassifyError {
    fn from(rejection: Rejection) -> Self {
        ClassifyError::ValidationRejected(rejection)
    }
}

/// The request did not produce a complete HTTP response.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("request to {endpoint} failed: {reason}")]
pub struct TransportError {
    pub endpoint: String,
    pub reason: String,
    /// Set when the status line arrived but the body could not be read.
    pub status: Option<u16>,
}

impl From<TransportError> for ClassifyError {
    fn from(err: TransportError) -> Self {
        match err.status {
            Some(status) => ClassifyError::BackendFailure {
                status: Some(status),
                message: format!("{} (HTTP {})", GENERIC_HTTP_FAILURE, status),
            },
            None => ClassifyError::TransportFailure {
                endpoint: err.endpoint,
                reason: err.reason,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_message_names_endpoint() {
        let err: ClassifyError = TransportError {
            endpoint: "http://localhost:5500".into(),
            reason: "connection refused".into(),
            status: None,
        }
        .into();
        assert_eq!(err.kind(), "transport");
        assert!(err.to_string().contains("http://localhost:5500"));
        assert!(!err.to_string().contains("connection refused"));
    }

    #[test]
    fn broken_body_after_status_is_a_backend_failure() {
        let err: ClassifyError = TransportError {
            endpoint: "http://localhost:5500".into(),
            reason: "error decoding response body".into(),
            status: Some(502),
        }
        .into();
        assert_eq!(err.kind(), "backend");
        assert_eq!(
            err,
            ClassifyError::BackendFailure {
                status: Some(502),
                message: "An error occurred during classification (HTTP 502)".into()
            }
        );
        assert!(!err.to_string().contains("Unable to connect"));
    }

    #[test]
    fn interpretation_fault_is_generic() {
        let err = ClassifyError::InterpretationFault {
            reason: "predicted_class 7".into(),
        };
        assert_eq!(err.to_string(), GENERIC_DISPLAY_FAILURE);
    }
}
