//! A stand-in for the classification backend, speaking the same JSON contract.
//! Useful for demos of the client and for integration tests.

use crate::{
    api::{ClassifyResponse, HealthResponse, IMAGE_FIELD},
    taxonomy::{severity_class, CLASS_COUNT, SEVERITY_CLASSES},
};
use axum::{
    body::{self, Body},
    extract::{DefaultBodyLimit, Multipart, State},
    http::{Request, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use std::{
    net::{Ipv4Addr, SocketAddr},
    sync::Arc,
    time::Duration,
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const MEGABYTE: usize = 1024 * 1024; // 1 MB = 1024 * 1024 bytes
const THIRTY_MEGABYTES: usize = 30 * MEGABYTE; // 30 MB in bytes
const MONTE_CARLO_ITERATIONS: u32 = 30;

#[derive(Clone, Debug)]
pub struct StubConfig {
    pub predicted_class: usize,
    pub confidence: f64,
    pub uncertainty: f64,
    /// Answer every classification with a 500.
    pub fail: bool,
    /// Simulated inference time.
    pub delay: Duration,
}

impl Default for StubConfig {
    fn default() -> Self {
        Self {
            predicted_class: 0,
            confidence: 0.97,
            uncertainty: 0.012,
            fail: false,
            delay: Duration::ZERO,
        }
    }
}

fn uncertainty_level(uncertainty: f64) -> String {
    let level = if uncertainty <= 0.05 {
        "Low"
    } else if uncertainty <= 0.10 {
        "Medium"
    } else {
        "High"
    };
    level.to_string()
}

fn confidence_level(confidence: f64) -> String {
    let level = if confidence >= 0.8 {
        "High"
    } else if confidence >= 0.6 {
        "Medium"
    } else {
        "Low"
    };
    level.to_string()
}

impl StubConfig {
    /// Builds the payload the backend would return for this configuration.
    pub fn response(&self, filename: &str, size: usize) -> ClassifyResponse {
        let class = severity_class(self.predicted_class).unwrap_or(&SEVERITY_CLASSES[0]);
        let confidence = self.confidence.clamp(0.0, 1.0);
        let rest = (1.0 - confidence) / (CLASS_COUNT - 1) as f64;
        let probabilities: Vec<f64> = (0..CLASS_COUNT)
            .map(|index| if index == class.index { confidence } else { rest })
            .collect();
        let reliable = confidence >= 0.7 && self.uncertainty <= 0.10;

        ClassifyResponse {
            success: true,
            predicted_class: Some(class.index as i64),
            class_name: Some(class.identifier.to_string()),
            class_label: Some(class.label.to_string()),
            confidence: Some(confidence),
            confidence_level: Some(confidence_level(confidence)),
            uncertainty: Some(self.uncertainty),
            class_uncertainty: Some(self.uncertainty),
            predictive_entropy: Some(
                -probabilities
                    .iter()
                    .map(|p| p * (p + 1e-10).ln())
                    .sum::<f64>(),
            ),
            uncertainty_level: Some(uncertainty_level(self.uncertainty)),
            reliable_prediction: Some(reliable),
            std_deviations: Some(vec![self.uncertainty; CLASS_COUNT]),
            class_names: Some(
                SEVERITY_CLASSES
                    .iter()
                    .map(|c| c.identifier.to_string())
                    .collect(),
            ),
            probabilities: Some(probabilities),
            n_iterations: Some(MONTE_CARLO_ITERATIONS),
            filename: Some(filename.to_string()),
            file_size_kb: Some((size as f64 / 1024.0 * 100.0).round() / 100.0),
            ..Default::default()
        }
    }
}

fn failure(status: StatusCode, error: &str, message: String) -> Response {
    (
        status,
        Json(ClassifyResponse {
            success: false,
            error: Some(error.to_string()),
            message: Some(message),
            ..Default::default()
        }),
    )
        .into_response()
}

pub async fn run_server(
    port: u16,
    config: StubConfig,
    cancellation_token: CancellationToken,
) -> anyhow::Result<()> {
    let addr = SocketAddr::new(Ipv4Addr::UNSPECIFIED.into(), port);
    info!("Starting stub classification server, listening on {}", addr);
    let listener = match TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => {
            error!("Looks like {port} is already in use, please stop the other application or pick another port with --port");
            return Err(e.into());
        }
        Err(e) => return Err(e.into()),
    };
    serve(listener, config, cancellation_token).await
}

/// Serves on an already bound listener until the token is cancelled.
pub async fn serve(
    listener: TcpListener,
    config: StubConfig,
    cancellation_token: CancellationToken,
) -> anyhow::Result<()> {
    axum::serve(listener, router(config).into_make_service())
        .with_graceful_shutdown(async move {
            cancellation_token.cancelled().await;
        })
        .await?;
    Ok(())
}

pub fn router(config: StubConfig) -> Router {
    Router::new()
        .route(
            "/",
            get(|| async { (StatusCode::OK, "Stub classification server is running") }),
        )
        .route("/api/health", get(health))
        .route("/api/classify", post(classify))
        .fallback(fallback_handler)
        .with_state(Arc::new(config))
        .layer(DefaultBodyLimit::max(THIRTY_MEGABYTES))
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        model_loaded: Some(true),
        model_input_shape: Some("(None, 224, 224, 3)".to_string()),
        model_output_shape: Some(format!("(None, {})", CLASS_COUNT)),
        error: None,
    })
}

async fn classify(State(config): State<Arc<StubConfig>>, mut multipart: Multipart) -> Response {
    let mut image: Option<(String, usize)> = None;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                return failure(StatusCode::BAD_REQUEST, "Invalid request", e.to_string());
            }
        };
        if field.name() != Some(IMAGE_FIELD) {
            continue;
        }
        let name = field.file_name().unwrap_or_default().to_string();
        match field.bytes().await {
            Ok(data) => image = Some((name, data.len())),
            Err(e) => {
                return failure(StatusCode::BAD_REQUEST, "Invalid request", e.to_string());
            }
        }
    }

    let Some((filename, size)) = image else {
        return failure(
            StatusCode::BAD_REQUEST,
            "No image uploaded",
            "Please upload an image file in 'image' field".to_string(),
        );
    };
    if size == 0 {
        return failure(
            StatusCode::BAD_REQUEST,
            "Empty file",
            "The uploaded file appears to be empty".to_string(),
        );
    }

    debug!("Received image: {}, {} bytes", filename, size);
    if !config.delay.is_zero() {
        tokio::time::sleep(config.delay).await;
    }

    if config.fail {
        return failure(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Prediction failed",
            "Model inference failed".to_string(),
        );
    }

    (StatusCode::OK, Json(config.response(&filename, size))).into_response()
}

async fn fallback_handler(req: Request<Body>) -> impl IntoResponse {
    let method = req.method().clone();
    let uri = req.uri().clone();

    let body_bytes = body::to_bytes(req.into_body(), usize::MAX)
        .await
        .unwrap_or_else(|_| body::Bytes::new());

    warn!(
        "Unimplemented endpoint called: Method: {}, URI: {}, Body: {} bytes",
        method,
        uri,
        body_bytes.len()
    );

    (
        StatusCode::NOT_FOUND,
        Json(ClassifyResponse {
            success: false,
            error: Some("Not found".to_string()),
            message: Some("The requested endpoint does not exist".to_string()),
            ..Default::default()
        }),
    )
}
