use clap::Parser;
use fundus_client::{
    logging::{init_tracing, setup_ansi_support, LogLevel},
    stub_server::{run_server, StubConfig},
};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Stub classification server for local testing of the client
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// The port on which the server will listen for HTTP requests.
    #[arg(long, default_value_t = 5500)]
    port: u16,

    /// Severity class index (0-4) every classification returns.
    #[arg(long, default_value_t = 0)]
    predicted_class: usize,

    /// Confidence of the predicted class, 0 to 1.
    #[arg(long, default_value_t = 0.97)]
    confidence: f64,

    /// Uncertainty reported with every prediction.
    #[arg(long, default_value_t = 0.012)]
    uncertainty: f64,

    /// Simulated inference time in milliseconds.
    #[arg(long, default_value_t = 0)]
    delay_ms: u64,

    /// Fail every classification with an internal server error.
    #[arg(long)]
    fail: bool,

    /// Sets a custom file path for logging
    #[clap(short, long, value_parser)]
    log_path: Option<String>,

    /// Sets the level of logging
    #[clap(long, value_enum, default_value_t = LogLevel::Info)]
    log_level: LogLevel,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    setup_ansi_support();

    let args = Args::parse();
    let _guard = init_tracing(args.log_path.as_deref(), "fundus_stub_server.log", args.log_level);

    let config = StubConfig {
        predicted_class: args.predicted_class,
        confidence: args.confidence,
        uncertainty: args.uncertainty,
        fail: args.fail,
        delay: Duration::from_millis(args.delay_ms),
    };

    let cancellation_token = CancellationToken::new();
    let shutdown = cancellation_token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received, shutting down");
        }
        shutdown.cancel();
    });

    run_server(args.port, config, cancellation_token).await
}
