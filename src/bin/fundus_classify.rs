use clap::Parser;
use fundus_client::{
    controller::{Controller, Event, InteractionState},
    guard::{CandidateImage, Origin},
    logging::{init_tracing, setup_ansi_support, LogLevel},
    preview::{DiskPreviews, MemoryPreviews, PreviewStore},
    render::{render, RenderOptions},
    session::Session,
    transport::{ClientConfig, HttpTransport, DEFAULT_ORIGIN},
};
use serde_json::json;
use std::{path::PathBuf, process::ExitCode, str::FromStr, sync::Arc, time::Duration};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info};

/// Diabetic retinopathy classification client
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Origin of the classification server.
    /// Example: --origin "http://localhost:5500"
    #[arg(long, default_value = DEFAULT_ORIGIN)]
    origin: String,

    /// Fundus image to classify. Without it the client starts in interactive mode.
    #[arg(short, long)]
    image: Option<PathBuf>,

    /// Validate --image the way a drag and drop is validated (any image/* type).
    #[arg(long)]
    drop: bool,

    /// Query the server health endpoint and exit.
    #[arg(long)]
    health: bool,

    /// Print the result as JSON instead of the terminal card.
    #[arg(long)]
    json: bool,

    /// Disable colored output.
    #[arg(long)]
    no_color: bool,

    /// Write image previews into this directory so they can be opened in a viewer.
    #[arg(long)]
    preview_dir: Option<PathBuf>,

    /// Network timeout in milliseconds. No timeout by default.
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Sets a custom file path for logging
    #[clap(short, long, value_parser)]
    log_path: Option<String>,

    /// Sets the level of logging
    #[clap(long, value_enum, default_value_t = LogLevel::Warn)]
    log_level: LogLevel,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    setup_ansi_support();

    let args = Args::parse();
    let _guard = init_tracing(args.log_path.as_deref(), "fundus_classify.log", args.log_level);

    let config = ClientConfig::new(&args.origin)?
        .with_timeout(args.timeout_ms.map(Duration::from_millis));
    let transport = Arc::new(HttpTransport::new(config)?);

    if args.health {
        return health(&transport).await;
    }

    let previews: Arc<dyn PreviewStore> = match &args.preview_dir {
        Some(dir) => Arc::new(DiskPreviews::new(dir)?),
        None => Arc::new(MemoryPreviews::default()),
    };
    let mut session = Session::new(Controller::new(previews), transport);
    let options = RenderOptions {
        color: !args.no_color,
    };

    match args.image.clone() {
        Some(image) => {
            let origin = if args.drop { Origin::Drop } else { Origin::Picker };
            one_shot(&mut session, image, origin, args.json, &options).await
        }
        None => {
            interactive(&mut session, &options).await?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn health(transport: &HttpTransport) -> anyhow::Result<ExitCode> {
    info!("Checking health of {}", transport.config().origin);
    let health = transport.health().await?;
    println!("{:#?}", health);
    Ok(if health.is_healthy() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn one_shot(
    session: &mut Session<HttpTransport>,
    path: PathBuf,
    origin: Origin,
    as_json: bool,
    options: &RenderOptions,
) -> anyhow::Result<ExitCode> {
    let image = CandidateImage::from_path(&path).await?;
    session.dispatch(Event::Select { image, origin });
    if session.state().error().is_none() {
        session.dispatch(Event::Submit);
    }
    let state = session.run_to_idle().await;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&state_json(state))?);
    } else {
        print!("{}", render(state, options));
    }

    Ok(if state.error().is_some() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

fn state_json(state: &InteractionState) -> serde_json::Value {
    match (state.result(), state.error()) {
        (Some(classification), _) => json!({
            "success": true,
            "result": classification.result,
            "display": classification.display,
        }),
        (None, Some(error)) => json!({
            "success": false,
            "kind": error.kind(),
            "message": error.to_string(),
        }),
        (None, None) => json!({ "success": false }),
    }
}

#[derive(Debug, PartialEq)]
enum Command {
    Select(PathBuf),
    Drop(PathBuf),
    Submit,
    Reset,
    Status,
    Help,
    Quit,
}

impl FromStr for Command {
    type Err = String;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };
        let path = || {
            if rest.is_empty() {
                Err(format!("`{}` needs a file path", word))
            } else {
                Ok(PathBuf::from(rest))
            }
        };
        match word {
            "select" | "open" => Ok(Command::Select(path()?)),
            "drop" => Ok(Command::Drop(path()?)),
            "submit" | "classify" => Ok(Command::Submit),
            "reset" => Ok(Command::Reset),
            "status" | "" => Ok(Command::Status),
            "help" | "?" => Ok(Command::Help),
            "quit" | "exit" => Ok(Command::Quit),
            other => Err(format!("Unknown command `{}`, type `help`", other)),
        }
    }
}

const HELP: &str = "Commands:
  select <path>  choose an image (PNG, JPG or BMP)
  drop <path>    drop an image (any image type)
  submit         send the selected image for classification
  reset          clear the image and result
  status         show the current state
  quit           exit";

async fn interactive(
    session: &mut Session<HttpTransport>,
    options: &RenderOptions,
) -> anyhow::Result<()> {
    println!("{}", HELP);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                let command = match line.parse::<Command>() {
                    Ok(command) => command,
                    Err(message) => {
                        println!("{}", message);
                        continue;
                    }
                };
                debug!("Command: {:?}", command);
                match command {
                    Command::Select(path) => select(session, path, Origin::Picker).await,
                    Command::Drop(path) => select(session, path, Origin::Drop).await,
                    Command::Submit => {
                        session.dispatch(Event::Submit);
                    }
                    Command::Reset => {
                        session.dispatch(Event::Reset);
                    }
                    Command::Status => {}
                    Command::Help => {
                        println!("{}", HELP);
                        continue;
                    }
                    Command::Quit => return Ok(()),
                }
                print!("{}", render(session.state(), options));
            }
            settled = session.next_settled(), if session.in_flight() > 0 => {
                if settled {
                    print!("{}", render(session.state(), options));
                }
            }
        }
    }

    // Input closed, show whatever is still in flight.
    if session.in_flight() > 0 {
        print!("{}", render(session.run_to_idle().await, options));
    }
    Ok(())
}

async fn select(session: &mut Session<HttpTransport>, path: PathBuf, origin: Origin) {
    match CandidateImage::from_path(&path).await {
        Ok(image) => {
            session.dispatch(Event::Select { image, origin });
        }
        Err(e) => println!("Could not read {}: {}", path.display(), e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commands() {
        assert_eq!(
            "select  /tmp/eye one.png ".parse::<Command>(),
            Ok(Command::Select(PathBuf::from("/tmp/eye one.png")))
        );
        assert_eq!(
            "drop eye.tiff".parse::<Command>(),
            Ok(Command::Drop(PathBuf::from("eye.tiff")))
        );
        assert_eq!("submit".parse::<Command>(), Ok(Command::Submit));
        assert_eq!("".parse::<Command>(), Ok(Command::Status));
        assert_eq!("exit".parse::<Command>(), Ok(Command::Quit));
        assert!("select".parse::<Command>().is_err());
        assert!("upload eye.png".parse::<Command>().is_err());
    }

    #[test]
    fn error_state_as_json() {
        let controller = Controller::default();
        assert_eq!(state_json(controller.state()), json!({ "success": false }));
    }
}
