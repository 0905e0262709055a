use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use vizpulse::cli::Args;
use vizpulse::config::Config;
use vizpulse::display::{self, DisplayMode, Session, SourceRequest};
use vizpulse::ipc;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Handle --init-config
    if args.init_config {
        let path = Config::init_default_config()?;
        println!("Config written to {}", path.display());
        return Ok(());
    }

    // Handle --send (client mode)
    if let Some(words) = &args.send {
        let response = ipc::send_command(&words.join(" ")).await?;
        println!("{}", response);
        return Ok(());
    }

    init_logging(args.mode.unwrap_or_default());

    // Priority: defaults < preset < config file < CLI args
    let base = args.preset.map(|p| p.config()).unwrap_or_default();
    let mut config = match &args.config {
        Some(path) => Config::load_over(base, path)?,
        None => Config::load_from_default_path(base),
    };
    config.merge_args(&args);
    config.validate()?;

    info!("Starting vizpulse in {:?} mode", config.display.mode);

    let source = if let Some(path) = args.file.clone() {
        SourceRequest::File {
            path,
            looping: config.audio.looping,
        }
    } else if args.mic {
        SourceRequest::Microphone {
            device: config.audio.device.clone(),
        }
    } else {
        SourceRequest::None
    };

    let session = Session::start(&config, source, args.ipc, args.frames).await?;

    match config.display.mode {
        DisplayMode::Terminal => display::terminal::run(session).await?,
        DisplayMode::Headless => display::headless::run(session).await?,
    }

    Ok(())
}

/// The terminal view owns stdout, so logs go to stderr and only warnings
/// show unless RUST_LOG asks for more. A set RUST_LOG replaces the default.
fn init_logging(mode: DisplayMode) {
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(mode, std::env::var("RUST_LOG").ok().as_deref()))
        .with_writer(std::io::stderr)
        .init();
}

fn log_filter(mode: DisplayMode, env: Option<&str>) -> EnvFilter {
    let default = match mode {
        DisplayMode::Terminal => "vizpulse=warn",
        DisplayMode::Headless => "vizpulse=info",
    };
    env.filter(|directives| !directives.trim().is_empty())
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(default))
}
