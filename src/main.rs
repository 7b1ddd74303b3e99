use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use streamtap::app::{handle_fatal_error, init_logging, AppConfig, RenderMode};
use streamtap::error::StreamTapError;
use streamtap::session::KeySize;
use streamtap::ui::{SessionController, TerminalSurface, UiDispatcher, UiEvent};
use tracing::{debug, info};

/// Run an encrypting stream backend and watch its video output
#[derive(Parser)]
#[command(name = "streamtap", version)]
#[command(about = "Supervise a transport-stream backend and render its video", long_about = None)]
struct Cli {
    /// Enable verbose output (-v for debug, -vv for trace, -vvv for all)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Path to a TOML configuration file
    #[arg(short = 'c', long, global = true)]
    config: Option<PathBuf>,

    /// Backend executable to launch
    #[arg(short = 'e', long, global = true)]
    executable: Option<PathBuf>,

    /// AES key size passed to the backend (128, 192 or 256)
    #[arg(short = 'k', long, global = true)]
    key_size: Option<KeySize>,

    /// ffmpeg binary used to decode video
    #[arg(long, global = true)]
    ffmpeg: Option<PathBuf>,

    /// Decoder option as key=value; may be repeated
    #[arg(short = 'o', long = "decoder-option", value_name = "KEY=VALUE", global = true)]
    decoder_options: Vec<String>,

    /// How decoded frames are handed to the display
    #[arg(long, value_enum, global = true)]
    render: Option<RenderMode>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the backend and display its video (default command)
    Run,
    /// Print the effective decoder options and exit
    PrintOptions,
}

fn main() {
    let cli = Cli::parse();
    let verbose = cli.verbose;

    if let Err(e) = run(cli) {
        handle_fatal_error(e, verbose);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config = build_config(&cli)?;
    init_logging(&config);

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run_session(config),
        Commands::PrintOptions => {
            for (key, value) in config.decoder.to_option_map() {
                println!("{}={}", key, value);
            }
            Ok(())
        }
    }
}

fn build_config(cli: &Cli) -> Result<AppConfig, StreamTapError> {
    let mut config = AppConfig::load_or_default(cli.config.as_deref())?.with_verbose(cli.verbose);

    if let Some(executable) = &cli.executable {
        config.executable = executable.clone();
    }
    if let Some(key_size) = cli.key_size {
        config.key_size = key_size;
    }
    if let Some(ffmpeg) = &cli.ffmpeg {
        config.ffmpeg = ffmpeg.clone();
    }
    if let Some(mode) = cli.render {
        config.render.mode = mode;
    }
    config.apply_decoder_overrides(&cli.decoder_options)?;
    config.validate()?;
    Ok(config)
}

fn run_session(config: AppConfig) -> anyhow::Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("streamtap-worker")
        .build()
        .context("Failed to build the async runtime")?;

    let mut controller = SessionController::new(config.session_settings(), runtime.handle().clone());
    install_signal_handlers(controller.dispatcher(), &runtime)?;

    let mut surface = TerminalSurface::new();
    debug!("Launching {} with key size {}", config.executable.display(), config.key_size);

    if let Err(e) = controller.on_start_requested(config.key_size, &mut surface) {
        surface.finish();
        return Err(StreamTapError::from(e).into());
    }

    controller.run_blocking(&mut surface, true);
    surface.finish();

    info!(
        "Session finished after {} rendered frames",
        controller.display().frames_rendered()
    );
    runtime.shutdown_timeout(Duration::from_secs(1));
    Ok(())
}

/// First SIGINT/SIGTERM stops the backend; a second one exits immediately
#[cfg(unix)]
fn install_signal_handlers(
    dispatcher: UiDispatcher,
    _runtime: &tokio::runtime::Runtime,
) -> anyhow::Result<()> {
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals =
        Signals::new([SIGINT, SIGTERM]).context("Failed to install signal handlers")?;

    std::thread::spawn(move || {
        let mut stopping = false;
        for sig in signals.forever() {
            if stopping {
                std::process::exit(if sig == SIGINT { 130 } else { 143 });
            }
            stopping = true;
            dispatcher.post(UiEvent::StopRequested);
        }
    });

    Ok(())
}

#[cfg(not(unix))]
fn install_signal_handlers(
    dispatcher: UiDispatcher,
    runtime: &tokio::runtime::Runtime,
) -> anyhow::Result<()> {
    runtime.spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            dispatcher.post(UiEvent::StopRequested);
        }
        if tokio::signal::ctrl_c().await.is_ok() {
            std::process::exit(130);
        }
    });
    Ok(())
}
