//! Serlog - serial data recorder
//!
//! Records everything a serial device sends into a timestamped CSV file.
//! Alt+C saves the file and exits; Ctrl+X deletes it and exits.

use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};
use serlog_core::cli::{
    choose_device, print_exit_codes, stdout_echo, CliResult, EchoMode, ExitCodes,
};
use serlog_core::config::{self, AppConfig};
use serlog_core::core::input::{KeySource, NoKeys, TerminalKeys};
use serlog_core::core::simulator::TickerDevice;
use serlog_core::core::transport::{
    list_ports, ByteSource, SerialConfig, SerialOpener, TransportError, TransportOpener,
};
use serlog_core::{CsvRecordStore, SessionConfig, SessionController};
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// Output format for port listings
#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// Human-readable text
    Text,
    /// JSON format for scripting
    Json,
}

/// Serlog CLI
#[derive(Parser, Debug)]
#[command(
    name = "serlog",
    author = "Serlog Team",
    version,
    about = "Record a serial device to a timestamped CSV file",
    long_about = None
)]
struct Cli {
    /// Verbose diagnostics on stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (defaults to the platform config directory)
    #[arg(long, global = true, env = "SERLOG_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Record a serial device (default)
    Record(RecordArgs),

    /// List available serial ports
    ListPorts {
        /// Show detailed info
        #[arg(short, long)]
        detailed: bool,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Show the exit code table
    ExitCodes,
}

#[derive(Args, Debug, Default)]
struct RecordArgs {
    /// Serial port name (e.g., COM3, /dev/ttyUSB0); prompts when omitted
    #[arg(short, long, env = "SERLOG_PORT")]
    port: Option<String>,

    /// Baud rate (defaults to the configured rate, 115200)
    #[arg(short, long)]
    baud: Option<u32>,

    /// Directory for the record file
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Record file prefix
    #[arg(long)]
    prefix: Option<String>,

    /// Do not echo received data
    #[arg(short, long)]
    quiet: bool,

    /// Echo received data as hex
    #[arg(long)]
    hex: bool,

    /// Record from a built-in virtual device instead of a serial port
    #[arg(long)]
    simulate: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let _log_guard = init_logging(cli.verbose);

    info!("Starting Serlog v{}", env!("CARGO_PKG_VERSION"));

    let result = match &cli.command {
        Some(Commands::ListPorts { detailed, format }) => match show_ports(*detailed, *format) {
            Ok(()) => CliResult::success(),
            Err(e) => CliResult::error(ExitCodes::ERROR, format!("{e:#}")),
        },
        Some(Commands::ExitCodes) => {
            print_exit_codes();
            CliResult::success()
        }
        Some(Commands::Record(args)) => record(&cli, args).await,
        None => record(&cli, &RecordArgs::default()).await,
    };

    if let Some(message) = result.message() {
        if result.is_success() {
            eprintln!("{message}");
        } else {
            eprintln!("Error: {message}");
        }
    }
    result.to_exit_code()
}

/// stderr gets warnings (or everything with -v); the daily log file gets info and up
fn init_logging(verbose: bool) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let default_level = if verbose { "debug" } else { "warn" };
    let stderr_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stderr)
        .with_target(false)
        .with_filter(stderr_filter);

    let log_dir = config::log_dir().filter(|dir| std::fs::create_dir_all(dir).is_ok());
    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "serlog.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let file_level = if verbose { LevelFilter::DEBUG } else { LevelFilter::INFO };
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_filter(file_level);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .init();
    guard
}

fn load_config(cli: &Cli) -> Result<AppConfig, config::ConfigError> {
    match &cli.config {
        Some(path) => AppConfig::load_from(path),
        None => AppConfig::load(),
    }
}

/// Pick the device: `--port`, else the prompt, else (non-interactive) the saved device
fn resolve_device(
    config: &AppConfig,
    args: &RecordArgs,
    interactive: bool,
) -> Result<String, CliResult> {
    if let Some(port) = &args.port {
        return Ok(port.clone());
    }

    if !interactive {
        return config.load_last_device().map_err(|e| {
            CliResult::error(ExitCodes::INVALID_ARGS, format!("{e}; pass --port"))
        });
    }

    let available: Vec<String> = list_ports()
        .map(|ports| ports.into_iter().map(|p| p.port_name).collect())
        .unwrap_or_default();

    choose_device(config, &available, &mut io::stdin().lock(), &mut io::stdout())
        .map_err(|e| CliResult::error(ExitCodes::INVALID_ARGS, format!("No device selected: {e}")))
}

async fn record(cli: &Cli, args: &RecordArgs) -> CliResult {
    let mut app_config = match load_config(cli) {
        Ok(config) => config,
        Err(e) => return CliResult::error(ExitCodes::CONFIG_ERROR, e.to_string()),
    };
    let interactive = atty::is(atty::Stream::Stdin);

    let device = if args.simulate {
        "simulator".to_string()
    } else {
        match resolve_device(&app_config, args, interactive) {
            Ok(device) => device,
            Err(result) => return result,
        }
    };
    if !args.simulate {
        if let Err(e) = app_config.save_device(&device) {
            warn!(error = %e, "Could not remember the device for next time");
        }
    }

    let serial = app_config.serial_config(&device, args.baud);
    let output_dir = args.output_dir.clone().unwrap_or_else(|| app_config.output_dir());
    let prefix = args.prefix.as_deref().unwrap_or(&app_config.recording.prefix);
    let store = CsvRecordStore::new(output_dir, prefix);

    let keys: Box<dyn KeySource> = if interactive {
        match TerminalKeys::new() {
            Ok(keys) => Box::new(keys),
            Err(e) => {
                warn!(error = %e, "Keyboard control unavailable");
                Box::new(NoKeys)
            }
        }
    } else {
        Box::new(NoKeys)
    };

    let interrupt = CancellationToken::new();
    let on_signal = interrupt.clone();
    if let Err(e) = ctrlc::set_handler(move || on_signal.cancel()) {
        warn!(error = %e, "Cannot install interrupt handler");
    }

    let mut controller = SessionController::new(SessionConfig::new(serial.clone()))
        .with_interrupt(interrupt);
    if app_config.recording.echo && !args.quiet {
        let mode = if args.hex || app_config.recording.hex {
            EchoMode::Hex
        } else {
            EchoMode::Text
        };
        controller = controller.with_observer(stdout_echo(mode));
    }

    let opener: Box<dyn TransportOpener> = if args.simulate {
        Box::new(|_: &SerialConfig| -> Result<Box<dyn ByteSource>, TransportError> {
            Ok(Box::new(TickerDevice::new(Duration::from_millis(250))))
        })
    } else {
        Box::new(SerialOpener)
    };

    eprintln!(
        "Recording {} into {}. Press Alt+C to save and exit, or Ctrl+X to exit without saving.",
        serial.summary(),
        store.dir().display()
    );

    info!(session = %controller.id(), device = %serial.summary(), "Session starting");
    let outcome = controller.run(opener.as_ref(), &store, keys).await;
    CliResult::from(&outcome)
}

fn show_ports(detailed: bool, format: OutputFormat) -> anyhow::Result<()> {
    let ports = list_ports().context("Cannot enumerate serial ports")?;

    match format {
        OutputFormat::Json => {
            let json: Vec<serde_json::Value> = ports
                .iter()
                .map(|p| {
                    serde_json::json!({
                        "name": p.port_name,
                        "type": format!("{:?}", p.port_type)
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        OutputFormat::Text => {
            if ports.is_empty() {
                println!("No serial ports found.");
            } else if detailed {
                println!("Available Serial Ports:");
                println!("{:-<60}", "");
                for port in &ports {
                    println!("  {} [{:?}]", port.port_name, port.port_type);
                }
            } else {
                for port in &ports {
                    println!("{}", port.port_name);
                }
            }
        }
    }

    Ok(())
}
