//! Serialframe CLI
//!
//! Monitors a serial port (or a captured stream) and prints every frame it
//! decodes.

use anyhow::Context;
use clap::{Parser, Subcommand};
use serialframe_core::cli::{print_exit_codes, CliResult, ConsolePrinter, ExitCodes, OutputFormat};
use serialframe_core::config::{self, AppConfig, ConfigError};
use serialframe_core::core::logger::{LogFormat, RecordLogger};
use serialframe_core::core::protocol::{
    encode_frame, PayloadKind, PayloadRecord, WireFormat, MAX_PAYLOAD_SIZE,
};
use serialframe_core::core::session::{
    DecoderStats, FrameSink, Session, SessionConfig, SinkSet, StreamDecoder,
};
use serialframe_core::core::transport::{
    list_ports, ReaderSource, SerialFlowControl, SerialParity, SerialSource,
};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Serialframe CLI
#[derive(Parser, Debug)]
#[command(
    name = "serialframe",
    version,
    about = "Decode CRC-16 framed telemetry from a serial link",
    long_about = None
)]
struct Cli {
    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text, global = true)]
    format: OutputFormat,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode (errors only)
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Config file (defaults to the platform config directory)
    #[arg(long, env = "SERIALFRAME_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Payload layout: packed or aligned
    #[arg(short, long, global = true)]
    wire_format: Option<WireFormat>,

    /// Write diagnostics to a daily rolling file in this directory
    #[arg(long, env = "SERIALFRAME_LOG_DIR", global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List available serial ports
    ListPorts {
        /// Show detailed info
        #[arg(short, long)]
        detailed: bool,
    },

    /// Decode frames from a serial port until Ctrl+C
    Monitor {
        /// Serial port name (e.g., COM6, /dev/ttyUSB0)
        #[arg(short, long)]
        port: Option<String>,

        /// Baud rate
        #[arg(short, long)]
        baud: Option<u32>,

        /// Data bits (5-8)
        #[arg(long)]
        data_bits: Option<u8>,

        /// Parity (none, odd, even)
        #[arg(long)]
        parity: Option<SerialParity>,

        /// Stop bits (1, 2)
        #[arg(long)]
        stop_bits: Option<u8>,

        /// Flow control (none, hw, sw)
        #[arg(long)]
        flow: Option<SerialFlowControl>,

        /// Delay between polls in milliseconds
        #[arg(long)]
        poll_ms: Option<u64>,

        /// Exit after this many seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Append decoded records to this file (.csv or .jsonl)
        #[arg(short = 'l', long)]
        log: Option<PathBuf>,

        /// Show raw frame details
        #[arg(long)]
        show_frames: bool,
    },

    /// Decode a captured byte stream (file or `-` for stdin)
    Replay {
        /// Capture file
        file: PathBuf,

        /// Bytes fed to the decoder per read
        #[arg(long, default_value_t = 4096)]
        chunk_size: usize,

        /// Append decoded records to this file (.csv or .jsonl)
        #[arg(short = 'l', long)]
        log: Option<PathBuf>,

        /// Show raw frame details
        #[arg(long)]
        show_frames: bool,
    },

    /// Decode a hex string
    Decode {
        /// Bytes as hex, spaces and colons allowed
        hex: String,
    },

    /// Build a frame for a record
    Encode {
        /// Sender timestamp in milliseconds
        #[arg(short, long, default_value_t = 0)]
        timestamp: u16,

        /// Also write the frame to this serial port
        #[arg(short, long)]
        port: Option<String>,

        /// Baud rate for --port
        #[arg(short, long)]
        baud: Option<u32>,

        #[command(subcommand)]
        record: RecordArgs,
    },

    /// Show or create the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Show version and protocol information
    Info {
        /// Also list exit codes
        #[arg(long)]
        exit_codes: bool,
    },
}

#[derive(Subcommand, Debug)]
enum RecordArgs {
    /// Calendar date
    Date { days: u32, month: u32, year: u32 },
    /// Time of day
    Time { hour: u8, minute: u16, second: u16 },
    /// ADC sample
    Adc { sample_count: u32, value: u16 },
    /// Text message
    Text { text: String },
    /// Button event
    Button { button_id: u8, button_state: u16 },
    /// MCU temperature
    Temperature { celsius: u16 },
}

impl From<&RecordArgs> for PayloadRecord {
    fn from(args: &RecordArgs) -> Self {
        match args {
            RecordArgs::Date { days, month, year } => PayloadRecord::Date {
                days: *days,
                month: *month,
                year: *year,
            },
            RecordArgs::Time {
                hour,
                minute,
                second,
            } => PayloadRecord::Time {
                hour: *hour,
                minute: *minute,
                second: *second,
            },
            RecordArgs::Adc {
                sample_count,
                value,
            } => PayloadRecord::AdcSample {
                sample_count: *sample_count,
                value: *value,
            },
            RecordArgs::Text { text } => PayloadRecord::Text { text: text.clone() },
            RecordArgs::Button {
                button_id,
                button_state,
            } => PayloadRecord::Button {
                button_id: *button_id,
                button_state: *button_state,
            },
            RecordArgs::Temperature { celsius } => PayloadRecord::Temperature { celsius: *celsius },
        }
    }
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Print the config file path
    Path,
    /// Write the default configuration
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let _guard = match init_tracing(&cli) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return CliResult::error(ExitCodes::INTERNAL_ERROR, e.to_string()).to_exit_code();
        }
    };

    let result = run(&cli).await.unwrap_or_else(CliResult::from);

    match (&result, result.message()) {
        (CliResult::Success(_), Some(msg)) if !cli.quiet => eprintln!("{}", msg),
        (CliResult::Error(..), Some(msg)) => eprintln!("Error: {}", msg),
        _ => {}
    }

    result.to_exit_code()
}

fn init_tracing(cli: &Cli) -> anyhow::Result<Option<WorkerGuard>> {
    let default_level = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let stderr_layer = fmt::layer().with_writer(std::io::stderr).with_target(false);

    let (file_layer, guard) = match &cli.log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
            let appender = tracing_appender::rolling::daily(dir, "serialframe.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().json().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()?;

    Ok(guard)
}

fn load_config(cli: &Cli) -> anyhow::Result<AppConfig> {
    let config = match &cli.config {
        Some(path) => AppConfig::load_from(path)?,
        None => match AppConfig::load() {
            Ok(config) => config,
            Err(ConfigError::NoConfigDir) => {
                warn!("No config directory on this platform, using defaults");
                AppConfig::default()
            }
            Err(e) => return Err(e.into()),
        },
    };
    Ok(config)
}

async fn run(cli: &Cli) -> anyhow::Result<CliResult> {
    let config = load_config(cli)?;
    let wire_format = cli.wire_format.unwrap_or(config.decoder.wire_format);
    debug!("Payload layout: {}", wire_format);

    match &cli.command {
        Commands::ListPorts { detailed } => show_ports(cli, *detailed),
        Commands::Monitor {
            port,
            baud,
            data_bits,
            parity,
            stop_bits,
            flow,
            poll_ms,
            timeout,
            log,
            show_frames,
        } => {
            let mut serial = config.serial.clone();
            if let Some(port) = port {
                serial.port.clone_from(port);
            }
            if let Some(baud) = baud {
                serial.baud_rate = *baud;
            }
            if let Some(bits) = data_bits {
                serial.data_bits = *bits;
            }
            if let Some(parity) = parity {
                serial.parity = *parity;
            }
            if let Some(bits) = stop_bits {
                serial.stop_bits = *bits;
            }
            if let Some(flow) = flow {
                serial.flow_control = *flow;
            }

            let source = SerialSource::open(serial).context("Failed to open serial port")?;
            let session_config = SessionConfig {
                wire_format,
                poll_interval: poll_ms
                    .map(Duration::from_millis)
                    .unwrap_or_else(|| config.decoder.poll_interval()),
            };
            let logger = open_logger(&config, log.as_deref(), true)?;

            if !cli.quiet {
                eprintln!(
                    "Monitoring {}. Press Ctrl+C to exit.",
                    source.config().summary()
                );
            }

            let stop = stop_on_ctrl_c()?;

            if let Some(secs) = timeout {
                let flag = stop.clone();
                let secs = *secs;
                tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_secs(secs)).await;
                    flag.store(true, Ordering::SeqCst);
                });
            }

            let mut session = Session::new(source, session_config);
            let stats = run_session(cli, &mut session, logger, *show_frames, &stop).await?;
            Ok(summarize(&stats, false))
        }
        Commands::Replay {
            file,
            chunk_size,
            log,
            show_frames,
        } => {
            let (reader, name): (Box<dyn Read + Send>, String) = if file.as_os_str() == "-" {
                (Box::new(std::io::stdin()), "stdin".to_string())
            } else {
                if !file.exists() {
                    return Ok(CliResult::file_not_found(&file.display().to_string()));
                }
                let handle = std::fs::File::open(file)
                    .with_context(|| format!("Failed to open {}", file.display()))?;
                (Box::new(handle), file.display().to_string())
            };

            if *chunk_size == 0 {
                return Ok(CliResult::invalid_args("--chunk-size must be non-zero"));
            }

            let source = ReaderSource::new(reader, name).chunk_size(*chunk_size);
            let session_config = SessionConfig {
                wire_format,
                poll_interval: Duration::ZERO,
            };
            let logger = open_logger(&config, log.as_deref(), false)?;

            let stop = stop_on_ctrl_c()?;
            let mut session = Session::new(source, session_config);
            let stats = run_session(cli, &mut session, logger, *show_frames, &stop).await?;
            if stop.load(Ordering::SeqCst) {
                return Ok(CliResult::cancelled(format!(
                    "Replay interrupted after {} frames",
                    stats.frames_decoded
                )));
            }
            Ok(summarize(&stats, true))
        }
        Commands::Decode { hex } => decode_hex(cli, hex, wire_format),
        Commands::Encode {
            timestamp,
            port,
            baud,
            record,
        } => {
            let record = PayloadRecord::from(record);
            let payload = record.encode(wire_format)?;
            let frame = encode_frame(*timestamp, &payload)?;

            match cli.format {
                OutputFormat::Json => println!(
                    "{}",
                    serde_json::json!({
                        "record": &record,
                        "wire_format": wire_format,
                        "timestamp": timestamp,
                        "payload": hex::encode_upper(&payload),
                        "frame": hex::encode_upper(&frame),
                        "length": frame.len(),
                    })
                ),
                OutputFormat::Text => println!("{}", spaced_hex(&frame)),
            }

            if let Some(port) = port {
                let mut serial = config.serial.clone();
                serial.port.clone_from(port);
                if let Some(baud) = baud {
                    serial.baud_rate = *baud;
                }
                let mut source = SerialSource::open(serial).context("Failed to open serial port")?;
                let sent = source.send(&frame)?;
                info!("Sent {} bytes to {}", sent, port);
            }

            Ok(CliResult::success())
        }
        Commands::Config { action } => handle_config(cli, &config, action),
        Commands::Info { exit_codes } => show_info(cli, &config, *exit_codes),
    }
}

/// Flag raised by Ctrl+C
fn stop_on_ctrl_c() -> anyhow::Result<Arc<AtomicBool>> {
    let stop = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&stop);
    ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst))
        .context("Failed to install Ctrl+C handler")?;
    Ok(stop)
}

fn open_logger(
    config: &AppConfig,
    path: Option<&Path>,
    use_config: bool,
) -> anyhow::Result<Option<RecordLogger>> {
    let (path, format) = match path {
        Some(path) => (path.to_path_buf(), LogFormat::from_path(path)),
        None if use_config && config.logging.enabled => {
            let Some(path) = config.logging.new_log_path() else {
                warn!("Record logging enabled but no log directory is known");
                return Ok(None);
            };
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
            (path, config.logging.format)
        }
        None => return Ok(None),
    };

    Ok(Some(RecordLogger::open(path, format)?))
}

async fn run_session<S: serialframe_core::ByteSource>(
    cli: &Cli,
    session: &mut Session<S>,
    mut logger: Option<RecordLogger>,
    show_frames: bool,
    stop: &AtomicBool,
) -> anyhow::Result<DecoderStats> {
    let mut printer = ConsolePrinter::new(cli.format)
        .show_frames(show_frames)
        .quiet(cli.quiet);

    let mut sinks = SinkSet::new();
    sinks.add(&mut printer);
    if let Some(logger) = logger.as_mut() {
        sinks.add(logger);
    }

    session.run(&mut sinks, stop).await
}

fn summarize(stats: &DecoderStats, strict: bool) -> CliResult {
    if strict && stats.checksum_failures > 0 {
        CliResult::validation_failed(format!(
            "{} of {} frames failed the checksum",
            stats.checksum_failures,
            stats.checksum_failures + stats.frames_decoded
        ))
    } else {
        CliResult::success()
    }
}

fn decode_hex(cli: &Cli, input: &str, wire_format: WireFormat) -> anyhow::Result<CliResult> {
    let cleaned: String = input
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ':')
        .collect();
    let bytes = match hex::decode(&cleaned) {
        Ok(bytes) => bytes,
        Err(e) => return Ok(CliResult::invalid_args(format!("Invalid hex input: {}", e))),
    };

    let mut decoder = StreamDecoder::new(wire_format);
    let mut printer = ConsolePrinter::new(cli.format);

    for event in decoder.push(&bytes) {
        printer.handle(&event)?;
    }

    let stats = decoder.stats();
    printer.finish(&stats)?;

    if stats.frames_decoded == 0 && stats.checksum_failures == 0 {
        return Ok(CliResult::validation_failed("No complete frame in input"));
    }
    Ok(summarize(&stats, true))
}

fn spaced_hex(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

fn show_ports(cli: &Cli, detailed: bool) -> anyhow::Result<CliResult> {
    use serialport::SerialPortType;

    let ports = list_ports()?;

    if ports.is_empty() {
        if !cli.quiet {
            println!("No serial ports found.");
        }
        return Ok(CliResult::success());
    }

    match cli.format {
        OutputFormat::Json => {
            let json: Vec<serde_json::Value> = ports
                .iter()
                .map(|p| {
                    let mut value = serde_json::json!({
                        "name": p.port_name,
                        "type": format!("{:?}", p.port_type),
                    });
                    if let SerialPortType::UsbPort(usb) = &p.port_type {
                        value["vid"] = format!("{:04x}", usb.vid).into();
                        value["pid"] = format!("{:04x}", usb.pid).into();
                        value["manufacturer"] = usb.manufacturer.clone().into();
                        value["product"] = usb.product.clone().into();
                    }
                    value
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        OutputFormat::Text => {
            if detailed {
                println!("Available Serial Ports:");
                println!("{:-<60}", "");
                for port in &ports {
                    match &port.port_type {
                        SerialPortType::UsbPort(usb) => println!(
                            "  {} [USB {:04x}:{:04x}] {} {}",
                            port.port_name,
                            usb.vid,
                            usb.pid,
                            usb.manufacturer.as_deref().unwrap_or(""),
                            usb.product.as_deref().unwrap_or("")
                        ),
                        other => println!("  {} [{:?}]", port.port_name, other),
                    }
                }
            } else {
                for port in &ports {
                    println!("{}", port.port_name);
                }
            }
        }
    }

    Ok(CliResult::success())
}

fn handle_config(cli: &Cli, config: &AppConfig, action: &ConfigAction) -> anyhow::Result<CliResult> {
    match action {
        ConfigAction::Show => match cli.format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(config)?),
            OutputFormat::Text => print!("{}", toml::to_string_pretty(config)?),
        },
        ConfigAction::Path => match cli.config.clone().or_else(config::config_path) {
            Some(path) => println!("{}", path.display()),
            None => return Ok(CliResult::from(ConfigError::NoConfigDir)),
        },
        ConfigAction::Init { force } => {
            if let Some(path) = &cli.config {
                if path.exists() && !force {
                    return Ok(CliResult::invalid_args(format!(
                        "{} exists, use --force to overwrite",
                        path.display()
                    )));
                }
                AppConfig::default().save_to(path)?;
                return Ok(CliResult::success_with_message(format!(
                    "Wrote {}",
                    path.display()
                )));
            }

            let path = config::config_path().ok_or(ConfigError::NoConfigDir)?;
            if path.exists() && !force {
                return Ok(CliResult::invalid_args(format!(
                    "{} exists, use --force to overwrite",
                    path.display()
                )));
            }
            config::init_directories()?;
            AppConfig::default().save()?;
            return Ok(CliResult::success_with_message(format!(
                "Wrote {}",
                path.display()
            )));
        }
    }

    Ok(CliResult::success())
}

fn show_info(cli: &Cli, config: &AppConfig, exit_codes: bool) -> anyhow::Result<CliResult> {
    let kinds: Vec<serde_json::Value> = PayloadKind::all()
        .iter()
        .map(|kind| {
            serde_json::json!({
                "tag": kind.tag(),
                "name": kind.name(),
                "packed_len": kind.expected_len(WireFormat::Packed),
                "aligned_len": kind.expected_len(WireFormat::Aligned),
            })
        })
        .collect();
    let log_formats: Vec<serde_json::Value> = LogFormat::all()
        .iter()
        .map(|format| serde_json::json!({ "name": format.name(), "extension": format.extension() }))
        .collect();

    match cli.format {
        OutputFormat::Json => {
            let info = serde_json::json!({
                "name": serialframe_core::NAME,
                "version": serialframe_core::VERSION,
                "frame": {
                    "header": "DEAB",
                    "checksum": "CRC-16/Modbus",
                    "max_payload": MAX_PAYLOAD_SIZE,
                },
                "wire_format": config.decoder.wire_format,
                "payloads": kinds,
                "log_formats": log_formats,
                "config_path": config::config_path(),
                "platform": std::env::consts::OS,
                "arch": std::env::consts::ARCH,
            });
            println!("{}", serde_json::to_string_pretty(&info)?);
        }
        OutputFormat::Text => {
            println!("Serialframe v{}", serialframe_core::VERSION);
            println!("Platform: {} ({})", std::env::consts::OS, std::env::consts::ARCH);
            println!();
            println!("Frame: DE AB | timestamp u16 | size u16 | payload | CRC-16/Modbus");
            println!("Max payload: {} bytes", MAX_PAYLOAD_SIZE);
            println!("Default wire format: {}", config.decoder.wire_format);
            println!();
            println!("{:<4} {:<12} {:>7} {:>8}", "Tag", "Payload", "Packed", "Aligned");
            for kind in PayloadKind::all() {
                let len = |format| match kind.expected_len(format) {
                    Some(len) => len.to_string(),
                    None => "var".to_string(),
                };
                println!(
                    "{:<4} {:<12} {:>7} {:>8}",
                    kind.tag(),
                    kind.name(),
                    len(WireFormat::Packed),
                    len(WireFormat::Aligned)
                );
            }
            println!();
            let formats: Vec<String> = LogFormat::all()
                .iter()
                .map(|format| format!("{} (.{})", format.name(), format.extension()))
                .collect();
            println!("Record logs: {}", formats.join(", "));
            if let Some(path) = config::config_path() {
                println!();
                println!("Config: {}", path.display());
            }
            if exit_codes {
                println!();
                print_exit_codes();
            }
        }
    }

    Ok(CliResult::success())
}
