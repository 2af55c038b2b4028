/*!
 * labbridge command line.
 *
 * Scans for sensor devices, resolves the ones the operator asked for and
 * streams each of them to its own outlet until return or Ctrl-C is pressed.
 */
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{ArgAction, CommandFactory, Parser, ValueEnum};
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn, Instrument};

use labbridge_core::logging;
use labbridge_core::prelude::{Config, ConfigBuilder, ConnectionMode, OutletBackend};
use labbridge_devices::sim::SimulatedTransport;
use labbridge_devices::{
    parse_channel_list, DeviceError, DeviceResolver, MatchCriteria, TransportSession,
};
use labbridge_engine::{
    check_device_count, factory_for, ScanReport, SessionSupervisor, StopReason,
};

const REPLUG: &str = "Connection problem, please replug the USB";
const NOTHING_TO_STREAM: &str = "No devices were found to stream";
const PRESS_RETURN: &str = "Press return to close....";

#[derive(Parser, Debug)]
#[command(
    name = "labbridge",
    version,
    about = "Stream sensor devices to Lab Streaming Layer outlets"
)]
struct Cli {
    /// Report available devices and their default sensors, then exit
    #[arg(long, action = ArgAction::SetTrue)]
    scan: bool,

    /// Sensors to stream, comma separated; "default" enables the device defaults
    #[arg(long, default_value = "[default]")]
    enable: String,

    /// Only stream the device with this serial number
    #[arg(long = "serial-number", alias = "serial_number")]
    serial_number: Option<String>,

    /// Only stream devices with this order code, e.g. GDX-FOR
    #[arg(long = "order-code", alias = "order_code")]
    order_code: Option<String>,

    /// Number of devices expected to match
    #[arg(long, default_value_t = 1)]
    number: usize,

    /// Connection kinds to search
    #[arg(long, value_enum)]
    mode: Option<Mode>,

    /// Configuration file (TOML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print the scan report as JSON
    #[arg(long, action = ArgAction::SetTrue)]
    json: bool,

    /// Log filter, e.g. "info" or "labbridge_engine=debug"
    #[arg(long)]
    log_level: Option<String>,

    /// Pause between device polls in milliseconds
    #[arg(long)]
    poll_interval_ms: Option<u64>,

    /// Outbound stream backend
    #[arg(long, value_enum)]
    backend: Option<Backend>,

    /// Exit without waiting for return
    #[arg(long, action = ArgAction::SetTrue)]
    no_pause: bool,

    /// Print the effective configuration and exit
    #[arg(long, action = ArgAction::SetTrue)]
    print_config: bool,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Mode {
    Usb,
    Ble,
    Any,
}

impl From<Mode> for ConnectionMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Usb => ConnectionMode::Usb,
            Mode::Ble => ConnectionMode::Ble,
            Mode::Any => ConnectionMode::Any,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Backend {
    Lsl,
    Log,
}

impl From<Backend> for OutletBackend {
    fn from(backend: Backend) -> Self {
        match backend {
            Backend::Lsl => OutletBackend::Lsl,
            Backend::Log => OutletBackend::Log,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{:#}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = logging::init_from_config(&config.logging) {
        eprintln!("Could not set up logging: {}", e);
    }

    if cli.print_config {
        return match config.to_toml() {
            Ok(toml) => {
                print!("{}", toml);
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("{}", e);
                ExitCode::FAILURE
            }
        };
    }

    debug!(
        "labbridge {} with transports {:?}",
        labbridge_engine::VERSION,
        labbridge_devices::available_transports()
    );

    let transport = SimulatedTransport::new(
        config.transport.mode,
        config.simulation.devices.clone(),
    );
    let session = TransportSession::start(Box::new(transport));

    let outcome = run(&cli, &config, &session)
        .instrument(logging::component_span("cli", None))
        .await;

    if let Err(e) = session.shutdown().await {
        warn!("Transport shutdown failed: {}", e);
    }

    let code = match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            report_failure(&e);
            ExitCode::FAILURE
        }
    };

    if config.general.pause_on_exit && !cli.no_pause {
        pause();
    }
    code
}

/// Defaults, then the config file, then `LABBRIDGE__*`, then flags
fn load_config(cli: &Cli) -> Result<Config> {
    let mut builder = ConfigBuilder::new().with_default_environment();
    if let Some(path) = &cli.config {
        builder = builder.with_config_file(path);
    }
    let mut config = builder.build().context("Could not load configuration")?;

    if let Some(mode) = cli.mode {
        config.transport.mode = mode.into();
    }
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }
    if let Some(interval) = cli.poll_interval_ms {
        config.transport.poll_interval_ms = interval;
    }
    if let Some(backend) = cli.backend {
        config.stream.backend = backend.into();
    }
    if cli.no_pause {
        config.general.pause_on_exit = false;
    }
    Ok(config)
}

async fn run(cli: &Cli, config: &Config, session: &TransportSession) -> Result<()> {
    let report = ScanReport::scan(session)
        .await
        .context("Scanning for devices failed")?;
    if cli.json {
        println!("{}", report.to_json()?);
    } else {
        print!("{}", report.render());
    }
    if cli.scan {
        return Ok(());
    }

    let criteria = MatchCriteria::from_identity(cli.serial_number.clone(), cli.order_code.clone());
    let devices = match DeviceResolver::resolve(session, &criteria).await? {
        Some(devices) => devices,
        None => {
            Cli::command().print_help()?;
            println!();
            println!("{}", NOTHING_TO_STREAM);
            return Ok(());
        }
    };
    if !confirm_device_count(devices.len(), cli.number, io::stdin().lock(), io::stdout())? {
        warn!("Device count mismatch, nothing was streamed");
        return Ok(());
    }

    let requested = parse_channel_list(&cli.enable);
    let factory = factory_for(&config.stream)?;
    let mut supervisor = SessionSupervisor::new(factory, config.stream.clone())
        .with_poll_interval(Duration::from_millis(config.transport.poll_interval_ms));
    supervisor.spawn_all(devices, &requested);

    println!(
        "Streaming {} device(s). Press return or Ctrl-C to stop.",
        supervisor.len()
    );
    wait_for_stop(&supervisor).await;

    let summaries = supervisor.shutdown().await;
    for summary in &summaries {
        info!("{}", summary);
    }
    if summaries
        .iter()
        .any(|summary| summary.reason == StopReason::Disconnected)
    {
        println!("{}", REPLUG);
    }
    Ok(())
}

/// Whether to go ahead and stream the resolved devices.
///
/// On a count mismatch the operator is told and must press return; nothing is
/// streamed afterwards.
fn confirm_device_count<R: BufRead, W: Write>(
    found: usize,
    requested: usize,
    mut input: R,
    mut output: W,
) -> io::Result<bool> {
    match check_device_count(found, requested) {
        Ok(()) => Ok(true),
        Err(e) => {
            let message = match e {
                labbridge_engine::Error::Resolution(message) => message,
                other => other.to_string(),
            };
            write!(output, "{}", message)?;
            output.flush()?;
            let mut line = String::new();
            input.read_line(&mut line)?;
            Ok(false)
        }
    }
}

/// Return on Enter, Ctrl-C, or once every session has ended by itself
async fn wait_for_stop(supervisor: &SessionSupervisor) {
    let (tx, mut enter) = oneshot::channel();
    // a plain thread, so a pending read never holds up runtime shutdown
    std::thread::spawn(move || {
        let mut line = String::new();
        let _ = io::stdin().lock().read_line(&mut line);
        let _ = tx.send(());
    });

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut enter => break,
            _ = &mut ctrl_c => {
                info!("Interrupted");
                break;
            }
            _ = tokio::time::sleep(Duration::from_millis(250)) => {
                if supervisor.active() == 0 {
                    info!("All sessions have ended");
                    break;
                }
            }
        }
    }
}

fn report_failure(err: &anyhow::Error) {
    let connectivity = err.chain().any(|cause| {
        cause
            .downcast_ref::<DeviceError>()
            .map_or(false, DeviceError::is_connectivity_fault)
            || cause
                .downcast_ref::<labbridge_engine::Error>()
                .map_or(false, labbridge_engine::Error::is_connectivity_fault)
    });

    if connectivity {
        println!("{}", REPLUG);
    } else {
        println!("{:#}", err);
    }
    error!("{:#}", err);
}

fn pause() {
    print!("{}", PRESS_RETURN);
    let _ = io::stdout().flush();
    let mut line = String::new();
    let _ = io::stdin().lock().read_line(&mut line);
}
