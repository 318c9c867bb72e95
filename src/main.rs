// src/main.rs
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};
use anyhow::{bail, Context, Result};
use clap::Parser;
use log::{info, warn};
use eptscope::drivers::{list_ports, Connector, SerialConnector, SimulatedConnector};
use eptscope::{AcquisitionState, Analysis, ConnectionMode, ScopeConfig, ScopeSession};

#[derive(Parser)]
#[command(name = "eptscope")]
#[command(version)]
#[command(about = "Acquire, record and analyse EPTScope ADC samples from a serial port")]
struct Args {
    /// Serial port, e.g. COM3 or /dev/ttyUSB0 (defaults to the first port found)
    #[arg(short, long)]
    port: Option<String>,

    #[arg(short, long, help = "Baud rate (115200, 9600 or 250000)")]
    baud: Option<u32>,

    /// Use the built-in simulated instrument instead of a serial port
    #[arg(long)]
    simulate: bool,

    /// Acquisition time in seconds
    #[arg(short, long, default_value_t = 10.0)]
    duration: f64,

    /// Record every acquired sample to this CSV file
    #[arg(short, long)]
    record: Option<PathBuf>,

    /// Export the final buffer (.csv or .txt)
    #[arg(short, long)]
    export: Option<PathBuf>,

    /// Analyse a saved capture instead of acquiring
    #[arg(short, long, conflicts_with_all = ["record", "simulate"])]
    import: Option<PathBuf>,

    /// lowpass:<hz>[:order], highpass:<hz>[:order] or bandpass:<lo>:<hi>[:order]
    #[arg(short, long)]
    filter: Option<String>,

    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// List serial ports and exit
    #[arg(long)]
    list_ports: bool,

    #[arg(short, long, help = "Show debug information and detailed logs")]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    if args.verbose {
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Debug)
            .init();
    } else {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    }

    if args.list_ports {
        let ports = list_ports().context("enumerating serial ports")?;
        if ports.is_empty() {
            println!("{}", eptscope::drivers::NO_PORTS_PLACEHOLDER);
        }
        for port in ports {
            println!("{:<20} {}", port.name, port.description);
        }
        return Ok(());
    }

    let config = load_config(&args)?;
    if let Some(path) = &args.import {
        let mut session = ScopeSession::new(SerialConnector, config)?;
        let count = session
            .load_file(path)
            .with_context(|| format!("importing {}", path.display()))?;
        println!("Loaded {count} samples from {}", path.display());
        return finish(&session, &args);
    }
    match config.mode {
        ConnectionMode::Simulation => {
            let connector = SimulatedConnector {
                signal: config.simulated_signal(),
            };
            acquire(ScopeSession::new(connector, config)?, &args)
        }
        ConnectionMode::Hardware => acquire(ScopeSession::new(SerialConnector, config)?, &args),
    }
}

fn load_config(args: &Args) -> Result<ScopeConfig> {
    let mut config = match &args.config {
        Some(path) => ScopeConfig::load(path)?,
        None => ScopeConfig::default(),
    };
    if let Some(port) = &args.port {
        config.port = Some(port.clone());
    }
    if let Some(baud) = args.baud {
        config.baud_rate = baud;
    }
    if args.simulate {
        config.mode = ConnectionMode::Simulation;
    }
    if let Some(filter) = &args.filter {
        config.filter = Some(filter.clone());
    }
    config.validate().context("invalid settings")?;
    Ok(config)
}

fn pick_port(config: &ScopeConfig) -> String {
    if let Some(port) = &config.port {
        return port.clone();
    }
    if config.mode == ConnectionMode::Simulation {
        return "SIM".to_string();
    }
    match list_ports() {
        Ok(ports) => ports
            .into_iter()
            .next()
            .map(|p| p.name)
            .unwrap_or_else(|| eptscope::drivers::NO_PORTS_PLACEHOLDER.to_string()),
        Err(e) => {
            warn!("cannot enumerate ports: {e}");
            String::new()
        }
    }
}

fn acquisition_deadline(start: Instant, seconds: f64) -> Result<Instant> {
    if !(seconds.is_finite() && seconds > 0.0) {
        bail!("duration must be a positive number of seconds");
    }
    Duration::try_from_secs_f64(seconds)
        .ok()
        .and_then(|d| start.checked_add(d))
        .with_context(|| format!("duration of {seconds} s is too long"))
}

fn acquire<C: Connector>(mut session: ScopeSession<C>, args: &Args) -> Result<()> {
    let deadline = acquisition_deadline(Instant::now(), args.duration)?;
    if let Some(path) = &args.record {
        session
            .start_recording(path)
            .with_context(|| format!("recording to {}", path.display()))?;
    }
    let port = pick_port(session.config());
    session
        .start(&port)
        .with_context(|| format!("starting acquisition on {port:?}"))?;

    let tick = Duration::from_millis(session.config().tick_interval_ms);
    let mut last_report = Instant::now();
    let mut failure = None;
    while Instant::now() < deadline {
        let frame = session.tick()?;
        if let AcquisitionState::Error(reason) = &frame.state {
            failure = Some(reason.clone());
            break;
        }
        if last_report.elapsed() >= Duration::from_secs(1) {
            last_report = Instant::now();
            let latest = frame.samples.last().map_or(f64::NAN, |s| s.value);
            info!(
                "{} samples buffered, latest {latest:.3} V, {} frames dropped{}",
                frame.samples.len(),
                frame.ingest.dropped,
                if frame.recording { ", recording" } else { "" }
            );
        }
        thread::sleep(tick);
    }
    if session.is_recording() {
        let rows = session.stop_recording()?;
        println!("Recorded {rows} samples");
    }
    session.stop()?;
    if let Some(reason) = failure {
        bail!("acquisition failed: {reason}");
    }
    finish(&session, args)
}

fn finish<C: Connector>(session: &ScopeSession<C>, args: &Args) -> Result<()> {
    if let Some(path) = &args.export {
        let count = session
            .export_file(path)
            .with_context(|| format!("exporting to {}", path.display()))?;
        println!("Exported {count} samples to {}", path.display());
    }
    let filter = session.config().filter_spec()?;
    match session.analyze(filter) {
        Ok(analysis) => print_report(&analysis),
        Err(e) => warn!("skipping analysis: {e}"),
    }
    Ok(())
}

fn print_report(analysis: &Analysis) {
    let stats = &analysis.stats;
    println!("Samples:      {}", stats.count);
    println!("Sample rate:  {:.2} Hz", analysis.sample_rate_hz);
    println!(
        "Voltage:      min {:.4} V, max {:.4} V, mean {:.4} V, rms {:.4} V, p-p {:.4} V",
        stats.min,
        stats.max,
        stats.mean,
        stats.rms,
        stats.peak_to_peak()
    );
    if let Some((freq, mag)) = analysis.spectrum.peak() {
        println!("Spectrum:     peak {freq:.2} Hz ({mag:.4} V)");
    }
    let filtered: Vec<f64> = analysis.filtered.iter().map(|s| s.value).collect();
    let (lo, hi) = filtered
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(*v), hi.max(*v)));
    println!("Filtered:     {:?}, range {lo:.4}..{hi:.4} V", analysis.filter.kind);
}
