// src/main.rs
mod config;
mod drivers;
mod recorder;
mod types;
mod viewer;

use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use log::{debug, info, warn};

use crate::config::BenchConfig;
use crate::drivers::bsmp::DrsBoard;
use crate::drivers::scpi::ScpiInstrument;
use crate::drivers::sim::sim_pair;
use crate::drivers::{
    save_leakage_plot, spawn_acquisition, AcquisitionPlan, BenchError, BenchSession, Board,
    CancelHandle, Instrument, PlotStyle, SampleSeries, Sampler, StopReason, SummaryStats,
    ThreadPacer,
};
use crate::types::ConnectionMode;

type DynSession = BenchSession<Box<dyn Instrument + Send>, Box<dyn Board + Send>>;

#[derive(Parser)]
#[command(name = "ldc-bench", version)]
#[command(about = "Leakage detection board test bench", long_about = None)]
struct Cli {
    /// Log filter (error, warn, info, debug, trace); overrides RUST_LOG
    #[arg(long, global = true)]
    log_level: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply a reference current and record the board's leakage reading
    Run(RunArgs),
    /// Re-render a saved CSV to an image or a window
    Plot(PlotArgs),
    /// Run only the degaussing procedure
    Degauss(ConnectArgs),
    /// Print configuration
    Config {
        /// Print the built-in defaults as JSON
        #[arg(long)]
        print_default: bool,
        /// Config file to load and print
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[derive(Args)]
struct ConnectArgs {
    /// JSON config file
    #[arg(long)]
    config: Option<PathBuf>,
    /// Use simulated instrument and board
    #[arg(long)]
    simulate: bool,
    /// Instrument address (host or host:port)
    #[arg(long)]
    instrument: Option<String>,
    /// Serial port of the board
    #[arg(long)]
    port: Option<String>,
}

#[derive(Args)]
struct RunArgs {
    #[command(flatten)]
    connect: ConnectArgs,
    /// Reference current in amperes
    #[arg(long)]
    current: f64,
    /// Acquisition time in seconds
    #[arg(long)]
    duration: f64,
    /// Sample rate in Hz (defaults to the config value)
    #[arg(long)]
    rate: Option<f64>,
    /// Degauss the board before applying the current
    #[arg(long)]
    degauss: bool,
    /// Acquire on a background thread; press Enter to stop early
    #[arg(long)]
    background: bool,
    /// Directory for exported files
    #[arg(long, default_value = ".")]
    output_dir: PathBuf,
    /// File stem for exports (defaults to the Iref-based name)
    #[arg(long)]
    name: Option<String>,
    /// Save the chart (.jpg) and the CSV
    #[arg(long)]
    save: bool,
    /// Open the interactive plot window
    #[arg(long)]
    show: bool,
}

#[derive(Args)]
struct PlotArgs {
    /// CSV file written by `run --save`
    csv: PathBuf,
    /// Image to write (.png or .jpg); without it a window is opened
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// Chart title (defaults to the file stem)
    #[arg(long)]
    title: Option<String>,
}

fn init_logging(level: Option<&str>) {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if let Some(level) = level {
        builder.parse_filters(level);
    }
    builder.init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_level.as_deref());

    match cli.command {
        Commands::Run(args) => cmd_run(args),
        Commands::Plot(args) => cmd_plot(args),
        Commands::Degauss(args) => cmd_degauss(args),
        Commands::Config {
            print_default,
            config,
        } => cmd_config(print_default, config.as_deref()),
    }
}

fn load_config(args: &ConnectArgs) -> Result<BenchConfig> {
    let mut config = BenchConfig::load_or_default(args.config.as_deref())
        .context("Failed to load bench configuration")?;
    if let Some(address) = &args.instrument {
        config.instrument.address = address.clone();
    }
    if let Some(port) = &args.port {
        config.board.port = port.clone();
    }
    Ok(config)
}

fn connect(config: &BenchConfig, mode: ConnectionMode) -> Result<DynSession> {
    let (instrument, board): (Box<dyn Instrument + Send>, Box<dyn Board + Send>) = match mode {
        ConnectionMode::Simulation => {
            info!("Using simulated instrument and board");
            let (instrument, board) = sim_pair(&config.simulation);
            (Box::new(instrument), Box::new(board))
        }
        ConnectionMode::Hardware => {
            let instrument = ScpiInstrument::connect(
                &config.instrument.address,
                Duration::from_millis(config.instrument.timeout_ms),
            )
            .map_err(BenchError::instrument)
            .with_context(|| format!("Failed to connect to {}", config.instrument.address))?;
            let board = DrsBoard::open(
                &config.board.port,
                config.board.baud_rate,
                Duration::from_millis(config.board.timeout_ms),
                config.bsmp_settings(),
            )
            .map_err(BenchError::board)
            .with_context(|| format!("Failed to open {}", config.board.port))?;
            info!(
                "Connected: instrument {} / board {}",
                config.instrument.address, config.board.port
            );
            (Box::new(instrument), Box::new(board))
        }
    };
    Ok(BenchSession::new(instrument, board, config.session_settings()))
}

fn mode_of(args: &ConnectArgs) -> ConnectionMode {
    if args.simulate {
        ConnectionMode::Simulation
    } else {
        ConnectionMode::Hardware
    }
}

fn cmd_run(args: RunArgs) -> Result<()> {
    let config = load_config(&args.connect)?;
    let rate = args.rate.unwrap_or(config.acquisition.sample_rate_hz);
    let plan = AcquisitionPlan::new(args.duration, rate)?;

    let mut session = connect(&config, mode_of(&args.connect))?;
    let (applied_amps, series, summary) = if args.background {
        acquire_in_background(session, &args, plan, config.acquisition.queue_depth)?
    } else {
        let outcome = prepare_and_acquire(&mut session, &args, &plan);
        // output goes off whether or not the acquisition succeeded
        let shutdown = session.shutdown();
        let (applied_amps, series, summary) = outcome?;
        shutdown.context("Failed to disable instrument output")?;
        (applied_amps, series, Some(summary))
    };
    let (title, stem) = export_names(applied_amps, args.name.as_deref());

    info!("Recorded {:.1} s of data", series.duration_seconds());
    match &summary {
        Some(summary) => {
            println!("{summary}");
            println!("Test time: {}", summary.completed_at.format("%Y-%m-%d %H:%M:%S"));
        }
        None => {
            warn!(
                "Acquisition stopped early with {} samples; nothing is exported",
                series.len()
            );
            return Ok(());
        }
    }

    if args.save {
        std::fs::create_dir_all(&args.output_dir)
            .with_context(|| format!("Failed to create {}", args.output_dir.display()))?;
        let csv_path = args.output_dir.join(format!("{stem}.csv"));
        recorder::write_csv(&csv_path, &series)
            .with_context(|| format!("Failed to save {}", csv_path.display()))?;
        println!("CSV saved to {}", csv_path.display());
        let image_path = args.output_dir.join(format!("{stem}.jpg"));
        save_leakage_plot(&series, &title, &image_path, &PlotStyle::default())
            .with_context(|| format!("Failed to save {}", image_path.display()))?;
        println!("Plot saved to {}", image_path.display());
    }
    if args.show {
        viewer::show_leakage_plot(&series, &title, summary)?;
    }
    Ok(())
}

/// Chart title and file stem, named after the current the instrument reports.
fn export_names(applied_amps: f64, name: Option<&str>) -> (String, String) {
    let iref_ma = applied_amps * 1000.0;
    let title = format!("Leakage Current Measurement, Iref = {iref_ma:.1}mA");
    let stem = name
        .map(str::to_owned)
        .unwrap_or_else(|| format!("Leakage_Current_Measurement-Iref_{iref_ma:.1}mA"));
    (title, stem)
}

/// Degausses if asked, applies the reference current and returns its read-back in amperes.
fn prepare(session: &mut DynSession, args: &RunArgs) -> Result<f64> {
    if args.degauss {
        session.degauss().context("Degaussing failed")?;
    }
    let actual = session
        .apply_reference(args.current)
        .context("Failed to apply reference current")?;
    info!("Reference current: {:.3} mA", actual * 1000.0);
    Ok(actual)
}

fn prepare_and_acquire(
    session: &mut DynSession,
    args: &RunArgs,
    plan: &AcquisitionPlan,
) -> Result<(f64, SampleSeries, SummaryStats)> {
    let applied_amps = prepare(session, args)?;
    let mut sampler = Sampler::new();
    if let Err(err) = sampler.acquire(session, plan.duration_s, plan.sample_rate_hz) {
        warn!("Acquisition aborted after {} samples", sampler.series().len());
        return Err(err).context("Acquisition failed");
    }
    let summary = sampler
        .last_summary()
        .cloned()
        .context("Acquisition finished without a summary")?;
    Ok((applied_amps, sampler.series().clone(), summary))
}

fn acquire_in_background(
    mut session: DynSession,
    args: &RunArgs,
    plan: AcquisitionPlan,
    queue_depth: usize,
) -> Result<(f64, SampleSeries, Option<SummaryStats>)> {
    let applied_amps = match prepare(&mut session, args) {
        Ok(amps) => amps,
        Err(err) => {
            if let Err(shutdown_err) = session.shutdown() {
                warn!("Failed to disable instrument output: {shutdown_err}");
            }
            return Err(err);
        }
    };
    let task = spawn_acquisition(session, plan, queue_depth, ThreadPacer)?;
    let cancel = task.cancel_handle();
    println!("Acquiring {} samples, press Enter to stop", task.plan().count);
    // detached; it may still be blocked on stdin when the process exits
    std::thread::spawn(move || stop_on_enter(std::io::stdin().lock(), &cancel));
    let mut outcome = task.join()?;
    outcome
        .session
        .shutdown()
        .context("Failed to disable instrument output")?;
    match outcome.stop {
        StopReason::Failed(err) => Err(err).context("Acquisition failed"),
        StopReason::Completed | StopReason::Cancelled => {
            Ok((applied_amps, outcome.series, outcome.summary))
        }
    }
}

/// Cancels once a line is entered. End of input (a closed or redirected
/// stdin) leaves the acquisition running.
fn stop_on_enter<R: BufRead>(mut input: R, cancel: &CancelHandle) {
    let mut line = String::new();
    match input.read_line(&mut line) {
        Ok(n) if n > 0 => cancel.cancel(),
        Ok(_) => debug!("stdin closed; acquisition runs to completion"),
        Err(err) => debug!("stdin unreadable ({err}); acquisition runs to completion"),
    }
}

fn cmd_plot(args: PlotArgs) -> Result<()> {
    let table = recorder::read_csv(&args.csv)
        .with_context(|| format!("Failed to read {}", args.csv.display()))?;
    let series = table.into_series();
    if series.is_empty() {
        bail!("{} holds no samples", args.csv.display());
    }
    let title = args.title.unwrap_or_else(|| default_title(&args.csv));
    match args.output {
        Some(path) => {
            save_leakage_plot(&series, &title, &path, &PlotStyle::default())
                .with_context(|| format!("Failed to save {}", path.display()))?;
            println!("Plot saved to {}", path.display());
        }
        None => viewer::show_leakage_plot(&series, &title, None)?,
    }
    Ok(())
}

fn default_title(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().replace('_', " "))
        .unwrap_or_else(|| "Leakage Current".to_owned())
}

fn cmd_degauss(args: ConnectArgs) -> Result<()> {
    let config = load_config(&args)?;
    let mut session = connect(&config, mode_of(&args))?;
    session.degauss().context("Degaussing failed")?;
    println!("Degaussing done");
    Ok(())
}

fn cmd_config(print_default: bool, path: Option<&Path>) -> Result<()> {
    let config = if print_default {
        BenchConfig::default()
    } else {
        BenchConfig::load_or_default(path)?
    };
    println!("{}", config.to_json_pretty()?);
    Ok(())
}
