//! simprobe command line front end
//!
//! Thin wrapper over the library: every subcommand opens one control session
//! against the runtime's HTTP endpoint and performs a single action.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use log::{error, info, LevelFilter};

use simprobe::{
    CaptureMode, ControlSession, HttpTransport, ProbeResult, RecorderConfig, SessionConfig,
    SignalCatalog, SnapshotStore, StateRecorder, ValueResolver,
};

#[derive(Parser)]
#[command(name = "simprobe", about = "Debug control and state recording for running simulations", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Runtime endpoint as `host:port`. Overrides the config file.
    #[clap(short, long, global = true)]
    endpoint: Option<String>,

    /// Top-level instance name prepended to signal names.
    #[clap(short, long, global = true)]
    prefix: Option<String>,

    /// Session configuration file (JSON). CLI flags override its values.
    #[clap(short, long, global = true)]
    config: Option<PathBuf>,

    /// Upper bound on any single wait, in milliseconds.
    #[clap(long, global = true)]
    timeout_ms: Option<u64>,

    /// Increase verbosity (can be repeated: -vv for trace level).
    #[clap(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Decrease verbosity (can be repeated: -qq for error level).
    #[clap(short, long, global = true, action = clap::ArgAction::Count)]
    quiet: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Print liveness and pause state as JSON.
    Status,

    /// Resume execution.
    Continue {
        /// Block until the simulation pauses again or exits.
        #[clap(long)]
        wait: bool,
    },

    /// Resume until the next statement.
    Step,

    /// Ask the simulator to finish and wait for it to exit.
    Stop,

    /// Turn pausing at every clock edge on or off.
    Clock {
        #[clap(value_enum)]
        mode: ClockMode,
    },

    /// Insert a source breakpoint, or clear all breakpoints with `--clear`.
    Breakpoint {
        /// Source file as known to the simulator.
        #[clap(required_unless_present = "clear")]
        file: Option<String>,

        /// Line number in `file`.
        #[clap(required_unless_present = "clear")]
        line: Option<u32>,

        /// Remove every breakpoint instead.
        #[clap(long, conflicts_with_all = ["file", "line"])]
        clear: bool,
    },

    /// Start or stop value monitors.
    Monitor {
        /// Signal name, relative to the hierarchy prefix.
        #[clap(required_unless_present = "clear")]
        name: Option<String>,

        /// Stop monitoring `name` instead of starting.
        #[clap(long, requires = "name")]
        remove: bool,

        /// Stop every monitor.
        #[clap(long, conflicts_with_all = ["name", "remove"])]
        clear: bool,
    },

    /// Read one signal value.
    Value {
        /// Signal name, relative to the hierarchy prefix.
        name: String,
    },

    /// Print the current simulation time.
    Time,

    /// Record one snapshot per clock pause until the simulation exits.
    ///
    /// The simulation must be paused when recording starts. Pausing at
    /// clock edges is switched on automatically.
    Record(RecordArgs),
}

#[derive(Clone, Copy, ValueEnum)]
enum ClockMode {
    On,
    Off,
}

#[derive(Parser)]
struct RecordArgs {
    /// Design metadata (JSON) listing registers and ports.
    #[clap(long)]
    catalog: PathBuf,

    /// Where to write the recording.
    #[clap(short, long)]
    output: PathBuf,

    /// Wrap the snapshots in a labeled run file instead of a bare array.
    #[clap(long)]
    label: Option<String>,

    /// Clock pauses to skip before the first snapshot.
    #[clap(long, default_value_t = 1)]
    num_wait_reset: u32,

    /// Capture every value into one flat map per snapshot.
    #[clap(long)]
    flat: bool,
}

fn init_logging(verbose: u8, quiet: u8) {
    let level = match (verbose, quiet) {
        (0, 0) => LevelFilter::Info,
        (1, _) => LevelFilter::Debug,
        (v, _) if v >= 2 => LevelFilter::Trace,
        (0, 1) => LevelFilter::Warn,
        (_, _) => LevelFilter::Error,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .format_target(false)
        .init();
}

fn load_config(cli: &Cli) -> ProbeResult<SessionConfig> {
    let mut config = match &cli.config {
        Some(path) => SessionConfig::from_json_file(path)?,
        None => SessionConfig::default(),
    };
    if let Some(endpoint) = &cli.endpoint {
        config.endpoint.clone_from(endpoint);
    }
    if let Some(prefix) = &cli.prefix {
        config.hierarchy_prefix = Some(prefix.clone());
    }
    if let Some(timeout) = cli.timeout_ms {
        config.wait_timeout_ms = Some(timeout);
    }
    Ok(config.validate()?)
}

fn open_session(config: SessionConfig) -> ProbeResult<ControlSession<HttpTransport>> {
    let transport = HttpTransport::from_config(&config);
    ControlSession::new(transport, config)
}

fn connect(config: SessionConfig) -> ProbeResult<ControlSession<HttpTransport>> {
    let mut session = open_session(config)?;
    session.connect()?;
    Ok(session)
}

fn cmd_record(args: RecordArgs, config: SessionConfig) -> ProbeResult<()> {
    let catalog = SignalCatalog::from_json_file(&args.catalog)?;
    let recorder_config = RecorderConfig {
        num_wait_reset: args.num_wait_reset,
        capture: if args.flat { CaptureMode::All } else { CaptureMode::Partitioned },
    };
    let mut session = connect(config)?;
    let recorder = StateRecorder::new(&catalog, recorder_config);
    let store = SnapshotStore::pretty();

    match args.label {
        Some(label) => {
            let run = recorder.record_run(&mut session, &label)?;
            store.dump_run(&run, &args.output)?;
            info!("wrote run '{}' ({} snapshots) to {}", run.label, run.snapshots.len(), args.output.display());
        }
        None => {
            let sequence = recorder.record_state(&mut session)?;
            store.dump_to_path(&sequence, &args.output)?;
            info!("wrote {} snapshots to {}", sequence.len(), args.output.display());
        }
    }
    Ok(())
}

fn print_value(value: Option<u64>) {
    match value {
        Some(v) => println!("{v}"),
        None => println!("null"),
    }
}

fn run(cli: Cli) -> ProbeResult<()> {
    let config = load_config(&cli)?;
    match cli.command {
        Commands::Status => {
            let mut session = open_session(config)?;
            let status = session.observe();
            let json = serde_json::to_string(&status).map_err(simprobe::StoreError::from)?;
            println!("{json}");
        }
        Commands::Continue { wait } => {
            let mut session = connect(config)?;
            session.continue_()?;
            if wait {
                let policy = session.wait_policy();
                let outcome = session.wait_for_pause_or_exit(&policy)?;
                println!("{outcome:?}");
            }
        }
        Commands::Step => {
            let mut session = connect(config)?;
            session.step_over()?;
        }
        Commands::Stop => {
            let mut session = connect(config)?;
            session.stop()?;
            session.wait_until_finished()?;
        }
        Commands::Clock { mode } => {
            let mut session = connect(config)?;
            session.set_pause_on_clock(matches!(mode, ClockMode::On))?;
        }
        Commands::Breakpoint { file, line, clear } => {
            let mut session = connect(config)?;
            match (file, line) {
                (Some(file), Some(line)) if !clear => session.insert_breakpoint(&file, line)?,
                _ => session.clear_breakpoints()?,
            }
        }
        Commands::Monitor { name, remove, clear } => {
            let mut session = connect(config)?;
            match name {
                Some(name) if remove => session.remove_monitor(&name)?,
                Some(name) => session.add_monitor(&name)?,
                None => session.clear_monitors()?,
            }
        }
        Commands::Value { name } => {
            let session = connect(config)?;
            print_value(ValueResolver::new(&session).get_value(&name));
        }
        Commands::Time => {
            let session = connect(config)?;
            print_value(session.simulation_time());
        }
        Commands::Record(args) => cmd_record(args, config)?,
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            if err.is_retryable() {
                error!("the runtime may still be starting; retry once it is listening");
            }
            ExitCode::FAILURE
        }
    }
}
