use anyhow::{Context, Result};
use challenger_core::{
    CarriageReturn, Machine, MachineConfig, OpcodeProfiler, RunSummary, Status,
    StreamConsole, TracingObserver,
};
use clap::{ArgAction, Parser};
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "challenger")]
#[command(about = "Run a Synacor Challenge VM image", long_about = None)]
struct Args {
    /// Path to the binary image (little-endian 16-bit words)
    #[arg(default_value = "challenge.bin")]
    image: PathBuf,

    /// JSON machine config; flags below override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Stop after this many instructions (0 = no limit)
    #[arg(long)]
    max_steps: Option<u64>,

    /// Deliver carriage returns to `in` instead of swallowing them
    #[arg(long, action = ArgAction::SetTrue)]
    keep_cr: bool,

    /// Feed the contents of this file as input before reading stdin
    #[arg(long)]
    input: Option<PathBuf>,

    /// Log every executed instruction at debug level
    #[arg(long, action = ArgAction::SetTrue)]
    trace: bool,

    /// Print a per-opcode execution count table after the run
    #[arg(long, action = ArgAction::SetTrue)]
    profile_opcodes: bool,

    /// Write a JSON run summary to this path
    #[arg(long)]
    summary_json: Option<PathBuf>,
}

fn init_logging(trace: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if trace {
            "warn,challenger_core=debug"
        } else {
            "warn"
        })
    });
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn build_config(args: &Args) -> Result<MachineConfig> {
    let mut config = match args.config.as_ref() {
        Some(path) => MachineConfig::load(path)?,
        None => MachineConfig::default(),
    };
    if let Some(limit) = args.max_steps {
        config.max_steps = (limit > 0).then_some(limit);
    }
    if args.keep_cr {
        config.carriage_return = CarriageReturn::Deliver;
    }
    Ok(config)
}

fn print_profile(profiler: &OpcodeProfiler) {
    let total = profiler.total();
    eprintln!("Executed {total} instructions");
    for (entry, count) in profiler.rows() {
        let share = if total > 0 {
            count as f64 * 100.0 / total as f64
        } else {
            0.0
        };
        eprintln!("{:>5} {:>12} {:>6.2}%", entry.mnemonic, count, share);
    }
}

fn main() -> Result<ExitCode> {
    let args = Args::parse();
    init_logging(args.trace);

    let config = build_config(&args)?;
    let mut machine = Machine::with_config(config);
    machine
        .load_image_file(&args.image)
        .with_context(|| format!("failed to load image {}", args.image.display()))?;

    let script = match args.input.as_ref() {
        Some(path) => fs::read(path)
            .with_context(|| format!("failed to read input {}", path.display()))?,
        None => Vec::new(),
    };
    let mut console = StreamConsole::stdio().with_script(script);

    let mut observers = (
        args.trace.then_some(TracingObserver),
        args.profile_opcodes.then(OpcodeProfiler::new),
    );
    let outcome = machine.run_observed(&mut console, &mut observers);
    console.flush().context("failed to flush output")?;

    if let Some(profiler) = observers.1.as_ref() {
        print_profile(profiler);
    }
    if let Some(path) = args.summary_json.as_ref() {
        let summary = RunSummary::new(args.image.display().to_string(), &machine, &outcome);
        fs::write(path, summary.to_json()?)
            .with_context(|| format!("failed to write summary {}", path.display()))?;
    }

    Ok(ExitCode::from(exit_status(&machine, &outcome)))
}

/// Process exit status for a finished run. `ret` on an empty stack counts as
/// a normal exit.
fn exit_status(machine: &Machine, outcome: &challenger_core::Result<Status>) -> u8 {
    match outcome {
        Ok(Status::Halted) => {
            info!(steps = machine.steps(), "halted");
            0
        }
        Ok(Status::Running) => {
            warn!(
                steps = machine.steps(),
                limit = ?machine.config().max_steps,
                ip = machine.ip(),
                "step budget exhausted"
            );
            0
        }
        // The stdio console blocks instead of reporting a wait.
        Ok(Status::AwaitingInput) => 0,
        Err(err) if err.is_clean_exit() => {
            warn!(ip = err.ip(), "returned with an empty stack; treating as exit");
            0
        }
        Err(err) => {
            eprintln!("error: {err}");
            1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use challenger_core::{BufferConsole, Error, Opcode};

    fn args(extra: &[&str]) -> Args {
        let argv = std::iter::once("challenger").chain(extra.iter().copied());
        Args::try_parse_from(argv).unwrap()
    }

    fn config_file(name: &str, json: &str) -> PathBuf {
        let file = format!("challenger-cli-{}-{name}", std::process::id());
        let path = std::env::temp_dir().join(file);
        fs::write(&path, json).unwrap();
        path
    }

    #[test]
    fn defaults_to_challenge_bin_and_default_config() {
        let args = args(&[]);
        assert_eq!(args.image, PathBuf::from("challenge.bin"));
        let config = build_config(&args).unwrap();
        assert_eq!(config.max_steps, None);
        assert_eq!(config.carriage_return, CarriageReturn::Swallow);
    }

    #[test]
    fn zero_max_steps_overrides_config_budget() {
        let path = config_file("budget.json", r#"{"max_steps": 50}"#);
        let path_arg = path.to_string_lossy().into_owned();

        let from_file = build_config(&args(&["--config", &path_arg])).unwrap();
        assert_eq!(from_file.max_steps, Some(50));

        let unbounded =
            build_config(&args(&["--config", &path_arg, "--max-steps", "0"])).unwrap();
        assert_eq!(unbounded.max_steps, None);

        let tighter =
            build_config(&args(&["--config", &path_arg, "--max-steps", "7"])).unwrap();
        assert_eq!(tighter.max_steps, Some(7));

        fs::remove_file(&path).ok();
    }

    #[test]
    fn keep_cr_overrides_config() {
        let path = config_file("cr.json", r#"{"carriage_return": "swallow"}"#);
        let path_arg = path.to_string_lossy().into_owned();

        let config = build_config(&args(&["--config", &path_arg, "--keep-cr"])).unwrap();
        assert_eq!(config.carriage_return, CarriageReturn::Deliver);

        fs::remove_file(&path).ok();
    }

    #[test]
    fn exit_status_distinguishes_clean_exits_from_faults() {
        let mut machine = Machine::new();
        machine.load(&[18]);
        let ret = machine.run(&mut BufferConsole::new());
        assert!(matches!(ret, Err(Error::StackUnderflow { op: Opcode::Ret, .. })));
        assert_eq!(exit_status(&machine, &ret), 0);

        machine.load(&[11, 32768, 1, 0]);
        let fault = machine.run(&mut BufferConsole::new());
        assert!(matches!(fault, Err(Error::DivisionByZero { .. })));
        assert_eq!(exit_status(&machine, &fault), 1);

        machine.load(&[0]);
        let halted = machine.run(&mut BufferConsole::new());
        assert_eq!(exit_status(&machine, &halted), 0);
        assert_eq!(exit_status(&machine, &Ok(Status::Running)), 0);
    }
}
