//! Loads, optimises, and runs a BF program.
//!
//! Usage: `bfflat <source> [--opt 0|1|2] [--generate] [--out PATH]`

use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use std::process;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use bfflat::{
    load, optimize, render, Engine, MemoryFlags, OptimisationLevel, Outcome, Warning,
    DEFAULT_MEMORY_LENGTH,
};

#[derive(Parser, Debug)]
#[command(name = "bfflat")]
#[command(about = "Optimise and run a BF program")]
struct Args {
    /// Path to the BF source file
    source: PathBuf,

    /// Where to write the instruction listing (defaults to `<source>.abf`)
    #[arg(long = "out")]
    out: Option<PathBuf>,

    /// Optimisation level: 0 (none), 1 (minimal), 2 (maximal)
    #[arg(long = "opt", value_parser = clap::value_parser!(u8).range(0..=2))]
    opt: Option<u8>,

    /// Write the instruction listing before running
    #[arg(long)]
    generate: bool,

    /// Grow the memory band on demand instead of faulting past its end
    #[arg(long)]
    growable: bool,

    /// Initial number of memory cells
    #[arg(long, default_value_t = DEFAULT_MEMORY_LENGTH)]
    memory: usize,

    /// Give up after this many instructions
    #[arg(long)]
    max_steps: Option<u64>,
}

impl Args {
    fn level(&self) -> OptimisationLevel {
        match self.opt {
            None => OptimisationLevel::default(),
            Some(0) => OptimisationLevel::None,
            Some(1) => OptimisationLevel::Minimal,
            Some(_) => OptimisationLevel::Maximal,
        }
    }

    fn listing_path(&self) -> PathBuf {
        match self.out {
            Some(ref out) => out.clone(),
            None => with_extra_extension(&self.source, "abf"),
        }
    }
}

fn with_extra_extension(path: &Path, extension: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".");
    name.push(extension);
    PathBuf::from(name)
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn report(warnings: &[Warning]) {
    for warning in warnings {
        eprintln!("{}", warning);
    }
}

/// Returns the process exit status.
fn run(args: &Args) -> Result<i32> {
    let file = File::open(&args.source)
        .with_context(|| format!("No input file {}", args.source.display()))?;
    let (instrs, warnings) = load(BufReader::new(file))
        .with_context(|| format!("Failed to read {}", args.source.display()))?;
    report(&warnings);

    let (instrs, warnings) = optimize(instrs, args.level());
    report(&warnings);

    if args.generate {
        let path = args.listing_path();
        info!("Writing to file {}", path.display());
        fs::write(&path, render(&instrs))
            .with_context(|| format!("Failed to create file {}", path.display()))?;
    }

    let flags = if args.growable {
        MemoryFlags::GROWABLE
    } else {
        MemoryFlags::empty()
    };

    info!("Running program {}", args.source.display());
    let mut engine = Engine::with_memory(
        &instrs,
        args.memory,
        flags,
        io::stdin().lock(),
        io::stdout().lock(),
    );

    let status = match engine.run_bounded(args.max_steps.unwrap_or(u64::MAX)) {
        Outcome::Completed(steps) => {
            info!("Program finished (in {} steps)", steps);
            0
        }
        Outcome::Faulted(steps, e) => {
            error!("Got out with an error: {}", e);
            info!("Program finished (in {} steps)", steps);
            2
        }
        Outcome::OutOfSteps(steps) => {
            warn!("Step limit reached after {} steps", steps);
            3
        }
    };
    Ok(status)
}

fn main() {
    init_logging();
    let args = Args::parse();

    match run(&args) {
        Ok(status) => process::exit(status),
        Err(e) => {
            error!("{:#}", e);
            process::exit(1);
        }
    }
}
