//! Bitonic Stage Scheduler CLI
//!
//! Sorts one generated array with the staged bitonic network and checks the
//! result, or benchmarks the network against CPU baselines:
//!
//! ```text
//! bitonic-stages --size 1048576 --direction desc --timing
//! bitonic-stages --size 64 --local-size 2 --plan
//! bitonic-stages --backend metal --benchmark
//! ```

use std::process::ExitCode;
use std::time::Instant;

use clap::{ArgAction, Parser, ValueEnum};
use rayon::prelude::*;
use tracing::error;
use tracing_subscriber::EnvFilter;

use bitonic_stages::cpu_substrate::DEFAULT_MAX_LOCAL_SIZE;
use bitonic_stages::workload::{generate, InputPattern};
use bitonic_stages::{
    reference, BitonicSorter, CpuSubstrate, Direction, ExecutionSubstrate, MetalSubstrate,
    SortConfig, SortError, Stopwatch, SubstrateError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Backend {
    /// Rayon thread pool
    Cpu,
    /// Metal GPU (macOS only)
    Metal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum DirectionArg {
    Asc,
    Desc,
}

impl From<DirectionArg> for Direction {
    fn from(arg: DirectionArg) -> Self {
        match arg {
            DirectionArg::Asc => Direction::Ascending,
            DirectionArg::Desc => Direction::Descending,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum PatternArg {
    /// Uniform values in [1, 100]
    Random,
    /// Uniform values over the whole i32 range
    Wide,
    Sorted,
    Reversed,
    Constant,
}

impl From<PatternArg> for InputPattern {
    fn from(arg: PatternArg) -> Self {
        match arg {
            PatternArg::Random => InputPattern::Random,
            PatternArg::Wide => InputPattern::Wide,
            PatternArg::Sorted => InputPattern::Sorted,
            PatternArg::Reversed => InputPattern::Reversed,
            PatternArg::Constant => InputPattern::Constant,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "bitonic-stages", version, about = "Staged data-parallel bitonic sort")]
struct Cli {
    /// Array length, a power of two of at least 8
    #[arg(short = 'n', long, default_value_t = 32)]
    size: usize,

    #[arg(short, long, value_enum, default_value_t = DirectionArg::Asc)]
    direction: DirectionArg,

    #[arg(short, long, value_enum, default_value_t = Backend::Cpu)]
    backend: Backend,

    /// Work-group width in lanes (defaults to the substrate maximum)
    #[arg(long)]
    local_size: Option<usize>,

    /// CPU worker threads (0 = one per core)
    #[arg(long, default_value_t = 0)]
    threads: usize,

    /// Maximum work-group width reported by the CPU substrate
    #[arg(long, default_value_t = DEFAULT_MAX_LOCAL_SIZE)]
    max_local_size: usize,

    #[arg(long, value_enum, default_value_t = PatternArg::Random)]
    pattern: PatternArg,

    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Print the generated input
    #[arg(long)]
    show_input: bool,

    /// Print the sorted output
    #[arg(long)]
    show_output: bool,

    /// Report total and per-round timings
    #[arg(long)]
    timing: bool,

    /// Print the round sequence without sorting
    #[arg(long)]
    plan: bool,

    /// Benchmark sizes 2^10 to 2^20 against CPU baselines
    #[arg(long)]
    benchmark: bool,

    /// Raise log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = if cli.benchmark {
        run_benchmark(&cli).map(|()| true)
    } else {
        run(&cli)
    };

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(2),
        Err(e) => {
            error!("{}", e);
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn make_substrate(cli: &Cli) -> Result<Box<dyn ExecutionSubstrate>, SubstrateError> {
    let substrate: Box<dyn ExecutionSubstrate> = match cli.backend {
        Backend::Cpu => Box::new(
            CpuSubstrate::with_threads(cli.threads)?.with_max_local_size(cli.max_local_size),
        ),
        Backend::Metal => Box::new(MetalSubstrate::new()?),
    };
    Ok(substrate)
}

fn make_config(cli: &Cli, len: usize) -> Result<SortConfig, SortError> {
    let config = SortConfig::new(len, cli.direction.into())?;
    match cli.local_size {
        Some(local_size) => config.with_local_size(local_size),
        None => Ok(config),
    }
}

/// Sort one array. Returns the integrity verdict.
fn run(cli: &Cli) -> Result<bool, SortError> {
    println!("Bitonic Stage Scheduler");
    println!("=======================\n");

    let config = make_config(cli, cli.size)?;
    let substrate =
        make_substrate(cli).map_err(|e| SortError::Capability(e.to_string()))?;
    println!("Using substrate: {}", substrate.info());

    let mut sorter = BitonicSorter::new(substrate);
    let schedule = sorter.plan(&config)?;
    let geometry = schedule.geometry();
    println!(
        "Array size: {} elements, direction: {}",
        config.len(),
        config.direction()
    );
    println!(
        "Lanes: {} global, {} per work-group, {} tiles, {} rounds\n",
        geometry.global_size,
        geometry.local_size,
        geometry.num_stages,
        schedule.len()
    );

    if cli.plan {
        for (i, round) in schedule.rounds().iter().enumerate() {
            println!("{:>4}  {}", i, round);
        }
        return Ok(true);
    }

    let mut data = generate(cli.pattern.into(), config.len(), cli.seed);
    if cli.show_input {
        println!("Input:");
        print_values(&data);
    }

    let mut stopwatch = Stopwatch::new();
    let outcome = sorter.sort_with_hooks(&mut data, &config, &mut stopwatch)?;

    if outcome.sorted {
        println!("Success!");
        if cli.show_output {
            print_values(&data);
        }
    } else {
        println!("Sorting failed.");
    }

    if cli.timing {
        if let Some(total) = stopwatch.total() {
            println!("\nSort time: {:.3} ms", total.as_secs_f64() * 1000.0);
        }
        for (round, duration) in stopwatch.rounds() {
            println!("  {:<48} {:>10.3} ms", round.to_string(), duration.as_secs_f64() * 1000.0);
        }
    }

    Ok(outcome.sorted)
}

fn print_values(data: &[i32]) {
    for value in data {
        println!("{}", value);
    }
}

/// Run benchmarks across multiple array sizes
fn run_benchmark(cli: &Cli) -> Result<(), SortError> {
    println!("\n====================================");
    println!("Running comprehensive benchmark...");
    println!("====================================\n");

    let substrate =
        make_substrate(cli).map_err(|e| SortError::Capability(e.to_string()))?;
    println!("Using substrate: {}\n", substrate.info());
    let mut sorter = BitonicSorter::new(substrate);
    let direction: Direction = cli.direction.into();

    println!(
        "{:>10} | {:>12} | {:>12} | {:>14} | {:>14} | {:>10}",
        "Size", "std (ms)", "rayon (ms)", "reference (ms)", "staged (ms)", "staged/std"
    );
    println!(
        "{:-<10}-+-{:-<12}-+-{:-<12}-+-{:-<14}-+-{:-<14}-+-{:-<10}",
        "", "", "", "", "", ""
    );

    for size_exp in (10..=20).step_by(2) {
        let size = 1usize << size_exp;
        let data = generate(InputPattern::Wide, size, cli.seed);
        let config = make_config(cli, size)?;

        let mut std_data = data.clone();
        let start = Instant::now();
        std_data.sort_unstable();
        let std_ms = start.elapsed().as_secs_f64() * 1000.0;

        let mut rayon_data = data.clone();
        let start = Instant::now();
        rayon_data.par_sort_unstable();
        let rayon_ms = start.elapsed().as_secs_f64() * 1000.0;

        let mut reference_data = data.clone();
        let start = Instant::now();
        reference::sort(&mut reference_data, direction);
        let reference_ms = start.elapsed().as_secs_f64() * 1000.0;

        let mut staged_data = data.clone();
        let start = Instant::now();
        let outcome = sorter.sort(&mut staged_data, &config)?;
        let staged_ms = start.elapsed().as_secs_f64() * 1000.0;

        let staged = if outcome.sorted {
            format!("{:.3}", staged_ms)
        } else {
            "ERROR".to_string()
        };
        println!(
            "{:>10} | {:>12.3} | {:>12.3} | {:>14.3} | {:>14} | {:>9.2}x",
            size,
            std_ms,
            rayon_ms,
            reference_ms,
            staged,
            staged_ms / std_ms
        );
    }

    println!("\nNote: staged/std < 1.0x means the staged network beat slice::sort_unstable");
    Ok(())
}
