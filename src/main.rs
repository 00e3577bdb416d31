use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{HumanBytes, HumanCount};
use log::{info, LevelFilter};
use rand::rngs::StdRng;
use rand::SeedableRng;

use parledger::dirsum::{summarize, summarize_recursive};
use parledger::ledger::{Bank, IdAllocator};
use parledger::progress::create_progress_bar;
use parledger::tasks;
use parledger::{ChunkedUpdater, ParallelProcessor, RayonPool, WorkerPool};

#[derive(Parser, Debug)]
#[command(name = "parledger")]
#[command(about = "Chunked parallel updates, parallel loops and task continuations", long_about = None)]
struct Args {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Open a bank of random accounts and pay 5% interest on all of them in parallel
    Bank {
        /// Number of accounts to open
        #[arg(short, long, default_value_t = 1_000_000)]
        accounts: usize,

        /// Number of worker threads (defaults to number of CPU cores)
        #[arg(short = 'j', long)]
        threads: Option<usize>,

        /// Seed for the opening balances
        #[arg(long)]
        seed: Option<u64>,

        /// Print the ledger before and after the interest pass
        #[arg(long)]
        ledger: bool,

        /// Apply interest on the calling thread instead of the worker pool
        #[arg(long)]
        serial: bool,

        /// Disable progress bar
        #[arg(short, long)]
        quiet: bool,
    },

    /// Count files and bytes under a directory
    Dirsum {
        #[arg(value_name = "PATH")]
        path: Option<PathBuf>,

        /// Only look at files directly inside PATH
        #[arg(long)]
        shallow: bool,
    },

    /// Run the task and continuation demonstrations
    Tasks,
}

fn init_logging(verbose: u8) {
    let mut builder = env_logger::Builder::from_default_env();
    match verbose {
        0 => {}
        1 => {
            builder.filter_level(LevelFilter::Debug);
        }
        _ => {
            builder.filter_level(LevelFilter::Trace);
        }
    }
    builder.init();
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    match args.command {
        Command::Bank {
            accounts,
            threads,
            seed,
            ledger,
            serial,
            quiet,
        } => run_bank(accounts, threads, seed, ledger, serial, quiet),
        Command::Dirsum { path, shallow } => run_dirsum(path, shallow),
        Command::Tasks => tasks::run_all().context("Task demonstration failed"),
    }
}

fn run_bank(
    accounts: usize,
    threads: Option<usize>,
    seed: Option<u64>,
    print_ledger: bool,
    serial: bool,
    quiet: bool,
) -> Result<()> {
    // Open the bank
    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let ids = IdAllocator::new();
    let mut bank = Bank::open(&ids, accounts, &mut rng);

    println!("Opened {} accounts", HumanCount(bank.len() as u64));
    println!("Total before interest: {}", bank.total());
    if print_ledger {
        print!("{}", bank);
    }

    let start_time = Instant::now();

    if serial {
        // Baseline pass on this thread
        bank.apply_interest_serial()?;
        println!("Applied interest serially");
    } else {
        // Setup worker pool
        let processor = ParallelProcessor::new(threads);
        let pool = RayonPool::new(processor.num_workers())?;
        let mut updater = ChunkedUpdater::new(pool, processor.num_workers());
        println!("Using {} worker threads", updater.pool().workers());
        info!(
            "{} chunks of up to {} accounts",
            updater.workers(),
            processor.chunk_size(bank.len())?
        );

        // Setup progress bar
        if !quiet {
            updater = updater.with_progress(create_progress_bar(bank.len()));
        }

        // Apply interest in parallel chunks
        let report = bank.apply_interest(&updater)?;

        // Finalize progress
        if let Some(pb) = updater.progress() {
            pb.finish_with_message("Interest applied");
        }
        println!("Applied interest to {}", report);
    }

    // Report totals
    let elapsed = start_time.elapsed();
    let per_sec = bank.len() as f64 / elapsed.as_secs_f64();

    println!("Total after interest: {}", bank.total());
    println!("\nPass completed in {:.2?} ({:.0} accounts/s)", elapsed, per_sec);
    if print_ledger {
        print!("{}", bank);
    }

    Ok(())
}

fn run_dirsum(path: Option<PathBuf>, shallow: bool) -> Result<()> {
    let Some(path) = path else {
        println!("There are no command line arguments.");
        return Ok(());
    };
    if !path.is_dir() {
        println!("The directory does not exist.");
        return Ok(());
    }

    println!("Directory '{}':", path.display());
    let summary = if shallow {
        summarize(&path)?
    } else {
        summarize_recursive(&path)?
    };
    println!(
        "{} files, {} bytes ({})",
        HumanCount(summary.files),
        HumanCount(summary.bytes),
        HumanBytes(summary.bytes)
    );

    Ok(())
}
