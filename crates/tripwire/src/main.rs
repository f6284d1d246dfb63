//! Demo host for the Tripwire heap checker.
//!
//! The checker core is a library: a real host wires its fault vector and its
//! checking allocator into it and owns the reboot primitive. This binary
//! plays that host against the simulated backend, replaying access patterns
//! and showing the verdicts. A fatal verdict ends the process with a nonzero
//! exit code, the demo's stand-in for the host's reboot.

use std::process;

use clap::{Parser, Subcommand};
use tripwire_core::error::Violation;
use tripwire_core::sim::{SimHeap, SimSession};
use tripwire_core::source::RegionId;
use tripwire_core::types::{AccessKind, Address};
use tripwire_utils::{info, init_logging, init_logging_with_level, LogFormat, LogLevel};

/// A trap-based heap memory-safety checker, demonstrated against a simulated
/// trap source and allocator.
#[derive(Parser, Debug)]
#[command(name = "tripwire")]
#[command(version)]
#[command(about = "Trap-based heap memory-safety checker demo", long_about = None)]
struct Cli
{
    /// Show every intercepted access, not just violations
    #[arg(long, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands
{
    /// Allocate a block and perform only in-bounds accesses
    Clean,
    /// Read one byte past the end of a 64-byte block
    Overrun,
    /// Free a block, then store to its start address
    UseAfterFree,
    /// Access an address no allocation ever owned
    Unmapped,
}

const HEAP_BASE: u64 = 0x10_0000;

fn session(verbose: bool) -> SimSession<SimHeap>
{
    match SimSession::start(SimHeap::new(HEAP_BASE), RegionId::from_raw(1)) {
        Ok(mut session) => {
            session.checker().quiet(!verbose);
            session
        }
        Err(e) => {
            eprintln!("Failed to start checker: {e}");
            process::exit(1);
        }
    }
}

fn allocate(session: &mut SimSession<SimHeap>, size: usize) -> Address
{
    match session.checker().allocate_unobserved(size) {
        Ok(base) => {
            info!(%base, size, "allocated block");
            base
        }
        Err(e) => {
            eprintln!("Allocation failed: {e}");
            process::exit(1);
        }
    }
}

/// The host's reboot primitive, demo edition.
fn fatal(violation: &Violation) -> !
{
    eprintln!("FATAL: {violation}");
    process::exit(1);
}

fn run(command: &Commands, verbose: bool)
{
    let mut session = session(verbose);

    match command {
        Commands::Clean => {
            let base = allocate(&mut session, 64);
            for offset in [0u64, 10, 63] {
                if let Err(v) = session.access(base + offset, AccessKind::Store) {
                    fatal(&v);
                }
            }
            info!(errors = session.checker().error_count(), "clean run complete");
        }
        Commands::Overrun => {
            let base = allocate(&mut session, 64);
            if let Err(v) = session.access(base + 10, AccessKind::Store) {
                fatal(&v);
            }
            // One byte past the end.
            if let Err(v) = session.access(base + 64, AccessKind::Load) {
                fatal(&v);
            }
        }
        Commands::UseAfterFree => {
            let base = allocate(&mut session, 64);
            if let Err(e) = session.checker().free_unobserved(base) {
                eprintln!("Free failed: {e}");
                process::exit(1);
            }
            info!(%base, "freed block");
            if let Err(v) = session.access(base, AccessKind::Store) {
                fatal(&v);
            }
        }
        Commands::Unmapped => {
            allocate(&mut session, 64);
            if let Err(v) = session.access(Address::from(0xdead_0000), AccessKind::Load) {
                fatal(&v);
            }
        }
    }
}

fn main()
{
    let cli = Cli::parse();

    // --verbose needs TRACE to surface the per-access trap lines; otherwise
    // read RUST_LOG and default to INFO / Pretty.
    let logging = if cli.verbose {
        init_logging_with_level(LogLevel::Trace, LogFormat::Pretty)
    } else {
        init_logging()
    };
    if let Err(e) = logging {
        eprintln!("Failed to initialize logging: {e}");
        process::exit(1);
    }

    run(&cli.command, cli.verbose);
}
