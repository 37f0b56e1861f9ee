//! oneshot-demo CLI
//!
//! Runs the client programs of the effect handler runtime.

use clap::{Parser as ClapParser, Subcommand};
use oneshot_demos::{
    actors, async_await, exceptions, fuel, generators, logging, output, rollback, shift0, state,
    threads,
};
use oneshot_runtime::{RuntimeConfig, configure, dump_diagnostics, install_signal_handler};
use std::io::Write;
use std::process;

#[derive(ClapParser)]
#[command(name = "oneshot-demo")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Client programs for one-shot effect handlers", long_about = None)]
struct Cli {
    /// Fiber stack size in bytes (overrides ONESHOT_STACK_SIZE)
    #[arg(long, global = true)]
    stack_size: Option<usize>,

    /// Dump runtime diagnostics to stderr after the demo
    #[arg(long, global = true)]
    diagnostics: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Clone, Copy)]
enum Commands {
    /// Stateful handlers and state as a function
    State,
    /// Generators as iterators over a suspended body
    Generators,
    /// Exceptions with a default value
    Exceptions,
    /// Fuel-bounded and fuel-measured execution
    Fuel {
        /// Units of fuel for the bounded runs
        #[arg(long, default_value_t = 10_000)]
        budget: i64,
    },
    /// Lightweight threads on a round-robin scheduler
    Threads {
        /// Number of forked workers
        #[arg(long, default_value_t = 5)]
        workers: usize,

        /// Steps per worker
        #[arg(long, default_value_t = 10)]
        steps: usize,
    },
    /// Message-passing actors with typed mailboxes
    Actors {
        /// Messages the starter bounces off the echo actor
        #[arg(long, default_value_t = 10)]
        rounds: i32,
    },
    /// Async/await on a randomised scheduler
    AsyncAwait {
        /// Scheduler seed
        #[arg(long, default_value_t = 11)]
        seed: u64,
    },
    /// The shift0/reset control operators
    Shift0,
    /// Assignments rolled back by a handler
    Rollback,
    /// Logging to a stream chosen by the handler
    Logging,
    /// Run every demo with default settings
    All,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Some(stack_size) = cli.stack_size {
        let config = RuntimeConfig {
            stack_size,
            ..RuntimeConfig::default()
        };
        if let Err(e) = configure(config) {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    }
    install_signal_handler();

    match cli.command {
        Commands::All => {
            for command in [
                Commands::State,
                Commands::Generators,
                Commands::Exceptions,
                Commands::Fuel { budget: 10_000 },
                Commands::Threads {
                    workers: 5,
                    steps: 10,
                },
                Commands::Actors { rounds: 10 },
                Commands::AsyncAwait { seed: 11 },
                Commands::Shift0,
                Commands::Rollback,
                Commands::Logging,
            ] {
                run_demo(command);
            }
        }
        command => run_demo(command),
    }

    if cli.diagnostics {
        dump_diagnostics();
    }
}

fn run_demo(command: Commands) {
    let name = demo_name(command);
    tracing::info!(demo = name, "running");
    println!("--- {} ---", name);

    if let Commands::Logging = command {
        let streams = logging::run();
        print!("{}", streams.stdout.borrow());
        eprint!("{}", streams.stderr.borrow());
        return;
    }

    let text = output::capture(|| match command {
        Commands::State => state::run(),
        Commands::Generators => generators::run(),
        Commands::Exceptions => exceptions::run(),
        Commands::Fuel { budget } => fuel::run(budget),
        Commands::Threads { workers, steps } => threads::run(workers, steps),
        Commands::Actors { rounds } => actors::run(rounds),
        Commands::AsyncAwait { seed } => async_await::run(seed),
        Commands::Shift0 => shift0::run(),
        Commands::Rollback => rollback::run(),
        Commands::Logging | Commands::All => {}
    });
    let mut stdout = std::io::stdout().lock();
    let _ = stdout.write_all(text.as_bytes());
    let _ = stdout.flush();
}

fn demo_name(command: Commands) -> &'static str {
    match command {
        Commands::State => "state",
        Commands::Generators => "generators",
        Commands::Exceptions => "exceptions",
        Commands::Fuel { .. } => "fuel",
        Commands::Threads { .. } => "threads",
        Commands::Actors { .. } => "actors",
        Commands::AsyncAwait { .. } => "async-await",
        Commands::Shift0 => "shift0",
        Commands::Rollback => "rollback",
        Commands::Logging => "logging",
        Commands::All => "all",
    }
}
