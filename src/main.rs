// cesk: run a canonical C program on the CESK machine

use std::fs;
use std::path::PathBuf;
use std::process;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use cesk::ast::Program;
use cesk::interpreter::config::{
    Config, FrameAlloc, HeapAlloc, KontAlloc, OmpSettings, StoreUpdate, ValueDomain,
};
use cesk::memory::limits::LimitsProfile;

/// Run a desugared C program, serialized as a JSON AST, on the CESK machine
#[derive(Debug, Parser)]
#[command(name = "cesk", version)]
struct Args {
    /// Canonical AST in JSON
    program: PathBuf,

    /// concrete, sign or bounded
    #[arg(long, default_value = "concrete")]
    interpretation: ValueDomain,

    /// strong or weak
    #[arg(long, default_value = "strong")]
    store_update: StoreUpdate,

    /// concrete, 0-cfa or p4f
    #[arg(long, default_value = "concrete")]
    kont_alloc: KontAlloc,

    /// concrete or 0-cfa
    #[arg(long, default_value = "concrete")]
    frame_alloc: FrameAlloc,

    /// concrete or abstract
    #[arg(long, default_value = "concrete")]
    heap_alloc: HeapAlloc,

    /// cesk, gcc or std
    #[arg(long, default_value = "cesk")]
    limits: LimitsProfile,

    /// Scheduler steps before the run is abandoned
    #[arg(long, default_value_t = 1_000_000)]
    max_steps: u64,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let omp = match OmpSettings::from_env() {
        Ok(omp) => omp,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(e.exit_code());
        }
    };

    let source = match fs::read_to_string(&args.program) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("Error: cannot read '{}': {}", args.program.display(), e);
            process::exit(1);
        }
    };
    let program: Program = match serde_json::from_str(&source) {
        Ok(program) => program,
        Err(e) => {
            eprintln!("Error: '{}' is not a canonical AST: {}", args.program.display(), e);
            process::exit(1);
        }
    };

    let config = Config {
        domain: args.interpretation,
        store_update: args.store_update,
        kont_alloc: args.kont_alloc,
        frame_alloc: args.frame_alloc,
        heap_alloc: args.heap_alloc,
        limits: args.limits,
        omp,
        max_steps: args.max_steps,
    };
    info!(program = %args.program.display(), ?config, "loaded");

    let report = cesk::run(program, config);
    print!("{}", report.output);

    if let Some(fault) = &report.fault {
        eprintln!("Runtime error: {}", fault);
    }
    if !report.memory_safe {
        eprintln!("Program is not memory safe");
    }
    eprintln!(
        "states: {} generated, {} matched, {} evaluated",
        report.states_generated, report.states_matched, report.states_evaluated
    );
    process::exit(report.exit_code());
}
