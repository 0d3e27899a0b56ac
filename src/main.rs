// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Corvid - command-line driver for the Corvid bytecode virtual machine
//!
//! ## Features
//!
//! - Assemble and run bytecode listings
//! - Disassemble listings back to mnemonics
//! - Interactive prompt with completion and history

mod asm;
mod repl;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use corvid_vm::gc::SlabClass;
use corvid_vm::{Error, Heap, HeapConfig, Runtime, Value};
use owo_colors::OwoColorize;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "corvid")]
#[command(about = "Assemble and run Corvid bytecode listings", version)]
struct Cli {
    /// Configuration file; defaults to corvid/config.toml in the user's
    /// config directory
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log collections and runtime setup
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Assemble and run a listing
    Run {
        /// Listing to run
        file: PathBuf,

        /// Log every executed instruction
        #[arg(long)]
        trace: bool,

        /// Print heap statistics afterwards
        #[arg(long)]
        stats: bool,
    },

    /// Assemble a listing and print its disassembly
    Disasm {
        /// Listing to disassemble
        file: PathBuf,
    },

    /// Print the effective configuration
    Config,

    /// Start the interactive prompt (the default)
    Repl,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let trace = matches!(cli.command, Some(Command::Run { trace: true, .. }));
    init_logging(cli.verbose, trace);

    let result = load_config(cli.config.as_deref()).and_then(|config| {
        match cli.command.unwrap_or(Command::Repl) {
            Command::Run { file, trace, stats } => run_file(config, &file, trace, stats),
            Command::Disasm { file } => disasm_file(config, &file),
            Command::Config => {
                print!("{}", toml::to_string_pretty(&config)?);
                Ok(ExitCode::SUCCESS)
            }
            Command::Repl => run_repl(config),
        }
    });

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}: {:#}", "Error".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool, trace: bool) {
    let default = if trace {
        "corvid=debug,corvid_vm=debug,corvid_vm::trace=trace"
    } else if verbose {
        "corvid=debug,corvid_vm=debug"
    } else {
        "corvid=warn,corvid_vm=warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Reads `path`, or the per-user config file when it exists, and applies
/// `CORVID_*` overrides from the environment.
fn load_config(path: Option<&Path>) -> anyhow::Result<HeapConfig> {
    let path = path.map(Path::to_path_buf).or_else(|| {
        dirs::config_dir()
            .map(|dir| dir.join("corvid").join("config.toml"))
            .filter(|path| path.exists())
    });

    match path {
        Some(path) => {
            tracing::debug!(path = %path.display(), "loading configuration");
            HeapConfig::load(&path).with_context(|| format!("loading {}", path.display()))
        }
        None => {
            let mut config = HeapConfig::default();
            config.load_from_env();
            config.validate()?;
            Ok(config)
        }
    }
}

fn read_listing(path: &Path) -> anyhow::Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
}

/// Assemble and run a listing.
fn run_file(config: HeapConfig, path: &Path, trace: bool, stats: bool) -> anyhow::Result<ExitCode> {
    let source = read_listing(path)?;
    let mut runtime = Runtime::with_config(config)?;
    let code = asm::Assembler::new()
        .assemble(runtime.heap_mut(), &source)
        .with_context(|| path.display().to_string())?;
    runtime.heap_mut().roots_mut().push(code);

    let result = if trace {
        runtime.evaluate_traced(code)
    } else {
        runtime.evaluate(code)
    };

    let exit = match result {
        Ok(value) => {
            if !value.is_nil() {
                println!("{}", value.display(runtime.heap()));
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            print_error(runtime.heap(), &e);
            ExitCode::FAILURE
        }
    };

    if stats {
        print_stats(runtime.heap());
    }
    Ok(exit)
}

/// Print every procedure of a listing, then its top-level code.
fn disasm_file(config: HeapConfig, path: &Path) -> anyhow::Result<ExitCode> {
    let source = read_listing(path)?;
    let mut runtime = Runtime::with_config(config)?;
    let mut assembler = asm::Assembler::new();
    let code = assembler
        .assemble(runtime.heap_mut(), &source)
        .with_context(|| path.display().to_string())?;

    let mut names: Vec<String> = assembler.procedures().map(str::to_owned).collect();
    names.sort();
    for name in names {
        if let Some(body) = assembler.procedure_code(&name) {
            println!("{}", format!(".proc {}", name).magenta());
            print!("{}", corvid_vm::bytecode::disassemble(runtime.heap(), body)?);
            println!();
        }
    }
    print!("{}", corvid_vm::bytecode::disassemble(runtime.heap(), code)?);
    Ok(ExitCode::SUCCESS)
}

/// Start the interactive prompt.
fn run_repl(config: HeapConfig) -> anyhow::Result<ExitCode> {
    let mut repl = repl::Repl::new(config)?;
    repl.run().context("REPL failed")?;
    Ok(ExitCode::SUCCESS)
}

/// Print an error, spelling out runtime exceptions.
pub(crate) fn print_error(heap: &Heap, error: &Error) {
    let Some(exception) = error.thrown() else {
        eprintln!("{}: {}", "Error".red().bold(), error);
        return;
    };

    match (heap.exception_kind(exception), heap.exception_message(exception)) {
        (Some(kind), Some(message)) => {
            let irritant = heap.exception_irritant(exception).unwrap_or(Value::Nil);
            eprintln!(
                "{}: {} {}",
                kind.name().red().bold(),
                message,
                irritant.display(heap).cyan()
            );
        }
        _ => eprintln!("{}: {}", "Uncaught".red().bold(), exception.display(heap)),
    }

    if let Ok(trace) = heap.exception_trace(exception) {
        if !trace.is_nil() {
            eprintln!("  {} {}", "in".dimmed(), trace.display(heap));
        }
    }
}

/// Print slab occupancy and collector totals.
pub(crate) fn print_stats(heap: &Heap) {
    eprintln!();
    eprintln!(
        "  {:10} {:>10} {:>10} {:>10}",
        "slab".white().bold(),
        "active",
        "peak",
        "capacity"
    );
    for class in SlabClass::ALL {
        let usage = heap.usage(class);
        eprintln!(
            "  {:10} {:>10} {:>10} {:>10}",
            class.name(),
            usage.active,
            usage.high_water,
            usage.capacity
        );
    }
    let stats = heap.stats();
    eprintln!();
    eprintln!(
        "  {} cycles, {} slots freed",
        stats.cycles.yellow(),
        stats.freed.yellow()
    );
    eprintln!();
}
