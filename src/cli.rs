//! Command line argument parsing (spec §6 "CLI"; grounded in
//! `core/cli/src/parser.rs`'s `clap`-derive shape and doc-comment density,
//! adapted to the two subcommands `original_source/muni2wasm/cli.py`
//! exposes via `argparse`).

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Command line interface for the `munic` compiler.
#[derive(Parser)]
#[command(
    name = "munic",
    author,
    version,
    about = "Compiler for a small statically typed OO language, emitting WebAssembly text"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Print full diagnostic traces instead of one-line `path:line:col: message` errors.
    #[clap(long, global = true)]
    pub debug: bool,
}

#[derive(Subcommand)]
pub enum Command {
    /// Compile a source file to WAT or WASM.
    ///
    /// The output path's extension decides the artifact: `.wat` writes WAT
    /// text directly, `.wasm` pipes the WAT through the external assembler
    /// `wat2wasm`.
    Compile(CompileArgs),

    /// Execute a compiled `.wasm` module's `main` against the host ABI.
    Run(RunArgs),
}

#[derive(Args)]
pub struct CompileArgs {
    /// Source file to compile.
    pub input: PathBuf,

    /// Output path; extension (`.wat`/`.wasm`) selects the artifact kind.
    pub output: PathBuf,

    /// Standard library directory to inline (spec §6); defaults to the
    /// `std` directory shipped alongside this compiler's sources.
    #[clap(long)]
    pub std_dir: Option<PathBuf>,
}

#[derive(Args)]
pub struct RunArgs {
    /// Compiled `.wasm` module to execute.
    pub wasm: PathBuf,
}
