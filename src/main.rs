//! Entry point for the `munic` compiler executable (spec §6 "CLI";
//! grounded in `core/cli/src/main.rs`'s phase-by-phase `match`/`process::exit`
//! error handling — no panics in the success path — adapted to this
//! language's error taxonomy (spec §7) and `path:line:col: message` format).

use std::path::{Path, PathBuf};
use std::process;

use clap::Parser;

use munic::cli::{Cli, Command};
use munic::driver::{AssemblerError, CompileFileError};

fn main() {
    let cli = Cli::parse();
    let exit_code = match &cli.command {
        Command::Compile(args) => {
            let std_dir = args.std_dir.clone().unwrap_or_else(default_std_dir);
            run_compile(&args.input, &args.output, &std_dir, cli.debug)
        }
        Command::Run(args) => run_run(&args.wasm, cli.debug),
    };
    process::exit(exit_code);
}

/// The `std` directory shipped alongside this compiler's own sources
/// (spec §6: "a directory named `std` sibling to the compiler"). Overridable
/// with `--std-dir` for out-of-tree builds.
fn default_std_dir() -> PathBuf {
    PathBuf::from(concat!(env!("CARGO_MANIFEST_DIR"), "/std"))
}

fn run_compile(input: &Path, output: &Path, std_dir: &Path, debug: bool) -> i32 {
    match munic::compile_file(input, output, std_dir) {
        Ok(()) => 0,
        Err(err) => {
            report_compile_error(input, &err, debug);
            // Assembler exit code propagated on assembler failure (spec §6).
            match &err {
                CompileFileError::Assembler(AssemblerError::NonZeroExit { status, .. }) => *status,
                _ => 1,
            }
        }
    }
}

fn run_run(wasm: &Path, debug: bool) -> i32 {
    match munic::run_wasm(wasm) {
        Ok(()) => 0,
        Err(err) => {
            if debug {
                eprintln!("{err:?}");
            } else {
                eprintln!("{err}");
            }
            1
        }
    }
}

/// Renders a `CompileFileError` per spec §7's error taxonomy. Lex/parse/
/// semantic errors already format as `line:col: message` (via each error
/// type's own `Display`), so only those get `input`'s path prefixed; import
/// and assembler errors already carry their own path inside the message.
fn report_compile_error(input: &Path, err: &CompileFileError, debug: bool) {
    if debug {
        eprintln!("{err:?}");
        return;
    }
    match err {
        CompileFileError::Compile(compile_err) => {
            use munic::driver::CompileError;
            match compile_err {
                CompileError::Import(import_err) => eprintln!("{import_err}"),
                CompileError::Parse(_) | CompileError::Semantic(_) => {
                    eprintln!("{}:{compile_err}", input.display());
                }
                CompileError::Codegen(codegen_err) => eprintln!("{codegen_err}"),
            }
        }
        CompileFileError::ReadSource { .. } | CompileFileError::WriteOutput { .. } | CompileFileError::UnknownExtension { .. } => {
            eprintln!("{err}");
        }
        CompileFileError::Assembler(AssemblerError::NonZeroExit { stderr, .. }) => {
            eprint!("{stderr}");
        }
        CompileFileError::Assembler(assembler_err) => eprintln!("{assembler_err}"),
    }
}
