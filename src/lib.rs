//! Compiler for a small statically typed OO language, emitting WebAssembly
//! text (spec §1 "Components"). The pipeline: lex → parse → inline imports
//! and the standard library → semantic analysis (generic instantiation
//! discovery included) → WAT code generation. `driver` wires these together
//! and adds the file/process boundary (reading sources, invoking the
//! external `wat2wasm` assembler, executing via `wasmtime`); `cli`/`main`
//! are the command-line front end.

pub mod ast;
pub mod cli;
pub mod driver;
pub mod importer;
pub mod lexer;
pub mod parser;
pub mod semantic;
pub mod subst;
pub mod wat_codegen;

pub use driver::{compile_file, compile_to_wat, run_wasm};
