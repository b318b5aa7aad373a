//! dlc — a small compiler for the DL toy language.
//!
//! DL is an imperative language with Portuguese keywords (`programa`,
//! `inicio`, `se`, `enquanto`, ...), three types (`booleano`, `inteiro`,
//! `real`) and console I/O. The pipeline is strictly linear; each phase
//! fully consumes the previous one's output:
//!
//! - [`lex`] / [`syntax`] — scanning and recursive-descent parsing with
//!   panic-mode recovery.
//! - [`semantic`] — scope resolution and type checking; annotates the
//!   [`tree`] and inserts numeric conversions.
//! - [`inter`] — three-address IR over a control-flow graph of basic
//!   blocks, plus a direct interpreter for validation.
//! - [`codegen`] — live ranges, linear-scan register allocation over the
//!   integer and floating register classes, and x86-64 assembly emission
//!   (Intel syntax, SysV AMD64).
//!
//! ```
//! let asm = dlc::compile("programa p inicio inteiro a; a = 5; escreva(a); fim.").unwrap();
//! assert!(asm.contains("main:"));
//! ```

pub mod codegen;
pub mod error;
pub mod inter;
pub mod lex;
pub mod semantic;
pub mod syntax;
pub mod tree;

pub use error::{CompileError, CompileResult};

/// Run the front end: lex, parse and check `source`, producing the
/// annotated tree the backend consumes. Every collected diagnostic is
/// returned when any phase fails.
pub fn front_end(source: &str) -> Result<tree::Program, Vec<CompileError>> {
    let mut program = syntax::parse(source)?;
    semantic::check(&mut program)?;
    Ok(program)
}

/// Lower `source` to the IR control-flow graph.
pub fn lower(source: &str) -> CompileResult<inter::Ir> {
    let program = front_end(source).map_err(first_error)?;
    inter::generate(&program)
}

/// Compile `source` all the way to x86-64 assembly text.
pub fn compile(source: &str) -> CompileResult<String> {
    let ir = lower(source)?;
    codegen::X64CodeGenerator::new(&ir).generate()
}

fn first_error(mut errors: Vec<CompileError>) -> CompileError {
    errors.remove(0)
}
