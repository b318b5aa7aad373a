//! Command-line driver for the DL compiler.

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use dlc::codegen::X64CodeGenerator;
use dlc::inter::{generate, Interpreter};
use dlc::CompileError;

#[derive(Parser)]
#[command(name = "dlc", version, about = "Compiler for the DL toy language")]
struct Args {
    /// DL source file.
    input: PathBuf,

    /// Output assembly path; defaults to the input with extension `.s`.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Print the annotated syntax tree.
    #[arg(long)]
    dump_ast: bool,

    /// Print the generated three-address code.
    #[arg(long)]
    dump_ir: bool,

    /// Execute the IR directly instead of emitting assembly.
    #[arg(long)]
    interpret: bool,

    /// Write the control-flow graph in Graphviz DOT form to this path.
    #[arg(long)]
    dot: Option<PathBuf>,
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(errors) => {
            for error in errors {
                eprintln!("{error}");
            }
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<(), Vec<CompileError>> {
    let source = fs::read_to_string(&args.input).map_err(io_error)?;

    let program = dlc::front_end(&source)?;
    if args.dump_ast {
        println!("{program:#?}");
    }

    let ir = generate(&program).map_err(|e| vec![e])?;
    if args.dump_ir {
        print!("{ir}");
    }
    if let Some(path) = &args.dot {
        fs::write(path, ir.to_dot()).map_err(io_error)?;
        log::info!("wrote CFG to {}", path.display());
    }

    if args.interpret {
        let stdin = std::io::stdin();
        let stdout = std::io::stdout();
        Interpreter::new(&ir, stdin.lock(), stdout.lock())
            .run()
            .map_err(|e| vec![e])?;
        return Ok(());
    }

    let asm = X64CodeGenerator::new(&ir).generate().map_err(|e| vec![e])?;
    let output = args.output.clone().unwrap_or_else(|| args.input.with_extension("s"));
    fs::write(&output, asm).map_err(io_error)?;
    log::info!("wrote assembly to {}", output.display());
    Ok(())
}

fn io_error(error: std::io::Error) -> Vec<CompileError> {
    vec![CompileError::Io(error)]
}
