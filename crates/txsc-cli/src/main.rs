//! `txsc` compiler CLI.
//!
//! Provides the `txsc` binary with `compile` (source text -> hex/ASM) and
//! `dump` (source text -> formatted LIR, for inspecting an intermediate
//! stage without emitting) subcommands.
//!
//! Uses the same `txsc_codegen::compile()`/`lower()` pipeline functions a
//! library caller would, so the CLI's behavior is identical to any other
//! embedding of this crate.

use std::fs;
use std::process;

use clap::{Parser, Subcommand, ValueEnum};

use txsc_codegen::{CodegenError, Dialect, Target};
use txsc_core::{CompileError, CompileOptions, OptLevel, Verbosity};

/// `txsc`: a Bitcoin transaction script compiler.
#[derive(Parser)]
#[command(name = "txsc", about = "Bitcoin transaction script compiler")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a source file to hex or ASM.
    Compile {
        #[command(flatten)]
        input: Input,
        #[command(flatten)]
        opts: Options,

        /// Output format.
        #[arg(short, long, value_enum, default_value_t = TargetArg::Hex)]
        target: TargetArg,
    },
    /// Parse and lower a source file, printing the final LIR program.
    Dump {
        #[command(flatten)]
        input: Input,
        #[command(flatten)]
        opts: Options,
    },
}

#[derive(clap::Args)]
struct Input {
    /// Path to the source file.
    #[arg(short, long)]
    source: String,

    /// Which parser to run.
    #[arg(short, long, value_enum, default_value_t = DialectArg::Txscript)]
    dialect: DialectArg,
}

#[derive(clap::Args)]
struct Options {
    /// `optimization` (0 = no peephole, 1 = peephole, 2 = also fold SIR).
    #[arg(long)]
    optimization: Option<u8>,

    /// `verbosity` (0..3), drives the tracing filter level.
    #[arg(long, default_value_t = 0)]
    verbosity: u8,

    /// Fail on integer operands/results wider than 4 bytes.
    #[arg(long)]
    strict_num: bool,

    /// Allow bare expression statements as implicit pushes.
    #[arg(long)]
    implicit_pushes: bool,

    /// Skip hash-length validation on comparisons.
    #[arg(long)]
    allow_invalid_comparisons: bool,

    /// Route post-uneven-conditional assumptions through the alt stack.
    #[arg(long)]
    use_altstack_for_assumptions: Option<bool>,

    /// Name of the active opcode table.
    #[arg(long, default_value = "default")]
    opcode_set: String,
}

impl Options {
    fn into_compile_options(self) -> Result<CompileOptions, String> {
        let mut options = CompileOptions::default();
        if let Some(n) = self.optimization {
            options.optimization = OptLevel::from_u8(n).ok_or_else(|| {
                format!("invalid --optimization '{n}', expected 0, 1, or 2")
            })?;
        }
        options.verbosity = Verbosity::from_u8(self.verbosity)
            .ok_or_else(|| format!("invalid --verbosity '{}', expected 0..3", self.verbosity))?;
        options.strict_num = self.strict_num;
        options.implicit_pushes = self.implicit_pushes;
        options.allow_invalid_comparisons = self.allow_invalid_comparisons;
        if let Some(use_altstack) = self.use_altstack_for_assumptions {
            options.use_altstack_for_assumptions = use_altstack;
        }
        options.opcode_set = self.opcode_set;
        Ok(options)
    }
}

#[derive(Copy, Clone, ValueEnum)]
enum DialectArg {
    Txscript,
    Asm,
    Raw,
}

impl From<DialectArg> for Dialect {
    fn from(d: DialectArg) -> Self {
        match d {
            DialectArg::Txscript => Dialect::TxScript,
            DialectArg::Asm => Dialect::Asm,
            DialectArg::Raw => Dialect::Raw,
        }
    }
}

#[derive(Copy, Clone, ValueEnum)]
enum TargetArg {
    Hex,
    Asm,
}

impl From<TargetArg> for Target {
    fn from(t: TargetArg) -> Self {
        match t {
            TargetArg::Hex => Target::Hex,
            TargetArg::Asm => Target::Asm,
        }
    }
}

fn main() {
    let cli = Cli::parse();
    let exit_code = match cli.command {
        Commands::Compile { input, opts, target } => run_compile(input, opts, target.into()),
        Commands::Dump { input, opts } => run_dump(input, opts),
    };
    process::exit(exit_code);
}

fn init_tracing(verbosity: u8) {
    let filter = match verbosity {
        0 => "error",
        1 => "warn",
        2 => "info",
        _ => "trace",
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
        .try_init();
}

fn read_source(path: &str) -> Result<String, i32> {
    fs::read_to_string(path).map_err(|e| {
        eprintln!("Error: failed to read '{path}': {e}");
        3
    })
}

/// Runs the `compile` subcommand.
///
/// Returns exit code: 0 = success, 1 = parsing error, 2 = IR-level error
/// (structural/implicit-push/strict-num/type), 3 = directive or I/O error.
fn run_compile(input: Input, opts: Options, target: Target) -> i32 {
    init_tracing(opts.verbosity);
    let source = match read_source(&input.source) {
        Ok(s) => s,
        Err(code) => return code,
    };
    let mut options = match opts.into_compile_options() {
        Ok(o) => o,
        Err(msg) => {
            eprintln!("Error: {msg}");
            return 1;
        }
    };
    match txsc_codegen::compile(&source, input.dialect.into(), target, &mut options) {
        Ok(out) => {
            println!("{}", out.text);
            0
        }
        Err(e) => report_error(e, &source),
    }
}

/// Runs the `dump` subcommand, printing the final LIR program as debug text.
fn run_dump(input: Input, opts: Options) -> i32 {
    init_tracing(opts.verbosity);
    let source = match read_source(&input.source) {
        Ok(s) => s,
        Err(code) => return code,
    };
    let options = match opts.into_compile_options() {
        Ok(o) => o,
        Err(msg) => {
            eprintln!("Error: {msg}");
            return 1;
        }
    };
    match txsc_codegen::lower(&source, input.dialect.into(), &options) {
        Ok(prog) => {
            for instr in &prog.instrs {
                println!("{:>4}: {:?}", instr.idx, instr.node);
            }
            0
        }
        Err(e) => report_error(e, &source),
    }
}

fn report_error(err: CodegenError, source: &str) -> i32 {
    match err {
        CodegenError::Compile(compile_err) => {
            eprintln!("{}", compile_err.render(Some(source)));
            exit_code_for(&compile_err)
        }
        CodegenError::Emit(msg) => {
            eprintln!("Error: {msg}");
            2
        }
    }
}

fn exit_code_for(err: &CompileError) -> i32 {
    match err {
        CompileError::Parsing { .. } => 1,
        CompileError::Directive { .. } => 3,
        CompileError::Ir { .. }
        | CompileError::ImplicitPush { .. }
        | CompileError::StrictNum { .. }
        | CompileError::Type { .. } => 2,
    }
}
