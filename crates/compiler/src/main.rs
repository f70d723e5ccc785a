//! Cb compiler CLI
//!
//! Flag-based driver around the `cbc` library: inspection modes
//! (`--dump-tokens` .. `--dump-asm`, `--check-syntax`), `-S`/`-c` stop
//! points, and the default full compile-and-link via the external
//! `as`/`ld`. All diagnostics go to stderr as `file:line:col: message`;
//! exit status is 0 on success and 1 on any failure.

use clap::{CommandFactory, Parser as ClapParser};
use clap_complete::{Shell, generate};
use cbc::{CompileError, CompilerConfig, Diagnostics, Mode};
use std::io;
use std::path::{Path, PathBuf};
use std::process;

#[derive(ClapParser)]
#[command(name = "cbc")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Cb compiler - compile .cb sources to 32-bit x86 executables", long_about = None)]
struct Cli {
    /// Input files: .cb sources or .s assembly
    files: Vec<PathBuf>,

    /// Check syntax only; print per-file OK / Error
    #[arg(long)]
    check_syntax: bool,

    /// Print the token stream
    #[arg(long)]
    dump_tokens: bool,

    /// Print the parsed AST in canonical source form
    #[arg(long)]
    dump_ast: bool,

    /// Print the first statement of main as a tree
    #[arg(long)]
    dump_stmt: bool,

    /// Print the AST after reference resolution
    #[arg(long)]
    dump_reference: bool,

    /// Print the AST after type checking
    #[arg(long)]
    dump_semantic: bool,

    /// Print the lowered intermediate representation
    #[arg(long)]
    dump_ir: bool,

    /// Print the generated assembly
    #[arg(long)]
    dump_asm: bool,

    /// Stop after generating .s files
    #[arg(short = 'S')]
    stop_after_assembly: bool,

    /// Stop after assembling .o files
    #[arg(short = 'c')]
    stop_after_object: bool,

    /// Output path (executable, or the single .s/.o with -S/-c)
    #[arg(short = 'o', value_name = "PATH")]
    output: Option<PathBuf>,

    /// Add a directory to the import search path (repeatable)
    #[arg(short = 'I', value_name = "DIR")]
    import_paths: Vec<PathBuf>,

    /// Emit position-independent calls (call f@PLT)
    #[arg(long)]
    fpic: bool,

    /// Compiler configuration file (TOML)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Verbose phase logging to stderr
    #[arg(short, long)]
    verbose: bool,

    /// Generate shell completions and exit
    #[arg(long, value_enum, value_name = "SHELL")]
    completions: Option<Shell>,
}

impl Cli {
    /// The single selected mode; more than one is a usage error.
    fn mode(&self) -> Result<Mode, CompileError> {
        let selected: Vec<Mode> = [
            (self.check_syntax, Mode::CheckSyntax),
            (self.dump_tokens, Mode::DumpTokens),
            (self.dump_ast, Mode::DumpAst),
            (self.dump_stmt, Mode::DumpStmt),
            (self.dump_reference, Mode::DumpReference),
            (self.dump_semantic, Mode::DumpSemantic),
            (self.dump_ir, Mode::DumpIr),
            (self.dump_asm, Mode::DumpAsm),
            (self.stop_after_assembly, Mode::Assembly),
            (self.stop_after_object, Mode::Object),
        ]
        .into_iter()
        .filter_map(|(on, mode)| on.then_some(mode))
        .collect();
        match selected.as_slice() {
            [] => Ok(Mode::Link),
            [mode] => Ok(*mode),
            _ => Err(CompileError::Options(
                "more than one mode option given".to_string(),
            )),
        }
    }
}

fn main() {
    let cli = Cli::parse();

    if let Some(shell) = cli.completions {
        let mut command = Cli::command();
        generate(shell, &mut command, "cbc", &mut io::stdout());
        return;
    }

    init_logging(cli.verbose);

    match run(&cli) {
        Ok(()) => {}
        Err(error) => {
            eprintln!("cbc: {}", error);
            process::exit(1);
        }
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn build_config(cli: &Cli) -> Result<CompilerConfig, CompileError> {
    let mut config = CompilerConfig::default();
    if let Some(path) = &cli.config {
        config.merge_file(path).map_err(CompileError::Options)?;
    }
    for path in cli.import_paths.iter().rev() {
        config.import_paths.insert(0, path.clone());
    }
    if cli.fpic {
        config.pic = true;
    }
    Ok(config)
}

fn run(cli: &Cli) -> Result<(), CompileError> {
    if cli.files.is_empty() {
        return Err(CompileError::Options("no input files".to_string()));
    }
    let mode = cli.mode()?;
    let config = build_config(cli)?;

    match mode {
        Mode::CheckSyntax => run_check_syntax(&cli.files, &config),
        Mode::DumpTokens
        | Mode::DumpAst
        | Mode::DumpStmt
        | Mode::DumpReference
        | Mode::DumpSemantic
        | Mode::DumpIr
        | Mode::DumpAsm => run_dump(&cli.files, &config, mode),
        Mode::Assembly | Mode::Object | Mode::Link => run_build(cli, &config, mode),
    }
}

fn is_assembly_input(path: &Path) -> bool {
    path.extension().is_some_and(|e| e == "s")
}

fn run_check_syntax(files: &[PathBuf], config: &CompilerConfig) -> Result<(), CompileError> {
    let mut failed = false;
    for file in files {
        let mut diags = Diagnostics::new();
        match cbc::parse_file(file, config, &mut diags) {
            Ok(_) => println!("{}: Syntax OK", file.display()),
            Err(_) => {
                diags.print_to_stderr();
                println!("{}: Syntax Error", file.display());
                failed = true;
            }
        }
    }
    if failed {
        Err(CompileError::Syntax(1))
    } else {
        Ok(())
    }
}

fn run_dump(files: &[PathBuf], config: &CompilerConfig, mode: Mode) -> Result<(), CompileError> {
    let mut result = Ok(());
    for file in files {
        let mut diags = Diagnostics::new();
        match cbc::dump(file, config, mode, &mut diags) {
            Ok(text) => print!("{}", text),
            Err(error) => {
                diags.print_to_stderr();
                result = Err(error);
            }
        }
    }
    result
}

/// Compile (and per mode assemble / link) every input. Files are
/// processed independently; linking only happens when all of them
/// produced an object.
fn run_build(cli: &Cli, config: &CompilerConfig, mode: Mode) -> Result<(), CompileError> {
    let multiple = cli.files.len() > 1;
    if cli.output.is_some() && multiple && mode != Mode::Link {
        return Err(CompileError::Options(
            "-o with multiple input files requires linking".to_string(),
        ));
    }

    let mut objects: Vec<PathBuf> = Vec::new();
    let mut intermediates: Vec<PathBuf> = Vec::new();
    let mut failures = 0usize;

    for file in &cli.files {
        match build_one(file, cli, config, mode) {
            Ok(Some(object)) => {
                if is_assembly_input(file) || mode != Mode::Link {
                    // user-visible artifact, keep it
                } else {
                    intermediates.push(object.clone());
                }
                objects.push(object);
            }
            Ok(None) => {}
            Err(error) => {
                eprintln!("cbc: {}", error);
                failures += 1;
            }
        }
    }

    if failures > 0 {
        // each failing file already reported its own diagnostics
        if cli.files.len() > 1 {
            eprintln!(
                "cbc: {} of {} input files failed",
                failures,
                cli.files.len()
            );
        }
        process::exit(1);
    }
    if mode != Mode::Link {
        return Ok(());
    }

    let output = cli
        .output
        .clone()
        .unwrap_or_else(|| PathBuf::from("a.out"));
    let result = cbc::link(&objects, &output, config);
    for path in intermediates {
        let _ = std::fs::remove_file(path);
    }
    result
}

/// Build one input to the artifact the mode asks for. Returns the
/// object path when one was produced (None for -S).
fn build_one(
    file: &Path,
    cli: &Cli,
    config: &CompilerConfig,
    mode: Mode,
) -> Result<Option<PathBuf>, CompileError> {
    // -o names the mode's final artifact when there is one input;
    // intermediates always use the source file's stem
    let requested = |extension: &str, is_final: bool| -> PathBuf {
        if is_final
            && cli.files.len() == 1
            && mode != Mode::Link
            && let Some(output) = &cli.output
        {
            return output.clone();
        }
        file.with_extension(extension)
    };

    if is_assembly_input(file) {
        if mode == Mode::Assembly {
            return Ok(None);
        }
        let object = requested("o", mode == Mode::Object);
        cbc::assemble(file, &object, config)?;
        return Ok(Some(object));
    }

    let mut diags = Diagnostics::new();
    let asm = match cbc::compile_to_assembly(file, config, &mut diags) {
        Ok(asm) => asm,
        Err(error) => {
            diags.print_to_stderr();
            return Err(error);
        }
    };
    diags.print_to_stderr(); // surviving warnings

    let asm_path = requested("s", mode == Mode::Assembly);
    std::fs::write(&asm_path, &asm).map_err(|e| {
        CompileError::File(format!("cannot write {}: {}", asm_path.display(), e))
    })?;
    if mode == Mode::Assembly {
        return Ok(None);
    }

    let object = requested("o", mode == Mode::Object);
    let assembled = cbc::assemble(&asm_path, &object, config);
    let _ = std::fs::remove_file(&asm_path);
    assembled?;
    Ok(Some(object))
}
