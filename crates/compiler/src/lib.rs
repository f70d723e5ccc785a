//! Cb compiler library
//!
//! Ahead-of-time compiler for the Cb language targeting 32-bit x86
//! (ILP32 System V, AT&T syntax). The pipeline per source file:
//!
//! 1. lex (`lexer`) and parse with import resolution (`parser`,
//!    `loader`)
//! 2. semantic analysis: jump resolution, local reference resolution,
//!    type resolution plus the type table's own semantic check,
//!    dereference checking, full type checking
//! 3. two-phase code generation to assembly text (`codegen`)
//!
//! Assembling and linking are delegated to the external `as` and `ld`
//! (`assemble`, `link`); this crate only produces the `.s` text. A
//! failing phase aborts the pipeline for that file with its diagnostics
//! collected in [`Diagnostics`]; other files continue to compile, and
//! linking runs only when every file produced an object.

pub mod ast;
pub mod codegen;
pub mod config;
pub mod const_eval;
pub mod deref_checker;
pub mod dump;
pub mod entity;
pub mod error;
pub mod jump_resolver;
pub mod lexer;
pub mod loader;
pub mod local_resolver;
pub mod parser;
pub mod type_checker;
pub mod type_resolver;
pub mod types;

pub use codegen::CodeGen;
pub use config::CompilerConfig;
pub use error::{CompileError, Diagnostics};

use crate::ast::Ast;
use crate::entity::{EntityTable, ScopeTree};
use crate::lexer::{Lexer, Token};
use crate::loader::Loader;
use crate::types::TypeTable;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::rc::Rc;
use tracing::debug;

/// What the driver wants out of one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    CheckSyntax,
    DumpTokens,
    DumpAst,
    DumpStmt,
    DumpReference,
    DumpSemantic,
    DumpIr,
    DumpAsm,
    /// stop after writing `.s` (-S)
    Assembly,
    /// stop after assembling `.o` (-c)
    Object,
    /// full compile and link
    Link,
}

/// Everything the semantic passes produce for one unit.
pub struct Analysis {
    pub entities: EntityTable,
    pub scopes: ScopeTree,
    pub types: TypeTable,
}

fn read_source(path: &Path) -> Result<String, CompileError> {
    std::fs::read_to_string(path)
        .map_err(|e| CompileError::File(format!("cannot read {}: {}", path.display(), e)))
}

/// Lex and parse one file, resolving imports along the way.
pub fn parse_file(
    path: &Path,
    config: &CompilerConfig,
    diags: &mut Diagnostics,
) -> Result<(Vec<Token>, Ast), CompileError> {
    let source = read_source(path)?;
    let file = Rc::new(path.to_path_buf());
    debug!(file = %path.display(), "lexing");
    let tokens = Lexer::new(file.clone(), &source).lex(diags);
    debug!(file = %path.display(), tokens = tokens.len(), "parsing");
    let mut loader = Loader::new(config.import_paths.clone());
    let ast = parser::parse_unit(&tokens, file, &mut loader, diags);
    if diags.has_errors() {
        return Err(CompileError::Syntax(diags.error_count()));
    }
    Ok((tokens, ast))
}

/// Run the full resolver/checker chain over a parsed unit.
///
/// Each phase runs to completion collecting positioned diagnostics; a
/// phase that produced errors aborts the chain.
pub fn analyze(
    ast: &mut Ast,
    config: &CompilerConfig,
    diags: &mut Diagnostics,
) -> Result<Analysis, CompileError> {
    debug!("resolving jumps");
    jump_resolver::resolve(ast, diags);
    if diags.has_errors() {
        return Err(CompileError::Semantic(diags.error_count()));
    }

    debug!("resolving local references");
    let (mut entities, scopes) = local_resolver::resolve(ast, diags);
    if diags.has_errors() {
        return Err(CompileError::Semantic(diags.error_count()));
    }

    debug!("resolving types");
    let mut types = TypeTable::new();
    type_resolver::resolve(ast, &mut entities, &mut types, diags);
    if diags.has_errors() {
        return Err(CompileError::Semantic(diags.error_count()));
    }
    types.semantic_check(diags);
    if diags.has_errors() {
        return Err(CompileError::Semantic(diags.error_count()));
    }

    debug!("checking dereferences");
    deref_checker::check(ast, &entities, &mut types, diags);
    if diags.has_errors() {
        return Err(CompileError::Semantic(diags.error_count()));
    }

    debug!("checking types");
    type_checker::check(
        ast,
        &entities,
        &mut types,
        diags,
        config.strict_pointer_comparison,
    );
    if diags.has_errors() {
        return Err(CompileError::Semantic(diags.error_count()));
    }

    Ok(Analysis {
        entities,
        scopes,
        types,
    })
}

/// Compile one source file all the way to assembly text.
pub fn compile_to_assembly(
    path: &Path,
    config: &CompilerConfig,
    diags: &mut Diagnostics,
) -> Result<String, CompileError> {
    let (_, mut ast) = parse_file(path, config, diags)?;
    let mut analysis = analyze(&mut ast, config, diags)?;
    debug!(file = %path.display(), "generating code");
    let source_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    CodeGen::new(config.pic)
        .generate(&ast, &mut analysis.entities, &analysis.types, &source_name)
        .map_err(|e| CompileError::Internal(e.to_string()))
}

/// Produce the text for one of the inspection modes.
pub fn dump(
    path: &Path,
    config: &CompilerConfig,
    mode: Mode,
    diags: &mut Diagnostics,
) -> Result<String, CompileError> {
    match mode {
        Mode::DumpTokens => {
            let (tokens, _) = parse_file(path, config, diags)?;
            Ok(dump::dump_tokens(&tokens))
        }
        Mode::DumpAst => {
            let (_, ast) = parse_file(path, config, diags)?;
            Ok(dump::pretty(&ast))
        }
        Mode::DumpStmt => {
            let (_, ast) = parse_file(path, config, diags)?;
            Ok(dump::first_stmt_of_main(&ast))
        }
        Mode::DumpReference => {
            let (_, mut ast) = parse_file(path, config, diags)?;
            jump_resolver::resolve(&ast, diags);
            let (entities, _) = local_resolver::resolve(&mut ast, diags);
            if diags.has_errors() {
                return Err(CompileError::Semantic(diags.error_count()));
            }
            Ok(dump::tree(&ast, Some(&entities), None))
        }
        Mode::DumpSemantic => {
            let (_, mut ast) = parse_file(path, config, diags)?;
            let analysis = analyze(&mut ast, config, diags)?;
            Ok(dump::tree(&ast, Some(&analysis.entities), Some(&analysis.types)))
        }
        Mode::DumpIr => {
            let (_, mut ast) = parse_file(path, config, diags)?;
            let mut analysis = analyze(&mut ast, config, diags)?;
            CodeGen::new(config.pic)
                .dump_ir(&ast, &mut analysis.entities, &analysis.types)
                .map_err(|e| CompileError::Internal(e.to_string()))
        }
        Mode::DumpAsm => compile_to_assembly(path, config, diags),
        _ => Err(CompileError::Options(format!(
            "mode {:?} is not a dump mode",
            mode
        ))),
    }
}

// ---- external tools -------------------------------------------------

fn run_tool(mut command: Command, what: &str) -> Result<(), CompileError> {
    debug!(command = ?command, "running {}", what);
    let status = command
        .status()
        .map_err(|e| CompileError::Ipc(format!("failed to run {}: {}", what, e)))?;
    if !status.success() {
        return Err(CompileError::Ipc(format!(
            "{} failed with status {}",
            what,
            status.code().map_or("signal".to_string(), |c| c.to_string())
        )));
    }
    Ok(())
}

/// Assemble one `.s` file into an object with the external assembler.
/// stdout/stderr of the tool pass through to the driver's streams.
pub fn assemble(
    asm_path: &Path,
    object_path: &Path,
    config: &CompilerConfig,
) -> Result<(), CompileError> {
    let mut command = Command::new(&config.assembler);
    command
        .arg("--32")
        .arg("-o")
        .arg(object_path)
        .arg(asm_path);
    run_tool(command, "assembler")
}

/// Link objects into a dynamically linked 32-bit ELF executable.
pub fn link(
    objects: &[PathBuf],
    output: &Path,
    config: &CompilerConfig,
) -> Result<(), CompileError> {
    let mut command = Command::new(&config.linker);
    command.arg("-m").arg("elf_i386");
    if !config.no_default_link {
        command
            .arg("-dynamic-linker")
            .arg(&config.dynamic_linker)
            .arg(config.crt_dir.join("crt1.o"))
            .arg(config.crt_dir.join("crti.o"));
    }
    for object in objects {
        command.arg(object);
    }
    if !config.no_default_link {
        for library in &config.libraries {
            command.arg(format!("-l{}", library));
        }
        command.arg(config.crt_dir.join("crtn.o"));
    }
    command.arg("-o").arg(output);
    run_tool(command, "linker")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_source(dir: &tempfile::TempDir, name: &str, text: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, text).unwrap();
        path
    }

    #[test]
    fn test_compile_to_assembly_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_source(
            &dir,
            "ret7.cb",
            "int main(void) { return 1 + 2 * 3; }\n",
        );
        let mut diags = Diagnostics::new();
        let asm = compile_to_assembly(&path, &CompilerConfig::default(), &mut diags).unwrap();
        assert!(asm.contains(".globl main"));
        assert!(asm.contains(".file \"ret7.cb\""));
    }

    #[test]
    fn test_semantic_error_aborts_without_assembly() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_source(&dir, "bad.cb", "int main(void) { return; }\n");
        let mut diags = Diagnostics::new();
        let result = compile_to_assembly(&path, &CompilerConfig::default(), &mut diags);
        assert!(matches!(result, Err(CompileError::Semantic(_))));
        assert!(diags.iter().any(|d| d.message.contains("return value required")));
    }

    #[test]
    fn test_syntax_error_reports_position() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_source(&dir, "syn.cb", "int main(void) { return 1 +; }\n");
        let mut diags = Diagnostics::new();
        let result = compile_to_assembly(&path, &CompilerConfig::default(), &mut diags);
        assert!(matches!(result, Err(CompileError::Syntax(_))));
        let rendered: Vec<String> = diags.iter().map(|d| d.to_string()).collect();
        assert!(rendered.iter().any(|m| m.contains("syn.cb:1:")));
    }

    #[test]
    fn test_missing_file_is_file_error() {
        let mut diags = Diagnostics::new();
        let result = compile_to_assembly(
            Path::new("/no/such/file.cb"),
            &CompilerConfig::default(),
            &mut diags,
        );
        assert!(matches!(result, Err(CompileError::File(_))));
    }

    #[test]
    fn test_import_through_config_path() {
        let dir = tempfile::tempdir().unwrap();
        let libdir = tempfile::tempdir().unwrap();
        fs::write(
            libdir.path().join("stdio.hb"),
            "int printf(char* fmt, ...);\n",
        )
        .unwrap();
        let path = write_source(
            &dir,
            "hello.cb",
            "import stdio;\nint main(void) { printf(\"hello\\n\"); return 0; }\n",
        );
        let config = CompilerConfig::default().with_import_path(libdir.path());
        let mut diags = Diagnostics::new();
        let asm = compile_to_assembly(&path, &config, &mut diags).unwrap();
        assert!(asm.contains("call printf"));
        assert!(asm.contains(".string \"hello\\012\""));
    }

    #[test]
    fn test_dump_modes_produce_text() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_source(
            &dir,
            "d.cb",
            "int main(void) { int x; x = 1; return x; }\n",
        );
        let config = CompilerConfig::default();
        for mode in [
            Mode::DumpTokens,
            Mode::DumpAst,
            Mode::DumpStmt,
            Mode::DumpReference,
            Mode::DumpSemantic,
            Mode::DumpIr,
            Mode::DumpAsm,
        ] {
            let mut diags = Diagnostics::new();
            let text = dump(&path, &config, mode, &mut diags).unwrap();
            assert!(!text.is_empty(), "{:?} produced no output", mode);
        }
    }

    #[test]
    fn test_resolution_chain_is_idempotent() {
        // running the resolver chain twice produces the same semantic dump
        let dir = tempfile::tempdir().unwrap();
        let path = write_source(
            &dir,
            "i.cb",
            "int twice(int n) { return n * 2; } int main(void) { char c; c = 3; return twice(c); }\n",
        );
        let config = CompilerConfig::default();
        let mut diags = Diagnostics::new();
        let (_, mut ast) = parse_file(&path, &config, &mut diags).unwrap();
        let analysis = analyze(&mut ast, &config, &mut diags).unwrap();
        let first = dump::tree(&ast, None, Some(&analysis.types));

        let mut diags2 = Diagnostics::new();
        let analysis2 = analyze(&mut ast, &config, &mut diags2).unwrap();
        assert!(!diags2.has_errors());
        let second = dump::tree(&ast, None, Some(&analysis2.types));
        assert_eq!(first, second);
    }
}
