//! Code generation
//!
//! Two phases over a semantically analyzed AST:
//!
//! 1. **Lowering** (`lower.rs`): function bodies become a linear IR of
//!    simple statements over virtual operands. Side effects are hoisted
//!    into statement position with explicit temporaries; short-circuit
//!    operators and `?:` become conditional jumps; loops and switch get
//!    their label shapes; pointer arithmetic is scaled by element size.
//!
//! 2. **Emission** (`emit.rs`): the IR becomes AT&T-syntax 32-bit x86
//!    text. Expressions evaluate through an %eax accumulator with stack
//!    spills; locals live at negative %ebp offsets assigned by
//!    `frame.rs`; string literals and data sections come from
//!    `globals.rs`.
//!
//! Codegen runs only on inputs that passed every semantic pass, so it
//! reports no user errors; anything surprising is an internal compiler
//! error (`error.rs`).
//!
//! # Module structure
//!
//! - `ir.rs`: the IR types and the `--dump-ir` text form
//! - `lower.rs`: AST to IR
//! - `frame.rs`: cdecl frame layout and symbol assignment
//! - `globals.rs`: `.rodata`/`.data`/`.bss` emission, string interning
//! - `emit.rs`: IR to assembly text
//! - `error.rs`: internal error type

mod emit;
mod error;
mod frame;
mod globals;
mod ir;
mod lower;

pub use error::CodeGenError;
pub use ir::Ir;

use crate::ast::Ast;
use crate::entity::EntityTable;
use crate::types::TypeTable;

pub struct CodeGen {
    /// Emit `call f@PLT` for position-independent output.
    pic: bool,
}

impl CodeGen {
    pub fn new(pic: bool) -> Self {
        CodeGen { pic }
    }

    /// Lower and emit one compilation unit to assembly text.
    pub fn generate(
        &self,
        ast: &Ast,
        entities: &mut EntityTable,
        types: &TypeTable,
        source_name: &str,
    ) -> Result<String, CodeGenError> {
        let mut ir = lower::lower(ast, entities, types)?;
        frame::assign_storage(&mut ir, entities, types)?;
        emit::emit_assembly(&ir, entities, types, source_name, self.pic)
    }

    /// Lowered IR in its dump form, for the `--dump-ir` driver mode.
    pub fn dump_ir(
        &self,
        ast: &Ast,
        entities: &mut EntityTable,
        types: &TypeTable,
    ) -> Result<String, CodeGenError> {
        let mut ir = lower::lower(ast, entities, types)?;
        frame::assign_storage(&mut ir, entities, types)?;
        Ok(ir.dump())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Diagnostics;
    use crate::lexer::Lexer;
    use crate::loader::Loader;
    use crate::parser::parse_unit;
    use std::path::PathBuf;
    use std::rc::Rc;

    /// Full pipeline to assembly text; panics on any diagnostic.
    fn compile(source: &str) -> String {
        compile_with(source, false)
    }

    fn compile_with(source: &str, pic: bool) -> String {
        let mut diags = Diagnostics::new();
        let file = Rc::new(PathBuf::from("t.cb"));
        let tokens = Lexer::new(file.clone(), source).lex(&mut diags);
        let mut loader = Loader::new(Vec::new());
        let mut ast = parse_unit(&tokens, file, &mut loader, &mut diags);
        crate::jump_resolver::resolve(&ast, &mut diags);
        let (mut entities, _) = crate::local_resolver::resolve(&mut ast, &mut diags);
        let mut types = TypeTable::new();
        crate::type_resolver::resolve(&mut ast, &mut entities, &mut types, &mut diags);
        types.semantic_check(&mut diags);
        if !diags.has_errors() {
            crate::deref_checker::check(&ast, &entities, &mut types, &mut diags);
        }
        if !diags.has_errors() {
            crate::type_checker::check(&mut ast, &entities, &mut types, &mut diags, false);
        }
        let messages: Vec<String> = diags.iter().map(|d| d.to_string()).collect();
        assert!(!diags.has_errors(), "unexpected errors: {:?}", messages);
        CodeGen::new(pic)
            .generate(&ast, &mut entities, &types, "t.cb")
            .expect("codegen failed")
    }

    #[test]
    fn test_minimal_main() {
        let asm = compile("int main(void) { return 0; }");
        assert!(asm.contains("\t.globl main"));
        assert!(asm.contains("main:"));
        assert!(asm.contains("\tpush %ebp"));
        assert!(asm.contains("\tmov %esp, %ebp"));
        assert!(asm.contains("\tmov $0, %eax"));
        assert!(asm.contains("\tleave"));
        assert!(asm.contains("\tret"));
    }

    #[test]
    fn test_precedence_arithmetic() {
        // 1 + 2*3: the multiplication combines before the addition
        let asm = compile("int main(void) { return 1 + 2 * 3; }");
        let imul = asm.find("imul %ecx, %eax").expect("no multiply");
        let add = asm.find("add %ecx, %eax").expect("no add");
        assert!(imul < add, "multiplication must be emitted before addition");
    }

    #[test]
    fn test_recursion_uses_cdecl_call() {
        let asm = compile(
            "int fact(int n) { if (n <= 1) return 1; return n * fact(n - 1); }
             int main(void) { return fact(5); }",
        );
        assert!(asm.contains("\tcall fact"));
        // one argument pushed, caller cleans 4 bytes
        assert!(asm.contains("\tadd $4, %esp"));
        // parameter n read from +8
        assert!(asm.contains("8(%ebp)"));
    }

    #[test]
    fn test_array_indexing_scales() {
        let asm = compile(
            "int main(void) { int a[3]; a[0] = 10; a[1] = 20; a[2] = 30; return a[0] + a[1] + a[2]; }",
        );
        // the 12-byte array lives on the frame
        assert!(asm.contains("sub $12, %esp"));
        // indices scale by sizeof(int)
        assert!(asm.contains("mov $4, %eax"));
        assert!(asm.contains("imul %ecx, %eax"));
        assert!(asm.contains("lea -12(%ebp), %eax"));
    }

    #[test]
    fn test_struct_member_offsets() {
        let asm = compile(
            "struct p { int x; int y; };
             int main(void) { struct p v; v.x = 3; v.y = 4; return v.x * v.x + v.y * v.y; }",
        );
        // member y sits 4 bytes past the struct base
        assert!(asm.contains("mov $4, %eax"));
        assert!(asm.contains("lea -8(%ebp), %eax"));
    }

    #[test]
    fn test_global_sections() {
        let asm = compile(
            "int counter; int start = 5; char *greeting = \"hi\";
             int main(void) { return start; }",
        );
        assert!(asm.contains("\t.section .bss"));
        assert!(asm.contains("counter:"));
        assert!(asm.contains("\t.zero 4"));
        assert!(asm.contains("\t.data"));
        assert!(asm.contains("start:"));
        assert!(asm.contains("\t.long 5"));
        assert!(asm.contains("\t.section .rodata"));
        assert!(asm.contains(".LC0:"));
        assert!(asm.contains("\t.string \"hi\""));
        assert!(asm.contains("\t.long .LC0"));
    }

    #[test]
    fn test_string_literals_are_deduplicated() {
        let asm = compile(
            "int puts(char* s);
             int main(void) { puts(\"same\"); puts(\"same\"); return 0; }",
        );
        assert_eq!(asm.matches(".string \"same\"").count(), 1);
        assert!(!asm.contains(".LC1"));
    }

    #[test]
    fn test_static_function_is_not_exported() {
        let asm = compile(
            "static int helper(void) { return 1; } int main(void) { return helper(); }",
        );
        assert!(!asm.contains(".globl helper"));
        assert!(asm.contains("helper:"));
        assert!(asm.contains(".globl main"));
    }

    #[test]
    fn test_signed_and_unsigned_division() {
        let signed = compile("int main(void) { int a; a = 7; return a / 2; }");
        assert!(signed.contains("\tcltd"));
        assert!(signed.contains("\tidiv %ecx"));
        let unsigned =
            compile("int main(void) { unsigned int a; a = 7u; return (int)(a / 2u); }");
        assert!(unsigned.contains("\tmov $0, %edx"));
        assert!(unsigned.contains("\tdiv %ecx"));
    }

    #[test]
    fn test_unsigned_comparison_uses_unsigned_setcc() {
        let asm = compile(
            "int main(void) { unsigned int a; unsigned int b; a = 1u; b = 2u; return a < b; }",
        );
        assert!(asm.contains("\tsetb %al"));
        let signed = compile("int main(void) { int a; int b; a = 1; b = 2; return a < b; }");
        assert!(signed.contains("\tsetl %al"));
    }

    #[test]
    fn test_shift_uses_cl() {
        let asm = compile("int main(void) { int a; a = 1; return a << 3; }");
        assert!(asm.contains("\tshl %cl, %eax"));
        let unsigned = compile(
            "int main(void) { unsigned int a; a = 16u; return (int)(a >> 2); }",
        );
        assert!(unsigned.contains("\tshr %cl, %eax"));
        let signed = compile("int main(void) { int a; a = -16; return a >> 2; }");
        assert!(signed.contains("\tsar %cl, %eax"));
    }

    #[test]
    fn test_narrow_loads_extend() {
        let asm = compile("int main(void) { char c; c = 'a'; return c; }");
        assert!(asm.contains("movsbl"));
        let unsigned = compile("int main(void) { unsigned char c; c = 'a'; return c; }");
        assert!(unsigned.contains("movzbl"));
        let short = compile("int main(void) { short s; s = 1; return s; }");
        assert!(short.contains("movswl"));
    }

    #[test]
    fn test_narrow_store_truncates() {
        let asm = compile("int main(void) { char c; c = 65; return c; }");
        assert!(asm.contains("movb %al, (%ecx)"));
    }

    #[test]
    fn test_switch_compare_and_jump() {
        let asm = compile(
            "int main(void) { int x; x = 2;
               switch (x) { case 1: return 10; case 2: return 20; default: return 0; } }",
        );
        assert!(asm.contains("\tcmp $1, %eax"));
        assert!(asm.contains("\tcmp $2, %eax"));
        // no jump table
        assert!(!asm.contains(".long .L"));
        assert_eq!(asm.matches("\tje .L").count(), 2);
    }

    #[test]
    fn test_logical_and_short_circuits() {
        let asm = compile(
            "int side(void) { return 1; } int main(void) { return 0 && side(); }",
        );
        // the rhs call sits behind a conditional jump
        let cjump = asm.find("jne .L").expect("no conditional jump");
        let call = asm.find("call side").expect("no call");
        assert!(cjump < call);
    }

    #[test]
    fn test_for_loop_shape() {
        let asm = compile(
            "int main(void) { int s; s = 0; for (int i = 0; i < 4; ++i) s += i; return s; }",
        );
        // condition at the top, backward jump at the bottom
        assert!(asm.contains("jmp .L"));
        assert!(asm.contains("setl %al"));
    }

    #[test]
    fn test_pointer_arithmetic_scaling() {
        let asm = compile(
            "int main(void) { int a[4]; int *p; p = a; a[0] = 1; a[1] = 2; return *(p + 1); }",
        );
        assert!(asm.contains("mov $4, %eax"));
        assert!(asm.contains("imul %ecx, %eax"));
    }

    #[test]
    fn test_pointer_difference_divides() {
        let asm = compile(
            "int main(void) { int a[4]; int *p; int *q; p = a; q = a + 3; return (int)(q - p); }",
        );
        assert!(asm.contains("cltd"));
        assert!(asm.contains("idiv %ecx"));
    }

    #[test]
    fn test_pic_calls_through_plt() {
        let asm = compile_with(
            "int puts(char* s); int main(void) { puts(\"x\"); return 0; }",
            true,
        );
        assert!(asm.contains("call puts@PLT"));
        let normal = compile_with(
            "int puts(char* s); int main(void) { puts(\"x\"); return 0; }",
            false,
        );
        assert!(normal.contains("call puts\n"));
    }

    #[test]
    fn test_struct_copy_assignment() {
        let asm = compile(
            "struct p { int x; int y; };
             int main(void) { struct p a; struct p b; a.x = 1; a.y = 2; b = a; return b.y; }",
        );
        // 8-byte block copy through %edx
        assert!(asm.contains("movl 0(%ecx), %edx"));
        assert!(asm.contains("movl %edx, 4(%eax)"));
    }

    #[test]
    fn test_function_pointer_indirect_call() {
        let asm = compile(
            "int f(void) { return 7; }
             int main(void) { int (*fp)(void); fp = &f; return fp(); }",
        );
        assert!(asm.contains("call *%eax"));
        assert!(asm.contains("mov $f, %eax"));
    }

    #[test]
    fn test_variadic_call_pushes_all_args() {
        let asm = compile(
            "int printf(char* fmt, ...);
             int main(void) { printf(\"%d %d\", 1, 2); return 0; }",
        );
        assert!(asm.contains("add $12, %esp"));
    }

    #[test]
    fn test_labels_unique_across_functions() {
        let asm = compile(
            "int f(void) { int i; i = 0; while (i < 3) ++i; return i; }
             int g(void) { int i; i = 0; while (i < 5) ++i; return i; }
             int main(void) { return f() + g(); }",
        );
        // every generated label is defined exactly once
        for line in asm.lines() {
            let line = line.trim();
            if let Some(label) = line.strip_suffix(':')
                && label.starts_with(".L")
            {
                let definitions = asm
                    .lines()
                    .filter(|l| l.trim() == format!("{}:", label))
                    .count();
                assert_eq!(definitions, 1, "label {} defined {} times", label, definitions);
            }
        }
    }

    #[test]
    fn test_dump_ir_mentions_temporaries() {
        let source = "int main(void) { int x; x = 0; return x++ + 1; }";
        let mut diags = Diagnostics::new();
        let file = Rc::new(PathBuf::from("t.cb"));
        let tokens = Lexer::new(file.clone(), source).lex(&mut diags);
        let mut loader = Loader::new(Vec::new());
        let mut ast = parse_unit(&tokens, file, &mut loader, &mut diags);
        let (mut entities, _) = crate::local_resolver::resolve(&mut ast, &mut diags);
        let mut types = TypeTable::new();
        crate::type_resolver::resolve(&mut ast, &mut entities, &mut types, &mut diags);
        types.semantic_check(&mut diags);
        crate::type_checker::check(&mut ast, &entities, &mut types, &mut diags, false);
        assert!(!diags.has_errors());
        let dump = CodeGen::new(false)
            .dump_ir(&ast, &mut entities, &types)
            .unwrap();
        assert!(dump.contains("function main"));
        assert!(dump.contains("t0"), "postincrement should use a temporary");
    }
}
