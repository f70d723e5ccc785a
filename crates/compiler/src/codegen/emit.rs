//! x86 assembly emission (AT&T syntax, 32-bit)
//!
//! A naive accumulator model: every expression leaves its value in
//! %eax, binary operators evaluate the left side, push it, evaluate the
//! right side into %eax, move it to %ecx, pop the left side back and
//! combine. Division uses `cltd; idiv %ecx` (or `div` with a zeroed
//! %edx for unsigned), shifts go through %cl, comparisons set a byte
//! via setCC and widen with movzbl. Only %eax/%ecx/%edx are used, all
//! caller-saved, so prologue and epilogue stay `push %ebp; mov %esp,
//! %ebp; sub $frame, %esp` and `leave; ret`.

use super::error::CodeGenError;
use super::globals::emit_data_sections;
use super::ir::*;
use crate::entity::{EntityTable, MemRef};
use crate::types::TypeTable;
use std::fmt::Write as _;

pub fn emit_assembly(
    ir: &Ir,
    entities: &EntityTable,
    types: &TypeTable,
    source_name: &str,
    pic: bool,
) -> Result<String, CodeGenError> {
    let mut emitter = Emitter {
        out: String::new(),
        entities,
        types,
        pic,
        temp_offsets: Vec::new(),
    };
    writeln!(emitter.out, "\t.file \"{}\"", source_name)?;
    emit_data_sections(&mut emitter.out, ir, entities, types)?;
    writeln!(emitter.out, "\t.text")?;
    for function in &ir.functions {
        emitter.emit_function(function)?;
    }
    Ok(emitter.out)
}

struct Emitter<'a> {
    out: String,
    entities: &'a EntityTable,
    types: &'a TypeTable,
    pic: bool,
    /// frame offsets of the current function's temporaries
    temp_offsets: Vec<i32>,
}

impl<'a> Emitter<'a> {
    fn line(&mut self, text: &str) -> Result<(), CodeGenError> {
        writeln!(self.out, "\t{}", text)?;
        Ok(())
    }

    fn emit_function(&mut self, function: &IrFunction) -> Result<(), CodeGenError> {
        self.temp_offsets = function.temp_offsets.clone();
        let entity = self.entities.get(function.entity);
        if !entity.is_private() {
            writeln!(self.out, "\t.globl {}", function.name)?;
        }
        writeln!(self.out, "{}:", function.name)?;
        self.line("push %ebp")?;
        self.line("mov %esp, %ebp")?;
        if function.frame_size > 0 {
            self.line(&format!("sub ${}, %esp", function.frame_size))?;
        }
        for stmt in &function.body {
            self.emit_stmt(stmt)?;
        }
        // guard epilogue for a body that falls off the end
        if !matches!(function.body.last(), Some(IrStmt::Return(_))) {
            self.line("leave")?;
            self.line("ret")?;
        }
        Ok(())
    }

    // ---- statements -------------------------------------------------

    fn emit_stmt(&mut self, stmt: &IrStmt) -> Result<(), CodeGenError> {
        match stmt {
            IrStmt::Label(label) => {
                writeln!(self.out, "{}:", label)?;
                Ok(())
            }
            IrStmt::Expr(expr) => self.emit_expr(expr),
            IrStmt::Assign { addr, value, size } => {
                self.emit_expr(addr)?;
                self.line("push %eax")?;
                self.emit_expr(value)?;
                self.line("pop %ecx")?;
                match size {
                    1 => self.line("movb %al, (%ecx)"),
                    2 => self.line("movw %ax, (%ecx)"),
                    _ => self.line("movl %eax, (%ecx)"),
                }
            }
            IrStmt::Copy { dst, src, size } => {
                self.emit_expr(src)?;
                self.line("push %eax")?;
                self.emit_expr(dst)?;
                self.line("pop %ecx")?;
                // %ecx = source, %eax = destination; copy in word steps
                let mut offset = 0;
                let mut remaining = *size;
                while remaining >= 4 {
                    self.line(&format!("movl {}(%ecx), %edx", offset))?;
                    self.line(&format!("movl %edx, {}(%eax)", offset))?;
                    offset += 4;
                    remaining -= 4;
                }
                if remaining >= 2 {
                    self.line(&format!("movw {}(%ecx), %dx", offset))?;
                    self.line(&format!("movw %dx, {}(%eax)", offset))?;
                    offset += 2;
                    remaining -= 2;
                }
                if remaining >= 1 {
                    self.line(&format!("movb {}(%ecx), %dl", offset))?;
                    self.line(&format!("movb %dl, {}(%eax)", offset))?;
                }
                Ok(())
            }
            IrStmt::Jump(label) => self.line(&format!("jmp {}", label)),
            IrStmt::CJump {
                cond,
                then_label,
                else_label,
            } => {
                self.emit_expr(cond)?;
                self.line("cmp $0, %eax")?;
                self.line(&format!("jne {}", then_label))?;
                self.line(&format!("jmp {}", else_label))
            }
            IrStmt::Switch {
                cond,
                cases,
                default,
            } => {
                self.emit_expr(cond)?;
                for (value, label) in cases {
                    self.line(&format!("cmp ${}, %eax", *value as i32))?;
                    self.line(&format!("je {}", label))?;
                }
                self.line(&format!("jmp {}", default))
            }
            IrStmt::Return(value) => {
                if let Some(value) = value {
                    self.emit_expr(value)?;
                }
                self.line("leave")?;
                self.line("ret")
            }
        }
    }

    // ---- operands ---------------------------------------------------

    fn frame_or_symbol(&self, var: IrVar) -> Result<MemRef, CodeGenError> {
        match var {
            IrVar::Entity(id) => {
                self.entities.get(id).mem.clone().ok_or_else(|| {
                    CodeGenError::internal(
                        &self.entities.get(id).location,
                        "entity has no assigned storage",
                    )
                })
            }
            IrVar::Temp(index) => Ok(MemRef::Frame(self.temp_offsets[index])),
        }
    }

    /// Load size and signedness of a variable operand.
    fn var_width(&self, var: IrVar) -> (u8, bool) {
        match var {
            IrVar::Entity(id) => {
                let entity = self.entities.get(id);
                match entity.ty {
                    Some(ty) => (
                        self.types.size_of(ty).unwrap_or(4) as u8,
                        self.types.is_signed(ty),
                    ),
                    None => (4, true),
                }
            }
            IrVar::Temp(_) => (4, true),
        }
    }

    fn load_into_eax(&mut self, operand: &str, size: u8, signed: bool) -> Result<(), CodeGenError> {
        match (size, signed) {
            (1, true) => self.line(&format!("movsbl {}, %eax", operand)),
            (1, false) => self.line(&format!("movzbl {}, %eax", operand)),
            (2, true) => self.line(&format!("movswl {}, %eax", operand)),
            (2, false) => self.line(&format!("movzwl {}, %eax", operand)),
            _ => self.line(&format!("movl {}, %eax", operand)),
        }
    }

    // ---- expressions ------------------------------------------------

    /// Evaluate `expr` into %eax.
    fn emit_expr(&mut self, expr: &IrExpr) -> Result<(), CodeGenError> {
        match expr {
            IrExpr::Imm(value) => self.line(&format!("mov ${}, %eax", *value as i32)),
            IrExpr::Str(index) => self.line(&format!("mov $.LC{}, %eax", index)),
            IrExpr::Var(var) => {
                let (size, signed) = self.var_width(*var);
                match self.frame_or_symbol(*var)? {
                    MemRef::Frame(offset) => {
                        self.load_into_eax(&format!("{}(%ebp)", offset), size, signed)
                    }
                    MemRef::Symbol(name) => self.load_into_eax(&name, size, signed),
                }
            }
            IrExpr::Addr(var) => match self.frame_or_symbol(*var)? {
                MemRef::Frame(offset) => self.line(&format!("lea {}(%ebp), %eax", offset)),
                MemRef::Symbol(name) => self.line(&format!("mov ${}, %eax", name)),
            },
            IrExpr::Mem { addr, size, signed } => {
                self.emit_expr(addr)?;
                self.load_into_eax("(%eax)", *size, *signed)
            }
            IrExpr::Un { op, expr } => {
                self.emit_expr(expr)?;
                match op {
                    IrUnOp::Neg => self.line("neg %eax"),
                    IrUnOp::BitNot => self.line("not %eax"),
                    IrUnOp::Not => {
                        self.line("cmp $0, %eax")?;
                        self.line("sete %al")?;
                        self.line("movzbl %al, %eax")
                    }
                    IrUnOp::Cast { size: 1, signed: true } => self.line("movsbl %al, %eax"),
                    IrUnOp::Cast { size: 1, signed: false } => self.line("movzbl %al, %eax"),
                    IrUnOp::Cast { size: 2, signed: true } => self.line("movswl %ax, %eax"),
                    IrUnOp::Cast { size: 2, signed: false } => self.line("movzwl %ax, %eax"),
                    IrUnOp::Cast { .. } => Ok(()),
                }
            }
            IrExpr::Bin { op, lhs, rhs } => {
                self.emit_expr(lhs)?;
                self.line("push %eax")?;
                self.emit_expr(rhs)?;
                self.line("mov %eax, %ecx")?;
                self.line("pop %eax")?;
                self.emit_binop(*op)
            }
            IrExpr::Call { callee, args } => {
                for arg in args.iter().rev() {
                    self.emit_expr(arg)?;
                    self.line("push %eax")?;
                }
                match callee {
                    IrCallee::Direct(id) => {
                        let name = &self.entities.get(*id).name;
                        if self.pic {
                            let call = format!("call {}@PLT", name);
                            self.line(&call)?;
                        } else {
                            let call = format!("call {}", name);
                            self.line(&call)?;
                        }
                    }
                    IrCallee::Indirect(target) => {
                        self.emit_expr(target)?;
                        self.line("call *%eax")?;
                    }
                }
                if !args.is_empty() {
                    self.line(&format!("add ${}, %esp", 4 * args.len()))?;
                }
                Ok(())
            }
        }
    }

    /// Combine %eax (left) and %ecx (right) into %eax.
    fn emit_binop(&mut self, op: IrBinOp) -> Result<(), CodeGenError> {
        match op {
            IrBinOp::Add => self.line("add %ecx, %eax"),
            IrBinOp::Sub => self.line("sub %ecx, %eax"),
            IrBinOp::Mul => self.line("imul %ecx, %eax"),
            IrBinOp::SDiv => {
                self.line("cltd")?;
                self.line("idiv %ecx")
            }
            IrBinOp::UDiv => {
                self.line("mov $0, %edx")?;
                self.line("div %ecx")
            }
            IrBinOp::SMod => {
                self.line("cltd")?;
                self.line("idiv %ecx")?;
                self.line("mov %edx, %eax")
            }
            IrBinOp::UMod => {
                self.line("mov $0, %edx")?;
                self.line("div %ecx")?;
                self.line("mov %edx, %eax")
            }
            IrBinOp::BitAnd => self.line("and %ecx, %eax"),
            IrBinOp::BitOr => self.line("or %ecx, %eax"),
            IrBinOp::BitXor => self.line("xor %ecx, %eax"),
            IrBinOp::Shl => self.line("shl %cl, %eax"),
            IrBinOp::AShr => self.line("sar %cl, %eax"),
            IrBinOp::LShr => self.line("shr %cl, %eax"),
            IrBinOp::Eq => self.emit_compare("sete"),
            IrBinOp::NotEq => self.emit_compare("setne"),
            IrBinOp::SLt => self.emit_compare("setl"),
            IrBinOp::SLtEq => self.emit_compare("setle"),
            IrBinOp::SGt => self.emit_compare("setg"),
            IrBinOp::SGtEq => self.emit_compare("setge"),
            IrBinOp::ULt => self.emit_compare("setb"),
            IrBinOp::ULtEq => self.emit_compare("setbe"),
            IrBinOp::UGt => self.emit_compare("seta"),
            IrBinOp::UGtEq => self.emit_compare("setae"),
        }
    }

    fn emit_compare(&mut self, set: &str) -> Result<(), CodeGenError> {
        self.line("cmp %ecx, %eax")?;
        self.line(&format!("{} %al", set))?;
        self.line("movzbl %al, %eax")
    }
}
