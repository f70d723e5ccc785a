//! Intermediate representation
//!
//! A per-function linear list of simple statements over virtual operands.
//! All arithmetic happens on 32-bit words; narrow loads carry their size
//! and signedness so the emitter picks the right extension, and stores
//! carry the size to truncate to. Temporaries introduced by lowering are
//! frame slots like locals. The IR lives only for the duration of codegen
//! of one compilation unit.

use crate::entity::EntityId;
use std::fmt;
use std::fmt::Write as _;

pub type Label = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrBinOp {
    Add,
    Sub,
    Mul,
    SDiv,
    UDiv,
    SMod,
    UMod,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    /// arithmetic shift right (signed)
    AShr,
    /// logical shift right (unsigned)
    LShr,
    Eq,
    NotEq,
    SLt,
    SLtEq,
    SGt,
    SGtEq,
    ULt,
    ULtEq,
    UGt,
    UGtEq,
}

impl IrBinOp {
    pub fn text(self) -> &'static str {
        match self {
            IrBinOp::Add => "+",
            IrBinOp::Sub => "-",
            IrBinOp::Mul => "*",
            IrBinOp::SDiv => "/s",
            IrBinOp::UDiv => "/u",
            IrBinOp::SMod => "%s",
            IrBinOp::UMod => "%u",
            IrBinOp::BitAnd => "&",
            IrBinOp::BitOr => "|",
            IrBinOp::BitXor => "^",
            IrBinOp::Shl => "<<",
            IrBinOp::AShr => ">>s",
            IrBinOp::LShr => ">>u",
            IrBinOp::Eq => "==",
            IrBinOp::NotEq => "!=",
            IrBinOp::SLt => "<s",
            IrBinOp::SLtEq => "<=s",
            IrBinOp::SGt => ">s",
            IrBinOp::SGtEq => ">=s",
            IrBinOp::ULt => "<u",
            IrBinOp::ULtEq => "<=u",
            IrBinOp::UGt => ">u",
            IrBinOp::UGtEq => ">=u",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrUnOp {
    Neg,
    BitNot,
    /// logical not: 1 if zero, else 0
    Not,
    /// normalize the 32-bit accumulator to a narrower width
    Cast { size: u8, signed: bool },
}

/// A variable operand: a named entity or a lowering temporary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrVar {
    Entity(EntityId),
    Temp(usize),
}

#[derive(Debug, Clone)]
pub enum IrCallee {
    Direct(EntityId),
    Indirect(Box<IrExpr>),
}

#[derive(Debug, Clone)]
pub enum IrExpr {
    Imm(i64),
    /// interned string literal, by index
    Str(usize),
    /// scalar value of a variable
    Var(IrVar),
    /// address of a variable, global or function
    Addr(IrVar),
    /// scalar load through an address
    Mem {
        addr: Box<IrExpr>,
        size: u8,
        signed: bool,
    },
    Bin {
        op: IrBinOp,
        lhs: Box<IrExpr>,
        rhs: Box<IrExpr>,
    },
    Un {
        op: IrUnOp,
        expr: Box<IrExpr>,
    },
    Call {
        callee: IrCallee,
        args: Vec<IrExpr>,
    },
}

#[derive(Debug, Clone)]
pub enum IrStmt {
    Label(Label),
    /// evaluate for side effects, discard the value
    Expr(IrExpr),
    /// scalar store
    Assign {
        addr: IrExpr,
        value: IrExpr,
        size: u8,
    },
    /// struct/union block copy between two addresses
    Copy {
        dst: IrExpr,
        src: IrExpr,
        size: u32,
    },
    Jump(Label),
    CJump {
        cond: IrExpr,
        then_label: Label,
        else_label: Label,
    },
    /// compare-and-jump chain; no jump table
    Switch {
        cond: IrExpr,
        cases: Vec<(i64, Label)>,
        default: Label,
    },
    Return(Option<IrExpr>),
}

#[derive(Debug)]
pub struct IrFunction {
    pub entity: EntityId,
    pub name: String,
    pub params: Vec<EntityId>,
    /// all block-scoped variables, in first-seen order
    pub locals: Vec<EntityId>,
    pub temp_count: usize,
    pub body: Vec<IrStmt>,
    /// filled by storage assignment
    pub frame_size: u32,
    pub temp_offsets: Vec<i32>,
}

#[derive(Debug, Clone)]
pub enum GlobalInit {
    Zero,
    Int(i64),
    Str(usize),
}

#[derive(Debug)]
pub struct IrGlobal {
    pub entity: EntityId,
    pub init: GlobalInit,
}

/// Lowered form of one compilation unit.
#[derive(Debug, Default)]
pub struct Ir {
    pub functions: Vec<IrFunction>,
    pub globals: Vec<IrGlobal>,
    /// interned string literals; index n labels as `.LCn`
    pub strings: Vec<Vec<u8>>,
}

impl Ir {
    /// Human-readable dump for the `--dump-ir` driver mode.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        for (index, bytes) in self.strings.iter().enumerate() {
            let _ = writeln!(out, "string .LC{} = {:?}", index, String::from_utf8_lossy(bytes));
        }
        for global in &self.globals {
            let _ = writeln!(out, "global #{} {:?}", global.entity, global.init);
        }
        for function in &self.functions {
            let _ = writeln!(out, "function {} (temps: {})", function.name, function.temp_count);
            for stmt in &function.body {
                let _ = writeln!(out, "  {}", stmt);
            }
        }
        out
    }
}

impl fmt::Display for IrExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IrExpr::Imm(v) => write!(f, "{}", v),
            IrExpr::Str(i) => write!(f, ".LC{}", i),
            IrExpr::Var(IrVar::Entity(id)) => write!(f, "v{}", id),
            IrExpr::Var(IrVar::Temp(i)) => write!(f, "t{}", i),
            IrExpr::Addr(IrVar::Entity(id)) => write!(f, "&v{}", id),
            IrExpr::Addr(IrVar::Temp(i)) => write!(f, "&t{}", i),
            IrExpr::Mem { addr, size, signed } => {
                write!(f, "mem{}{}[{}]", if *signed { "s" } else { "u" }, size, addr)
            }
            IrExpr::Bin { op, lhs, rhs } => write!(f, "({} {} {})", lhs, op.text(), rhs),
            IrExpr::Un { op, expr } => match op {
                IrUnOp::Neg => write!(f, "(- {})", expr),
                IrUnOp::BitNot => write!(f, "(~ {})", expr),
                IrUnOp::Not => write!(f, "(! {})", expr),
                IrUnOp::Cast { size, signed } => {
                    write!(f, "(cast{}{} {})", if *signed { "s" } else { "u" }, size, expr)
                }
            },
            IrExpr::Call { callee, args } => {
                match callee {
                    IrCallee::Direct(id) => write!(f, "call v{}(", id)?,
                    IrCallee::Indirect(e) => write!(f, "call [{}](", e)?,
                }
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
        }
    }
}

impl fmt::Display for IrStmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IrStmt::Label(l) => write!(f, "{}:", l),
            IrStmt::Expr(e) => write!(f, "expr {}", e),
            IrStmt::Assign { addr, value, size } => {
                write!(f, "store{} [{}] = {}", size, addr, value)
            }
            IrStmt::Copy { dst, src, size } => {
                write!(f, "copy{} [{}] = [{}]", size, dst, src)
            }
            IrStmt::Jump(l) => write!(f, "jump {}", l),
            IrStmt::CJump {
                cond,
                then_label,
                else_label,
            } => write!(f, "cjump {} ? {} : {}", cond, then_label, else_label),
            IrStmt::Switch {
                cond,
                cases,
                default,
            } => {
                write!(f, "switch {} ", cond)?;
                for (value, label) in cases {
                    write!(f, "[{} -> {}] ", value, label)?;
                }
                write!(f, "default {}", default)
            }
            IrStmt::Return(Some(e)) => write!(f, "return {}", e),
            IrStmt::Return(None) => write!(f, "return"),
        }
    }
}
