//! Abstract syntax tree for Cb
//!
//! One mutable AST is threaded through every pass. Nodes carry nullable
//! annotation slots (`Option<TypeId>`, `Option<EntityId>`) that the
//! resolution passes fill in; after semantic analysis the invariant is
//! that every slot relevant to a node is `Some`. Expressions carry two
//! type slots: the type the language rules give the expression before
//! implicit conversion, and the effective type afterwards.

use crate::entity::EntityId;
use crate::error::Location;
use crate::types::TypeId;
use std::path::PathBuf;
use std::rc::Rc;

/// Syntactic reference to a type, before resolution against the TypeTable.
#[derive(Debug, Clone)]
pub struct TypeRef {
    pub kind: TypeRefKind,
    pub location: Location,
    /// Filled by the type resolver.
    pub resolved: Option<TypeId>,
}

impl TypeRef {
    pub fn new(kind: TypeRefKind, location: Location) -> Self {
        TypeRef {
            kind,
            location,
            resolved: None,
        }
    }
}

#[derive(Debug, Clone)]
pub enum TypeRefKind {
    Void,
    Integer { signed: bool, kind: IntSpec },
    /// Typedef name.
    Named(String),
    Struct(String),
    Union(String),
    Pointer(Box<TypeRef>),
    Array(Box<TypeRef>, Option<Box<Expr>>),
    Function {
        ret: Box<TypeRef>,
        params: Vec<TypeRef>,
        variadic: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntSpec {
    Char,
    Short,
    Int,
    Long,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Storage {
    /// Default linkage / stack allocation.
    Auto,
    /// Internal linkage at top level.
    Static,
    /// Declared but defined elsewhere.
    Extern,
}

/// One parsed compilation unit plus everything merged in by imports.
#[derive(Debug)]
pub struct Ast {
    pub file: Rc<PathBuf>,
    pub imports: Vec<String>,
    pub declarations: Vec<Declaration>,
}

impl Ast {
    /// The defined function called `name`, if any.
    pub fn defined_function(&self, name: &str) -> Option<&FunctionDef> {
        self.declarations.iter().find_map(|d| match d {
            Declaration::DefinedFunction(f) if f.name == name => Some(f),
            _ => None,
        })
    }
}

#[derive(Debug)]
pub enum Declaration {
    DefinedFunction(FunctionDef),
    UndefinedFunction(FunctionDecl),
    DefinedVariable(VariableDef),
    UndefinedVariable(VariableDecl),
    Constant(ConstantDef),
    Typedef(TypedefDef),
    StructDef(CompositeDefNode),
    UnionDef(CompositeDefNode),
}

impl Declaration {
    pub fn location(&self) -> &Location {
        match self {
            Declaration::DefinedFunction(f) => &f.location,
            Declaration::UndefinedFunction(f) => &f.location,
            Declaration::DefinedVariable(v) => &v.location,
            Declaration::UndefinedVariable(v) => &v.location,
            Declaration::Constant(c) => &c.location,
            Declaration::Typedef(t) => &t.location,
            Declaration::StructDef(s) | Declaration::UnionDef(s) => &s.location,
        }
    }
}

#[derive(Debug)]
pub struct FunctionDef {
    pub name: String,
    pub storage: Storage,
    pub return_type: TypeRef,
    pub params: Vec<Param>,
    pub variadic: bool,
    pub body: Stmt,
    pub location: Location,
    pub entity: Option<EntityId>,
}

#[derive(Debug)]
pub struct FunctionDecl {
    pub name: String,
    pub storage: Storage,
    pub return_type: TypeRef,
    pub params: Vec<Param>,
    pub variadic: bool,
    pub location: Location,
    pub entity: Option<EntityId>,
}

#[derive(Debug)]
pub struct Param {
    pub name: Option<String>,
    pub type_ref: TypeRef,
    pub location: Location,
    pub entity: Option<EntityId>,
}

#[derive(Debug)]
pub struct VariableDef {
    pub name: String,
    pub storage: Storage,
    pub type_ref: TypeRef,
    pub initializer: Option<Expr>,
    pub location: Location,
    pub entity: Option<EntityId>,
}

#[derive(Debug)]
pub struct VariableDecl {
    pub name: String,
    pub type_ref: TypeRef,
    pub location: Location,
    pub entity: Option<EntityId>,
}

#[derive(Debug)]
pub struct ConstantDef {
    pub name: String,
    pub type_ref: TypeRef,
    pub value: Expr,
    pub location: Location,
    pub entity: Option<EntityId>,
}

#[derive(Debug)]
pub struct TypedefDef {
    pub name: String,
    pub type_ref: TypeRef,
    pub location: Location,
}

#[derive(Debug)]
pub struct MemberDecl {
    pub name: String,
    pub type_ref: TypeRef,
    pub location: Location,
}

#[derive(Debug)]
pub struct CompositeDefNode {
    pub name: String,
    pub members: Vec<MemberDecl>,
    pub location: Location,
}

// ---- statements -----------------------------------------------------

#[derive(Debug)]
pub struct Stmt {
    pub kind: StmtKind,
    pub location: Location,
}

impl Stmt {
    pub fn new(kind: StmtKind, location: Location) -> Self {
        Stmt { kind, location }
    }
}

#[derive(Debug)]
pub enum StmtKind {
    /// `;`
    Empty,
    Expr(Expr),
    Block(Vec<Stmt>),
    LocalVar(VariableDef),
    If {
        cond: Expr,
        then: Box<Stmt>,
        els: Option<Box<Stmt>>,
    },
    While {
        cond: Expr,
        body: Box<Stmt>,
    },
    DoWhile {
        body: Box<Stmt>,
        cond: Expr,
    },
    For {
        init: Option<ForInit>,
        cond: Option<Expr>,
        step: Option<Expr>,
        body: Box<Stmt>,
    },
    Switch {
        cond: Expr,
        clauses: Vec<CaseClause>,
    },
    Return(Option<Expr>),
    Break,
    Continue,
    Label {
        name: String,
        stmt: Box<Stmt>,
    },
    Goto(String),
}

#[derive(Debug)]
pub enum ForInit {
    Expr(Expr),
    Var(Box<VariableDef>),
}

/// One `case v1: case v2: body` group (or `default:`). Fallthrough into
/// the next clause happens unless the body breaks or jumps.
#[derive(Debug)]
pub struct CaseClause {
    /// Empty for `default:`.
    pub values: Vec<Expr>,
    pub is_default: bool,
    pub body: Vec<Stmt>,
    pub location: Location,
}

// ---- expressions ----------------------------------------------------

#[derive(Debug, Clone)]
pub struct Expr {
    pub kind: ExprKind,
    pub location: Location,
    /// Type before implicit conversion, filled by the type checker.
    pub orig_type: Option<TypeId>,
    /// Effective type after promotions/conversions.
    pub ty: Option<TypeId>,
}

impl Expr {
    pub fn new(kind: ExprKind, location: Location) -> Self {
        Expr {
            kind,
            location,
            orig_type: None,
            ty: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// `+e`
    Plus,
    /// `-e`
    Minus,
    /// `!e`
    Not,
    /// `~e`
    BitNot,
    PreInc,
    PreDec,
    PostInc,
    PostDec,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    LogicalAnd,
    LogicalOr,
}

impl BinaryOp {
    pub fn text(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
            BinaryOp::Eq => "==",
            BinaryOp::NotEq => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::LtEq => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::GtEq => ">=",
            BinaryOp::LogicalAnd => "&&",
            BinaryOp::LogicalOr => "||",
        }
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Eq
                | BinaryOp::NotEq
                | BinaryOp::Lt
                | BinaryOp::LtEq
                | BinaryOp::Gt
                | BinaryOp::GtEq
        )
    }

    pub fn is_logical(self) -> bool {
        matches!(self, BinaryOp::LogicalAnd | BinaryOp::LogicalOr)
    }
}

#[derive(Debug, Clone)]
pub enum ExprKind {
    IntLiteral {
        value: i64,
        unsigned: bool,
        long: bool,
    },
    CharLiteral(u8),
    /// Decoded bytes, NUL not included.
    StringLiteral(Vec<u8>),
    VarRef {
        name: String,
        entity: Option<EntityId>,
    },
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
    },
    /// `*e`
    Deref(Box<Expr>),
    /// `&e`
    Addr(Box<Expr>),
    SizeofExpr(Box<Expr>),
    SizeofType(TypeRef),
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Assign {
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    OpAssign {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    /// Explicit cast; also reused with `type_ref: None` for the implicit
    /// conversions the type checker materializes.
    Cast {
        type_ref: Option<TypeRef>,
        expr: Box<Expr>,
    },
    /// `e.m`
    Member {
        expr: Box<Expr>,
        name: String,
    },
    /// `e->m`
    PtrMember {
        expr: Box<Expr>,
        name: String,
    },
    /// `e[i]`
    ArrayRef {
        expr: Box<Expr>,
        index: Box<Expr>,
    },
    FunCall {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    /// `c ? t : e`
    Cond {
        cond: Box<Expr>,
        then: Box<Expr>,
        els: Box<Expr>,
    },
    /// `l, r`
    Comma {
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
}

impl ExprKind {
    /// Does evaluating this expression (or a subexpression) write memory
    /// or call a function? Drives temporary introduction in IR lowering.
    pub fn has_side_effects(&self) -> bool {
        match self {
            ExprKind::Assign { .. } | ExprKind::OpAssign { .. } | ExprKind::FunCall { .. } => true,
            ExprKind::Unary { op, .. }
                if matches!(
                    op,
                    UnaryOp::PreInc | UnaryOp::PreDec | UnaryOp::PostInc | UnaryOp::PostDec
                ) =>
            {
                true
            }
            ExprKind::Unary { expr, .. }
            | ExprKind::Deref(expr)
            | ExprKind::Addr(expr)
            | ExprKind::Cast { expr, .. }
            | ExprKind::Member { expr, .. }
            | ExprKind::PtrMember { expr, .. } => expr.kind.has_side_effects(),
            ExprKind::Binary { lhs, rhs, .. } | ExprKind::Comma { lhs, rhs } => {
                lhs.kind.has_side_effects() || rhs.kind.has_side_effects()
            }
            ExprKind::ArrayRef { expr, index } => {
                expr.kind.has_side_effects() || index.kind.has_side_effects()
            }
            ExprKind::Cond { cond, then, els } => {
                cond.kind.has_side_effects()
                    || then.kind.has_side_effects()
                    || els.kind.has_side_effects()
            }
            _ => false,
        }
    }
}
