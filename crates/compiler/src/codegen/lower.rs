//! AST to IR lowering
//!
//! Lowers semantically checked function bodies to the linear IR.
//! Side-effecting subexpressions (assignments, increments, calls in
//! value position) are hoisted into statements ahead of the value they
//! produce, with temporaries holding values that must survive a side
//! effect. Short-circuit operators and `?:` lower to conditional jumps
//! around temporary assignments; loops and switch lower to the label
//! shapes the emitter expects. Pointer arithmetic is scaled here, by the
//! element size recorded during type checking.

use super::error::CodeGenError;
use super::ir::*;
use crate::ast::*;
use crate::const_eval::const_int;
use crate::entity::{EntityId, EntityKind, EntityTable};
use crate::error::Location;
use crate::types::{Type, TypeId, TypeTable};
use std::collections::HashMap;

type LResult<T> = Result<T, CodeGenError>;

pub fn lower(ast: &Ast, entities: &EntityTable, types: &TypeTable) -> LResult<Ir> {
    let mut lowerer = Lowerer {
        entities,
        types,
        ir: Ir::default(),
        string_ids: HashMap::new(),
        label_counter: 0,
        stmts: Vec::new(),
        locals: Vec::new(),
        temp_count: 0,
        break_stack: Vec::new(),
        continue_stack: Vec::new(),
        goto_labels: HashMap::new(),
    };
    for declaration in &ast.declarations {
        match declaration {
            Declaration::DefinedFunction(f) => {
                let function = lowerer.lower_function(f)?;
                lowerer.ir.functions.push(function);
            }
            Declaration::DefinedVariable(v) => lowerer.lower_global(v)?,
            _ => {}
        }
    }
    Ok(lowerer.ir)
}

struct Lowerer<'a> {
    entities: &'a EntityTable,
    types: &'a TypeTable,
    ir: Ir,
    string_ids: HashMap<Vec<u8>, usize>,
    /// unit-wide so labels stay unique across functions
    label_counter: usize,
    stmts: Vec<IrStmt>,
    locals: Vec<EntityId>,
    temp_count: usize,
    break_stack: Vec<Label>,
    continue_stack: Vec<Label>,
    goto_labels: HashMap<String, Label>,
}

impl<'a> Lowerer<'a> {
    // ---- small helpers ----------------------------------------------

    fn new_label(&mut self) -> Label {
        let label = format!(".L{}", self.label_counter);
        self.label_counter += 1;
        label
    }

    fn new_temp(&mut self) -> IrVar {
        let temp = IrVar::Temp(self.temp_count);
        self.temp_count += 1;
        temp
    }

    fn push(&mut self, stmt: IrStmt) {
        self.stmts.push(stmt);
    }

    fn set_temp(&mut self, temp: IrVar, value: IrExpr) {
        self.push(IrStmt::Assign {
            addr: IrExpr::Addr(temp),
            value,
            size: 4,
        });
    }

    fn intern_string(&mut self, bytes: &[u8]) -> usize {
        if let Some(&id) = self.string_ids.get(bytes) {
            return id;
        }
        let id = self.ir.strings.len();
        self.ir.strings.push(bytes.to_vec());
        self.string_ids.insert(bytes.to_vec(), id);
        id
    }

    fn ty(&self, expr: &Expr) -> LResult<TypeId> {
        expr.ty
            .ok_or_else(|| CodeGenError::internal(&expr.location, "expression type not resolved"))
    }

    fn size_of(&self, ty: TypeId, location: &Location) -> LResult<u32> {
        self.types
            .size_of(ty)
            .ok_or_else(|| CodeGenError::internal(location, "size of unsized type requested"))
    }

    fn is_aggregate(&self, ty: TypeId) -> bool {
        self.types.is_composite(ty) || self.types.is_array(ty)
    }

    /// Scalar load through `addr`; aggregates and function designators
    /// are their address.
    fn value_of(&self, addr: IrExpr, ty: TypeId, location: &Location) -> LResult<IrExpr> {
        if self.is_aggregate(ty) || self.types.is_function(ty) {
            return Ok(addr);
        }
        Ok(IrExpr::Mem {
            addr: Box::new(addr),
            size: self.size_of(ty, location)? as u8,
            signed: self.types.is_signed(ty),
        })
    }

    /// Element size used to scale pointer arithmetic on `ptr_ty`.
    fn scale_of(&self, ptr_ty: TypeId, location: &Location) -> LResult<i64> {
        let base = self
            .types
            .base_of(ptr_ty)
            .ok_or_else(|| CodeGenError::internal(location, "scaling a non-pointer type"))?;
        Ok(self.size_of(base, location)? as i64)
    }

    fn scaled(&self, index: IrExpr, elem_size: i64) -> IrExpr {
        if elem_size == 1 {
            return index;
        }
        IrExpr::Bin {
            op: IrBinOp::Mul,
            lhs: Box::new(index),
            rhs: Box::new(IrExpr::Imm(elem_size)),
        }
    }

    fn goto_label(&mut self, name: &str) -> Label {
        if let Some(label) = self.goto_labels.get(name) {
            return label.clone();
        }
        let label = self.new_label();
        self.goto_labels.insert(name.to_string(), label.clone());
        label
    }

    // ---- functions and globals --------------------------------------

    fn lower_function(&mut self, f: &FunctionDef) -> LResult<IrFunction> {
        self.stmts.clear();
        self.locals.clear();
        self.temp_count = 0;
        self.goto_labels.clear();

        self.lower_stmt(&f.body)?;

        let entity = f
            .entity
            .ok_or_else(|| CodeGenError::internal(&f.location, "function entity not resolved"))?;
        let params = f
            .params
            .iter()
            .map(|p| {
                p.entity.ok_or_else(|| {
                    CodeGenError::internal(&p.location, "parameter entity not resolved")
                })
            })
            .collect::<LResult<Vec<_>>>()?;
        Ok(IrFunction {
            entity,
            name: f.name.clone(),
            params,
            locals: std::mem::take(&mut self.locals),
            temp_count: self.temp_count,
            body: std::mem::take(&mut self.stmts),
            frame_size: 0,
            temp_offsets: Vec::new(),
        })
    }

    fn lower_global(&mut self, v: &VariableDef) -> LResult<()> {
        let entity = v
            .entity
            .ok_or_else(|| CodeGenError::internal(&v.location, "global entity not resolved"))?;
        let init = match &v.initializer {
            None => GlobalInit::Zero,
            Some(expr) => {
                if let Some(bytes) = Self::string_literal_bytes(expr) {
                    GlobalInit::Str(self.intern_string(&bytes))
                } else {
                    match const_int(expr, self.entities, self.types) {
                        Ok(0) => GlobalInit::Zero,
                        Ok(value) => GlobalInit::Int(value),
                        Err(_) => {
                            return Err(CodeGenError::internal(
                                &expr.location,
                                "non-constant global initializer survived checking",
                            ));
                        }
                    }
                }
            }
        };
        self.ir.globals.push(IrGlobal { entity, init });
        Ok(())
    }

    fn string_literal_bytes(expr: &Expr) -> Option<Vec<u8>> {
        match &expr.kind {
            ExprKind::StringLiteral(bytes) => Some(bytes.clone()),
            ExprKind::Cast { expr: inner, .. } => Self::string_literal_bytes(inner),
            _ => None,
        }
    }

    // ---- statements -------------------------------------------------

    fn lower_stmt(&mut self, stmt: &Stmt) -> LResult<()> {
        match &stmt.kind {
            StmtKind::Empty => Ok(()),
            StmtKind::Block(stmts) => {
                for s in stmts {
                    self.lower_stmt(s)?;
                }
                Ok(())
            }
            StmtKind::LocalVar(var) => self.lower_local(var),
            StmtKind::Expr(expr) => self.lower_expr_stmt(expr),
            StmtKind::If { cond, then, els } => {
                let then_label = self.new_label();
                let else_label = self.new_label();
                let cond_ir = self.transform(cond)?;
                match els {
                    Some(els) => {
                        let end_label = self.new_label();
                        self.push(IrStmt::CJump {
                            cond: cond_ir,
                            then_label: then_label.clone(),
                            else_label: else_label.clone(),
                        });
                        self.push(IrStmt::Label(then_label));
                        self.lower_stmt(then)?;
                        self.push(IrStmt::Jump(end_label.clone()));
                        self.push(IrStmt::Label(else_label));
                        self.lower_stmt(els)?;
                        self.push(IrStmt::Label(end_label));
                    }
                    None => {
                        self.push(IrStmt::CJump {
                            cond: cond_ir,
                            then_label: then_label.clone(),
                            else_label: else_label.clone(),
                        });
                        self.push(IrStmt::Label(then_label));
                        self.lower_stmt(then)?;
                        self.push(IrStmt::Label(else_label));
                    }
                }
                Ok(())
            }
            StmtKind::While { cond, body } => {
                let top = self.new_label();
                let body_label = self.new_label();
                let end = self.new_label();
                self.push(IrStmt::Label(top.clone()));
                let cond_ir = self.transform(cond)?;
                self.push(IrStmt::CJump {
                    cond: cond_ir,
                    then_label: body_label.clone(),
                    else_label: end.clone(),
                });
                self.push(IrStmt::Label(body_label));
                self.break_stack.push(end.clone());
                self.continue_stack.push(top.clone());
                self.lower_stmt(body)?;
                self.continue_stack.pop();
                self.break_stack.pop();
                self.push(IrStmt::Jump(top));
                self.push(IrStmt::Label(end));
                Ok(())
            }
            StmtKind::DoWhile { body, cond } => {
                let body_label = self.new_label();
                let cont = self.new_label();
                let end = self.new_label();
                self.push(IrStmt::Label(body_label.clone()));
                self.break_stack.push(end.clone());
                self.continue_stack.push(cont.clone());
                self.lower_stmt(body)?;
                self.continue_stack.pop();
                self.break_stack.pop();
                self.push(IrStmt::Label(cont));
                let cond_ir = self.transform(cond)?;
                self.push(IrStmt::CJump {
                    cond: cond_ir,
                    then_label: body_label,
                    else_label: end.clone(),
                });
                self.push(IrStmt::Label(end));
                Ok(())
            }
            StmtKind::For {
                init,
                cond,
                step,
                body,
            } => {
                match init {
                    Some(ForInit::Var(var)) => self.lower_local(var)?,
                    Some(ForInit::Expr(expr)) => self.lower_expr_stmt(expr)?,
                    None => {}
                }
                let top = self.new_label();
                let body_label = self.new_label();
                let cont = self.new_label();
                let end = self.new_label();
                self.push(IrStmt::Label(top.clone()));
                match cond {
                    Some(cond) => {
                        let cond_ir = self.transform(cond)?;
                        self.push(IrStmt::CJump {
                            cond: cond_ir,
                            then_label: body_label.clone(),
                            else_label: end.clone(),
                        });
                        self.push(IrStmt::Label(body_label));
                    }
                    None => {}
                }
                self.break_stack.push(end.clone());
                self.continue_stack.push(cont.clone());
                self.lower_stmt(body)?;
                self.continue_stack.pop();
                self.break_stack.pop();
                self.push(IrStmt::Label(cont));
                if let Some(step) = step {
                    self.lower_expr_stmt(step)?;
                }
                self.push(IrStmt::Jump(top));
                self.push(IrStmt::Label(end));
                Ok(())
            }
            StmtKind::Switch { cond, clauses } => self.lower_switch(cond, clauses),
            StmtKind::Return(value) => {
                let value = match value {
                    Some(expr) => Some(self.transform(expr)?),
                    None => None,
                };
                self.push(IrStmt::Return(value));
                Ok(())
            }
            StmtKind::Break => {
                let label = self.break_stack.last().cloned().ok_or_else(|| {
                    CodeGenError::internal(&stmt.location, "break without target")
                })?;
                self.push(IrStmt::Jump(label));
                Ok(())
            }
            StmtKind::Continue => {
                let label = self.continue_stack.last().cloned().ok_or_else(|| {
                    CodeGenError::internal(&stmt.location, "continue without target")
                })?;
                self.push(IrStmt::Jump(label));
                Ok(())
            }
            StmtKind::Label { name, stmt: inner } => {
                let label = self.goto_label(name);
                self.push(IrStmt::Label(label));
                self.lower_stmt(inner)
            }
            StmtKind::Goto(name) => {
                let label = self.goto_label(name);
                self.push(IrStmt::Jump(label));
                Ok(())
            }
        }
    }

    fn lower_local(&mut self, var: &VariableDef) -> LResult<()> {
        let entity = var
            .entity
            .ok_or_else(|| CodeGenError::internal(&var.location, "local entity not resolved"))?;
        self.locals.push(entity);
        let Some(init) = &var.initializer else {
            return Ok(());
        };
        let ty = self.entities.get(entity).ty.ok_or_else(|| {
            CodeGenError::internal(&var.location, "local type not resolved")
        })?;
        let value = self.transform(init)?;
        if self.types.is_composite(ty) {
            let size = self.size_of(ty, &var.location)?;
            self.push(IrStmt::Copy {
                dst: IrExpr::Addr(IrVar::Entity(entity)),
                src: value,
                size,
            });
        } else {
            let size = self.size_of(ty, &var.location)? as u8;
            self.push(IrStmt::Assign {
                addr: IrExpr::Addr(IrVar::Entity(entity)),
                value,
                size,
            });
        }
        Ok(())
    }

    fn lower_switch(&mut self, cond: &Expr, clauses: &[CaseClause]) -> LResult<()> {
        let cond_ir = self.transform(cond)?;
        let end = self.new_label();
        let mut cases = Vec::new();
        let mut clause_labels = Vec::with_capacity(clauses.len());
        let mut default = end.clone();
        for clause in clauses {
            let label = self.new_label();
            clause_labels.push(label.clone());
            if clause.is_default {
                default = label.clone();
            }
            for value in &clause.values {
                let folded = const_int(value, self.entities, self.types).map_err(
                    |(location, message)| CodeGenError::internal(&location, message),
                )?;
                cases.push((folded, label.clone()));
            }
        }
        self.push(IrStmt::Switch {
            cond: cond_ir,
            cases,
            default,
        });
        self.break_stack.push(end.clone());
        for (clause, label) in clauses.iter().zip(clause_labels) {
            self.push(IrStmt::Label(label));
            for s in &clause.body {
                self.lower_stmt(s)?;
            }
            // no jump here: control falls through to the next clause
        }
        self.break_stack.pop();
        self.push(IrStmt::Label(end));
        Ok(())
    }

    // ---- expression statements --------------------------------------

    /// Lower an expression evaluated for its effect only.
    fn lower_expr_stmt(&mut self, expr: &Expr) -> LResult<()> {
        match &expr.kind {
            ExprKind::Assign { lhs, rhs } => {
                let ty = self.ty(lhs)?;
                let addr = self.addr_of(lhs)?;
                let value = self.transform(rhs)?;
                if self.types.is_composite(ty) {
                    let size = self.size_of(ty, &expr.location)?;
                    self.push(IrStmt::Copy {
                        dst: addr,
                        src: value,
                        size,
                    });
                } else {
                    let size = self.size_of(ty, &expr.location)? as u8;
                    self.push(IrStmt::Assign { addr, value, size });
                }
                Ok(())
            }
            ExprKind::OpAssign { op, lhs, rhs } => {
                let (addr, updated, size) = self.op_assign_parts(*op, lhs, rhs)?;
                self.push(IrStmt::Assign {
                    addr,
                    value: updated,
                    size,
                });
                Ok(())
            }
            ExprKind::Unary { op, expr: inner }
                if matches!(
                    op,
                    UnaryOp::PreInc | UnaryOp::PreDec | UnaryOp::PostInc | UnaryOp::PostDec
                ) =>
            {
                let (addr, updated, size) = self.crement_parts(*op, inner)?;
                self.push(IrStmt::Assign {
                    addr,
                    value: updated,
                    size,
                });
                Ok(())
            }
            ExprKind::Comma { lhs, rhs } => {
                self.lower_expr_stmt(lhs)?;
                self.lower_expr_stmt(rhs)
            }
            ExprKind::Cond { cond, then, els } => {
                let then_label = self.new_label();
                let else_label = self.new_label();
                let end = self.new_label();
                let cond_ir = self.transform(cond)?;
                self.push(IrStmt::CJump {
                    cond: cond_ir,
                    then_label: then_label.clone(),
                    else_label: else_label.clone(),
                });
                self.push(IrStmt::Label(then_label));
                self.lower_expr_stmt(then)?;
                self.push(IrStmt::Jump(end.clone()));
                self.push(IrStmt::Label(else_label));
                self.lower_expr_stmt(els)?;
                self.push(IrStmt::Label(end));
                Ok(())
            }
            ExprKind::Cast { expr: inner, .. } => self.lower_expr_stmt(inner),
            _ => {
                let value = self.transform(expr)?;
                self.push(IrStmt::Expr(value));
                Ok(())
            }
        }
    }

    // ---- expressions in value position ------------------------------

    /// Lower `expr` to a pure operand, hoisting its side effects into
    /// statements first.
    fn transform(&mut self, expr: &Expr) -> LResult<IrExpr> {
        match &expr.kind {
            ExprKind::IntLiteral { value, .. } => Ok(IrExpr::Imm(*value)),
            ExprKind::CharLiteral(c) => Ok(IrExpr::Imm(*c as i64)),
            ExprKind::StringLiteral(bytes) => {
                let bytes = bytes.clone();
                Ok(IrExpr::Str(self.intern_string(&bytes)))
            }
            ExprKind::VarRef { entity, name } => {
                let id = entity.ok_or_else(|| {
                    CodeGenError::internal(&expr.location, format!("unresolved reference {}", name))
                })?;
                let entity = self.entities.get(id);
                match entity.kind {
                    EntityKind::Constant => {
                        let value = entity.const_value.ok_or_else(|| {
                            CodeGenError::internal(&expr.location, "constant without value")
                        })?;
                        Ok(IrExpr::Imm(value))
                    }
                    EntityKind::Function => Ok(IrExpr::Addr(IrVar::Entity(id))),
                    _ => {
                        let ty = entity.ty.ok_or_else(|| {
                            CodeGenError::internal(&expr.location, "variable type not resolved")
                        })?;
                        if self.is_aggregate(ty) {
                            Ok(IrExpr::Addr(IrVar::Entity(id)))
                        } else {
                            Ok(IrExpr::Var(IrVar::Entity(id)))
                        }
                    }
                }
            }
            ExprKind::Unary { op, expr: inner } => self.transform_unary(*op, inner, expr),
            ExprKind::Deref(_)
            | ExprKind::ArrayRef { .. }
            | ExprKind::Member { .. }
            | ExprKind::PtrMember { .. } => {
                let ty = self.ty(expr)?;
                let addr = self.addr_of(expr)?;
                self.value_of(addr, ty, &expr.location)
            }
            ExprKind::Addr(inner) => self.addr_of(inner),
            ExprKind::SizeofExpr(inner) => {
                let ty = self.ty(inner)?;
                Ok(IrExpr::Imm(self.size_of(ty, &inner.location)? as i64))
            }
            ExprKind::SizeofType(type_ref) => {
                let ty = type_ref.resolved.ok_or_else(|| {
                    CodeGenError::internal(&type_ref.location, "sizeof type not resolved")
                })?;
                Ok(IrExpr::Imm(self.size_of(ty, &type_ref.location)? as i64))
            }
            ExprKind::Binary { op, lhs, rhs } => self.transform_binary(*op, lhs, rhs, expr),
            ExprKind::Assign { lhs, rhs } => {
                let ty = self.ty(lhs)?;
                let addr = self.pure_address(lhs)?;
                let value = self.transform(rhs)?;
                if self.types.is_composite(ty) {
                    let size = self.size_of(ty, &expr.location)?;
                    self.push(IrStmt::Copy {
                        dst: addr.clone(),
                        src: value,
                        size,
                    });
                    return Ok(addr);
                }
                let size = self.size_of(ty, &expr.location)? as u8;
                let temp = self.new_temp();
                self.set_temp(temp, value);
                self.push(IrStmt::Assign {
                    addr,
                    value: IrExpr::Var(temp),
                    size,
                });
                Ok(IrExpr::Var(temp))
            }
            ExprKind::OpAssign { op, lhs, rhs } => {
                let (addr, updated, size) = self.op_assign_parts(*op, lhs, rhs)?;
                let temp = self.new_temp();
                self.set_temp(temp, updated);
                self.push(IrStmt::Assign {
                    addr,
                    value: IrExpr::Var(temp),
                    size,
                });
                Ok(IrExpr::Var(temp))
            }
            ExprKind::Cast { expr: inner, .. } => {
                let value = self.transform(inner)?;
                let target = self.ty(expr)?;
                match self.types.get(target) {
                    Type::Integer { kind, signed } if kind.size() < 4 => Ok(IrExpr::Un {
                        op: IrUnOp::Cast {
                            size: kind.size() as u8,
                            signed: *signed,
                        },
                        expr: Box::new(value),
                    }),
                    _ => Ok(value),
                }
            }
            ExprKind::FunCall { callee, args } => {
                let mut arg_values = Vec::with_capacity(args.len());
                for arg in args {
                    arg_values.push(self.transform(arg)?);
                }
                let callee = match Self::direct_callee(self.entities, callee) {
                    Some(id) => IrCallee::Direct(id),
                    None => IrCallee::Indirect(Box::new(self.transform(callee)?)),
                };
                Ok(IrExpr::Call {
                    callee,
                    args: arg_values,
                })
            }
            ExprKind::Cond { cond, then, els } => {
                let temp = self.new_temp();
                let then_label = self.new_label();
                let else_label = self.new_label();
                let end = self.new_label();
                let cond_ir = self.transform(cond)?;
                self.push(IrStmt::CJump {
                    cond: cond_ir,
                    then_label: then_label.clone(),
                    else_label: else_label.clone(),
                });
                self.push(IrStmt::Label(then_label));
                let then_value = self.transform(then)?;
                self.set_temp(temp, then_value);
                self.push(IrStmt::Jump(end.clone()));
                self.push(IrStmt::Label(else_label));
                let else_value = self.transform(els)?;
                self.set_temp(temp, else_value);
                self.push(IrStmt::Label(end));
                Ok(IrExpr::Var(temp))
            }
            ExprKind::Comma { lhs, rhs } => {
                self.lower_expr_stmt(lhs)?;
                self.transform(rhs)
            }
        }
    }

    fn transform_unary(&mut self, op: UnaryOp, inner: &Expr, whole: &Expr) -> LResult<IrExpr> {
        match op {
            UnaryOp::Plus => self.transform(inner),
            UnaryOp::Minus => Ok(IrExpr::Un {
                op: IrUnOp::Neg,
                expr: Box::new(self.transform(inner)?),
            }),
            UnaryOp::BitNot => Ok(IrExpr::Un {
                op: IrUnOp::BitNot,
                expr: Box::new(self.transform(inner)?),
            }),
            UnaryOp::Not => Ok(IrExpr::Un {
                op: IrUnOp::Not,
                expr: Box::new(self.transform(inner)?),
            }),
            UnaryOp::PreInc | UnaryOp::PreDec => {
                let (addr, updated, size) = self.crement_parts(op, inner)?;
                self.push(IrStmt::Assign {
                    addr: addr.clone(),
                    value: updated,
                    size,
                });
                let ty = self.ty(inner)?;
                self.value_of(addr, ty, &whole.location)
            }
            UnaryOp::PostInc | UnaryOp::PostDec => {
                let ty = self.ty(inner)?;
                let size = self.size_of(ty, &whole.location)? as u8;
                let addr = self.pure_address(inner)?;
                let temp = self.new_temp();
                let old = self.value_of(addr.clone(), ty, &whole.location)?;
                self.set_temp(temp, old);
                let delta = self.crement_delta(ty, &whole.location)?;
                let op_ir = if op == UnaryOp::PostInc {
                    IrBinOp::Add
                } else {
                    IrBinOp::Sub
                };
                self.push(IrStmt::Assign {
                    addr,
                    value: IrExpr::Bin {
                        op: op_ir,
                        lhs: Box::new(IrExpr::Var(temp)),
                        rhs: Box::new(IrExpr::Imm(delta)),
                    },
                    size,
                });
                Ok(IrExpr::Var(temp))
            }
        }
    }

    /// `++`/`--` step: 1 for integers, the element size for pointers.
    fn crement_delta(&self, ty: TypeId, location: &Location) -> LResult<i64> {
        if self.types.is_pointer(ty) {
            self.scale_of(ty, location)
        } else {
            Ok(1)
        }
    }

    /// Shared pieces of an in-place update: target address, updated
    /// value, store size.
    fn crement_parts(&mut self, op: UnaryOp, lhs: &Expr) -> LResult<(IrExpr, IrExpr, u8)> {
        let ty = self.ty(lhs)?;
        let size = self.size_of(ty, &lhs.location)? as u8;
        let addr = self.pure_address(lhs)?;
        let current = self.value_of(addr.clone(), ty, &lhs.location)?;
        let delta = self.crement_delta(ty, &lhs.location)?;
        let op_ir = match op {
            UnaryOp::PreInc | UnaryOp::PostInc => IrBinOp::Add,
            _ => IrBinOp::Sub,
        };
        let updated = IrExpr::Bin {
            op: op_ir,
            lhs: Box::new(current),
            rhs: Box::new(IrExpr::Imm(delta)),
        };
        Ok((addr, updated, size))
    }

    fn op_assign_parts(
        &mut self,
        op: BinaryOp,
        lhs: &Expr,
        rhs: &Expr,
    ) -> LResult<(IrExpr, IrExpr, u8)> {
        let ty = self.ty(lhs)?;
        let size = self.size_of(ty, &lhs.location)? as u8;
        let addr = self.pure_address(lhs)?;
        let current = self.value_of(addr.clone(), ty, &lhs.location)?;
        let mut rhs_ir = self.transform(rhs)?;
        if self.types.is_pointer(ty) {
            rhs_ir = self.scaled(rhs_ir, self.scale_of(ty, &lhs.location)?);
        }
        let op_ir = self.ir_binop(op, ty, &lhs.location)?;
        let updated = IrExpr::Bin {
            op: op_ir,
            lhs: Box::new(current),
            rhs: Box::new(rhs_ir),
        };
        Ok((addr, updated, size))
    }

    fn transform_binary(
        &mut self,
        op: BinaryOp,
        lhs: &Expr,
        rhs: &Expr,
        whole: &Expr,
    ) -> LResult<IrExpr> {
        if op.is_logical() {
            return self.transform_logical(op, lhs, rhs);
        }
        let lty = self.ty(lhs)?;
        let rty = self.ty(rhs)?;
        let lhs_ir = self.transform(lhs)?;
        let rhs_ir = self.transform(rhs)?;

        // pointer arithmetic scales by the element size
        if op == BinaryOp::Add || op == BinaryOp::Sub {
            let lptr = self.types.is_pointer(lty);
            let rptr = self.types.is_pointer(rty);
            if lptr && rptr {
                // ptr - ptr: byte difference divided by element size
                let elem = self.scale_of(lty, &whole.location)?;
                let diff = IrExpr::Bin {
                    op: IrBinOp::Sub,
                    lhs: Box::new(lhs_ir),
                    rhs: Box::new(rhs_ir),
                };
                return Ok(IrExpr::Bin {
                    op: IrBinOp::SDiv,
                    lhs: Box::new(diff),
                    rhs: Box::new(IrExpr::Imm(elem)),
                });
            }
            if lptr {
                let scaled = self.scaled(rhs_ir, self.scale_of(lty, &whole.location)?);
                return Ok(IrExpr::Bin {
                    op: if op == BinaryOp::Add {
                        IrBinOp::Add
                    } else {
                        IrBinOp::Sub
                    },
                    lhs: Box::new(lhs_ir),
                    rhs: Box::new(scaled),
                });
            }
            if rptr {
                // int + ptr
                let scaled = self.scaled(lhs_ir, self.scale_of(rty, &whole.location)?);
                return Ok(IrExpr::Bin {
                    op: IrBinOp::Add,
                    lhs: Box::new(scaled),
                    rhs: Box::new(rhs_ir),
                });
            }
        }

        let op_ir = self.ir_binop(op, lty, &whole.location)?;
        Ok(IrExpr::Bin {
            op: op_ir,
            lhs: Box::new(lhs_ir),
            rhs: Box::new(rhs_ir),
        })
    }

    fn transform_logical(&mut self, op: BinaryOp, lhs: &Expr, rhs: &Expr) -> LResult<IrExpr> {
        let temp = self.new_temp();
        let rhs_label = self.new_label();
        let true_label = self.new_label();
        let false_label = self.new_label();
        let end = self.new_label();
        let lhs_ir = self.transform(lhs)?;
        match op {
            BinaryOp::LogicalAnd => self.push(IrStmt::CJump {
                cond: lhs_ir,
                then_label: rhs_label.clone(),
                else_label: false_label.clone(),
            }),
            _ => self.push(IrStmt::CJump {
                cond: lhs_ir,
                then_label: true_label.clone(),
                else_label: rhs_label.clone(),
            }),
        }
        self.push(IrStmt::Label(rhs_label));
        let rhs_ir = self.transform(rhs)?;
        self.push(IrStmt::CJump {
            cond: rhs_ir,
            then_label: true_label.clone(),
            else_label: false_label.clone(),
        });
        self.push(IrStmt::Label(true_label));
        self.set_temp(temp, IrExpr::Imm(1));
        self.push(IrStmt::Jump(end.clone()));
        self.push(IrStmt::Label(false_label));
        self.set_temp(temp, IrExpr::Imm(0));
        self.push(IrStmt::Label(end));
        Ok(IrExpr::Var(temp))
    }

    /// Signedness-aware operator selection; pointers compare unsigned.
    fn ir_binop(&self, op: BinaryOp, operand_ty: TypeId, location: &Location) -> LResult<IrBinOp> {
        let signed = self.types.is_signed(operand_ty);
        let mapped = match op {
            BinaryOp::Add => IrBinOp::Add,
            BinaryOp::Sub => IrBinOp::Sub,
            BinaryOp::Mul => IrBinOp::Mul,
            BinaryOp::Div => {
                if signed {
                    IrBinOp::SDiv
                } else {
                    IrBinOp::UDiv
                }
            }
            BinaryOp::Mod => {
                if signed {
                    IrBinOp::SMod
                } else {
                    IrBinOp::UMod
                }
            }
            BinaryOp::BitAnd => IrBinOp::BitAnd,
            BinaryOp::BitOr => IrBinOp::BitOr,
            BinaryOp::BitXor => IrBinOp::BitXor,
            BinaryOp::Shl => IrBinOp::Shl,
            BinaryOp::Shr => {
                if signed {
                    IrBinOp::AShr
                } else {
                    IrBinOp::LShr
                }
            }
            BinaryOp::Eq => IrBinOp::Eq,
            BinaryOp::NotEq => IrBinOp::NotEq,
            BinaryOp::Lt => {
                if signed {
                    IrBinOp::SLt
                } else {
                    IrBinOp::ULt
                }
            }
            BinaryOp::LtEq => {
                if signed {
                    IrBinOp::SLtEq
                } else {
                    IrBinOp::ULtEq
                }
            }
            BinaryOp::Gt => {
                if signed {
                    IrBinOp::SGt
                } else {
                    IrBinOp::UGt
                }
            }
            BinaryOp::GtEq => {
                if signed {
                    IrBinOp::SGtEq
                } else {
                    IrBinOp::UGtEq
                }
            }
            BinaryOp::LogicalAnd | BinaryOp::LogicalOr => {
                return Err(CodeGenError::internal(
                    location,
                    "logical operator reached operator mapping",
                ));
            }
        };
        Ok(mapped)
    }

    // ---- addresses --------------------------------------------------

    /// Address of an lvalue; for aggregate-valued expressions (struct
    /// assignment results, conditional of structs) the value already is
    /// an address.
    fn addr_of(&mut self, expr: &Expr) -> LResult<IrExpr> {
        match &expr.kind {
            ExprKind::VarRef { entity, name } => {
                let id = entity.ok_or_else(|| {
                    CodeGenError::internal(&expr.location, format!("unresolved reference {}", name))
                })?;
                match self.entities.get(id).kind {
                    EntityKind::Constant => Err(CodeGenError::internal(
                        &expr.location,
                        "address of a constant requested",
                    )),
                    _ => Ok(IrExpr::Addr(IrVar::Entity(id))),
                }
            }
            ExprKind::Deref(inner) => self.transform(inner),
            ExprKind::ArrayRef { expr: base, index } => {
                let element_ty = self.ty(expr)?;
                let elem_size = self.size_of(element_ty, &expr.location)? as i64;
                let base_ir = self.transform(base)?;
                let index_ir = self.transform(index)?;
                let scaled = self.scaled(index_ir, elem_size);
                Ok(IrExpr::Bin {
                    op: IrBinOp::Add,
                    lhs: Box::new(base_ir),
                    rhs: Box::new(scaled),
                })
            }
            ExprKind::Member { expr: base, name } => {
                let base_ty = self.ty(base)?;
                let offset = self.member_offset(base_ty, name, &expr.location)?;
                let base_addr = self.addr_of(base)?;
                Ok(offset_addr(base_addr, offset))
            }
            ExprKind::PtrMember { expr: base, name } => {
                let base_ty = self.ty(base)?;
                let pointee = self.types.pointee(base_ty).ok_or_else(|| {
                    CodeGenError::internal(&expr.location, "-> through a non-pointer")
                })?;
                let offset = self.member_offset(pointee, name, &expr.location)?;
                let base_ir = self.transform(base)?;
                Ok(offset_addr(base_ir, offset))
            }
            // aggregate values carry their address
            _ if expr.ty.is_some_and(|t| self.is_aggregate(t)) => self.transform(expr),
            _ => Err(CodeGenError::internal(
                &expr.location,
                "address of a non-lvalue requested",
            )),
        }
    }

    fn member_offset(&self, composite: TypeId, name: &str, location: &Location) -> LResult<i64> {
        self.types
            .member(composite, name)
            .map(|m| m.offset as i64)
            .ok_or_else(|| CodeGenError::internal(location, format!("missing member {}", name)))
    }

    /// Address of `lhs`, hoisted into a temporary when computing it has
    /// side effects, so it can be evaluated twice.
    fn pure_address(&mut self, lhs: &Expr) -> LResult<IrExpr> {
        let addr = self.addr_of(lhs)?;
        if lhs.kind.has_side_effects() {
            let temp = self.new_temp();
            self.set_temp(temp, addr);
            return Ok(IrExpr::Var(temp));
        }
        Ok(addr)
    }

    fn direct_callee(entities: &EntityTable, callee: &Expr) -> Option<EntityId> {
        match &callee.kind {
            ExprKind::VarRef {
                entity: Some(id), ..
            } if entities.get(*id).kind == EntityKind::Function => Some(*id),
            ExprKind::Cast { expr: inner, .. } => Self::direct_callee(entities, inner),
            ExprKind::Addr(inner) => Self::direct_callee(entities, inner),
            ExprKind::Deref(inner) => Self::direct_callee(entities, inner),
            _ => None,
        }
    }
}

/// `base + offset`, dropping a zero offset.
fn offset_addr(base: IrExpr, offset: i64) -> IrExpr {
    if offset == 0 {
        return base;
    }
    IrExpr::Bin {
        op: IrBinOp::Add,
        lhs: Box::new(base),
        rhs: Box::new(IrExpr::Imm(offset)),
    }
}
