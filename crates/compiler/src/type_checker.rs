//! Type checking
//!
//! Computes both type slots of every expression and materializes every
//! implicit conversion as an explicit cast node, so code generation never
//! has to reason about conversions. The rules are the C-like subset the
//! language defines: integer promotion of char/short to int, usual
//! arithmetic conversions (wider wins, unsigned wins a width tie),
//! pointer arithmetic scaled by element size, null-literal pointer
//! assignment, `void*` compatibility, exact call arity unless variadic,
//! integral switch conditions with pairwise-distinct case labels, and
//! return-type conformance.

use crate::ast::*;
use crate::const_eval::const_int;
use crate::entity::{EntityKind, EntityTable};
use crate::error::{Diagnostics, Location};
use crate::types::{IntKind, Type, TypeId, TypeTable};

pub fn check(
    ast: &mut Ast,
    entities: &EntityTable,
    types: &mut TypeTable,
    diags: &mut Diagnostics,
    strict_pointers: bool,
) {
    let mut checker = TypeChecker {
        types,
        entities,
        diags,
        return_type: None,
        strict_pointers,
    };
    checker.check_ast(ast);
}

struct TypeChecker<'a> {
    types: &'a mut TypeTable,
    entities: &'a EntityTable,
    diags: &'a mut Diagnostics,
    /// Return type of the function currently being checked.
    return_type: Option<TypeId>,
    /// Treat comparisons of unrelated pointer types as errors instead of
    /// warnings.
    strict_pointers: bool,
}

impl<'a> TypeChecker<'a> {
    fn error(&mut self, location: &Location, message: impl Into<String>) {
        self.diags.error(location.clone(), message.into());
    }

    fn check_ast(&mut self, ast: &mut Ast) {
        for declaration in &mut ast.declarations {
            match declaration {
                Declaration::DefinedFunction(f) => {
                    let Some(entity) = f.entity else { continue };
                    let Some(fn_ty) = self.entities.get(entity).ty else {
                        continue;
                    };
                    self.return_type = self.types.return_type(fn_ty);
                    self.check_stmt(&mut f.body);
                    self.return_type = None;
                }
                Declaration::DefinedVariable(v) => self.check_global_init(v),
                Declaration::Constant(c) => {
                    self.check_expr(&mut c.value);
                }
                _ => {}
            }
        }
    }

    fn check_global_init(&mut self, var: &mut VariableDef) {
        let Some(init) = &mut var.initializer else {
            return;
        };
        let Some(target) = var.entity.and_then(|id| self.entities.get(id).ty) else {
            return;
        };
        if self.check_expr(init).is_none() {
            return;
        }
        self.assign_to(target, init);
        if !Self::is_string_literal(init)
            && const_int(init, self.entities, self.types).is_err()
        {
            self.error(
                &var.location,
                format!("global initializer for {} is not a constant", var.name),
            );
        }
    }

    fn is_string_literal(expr: &Expr) -> bool {
        match &expr.kind {
            ExprKind::StringLiteral(_) => true,
            ExprKind::Cast { expr: inner, .. } => Self::is_string_literal(inner),
            _ => false,
        }
    }

    // ---- statements -------------------------------------------------

    fn check_stmt(&mut self, stmt: &mut Stmt) {
        match &mut stmt.kind {
            StmtKind::Block(stmts) => {
                for s in stmts {
                    self.check_stmt(s);
                }
            }
            StmtKind::LocalVar(var) => self.check_local(var),
            StmtKind::Expr(expr) => {
                self.check_expr(expr);
            }
            StmtKind::If { cond, then, els } => {
                self.check_condition(cond);
                self.check_stmt(then);
                if let Some(els) = els {
                    self.check_stmt(els);
                }
            }
            StmtKind::While { cond, body } => {
                self.check_condition(cond);
                self.check_stmt(body);
            }
            StmtKind::DoWhile { body, cond } => {
                self.check_stmt(body);
                self.check_condition(cond);
            }
            StmtKind::For {
                init,
                cond,
                step,
                body,
            } => {
                match init {
                    Some(ForInit::Var(var)) => self.check_local(var),
                    Some(ForInit::Expr(expr)) => {
                        self.check_expr(expr);
                    }
                    None => {}
                }
                if let Some(cond) = cond {
                    self.check_condition(cond);
                }
                if let Some(step) = step {
                    self.check_expr(step);
                }
                self.check_stmt(body);
            }
            StmtKind::Switch { cond, clauses } => self.check_switch(cond, clauses),
            StmtKind::Return(value) => self.check_return(value, &stmt.location),
            StmtKind::Label { stmt: inner, .. } => self.check_stmt(inner),
            StmtKind::Empty | StmtKind::Break | StmtKind::Continue | StmtKind::Goto(_) => {}
        }
    }

    fn check_local(&mut self, var: &mut VariableDef) {
        let Some(init) = &mut var.initializer else {
            return;
        };
        let Some(target) = var.entity.and_then(|id| self.entities.get(id).ty) else {
            return;
        };
        if self.check_expr(init).is_some() {
            self.assign_to(target, init);
        }
    }

    fn check_condition(&mut self, cond: &mut Expr) {
        if self.check_expr(cond).is_none() {
            return;
        }
        self.decay(cond);
        if let Some(ty) = cond.ty
            && !self.types.is_scalar(ty)
        {
            self.error(&cond.location, "condition must have scalar type");
        }
    }

    fn check_switch(&mut self, cond: &mut Expr, clauses: &mut [CaseClause]) {
        if self.check_expr(cond).is_some() {
            self.decay(cond);
            match cond.ty {
                Some(ty) if self.types.is_integer(ty) => self.promote(cond),
                Some(_) => {
                    self.error(&cond.location, "switch condition must be an integer")
                }
                None => {}
            }
        }
        let mut seen_values: Vec<i64> = Vec::new();
        let mut seen_default = false;
        for clause in clauses.iter_mut() {
            if clause.is_default {
                if seen_default {
                    self.error(&clause.location, "duplicate default label");
                }
                seen_default = true;
            }
            for value in &mut clause.values {
                if self.check_expr(value).is_none() {
                    continue;
                }
                match value.ty {
                    Some(ty) if self.types.is_integer(ty) => {}
                    Some(_) => {
                        self.error(&value.location, "case label must be an integer");
                        continue;
                    }
                    None => continue,
                }
                match const_int(value, self.entities, self.types) {
                    Ok(v) => {
                        if seen_values.contains(&v) {
                            self.error(
                                &value.location,
                                format!("duplicate case value {}", v),
                            );
                        } else {
                            seen_values.push(v);
                        }
                    }
                    Err((location, message)) => self.diags.error(location, message),
                }
            }
            for s in &mut clause.body {
                self.check_stmt(s);
            }
        }
    }

    fn check_return(&mut self, value: &mut Option<Expr>, location: &Location) {
        let Some(return_type) = self.return_type else {
            return;
        };
        match value {
            None => {
                if !self.types.is_void(return_type) {
                    self.error(location, "return value required");
                }
            }
            Some(expr) => {
                if self.types.is_void(return_type) {
                    self.error(location, "returning a value from a void function");
                    return;
                }
                if self.check_expr(expr).is_some() {
                    self.assign_to(return_type, expr);
                }
            }
        }
    }

    // ---- conversion helpers -----------------------------------------

    /// Wrap `slot` in an implicit cast node to `target`. No-op when the
    /// effective type already matches, which keeps re-checking an
    /// already-checked tree from stacking casts.
    fn implicit_cast(&mut self, slot: &mut Expr, target: TypeId) {
        if slot.ty == Some(target) {
            return;
        }
        let location = slot.location.clone();
        let original = slot.ty;
        let placeholder = Expr::new(
            ExprKind::IntLiteral {
                value: 0,
                unsigned: false,
                long: false,
            },
            location.clone(),
        );
        let inner = std::mem::replace(slot, placeholder);
        *slot = Expr {
            kind: ExprKind::Cast {
                type_ref: None,
                expr: Box::new(inner),
            },
            location,
            orig_type: original,
            ty: Some(target),
        };
    }

    /// Array-to-pointer and function-to-pointer decay in value contexts.
    fn decay(&mut self, slot: &mut Expr) {
        let Some(ty) = slot.ty else { return };
        match self.types.get(ty) {
            Type::Array { base, .. } => {
                let target = self.types.pointer_to(*base);
                self.implicit_cast(slot, target);
            }
            Type::Function { .. } => {
                let target = self.types.pointer_to(ty);
                self.implicit_cast(slot, target);
            }
            _ => {}
        }
    }

    /// Integer promotion: char and short become int.
    fn promote(&mut self, slot: &mut Expr) {
        let Some(ty) = slot.ty else { return };
        if let Type::Integer { kind, .. } = self.types.get(ty)
            && matches!(kind, IntKind::Char | IntKind::Short)
        {
            let target = self.types.signed_int();
            self.implicit_cast(slot, target);
        }
    }

    /// Usual arithmetic conversions over two integer operands. Both sides
    /// are promoted, then the wider kind wins and unsignedness wins a
    /// width tie.
    fn usual_arithmetic(&mut self, lhs: &mut Expr, rhs: &mut Expr) -> Option<TypeId> {
        self.promote(lhs);
        self.promote(rhs);
        let (lk, ls) = self.int_parts(lhs.ty?)?;
        let (rk, rs) = self.int_parts(rhs.ty?)?;
        let kind = if lk == IntKind::Long || rk == IntKind::Long {
            IntKind::Long
        } else {
            IntKind::Int
        };
        let signed = ls && rs;
        let target = self.types.integer(kind, signed);
        self.implicit_cast(lhs, target);
        self.implicit_cast(rhs, target);
        Some(target)
    }

    fn int_parts(&self, ty: TypeId) -> Option<(IntKind, bool)> {
        match self.types.get(ty) {
            Type::Integer { kind, signed } => Some((*kind, *signed)),
            _ => None,
        }
    }

    fn is_null_literal(expr: &Expr) -> bool {
        matches!(expr.kind, ExprKind::IntLiteral { value: 0, .. })
    }

    fn is_void_pointer(&self, ty: TypeId) -> bool {
        self.types
            .pointee(ty)
            .is_some_and(|p| self.types.is_void(p))
    }

    /// Check that `rhs` may be stored into something of type `target`,
    /// inserting the implicit conversion. Reports an error otherwise.
    fn assign_to(&mut self, target: TypeId, rhs: &mut Expr) {
        self.decay(rhs);
        let Some(rty) = rhs.ty else { return };
        if self.types.is_same(target, rty) {
            return;
        }
        if self.types.is_integer(target) && self.types.is_integer(rty) {
            self.implicit_cast(rhs, target);
            return;
        }
        if self.types.is_pointer(target) {
            if Self::is_null_literal(rhs)
                || (self.types.is_pointer(rty)
                    && (self.is_void_pointer(target) || self.is_void_pointer(rty)))
            {
                self.implicit_cast(rhs, target);
                return;
            }
        }
        let location = rhs.location.clone();
        self.error(
            &location,
            format!(
                "incompatible types: cannot convert {} to {}",
                self.types.name_of(rty),
                self.types.name_of(target)
            ),
        );
    }

    // ---- expressions ------------------------------------------------

    /// Type `expr`, fill both slots, return the effective type.
    fn check_expr(&mut self, expr: &mut Expr) -> Option<TypeId> {
        let location = expr.location.clone();
        let ty = match &mut expr.kind {
            ExprKind::IntLiteral { unsigned, long, .. } => {
                let kind = if *long { IntKind::Long } else { IntKind::Int };
                Some(self.types.integer(kind, !*unsigned))
            }
            ExprKind::CharLiteral(_) => Some(self.types.signed_char()),
            ExprKind::StringLiteral(_) => {
                let c = self.types.signed_char();
                Some(self.types.pointer_to(c))
            }
            ExprKind::VarRef { entity, .. } => {
                entity.and_then(|id| self.entities.get(id).ty)
            }
            ExprKind::Unary { op, expr: inner } => {
                let op = *op;
                self.check_unary(op, inner, &location)
            }
            ExprKind::Deref(inner) => {
                self.check_expr(inner)?;
                self.decay(inner);
                let pointee = self.types.pointee(inner.ty?)?;
                if self.types.is_void(pointee) {
                    self.error(&location, "dereferencing a void pointer");
                    None
                } else {
                    Some(pointee)
                }
            }
            ExprKind::Addr(inner) => {
                let inner_ty = self.check_expr(inner)?;
                Some(self.types.pointer_to(inner_ty))
            }
            ExprKind::SizeofExpr(inner) => {
                let inner_ty = self.check_expr(inner)?;
                if self.types.is_function(inner_ty) {
                    self.error(&location, "sizeof applied to a function");
                    None
                } else if self.types.size_of(inner_ty).is_none() {
                    self.error(&location, "sizeof applied to an incomplete type");
                    None
                } else {
                    Some(self.types.unsigned_long())
                }
            }
            ExprKind::SizeofType(type_ref) => {
                let target = type_ref.resolved?;
                if self.types.is_function(target) {
                    self.error(&location, "sizeof applied to a function");
                    None
                } else if self.types.size_of(target).is_none() {
                    self.error(&location, "sizeof applied to an incomplete type");
                    None
                } else {
                    Some(self.types.unsigned_long())
                }
            }
            ExprKind::Binary { op, lhs, rhs } => {
                let op = *op;
                self.check_binary(op, lhs, rhs, &location)
            }
            ExprKind::Assign { lhs, rhs } => {
                let target = self.check_expr(lhs);
                if self.check_expr(rhs).is_some()
                    && let Some(target) = target
                {
                    self.assign_to(target, rhs);
                }
                target
            }
            ExprKind::OpAssign { op, lhs, rhs } => {
                let op = *op;
                self.check_op_assign(op, lhs, rhs, &location)
            }
            ExprKind::Cast {
                type_ref,
                expr: inner,
            } => {
                self.check_expr(inner)?;
                let target = match type_ref {
                    Some(tr) => tr.resolved?,
                    // implicit cast inserted by an earlier run
                    None => expr.ty?,
                };
                self.decay(inner);
                let source = inner.ty?;
                let valid = self.types.is_void(target)
                    || self.types.is_same(target, source)
                    || (self.types.is_scalar(target) && self.types.is_scalar(source));
                if !valid {
                    self.error(
                        &location,
                        format!(
                            "unsupported cast from {} to {}",
                            self.types.name_of(source),
                            self.types.name_of(target)
                        ),
                    );
                    None
                } else {
                    Some(target)
                }
            }
            ExprKind::Member { expr: inner, name } => {
                let name = name.clone();
                let base = self.check_expr(inner)?;
                self.types.member(base, &name).map(|m| m.ty)
            }
            ExprKind::PtrMember { expr: inner, name } => {
                let name = name.clone();
                self.check_expr(inner)?;
                self.decay(inner);
                let pointee = self.types.pointee(inner.ty?)?;
                self.types.member(pointee, &name).map(|m| m.ty)
            }
            ExprKind::ArrayRef { expr: base, index } => {
                self.check_expr(base)?;
                self.decay(base);
                let element = self.types.base_of(base.ty?);
                if self.check_expr(index).is_some() {
                    match index.ty {
                        Some(ty) if self.types.is_integer(ty) => self.promote(index),
                        Some(_) => {
                            self.error(&index.location, "array index must be an integer")
                        }
                        None => {}
                    }
                }
                element
            }
            ExprKind::FunCall { callee, args } => self.check_call(callee, args, &location),
            ExprKind::Cond { cond, then, els } => {
                if self.check_expr(cond).is_some() {
                    self.decay(cond);
                    if let Some(ty) = cond.ty
                        && !self.types.is_scalar(ty)
                    {
                        self.error(&cond.location, "condition must have scalar type");
                    }
                }
                self.check_expr(then)?;
                self.check_expr(els)?;
                self.merge_branches(then, els, &location)
            }
            ExprKind::Comma { lhs, rhs } => {
                self.check_expr(lhs);
                self.check_expr(rhs)
            }
        };
        if let Some(ty) = ty {
            if expr.orig_type.is_none() {
                expr.orig_type = Some(ty);
            }
            expr.ty = Some(ty);
        }
        ty
    }

    fn check_unary(
        &mut self,
        op: UnaryOp,
        inner: &mut Expr,
        location: &Location,
    ) -> Option<TypeId> {
        self.check_expr(inner)?;
        match op {
            UnaryOp::Plus | UnaryOp::Minus | UnaryOp::BitNot => {
                let ty = inner.ty?;
                if !self.types.is_integer(ty) {
                    self.error(
                        location,
                        format!("invalid operand type {}", self.types.name_of(ty)),
                    );
                    return None;
                }
                self.promote(inner);
                inner.ty
            }
            UnaryOp::Not => {
                self.decay(inner);
                let ty = inner.ty?;
                if !self.types.is_scalar(ty) {
                    self.error(location, "invalid operand of !".to_string());
                    return None;
                }
                Some(self.types.signed_int())
            }
            UnaryOp::PreInc | UnaryOp::PreDec | UnaryOp::PostInc | UnaryOp::PostDec => {
                let ty = inner.ty?;
                if !self.types.is_scalar(ty) {
                    self.error(location, "invalid operand of ++/--".to_string());
                    return None;
                }
                Some(ty)
            }
        }
    }

    fn check_binary(
        &mut self,
        op: BinaryOp,
        lhs: &mut Expr,
        rhs: &mut Expr,
        location: &Location,
    ) -> Option<TypeId> {
        self.check_expr(lhs)?;
        self.check_expr(rhs)?;
        self.decay(lhs);
        self.decay(rhs);
        let lty = lhs.ty?;
        let rty = rhs.ty?;
        let both_int = self.types.is_integer(lty) && self.types.is_integer(rty);

        match op {
            BinaryOp::Mul
            | BinaryOp::Div
            | BinaryOp::Mod
            | BinaryOp::BitAnd
            | BinaryOp::BitOr
            | BinaryOp::BitXor => {
                if !both_int {
                    self.invalid_operands(op, lty, rty, location);
                    return None;
                }
                self.usual_arithmetic(lhs, rhs)
            }
            BinaryOp::Shl | BinaryOp::Shr => {
                if !both_int {
                    self.invalid_operands(op, lty, rty, location);
                    return None;
                }
                self.promote(lhs);
                self.promote(rhs);
                lhs.ty
            }
            BinaryOp::Add => {
                if both_int {
                    return self.usual_arithmetic(lhs, rhs);
                }
                if self.types.is_pointer(lty) && self.types.is_integer(rty) {
                    self.promote(rhs);
                    return Some(lty);
                }
                if self.types.is_integer(lty) && self.types.is_pointer(rty) {
                    self.promote(lhs);
                    return Some(rty);
                }
                self.invalid_operands(op, lty, rty, location);
                None
            }
            BinaryOp::Sub => {
                if both_int {
                    return self.usual_arithmetic(lhs, rhs);
                }
                if self.types.is_pointer(lty) && self.types.is_integer(rty) {
                    self.promote(rhs);
                    return Some(lty);
                }
                if self.types.is_pointer(lty) && self.types.is_pointer(rty) {
                    let lbase = self.types.pointee(lty)?;
                    let rbase = self.types.pointee(rty)?;
                    if !self.types.is_same(lbase, rbase) {
                        self.error(
                            location,
                            "subtracting pointers to different element types".to_string(),
                        );
                        return None;
                    }
                    return Some(self.types.integer(IntKind::Long, true));
                }
                self.invalid_operands(op, lty, rty, location);
                None
            }
            BinaryOp::Eq | BinaryOp::NotEq | BinaryOp::Lt | BinaryOp::LtEq | BinaryOp::Gt
            | BinaryOp::GtEq => {
                if both_int {
                    self.usual_arithmetic(lhs, rhs);
                    return Some(self.types.signed_int());
                }
                if self.types.is_pointer(lty) && Self::is_null_literal(rhs) {
                    self.implicit_cast(rhs, lty);
                    return Some(self.types.signed_int());
                }
                if self.types.is_pointer(rty) && Self::is_null_literal(lhs) {
                    self.implicit_cast(lhs, rty);
                    return Some(self.types.signed_int());
                }
                if self.types.is_pointer(lty) && self.types.is_pointer(rty) {
                    let related = self.types.is_same(lty, rty)
                        || self.is_void_pointer(lty)
                        || self.is_void_pointer(rty);
                    if !related {
                        let message = format!(
                            "comparison of distinct pointer types: {} and {}",
                            self.types.name_of(lty),
                            self.types.name_of(rty)
                        );
                        if self.strict_pointers {
                            self.error(location, message);
                            return None;
                        }
                        self.diags.warn(location.clone(), message);
                    }
                    return Some(self.types.signed_int());
                }
                self.invalid_operands(op, lty, rty, location);
                None
            }
            BinaryOp::LogicalAnd | BinaryOp::LogicalOr => {
                if !self.types.is_scalar(lty) || !self.types.is_scalar(rty) {
                    self.invalid_operands(op, lty, rty, location);
                    return None;
                }
                Some(self.types.signed_int())
            }
        }
    }

    fn check_op_assign(
        &mut self,
        op: BinaryOp,
        lhs: &mut Expr,
        rhs: &mut Expr,
        location: &Location,
    ) -> Option<TypeId> {
        let target = self.check_expr(lhs)?;
        self.check_expr(rhs)?;
        self.decay(rhs);
        let rty = rhs.ty?;
        if self.types.is_pointer(target) {
            if !matches!(op, BinaryOp::Add | BinaryOp::Sub) || !self.types.is_integer(rty) {
                self.invalid_operands(op, target, rty, location);
                return None;
            }
            self.promote(rhs);
            return Some(target);
        }
        if !self.types.is_integer(target) || !self.types.is_integer(rty) {
            self.invalid_operands(op, target, rty, location);
            return None;
        }
        self.implicit_cast(rhs, target);
        Some(target)
    }

    fn check_call(
        &mut self,
        callee: &mut Expr,
        args: &mut [Expr],
        location: &Location,
    ) -> Option<TypeId> {
        let callee_ty = self.check_expr(callee)?;
        let fn_ty = if self.types.is_function(callee_ty) {
            callee_ty
        } else {
            self.types.pointee(callee_ty)?
        };
        let (ret, params, variadic) = match self.types.get(fn_ty) {
            Type::Function {
                ret,
                params,
                variadic,
            } => (*ret, params.clone(), *variadic),
            _ => return None,
        };
        let arity_ok = if variadic {
            args.len() >= params.len()
        } else {
            args.len() == params.len()
        };
        if !arity_ok {
            self.error(
                location,
                format!(
                    "wrong number of arguments (expected {}{}, got {})",
                    params.len(),
                    if variadic { " or more" } else { "" },
                    args.len()
                ),
            );
            return Some(ret);
        }
        for (arg, &param_ty) in args.iter_mut().zip(params.iter()) {
            if self.check_expr(arg).is_some() {
                self.assign_to(param_ty, arg);
            }
        }
        // default argument promotions for the variadic tail
        for arg in args.iter_mut().skip(params.len()) {
            if self.check_expr(arg).is_some() {
                self.decay(arg);
                if arg.ty.is_some_and(|t| self.types.is_integer(t)) {
                    self.promote(arg);
                }
            }
        }
        Some(ret)
    }

    fn merge_branches(
        &mut self,
        then: &mut Expr,
        els: &mut Expr,
        location: &Location,
    ) -> Option<TypeId> {
        self.decay(then);
        self.decay(els);
        let tty = then.ty?;
        let ety = els.ty?;
        if self.types.is_integer(tty) && self.types.is_integer(ety) {
            return self.usual_arithmetic(then, els);
        }
        if self.types.is_same(tty, ety) {
            return Some(tty);
        }
        if self.types.is_pointer(tty) && Self::is_null_literal(els) {
            self.implicit_cast(els, tty);
            return Some(tty);
        }
        if self.types.is_pointer(ety) && Self::is_null_literal(then) {
            self.implicit_cast(then, ety);
            return Some(ety);
        }
        if self.types.is_pointer(tty)
            && self.types.is_pointer(ety)
            && (self.is_void_pointer(tty) || self.is_void_pointer(ety))
        {
            self.implicit_cast(els, tty);
            return Some(tty);
        }
        self.error(
            location,
            format!(
                "incompatible types in conditional branches: {} and {}",
                self.types.name_of(tty),
                self.types.name_of(ety)
            ),
        );
        None
    }

    fn invalid_operands(&mut self, op: BinaryOp, lty: TypeId, rty: TypeId, location: &Location) {
        self.error(
            location,
            format!(
                "invalid operands to {} ({} and {})",
                op.text(),
                self.types.name_of(lty),
                self.types.name_of(rty)
            ),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;
    use crate::loader::Loader;
    use crate::parser::parse_unit;
    use std::path::PathBuf;
    use std::rc::Rc;

    fn analyze(source: &str) -> (Ast, EntityTable, TypeTable, Diagnostics) {
        let mut diags = Diagnostics::new();
        let file = Rc::new(PathBuf::from("t.cb"));
        let tokens = Lexer::new(file.clone(), source).lex(&mut diags);
        let mut loader = Loader::new(Vec::new());
        let mut ast = parse_unit(&tokens, file, &mut loader, &mut diags);
        assert!(!diags.has_errors(), "parse should succeed");
        crate::jump_resolver::resolve(&ast, &mut diags);
        let (mut entities, _) = crate::local_resolver::resolve(&mut ast, &mut diags);
        let mut types = TypeTable::new();
        crate::type_resolver::resolve(&mut ast, &mut entities, &mut types, &mut diags);
        types.semantic_check(&mut diags);
        if !diags.has_errors() {
            crate::deref_checker::check(&ast, &entities, &mut types, &mut diags);
        }
        if !diags.has_errors() {
            check(&mut ast, &entities, &mut types, &mut diags, false);
        }
        (ast, entities, types, diags)
    }

    fn first_return(ast: &Ast) -> &Expr {
        let main = ast.defined_function("main").unwrap();
        let StmtKind::Block(stmts) = &main.body.kind else { panic!() };
        for s in stmts {
            if let StmtKind::Return(Some(e)) = &s.kind {
                return e;
            }
        }
        panic!("no return with value");
    }

    #[test]
    fn test_promotion_materializes_casts() {
        let (ast, _, types, diags) =
            analyze("int main(void) { char a; char b; a = 1; b = 2; return a + b; }");
        assert!(!diags.has_errors());
        let ret = first_return(&ast);
        let ExprKind::Binary { lhs, rhs, .. } = &ret.kind else { panic!() };
        // both operands were wrapped in implicit casts to int
        assert!(matches!(lhs.kind, ExprKind::Cast { type_ref: None, .. }));
        assert!(matches!(rhs.kind, ExprKind::Cast { type_ref: None, .. }));
        assert_eq!(lhs.ty, Some(types.signed_int()));
        assert_eq!(ret.ty, Some(types.signed_int()));
    }

    #[test]
    fn test_unsigned_wins_width_tie() {
        let (ast, _, types, diags) = analyze(
            "int main(void) { unsigned int u; int s; u = 1; s = 2; return (int)(u + s); }",
        );
        assert!(!diags.has_errors());
        let ret = first_return(&ast);
        let ExprKind::Cast { expr: inner, .. } = &ret.kind else { panic!() };
        assert_eq!(inner.ty, Some(types.unsigned_int()));
    }

    #[test]
    fn test_every_expression_has_both_type_slots() {
        let (ast, _, _, diags) =
            analyze("int main(void) { int a; a = 3; return a * 2 + 1; }");
        assert!(!diags.has_errors());
        let ret = first_return(&ast);
        fn walk(e: &Expr) {
            assert!(e.orig_type.is_some(), "orig_type missing");
            assert!(e.ty.is_some(), "effective type missing");
            match &e.kind {
                ExprKind::Binary { lhs, rhs, .. } => {
                    walk(lhs);
                    walk(rhs);
                }
                ExprKind::Cast { expr, .. } => walk(expr),
                _ => {}
            }
        }
        walk(ret);
    }

    #[test]
    fn test_return_value_required() {
        let (_, _, _, diags) = analyze("int main(void) { return; }");
        assert!(diags.has_errors());
        assert!(diags.iter().any(|d| d.message.contains("return value required")));
    }

    #[test]
    fn test_void_function_returning_value() {
        let (_, _, _, diags) = analyze("void f(void) { return 1; } int main(void) { return 0; }");
        assert!(diags.has_errors());
    }

    #[test]
    fn test_pointer_plus_int_keeps_pointer_type() {
        let (ast, _, types, diags) =
            analyze("int main(void) { int a[3]; a[0] = 7; return *(a + 1); }");
        assert!(!diags.has_errors());
        let ret = first_return(&ast);
        let ExprKind::Deref(inner) = &ret.kind else { panic!() };
        assert!(types.is_pointer(inner.ty.unwrap()));
    }

    #[test]
    fn test_pointer_difference_is_signed_integer() {
        let (ast, _, types, diags) = analyze(
            "int main(void) { int a[3]; int *p; int *q; p = a; q = a; return (int)(q - p); }",
        );
        assert!(!diags.has_errors());
        let ret = first_return(&ast);
        let ExprKind::Cast { expr: inner, .. } = &ret.kind else { panic!() };
        assert_eq!(inner.ty, Some(types.integer(IntKind::Long, true)));
    }

    #[test]
    fn test_null_literal_assignable_to_pointer() {
        let (_, _, _, diags) = analyze("int main(void) { int *p; p = 0; return p == 0; }");
        assert!(!diags.has_errors());
    }

    #[test]
    fn test_int_to_pointer_assignment_is_rejected() {
        let (_, _, _, diags) = analyze("int main(void) { int *p; p = 42; return 0; }");
        assert!(diags.has_errors());
    }

    #[test]
    fn test_void_pointer_compatibility() {
        let (_, _, _, diags) = analyze(
            "int main(void) { int x; void *v; int *p; v = &x; p = v; return *p; }",
        );
        assert!(!diags.has_errors());
    }

    #[test]
    fn test_call_arity_checked() {
        let (_, _, _, diags) =
            analyze("int f(int a, int b) { return a; } int main(void) { return f(1); }");
        assert!(diags.has_errors());
        assert!(diags.iter().any(|d| d.message.contains("wrong number of arguments")));
    }

    #[test]
    fn test_variadic_allows_extra_args() {
        let (_, _, _, diags) = analyze(
            "int printf(char* fmt, ...); int main(void) { printf(\"%d %d\", 1, 2); return 0; }",
        );
        assert!(!diags.has_errors());
    }

    #[test]
    fn test_argument_conversion_inserted() {
        let (ast, _, types, diags) =
            analyze("int f(long v) { return (int)v; } int main(void) { return f(3); }");
        assert!(!diags.has_errors());
        let ret = first_return(&ast);
        let ExprKind::FunCall { args, .. } = &ret.kind else { panic!() };
        assert_eq!(args[0].ty, Some(types.integer(IntKind::Long, true)));
        assert!(matches!(args[0].kind, ExprKind::Cast { type_ref: None, .. }));
    }

    #[test]
    fn test_duplicate_case_values() {
        let (_, _, _, diags) = analyze(
            "int main(void) { switch (1) { case 1: return 1; case 1: return 2; } return 0; }",
        );
        assert!(diags.has_errors());
        assert!(diags.iter().any(|d| d.message.contains("duplicate case value")));
    }

    #[test]
    fn test_switch_on_pointer_is_rejected() {
        let (_, _, _, diags) =
            analyze("int main(void) { int *p; p = 0; switch (p) { case 1: return 1; } return 0; }");
        assert!(diags.has_errors());
    }

    #[test]
    fn test_struct_assignment_of_same_type() {
        let (_, _, _, diags) = analyze(
            "struct p { int x; int y; };
             int main(void) { struct p a; struct p b; a.x = 1; a.y = 2; b = a; return b.x; }",
        );
        assert!(!diags.has_errors());
    }

    #[test]
    fn test_struct_assignment_of_different_types_is_rejected() {
        let (_, _, _, diags) = analyze(
            "struct p { int x; }; struct q { int x; };
             int main(void) { struct p a; struct q b; a.x = 1; b = a; return 0; }",
        );
        assert!(diags.has_errors());
    }

    #[test]
    fn test_global_initializer_must_be_constant() {
        let (_, _, _, diags) = analyze("int f(void) { return 1; } int g = f(); int main(void) { return g; }");
        assert!(diags.has_errors());
    }

    #[test]
    fn test_string_global_initializer() {
        let (_, _, _, diags) =
            analyze("char *greeting = \"hi\"; int main(void) { return 0; }");
        assert!(!diags.has_errors());
    }

    #[test]
    fn test_rechecking_is_idempotent() {
        let source = "int main(void) { char a; a = 1; return a + 2; }";
        let (mut ast, entities, mut types, diags) = analyze(source);
        assert!(!diags.has_errors());
        fn count_casts(e: &Expr) -> usize {
            match &e.kind {
                ExprKind::Cast { expr, .. } => 1 + count_casts(expr),
                ExprKind::Binary { lhs, rhs, .. } => count_casts(lhs) + count_casts(rhs),
                _ => 0,
            }
        }
        let before = count_casts(first_return(&ast));
        let mut diags2 = Diagnostics::new();
        check(&mut ast, &entities, &mut types, &mut diags2, false);
        assert!(!diags2.has_errors());
        let after = count_casts(first_return(&ast));
        assert_eq!(before, after);
    }
}
