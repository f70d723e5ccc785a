//! Dereference checking
//!
//! Categorical checks that do not need the full conversion machinery:
//! `*` and `[]` apply to pointers/arrays, `.` to struct/union values,
//! `->` to pointers to struct/union, `&` to lvalues, assignment targets
//! are assignable lvalues, calls go to functions or function pointers,
//! and `++`/`--` operate on assignable scalars. Runs after type
//! resolution, before the type checker, computing a best-effort type
//! bottom-up without annotating the tree.

use crate::ast::*;
use crate::entity::{EntityKind, EntityTable};
use crate::error::Diagnostics;
use crate::types::{TypeId, TypeTable};

pub fn check(ast: &Ast, entities: &EntityTable, types: &mut TypeTable, diags: &mut Diagnostics) {
    let mut checker = DerefChecker {
        entities,
        types,
        diags,
    };
    for declaration in &ast.declarations {
        match declaration {
            Declaration::DefinedFunction(f) => checker.check_stmt(&f.body),
            Declaration::DefinedVariable(v) => {
                if let Some(init) = &v.initializer {
                    checker.check_expr(init);
                }
            }
            _ => {}
        }
    }
}

struct DerefChecker<'a> {
    entities: &'a EntityTable,
    types: &'a mut TypeTable,
    diags: &'a mut Diagnostics,
}

impl<'a> DerefChecker<'a> {
    fn check_stmt(&mut self, stmt: &Stmt) {
        match &stmt.kind {
            StmtKind::Block(stmts) => {
                for s in stmts {
                    self.check_stmt(s);
                }
            }
            StmtKind::LocalVar(var) => {
                if let Some(init) = &var.initializer {
                    self.check_expr(init);
                }
            }
            StmtKind::Expr(expr) => {
                self.check_expr(expr);
            }
            StmtKind::If { cond, then, els } => {
                self.check_expr(cond);
                self.check_stmt(then);
                if let Some(els) = els {
                    self.check_stmt(els);
                }
            }
            StmtKind::While { cond, body } => {
                self.check_expr(cond);
                self.check_stmt(body);
            }
            StmtKind::DoWhile { body, cond } => {
                self.check_stmt(body);
                self.check_expr(cond);
            }
            StmtKind::For {
                init,
                cond,
                step,
                body,
            } => {
                match init {
                    Some(ForInit::Var(var)) => {
                        if let Some(init) = &var.initializer {
                            self.check_expr(init);
                        }
                    }
                    Some(ForInit::Expr(expr)) => {
                        self.check_expr(expr);
                    }
                    None => {}
                }
                if let Some(cond) = cond {
                    self.check_expr(cond);
                }
                if let Some(step) = step {
                    self.check_expr(step);
                }
                self.check_stmt(body);
            }
            StmtKind::Switch { cond, clauses } => {
                self.check_expr(cond);
                for clause in clauses {
                    for value in &clause.values {
                        self.check_expr(value);
                    }
                    for s in &clause.body {
                        self.check_stmt(s);
                    }
                }
            }
            StmtKind::Return(Some(expr)) => {
                self.check_expr(expr);
            }
            StmtKind::Label { stmt: inner, .. } => self.check_stmt(inner),
            _ => {}
        }
    }

    /// Does this expression designate a storable location?
    fn is_lvalue(&self, expr: &Expr) -> bool {
        match &expr.kind {
            ExprKind::VarRef { entity, .. } => match entity {
                Some(id) => {
                    let kind = self.entities.get(*id).kind;
                    kind != EntityKind::Function
                }
                None => false,
            },
            ExprKind::Deref(_)
            | ExprKind::ArrayRef { .. }
            | ExprKind::Member { .. }
            | ExprKind::PtrMember { .. } => true,
            _ => false,
        }
    }

    /// Lvalue that may legally appear on the left of an assignment:
    /// not an array, not a function, not a named constant.
    fn is_assignable(&self, expr: &Expr, ty: Option<TypeId>) -> bool {
        if !self.is_lvalue(expr) {
            return false;
        }
        if let ExprKind::VarRef {
            entity: Some(id), ..
        } = &expr.kind
            && self.entities.get(*id).kind == EntityKind::Constant
        {
            return false;
        }
        match ty {
            Some(t) => !self.types.is_array(t) && !self.types.is_function(t),
            None => true,
        }
    }

    /// Arrays participate as pointers wherever a value is needed.
    fn decay(&mut self, ty: TypeId) -> TypeId {
        match self.types.base_of(ty) {
            Some(base) if self.types.is_array(ty) => self.types.pointer_to(base),
            _ => ty,
        }
    }

    fn check_expr(&mut self, expr: &Expr) -> Option<TypeId> {
        match &expr.kind {
            ExprKind::IntLiteral { unsigned, long, .. } => {
                let kind = if *long {
                    crate::types::IntKind::Long
                } else {
                    crate::types::IntKind::Int
                };
                Some(self.types.integer(kind, !*unsigned))
            }
            ExprKind::CharLiteral(_) => Some(self.types.signed_char()),
            ExprKind::StringLiteral(_) => {
                let c = self.types.signed_char();
                Some(self.types.pointer_to(c))
            }
            ExprKind::VarRef { entity, .. } => entity.and_then(|id| self.entities.get(id).ty),
            ExprKind::Unary { op, expr: inner } => {
                let ty = self.check_expr(inner);
                if matches!(
                    op,
                    UnaryOp::PreInc | UnaryOp::PreDec | UnaryOp::PostInc | UnaryOp::PostDec
                ) && !self.is_assignable(inner, ty)
                {
                    self.diags.error(
                        expr.location.clone(),
                        "cannot increment/decrement a non-lvalue".to_string(),
                    );
                }
                ty
            }
            ExprKind::Deref(inner) => {
                let ty = self.check_expr(inner)?;
                let ty = self.decay(ty);
                if !self.types.is_pointer(ty) {
                    self.diags.error(
                        expr.location.clone(),
                        "dereferencing a non-pointer value".to_string(),
                    );
                    return None;
                }
                self.types.pointee(ty)
            }
            ExprKind::ArrayRef { expr: base, index } => {
                self.check_expr(index);
                let ty = self.check_expr(base)?;
                if !self.types.is_dereferencable(ty) {
                    self.diags.error(
                        expr.location.clone(),
                        "indexing a non-pointer, non-array value".to_string(),
                    );
                    return None;
                }
                self.types.base_of(ty)
            }
            ExprKind::Member { expr: base, name } => {
                let ty = self.check_expr(base)?;
                if !self.types.is_composite(ty) {
                    self.diags.error(
                        expr.location.clone(),
                        format!(
                            "accessing member {} of a non-struct/union value",
                            name
                        ),
                    );
                    return None;
                }
                self.member_type(ty, name, expr)
            }
            ExprKind::PtrMember { expr: base, name } => {
                let ty = self.check_expr(base)?;
                let ty = self.decay(ty);
                let pointee = match self.types.pointee(ty) {
                    Some(p) if self.types.is_composite(p) => p,
                    _ => {
                        self.diags.error(
                            expr.location.clone(),
                            format!(
                                "-> applied to a value that is not a pointer to struct/union ({})",
                                self.types.name_of(ty)
                            ),
                        );
                        return None;
                    }
                };
                self.member_type(pointee, name, expr)
            }
            ExprKind::Addr(inner) => {
                let ty = self.check_expr(inner)?;
                let is_function_designator = self.types.is_function(ty);
                if !self.is_lvalue(inner) && !is_function_designator {
                    self.diags.error(
                        expr.location.clone(),
                        "cannot take the address of an rvalue".to_string(),
                    );
                    return None;
                }
                Some(self.types.pointer_to(ty))
            }
            ExprKind::Assign { lhs, rhs } | ExprKind::OpAssign { lhs, rhs, .. } => {
                let lhs_ty = self.check_expr(lhs);
                self.check_expr(rhs);
                if !self.is_assignable(lhs, lhs_ty) {
                    self.diags.error(
                        lhs.location.clone(),
                        "invalid lvalue on the left of assignment".to_string(),
                    );
                }
                lhs_ty
            }
            ExprKind::FunCall { callee, args } => {
                for arg in args {
                    self.check_expr(arg);
                }
                let ty = self.check_expr(callee)?;
                let callable = self.types.is_function(ty)
                    || self
                        .types
                        .pointee(ty)
                        .is_some_and(|p| self.types.is_function(p));
                if !callable {
                    self.diags.error(
                        expr.location.clone(),
                        "calling a value that is not a function".to_string(),
                    );
                    return None;
                }
                self.types.return_type(ty)
            }
            ExprKind::Cast { type_ref, expr: inner } => {
                self.check_expr(inner);
                match type_ref {
                    Some(tr) => tr.resolved,
                    None => None,
                }
            }
            ExprKind::SizeofExpr(inner) => {
                self.check_expr(inner);
                Some(self.types.unsigned_long())
            }
            ExprKind::SizeofType(_) => Some(self.types.unsigned_long()),
            ExprKind::Binary { lhs, rhs, .. } => {
                let lhs_ty = self.check_expr(lhs);
                let rhs_ty = self.check_expr(rhs);
                // best effort: a pointer operand wins, else the left type
                match (lhs_ty, rhs_ty) {
                    (Some(l), _) if self.types.is_dereferencable(l) => Some(self.decay(l)),
                    (_, Some(r)) if self.types.is_dereferencable(r) => Some(self.decay(r)),
                    (l, _) => l,
                }
            }
            ExprKind::Cond { cond, then, els } => {
                self.check_expr(cond);
                let then_ty = self.check_expr(then);
                self.check_expr(els);
                then_ty
            }
            ExprKind::Comma { lhs, rhs } => {
                self.check_expr(lhs);
                self.check_expr(rhs)
            }
        }
    }

    fn member_type(&mut self, composite: TypeId, name: &str, expr: &Expr) -> Option<TypeId> {
        match self.types.member(composite, name) {
            Some(member) => Some(member.ty),
            None => {
                self.diags.error(
                    expr.location.clone(),
                    format!(
                        "no member named {} in {}",
                        name,
                        self.types.name_of(composite)
                    ),
                );
                None
            }
        }
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

    fn run(source: &str) -> Diagnostics {
        let mut diags = Diagnostics::new();
        let file = Rc::new(PathBuf::from("t.cb"));
        let tokens = Lexer::new(file.clone(), source).lex(&mut diags);
        let mut loader = Loader::new(Vec::new());
        let mut ast = parse_unit(&tokens, file, &mut loader, &mut diags);
        assert!(!diags.has_errors(), "parse should succeed");
        let (mut entities, _) = crate::local_resolver::resolve(&mut ast, &mut diags);
        let mut types = TypeTable::new();
        crate::type_resolver::resolve(&mut ast, &mut entities, &mut types, &mut diags);
        types.semantic_check(&mut diags);
        if !diags.has_errors() {
            check(&ast, &entities, &mut types, &mut diags);
        }
        diags
    }

    #[test]
    fn test_valid_pointer_usage() {
        let diags = run(
            "int main(void) { int x; int *p; p = &x; *p = 3; return p[0]; }",
        );
        assert!(!diags.has_errors());
    }

    #[test]
    fn test_deref_of_int_is_rejected() {
        let diags = run("int main(void) { int x; return *x; }");
        assert!(diags.has_errors());
    }

    #[test]
    fn test_index_of_scalar_is_rejected() {
        let diags = run("int main(void) { int x; return x[0]; }");
        assert!(diags.has_errors());
    }

    #[test]
    fn test_member_of_scalar_is_rejected() {
        let diags = run("int main(void) { int x; return x.y; }");
        assert!(diags.has_errors());
    }

    #[test]
    fn test_arrow_needs_pointer_to_composite() {
        let diags = run(
            "struct p { int x; }; int main(void) { struct p v; v.x = 1; return v->x; }",
        );
        assert!(diags.has_errors());
    }

    #[test]
    fn test_missing_member() {
        let diags = run("struct p { int x; }; int main(void) { struct p v; return v.z; }");
        assert!(diags.has_errors());
        assert!(diags.iter().any(|d| d.message.contains("no member named z")));
    }

    #[test]
    fn test_address_of_rvalue_is_rejected() {
        let diags = run("int main(void) { int *p; p = &3; return 0; }");
        assert!(diags.has_errors());
    }

    #[test]
    fn test_address_of_function_is_allowed() {
        let diags = run(
            "int f(void) { return 1; } int main(void) { int (*fp)(void); fp = &f; return fp(); }",
        );
        assert!(!diags.has_errors());
    }

    #[test]
    fn test_assign_to_rvalue_is_rejected() {
        let diags = run("int main(void) { int x; x + 1 = 2; return 0; }");
        assert!(diags.has_errors());
    }

    #[test]
    fn test_assign_to_array_is_rejected() {
        let diags = run("int main(void) { int a[3]; int b[3]; a = b; return 0; }");
        assert!(diags.has_errors());
    }

    #[test]
    fn test_assign_to_constant_is_rejected() {
        let diags = run("const int K = 1; int main(void) { K = 2; return 0; }");
        assert!(diags.has_errors());
    }

    #[test]
    fn test_calling_non_function_is_rejected() {
        let diags = run("int main(void) { int x; return x(); }");
        assert!(diags.has_errors());
    }

    #[test]
    fn test_increment_of_rvalue_is_rejected() {
        let diags = run("int main(void) { int x; return (x + 1)++; }");
        assert!(diags.has_errors());
    }

    #[test]
    fn test_member_through_pointer_chain() {
        let diags = run(
            "struct node { int value; struct node* next; };
             int main(void) { struct node n; struct node* p; p = &n; p->next = p; return p->next->value; }",
        );
        assert!(!diags.has_errors());
    }
}
