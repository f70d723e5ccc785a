//! Local reference resolution
//!
//! Builds the scope tree and binds every identifier use to its
//! declaration. A fresh child scope is introduced per function parameter
//! list, per block, per for-statement init and per switch clause.
//! Duplicate names in one scope are rejected; shadowing across scopes is
//! allowed. At top level, prototypes and definitions of the same name
//! merge into one entity; a second definition is an error.

use crate::ast::*;
use crate::entity::{EntityId, EntityKind, EntityTable, ScopeId, ScopeTree, TOP_SCOPE};
use crate::error::Diagnostics;

pub fn resolve(ast: &mut Ast, diags: &mut Diagnostics) -> (EntityTable, ScopeTree) {
    let mut resolver = LocalResolver {
        entities: EntityTable::new(),
        scopes: ScopeTree::new(),
        diags,
    };
    resolver.declare_toplevel(ast);
    resolver.resolve_bodies(ast);
    (resolver.entities, resolver.scopes)
}

struct LocalResolver<'a> {
    entities: EntityTable,
    scopes: ScopeTree,
    diags: &'a mut Diagnostics,
}

impl<'a> LocalResolver<'a> {
    // ---- top level --------------------------------------------------

    fn declare_toplevel(&mut self, ast: &mut Ast) {
        for declaration in &mut ast.declarations {
            match declaration {
                Declaration::DefinedFunction(f) => {
                    f.entity =
                        self.declare_top(&f.name, EntityKind::Function, f.storage, true, &f.location);
                }
                Declaration::UndefinedFunction(f) => {
                    f.entity =
                        self.declare_top(&f.name, EntityKind::Function, f.storage, false, &f.location);
                }
                Declaration::DefinedVariable(v) => {
                    v.entity =
                        self.declare_top(&v.name, EntityKind::Variable, v.storage, true, &v.location);
                }
                Declaration::UndefinedVariable(v) => {
                    v.entity = self.declare_top(
                        &v.name,
                        EntityKind::Variable,
                        Storage::Extern,
                        false,
                        &v.location,
                    );
                }
                Declaration::Constant(c) => {
                    c.entity =
                        self.declare_top(&c.name, EntityKind::Constant, Storage::Auto, true, &c.location);
                }
                Declaration::Typedef(_)
                | Declaration::StructDef(_)
                | Declaration::UnionDef(_) => {}
            }
        }
    }

    /// Create or merge a top-level entity.
    fn declare_top(
        &mut self,
        name: &str,
        kind: EntityKind,
        storage: Storage,
        defined: bool,
        location: &crate::error::Location,
    ) -> Option<EntityId> {
        if let Some(existing) = self.scopes.lookup_local(TOP_SCOPE, name) {
            let entity = self.entities.get(existing);
            if entity.kind != kind {
                self.diags.error(
                    location.clone(),
                    format!("{} redeclared as a different kind of symbol", name),
                );
                return None;
            }
            if entity.defined && defined {
                self.diags.error(
                    location.clone(),
                    format!("duplicate definition of {}", name),
                );
                return None;
            }
            let entity = self.entities.get_mut(existing);
            if defined {
                entity.defined = true;
                entity.location = location.clone();
                // a definition decides the linkage
                entity.storage = storage;
            }
            return Some(existing);
        }
        let id = self.entities.add(name, kind, storage, defined, location.clone());
        // insertion into an empty slot cannot fail
        let _ = self.scopes.define(TOP_SCOPE, name, id);
        Some(id)
    }

    // ---- function bodies --------------------------------------------

    fn resolve_bodies(&mut self, ast: &mut Ast) {
        for declaration in &mut ast.declarations {
            match declaration {
                Declaration::DefinedFunction(f) => {
                    let param_scope = self.scopes.push_child(TOP_SCOPE);
                    for param in &mut f.params {
                        let Some(name) = param.name.clone() else {
                            self.diags.error(
                                param.location.clone(),
                                "parameter of a defined function needs a name".to_string(),
                            );
                            continue;
                        };
                        let id = self.entities.add(
                            &name,
                            EntityKind::Param,
                            Storage::Auto,
                            true,
                            param.location.clone(),
                        );
                        param.entity = Some(id);
                        if let Err(previous) = self.scopes.define(param_scope, &name, id) {
                            let previous = self.entities.get(previous).location.clone();
                            self.diags.error(
                                param.location.clone(),
                                format!(
                                    "duplicate parameter {} (first declared at {})",
                                    name, previous
                                ),
                            );
                        }
                    }
                    self.resolve_stmt(&mut f.body, param_scope);
                }
                Declaration::DefinedVariable(v) => {
                    if let Some(init) = &mut v.initializer {
                        self.resolve_expr(init, TOP_SCOPE);
                    }
                }
                Declaration::Constant(c) => {
                    self.resolve_expr(&mut c.value, TOP_SCOPE);
                }
                _ => {}
            }
        }
    }

    fn declare_local(&mut self, var: &mut VariableDef, scope: ScopeId) {
        if var.storage != Storage::Auto {
            self.diags.error(
                var.location.clone(),
                format!("storage class is not allowed on local variable {}", var.name),
            );
        }
        let id = self.entities.add(
            &var.name,
            EntityKind::Variable,
            Storage::Auto,
            true,
            var.location.clone(),
        );
        var.entity = Some(id);
        if let Err(previous) = self.scopes.define(scope, &var.name, id) {
            let previous = self.entities.get(previous).location.clone();
            self.diags.error(
                var.location.clone(),
                format!(
                    "duplicate declaration of {} (first declared at {})",
                    var.name, previous
                ),
            );
        }
        if let Some(init) = &mut var.initializer {
            self.resolve_expr(init, scope);
        }
    }

    fn resolve_stmt(&mut self, stmt: &mut Stmt, scope: ScopeId) {
        match &mut stmt.kind {
            StmtKind::Block(stmts) => {
                let block_scope = self.scopes.push_child(scope);
                for s in stmts {
                    self.resolve_stmt(s, block_scope);
                }
            }
            StmtKind::LocalVar(var) => self.declare_local(var, scope),
            StmtKind::Expr(expr) => self.resolve_expr(expr, scope),
            StmtKind::If { cond, then, els } => {
                self.resolve_expr(cond, scope);
                self.resolve_stmt(then, scope);
                if let Some(els) = els {
                    self.resolve_stmt(els, scope);
                }
            }
            StmtKind::While { cond, body } => {
                self.resolve_expr(cond, scope);
                self.resolve_stmt(body, scope);
            }
            StmtKind::DoWhile { body, cond } => {
                self.resolve_stmt(body, scope);
                self.resolve_expr(cond, scope);
            }
            StmtKind::For {
                init,
                cond,
                step,
                body,
            } => {
                let for_scope = self.scopes.push_child(scope);
                match init {
                    Some(ForInit::Var(var)) => self.declare_local(var, for_scope),
                    Some(ForInit::Expr(expr)) => self.resolve_expr(expr, for_scope),
                    None => {}
                }
                if let Some(cond) = cond {
                    self.resolve_expr(cond, for_scope);
                }
                if let Some(step) = step {
                    self.resolve_expr(step, for_scope);
                }
                self.resolve_stmt(body, for_scope);
            }
            StmtKind::Switch { cond, clauses } => {
                self.resolve_expr(cond, scope);
                for clause in clauses {
                    let clause_scope = self.scopes.push_child(scope);
                    for value in &mut clause.values {
                        self.resolve_expr(value, clause_scope);
                    }
                    for s in &mut clause.body {
                        self.resolve_stmt(s, clause_scope);
                    }
                }
            }
            StmtKind::Return(value) => {
                if let Some(value) = value {
                    self.resolve_expr(value, scope);
                }
            }
            StmtKind::Label { stmt: inner, .. } => self.resolve_stmt(inner, scope),
            StmtKind::Empty
            | StmtKind::Break
            | StmtKind::Continue
            | StmtKind::Goto(_) => {}
        }
    }

    fn resolve_expr(&mut self, expr: &mut Expr, scope: ScopeId) {
        match &mut expr.kind {
            ExprKind::VarRef { name, entity } => match self.scopes.lookup(scope, name) {
                Some(id) => *entity = Some(id),
                None => self.diags.error(
                    expr.location.clone(),
                    format!("undefined reference to {}", name),
                ),
            },
            ExprKind::Unary { expr: inner, .. }
            | ExprKind::Deref(inner)
            | ExprKind::Addr(inner)
            | ExprKind::SizeofExpr(inner)
            | ExprKind::Cast { expr: inner, .. }
            | ExprKind::Member { expr: inner, .. }
            | ExprKind::PtrMember { expr: inner, .. } => self.resolve_expr(inner, scope),
            ExprKind::Binary { lhs, rhs, .. }
            | ExprKind::Assign { lhs, rhs }
            | ExprKind::OpAssign { lhs, rhs, .. }
            | ExprKind::Comma { lhs, rhs } => {
                self.resolve_expr(lhs, scope);
                self.resolve_expr(rhs, scope);
            }
            ExprKind::ArrayRef { expr: base, index } => {
                self.resolve_expr(base, scope);
                self.resolve_expr(index, scope);
            }
            ExprKind::FunCall { callee, args } => {
                self.resolve_expr(callee, scope);
                for arg in args {
                    self.resolve_expr(arg, scope);
                }
            }
            ExprKind::Cond { cond, then, els } => {
                self.resolve_expr(cond, scope);
                self.resolve_expr(then, scope);
                self.resolve_expr(els, scope);
            }
            ExprKind::IntLiteral { .. }
            | ExprKind::CharLiteral(_)
            | ExprKind::StringLiteral(_)
            | ExprKind::SizeofType(_) => {}
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

    fn run(source: &str) -> (Ast, EntityTable, ScopeTree, Diagnostics) {
        let mut diags = Diagnostics::new();
        let file = Rc::new(PathBuf::from("t.cb"));
        let tokens = Lexer::new(file.clone(), source).lex(&mut diags);
        let mut loader = Loader::new(Vec::new());
        let mut ast = parse_unit(&tokens, file, &mut loader, &mut diags);
        assert!(!diags.has_errors(), "parse should succeed");
        let (entities, scopes) = resolve(&mut ast, &mut diags);
        (ast, entities, scopes, diags)
    }

    #[test]
    fn test_var_ref_binds_to_local() {
        let (ast, entities, _, diags) = run("int main(void) { int x; x = 1; return x; }");
        assert!(!diags.has_errors());
        let main = ast.defined_function("main").unwrap();
        let StmtKind::Block(stmts) = &main.body.kind else { panic!() };
        let StmtKind::LocalVar(var) = &stmts[0].kind else { panic!() };
        let StmtKind::Return(Some(ret)) = &stmts[2].kind else { panic!() };
        let ExprKind::VarRef { entity, .. } = &ret.kind else { panic!() };
        assert_eq!(*entity, var.entity);
        assert_eq!(entities.get(entity.unwrap()).name, "x");
    }

    #[test]
    fn test_undefined_reference() {
        let (_, _, _, diags) = run("int main(void) { return y; }");
        assert!(diags.has_errors());
        assert!(diags.iter().any(|d| d.message.contains("undefined reference to y")));
    }

    #[test]
    fn test_duplicate_in_same_scope() {
        let (_, _, _, diags) = run("int main(void) { int x; int x; return 0; }");
        assert!(diags.has_errors());
    }

    #[test]
    fn test_shadowing_is_allowed() {
        let (_, _, _, diags) =
            run("int main(void) { int x; x = 1; { int x; x = 2; } return x; }");
        assert!(!diags.has_errors());
    }

    #[test]
    fn test_param_binding() {
        let (ast, _, _, diags) = run("int id(int n) { return n; }");
        assert!(!diags.has_errors());
        let f = ast.defined_function("id").unwrap();
        assert!(f.params[0].entity.is_some());
    }

    #[test]
    fn test_prototype_then_definition_merge() {
        let (ast, entities, _, diags) =
            run("int f(int x); int f(int x) { return x; } int main(void) { return f(1); }");
        assert!(!diags.has_errors());
        // prototype and definition share one entity
        let (proto, def) = match (&ast.declarations[0], &ast.declarations[1]) {
            (Declaration::UndefinedFunction(p), Declaration::DefinedFunction(d)) => {
                (p.entity, d.entity)
            }
            _ => panic!("unexpected declaration shapes"),
        };
        assert_eq!(proto, def);
        assert!(entities.get(def.unwrap()).defined);
    }

    #[test]
    fn test_duplicate_definition_is_rejected() {
        let (_, _, _, diags) = run("int f(void) { return 1; } int f(void) { return 2; }");
        assert!(diags.has_errors());
    }

    #[test]
    fn test_static_local_is_rejected() {
        let (_, _, _, diags) = run("int main(void) { static int x; return 0; }");
        assert!(diags.has_errors());
    }

    #[test]
    fn test_for_init_scope() {
        // i is confined to the for statement
        let (_, _, _, diags) =
            run("int main(void) { for (int i = 0; i < 3; ++i) ; return i; }");
        assert!(diags.has_errors());
    }
}
