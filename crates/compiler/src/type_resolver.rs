//! Type resolution
//!
//! Attaches a resolved [`TypeId`] to every type reference in the AST and
//! to every entity. Struct/union tags are declared up front so
//! self-referential pointers resolve; definitions and typedefs are then
//! processed in declaration order, and typedef chains flatten because a
//! typedef stores the already-resolved target id.
//!
//! Also enforced here: no struct/union passed or returned by value, no
//! void or function-typed variables, no zero-length arrays, prototype vs
//! definition type agreement, and constant definitions fold to a value.

use crate::ast::*;
use crate::const_eval::const_int;
use crate::entity::{EntityId, EntityTable};
use crate::error::{Diagnostics, Location};
use crate::types::{IntKind, Member, TypeId, TypeTable, TypeName};

pub fn resolve(
    ast: &mut Ast,
    entities: &mut EntityTable,
    types: &mut TypeTable,
    diags: &mut Diagnostics,
) {
    let mut resolver = TypeResolver {
        types,
        entities,
        diags,
    };
    resolver.declare_tags(ast);
    resolver.define_named_types(ast);
    resolver.resolve_declarations(ast);
    resolver.resolve_bodies(ast);
}

struct TypeResolver<'a> {
    types: &'a mut TypeTable,
    entities: &'a mut EntityTable,
    diags: &'a mut Diagnostics,
}

impl<'a> TypeResolver<'a> {
    fn declare_tags(&mut self, ast: &Ast) {
        for declaration in &ast.declarations {
            match declaration {
                Declaration::StructDef(def) => {
                    self.types.declare_composite(
                        &TypeName::Struct(def.name.clone()),
                        def.location.clone(),
                    );
                }
                Declaration::UnionDef(def) => {
                    self.types.declare_composite(
                        &TypeName::Union(def.name.clone()),
                        def.location.clone(),
                    );
                }
                _ => {}
            }
        }
    }

    fn define_named_types(&mut self, ast: &mut Ast) {
        for declaration in &mut ast.declarations {
            match declaration {
                Declaration::StructDef(def) => {
                    let name = TypeName::Struct(def.name.clone());
                    let members = self.resolve_members(def);
                    if !self.types.define_composite(&name, members, def.location.clone()) {
                        self.diags.error(
                            def.location.clone(),
                            format!("duplicate definition of {}", name),
                        );
                    }
                }
                Declaration::UnionDef(def) => {
                    let name = TypeName::Union(def.name.clone());
                    let members = self.resolve_members(def);
                    if !self.types.define_composite(&name, members, def.location.clone()) {
                        self.diags.error(
                            def.location.clone(),
                            format!("duplicate definition of {}", name),
                        );
                    }
                }
                Declaration::Typedef(def) => {
                    if let Some(target) = self.resolve_type_ref(&mut def.type_ref)
                        && !self.types.define_typedef(&def.name, target)
                    {
                        self.diags.error(
                            def.location.clone(),
                            format!("duplicate typedef {}", def.name),
                        );
                    }
                }
                _ => {}
            }
        }
    }

    fn resolve_members(&mut self, def: &mut CompositeDefNode) -> Vec<Member> {
        let mut members = Vec::with_capacity(def.members.len());
        for member in &mut def.members {
            let Some(ty) = self.resolve_type_ref(&mut member.type_ref) else {
                continue;
            };
            members.push(Member {
                name: member.name.clone(),
                ty,
                offset: 0,
                location: member.location.clone(),
            });
        }
        members
    }

    // ---- declarations -----------------------------------------------

    fn resolve_declarations(&mut self, ast: &mut Ast) {
        for declaration in &mut ast.declarations {
            match declaration {
                Declaration::DefinedFunction(f) => {
                    let fn_ty = self.resolve_function_type(
                        &mut f.return_type,
                        &mut f.params,
                        f.variadic,
                    );
                    if let (Some(entity), Some(fn_ty)) = (f.entity, fn_ty) {
                        self.set_entity_type(entity, fn_ty, &f.location);
                    }
                }
                Declaration::UndefinedFunction(f) => {
                    let fn_ty = self.resolve_function_type(
                        &mut f.return_type,
                        &mut f.params,
                        f.variadic,
                    );
                    if let (Some(entity), Some(fn_ty)) = (f.entity, fn_ty) {
                        self.set_entity_type(entity, fn_ty, &f.location);
                    }
                }
                Declaration::DefinedVariable(v) => {
                    if let Some(ty) = self.resolve_variable_type(&mut v.type_ref, &v.location, true)
                        && let Some(entity) = v.entity
                    {
                        self.set_entity_type(entity, ty, &v.location);
                    }
                }
                Declaration::UndefinedVariable(v) => {
                    if let Some(ty) =
                        self.resolve_variable_type(&mut v.type_ref, &v.location, false)
                        && let Some(entity) = v.entity
                    {
                        self.set_entity_type(entity, ty, &v.location);
                    }
                }
                Declaration::Constant(c) => self.resolve_constant(c),
                _ => {}
            }
        }
    }

    fn resolve_constant(&mut self, def: &mut ConstantDef) {
        let Some(ty) = self.resolve_type_ref(&mut def.type_ref) else {
            return;
        };
        if !self.types.is_integer(ty) {
            self.diags.error(
                def.location.clone(),
                format!("constant {} must have integer type", def.name),
            );
            return;
        }
        let Some(entity) = def.entity else { return };
        self.set_entity_type(entity, ty, &def.location);
        match const_int(&def.value, self.entities, self.types) {
            Ok(value) => self.entities.get_mut(entity).const_value = Some(value),
            Err((location, message)) => self.diags.error(location, message),
        }
    }

    fn resolve_function_type(
        &mut self,
        return_type: &mut TypeRef,
        params: &mut [Param],
        variadic: bool,
    ) -> Option<TypeId> {
        let ret = self.resolve_type_ref(return_type)?;
        if self.types.is_composite(ret) {
            self.diags.error(
                return_type.location.clone(),
                "returning a struct/union by value is not supported".to_string(),
            );
            return None;
        }
        let mut param_types = Vec::with_capacity(params.len());
        for param in params.iter_mut() {
            let ty = self.resolve_type_ref(&mut param.type_ref)?;
            let ty = self.adjust_param_type(ty, &param.location)?;
            if let Some(entity) = param.entity {
                self.set_entity_type(entity, ty, &param.location);
            }
            param_types.push(ty);
        }
        Some(self.types.function(ret, param_types, variadic))
    }

    /// Array and function parameters adjust to pointers; void and
    /// by-value composites are rejected.
    fn adjust_param_type(&mut self, ty: TypeId, location: &Location) -> Option<TypeId> {
        if self.types.is_void(ty) {
            self.diags
                .error(location.clone(), "parameter has void type".to_string());
            return None;
        }
        if self.types.is_composite(ty) {
            self.diags.error(
                location.clone(),
                "passing a struct/union by value is not supported".to_string(),
            );
            return None;
        }
        if let Some(base) = match self.types.get(ty) {
            crate::types::Type::Array { base, .. } => Some(*base),
            _ => None,
        } {
            return Some(self.types.pointer_to(base));
        }
        if self.types.is_function(ty) {
            return Some(self.types.pointer_to(ty));
        }
        Some(ty)
    }

    fn resolve_variable_type(
        &mut self,
        type_ref: &mut TypeRef,
        location: &Location,
        require_complete: bool,
    ) -> Option<TypeId> {
        let ty = self.resolve_type_ref(type_ref)?;
        if self.types.is_void(ty) {
            self.diags
                .error(location.clone(), "variable has void type".to_string());
            return None;
        }
        if self.types.is_function(ty) {
            self.diags.error(
                location.clone(),
                "variable has function type; declare a function pointer instead".to_string(),
            );
            return None;
        }
        if require_complete && self.types.size_of(ty).is_none() {
            self.diags.error(
                location.clone(),
                format!("variable has incomplete type {}", self.types.name_of(ty)),
            );
            return None;
        }
        Some(ty)
    }

    fn set_entity_type(&mut self, entity: EntityId, ty: TypeId, location: &Location) {
        match self.entities.get(entity).ty {
            Some(existing) => {
                if !self.types.is_same(existing, ty) {
                    self.diags.error(
                        location.clone(),
                        format!(
                            "conflicting declaration of {}: {} vs {}",
                            self.entities.get(entity).name,
                            self.types.name_of(existing),
                            self.types.name_of(ty)
                        ),
                    );
                }
            }
            None => self.entities.get_mut(entity).ty = Some(ty),
        }
    }

    // ---- type references --------------------------------------------

    // Re-resolution overwrites the annotation rather than trusting it:
    // table construction is deterministic, so running the chain again on
    // an already-resolved tree rebinds every reference to equal ids.
    fn resolve_type_ref(&mut self, type_ref: &mut TypeRef) -> Option<TypeId> {
        let location = type_ref.location.clone();
        let id = match &mut type_ref.kind {
            TypeRefKind::Void => self.types.void(),
            TypeRefKind::Integer { signed, kind } => {
                let kind = match kind {
                    IntSpec::Char => IntKind::Char,
                    IntSpec::Short => IntKind::Short,
                    IntSpec::Int => IntKind::Int,
                    IntSpec::Long => IntKind::Long,
                };
                self.types.integer(kind, *signed)
            }
            TypeRefKind::Named(name) => {
                match self.types.lookup(&TypeName::Plain(name.clone())) {
                    Some(id) => id,
                    None => {
                        self.diags
                            .error(location, format!("undefined type {}", name));
                        return None;
                    }
                }
            }
            TypeRefKind::Struct(tag) => self
                .types
                .declare_composite(&TypeName::Struct(tag.clone()), location),
            TypeRefKind::Union(tag) => self
                .types
                .declare_composite(&TypeName::Union(tag.clone()), location),
            TypeRefKind::Pointer(inner) => {
                let base = self.resolve_type_ref(inner)?;
                self.types.pointer_to(base)
            }
            TypeRefKind::Array(inner, length) => {
                let base = self.resolve_type_ref(inner)?;
                let length = match length {
                    Some(expr) => match const_int(expr, self.entities, self.types) {
                        Ok(n) if n > 0 => Some(n as u64),
                        Ok(0) => {
                            self.diags
                                .error(location, "zero-length array".to_string());
                            return None;
                        }
                        Ok(_) => {
                            self.diags
                                .error(location, "negative array length".to_string());
                            return None;
                        }
                        Err((loc, message)) => {
                            self.diags.error(loc, message);
                            return None;
                        }
                    },
                    None => None,
                };
                if self.types.size_of(base).is_none() {
                    self.diags.error(
                        inner.location.clone(),
                        "array element type is incomplete".to_string(),
                    );
                    return None;
                }
                self.types.array_of(base, length)
            }
            TypeRefKind::Function {
                ret,
                params,
                variadic,
            } => {
                let ret = self.resolve_type_ref(ret)?;
                if self.types.is_composite(ret) {
                    self.diags.error(
                        location,
                        "returning a struct/union by value is not supported".to_string(),
                    );
                    return None;
                }
                let variadic = *variadic;
                let mut param_types = Vec::with_capacity(params.len());
                for param in params.iter_mut() {
                    let loc = param.location.clone();
                    let ty = self.resolve_type_ref(param)?;
                    param_types.push(self.adjust_param_type(ty, &loc)?);
                }
                self.types.function(ret, param_types, variadic)
            }
        };
        type_ref.resolved = Some(id);
        Some(id)
    }

    // ---- bodies -----------------------------------------------------

    fn resolve_bodies(&mut self, ast: &mut Ast) {
        for declaration in &mut ast.declarations {
            match declaration {
                Declaration::DefinedFunction(f) => self.resolve_stmt(&mut f.body),
                Declaration::DefinedVariable(v) => {
                    if let Some(init) = &mut v.initializer {
                        self.resolve_expr(init);
                    }
                }
                Declaration::Constant(c) => self.resolve_expr(&mut c.value),
                _ => {}
            }
        }
    }

    fn resolve_local(&mut self, var: &mut VariableDef) {
        if let Some(ty) = self.resolve_variable_type(&mut var.type_ref, &var.location, true)
            && let Some(entity) = var.entity
        {
            self.set_entity_type(entity, ty, &var.location);
        }
        if let Some(init) = &mut var.initializer {
            self.resolve_expr(init);
        }
    }

    fn resolve_stmt(&mut self, stmt: &mut Stmt) {
        match &mut stmt.kind {
            StmtKind::Block(stmts) => {
                for s in stmts {
                    self.resolve_stmt(s);
                }
            }
            StmtKind::LocalVar(var) => self.resolve_local(var),
            StmtKind::Expr(expr) => self.resolve_expr(expr),
            StmtKind::If { cond, then, els } => {
                self.resolve_expr(cond);
                self.resolve_stmt(then);
                if let Some(els) = els {
                    self.resolve_stmt(els);
                }
            }
            StmtKind::While { cond, body } => {
                self.resolve_expr(cond);
                self.resolve_stmt(body);
            }
            StmtKind::DoWhile { body, cond } => {
                self.resolve_stmt(body);
                self.resolve_expr(cond);
            }
            StmtKind::For {
                init,
                cond,
                step,
                body,
            } => {
                match init {
                    Some(ForInit::Var(var)) => self.resolve_local(var),
                    Some(ForInit::Expr(expr)) => self.resolve_expr(expr),
                    None => {}
                }
                if let Some(cond) = cond {
                    self.resolve_expr(cond);
                }
                if let Some(step) = step {
                    self.resolve_expr(step);
                }
                self.resolve_stmt(body);
            }
            StmtKind::Switch { cond, clauses } => {
                self.resolve_expr(cond);
                for clause in clauses {
                    for value in &mut clause.values {
                        self.resolve_expr(value);
                    }
                    for s in &mut clause.body {
                        self.resolve_stmt(s);
                    }
                }
            }
            StmtKind::Return(Some(expr)) => self.resolve_expr(expr),
            StmtKind::Label { stmt: inner, .. } => self.resolve_stmt(inner),
            _ => {}
        }
    }

    fn resolve_expr(&mut self, expr: &mut Expr) {
        match &mut expr.kind {
            ExprKind::SizeofType(type_ref) => {
                self.resolve_type_ref(type_ref);
            }
            ExprKind::Cast {
                type_ref: Some(type_ref),
                expr: inner,
            } => {
                self.resolve_type_ref(type_ref);
                self.resolve_expr(inner);
            }
            ExprKind::Cast {
                type_ref: None,
                expr: inner,
            } => self.resolve_expr(inner),
            ExprKind::Unary { expr: inner, .. }
            | ExprKind::Deref(inner)
            | ExprKind::Addr(inner)
            | ExprKind::SizeofExpr(inner)
            | ExprKind::Member { expr: inner, .. }
            | ExprKind::PtrMember { expr: inner, .. } => self.resolve_expr(inner),
            ExprKind::Binary { lhs, rhs, .. }
            | ExprKind::Assign { lhs, rhs }
            | ExprKind::OpAssign { lhs, rhs, .. }
            | ExprKind::Comma { lhs, rhs } => {
                self.resolve_expr(lhs);
                self.resolve_expr(rhs);
            }
            ExprKind::ArrayRef { expr: base, index } => {
                self.resolve_expr(base);
                self.resolve_expr(index);
            }
            ExprKind::FunCall { callee, args } => {
                self.resolve_expr(callee);
                for arg in args {
                    self.resolve_expr(arg);
                }
            }
            ExprKind::Cond { cond, then, els } => {
                self.resolve_expr(cond);
                self.resolve_expr(then);
                self.resolve_expr(els);
            }
            _ => {}
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

    fn run(source: &str) -> (Ast, EntityTable, TypeTable, Diagnostics) {
        let mut diags = Diagnostics::new();
        let file = Rc::new(PathBuf::from("t.cb"));
        let tokens = Lexer::new(file.clone(), source).lex(&mut diags);
        let mut loader = Loader::new(Vec::new());
        let mut ast = parse_unit(&tokens, file, &mut loader, &mut diags);
        assert!(!diags.has_errors(), "parse should succeed");
        let (mut entities, _scopes) = crate::local_resolver::resolve(&mut ast, &mut diags);
        let mut types = TypeTable::new();
        resolve(&mut ast, &mut entities, &mut types, &mut diags);
        types.semantic_check(&mut diags);
        (ast, entities, types, diags)
    }

    #[test]
    fn test_function_entity_type() {
        let (ast, entities, types, diags) = run("int add(int a, int b) { return a; }");
        assert!(!diags.has_errors());
        let f = ast.defined_function("add").unwrap();
        let entity = entities.get(f.entity.unwrap());
        assert_eq!(types.name_of(entity.type_id()), "int(int, int)");
    }

    #[test]
    fn test_typedef_flattens() {
        let (ast, entities, types, diags) =
            run("typedef int myint; typedef myint myint2; myint2 x;");
        assert!(!diags.has_errors());
        let Declaration::DefinedVariable(v) = &ast.declarations[2] else {
            panic!()
        };
        let entity = entities.get(v.entity.unwrap());
        assert_eq!(entity.type_id(), types.signed_int());
    }

    #[test]
    fn test_array_length_constant_expression() {
        let (ast, entities, types, diags) = run("const int N = 4; int a[N * 2];");
        assert!(!diags.has_errors());
        let Declaration::DefinedVariable(v) = &ast.declarations[1] else {
            panic!()
        };
        let entity = entities.get(v.entity.unwrap());
        assert_eq!(types.size_of(entity.type_id()), Some(32));
    }

    #[test]
    fn test_zero_length_array_is_rejected() {
        let (_, _, _, diags) = run("int a[0];");
        assert!(diags.has_errors());
    }

    #[test]
    fn test_struct_by_value_param_is_rejected() {
        let (_, _, _, diags) =
            run("struct s { int x; }; int f(struct s v) { return 0; }");
        assert!(diags.has_errors());
    }

    #[test]
    fn test_array_param_decays_to_pointer() {
        let (ast, entities, types, diags) = run("int sum(int a[], int n) { return n; }");
        assert!(!diags.has_errors());
        let f = ast.defined_function("sum").unwrap();
        let entity = entities.get(f.params[0].entity.unwrap());
        assert!(types.is_pointer(entity.type_id()));
    }

    #[test]
    fn test_prototype_mismatch_is_rejected() {
        let (_, _, _, diags) = run("int f(int x); char f(int x) { return 'a'; }");
        assert!(diags.has_errors());
        assert!(diags.iter().any(|d| d.message.contains("conflicting declaration")));
    }

    #[test]
    fn test_incomplete_variable_is_rejected() {
        let (_, _, _, diags) = run("struct never x;");
        assert!(diags.has_errors());
    }

    #[test]
    fn test_pointer_to_undefined_tag_is_fine() {
        let (_, _, _, diags) = run("struct opaque* handle;");
        assert!(!diags.has_errors());
    }

    #[test]
    fn test_constant_folding_into_entity() {
        let (ast, entities, _, diags) = run("const int X = 3 * 7;");
        assert!(!diags.has_errors());
        let Declaration::Constant(c) = &ast.declarations[0] else { panic!() };
        assert_eq!(entities.get(c.entity.unwrap()).const_value, Some(21));
    }

    #[test]
    fn test_function_typed_variable_is_rejected() {
        let (_, _, _, diags) = run("typedef int fn(int); fn x;");
        assert!(diags.has_errors());
    }
}
