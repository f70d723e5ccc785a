//! Dump formats for the driver's inspection modes
//!
//! - `dump_tokens`: one token per line with position, kind and text.
//! - `pretty`: canonical source form of an AST. Reparsing the output
//!   yields a structurally equal tree (up to positions), which is what
//!   `--dump-ast` prints and what the round-trip tests rely on.
//! - `tree`: indented node tree with optional entity bindings
//!   (`--dump-reference`) and resolved types (`--dump-semantic`);
//!   `--dump-stmt` prints the first statement of `main` in this form.

use crate::ast::*;
use crate::entity::EntityTable;
use crate::lexer::{Token, TokenValue};
use crate::types::TypeTable;
use std::fmt::Write as _;

pub fn dump_tokens(tokens: &[Token]) -> String {
    let mut out = String::new();
    for token in tokens {
        let text = match &token.value {
            TokenValue::Str(bytes) => format!("\"{}\"", String::from_utf8_lossy(bytes)),
            TokenValue::Char(c) => format!("'{}'", escape_char(*c)),
            _ => token.text.clone(),
        };
        let _ = writeln!(out, "{} {:?} {}", token.location, token.kind, text);
    }
    out
}

// ---- canonical source form ------------------------------------------

pub fn pretty(ast: &Ast) -> String {
    let mut printer = Printer {
        out: String::new(),
        indent: 0,
    };
    for declaration in &ast.declarations {
        printer.declaration(declaration);
    }
    printer.out
}

struct Printer {
    out: String,
    indent: usize,
}

impl Printer {
    fn write_indent(&mut self) {
        for _ in 0..self.indent {
            self.out.push_str("    ");
        }
    }

    fn declaration(&mut self, declaration: &Declaration) {
        match declaration {
            Declaration::DefinedFunction(f) => {
                self.write_indent();
                let header = function_header(f.storage, &f.return_type, &f.name, &f.params, f.variadic);
                let _ = write!(self.out, "{} ", header);
                self.stmt_inline(&f.body);
                self.out.push('\n');
            }
            Declaration::UndefinedFunction(f) => {
                self.write_indent();
                let header = function_header(f.storage, &f.return_type, &f.name, &f.params, f.variadic);
                let _ = writeln!(self.out, "{};", header);
            }
            Declaration::DefinedVariable(v) => {
                self.write_indent();
                let storage = storage_prefix(v.storage);
                match &v.initializer {
                    Some(init) => {
                        let _ = writeln!(
                            self.out,
                            "{}{} = {};",
                            storage,
                            declare(&v.type_ref, &v.name),
                            expr_text(init)
                        );
                    }
                    None => {
                        let _ = writeln!(self.out, "{}{};", storage, declare(&v.type_ref, &v.name));
                    }
                }
            }
            Declaration::UndefinedVariable(v) => {
                self.write_indent();
                let _ = writeln!(self.out, "extern {};", declare(&v.type_ref, &v.name));
            }
            Declaration::Constant(c) => {
                self.write_indent();
                let _ = writeln!(
                    self.out,
                    "const {} = {};",
                    declare(&c.type_ref, &c.name),
                    expr_text(&c.value)
                );
            }
            Declaration::Typedef(t) => {
                self.write_indent();
                let _ = writeln!(self.out, "typedef {};", declare(&t.type_ref, &t.name));
            }
            Declaration::StructDef(def) => self.composite("struct", def),
            Declaration::UnionDef(def) => self.composite("union", def),
        }
    }

    fn composite(&mut self, keyword: &str, def: &CompositeDefNode) {
        self.write_indent();
        let _ = writeln!(self.out, "{} {} {{", keyword, def.name);
        self.indent += 1;
        for member in &def.members {
            self.write_indent();
            let _ = writeln!(self.out, "{};", declare(&member.type_ref, &member.name));
        }
        self.indent -= 1;
        self.write_indent();
        self.out.push_str("};\n");
    }

    /// Print a statement starting at the current position (no leading
    /// indent), used after `if (...)` headers and function signatures.
    fn stmt_inline(&mut self, stmt: &Stmt) {
        match &stmt.kind {
            StmtKind::Block(stmts) => {
                self.out.push_str("{\n");
                self.indent += 1;
                for s in stmts {
                    self.stmt(s);
                }
                self.indent -= 1;
                self.write_indent();
                self.out.push('}');
            }
            _ => {
                self.out.push_str("{\n");
                self.indent += 1;
                self.stmt(stmt);
                self.indent -= 1;
                self.write_indent();
                self.out.push('}');
            }
        }
    }

    fn stmt(&mut self, stmt: &Stmt) {
        self.write_indent();
        match &stmt.kind {
            StmtKind::Empty => self.out.push_str(";\n"),
            StmtKind::Expr(expr) => {
                let _ = writeln!(self.out, "{};", expr_text(expr));
            }
            StmtKind::Block(_) => {
                self.stmt_inline(stmt);
                self.out.push('\n');
            }
            StmtKind::LocalVar(var) => {
                let storage = storage_prefix(var.storage);
                match &var.initializer {
                    Some(init) => {
                        let _ = writeln!(
                            self.out,
                            "{}{} = {};",
                            storage,
                            declare(&var.type_ref, &var.name),
                            expr_text(init)
                        );
                    }
                    None => {
                        let _ =
                            writeln!(self.out, "{}{};", storage, declare(&var.type_ref, &var.name));
                    }
                }
            }
            StmtKind::If { cond, then, els } => {
                let _ = write!(self.out, "if ({}) ", expr_text(cond));
                self.stmt_inline(then);
                if let Some(els) = els {
                    self.out.push_str(" else ");
                    self.stmt_inline(els);
                }
                self.out.push('\n');
            }
            StmtKind::While { cond, body } => {
                let _ = write!(self.out, "while ({}) ", expr_text(cond));
                self.stmt_inline(body);
                self.out.push('\n');
            }
            StmtKind::DoWhile { body, cond } => {
                self.out.push_str("do ");
                self.stmt_inline(body);
                let _ = writeln!(self.out, " while ({});", expr_text(cond));
            }
            StmtKind::For {
                init,
                cond,
                step,
                body,
            } => {
                self.out.push_str("for (");
                match init {
                    Some(ForInit::Var(var)) => {
                        let _ = write!(self.out, "{}", declare(&var.type_ref, &var.name));
                        if let Some(i) = &var.initializer {
                            let _ = write!(self.out, " = {}", expr_text(i));
                        }
                    }
                    Some(ForInit::Expr(expr)) => {
                        let _ = write!(self.out, "{}", expr_text(expr));
                    }
                    None => {}
                }
                self.out.push_str("; ");
                if let Some(cond) = cond {
                    let _ = write!(self.out, "{}", expr_text(cond));
                }
                self.out.push_str("; ");
                if let Some(step) = step {
                    let _ = write!(self.out, "{}", expr_text(step));
                }
                self.out.push_str(") ");
                self.stmt_inline(body);
                self.out.push('\n');
            }
            StmtKind::Switch { cond, clauses } => {
                let _ = writeln!(self.out, "switch ({}) {{", expr_text(cond));
                for clause in clauses {
                    for value in &clause.values {
                        self.write_indent();
                        let _ = writeln!(self.out, "case {}:", expr_text(value));
                    }
                    if clause.is_default {
                        self.write_indent();
                        self.out.push_str("default:\n");
                    }
                    self.indent += 1;
                    for s in &clause.body {
                        self.stmt(s);
                    }
                    self.indent -= 1;
                }
                self.write_indent();
                self.out.push_str("}\n");
            }
            StmtKind::Return(None) => self.out.push_str("return;\n"),
            StmtKind::Return(Some(expr)) => {
                let _ = writeln!(self.out, "return {};", expr_text(expr));
            }
            StmtKind::Break => self.out.push_str("break;\n"),
            StmtKind::Continue => self.out.push_str("continue;\n"),
            StmtKind::Label { name, stmt: inner } => {
                let _ = writeln!(self.out, "{}:", name);
                self.stmt(inner);
            }
            StmtKind::Goto(name) => {
                let _ = writeln!(self.out, "goto {};", name);
            }
        }
    }
}

fn storage_prefix(storage: Storage) -> &'static str {
    match storage {
        Storage::Static => "static ",
        Storage::Extern => "extern ",
        Storage::Auto => "",
    }
}

fn function_header(
    storage: Storage,
    return_type: &TypeRef,
    name: &str,
    params: &[Param],
    variadic: bool,
) -> String {
    let mut param_texts: Vec<String> = params
        .iter()
        .map(|p| declare(&p.type_ref, p.name.as_deref().unwrap_or("")))
        .collect();
    if variadic {
        param_texts.push("...".to_string());
    }
    let args = if param_texts.is_empty() {
        "void".to_string()
    } else {
        param_texts.join(", ")
    };
    format!(
        "{}{}",
        storage_prefix(storage),
        declare(return_type, &format!("{}({})", name, args))
    )
}

/// C declarator printing: wrap `inner` according to the type, inside
/// out. The classic rule: suffix forms (array, function) bind tighter
/// than the pointer prefix, so a pointer inner gets parenthesized when
/// a suffix is applied to it.
fn declare(type_ref: &TypeRef, inner: &str) -> String {
    match &type_ref.kind {
        TypeRefKind::Void => join_base("void", inner),
        TypeRefKind::Integer { signed, kind } => {
            let base = match kind {
                IntSpec::Char => "char",
                IntSpec::Short => "short",
                IntSpec::Int => "int",
                IntSpec::Long => "long",
            };
            if *signed {
                join_base(base, inner)
            } else {
                join_base(&format!("unsigned {}", base), inner)
            }
        }
        TypeRefKind::Named(name) => join_base(name, inner),
        TypeRefKind::Struct(tag) => join_base(&format!("struct {}", tag), inner),
        TypeRefKind::Union(tag) => join_base(&format!("union {}", tag), inner),
        TypeRefKind::Pointer(base) => declare(base, &format!("*{}", inner)),
        TypeRefKind::Array(base, length) => {
            let wrapped = parenthesize_pointer(inner);
            match length {
                Some(expr) => declare(base, &format!("{}[{}]", wrapped, expr_text(expr))),
                None => declare(base, &format!("{}[]", wrapped)),
            }
        }
        TypeRefKind::Function {
            ret,
            params,
            variadic,
        } => {
            let wrapped = parenthesize_pointer(inner);
            let mut param_texts: Vec<String> =
                params.iter().map(|p| declare(p, "")).collect();
            if *variadic {
                param_texts.push("...".to_string());
            }
            let args = if param_texts.is_empty() {
                "void".to_string()
            } else {
                param_texts.join(", ")
            };
            declare(ret, &format!("{}({})", wrapped, args))
        }
    }
}

fn join_base(base: &str, inner: &str) -> String {
    if inner.is_empty() {
        base.to_string()
    } else {
        format!("{} {}", base, inner)
    }
}

fn parenthesize_pointer(inner: &str) -> String {
    if inner.starts_with('*') {
        format!("({})", inner)
    } else {
        inner.to_string()
    }
}

/// Fully parenthesized expression text; reparsing preserves structure.
fn expr_text(expr: &Expr) -> String {
    match &expr.kind {
        ExprKind::IntLiteral {
            value,
            unsigned,
            long,
        } => {
            let mut text = value.to_string();
            if *unsigned {
                text.push('U');
            }
            if *long {
                text.push('L');
            }
            text
        }
        ExprKind::CharLiteral(c) => format!("'{}'", escape_char(*c)),
        ExprKind::StringLiteral(bytes) => format!("\"{}\"", escape_bytes(bytes)),
        ExprKind::VarRef { name, .. } => name.clone(),
        ExprKind::Unary { op, expr: inner } => match op {
            UnaryOp::Plus => format!("(+{})", expr_text(inner)),
            UnaryOp::Minus => format!("(-{})", expr_text(inner)),
            UnaryOp::Not => format!("(!{})", expr_text(inner)),
            UnaryOp::BitNot => format!("(~{})", expr_text(inner)),
            UnaryOp::PreInc => format!("(++{})", expr_text(inner)),
            UnaryOp::PreDec => format!("(--{})", expr_text(inner)),
            UnaryOp::PostInc => format!("({}++)", expr_text(inner)),
            UnaryOp::PostDec => format!("({}--)", expr_text(inner)),
        },
        ExprKind::Deref(inner) => format!("(*{})", expr_text(inner)),
        ExprKind::Addr(inner) => format!("(&{})", expr_text(inner)),
        ExprKind::SizeofExpr(inner) => format!("(sizeof {})", expr_text(inner)),
        ExprKind::SizeofType(type_ref) => format!("sizeof({})", declare(type_ref, "")),
        ExprKind::Binary { op, lhs, rhs } => {
            format!("({} {} {})", expr_text(lhs), op.text(), expr_text(rhs))
        }
        ExprKind::Assign { lhs, rhs } => format!("({} = {})", expr_text(lhs), expr_text(rhs)),
        ExprKind::OpAssign { op, lhs, rhs } => {
            format!("({} {}= {})", expr_text(lhs), op.text(), expr_text(rhs))
        }
        ExprKind::Cast {
            type_ref: Some(tr),
            expr: inner,
        } => format!("(({}){})", declare(tr, ""), expr_text(inner)),
        // implicit casts have no source form; print the converted child
        ExprKind::Cast {
            type_ref: None,
            expr: inner,
        } => expr_text(inner),
        ExprKind::Member { expr: inner, name } => format!("{}.{}", expr_text(inner), name),
        ExprKind::PtrMember { expr: inner, name } => format!("{}->{}", expr_text(inner), name),
        ExprKind::ArrayRef { expr: inner, index } => {
            format!("{}[{}]", expr_text(inner), expr_text(index))
        }
        ExprKind::FunCall { callee, args } => {
            let args: Vec<String> = args.iter().map(expr_text).collect();
            format!("{}({})", expr_text(callee), args.join(", "))
        }
        ExprKind::Cond { cond, then, els } => format!(
            "({} ? {} : {})",
            expr_text(cond),
            expr_text(then),
            expr_text(els)
        ),
        ExprKind::Comma { lhs, rhs } => format!("({}, {})", expr_text(lhs), expr_text(rhs)),
    }
}

fn escape_char(c: u8) -> String {
    match c {
        b'\n' => "\\n".to_string(),
        b'\t' => "\\t".to_string(),
        b'\r' => "\\r".to_string(),
        b'\'' => "\\'".to_string(),
        b'\\' => "\\\\".to_string(),
        0x20..=0x7e => (c as char).to_string(),
        _ => format!("\\x{:02x}", c),
    }
}

fn escape_bytes(bytes: &[u8]) -> String {
    let mut out = String::new();
    for &b in bytes {
        match b {
            b'"' => out.push_str("\\\""),
            b'\\' => out.push_str("\\\\"),
            b'\n' => out.push_str("\\n"),
            b'\t' => out.push_str("\\t"),
            0x20..=0x7e => out.push(b as char),
            _ => out.push_str(&format!("\\x{:02x}", b)),
        }
    }
    out
}

// ---- annotated tree form --------------------------------------------

/// Tree dump of the whole unit. `entities`/`types` switch on the
/// reference and type annotations.
pub fn tree(
    ast: &Ast,
    entities: Option<&EntityTable>,
    types: Option<&TypeTable>,
) -> String {
    let mut dumper = TreeDumper {
        out: String::new(),
        depth: 0,
        entities,
        types,
    };
    for declaration in &ast.declarations {
        dumper.declaration(declaration);
    }
    dumper.out
}

/// Tree dump of the first statement of `main`, the `--dump-stmt` mode.
pub fn first_stmt_of_main(ast: &Ast) -> String {
    let Some(main) = ast.defined_function("main") else {
        return "no main function\n".to_string();
    };
    let StmtKind::Block(stmts) = &main.body.kind else {
        return "no main body\n".to_string();
    };
    let Some(first) = stmts.first() else {
        return "main has no statements\n".to_string();
    };
    let mut dumper = TreeDumper {
        out: String::new(),
        depth: 0,
        entities: None,
        types: None,
    };
    dumper.stmt(first);
    dumper.out
}

struct TreeDumper<'a> {
    out: String,
    depth: usize,
    entities: Option<&'a EntityTable>,
    types: Option<&'a TypeTable>,
}

impl<'a> TreeDumper<'a> {
    fn node(&mut self, text: &str) {
        for _ in 0..self.depth {
            self.out.push_str("  ");
        }
        self.out.push_str(text);
        self.out.push('\n');
    }

    fn child<F: FnOnce(&mut Self)>(&mut self, label: &str, f: F) {
        self.node(label);
        self.depth += 1;
        f(self);
        self.depth -= 1;
    }

    fn entity_note(&self, entity: Option<usize>) -> String {
        match (entity, self.entities) {
            (Some(id), Some(table)) => {
                let e = table.get(id);
                format!(" entity=#{} ({})", id, e.location)
            }
            _ => String::new(),
        }
    }

    fn type_note(&self, expr: &Expr) -> String {
        match (expr.ty, self.types) {
            (Some(ty), Some(table)) => format!(" type={}", table.name_of(ty)),
            _ => String::new(),
        }
    }

    fn declaration(&mut self, declaration: &Declaration) {
        match declaration {
            Declaration::DefinedFunction(f) => {
                let note = self.entity_note(f.entity);
                self.child(
                    &format!("<<DefinedFunction>> {} ({}){}", f.name, f.location, note),
                    |d| d.stmt(&f.body),
                );
            }
            Declaration::UndefinedFunction(f) => {
                let note = self.entity_note(f.entity);
                self.node(&format!(
                    "<<UndefinedFunction>> {} ({}){}",
                    f.name, f.location, note
                ));
            }
            Declaration::DefinedVariable(v) => {
                let note = self.entity_note(v.entity);
                match &v.initializer {
                    Some(init) => self.child(
                        &format!("<<DefinedVariable>> {} ({}){}", v.name, v.location, note),
                        |d| d.expr(init),
                    ),
                    None => self.node(&format!(
                        "<<DefinedVariable>> {} ({}){}",
                        v.name, v.location, note
                    )),
                }
            }
            Declaration::UndefinedVariable(v) => {
                let note = self.entity_note(v.entity);
                self.node(&format!(
                    "<<UndefinedVariable>> {} ({}){}",
                    v.name, v.location, note
                ));
            }
            Declaration::Constant(c) => {
                let note = self.entity_note(c.entity);
                self.child(
                    &format!("<<Constant>> {} ({}){}", c.name, c.location, note),
                    |d| d.expr(&c.value),
                );
            }
            Declaration::Typedef(t) => {
                self.node(&format!("<<Typedef>> {} ({})", t.name, t.location));
            }
            Declaration::StructDef(s) => {
                self.node(&format!("<<StructDef>> {} ({})", s.name, s.location));
            }
            Declaration::UnionDef(u) => {
                self.node(&format!("<<UnionDef>> {} ({})", u.name, u.location));
            }
        }
    }

    fn stmt(&mut self, stmt: &Stmt) {
        match &stmt.kind {
            StmtKind::Empty => self.node("<<Empty>>"),
            StmtKind::Expr(expr) => self.child("<<ExprStmt>>", |d| d.expr(expr)),
            StmtKind::Block(stmts) => self.child(&format!("<<Block>> ({})", stmt.location), |d| {
                for s in stmts {
                    d.stmt(s);
                }
            }),
            StmtKind::LocalVar(var) => {
                let note = self.entity_note(var.entity);
                match &var.initializer {
                    Some(init) => self.child(
                        &format!("<<LocalVar>> {} ({}){}", var.name, var.location, note),
                        |d| d.expr(init),
                    ),
                    None => self.node(&format!(
                        "<<LocalVar>> {} ({}){}",
                        var.name, var.location, note
                    )),
                }
            }
            StmtKind::If { cond, then, els } => {
                self.child(&format!("<<If>> ({})", stmt.location), |d| {
                    d.child("cond:", |d| d.expr(cond));
                    d.child("then:", |d| d.stmt(then));
                    if let Some(els) = els {
                        d.child("else:", |d| d.stmt(els));
                    }
                });
            }
            StmtKind::While { cond, body } => {
                self.child(&format!("<<While>> ({})", stmt.location), |d| {
                    d.child("cond:", |d| d.expr(cond));
                    d.child("body:", |d| d.stmt(body));
                });
            }
            StmtKind::DoWhile { body, cond } => {
                self.child(&format!("<<DoWhile>> ({})", stmt.location), |d| {
                    d.child("body:", |d| d.stmt(body));
                    d.child("cond:", |d| d.expr(cond));
                });
            }
            StmtKind::For {
                init,
                cond,
                step,
                body,
            } => {
                self.child(&format!("<<For>> ({})", stmt.location), |d| {
                    match init {
                        Some(ForInit::Var(var)) => d.child("init:", |d| {
                            let note = d.entity_note(var.entity);
                            d.node(&format!("<<LocalVar>> {}{}", var.name, note));
                            if let Some(i) = &var.initializer {
                                d.depth += 1;
                                d.expr(i);
                                d.depth -= 1;
                            }
                        }),
                        Some(ForInit::Expr(expr)) => d.child("init:", |d| d.expr(expr)),
                        None => {}
                    }
                    if let Some(cond) = cond {
                        d.child("cond:", |d| d.expr(cond));
                    }
                    if let Some(step) = step {
                        d.child("step:", |d| d.expr(step));
                    }
                    d.child("body:", |d| d.stmt(body));
                });
            }
            StmtKind::Switch { cond, clauses } => {
                self.child(&format!("<<Switch>> ({})", stmt.location), |d| {
                    d.child("cond:", |d| d.expr(cond));
                    for clause in clauses {
                        let label = if clause.is_default {
                            "default:".to_string()
                        } else {
                            format!("case ({} values):", clause.values.len())
                        };
                        d.child(&label, |d| {
                            for value in &clause.values {
                                d.expr(value);
                            }
                            for s in &clause.body {
                                d.stmt(s);
                            }
                        });
                    }
                });
            }
            StmtKind::Return(value) => match value {
                Some(expr) => self.child(&format!("<<Return>> ({})", stmt.location), |d| {
                    d.expr(expr)
                }),
                None => self.node(&format!("<<Return>> ({})", stmt.location)),
            },
            StmtKind::Break => self.node(&format!("<<Break>> ({})", stmt.location)),
            StmtKind::Continue => self.node(&format!("<<Continue>> ({})", stmt.location)),
            StmtKind::Label { name, stmt: inner } => {
                self.child(&format!("<<Label>> {} ({})", name, stmt.location), |d| {
                    d.stmt(inner)
                });
            }
            StmtKind::Goto(name) => {
                self.node(&format!("<<Goto>> {} ({})", name, stmt.location));
            }
        }
    }

    fn expr(&mut self, expr: &Expr) {
        let types = self.type_note(expr);
        match &expr.kind {
            ExprKind::IntLiteral { value, .. } => {
                self.node(&format!("<<IntLiteral>> {}{}", value, types));
            }
            ExprKind::CharLiteral(c) => {
                self.node(&format!("<<CharLiteral>> '{}'{}", escape_char(*c), types));
            }
            ExprKind::StringLiteral(bytes) => {
                self.node(&format!(
                    "<<StringLiteral>> \"{}\"{}",
                    escape_bytes(bytes),
                    types
                ));
            }
            ExprKind::VarRef { name, entity } => {
                let note = self.entity_note(*entity);
                self.node(&format!("<<VarRef>> {}{}{}", name, note, types));
            }
            ExprKind::Unary { op, expr: inner } => {
                self.child(&format!("<<Unary {:?}>>{}", op, types), |d| d.expr(inner));
            }
            ExprKind::Deref(inner) => self.child(&format!("<<Deref>>{}", types), |d| d.expr(inner)),
            ExprKind::Addr(inner) => self.child(&format!("<<Addr>>{}", types), |d| d.expr(inner)),
            ExprKind::SizeofExpr(inner) => {
                self.child(&format!("<<SizeofExpr>>{}", types), |d| d.expr(inner));
            }
            ExprKind::SizeofType(_) => self.node(&format!("<<SizeofType>>{}", types)),
            ExprKind::Binary { op, lhs, rhs } => {
                self.child(&format!("<<Binary {}>>{}", op.text(), types), |d| {
                    d.expr(lhs);
                    d.expr(rhs);
                });
            }
            ExprKind::Assign { lhs, rhs } => {
                self.child(&format!("<<Assign>>{}", types), |d| {
                    d.expr(lhs);
                    d.expr(rhs);
                });
            }
            ExprKind::OpAssign { op, lhs, rhs } => {
                self.child(&format!("<<OpAssign {}=>>{}", op.text(), types), |d| {
                    d.expr(lhs);
                    d.expr(rhs);
                });
            }
            ExprKind::Cast { type_ref, expr: inner } => {
                let label = if type_ref.is_some() {
                    format!("<<Cast>>{}", types)
                } else {
                    format!("<<ImplicitCast>>{}", types)
                };
                self.child(&label, |d| d.expr(inner));
            }
            ExprKind::Member { expr: inner, name } => {
                self.child(&format!("<<Member .{}>>{}", name, types), |d| d.expr(inner));
            }
            ExprKind::PtrMember { expr: inner, name } => {
                self.child(&format!("<<PtrMember ->{}>>{}", name, types), |d| {
                    d.expr(inner)
                });
            }
            ExprKind::ArrayRef { expr: inner, index } => {
                self.child(&format!("<<ArrayRef>>{}", types), |d| {
                    d.expr(inner);
                    d.expr(index);
                });
            }
            ExprKind::FunCall { callee, args } => {
                self.child(&format!("<<FunCall>>{}", types), |d| {
                    d.expr(callee);
                    for arg in args {
                        d.expr(arg);
                    }
                });
            }
            ExprKind::Cond { cond, then, els } => {
                self.child(&format!("<<Cond>>{}", types), |d| {
                    d.expr(cond);
                    d.expr(then);
                    d.expr(els);
                });
            }
            ExprKind::Comma { lhs, rhs } => {
                self.child(&format!("<<Comma>>{}", types), |d| {
                    d.expr(lhs);
                    d.expr(rhs);
                });
            }
        }
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

    fn parse(source: &str) -> Ast {
        let mut diags = Diagnostics::new();
        let file = Rc::new(PathBuf::from("t.cb"));
        let tokens = Lexer::new(file.clone(), source).lex(&mut diags);
        let mut loader = Loader::new(Vec::new());
        let ast = parse_unit(&tokens, file, &mut loader, &mut diags);
        let messages: Vec<String> = diags.iter().map(|d| d.to_string()).collect();
        assert!(!diags.has_errors(), "unexpected errors: {:?}", messages);
        ast
    }

    /// Round trip: parse, pretty-print, reparse, pretty-print again.
    /// Identical canonical text means structurally equal trees.
    fn assert_round_trip(source: &str) {
        let first = pretty(&parse(source));
        let second = pretty(&parse(&first));
        assert_eq!(first, second, "dump-ast round trip diverged");
    }

    #[test]
    fn test_round_trip_simple() {
        assert_round_trip("int main(void) { return 1 + 2 * 3; }");
    }

    #[test]
    fn test_round_trip_declarations() {
        assert_round_trip(
            "typedef unsigned long size_t;
             struct point { int x; int y; };
             const int LIMIT = 32;
             static int counter = 0;
             extern int errno;
             int add(int a, int b);
             char *names[4];
             int (*handler)(int);",
        );
    }

    #[test]
    fn test_round_trip_statements() {
        assert_round_trip(
            "int main(void) {
                 int i;
                 for (i = 0; i < 10; ++i) { if (i % 2) continue; else break; }
                 while (i) --i;
                 do { i++; } while (i < 3);
                 switch (i) { case 1: case 2: i = 5; break; default: i = 0; }
                 goto out;
                 out: return i;
             }",
        );
    }

    #[test]
    fn test_round_trip_expressions() {
        assert_round_trip(
            "int main(void) {
                 int a[3];
                 int *p;
                 p = &a[0];
                 *p = sizeof(int) + sizeof p;
                 p[1] = a[2] = 7;
                 return (p != 0) ? *p++ : -a[1] % 3 << 1 | 2 & 1 ^ ~0, a[0];
             }",
        );
    }

    #[test]
    fn test_pretty_preserves_precedence_structure() {
        let text = pretty(&parse("int main(void) { return 1 + 2 * 3; }"));
        assert!(text.contains("(1 + (2 * 3))"));
    }

    #[test]
    fn test_declarator_printing() {
        let text = pretty(&parse("int (*f)(int); char *argv[10];"));
        assert!(text.contains("int (*f)(int);"));
        assert!(text.contains("char *argv[10];"));
    }

    #[test]
    fn test_token_dump_contains_positions() {
        let mut diags = Diagnostics::new();
        let file = Rc::new(PathBuf::from("t.cb"));
        let tokens = Lexer::new(file.clone(), "int x;").lex(&mut diags);
        let dump = dump_tokens(&tokens);
        assert!(dump.contains("t.cb:1:1 Int int"));
        assert!(dump.contains("t.cb:1:5 Ident x"));
    }

    #[test]
    fn test_tree_dump_shapes() {
        let ast = parse("int main(void) { if (1) return 2; return 3; }");
        let text = tree(&ast, None, None);
        assert!(text.contains("<<DefinedFunction>> main"));
        assert!(text.contains("<<If>>"));
        assert!(text.contains("<<IntLiteral>> 2"));
    }

    #[test]
    fn test_first_stmt_of_main() {
        let ast = parse("int main(void) { return 42; }");
        let text = first_stmt_of_main(&ast);
        assert!(text.starts_with("<<Return>>"));
        assert!(text.contains("<<IntLiteral>> 42"));
    }
}
