//! Jump resolution
//!
//! Walks each function body once and binds every jump to its target:
//! `break` needs an enclosing loop or switch, `continue` an enclosing
//! loop, `goto` a label defined somewhere in the same function. Labels
//! are collected in a first pass per function so a `goto` may precede
//! the label it names.

use crate::ast::{Ast, CaseClause, Declaration, Stmt, StmtKind};
use crate::error::{Diagnostics, Location};
use std::collections::HashMap;

pub fn resolve(ast: &Ast, diags: &mut Diagnostics) {
    for declaration in &ast.declarations {
        if let Declaration::DefinedFunction(function) = declaration {
            let mut resolver = JumpResolver {
                diags,
                labels: HashMap::new(),
                loop_depth: 0,
                switch_depth: 0,
            };
            resolver.collect_labels(&function.body);
            resolver.check_stmt(&function.body);
        }
    }
}

struct JumpResolver<'a> {
    diags: &'a mut Diagnostics,
    labels: HashMap<String, Location>,
    loop_depth: usize,
    switch_depth: usize,
}

impl<'a> JumpResolver<'a> {
    // ---- pass 1: labels ---------------------------------------------

    fn collect_labels(&mut self, stmt: &Stmt) {
        match &stmt.kind {
            StmtKind::Label { name, stmt: inner } => {
                if let Some(previous) = self.labels.get(name) {
                    let previous = previous.clone();
                    self.diags.error(
                        stmt.location.clone(),
                        format!("duplicate label {} (first defined at {})", name, previous),
                    );
                } else {
                    self.labels.insert(name.clone(), stmt.location.clone());
                }
                self.collect_labels(inner);
            }
            StmtKind::Block(stmts) => {
                for s in stmts {
                    self.collect_labels(s);
                }
            }
            StmtKind::If { then, els, .. } => {
                self.collect_labels(then);
                if let Some(els) = els {
                    self.collect_labels(els);
                }
            }
            StmtKind::While { body, .. }
            | StmtKind::DoWhile { body, .. }
            | StmtKind::For { body, .. } => self.collect_labels(body),
            StmtKind::Switch { clauses, .. } => {
                for CaseClause { body, .. } in clauses {
                    for s in body {
                        self.collect_labels(s);
                    }
                }
            }
            _ => {}
        }
    }

    // ---- pass 2: jumps ----------------------------------------------

    fn check_stmt(&mut self, stmt: &Stmt) {
        match &stmt.kind {
            StmtKind::Break => {
                if self.loop_depth == 0 && self.switch_depth == 0 {
                    self.diags.error(
                        stmt.location.clone(),
                        "break outside of loop or switch".to_string(),
                    );
                }
            }
            StmtKind::Continue => {
                if self.loop_depth == 0 {
                    self.diags
                        .error(stmt.location.clone(), "continue outside of loop".to_string());
                }
            }
            StmtKind::Goto(name) => {
                if !self.labels.contains_key(name) {
                    self.diags.error(
                        stmt.location.clone(),
                        format!("goto to undefined label {}", name),
                    );
                }
            }
            StmtKind::Label { stmt: inner, .. } => self.check_stmt(inner),
            StmtKind::Block(stmts) => {
                for s in stmts {
                    self.check_stmt(s);
                }
            }
            StmtKind::If { then, els, .. } => {
                self.check_stmt(then);
                if let Some(els) = els {
                    self.check_stmt(els);
                }
            }
            StmtKind::While { body, .. } | StmtKind::DoWhile { body, .. } => {
                self.loop_depth += 1;
                self.check_stmt(body);
                self.loop_depth -= 1;
            }
            StmtKind::For { body, .. } => {
                self.loop_depth += 1;
                self.check_stmt(body);
                self.loop_depth -= 1;
            }
            StmtKind::Switch { clauses, .. } => {
                self.switch_depth += 1;
                for CaseClause { body, .. } in clauses {
                    for s in body {
                        self.check_stmt(s);
                    }
                }
                self.switch_depth -= 1;
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

    fn run(source: &str) -> Diagnostics {
        let mut diags = Diagnostics::new();
        let file = Rc::new(PathBuf::from("t.cb"));
        let tokens = Lexer::new(file.clone(), source).lex(&mut diags);
        let mut loader = Loader::new(Vec::new());
        let ast = parse_unit(&tokens, file, &mut loader, &mut diags);
        assert!(!diags.has_errors(), "parse should succeed");
        resolve(&ast, &mut diags);
        diags
    }

    #[test]
    fn test_break_in_loop_and_switch() {
        let diags = run(
            "int main(void) { while (1) break; switch (1) { case 1: break; } return 0; }",
        );
        assert!(!diags.has_errors());
    }

    #[test]
    fn test_break_outside_loop() {
        let diags = run("int main(void) { break; return 0; }");
        assert!(diags.has_errors());
    }

    #[test]
    fn test_continue_in_switch_is_rejected() {
        let diags = run("int main(void) { switch (1) { case 1: continue; } return 0; }");
        assert!(diags.has_errors());
    }

    #[test]
    fn test_continue_in_loop_containing_switch() {
        let diags =
            run("int main(void) { while (1) { switch (1) { case 1: continue; } } return 0; }");
        assert!(!diags.has_errors());
    }

    #[test]
    fn test_goto_may_precede_label() {
        let diags = run("int main(void) { goto out; out: return 0; }");
        assert!(!diags.has_errors());
    }

    #[test]
    fn test_goto_missing_label() {
        let diags = run("int main(void) { goto nowhere; return 0; }");
        assert!(diags.has_errors());
    }

    #[test]
    fn test_duplicate_label() {
        let diags = run("int main(void) { x: ; x: return 0; }");
        assert!(diags.has_errors());
    }

    #[test]
    fn test_labels_are_per_function() {
        let diags = run("int f(void) { x: return 1; } int main(void) { x: return 0; }");
        assert!(!diags.has_errors());
    }
}
