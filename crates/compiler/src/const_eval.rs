//! Integer constant expression folding
//!
//! Used wherever the language demands a compile-time integer: array
//! lengths, case labels, constant definitions and global initializers.
//! Works on 64-bit signed values; width truncation happens when the value
//! is consumed.

use crate::ast::{BinaryOp, Expr, ExprKind, UnaryOp};
use crate::entity::{EntityKind, EntityTable};
use crate::error::Location;
use crate::types::TypeTable;

/// Evaluate `expr` to an integer, or report why it is not constant.
/// The error carries the location of the offending subexpression.
pub fn const_int(
    expr: &Expr,
    entities: &EntityTable,
    types: &TypeTable,
) -> Result<i64, (Location, String)> {
    let fail = |message: &str| Err((expr.location.clone(), message.to_string()));
    match &expr.kind {
        ExprKind::IntLiteral { value, .. } => Ok(*value),
        ExprKind::CharLiteral(c) => Ok(*c as i64),
        ExprKind::Unary { op, expr: inner } => {
            let v = const_int(inner, entities, types)?;
            match op {
                UnaryOp::Plus => Ok(v),
                UnaryOp::Minus => Ok(v.wrapping_neg()),
                UnaryOp::Not => Ok((v == 0) as i64),
                UnaryOp::BitNot => Ok(!v),
                _ => fail("increment/decrement is not constant"),
            }
        }
        // logical operators short-circuit even when folding
        ExprKind::Binary {
            op: BinaryOp::LogicalAnd,
            lhs,
            rhs,
        } => {
            if const_int(lhs, entities, types)? == 0 {
                Ok(0)
            } else {
                Ok((const_int(rhs, entities, types)? != 0) as i64)
            }
        }
        ExprKind::Binary {
            op: BinaryOp::LogicalOr,
            lhs,
            rhs,
        } => {
            if const_int(lhs, entities, types)? != 0 {
                Ok(1)
            } else {
                Ok((const_int(rhs, entities, types)? != 0) as i64)
            }
        }
        ExprKind::Binary { op, lhs, rhs } => {
            let l = const_int(lhs, entities, types)?;
            let r = const_int(rhs, entities, types)?;
            match op {
                BinaryOp::Add => Ok(l.wrapping_add(r)),
                BinaryOp::Sub => Ok(l.wrapping_sub(r)),
                BinaryOp::Mul => Ok(l.wrapping_mul(r)),
                BinaryOp::Div => {
                    if r == 0 {
                        fail("division by zero in constant expression")
                    } else {
                        Ok(l.wrapping_div(r))
                    }
                }
                BinaryOp::Mod => {
                    if r == 0 {
                        fail("division by zero in constant expression")
                    } else {
                        Ok(l.wrapping_rem(r))
                    }
                }
                BinaryOp::BitAnd => Ok(l & r),
                BinaryOp::BitOr => Ok(l | r),
                BinaryOp::BitXor => Ok(l ^ r),
                BinaryOp::Shl => Ok(l.wrapping_shl(r as u32)),
                BinaryOp::Shr => Ok(l.wrapping_shr(r as u32)),
                BinaryOp::Eq => Ok((l == r) as i64),
                BinaryOp::NotEq => Ok((l != r) as i64),
                BinaryOp::Lt => Ok((l < r) as i64),
                BinaryOp::LtEq => Ok((l <= r) as i64),
                BinaryOp::Gt => Ok((l > r) as i64),
                BinaryOp::GtEq => Ok((l >= r) as i64),
                BinaryOp::LogicalAnd | BinaryOp::LogicalOr => unreachable!("handled above"),
            }
        }
        ExprKind::Cond { cond, then, els } => {
            if const_int(cond, entities, types)? != 0 {
                const_int(then, entities, types)
            } else {
                const_int(els, entities, types)
            }
        }
        // a cast does not change the folded value; truncation is applied
        // where the value is used
        ExprKind::Cast { expr: inner, .. } => const_int(inner, entities, types),
        ExprKind::SizeofType(type_ref) => match type_ref.resolved.and_then(|t| types.size_of(t)) {
            Some(size) => Ok(size as i64),
            None => fail("sizeof of incomplete type is not constant"),
        },
        ExprKind::VarRef { entity, name } => match entity {
            Some(id) => {
                let entity = entities.get(*id);
                if entity.kind == EntityKind::Constant {
                    match entity.const_value {
                        Some(v) => Ok(v),
                        None => fail("constant is not yet evaluated"),
                    }
                } else {
                    Err((
                        expr.location.clone(),
                        format!("{} is not a constant", name),
                    ))
                }
            }
            None => fail("unresolved reference in constant expression"),
        },
        _ => fail("not a constant expression"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Diagnostics;
    use crate::lexer::Lexer;
    use crate::loader::Loader;
    use crate::parser::parse_unit;
    use crate::ast::{Declaration, StmtKind};
    use std::path::PathBuf;
    use std::rc::Rc;

    fn eval(source_expr: &str) -> i64 {
        let source = format!("int main(void) {{ return {}; }}", source_expr);
        let mut diags = Diagnostics::new();
        let file = Rc::new(PathBuf::from("t.cb"));
        let tokens = Lexer::new(file.clone(), &source).lex(&mut diags);
        let mut loader = Loader::new(Vec::new());
        let ast = parse_unit(&tokens, file, &mut loader, &mut diags);
        assert!(!diags.has_errors());
        let Declaration::DefinedFunction(f) = &ast.declarations[0] else {
            panic!()
        };
        let StmtKind::Block(stmts) = &f.body.kind else { panic!() };
        let StmtKind::Return(Some(expr)) = &stmts[0].kind else {
            panic!()
        };
        let entities = EntityTable::new();
        let types = TypeTable::new();
        const_int(expr, &entities, &types).expect("not constant")
    }

    #[test]
    fn test_arithmetic_folding() {
        assert_eq!(eval("1 + 2 * 3"), 7);
        assert_eq!(eval("(1 << 4) | 1"), 17);
        assert_eq!(eval("-5 % 3"), -2);
        assert_eq!(eval("'a'"), 97);
    }

    #[test]
    fn test_conditional_folding() {
        assert_eq!(eval("1 ? 10 : 20"), 10);
        assert_eq!(eval("0 && (1/0)"), 0); // short-circuit never divides
    }

    #[test]
    fn test_division_by_zero_is_rejected() {
        let source = "int main(void) { return 1 / 0; }";
        let mut diags = Diagnostics::new();
        let file = Rc::new(PathBuf::from("t.cb"));
        let tokens = Lexer::new(file.clone(), source).lex(&mut diags);
        let mut loader = Loader::new(Vec::new());
        let ast = parse_unit(&tokens, file, &mut loader, &mut diags);
        let Declaration::DefinedFunction(f) = &ast.declarations[0] else {
            panic!()
        };
        let StmtKind::Block(stmts) = &f.body.kind else { panic!() };
        let StmtKind::Return(Some(expr)) = &stmts[0].kind else {
            panic!()
        };
        let entities = EntityTable::new();
        let types = TypeTable::new();
        assert!(const_int(expr, &entities, &types).is_err());
    }
}
