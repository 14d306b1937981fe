//! Statements and expressions of function and handler bodies.

use super::Parser;
use crate::dsl::ast::{BinaryOp, Expr, ForIter, Literal, Stmt, UnaryOp};
use crate::dsl::error::CompileError;
use crate::dsl::token::TokenKind;
use crate::resolve::{ScopeKind, SymbolKind};

impl Parser<'_> {
    /// `{ stmt* }` in a new ordered block scope.
    pub(super) fn parse_block(&mut self) -> Result<Vec<Stmt>, CompileError> {
        self.expect(TokenKind::LBrace)?;
        let (_, body) = self.in_scope(ScopeKind::Block, |p| {
            let mut body = Vec::new();
            while !p.check(TokenKind::RBrace) && !p.is_at_end() {
                body.push(p.parse_stmt()?);
            }
            Ok(body)
        })?;
        self.expect(TokenKind::RBrace)?;
        Ok(body)
    }

    fn parse_stmt(&mut self) -> Result<Stmt, CompileError> {
        let pos = self.peek().pos;
        match &self.peek().kind {
            TokenKind::Var => self.parse_var(),
            TokenKind::If => self.parse_if(),
            TokenKind::While => {
                self.advance();
                let cond = self.parse_condition()?;
                let body = self.parse_block()?;
                Ok(Stmt::While { cond, body, pos })
            }
            TokenKind::For => self.parse_for(),
            TokenKind::Return => {
                self.advance();
                let value = if self.check(TokenKind::Semi) {
                    None
                } else {
                    Some(self.parse_expr()?)
                };
                self.expect(TokenKind::Semi)?;
                Ok(Stmt::Return(value, pos))
            }
            TokenKind::Break => {
                self.advance();
                self.expect(TokenKind::Semi)?;
                Ok(Stmt::Break(pos))
            }
            TokenKind::Continue => {
                self.advance();
                self.expect(TokenKind::Semi)?;
                Ok(Stmt::Continue(pos))
            }
            _ => {
                let expr = self.parse_expr()?;
                if self.check(TokenKind::Eq) {
                    self.advance();
                    let value = self.parse_expr()?;
                    self.expect(TokenKind::Semi)?;
                    return Ok(Stmt::Assign {
                        target: expr,
                        value,
                        pos,
                    });
                }
                self.expect(TokenKind::Semi)?;
                Ok(Stmt::Expr(expr, pos))
            }
        }
    }

    /// `var name [Type] [= expr];`
    ///
    /// The initializer is parsed before the local is bound, so it sees the
    /// enclosing binding of the same name.
    fn parse_var(&mut self) -> Result<Stmt, CompileError> {
        let pos = self.expect(TokenKind::Var)?.pos;
        let (name, name_pos) = self.expect_ident()?;
        let ty = if self.check(TokenKind::Eq) || self.check(TokenKind::Semi) {
            None
        } else {
            Some(self.parse_type()?)
        };
        let init = if self.check(TokenKind::Eq) {
            self.advance();
            Some(self.parse_expr()?)
        } else {
            None
        };
        self.expect(TokenKind::Semi)?;
        self.declare(&name, SymbolKind::Local, name_pos, self.owner, true);
        Ok(Stmt::Var {
            name,
            ty,
            init,
            pos,
        })
    }

    fn parse_if(&mut self) -> Result<Stmt, CompileError> {
        let pos = self.expect(TokenKind::If)?.pos;
        let cond = self.parse_condition()?;
        let then = self.parse_block()?;
        let otherwise = if self.check(TokenKind::Else) {
            self.advance();
            if self.check(TokenKind::If) {
                Some(vec![self.parse_if()?])
            } else {
                Some(self.parse_block()?)
            }
        } else {
            None
        };
        Ok(Stmt::If {
            cond,
            then,
            otherwise,
            pos,
        })
    }

    /// `for (x in items) {}` or `for (i in a..b) {}`.
    fn parse_for(&mut self) -> Result<Stmt, CompileError> {
        let pos = self.expect(TokenKind::For)?.pos;
        self.expect(TokenKind::LParen)?;
        let (var, var_pos) = self.expect_ident()?;
        self.expect(TokenKind::In)?;
        let first = self.parse_expr()?;
        let iter = if self.check(TokenKind::DotDot) {
            self.advance();
            ForIter::Range(first, self.parse_expr()?)
        } else {
            ForIter::Each(first)
        };
        self.expect(TokenKind::RParen)?;

        let (_, body) = self.in_scope(ScopeKind::Block, |p| {
            p.declare(&var, SymbolKind::Local, var_pos, p.owner, true);
            p.parse_block()
        })?;

        Ok(Stmt::For {
            var,
            iter,
            body,
            pos,
        })
    }

    fn parse_condition(&mut self) -> Result<Expr, CompileError> {
        self.expect(TokenKind::LParen)?;
        let cond = self.parse_expr()?;
        self.expect(TokenKind::RParen)?;
        Ok(cond)
    }

    // =========================================================================
    // Expressions, lowest precedence first
    // =========================================================================

    pub(crate) fn parse_expr(&mut self) -> Result<Expr, CompileError> {
        self.parse_binary(0)
    }

    fn parse_binary(&mut self, level: usize) -> Result<Expr, CompileError> {
        const LEVELS: &[&[(TokenKind, BinaryOp)]] = &[
            &[(TokenKind::OrOr, BinaryOp::Or)],
            &[(TokenKind::AndAnd, BinaryOp::And)],
            &[(TokenKind::EqEq, BinaryOp::Eq), (TokenKind::NotEq, BinaryOp::NotEq)],
            &[
                (TokenKind::Lt, BinaryOp::Lt),
                (TokenKind::Le, BinaryOp::Le),
                (TokenKind::Gt, BinaryOp::Gt),
                (TokenKind::Ge, BinaryOp::Ge),
            ],
            &[(TokenKind::Plus, BinaryOp::Add), (TokenKind::Minus, BinaryOp::Sub)],
            &[
                (TokenKind::Star, BinaryOp::Mul),
                (TokenKind::Slash, BinaryOp::Div),
                (TokenKind::Percent, BinaryOp::Rem),
            ],
        ];

        if level >= LEVELS.len() {
            return self.parse_unary();
        }

        let mut lhs = self.parse_binary(level + 1)?;
        loop {
            let Some(op) = LEVELS[level]
                .iter()
                .find(|(kind, _)| &self.peek().kind == kind)
                .map(|(_, op)| *op)
            else {
                break;
            };
            self.advance();
            let rhs = self.parse_binary(level + 1)?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, CompileError> {
        let op = match self.peek().kind {
            TokenKind::Bang => Some(UnaryOp::Not),
            TokenKind::Minus => Some(UnaryOp::Neg),
            _ => None,
        };
        match op {
            Some(op) => {
                self.advance();
                let expr = self.parse_unary()?;
                Ok(Expr::Unary {
                    op,
                    expr: Box::new(expr),
                })
            }
            None => self.parse_postfix(),
        }
    }

    fn parse_postfix(&mut self) -> Result<Expr, CompileError> {
        let mut expr = self.parse_primary()?;
        loop {
            if self.check(TokenKind::Dot) {
                self.advance();
                let (name, _) = self.expect_ident()?;
                expr = Expr::Member {
                    object: Box::new(expr),
                    name,
                };
            } else if self.check(TokenKind::LParen) {
                let args = self.parse_args()?;
                expr = Expr::Call {
                    callee: Box::new(expr),
                    args,
                };
            } else {
                return Ok(expr);
            }
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, CompileError> {
        let t = self.peek();
        let pos = t.pos;
        let literal = match &t.kind {
            TokenKind::Integer(n) => Some(Literal::Int(*n)),
            TokenKind::Number(n) => Some(Literal::Float(*n)),
            TokenKind::Str(s) => Some(Literal::Str(s.clone())),
            TokenKind::True => Some(Literal::Bool(true)),
            TokenKind::False => Some(Literal::Bool(false)),
            TokenKind::Null => Some(Literal::Null),
            _ => None,
        };
        if let Some(literal) = literal {
            self.advance();
            return Ok(Expr::Literal(literal));
        }

        match &self.peek().kind {
            TokenKind::Ident(name) => {
                let name = name.clone();
                self.advance();
                Ok(Expr::Name(self.name_ref(name, pos)))
            }
            TokenKind::LParen => {
                self.advance();
                let expr = self.parse_expr()?;
                self.expect(TokenKind::RParen)?;
                Ok(expr)
            }
            TokenKind::At => {
                self.advance();
                let mut path = vec![self.expect_ident()?.0];
                while self.check(TokenKind::Dot) {
                    self.advance();
                    path.push(self.expect_ident()?.0);
                }
                let args = self.parse_args()?;
                Ok(Expr::Native { path, args, pos })
            }
            _ => Err(self.error("an expression")),
        }
    }

    fn parse_args(&mut self) -> Result<Vec<Expr>, CompileError> {
        self.expect(TokenKind::LParen)?;
        let mut args = Vec::new();
        while !self.check(TokenKind::RParen) {
            args.push(self.parse_expr()?);
            if !self.check(TokenKind::Comma) {
                break;
            }
            self.advance();
        }
        self.expect(TokenKind::RParen)?;
        Ok(args)
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use crate::diagnostics::DiagnosticCode;
    use crate::dsl::ast::*;
    use crate::dsl::context::{ParserContext, ParserOptions};
    use crate::dsl::lexer::Lexer;
    use crate::dsl::parser::Parser;
    use crate::resolve::{ScopeKind, SymbolContainer, SymbolStack};

    fn parse_func(src: &str) -> (FuncDecl, ParserContext) {
        let mut ctx = ParserContext::new(None);
        let mut stack = SymbolStack::new();
        let mut container = SymbolContainer::new();
        let options = ParserOptions::new("body.jssp");
        let tokens = Lexer::new(src, Path::new("body.jssp")).tokenize().unwrap();
        let file = container.register_file(Path::new("body.jssp"));
        let root = container.new_scope(ScopeKind::File, None, file);
        stack.push(root);
        let parsed = Parser::new(tokens, file, root, &options, &mut ctx, &mut stack, &mut container)
            .parse()
            .unwrap();
        match parsed.nodes.into_iter().next() {
            Some(AstNode::Func(func)) => (func, ctx),
            other => panic!("expected func, got {other:?}"),
        }
    }

    #[test]
    fn operator_precedence() {
        let (func, _) = parse_func("func f() { return 1 + 2 * 3 == 7 && !false; }");
        let Stmt::Return(Some(Expr::Binary { op, lhs, .. }), _) = &func.body[0] else {
            panic!("expected return of binary");
        };
        assert_eq!(*op, BinaryOp::And);
        let Expr::Binary { op, lhs, .. } = lhs.as_ref() else {
            panic!("expected equality");
        };
        assert_eq!(*op, BinaryOp::Eq);
        let Expr::Binary { op, rhs, .. } = lhs.as_ref() else {
            panic!("expected addition");
        };
        assert_eq!(*op, BinaryOp::Add);
        assert!(matches!(rhs.as_ref(), Expr::Binary { op: BinaryOp::Mul, .. }));
    }

    #[test]
    fn native_and_member_calls() {
        let (func, _) = parse_func(
            "func f(user User) { @console.log('hi', user.name); UserMapper.selectById(1); }",
        );
        let Stmt::Expr(Expr::Native { path, args, .. }, _) = &func.body[0] else {
            panic!("expected native call");
        };
        assert_eq!(path, &vec!["console".to_string(), "log".to_string()]);
        assert_eq!(args.len(), 2);

        let Stmt::Expr(Expr::Call { callee, args }, _) = &func.body[1] else {
            panic!("expected call");
        };
        assert_eq!(args.len(), 1);
        assert!(matches!(callee.as_ref(), Expr::Member { name, .. } if name == "selectById"));
    }

    #[test]
    fn control_flow_statements() {
        let (func, ctx) = parse_func(
            "func main() {
                var total int = 0;
                for (i in 0..10) {
                    if (i % 2 == 0) { continue; } else if (i > 7) { break; } else { total = total + i; }
                }
                for (item in items) { }
                while (total > 0) { total = total - 1; }
                return;
            }",
        );
        assert!(!ctx.diagnostics.has_errors());
        assert_eq!(func.body.len(), 5);
        assert!(matches!(&func.body[1], Stmt::For { iter: ForIter::Range(..), .. }));
        assert!(matches!(&func.body[2], Stmt::For { iter: ForIter::Each(_), .. }));
        let Stmt::For { body, .. } = &func.body[1] else {
            panic!("expected for");
        };
        let Stmt::If { otherwise: Some(rest), .. } = &body[0] else {
            panic!("expected if");
        };
        assert!(matches!(&rest[0], Stmt::If { otherwise: Some(_), .. }));
        assert!(matches!(&func.body[4], Stmt::Return(None, _)));
    }

    #[test]
    fn duplicate_locals_in_one_block() {
        let (_, ctx) = parse_func("func f() { var a = 1; var a = 2; }");
        assert!(ctx.diagnostics.contains(DiagnosticCode::DuplicateSymbol));
    }

    #[test]
    fn shadowing_in_nested_block_is_allowed() {
        let (_, ctx) = parse_func("func f() { var a = 1; if (a > 0) { var a = 2; } }");
        assert!(!ctx.diagnostics.has_errors());
    }
}
