//! Expression parsing (Pratt).

use crate::ast::*;
use crate::error::ParserError;
use crate::lexer::TokenKind;
use crate::parser::core::{ParseResult, Parser};
use crate::parser::precedence::{get_precedence, Precedence};

impl Parser {
    pub(crate) fn expression(&mut self) -> ParseResult<Expr> {
        self.parse_precedence(Precedence::Or)
    }

    fn parse_precedence(&mut self, min: Precedence) -> ParseResult<Expr> {
        let mut expr = self.prefix()?;

        loop {
            let precedence = get_precedence(&self.peek().kind);
            if precedence == Precedence::None || precedence < min {
                break;
            }
            expr = self.infix(expr, precedence)?;
        }

        Ok(expr)
    }

    fn prefix(&mut self) -> ParseResult<Expr> {
        let token = self.advance();
        let span = token.span;

        match token.kind {
            TokenKind::IntLiteral(value) => Ok(Expr::new(ExprKind::IntLiteral(value), span)),
            TokenKind::StringLiteral(value) => Ok(Expr::new(ExprKind::StringLiteral(value), span)),
            TokenKind::BoolLiteral(value) => Ok(Expr::new(ExprKind::BoolLiteral(value), span)),
            TokenKind::Null => Ok(Expr::new(ExprKind::Null, span)),
            TokenKind::Identifier(name) => Ok(Expr::new(ExprKind::Variable(name), span)),

            TokenKind::Minus => {
                let operand = self.parse_precedence(Precedence::Unary)?;
                Ok(Expr::new(
                    ExprKind::Unary {
                        operator: UnaryOp::Negate,
                        operand: Box::new(operand),
                    },
                    span,
                ))
            }
            TokenKind::Bang => {
                let operand = self.parse_precedence(Precedence::Unary)?;
                Ok(Expr::new(
                    ExprKind::Unary {
                        operator: UnaryOp::Not,
                        operand: Box::new(operand),
                    },
                    span,
                ))
            }

            TokenKind::LeftParen => {
                let expr = self.expression()?;
                self.expect(&TokenKind::RightParen)?;
                Ok(expr)
            }

            TokenKind::LeftBracket => self.array_literal(span),
            TokenKind::LeftBrace => self.hash_literal(span),
            TokenKind::If => self.if_expression(span),
            TokenKind::Fn => self.function_literal(span),

            other => Err(ParserError::unexpected_token(
                "expression",
                format!("{}", other),
                span,
            )),
        }
    }

    fn infix(&mut self, left: Expr, precedence: Precedence) -> ParseResult<Expr> {
        let token = self.advance();
        let span = token.span;

        match token.kind {
            TokenKind::LeftParen => self.finish_call(left),
            TokenKind::LeftBracket => {
                let index = self.expression()?;
                self.expect(&TokenKind::RightBracket)?;
                Ok(Expr::new(
                    ExprKind::Index {
                        object: Box::new(left),
                        index: Box::new(index),
                    },
                    span,
                ))
            }
            kind => {
                let operator = match kind {
                    TokenKind::Plus => BinaryOp::Add,
                    TokenKind::Minus => BinaryOp::Subtract,
                    TokenKind::Star => BinaryOp::Multiply,
                    TokenKind::Slash => BinaryOp::Divide,
                    TokenKind::EqualEqual => BinaryOp::Equal,
                    TokenKind::BangEqual => BinaryOp::NotEqual,
                    TokenKind::Less => BinaryOp::Less,
                    TokenKind::LessEqual => BinaryOp::LessEqual,
                    TokenKind::Greater => BinaryOp::Greater,
                    TokenKind::GreaterEqual => BinaryOp::GreaterEqual,
                    TokenKind::And => BinaryOp::And,
                    TokenKind::Or => BinaryOp::Or,
                    other => {
                        return Err(ParserError::unexpected_token(
                            "operator",
                            format!("{}", other),
                            span,
                        ))
                    }
                };
                let right = self.parse_precedence(precedence.next())?;
                Ok(Expr::new(
                    ExprKind::Binary {
                        left: Box::new(left),
                        operator,
                        right: Box::new(right),
                    },
                    span,
                ))
            }
        }
    }

    fn finish_call(&mut self, callee: Expr) -> ParseResult<Expr> {
        let span = self.previous_span();
        let mut arguments = Vec::new();

        if !self.check(&TokenKind::RightParen) {
            loop {
                arguments.push(self.expression()?);
                if !self.match_token(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(&TokenKind::RightParen)?;

        Ok(Expr::new(
            ExprKind::Call {
                callee: Box::new(callee),
                arguments,
            },
            span,
        ))
    }

    fn array_literal(&mut self, span: crate::span::Span) -> ParseResult<Expr> {
        let mut elements = Vec::new();

        if !self.check(&TokenKind::RightBracket) {
            loop {
                elements.push(self.expression()?);
                if !self.match_token(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(&TokenKind::RightBracket)?;

        Ok(Expr::new(ExprKind::Array(elements), span))
    }

    fn hash_literal(&mut self, span: crate::span::Span) -> ParseResult<Expr> {
        let mut pairs = Vec::new();

        if !self.check(&TokenKind::RightBrace) {
            loop {
                let key = self.expression()?;
                self.expect(&TokenKind::Colon)?;
                let value = self.expression()?;
                pairs.push((key, value));
                if !self.match_token(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(&TokenKind::RightBrace)?;

        Ok(Expr::new(ExprKind::Hash(pairs), span))
    }

    fn if_expression(&mut self, span: crate::span::Span) -> ParseResult<Expr> {
        self.expect(&TokenKind::LeftParen)?;
        let condition = self.expression()?;
        self.expect(&TokenKind::RightParen)?;
        let then_branch = self.block()?;
        let else_branch = if self.match_token(&TokenKind::Else) {
            Some(self.block()?)
        } else {
            None
        };

        Ok(Expr::new(
            ExprKind::If {
                condition: Box::new(condition),
                then_branch,
                else_branch,
            },
            span,
        ))
    }

    fn function_literal(&mut self, span: crate::span::Span) -> ParseResult<Expr> {
        self.expect(&TokenKind::LeftParen)?;
        let mut params = Vec::new();

        if !self.check(&TokenKind::RightParen) {
            loop {
                params.push(self.expect_identifier()?);
                if !self.match_token(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(&TokenKind::RightParen)?;
        let body = self.block()?;

        Ok(Expr::new(ExprKind::Function { params, body }, span))
    }
}
