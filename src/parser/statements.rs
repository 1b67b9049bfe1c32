//! Statement parsing.

use crate::ast::*;
use crate::lexer::TokenKind;
use crate::parser::core::{ParseResult, Parser};

impl Parser {
    pub(crate) fn declaration(&mut self) -> ParseResult<Stmt> {
        if self.check(&TokenKind::Let) {
            return self.let_statement();
        }
        if self.check(&TokenKind::Return) {
            return self.return_statement();
        }
        if self.check(&TokenKind::For) {
            return self.for_statement();
        }
        if matches!(self.peek().kind, TokenKind::Identifier(_))
            && self.peek_nth(1).kind == TokenKind::Equal
        {
            return self.assign_statement();
        }
        self.expression_statement()
    }

    /// let name = expr;
    fn let_statement(&mut self) -> ParseResult<Stmt> {
        let start = self.current_span();
        self.expect(&TokenKind::Let)?;
        let name = self.expect_identifier()?;
        self.expect(&TokenKind::Equal)?;
        let value = self.expression()?;
        self.expect(&TokenKind::Semicolon)?;

        Ok(Stmt::new(
            StmtKind::Let { name, value },
            start.to(self.previous_span()),
        ))
    }

    /// name = expr;
    fn assign_statement(&mut self) -> ParseResult<Stmt> {
        let start = self.current_span();
        let name = self.expect_identifier()?;
        self.expect(&TokenKind::Equal)?;
        let value = self.expression()?;
        self.expect(&TokenKind::Semicolon)?;

        Ok(Stmt::new(
            StmtKind::Assign { name, value },
            start.to(self.previous_span()),
        ))
    }

    /// return expr; or return;
    fn return_statement(&mut self) -> ParseResult<Stmt> {
        let start = self.current_span();
        self.expect(&TokenKind::Return)?;

        let value = if self.check(&TokenKind::Semicolon) {
            None
        } else {
            Some(self.expression()?)
        };
        self.expect(&TokenKind::Semicolon)?;

        Ok(Stmt::new(
            StmtKind::Return(value),
            start.to(self.previous_span()),
        ))
    }

    /// for (item in iterable) { ... } or for (item, idx in iterable) { ... }
    fn for_statement(&mut self) -> ParseResult<Stmt> {
        let start = self.current_span();
        self.expect(&TokenKind::For)?;
        self.expect(&TokenKind::LeftParen)?;
        let item = self.expect_identifier()?;
        let index = if self.match_token(&TokenKind::Comma) {
            Some(self.expect_identifier()?)
        } else {
            None
        };
        self.expect(&TokenKind::In)?;
        let iterable = self.expression()?;
        self.expect(&TokenKind::RightParen)?;
        let body = self.block()?;

        Ok(Stmt::new(
            StmtKind::For {
                item,
                index,
                iterable,
                body,
            },
            start.to(self.previous_span()),
        ))
    }

    /// An expression statement; the trailing semicolon is optional.
    fn expression_statement(&mut self) -> ParseResult<Stmt> {
        let start = self.current_span();
        let expr = self.expression()?;
        self.match_token(&TokenKind::Semicolon);

        Ok(Stmt::new(
            StmtKind::Expression(expr),
            start.to(self.previous_span()),
        ))
    }

    /// A brace-delimited block of statements.
    pub(crate) fn block(&mut self) -> ParseResult<Vec<Stmt>> {
        self.expect(&TokenKind::LeftBrace)?;
        let mut statements = Vec::new();
        while !self.check(&TokenKind::RightBrace) && !self.is_at_end() {
            statements.push(self.declaration()?);
        }
        self.expect(&TokenKind::RightBrace)?;
        Ok(statements)
    }
}
