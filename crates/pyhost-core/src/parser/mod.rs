//! Recursive-descent parser: tokens -> AST (`spec.md` §4.2).

pub mod ast;

use crate::error::{HostError, SourceSpan};
use crate::lexer::token::{Token, TokenKind};
use ast::*;

pub fn parse(tokens: Vec<Token>) -> Result<Vec<Stmt>, HostError> {
    let mut parser = Parser { tokens, pos: 0 };
    parser.parse_module()
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

type PResult<T> = Result<T, HostError>;

impl Parser {
    fn peek(&self) -> &TokenKind {
        &self.tokens[self.pos].kind
    }

    fn peek_at(&self, offset: usize) -> &TokenKind {
        let idx = (self.pos + offset).min(self.tokens.len() - 1);
        &self.tokens[idx].kind
    }

    fn span(&self) -> SourceSpan {
        let t = &self.tokens[self.pos];
        SourceSpan::new(t.line, t.col)
    }

    fn advance(&mut self) -> TokenKind {
        let kind = self.tokens[self.pos].kind.clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        kind
    }

    fn check(&self, kind: &TokenKind) -> bool {
        self.peek() == kind
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind) -> PResult<()> {
        if self.eat(kind) {
            Ok(())
        } else {
            Err(HostError::syntax(format!("expected {kind:?}, found {:?}", self.peek()), self.span()))
        }
    }

    fn expect_name(&mut self) -> PResult<String> {
        match self.peek().clone() {
            TokenKind::Name(n) => {
                self.advance();
                Ok(n)
            }
            other => Err(HostError::syntax(format!("expected identifier, found {other:?}"), self.span())),
        }
    }

    fn at_newline_like(&self) -> bool {
        matches!(self.peek(), TokenKind::Newline | TokenKind::Eof | TokenKind::Semi)
    }

    fn skip_newlines(&mut self) {
        while matches!(self.peek(), TokenKind::Newline) {
            self.advance();
        }
    }

    // ---- module / block structure -----------------------------------

    fn parse_module(&mut self) -> PResult<Vec<Stmt>> {
        let mut stmts = Vec::new();
        self.skip_newlines();
        while !matches!(self.peek(), TokenKind::Eof) {
            stmts.push(self.parse_statement()?);
            self.skip_newlines();
        }
        Ok(stmts)
    }

    fn parse_block(&mut self) -> PResult<Vec<Stmt>> {
        self.expect(&TokenKind::Colon)?;
        if self.eat(&TokenKind::Newline) {
            self.skip_newlines();
            self.expect(&TokenKind::Indent)?;
            let mut stmts = Vec::new();
            self.skip_newlines();
            while !matches!(self.peek(), TokenKind::Dedent | TokenKind::Eof) {
                stmts.push(self.parse_statement()?);
                self.skip_newlines();
            }
            self.expect(&TokenKind::Dedent)?;
            Ok(stmts)
        } else {
            // Simple statement(s) on the same line as the colon.
            let mut stmts = vec![self.parse_simple_statement()?];
            while self.eat(&TokenKind::Semi) && !self.at_newline_like() {
                stmts.push(self.parse_simple_statement()?);
            }
            self.eat(&TokenKind::Newline);
            Ok(stmts)
        }
    }

    // ---- statements ----------------------------------------------------

    fn parse_statement(&mut self) -> PResult<Stmt> {
        let line = self.span().line;
        let stmt = match self.peek() {
            TokenKind::If => return self.parse_if(),
            TokenKind::While => return self.parse_while(),
            TokenKind::For => return self.parse_for(),
            TokenKind::Try => return self.parse_try(),
            TokenKind::With => return self.parse_with(),
            TokenKind::Def => return self.parse_funcdef(Vec::new()),
            TokenKind::Class => return self.parse_classdef(Vec::new()),
            TokenKind::At => return self.parse_decorated(),
            TokenKind::Async => return self.parse_async(),
            TokenKind::Name(n) if n == "match" && self.looks_like_match() => return self.parse_match(),
            _ => {
                let s = self.parse_simple_statement()?;
                self.consume_simple_terminator()?;
                s
            }
        };
        let _ = line;
        Ok(stmt)
    }

    fn consume_simple_terminator(&mut self) -> PResult<()> {
        while self.eat(&TokenKind::Semi) {
            if self.at_newline_like() {
                break;
            }
        }
        if !matches!(self.peek(), TokenKind::Eof) {
            self.eat(&TokenKind::Newline);
        }
        Ok(())
    }

    fn looks_like_match(&self) -> bool {
        // `match` is a soft keyword: treat as statement only when followed by
        // an expression and a trailing `:` before a Newline+Indent, not `(`
        // immediately meaning a call/assignment target like `match(x)`.
        !matches!(self.peek_at(1), TokenKind::Eq | TokenKind::Dot | TokenKind::LParen)
    }

    fn parse_async(&mut self) -> PResult<Stmt> {
        self.advance();
        match self.peek() {
            TokenKind::Def => self.parse_funcdef(Vec::new()),
            TokenKind::For => self.parse_for(),
            TokenKind::With => self.parse_with(),
            other => Err(HostError::syntax(format!("unexpected token after async: {other:?}"), self.span())),
        }
    }

    fn parse_decorated(&mut self) -> PResult<Stmt> {
        let mut decorators = Vec::new();
        while self.eat(&TokenKind::At) {
            decorators.push(self.parse_expr()?);
            self.eat(&TokenKind::Newline);
        }
        match self.peek() {
            TokenKind::Def => self.parse_funcdef(decorators),
            TokenKind::Class => self.parse_classdef(decorators),
            TokenKind::Async => {
                self.advance();
                self.parse_funcdef(decorators)
            }
            other => Err(HostError::syntax(format!("expected def/class after decorator, found {other:?}"), self.span())),
        }
    }

    fn parse_simple_statement(&mut self) -> PResult<Stmt> {
        match self.peek().clone() {
            TokenKind::Pass => {
                self.advance();
                Ok(Stmt::Pass)
            }
            TokenKind::Break => {
                self.advance();
                Ok(Stmt::Break)
            }
            TokenKind::Continue => {
                self.advance();
                Ok(Stmt::Continue)
            }
            TokenKind::Return => {
                self.advance();
                let value = if self.at_newline_like() { None } else { Some(self.parse_expr_list_as_expr()?) };
                Ok(Stmt::Return(value))
            }
            TokenKind::Del => {
                self.advance();
                let mut targets = vec![self.parse_expr()?];
                while self.eat(&TokenKind::Comma) {
                    if self.at_newline_like() {
                        break;
                    }
                    targets.push(self.parse_expr()?);
                }
                Ok(Stmt::Delete(targets))
            }
            TokenKind::Global => {
                self.advance();
                Ok(Stmt::Global(self.parse_name_list()?))
            }
            TokenKind::Nonlocal => {
                self.advance();
                Ok(Stmt::Nonlocal(self.parse_name_list()?))
            }
            TokenKind::Assert => {
                self.advance();
                let test = self.parse_ternary()?;
                let msg = if self.eat(&TokenKind::Comma) { Some(self.parse_ternary()?) } else { None };
                Ok(Stmt::Assert { test, msg })
            }
            TokenKind::Raise => {
                self.advance();
                if self.at_newline_like() {
                    return Ok(Stmt::Raise { exc: None, cause: None });
                }
                let exc = self.parse_ternary()?;
                let cause = if self.eat(&TokenKind::From) { Some(self.parse_ternary()?) } else { None };
                Ok(Stmt::Raise { exc: Some(exc), cause })
            }
            TokenKind::Import => self.parse_import(),
            TokenKind::From => self.parse_import_from(),
            _ => self.parse_expr_or_assign_statement(),
        }
    }

    fn parse_name_list(&mut self) -> PResult<Vec<String>> {
        let mut names = vec![self.expect_name()?];
        while self.eat(&TokenKind::Comma) {
            names.push(self.expect_name()?);
        }
        Ok(names)
    }

    fn parse_import(&mut self) -> PResult<Stmt> {
        self.advance();
        let mut names = Vec::new();
        loop {
            let mut module = self.expect_name()?;
            while self.eat(&TokenKind::Dot) {
                module.push('.');
                module.push_str(&self.expect_name()?);
            }
            let alias = if self.eat(&TokenKind::As) { Some(self.expect_name()?) } else { None };
            names.push((module, alias));
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        Ok(Stmt::Import { names })
    }

    fn parse_import_from(&mut self) -> PResult<Stmt> {
        self.advance();
        let mut module = String::new();
        while self.eat(&TokenKind::Dot) {
            module.push('.');
        }
        if !matches!(self.peek(), TokenKind::Import) {
            module.push_str(&self.expect_name()?);
            while self.eat(&TokenKind::Dot) {
                module.push('.');
                module.push_str(&self.expect_name()?);
            }
        }
        self.expect(&TokenKind::Import)?;
        let mut names = Vec::new();
        if self.eat(&TokenKind::Star) {
            names.push(("*".to_string(), None));
        } else {
            let parens = self.eat(&TokenKind::LParen);
            loop {
                let name = self.expect_name()?;
                let alias = if self.eat(&TokenKind::As) { Some(self.expect_name()?) } else { None };
                names.push((name, alias));
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
                if parens && matches!(self.peek(), TokenKind::RParen) {
                    break;
                }
            }
            if parens {
                self.expect(&TokenKind::RParen)?;
            }
        }
        Ok(Stmt::ImportFrom { module, names })
    }

    fn parse_expr_or_assign_statement(&mut self) -> PResult<Stmt> {
        let first = self.parse_expr_list_as_expr()?;
        if let Some(op) = self.try_aug_op() {
            self.advance();
            let value = self.parse_expr_list_as_expr()?;
            return Ok(Stmt::AugAssign { target: first, op, value });
        }
        if self.eat(&TokenKind::Colon) {
            let annotation = self.parse_expr()?;
            let value = if self.eat(&TokenKind::Eq) { Some(self.parse_expr_list_as_expr()?) } else { None };
            return Ok(Stmt::AnnAssign { target: first, annotation, value });
        }
        if self.eat(&TokenKind::Eq) {
            let mut targets = vec![first];
            let mut value = self.parse_expr_list_as_expr()?;
            while self.eat(&TokenKind::Eq) {
                targets.push(value);
                value = self.parse_expr_list_as_expr()?;
            }
            return Ok(Stmt::Assign { targets, value });
        }
        Ok(Stmt::Expr(first))
    }

    fn try_aug_op(&self) -> Option<AugOp> {
        use TokenKind::*;
        Some(match self.peek() {
            PlusEq => AugOp::Add,
            MinusEq => AugOp::Sub,
            StarEq => AugOp::Mul,
            SlashEq => AugOp::Div,
            DoubleSlashEq => AugOp::FloorDiv,
            PercentEq => AugOp::Mod,
            DoubleStarEq => AugOp::Pow,
            AtEq => AugOp::MatMul,
            LShiftEq => AugOp::LShift,
            RShiftEq => AugOp::RShift,
            AmperEq => AugOp::BitAnd,
            PipeEq => AugOp::BitOr,
            CaretEq => AugOp::BitXor,
            _ => return None,
        })
    }

    /// Parses a comma-separated expression list, collapsing to a bare `Expr`
    /// when there is no trailing comma, else a `Tuple` (Python's implicit
    /// tuple display for `a, b = 1, 2` and `return a, b`).
    fn parse_expr_list_as_expr(&mut self) -> PResult<Expr> {
        let first = self.parse_star_or_expr()?;
        if !matches!(self.peek(), TokenKind::Comma) {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat(&TokenKind::Comma) {
            if self.at_newline_like() || matches!(self.peek(), TokenKind::Eq | TokenKind::Colon) {
                break;
            }
            items.push(self.parse_star_or_expr()?);
        }
        Ok(Expr::Tuple(items))
    }

    fn parse_star_or_expr(&mut self) -> PResult<Expr> {
        if self.eat(&TokenKind::Star) {
            return Ok(Expr::Starred(Box::new(self.parse_ternary()?)));
        }
        self.parse_expr()
    }

    fn parse_if(&mut self) -> PResult<Stmt> {
        self.advance();
        let test = self.parse_ternary()?;
        let body = self.parse_block()?;
        let orelse = if self.eat(&TokenKind::Elif) {
            self.pos -= 1; // re-show Elif as If for recursive reuse
            let saved = self.tokens[self.pos].clone();
            self.tokens[self.pos] = Token { kind: TokenKind::If, ..saved };
            vec![self.parse_if()?]
        } else if self.eat(&TokenKind::Else) {
            self.parse_block()?
        } else {
            Vec::new()
        };
        Ok(Stmt::If { test, body, orelse })
    }

    fn parse_while(&mut self) -> PResult<Stmt> {
        self.advance();
        let test = self.parse_ternary()?;
        let body = self.parse_block()?;
        let orelse = if self.eat(&TokenKind::Else) { self.parse_block()? } else { Vec::new() };
        Ok(Stmt::While { test, body, orelse })
    }

    fn parse_for(&mut self) -> PResult<Stmt> {
        self.advance();
        let target = self.parse_target_list()?;
        self.expect(&TokenKind::In)?;
        let iter = self.parse_expr_list_as_expr()?;
        let body = self.parse_block()?;
        let orelse = if self.eat(&TokenKind::Else) { self.parse_block()? } else { Vec::new() };
        Ok(Stmt::For { target, iter, body, orelse })
    }

    fn parse_target_list(&mut self) -> PResult<Expr> {
        let first = self.parse_star_or_expr()?;
        if !matches!(self.peek(), TokenKind::Comma) {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat(&TokenKind::Comma) {
            if matches!(self.peek(), TokenKind::In) {
                break;
            }
            items.push(self.parse_star_or_expr()?);
        }
        Ok(Expr::Tuple(items))
    }

    fn parse_try(&mut self) -> PResult<Stmt> {
        self.advance();
        let body = self.parse_block()?;
        let mut handlers = Vec::new();
        while self.eat(&TokenKind::Except) {
            self.eat(&TokenKind::Star); // except* (exception groups) parses like except
            let mut types = Vec::new();
            let mut name = None;
            if !matches!(self.peek(), TokenKind::Colon) {
                types.push(self.parse_ternary()?);
                while self.eat(&TokenKind::Comma) {
                    types.push(self.parse_ternary()?);
                }
                if self.eat(&TokenKind::As) {
                    name = Some(self.expect_name()?);
                }
            }
            let handler_body = self.parse_block()?;
            handlers.push(ExceptHandler { types, name, body: handler_body });
        }
        let orelse = if self.eat(&TokenKind::Else) { self.parse_block()? } else { Vec::new() };
        let finally = if self.eat(&TokenKind::Finally) { self.parse_block()? } else { Vec::new() };
        Ok(Stmt::Try { body, handlers, orelse, finally })
    }

    fn parse_with(&mut self) -> PResult<Stmt> {
        self.advance();
        let parens = self.eat(&TokenKind::LParen);
        let mut items = Vec::new();
        loop {
            let context_expr = self.parse_ternary()?;
            let optional_vars = if self.eat(&TokenKind::As) { Some(self.parse_target_atom()?) } else { None };
            items.push(WithItem { context_expr, optional_vars });
            if !self.eat(&TokenKind::Comma) {
                break;
            }
            if parens && matches!(self.peek(), TokenKind::RParen) {
                break;
            }
        }
        if parens {
            self.expect(&TokenKind::RParen)?;
        }
        let body = self.parse_block()?;
        Ok(Stmt::With { items, body })
    }

    fn parse_target_atom(&mut self) -> PResult<Expr> {
        self.parse_postfix()
    }

    fn parse_funcdef(&mut self, decorators: Vec<Expr>) -> PResult<Stmt> {
        self.advance(); // `def`
        let name = self.expect_name()?;
        self.expect(&TokenKind::LParen)?;
        let params = self.parse_params(&TokenKind::RParen)?;
        self.expect(&TokenKind::RParen)?;
        if self.eat(&TokenKind::Arrow) {
            self.parse_ternary()?; // return annotation, not modeled further
        }
        let body = self.parse_block()?;
        let is_generator = stmts_contain_yield(&body);
        Ok(Stmt::FunctionDef(FunctionDef {
            name,
            params,
            body: std::sync::Arc::new(body),
            decorators,
            is_generator,
        }))
    }

    fn parse_params(&mut self, end: &TokenKind) -> PResult<Params> {
        let mut params = Params::default();
        let mut seen_star = false;
        while !self.check(end) {
            if self.eat(&TokenKind::Star) {
                if matches!(self.peek(), TokenKind::Comma) || self.check(end) {
                    seen_star = true;
                } else {
                    params.star_args = Some(self.expect_name()?);
                    seen_star = true;
                }
            } else if self.eat(&TokenKind::DoubleStar) {
                params.star_kwargs = Some(self.expect_name()?);
            } else if matches!(self.peek(), TokenKind::Slash) {
                self.advance(); // positional-only marker, not tracked separately
            } else {
                let name = self.expect_name()?;
                let annotation = if self.eat(&TokenKind::Colon) { Some(self.parse_ternary()?) } else { None };
                let default = if self.eat(&TokenKind::Eq) { Some(self.parse_ternary()?) } else { None };
                let param = Param { name, default, annotation };
                if seen_star {
                    params.kwonly.push(param);
                } else {
                    params.positional.push(param);
                }
            }
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        Ok(params)
    }

    fn parse_classdef(&mut self, decorators: Vec<Expr>) -> PResult<Stmt> {
        self.advance(); // `class`
        let name = self.expect_name()?;
        let mut bases = Vec::new();
        let mut keywords = Vec::new();
        if self.eat(&TokenKind::LParen) {
            while !self.check(&TokenKind::RParen) {
                if let TokenKind::Name(n) = self.peek().clone() {
                    if matches!(self.peek_at(1), TokenKind::Eq) {
                        self.advance();
                        self.advance();
                        keywords.push((Some(n), self.parse_ternary()?));
                        if !self.eat(&TokenKind::Comma) {
                            break;
                        }
                        continue;
                    }
                }
                bases.push(self.parse_ternary()?);
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
            self.expect(&TokenKind::RParen)?;
        }
        let body = self.parse_block()?;
        Ok(Stmt::ClassDef(ClassDef { name, bases, keywords, body, decorators }))
    }

    fn parse_match(&mut self) -> PResult<Stmt> {
        self.advance(); // `match` (soft keyword, consumed as Name)
        let subject = self.parse_expr_list_as_expr()?;
        self.expect(&TokenKind::Colon)?;
        self.expect(&TokenKind::Newline)?;
        self.skip_newlines();
        self.expect(&TokenKind::Indent)?;
        let mut cases = Vec::new();
        self.skip_newlines();
        while let TokenKind::Name(n) = self.peek().clone() {
            if n != "case" {
                break;
            }
            self.advance();
            let pattern = self.parse_pattern()?;
            let guard = if self.eat(&TokenKind::If) { Some(self.parse_ternary()?) } else { None };
            let body = self.parse_block()?;
            cases.push(MatchCase { pattern, guard, body });
            self.skip_newlines();
        }
        self.expect(&TokenKind::Dedent)?;
        Ok(Stmt::Match { subject, cases })
    }

    fn parse_pattern(&mut self) -> PResult<Pattern> {
        let first = self.parse_or_pattern()?;
        if self.eat(&TokenKind::As) {
            let name = self.expect_name()?;
            return Ok(Pattern::As { pattern: Box::new(first), name });
        }
        Ok(first)
    }

    fn parse_or_pattern(&mut self) -> PResult<Pattern> {
        let first = self.parse_closed_pattern()?;
        if !matches!(self.peek(), TokenKind::Pipe) {
            return Ok(first);
        }
        let mut alts = vec![first];
        while self.eat(&TokenKind::Pipe) {
            alts.push(self.parse_closed_pattern()?);
        }
        Ok(Pattern::Or(alts))
    }

    fn parse_closed_pattern(&mut self) -> PResult<Pattern> {
        match self.peek().clone() {
            TokenKind::Name(n) if n == "_" => {
                self.advance();
                Ok(Pattern::Wildcard)
            }
            TokenKind::Star => {
                self.advance();
                if let TokenKind::Name(n) = self.peek().clone() {
                    self.advance();
                    if n == "_" {
                        return Ok(Pattern::Capture("_".into()));
                    }
                    return Ok(Pattern::Capture(n));
                }
                Ok(Pattern::Wildcard)
            }
            TokenKind::LBracket => {
                self.advance();
                self.parse_sequence_pattern(TokenKind::RBracket)
            }
            TokenKind::LParen => {
                self.advance();
                self.parse_sequence_pattern(TokenKind::RParen)
            }
            TokenKind::LBrace => {
                self.advance();
                self.parse_mapping_pattern()
            }
            TokenKind::Name(n) => {
                // value pattern (`Color.RED`), class pattern, or capture pattern.
                let mut expr = Expr::Name(n);
                self.advance();
                let mut is_dotted = false;
                while self.eat(&TokenKind::Dot) {
                    is_dotted = true;
                    let attr = self.expect_name()?;
                    expr = Expr::Attribute { value: Box::new(expr), attr };
                }
                if self.eat(&TokenKind::LParen) {
                    return self.parse_class_pattern(expr);
                }
                if is_dotted {
                    return Ok(Pattern::Literal(expr));
                }
                if let Expr::Name(name) = expr {
                    Ok(Pattern::Capture(name))
                } else {
                    Ok(Pattern::Literal(expr))
                }
            }
            _ => Ok(Pattern::Literal(self.parse_ternary()?)),
        }
    }

    fn parse_class_pattern(&mut self, name: Expr) -> PResult<Pattern> {
        let mut positional = Vec::new();
        let mut keyword = Vec::new();
        while !self.check(&TokenKind::RParen) {
            if let TokenKind::Name(n) = self.peek().clone() {
                if matches!(self.peek_at(1), TokenKind::Eq) {
                    self.advance();
                    self.advance();
                    keyword.push((n, self.parse_pattern()?));
                    if !self.eat(&TokenKind::Comma) {
                        break;
                    }
                    continue;
                }
            }
            positional.push(self.parse_pattern()?);
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::RParen)?;
        Ok(Pattern::Class { name, positional, keyword })
    }

    fn parse_sequence_pattern(&mut self, end: TokenKind) -> PResult<Pattern> {
        let mut prefix = Vec::new();
        let mut rest = None;
        let mut suffix = Vec::new();
        while !self.check(&end) {
            if self.eat(&TokenKind::Star) {
                let captured = if let TokenKind::Name(n) = self.peek().clone() {
                    self.advance();
                    if n == "_" { None } else { Some(n) }
                } else {
                    None
                };
                rest = Some(captured);
            } else {
                let pat = self.parse_pattern()?;
                if rest.is_none() {
                    prefix.push(pat);
                } else {
                    suffix.push(pat);
                }
            }
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&end)?;
        Ok(Pattern::Sequence { prefix, rest, suffix })
    }

    fn parse_mapping_pattern(&mut self) -> PResult<Pattern> {
        let mut keys = Vec::new();
        let mut patterns = Vec::new();
        let mut rest = None;
        while !self.check(&TokenKind::RBrace) {
            if self.eat(&TokenKind::DoubleStar) {
                rest = Some(self.expect_name()?);
            } else {
                let key = self.parse_ternary()?;
                self.expect(&TokenKind::Colon)?;
                let pat = self.parse_pattern()?;
                keys.push(key);
                patterns.push(pat);
            }
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::RBrace)?;
        Ok(Pattern::Mapping { keys, patterns, rest })
    }

    // ---- expressions ----------------------------------------------------

    fn parse_expr(&mut self) -> PResult<Expr> {
        if matches!(self.peek(), TokenKind::Yield) {
            return self.parse_yield();
        }
        if matches!(self.peek(), TokenKind::Lambda) {
            return self.parse_lambda();
        }
        let expr = self.parse_ternary()?;
        if self.eat(&TokenKind::ColonEq) {
            if let Expr::Name(name) = expr {
                let value = Box::new(self.parse_expr()?);
                return Ok(Expr::NamedExpr { target: name, value });
            }
            return Err(HostError::syntax("invalid assignment target for walrus operator", self.span()));
        }
        Ok(expr)
    }

    fn parse_yield(&mut self) -> PResult<Expr> {
        self.advance();
        if self.eat(&TokenKind::From) {
            return Ok(Expr::YieldFrom(Box::new(self.parse_ternary()?)));
        }
        if self.at_newline_like() || matches!(self.peek(), TokenKind::RParen | TokenKind::RBracket | TokenKind::RBrace) {
            return Ok(Expr::Yield(None));
        }
        Ok(Expr::Yield(Some(Box::new(self.parse_expr_list_as_expr()?))))
    }

    fn parse_lambda(&mut self) -> PResult<Expr> {
        self.advance();
        let params = self.parse_params(&TokenKind::Colon)?;
        self.expect(&TokenKind::Colon)?;
        let body = Box::new(self.parse_expr()?);
        Ok(Expr::Lambda { params, body })
    }

    fn parse_ternary(&mut self) -> PResult<Expr> {
        let body = self.parse_or_test()?;
        if self.eat(&TokenKind::If) {
            let test = self.parse_or_test()?;
            self.expect(&TokenKind::Else)?;
            let orelse = self.parse_ternary()?;
            return Ok(Expr::IfExp { test: Box::new(test), body: Box::new(body), orelse: Box::new(orelse) });
        }
        Ok(body)
    }

    fn parse_or_test(&mut self) -> PResult<Expr> {
        let mut values = vec![self.parse_and_test()?];
        let mut saw_or = false;
        while matches!(self.peek(), TokenKind::Or) {
            self.advance();
            saw_or = true;
            values.push(self.parse_and_test()?);
        }
        Ok(if saw_or { Expr::BoolOp { op: BoolOp::Or, values } } else { values.pop().unwrap() })
    }

    fn parse_and_test(&mut self) -> PResult<Expr> {
        let mut values = vec![self.parse_not_test()?];
        let mut saw_and = false;
        while matches!(self.peek(), TokenKind::And) {
            self.advance();
            saw_and = true;
            values.push(self.parse_not_test()?);
        }
        Ok(if saw_and { Expr::BoolOp { op: BoolOp::And, values } } else { values.pop().unwrap() })
    }

    fn parse_not_test(&mut self) -> PResult<Expr> {
        if self.eat(&TokenKind::Not) {
            let operand = Box::new(self.parse_not_test()?);
            return Ok(Expr::UnaryOp { op: UnaryOp::Not, operand });
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> PResult<Expr> {
        let left = self.parse_bitor()?;
        let mut ops = Vec::new();
        let mut comparators = Vec::new();
        loop {
            let op = match self.peek() {
                TokenKind::EqEq => CmpOp::Eq,
                TokenKind::NotEq => CmpOp::NotEq,
                TokenKind::Lt => CmpOp::Lt,
                TokenKind::LtEq => CmpOp::LtEq,
                TokenKind::Gt => CmpOp::Gt,
                TokenKind::GtEq => CmpOp::GtEq,
                TokenKind::In => CmpOp::In,
                TokenKind::Is => {
                    self.advance();
                    if self.eat(&TokenKind::Not) {
                        ops.push(CmpOp::IsNot);
                    } else {
                        ops.push(CmpOp::Is);
                    }
                    comparators.push(self.parse_bitor()?);
                    continue;
                }
                TokenKind::Not if matches!(self.peek_at(1), TokenKind::In) => {
                    self.advance();
                    self.advance();
                    ops.push(CmpOp::NotIn);
                    comparators.push(self.parse_bitor()?);
                    continue;
                }
                _ => break,
            };
            self.advance();
            ops.push(op);
            comparators.push(self.parse_bitor()?);
        }
        if ops.is_empty() {
            Ok(left)
        } else {
            Ok(Expr::Compare { left: Box::new(left), ops, comparators })
        }
    }

    fn parse_bitor(&mut self) -> PResult<Expr> {
        let mut left = self.parse_bitxor()?;
        while matches!(self.peek(), TokenKind::Pipe) {
            self.advance();
            let right = self.parse_bitxor()?;
            left = Expr::BinOp { op: BinOp::BitOr, left: Box::new(left), right: Box::new(right) };
        }
        Ok(left)
    }

    fn parse_bitxor(&mut self) -> PResult<Expr> {
        let mut left = self.parse_bitand()?;
        while matches!(self.peek(), TokenKind::Caret) {
            self.advance();
            let right = self.parse_bitand()?;
            left = Expr::BinOp { op: BinOp::BitXor, left: Box::new(left), right: Box::new(right) };
        }
        Ok(left)
    }

    fn parse_bitand(&mut self) -> PResult<Expr> {
        let mut left = self.parse_shift()?;
        while matches!(self.peek(), TokenKind::Amper) {
            self.advance();
            let right = self.parse_shift()?;
            left = Expr::BinOp { op: BinOp::BitAnd, left: Box::new(left), right: Box::new(right) };
        }
        Ok(left)
    }

    fn parse_shift(&mut self) -> PResult<Expr> {
        let mut left = self.parse_arith()?;
        loop {
            let op = match self.peek() {
                TokenKind::LShift => BinOp::LShift,
                TokenKind::RShift => BinOp::RShift,
                _ => break,
            };
            self.advance();
            let right = self.parse_arith()?;
            left = Expr::BinOp { op, left: Box::new(left), right: Box::new(right) };
        }
        Ok(left)
    }

    fn parse_arith(&mut self) -> PResult<Expr> {
        let mut left = self.parse_term()?;
        loop {
            let op = match self.peek() {
                TokenKind::Plus => BinOp::Add,
                TokenKind::Minus => BinOp::Sub,
                _ => break,
            };
            self.advance();
            let right = self.parse_term()?;
            left = Expr::BinOp { op, left: Box::new(left), right: Box::new(right) };
        }
        Ok(left)
    }

    fn parse_term(&mut self) -> PResult<Expr> {
        let mut left = self.parse_factor()?;
        loop {
            let op = match self.peek() {
                TokenKind::Star => BinOp::Mul,
                TokenKind::Slash => BinOp::Div,
                TokenKind::DoubleSlash => BinOp::FloorDiv,
                TokenKind::Percent => BinOp::Mod,
                TokenKind::At => BinOp::MatMul,
                _ => break,
            };
            self.advance();
            let right = self.parse_factor()?;
            left = Expr::BinOp { op, left: Box::new(left), right: Box::new(right) };
        }
        Ok(left)
    }

    fn parse_factor(&mut self) -> PResult<Expr> {
        let op = match self.peek() {
            TokenKind::Plus => Some(UnaryOp::Pos),
            TokenKind::Minus => Some(UnaryOp::Neg),
            TokenKind::Tilde => Some(UnaryOp::Invert),
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            let operand = Box::new(self.parse_factor()?);
            return Ok(Expr::UnaryOp { op, operand });
        }
        self.parse_power()
    }

    fn parse_power(&mut self) -> PResult<Expr> {
        let base = self.parse_await_expr()?;
        if self.eat(&TokenKind::DoubleStar) {
            let exponent = Box::new(self.parse_factor()?);
            return Ok(Expr::BinOp { op: BinOp::Pow, left: Box::new(base), right: exponent });
        }
        Ok(base)
    }

    fn parse_await_expr(&mut self) -> PResult<Expr> {
        if self.eat(&TokenKind::Await) {
            return Ok(Expr::Await(Box::new(self.parse_postfix()?)));
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> PResult<Expr> {
        let mut expr = self.parse_atom()?;
        loop {
            match self.peek() {
                TokenKind::Dot => {
                    self.advance();
                    let attr = self.expect_name()?;
                    expr = Expr::Attribute { value: Box::new(expr), attr };
                }
                TokenKind::LParen => {
                    self.advance();
                    let (args, keywords) = self.parse_call_args()?;
                    self.expect(&TokenKind::RParen)?;
                    expr = Expr::Call { func: Box::new(expr), args, keywords };
                }
                TokenKind::LBracket => {
                    self.advance();
                    let index = self.parse_subscript()?;
                    self.expect(&TokenKind::RBracket)?;
                    expr = Expr::Subscript { value: Box::new(expr), index: Box::new(index) };
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn parse_call_args(&mut self) -> PResult<(Vec<Expr>, Vec<(Option<String>, Expr)>)> {
        let mut args = Vec::new();
        let mut keywords = Vec::new();
        while !self.check(&TokenKind::RParen) {
            if self.eat(&TokenKind::DoubleStar) {
                keywords.push((None, self.parse_ternary()?));
            } else if self.eat(&TokenKind::Star) {
                args.push(Expr::Starred(Box::new(self.parse_ternary()?)));
            } else if let TokenKind::Name(n) = self.peek().clone() {
                if matches!(self.peek_at(1), TokenKind::Eq) {
                    self.advance();
                    self.advance();
                    keywords.push((Some(n), self.parse_ternary()?));
                } else {
                    args.push(self.parse_expr_or_genexp()?);
                }
            } else {
                args.push(self.parse_expr_or_genexp()?);
            }
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        Ok((args, keywords))
    }

    /// A bare call argument may itself be a generator expression: `sum(x for x in xs)`.
    fn parse_expr_or_genexp(&mut self) -> PResult<Expr> {
        let element = self.parse_ternary()?;
        if matches!(self.peek(), TokenKind::For) {
            let generators = self.parse_comprehensions()?;
            return Ok(Expr::GeneratorExp { element: Box::new(element), generators });
        }
        Ok(element)
    }

    fn parse_subscript(&mut self) -> PResult<Expr> {
        // Supports `a[i]`, `a[i:j]`, `a[i:j:k]`, and `a[i, j]` (tuple index).
        let mut parts = Vec::new();
        loop {
            parts.push(self.parse_slice_item()?);
            if !self.eat(&TokenKind::Comma) || self.check(&TokenKind::RBracket) {
                break;
            }
        }
        if parts.len() == 1 {
            Ok(parts.pop().unwrap())
        } else {
            Ok(Expr::Tuple(parts))
        }
    }

    fn parse_slice_item(&mut self) -> PResult<Expr> {
        let lower = if matches!(self.peek(), TokenKind::Colon) { None } else { Some(Box::new(self.parse_ternary()?)) };
        if !self.eat(&TokenKind::Colon) {
            return Ok(*lower.unwrap());
        }
        let upper = if matches!(self.peek(), TokenKind::Colon | TokenKind::RBracket | TokenKind::Comma) {
            None
        } else {
            Some(Box::new(self.parse_ternary()?))
        };
        let step = if self.eat(&TokenKind::Colon) {
            if matches!(self.peek(), TokenKind::RBracket | TokenKind::Comma) { None } else { Some(Box::new(self.parse_ternary()?)) }
        } else {
            None
        };
        Ok(Expr::Slice { lower, upper, step })
    }

    fn parse_comprehensions(&mut self) -> PResult<Vec<Comprehension>> {
        let mut generators = Vec::new();
        while matches!(self.peek(), TokenKind::For) || matches!(self.peek(), TokenKind::Async) {
            let is_async = self.eat(&TokenKind::Async);
            self.expect(&TokenKind::For)?;
            let target = self.parse_target_list()?;
            self.expect(&TokenKind::In)?;
            let iter = self.parse_or_test()?;
            let mut ifs = Vec::new();
            while self.eat(&TokenKind::If) {
                ifs.push(self.parse_or_test()?);
            }
            generators.push(Comprehension { target, iter, ifs, is_async });
        }
        Ok(generators)
    }

    fn parse_atom(&mut self) -> PResult<Expr> {
        match self.peek().clone() {
            TokenKind::None => {
                self.advance();
                Ok(Expr::None)
            }
            TokenKind::True => {
                self.advance();
                Ok(Expr::Bool(true))
            }
            TokenKind::False => {
                self.advance();
                Ok(Expr::Bool(false))
            }
            TokenKind::Ellipsis => {
                self.advance();
                Ok(Expr::Ellipsis)
            }
            TokenKind::Int(raw) => {
                self.advance();
                Ok(Expr::Int(raw))
            }
            TokenKind::Float(f) => {
                self.advance();
                Ok(Expr::Float(f))
            }
            TokenKind::Str { value, is_bytes, .. } => {
                self.advance();
                let mut combined = value;
                // Adjacent string literal concatenation: `"a" "b"` == `"ab"`.
                while let TokenKind::Str { value, .. } = self.peek().clone() {
                    self.advance();
                    combined.push_str(&value);
                }
                if is_bytes {
                    Ok(Expr::Bytes(combined.into_bytes()))
                } else {
                    Ok(Expr::Str(combined))
                }
            }
            TokenKind::FString(parts) => {
                self.advance();
                let converted = parts
                    .into_iter()
                    .map(|p| self.convert_fstring_part(p))
                    .collect::<PResult<Vec<_>>>()?;
                Ok(Expr::FString(converted))
            }
            TokenKind::Name(n) => {
                self.advance();
                Ok(Expr::Name(n))
            }
            TokenKind::LParen => {
                self.advance();
                if self.eat(&TokenKind::RParen) {
                    return Ok(Expr::Tuple(Vec::new()));
                }
                let first = self.parse_star_or_expr()?;
                if matches!(self.peek(), TokenKind::For) {
                    let generators = self.parse_comprehensions()?;
                    self.expect(&TokenKind::RParen)?;
                    return Ok(Expr::GeneratorExp { element: Box::new(first), generators });
                }
                if matches!(self.peek(), TokenKind::Comma) {
                    let mut items = vec![first];
                    while self.eat(&TokenKind::Comma) {
                        if self.check(&TokenKind::RParen) {
                            break;
                        }
                        items.push(self.parse_star_or_expr()?);
                    }
                    self.expect(&TokenKind::RParen)?;
                    return Ok(Expr::Tuple(items));
                }
                self.expect(&TokenKind::RParen)?;
                Ok(first)
            }
            TokenKind::LBracket => {
                self.advance();
                if self.eat(&TokenKind::RBracket) {
                    return Ok(Expr::List(Vec::new()));
                }
                let first = self.parse_star_or_expr()?;
                if matches!(self.peek(), TokenKind::For) {
                    let generators = self.parse_comprehensions()?;
                    self.expect(&TokenKind::RBracket)?;
                    return Ok(Expr::ListComp { element: Box::new(first), generators });
                }
                let mut items = vec![first];
                while self.eat(&TokenKind::Comma) {
                    if self.check(&TokenKind::RBracket) {
                        break;
                    }
                    items.push(self.parse_star_or_expr()?);
                }
                self.expect(&TokenKind::RBracket)?;
                Ok(Expr::List(items))
            }
            TokenKind::LBrace => self.parse_dict_or_set(),
            other => Err(HostError::syntax(format!("unexpected token {other:?}"), self.span())),
        }
    }

    fn convert_fstring_part(&self, part: crate::lexer::token::FStringPart) -> PResult<StringPart> {
        use crate::lexer::token::FStringPart as RawPart;
        match part {
            RawPart::Literal(s) => Ok(StringPart::Literal(s)),
            RawPart::Expr { source, conversion, format_spec } => {
                let tokens = crate::lexer::Lexer::new(&source)
                    .tokenize()
                    .map_err(|e| HostError::syntax(format!("invalid f-string expression: {e}"), self.span()))?;
                let mut sub = Parser { tokens, pos: 0 };
                let expr = sub.parse_expr_list_as_expr()?;
                let format_spec = match format_spec {
                    Some(spec) => Some(vec![StringPart::Literal(spec)]),
                    None => None,
                };
                Ok(StringPart::Expr { expr: Box::new(expr), conversion, format_spec })
            }
        }
    }

    fn parse_dict_or_set(&mut self) -> PResult<Expr> {
        self.advance(); // `{`
        if self.eat(&TokenKind::RBrace) {
            return Ok(Expr::Dict(Vec::new()));
        }
        if self.eat(&TokenKind::DoubleStar) {
            let value = self.parse_or_test()?;
            let mut pairs = vec![(None, value)];
            while self.eat(&TokenKind::Comma) {
                if self.check(&TokenKind::RBrace) {
                    break;
                }
                pairs.push(self.parse_dict_pair()?);
            }
            self.expect(&TokenKind::RBrace)?;
            return Ok(Expr::Dict(pairs));
        }
        let first = self.parse_star_or_expr()?;
        if self.eat(&TokenKind::Colon) {
            let value = self.parse_ternary()?;
            if matches!(self.peek(), TokenKind::For) {
                let generators = self.parse_comprehensions()?;
                self.expect(&TokenKind::RBrace)?;
                return Ok(Expr::DictComp { key: Box::new(first), value: Box::new(value), generators });
            }
            let mut pairs = vec![(Some(first), value)];
            while self.eat(&TokenKind::Comma) {
                if self.check(&TokenKind::RBrace) {
                    break;
                }
                pairs.push(self.parse_dict_pair()?);
            }
            self.expect(&TokenKind::RBrace)?;
            return Ok(Expr::Dict(pairs));
        }
        if matches!(self.peek(), TokenKind::For) {
            let generators = self.parse_comprehensions()?;
            self.expect(&TokenKind::RBrace)?;
            return Ok(Expr::SetComp { element: Box::new(first), generators });
        }
        let mut items = vec![first];
        while self.eat(&TokenKind::Comma) {
            if self.check(&TokenKind::RBrace) {
                break;
            }
            items.push(self.parse_star_or_expr()?);
        }
        self.expect(&TokenKind::RBrace)?;
        Ok(Expr::SetLit(items))
    }

    fn parse_dict_pair(&mut self) -> PResult<(Option<Expr>, Expr)> {
        if self.eat(&TokenKind::DoubleStar) {
            return Ok((None, self.parse_or_test()?));
        }
        let key = self.parse_ternary()?;
        self.expect(&TokenKind::Colon)?;
        let value = self.parse_ternary()?;
        Ok((Some(key), value))
    }
}

/// Shallow scan for a `yield`/`yield from` anywhere in a function body not
/// nested inside a closer `def` (a nested function's own yields don't make
/// the outer function a generator).
fn stmts_contain_yield(stmts: &[Stmt]) -> bool {
    stmts.iter().any(stmt_contains_yield)
}

fn stmt_contains_yield(stmt: &Stmt) -> bool {
    match stmt {
        Stmt::Expr(e) | Stmt::Return(Some(e)) => expr_contains_yield(e),
        Stmt::Assign { value, .. } => expr_contains_yield(value),
        Stmt::AugAssign { value, .. } => expr_contains_yield(value),
        Stmt::AnnAssign { value: Some(v), .. } => expr_contains_yield(v),
        Stmt::If { test, body, orelse } => expr_contains_yield(test) || stmts_contain_yield(body) || stmts_contain_yield(orelse),
        Stmt::While { test, body, orelse } => expr_contains_yield(test) || stmts_contain_yield(body) || stmts_contain_yield(orelse),
        Stmt::For { iter, body, orelse, .. } => expr_contains_yield(iter) || stmts_contain_yield(body) || stmts_contain_yield(orelse),
        Stmt::Try { body, handlers, orelse, finally } => {
            stmts_contain_yield(body)
                || handlers.iter().any(|h| stmts_contain_yield(&h.body))
                || stmts_contain_yield(orelse)
                || stmts_contain_yield(finally)
        }
        Stmt::With { body, .. } => stmts_contain_yield(body),
        Stmt::Match { cases, .. } => cases.iter().any(|c| stmts_contain_yield(&c.body)),
        _ => false,
    }
}

fn expr_contains_yield(expr: &Expr) -> bool {
    match expr {
        Expr::Yield(_) | Expr::YieldFrom(_) => true,
        Expr::BinOp { left, right, .. } => expr_contains_yield(left) || expr_contains_yield(right),
        Expr::UnaryOp { operand, .. } => expr_contains_yield(operand),
        Expr::BoolOp { values, .. } => values.iter().any(expr_contains_yield),
        Expr::Compare { left, comparators, .. } => expr_contains_yield(left) || comparators.iter().any(expr_contains_yield),
        Expr::Call { func, args, keywords } => {
            expr_contains_yield(func) || args.iter().any(expr_contains_yield) || keywords.iter().any(|(_, v)| expr_contains_yield(v))
        }
        Expr::IfExp { test, body, orelse } => expr_contains_yield(test) || expr_contains_yield(body) || expr_contains_yield(orelse),
        Expr::Tuple(items) | Expr::List(items) | Expr::SetLit(items) => items.iter().any(expr_contains_yield),
        Expr::Starred(e) | Expr::Await(e) => expr_contains_yield(e),
        _ => false,
    }
}
