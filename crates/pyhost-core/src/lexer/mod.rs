//! Indentation-aware Python tokenizer.
//!
//! Produces a flat `Vec<Token>` terminated by `Eof`. Indentation is tracked
//! with a stack of column widths; bracket depth suppresses `Newline` so
//! multi-line expressions inside `(`/`[`/`{` read as one logical line.

pub mod token;

pub use token::{FStringPart, Token, TokenKind};

use crate::error::{HostError, SourceSpan};

pub struct Lexer<'a> {
    src: &'a [u8],
    chars: Vec<char>,
    pos: usize,
    line: u32,
    col: u32,
    paren_depth: i32,
    indents: Vec<u32>,
    at_line_start: bool,
    pending_dedents: u32,
    tokens: Vec<Token>,
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str) -> Self {
        Lexer {
            src: src.as_bytes(),
            chars: src.chars().collect(),
            pos: 0,
            line: 1,
            col: 1,
            paren_depth: 0,
            indents: vec![0],
            at_line_start: true,
            pending_dedents: 0,
            tokens: Vec::new(),
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, n: usize) -> Option<char> {
        self.chars.get(self.pos + n).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(c)
    }

    fn push(&mut self, kind: TokenKind, line: u32, col: u32) {
        self.tokens.push(Token { kind, line, col });
    }

    pub fn tokenize(mut self) -> Result<Vec<Token>, HostError> {
        while self.pos < self.chars.len() || self.at_line_start {
            if self.at_line_start && self.paren_depth == 0 {
                if self.pos >= self.chars.len() {
                    break;
                }
                self.handle_indentation()?;
                if self.pos >= self.chars.len() {
                    break;
                }
            }
            if self.pos >= self.chars.len() {
                break;
            }
            self.lex_token()?;
        }
        // Final NEWLINE if the last real token wasn't one, then DEDENTs, then EOF.
        if !matches!(self.tokens.last().map(|t| &t.kind), Some(TokenKind::Newline) | None) {
            self.push(TokenKind::Newline, self.line, self.col);
        }
        while self.indents.len() > 1 {
            self.indents.pop();
            self.push(TokenKind::Dedent, self.line, self.col);
        }
        self.push(TokenKind::Eof, self.line, self.col);
        Ok(self.tokens)
    }

    /// Measures leading whitespace on a logical line, skipping blank/comment
    /// lines, and emits `Indent`/`Dedent` tokens as needed.
    fn handle_indentation(&mut self) -> Result<(), HostError> {
        loop {
            let start_line = self.line;
            let mut width = 0u32;
            let mut saw_tab = false;
            let mut saw_space = false;
            loop {
                match self.peek() {
                    Some(' ') => {
                        saw_space = true;
                        width += 1;
                        self.advance();
                    }
                    Some('\t') => {
                        saw_tab = true;
                        width += 8 - (width % 8);
                        self.advance();
                    }
                    _ => break,
                }
            }
            if saw_tab && saw_space {
                return Err(HostError::syntax(
                    "inconsistent use of tabs and spaces in indentation",
                    SourceSpan::new(start_line, 1),
                ));
            }
            match self.peek() {
                None => {
                    self.at_line_start = false;
                    return Ok(());
                }
                Some('\n') => {
                    self.advance();
                    continue;
                }
                Some('#') => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.advance();
                    }
                    continue;
                }
                Some('\r') => {
                    self.advance();
                    continue;
                }
                _ => {}
            }
            let current = *self.indents.last().unwrap();
            if width > current {
                self.indents.push(width);
                self.push(TokenKind::Indent, self.line, 1);
            } else if width < current {
                while *self.indents.last().unwrap() > width {
                    self.indents.pop();
                    self.push(TokenKind::Dedent, self.line, 1);
                }
                if *self.indents.last().unwrap() != width {
                    return Err(HostError::syntax("unindent does not match any outer indentation level", SourceSpan::new(self.line, 1)));
                }
            }
            self.at_line_start = false;
            return Ok(());
        }
    }

    fn lex_token(&mut self) -> Result<(), HostError> {
        // Skip intra-line whitespace.
        while matches!(self.peek(), Some(' ') | Some('\t') | Some('\r')) {
            self.advance();
        }
        let (line, col) = (self.line, self.col);
        let Some(c) = self.peek() else {
            return Ok(());
        };

        if c == '#' {
            while let Some(ch) = self.peek() {
                if ch == '\n' {
                    break;
                }
                self.advance();
            }
            return Ok(());
        }

        if c == '\\' && self.peek_at(1) == Some('\n') {
            self.advance();
            self.advance();
            return Ok(());
        }

        if c == '\n' {
            self.advance();
            if self.paren_depth == 0 {
                if !matches!(
                    self.tokens.last().map(|t| &t.kind),
                    Some(TokenKind::Newline) | Some(TokenKind::Indent) | Some(TokenKind::Dedent) | None
                ) {
                    self.push(TokenKind::Newline, line, col);
                }
                self.at_line_start = true;
            }
            return Ok(());
        }

        if c.is_ascii_digit() || (c == '.' && self.peek_at(1).is_some_and(|d| d.is_ascii_digit())) {
            return self.lex_number(line, col);
        }

        if is_ident_start(c) {
            return self.lex_name_or_string_prefix(line, col);
        }

        if c == '"' || c == '\'' {
            let (value, is_triple) = self.lex_string_body(c)?;
            let _ = is_triple;
            self.push(TokenKind::Str { value, is_bytes: false, is_raw: false }, line, col);
            return Ok(());
        }

        self.lex_operator(line, col)
    }

    fn lex_number(&mut self, line: u32, col: u32) -> Result<(), HostError> {
        let mut text = String::new();
        let mut is_float = false;
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == '_' {
                text.push(c);
                self.advance();
            } else {
                break;
            }
        }
        if self.peek() == Some('.') && !text.to_lowercase().contains('x') {
            is_float = true;
            text.push('.');
            self.advance();
            while let Some(c) = self.peek() {
                if c.is_ascii_digit() || c == '_' {
                    text.push(c);
                    self.advance();
                } else {
                    break;
                }
            }
        }
        if matches!(self.peek(), Some('e') | Some('E')) && !text.to_lowercase().contains('x') {
            let save = self.pos;
            let mut exp = String::new();
            exp.push(self.advance().unwrap());
            if matches!(self.peek(), Some('+') | Some('-')) {
                exp.push(self.advance().unwrap());
            }
            if self.peek().is_some_and(|c| c.is_ascii_digit()) {
                while let Some(c) = self.peek() {
                    if c.is_ascii_digit() {
                        exp.push(c);
                        self.advance();
                    } else {
                        break;
                    }
                }
                text.push_str(&exp);
                is_float = true;
            } else {
                self.pos = save;
            }
        }
        if is_float {
            let clean: String = text.chars().filter(|c| *c != '_').collect();
            let v: f64 = clean.parse().map_err(|_| HostError::syntax(format!("invalid float literal '{text}'"), SourceSpan::new(line, col)))?;
            self.push(TokenKind::Float(v), line, col);
        } else {
            self.push(TokenKind::Int(text), line, col);
        }
        Ok(())
    }

    fn lex_name_or_string_prefix(&mut self, line: u32, col: u32) -> Result<(), HostError> {
        let mut word = String::new();
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' {
                word.push(c);
                self.advance();
            } else {
                break;
            }
        }
        let lower = word.to_lowercase();
        let is_prefix = matches!(lower.as_str(), "r" | "b" | "f" | "rb" | "br" | "fr" | "rf")
            && matches!(self.peek(), Some('"') | Some('\''));
        if is_prefix {
            let is_raw = lower.contains('r');
            let is_bytes = lower.contains('b');
            let is_fstring = lower.contains('f');
            let quote = self.peek().unwrap();
            if is_fstring {
                let parts = self.lex_fstring_body(quote, is_raw)?;
                self.push(TokenKind::FString(parts), line, col);
            } else {
                let (value, _) = self.lex_string_body(quote)?;
                self.push(TokenKind::Str { value, is_bytes, is_raw }, line, col);
            }
            return Ok(());
        }
        if let Some(kw) = token::lookup_keyword(&word) {
            self.push(kw, line, col);
        } else {
            self.push(TokenKind::Name(word), line, col);
        }
        Ok(())
    }

    /// Reads a (possibly triple-quoted) string body starting at the opening
    /// quote character, which must be the current character.
    fn lex_string_body(&mut self, quote: char) -> Result<(String, bool), HostError> {
        let (line, col) = (self.line, self.col);
        self.advance();
        let triple = self.peek() == Some(quote) && self.peek_at(1) == Some(quote);
        if triple {
            self.advance();
            self.advance();
        }
        let mut out = String::new();
        loop {
            match self.peek() {
                None => return Err(HostError::syntax("unterminated string literal", SourceSpan::new(line, col))),
                Some(c) if c == quote => {
                    if triple {
                        if self.peek_at(1) == Some(quote) && self.peek_at(2) == Some(quote) {
                            self.advance();
                            self.advance();
                            self.advance();
                            break;
                        }
                        out.push(c);
                        self.advance();
                    } else {
                        self.advance();
                        break;
                    }
                }
                Some('\\') => {
                    self.advance();
                    if let Some(esc) = self.advance() {
                        out.push_str(&unescape_one(esc, &mut self.chars, &mut self.pos));
                    }
                }
                Some('\n') if !triple => {
                    return Err(HostError::syntax("EOL while scanning string literal", SourceSpan::new(line, col)));
                }
                Some(c) => {
                    out.push(c);
                    self.advance();
                }
            }
        }
        Ok((out, triple))
    }

    fn lex_fstring_body(&mut self, quote: char, is_raw: bool) -> Result<Vec<FStringPart>, HostError> {
        let (line, col) = (self.line, self.col);
        self.advance();
        let triple = self.peek() == Some(quote) && self.peek_at(1) == Some(quote);
        if triple {
            self.advance();
            self.advance();
        }
        let mut parts = Vec::new();
        let mut literal = String::new();
        loop {
            match self.peek() {
                None => return Err(HostError::syntax("unterminated f-string", SourceSpan::new(line, col))),
                Some(c) if c == quote => {
                    if triple {
                        if self.peek_at(1) == Some(quote) && self.peek_at(2) == Some(quote) {
                            self.advance();
                            self.advance();
                            self.advance();
                            break;
                        }
                        literal.push(c);
                        self.advance();
                    } else {
                        self.advance();
                        break;
                    }
                }
                Some('{') if self.peek_at(1) == Some('{') => {
                    literal.push('{');
                    self.advance();
                    self.advance();
                }
                Some('}') if self.peek_at(1) == Some('}') => {
                    literal.push('}');
                    self.advance();
                    self.advance();
                }
                Some('{') => {
                    if !literal.is_empty() {
                        parts.push(FStringPart::Literal(std::mem::take(&mut literal)));
                    }
                    self.advance();
                    parts.push(self.lex_fstring_expr()?);
                }
                Some('\\') if !is_raw => {
                    self.advance();
                    if let Some(esc) = self.advance() {
                        literal.push_str(&unescape_one(esc, &mut self.chars, &mut self.pos));
                    }
                }
                Some(c) => {
                    literal.push(c);
                    self.advance();
                }
            }
        }
        if !literal.is_empty() {
            parts.push(FStringPart::Literal(literal));
        }
        Ok(parts)
    }

    /// Reads `{expr[!conv][:spec]}` after the opening `{` has been consumed.
    fn lex_fstring_expr(&mut self) -> Result<FStringPart, HostError> {
        let (line, col) = (self.line, self.col);
        let mut depth = 1i32;
        let mut source = String::new();
        let mut conversion = None;
        let mut format_spec = None;
        let mut in_spec = false;
        let mut spec_buf = String::new();
        loop {
            match self.peek() {
                None => return Err(HostError::syntax("unterminated f-string expression", SourceSpan::new(line, col))),
                Some('{') => {
                    depth += 1;
                    if in_spec {
                        spec_buf.push('{');
                    } else {
                        source.push('{');
                    }
                    self.advance();
                }
                Some('}') => {
                    depth -= 1;
                    self.advance();
                    if depth == 0 {
                        break;
                    }
                    if in_spec {
                        spec_buf.push('}');
                    } else {
                        source.push('}');
                    }
                }
                Some('!') if depth == 1 && !in_spec && matches!(self.peek_at(1), Some('r') | Some('s') | Some('a')) && self.peek_at(2) != Some('=') => {
                    self.advance();
                    conversion = self.advance();
                }
                Some(':') if depth == 1 && !in_spec => {
                    in_spec = true;
                    self.advance();
                }
                Some(c) => {
                    if in_spec {
                        spec_buf.push(c);
                    } else {
                        source.push(c);
                    }
                    self.advance();
                }
            }
        }
        if in_spec {
            format_spec = Some(spec_buf);
        }
        Ok(FStringPart::Expr { source, conversion, format_spec })
    }

    fn lex_operator(&mut self, line: u32, col: u32) -> Result<(), HostError> {
        use TokenKind::*;
        macro_rules! three {
            ($a:expr, $b:expr, $c:expr, $tok:expr) => {
                if self.peek() == Some($a) && self.peek_at(1) == Some($b) && self.peek_at(2) == Some($c) {
                    self.advance();
                    self.advance();
                    self.advance();
                    self.push($tok, line, col);
                    return Ok(());
                }
            };
        }
        macro_rules! two {
            ($a:expr, $b:expr, $tok:expr) => {
                if self.peek() == Some($a) && self.peek_at(1) == Some($b) {
                    self.advance();
                    self.advance();
                    self.push($tok, line, col);
                    return Ok(());
                }
            };
        }
        three!('.', '.', '.', Ellipsis);
        two!('*', '*', if self.peek_at(2) == Some('=') { self.advance(); DoubleStarEq } else { DoubleStar });
        two!('/', '/', if self.peek_at(2) == Some('=') { self.advance(); DoubleSlashEq } else { DoubleSlash });
        two!('<', '<', if self.peek_at(2) == Some('=') { self.advance(); LShiftEq } else { LShift });
        two!('>', '>', if self.peek_at(2) == Some('=') { self.advance(); RShiftEq } else { RShift });
        two!('=', '=', EqEq);
        two!('!', '=', NotEq);
        two!('<', '=', LtEq);
        two!('>', '=', GtEq);
        two!('+', '=', PlusEq);
        two!('-', '=', MinusEq);
        two!('*', '=', StarEq);
        two!('/', '=', SlashEq);
        two!('%', '=', PercentEq);
        two!('&', '=', AmperEq);
        two!('|', '=', PipeEq);
        two!('^', '=', CaretEq);
        two!('@', '=', AtEq);
        two!(':', '=', ColonEq);
        two!('-', '>', Arrow);

        let c = self.advance().unwrap();
        let kind = match c {
            '+' => Plus,
            '-' => Minus,
            '*' => Star,
            '/' => Slash,
            '%' => Percent,
            '@' => At,
            '&' => Amper,
            '|' => Pipe,
            '^' => Caret,
            '~' => Tilde,
            '<' => Lt,
            '>' => Gt,
            '=' => Eq,
            '(' => {
                self.paren_depth += 1;
                LParen
            }
            ')' => {
                self.paren_depth -= 1;
                RParen
            }
            '[' => {
                self.paren_depth += 1;
                LBracket
            }
            ']' => {
                self.paren_depth -= 1;
                RBracket
            }
            '{' => {
                self.paren_depth += 1;
                LBrace
            }
            '}' => {
                self.paren_depth -= 1;
                RBrace
            }
            ',' => Comma,
            ':' => Colon,
            '.' => Dot,
            ';' => Semi,
            other => {
                return Err(HostError::syntax(format!("invalid character '{other}'"), SourceSpan::new(line, col)));
            }
        };
        self.push(kind, line, col);
        Ok(())
    }
}

fn is_ident_start(c: char) -> bool {
    c == '_' || c.is_alphabetic()
}

fn unescape_one(esc: char, chars: &[char], pos: &mut usize) -> String {
    match esc {
        'n' => "\n".into(),
        't' => "\t".into(),
        'r' => "\r".into(),
        '\\' => "\\".into(),
        '\'' => "'".into(),
        '"' => "\"".into(),
        '0' => "\0".into(),
        'a' => "\u{7}".into(),
        'b' => "\u{8}".into(),
        'f' => "\u{c}".into(),
        'v' => "\u{b}".into(),
        '\n' => "".into(),
        'x' => {
            let mut hex = String::new();
            for _ in 0..2 {
                if let Some(c) = chars.get(*pos) {
                    if c.is_ascii_hexdigit() {
                        hex.push(*c);
                        *pos += 1;
                    }
                }
            }
            u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32).map(String::from).unwrap_or_default()
        }
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        Lexer::new(src).tokenize().unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn indentation_roundtrip() {
        let k = kinds("if True:\n    x = 1\n    y = 2\nz = 3\n");
        assert!(k.contains(&TokenKind::Indent));
        assert!(k.contains(&TokenKind::Dedent));
    }

    #[test]
    fn numeric_literals() {
        assert_eq!(kinds("1_000"), vec![TokenKind::Int("1_000".into()), TokenKind::Newline, TokenKind::Eof]);
        assert_eq!(kinds("3.14"), vec![TokenKind::Float(3.14), TokenKind::Newline, TokenKind::Eof]);
    }

    #[test]
    fn fstring_parts() {
        let k = kinds("f'hi {name!r:>10}'");
        match &k[0] {
            TokenKind::FString(parts) => {
                assert_eq!(parts.len(), 2);
                assert!(matches!(&parts[0], FStringPart::Literal(s) if s == "hi "));
                assert!(matches!(&parts[1], FStringPart::Expr { conversion: Some('r'), .. }));
            }
            other => panic!("expected fstring, got {other:?}"),
        }
    }

    #[test]
    fn bracket_suppresses_newline() {
        let k = kinds("x = (1,\n  2)\n");
        assert_eq!(k.iter().filter(|t| **t == TokenKind::Newline).count(), 1);
    }
}
