//! Recursive descent parser for fun
//!
//! The parser does not build the AST directly. It produces a tree of
//! grammar-named [`SyntaxNode`]s (the same node-kind vocabulary a
//! grammar-driven parser would emit: `int`, `str`, `var`, `sym`, `app`,
//! `iapp`, `lam`, `rec`, `prop`, `cons`, `when`, `list`, `block`,
//! `source_file`, `assign`, `annot`, `import`, and the type nodes).
//! AST construction is a separate pass in [`crate::ast`] that consumes
//! nodes by kind name, so the front end stays swappable.

use crate::lexer::{LexError, Span, SpannedToken, Token};
use thiserror::Error;

/// A node in the grammar-named parse tree.
#[derive(Debug, Clone, PartialEq)]
pub struct SyntaxNode {
    pub kind: &'static str,
    pub text: String,
    pub children: Vec<SyntaxNode>,
    pub error: bool,
}

impl SyntaxNode {
    pub fn leaf(kind: &'static str, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
            children: Vec::new(),
            error: false,
        }
    }

    pub fn inner(kind: &'static str, children: Vec<SyntaxNode>) -> Self {
        Self {
            kind,
            text: String::new(),
            children,
            error: false,
        }
    }

    /// True if this node or any descendant is an error node.
    pub fn has_error(&self) -> bool {
        self.error || self.children.iter().any(SyntaxNode::has_error)
    }
}

#[derive(Error, Debug)]
pub enum ParseError {
    #[error(transparent)]
    Lex(#[from] LexError),
    #[error("unexpected token: expected {expected}, found {found}")]
    UnexpectedToken {
        expected: String,
        found: String,
        span: Span,
    },
    #[error("parse error")]
    ErrorNode,
    #[error("invalid integer literal: {0}")]
    InvalidInt(String),
    #[error("duplicate record prop name: {0}")]
    DuplicateRecordProp(String),
    #[error("duplicate when clause cons name: {0}")]
    DuplicateWhenClause(String),
    #[error("duplicate lambda param name: {0}")]
    DuplicateParam(String),
    #[error("duplicate type record property name: {0}")]
    DuplicateTypeProp(String),
    #[error("unexpected declaration name {0}")]
    UnexpectedDeclaration(String),
    #[error("expected a variable, found {0} node")]
    ExpectedVariable(&'static str),
    #[error("invalid node type {0}")]
    InvalidNode(String),
    #[error("import path must be a plain template string")]
    InterpolatedImportPath,
}

pub struct Parser {
    tokens: Vec<SpannedToken>,
    pos: usize,
}

impl Parser {
    pub fn new(tokens: Vec<SpannedToken>) -> Self {
        Self { tokens, pos: 0 }
    }

    /// Parse a whole module: `(decl ';')* expr`.
    pub fn parse_source_file(&mut self) -> Result<SyntaxNode, ParseError> {
        let children = self.parse_items(Token::Eof)?;
        self.consume(Token::Eof, "end of input")?;
        Ok(SyntaxNode::inner("source_file", children))
    }

    fn peek(&self) -> &Token {
        self.peek_nth(0)
    }

    fn peek_nth(&self, n: usize) -> &Token {
        self.tokens
            .get(self.pos + n)
            .map(|t| &t.token)
            .unwrap_or(&Token::Eof)
    }

    fn current_span(&self) -> Span {
        self.tokens
            .get(self.pos)
            .map(|t| t.span)
            .unwrap_or_default()
    }

    fn advance(&mut self) -> Token {
        let token = self
            .tokens
            .get(self.pos)
            .map(|t| t.token.clone())
            .unwrap_or(Token::Eof);
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn check(&self, token: &Token) -> bool {
        self.peek() == token
    }

    fn match_token(&mut self, token: &Token) -> bool {
        if self.check(token) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn consume(&mut self, token: Token, expected: &str) -> Result<(), ParseError> {
        if self.check(&token) {
            self.advance();
            Ok(())
        } else {
            Err(self.unexpected(expected))
        }
    }

    fn unexpected(&self, expected: &str) -> ParseError {
        ParseError::UnexpectedToken {
            expected: expected.to_string(),
            found: self.peek().to_string(),
            span: self.current_span(),
        }
    }

    fn parse_ident(&mut self, expected: &str) -> Result<String, ParseError> {
        match self.peek() {
            Token::Ident(name) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            _ => Err(self.unexpected(expected)),
        }
    }

    // ========================================================================
    // Declarations and block bodies
    // ========================================================================

    /// Parse `(decl ';')*` followed by a result expression. Stops before
    /// `terminator` (which the caller consumes).
    fn parse_items(&mut self, terminator: Token) -> Result<Vec<SyntaxNode>, ParseError> {
        let mut children = Vec::new();
        loop {
            let decl = match self.peek() {
                Token::Import => Some(self.parse_import()?),
                Token::Ident(_) if *self.peek_nth(1) == Token::Eq => Some(self.parse_assign()?),
                Token::Ident(_) if *self.peek_nth(1) == Token::Colon => Some(self.parse_annot()?),
                _ => None,
            };
            match decl {
                Some(decl) => {
                    children.push(decl);
                    self.consume(Token::Semicolon, ";")?;
                }
                None => {
                    children.push(self.parse_expr()?);
                    if !self.check(&terminator) {
                        return Err(self.unexpected(&terminator.to_string()));
                    }
                    return Ok(children);
                }
            }
        }
    }

    fn parse_assign(&mut self) -> Result<SyntaxNode, ParseError> {
        let name = self.parse_ident("variable")?;
        self.consume(Token::Eq, "=")?;
        let value = self.parse_expr()?;
        Ok(SyntaxNode::inner(
            "assign",
            vec![SyntaxNode::leaf("var", name), value],
        ))
    }

    fn parse_annot(&mut self) -> Result<SyntaxNode, ParseError> {
        let name = self.parse_ident("variable")?;
        self.consume(Token::Colon, ":")?;
        let ty = self.parse_type()?;
        Ok(SyntaxNode::inner(
            "annot",
            vec![SyntaxNode::leaf("var", name), ty],
        ))
    }

    fn parse_import(&mut self) -> Result<SyntaxNode, ParseError> {
        self.consume(Token::Import, "import")?;
        let name = self.parse_ident("import binding")?;
        self.consume(Token::Backtick, "`")?;
        let path = match self.peek() {
            Token::StrFrag(path) => {
                let path = path.clone();
                self.advance();
                path
            }
            Token::Backtick => String::new(),
            Token::LBrace => return Err(ParseError::InterpolatedImportPath),
            _ => return Err(self.unexpected("import path")),
        };
        self.consume(Token::Backtick, "`")?;
        Ok(SyntaxNode::inner(
            "import",
            vec![SyntaxNode::leaf("var", name), SyntaxNode::leaf("lit_str", path)],
        ))
    }

    // ========================================================================
    // Expressions
    // ========================================================================

    /// Full expression: infix applications over postfix chains, one
    /// left-associative precedence level for all symbolic operators.
    fn parse_expr(&mut self) -> Result<SyntaxNode, ParseError> {
        let mut lhs = self.parse_postfix()?;
        while let Token::Sym(op) = self.peek() {
            let op = op.clone();
            self.advance();
            let rhs = self.parse_postfix()?;
            lhs = SyntaxNode::inner("iapp", vec![lhs, SyntaxNode::leaf("sym", op), rhs]);
        }
        Ok(lhs)
    }

    /// Postfix chain: calls `f(a, b)` and projections `r.label`.
    fn parse_postfix(&mut self) -> Result<SyntaxNode, ParseError> {
        let mut expr = self.parse_atom()?;
        loop {
            match self.peek() {
                Token::LParen => {
                    self.advance();
                    let mut children = vec![expr];
                    if !self.check(&Token::RParen) {
                        loop {
                            children.push(self.parse_expr()?);
                            if !self.match_token(&Token::Comma) {
                                break;
                            }
                        }
                    }
                    self.consume(Token::RParen, ")")?;
                    expr = SyntaxNode::inner("app", children);
                }
                Token::Dot => {
                    self.advance();
                    let prop = self.parse_ident("property name")?;
                    expr = SyntaxNode::inner("prop", vec![expr, SyntaxNode::leaf("var", prop)]);
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn starts_expr(token: &Token) -> bool {
        matches!(
            token,
            Token::Int(_)
                | Token::Backtick
                | Token::Ident(_)
                | Token::ConsName(_)
                | Token::Lambda
                | Token::LParen
                | Token::LBracket
                | Token::LBrace
                | Token::When
        )
    }

    fn parse_atom(&mut self) -> Result<SyntaxNode, ParseError> {
        match self.peek().clone() {
            Token::Int(n) => {
                self.advance();
                Ok(SyntaxNode::leaf("int", n.to_string()))
            }
            Token::Backtick => self.parse_template(),
            Token::Ident(name) => {
                self.advance();
                Ok(SyntaxNode::leaf("var", name))
            }
            Token::Sym(op) => {
                self.advance();
                Ok(SyntaxNode::leaf("sym", op))
            }
            Token::ConsName(name) => {
                self.advance();
                let mut children = vec![SyntaxNode::leaf("cons_name", name)];
                // payload binds at postfix level: `Some f(x)` is one datum,
                // `Some x + 1` applies `+` to the datum
                if Self::starts_expr(self.peek()) {
                    children.push(self.parse_postfix()?);
                }
                Ok(SyntaxNode::inner("cons", children))
            }
            Token::Lambda => {
                self.advance();
                let mut children = Vec::new();
                if !self.check(&Token::Arrow) {
                    loop {
                        let param = self.parse_ident("lambda param")?;
                        children.push(SyntaxNode::leaf("var", param));
                        if !self.match_token(&Token::Comma) {
                            break;
                        }
                    }
                }
                self.consume(Token::Arrow, "->")?;
                children.push(self.parse_expr()?);
                Ok(SyntaxNode::inner("lam", children))
            }
            Token::LParen => {
                self.advance();
                let children = self.parse_items(Token::RParen)?;
                self.consume(Token::RParen, ")")?;
                Ok(SyntaxNode::inner("block", children))
            }
            Token::LBracket => {
                self.advance();
                let mut children = Vec::new();
                if !self.check(&Token::RBracket) {
                    loop {
                        children.push(self.parse_expr()?);
                        if !self.match_token(&Token::Comma) {
                            break;
                        }
                    }
                }
                self.consume(Token::RBracket, "]")?;
                Ok(SyntaxNode::inner("list", children))
            }
            Token::LBrace => {
                self.advance();
                let mut children = Vec::new();
                if !self.check(&Token::RBrace) {
                    loop {
                        let label = self.parse_ident("record label")?;
                        self.consume(Token::Colon, ":")?;
                        let value = self.parse_expr()?;
                        children.push(SyntaxNode::leaf("var", label));
                        children.push(value);
                        if !self.match_token(&Token::Comma) {
                            break;
                        }
                    }
                }
                self.consume(Token::RBrace, "}")?;
                Ok(SyntaxNode::inner("rec", children))
            }
            Token::When => self.parse_when(),
            _ => Err(self.unexpected("expression")),
        }
    }

    fn parse_template(&mut self) -> Result<SyntaxNode, ParseError> {
        self.consume(Token::Backtick, "`")?;
        let mut children = Vec::new();
        loop {
            match self.peek().clone() {
                Token::StrFrag(text) => {
                    self.advance();
                    children.push(SyntaxNode::leaf("lit_str", text));
                }
                Token::LBrace => {
                    self.advance();
                    children.push(self.parse_expr()?);
                    self.consume(Token::RBrace, "}")?;
                }
                Token::Backtick => {
                    self.advance();
                    return Ok(SyntaxNode::inner("str", children));
                }
                _ => return Err(self.unexpected("template part")),
            }
        }
    }

    /// `when` is greedy: after each clause a `;` continues the match only
    /// when followed by another clause head (`Cons var ->`) or `else`.
    fn parse_when(&mut self) -> Result<SyntaxNode, ParseError> {
        self.consume(Token::When, "when")?;
        let mut children = vec![self.parse_expr()?];
        self.consume(Token::Is, "is")?;
        loop {
            let cons = match self.peek() {
                Token::ConsName(name) => name.clone(),
                _ => return Err(self.unexpected("constructor name")),
            };
            self.advance();
            let payload = self.parse_ident("payload binding")?;
            self.consume(Token::Arrow, "->")?;
            let consequence = self.parse_expr()?;
            children.push(SyntaxNode::leaf("cons_name", cons));
            children.push(SyntaxNode::leaf("var", payload));
            children.push(consequence);

            if !self.check(&Token::Semicolon) {
                break;
            }
            if *self.peek_nth(1) == Token::Else {
                self.advance(); // ;
                self.advance(); // else
                children.push(self.parse_expr()?);
                break;
            }
            let continues = matches!(self.peek_nth(1), Token::ConsName(_))
                && matches!(self.peek_nth(2), Token::Ident(_))
                && *self.peek_nth(3) == Token::Arrow;
            if !continues {
                // the `;` belongs to the surrounding block
                break;
            }
            self.advance();
        }
        Ok(SyntaxNode::inner("when", children))
    }

    // ========================================================================
    // Types (annotations)
    // ========================================================================

    fn parse_type(&mut self) -> Result<SyntaxNode, ParseError> {
        match self.peek().clone() {
            Token::Ident(name) => {
                self.advance();
                Ok(SyntaxNode::leaf("var", name))
            }
            Token::ConsName(name) => {
                self.advance();
                let mut children = vec![SyntaxNode::leaf("cons_name", name)];
                if self.check_sym("<") {
                    self.advance();
                    loop {
                        children.push(self.parse_type()?);
                        if !self.match_token(&Token::Comma) {
                            break;
                        }
                    }
                    self.consume_close_angle()?;
                }
                Ok(SyntaxNode::inner("type_cons", children))
            }
            Token::LBrace => {
                self.advance();
                let mut children = Vec::new();
                if matches!(self.peek(), Token::Ident(_)) {
                    loop {
                        let label = self.parse_ident("record label")?;
                        self.consume(Token::Colon, ":")?;
                        let ty = self.parse_type()?;
                        children.push(SyntaxNode::leaf("var", label));
                        children.push(ty);
                        if !self.match_token(&Token::Comma) {
                            break;
                        }
                    }
                }
                if self.match_token(&Token::Pipe) {
                    let rest = self.parse_ident("row variable")?;
                    children.push(SyntaxNode::leaf("rest", rest));
                }
                self.consume(Token::RBrace, "}")?;
                Ok(SyntaxNode::inner("type_rec", children))
            }
            Token::LBracket => {
                self.advance();
                let mut children = Vec::new();
                loop {
                    match self.peek().clone() {
                        Token::ConsName(name) => {
                            self.advance();
                            let ty = self.parse_type()?;
                            children.push(SyntaxNode::leaf("var", name));
                            children.push(ty);
                            if !self.match_token(&Token::Pipe) {
                                break;
                            }
                        }
                        Token::Ident(rest) => {
                            self.advance();
                            children.push(SyntaxNode::leaf("rest", rest));
                            break;
                        }
                        Token::Pipe => {
                            self.advance();
                            let rest = self.parse_ident("row variable")?;
                            children.push(SyntaxNode::leaf("rest", rest));
                            break;
                        }
                        Token::RBracket => break,
                        _ => return Err(self.unexpected("variant case")),
                    }
                }
                self.consume(Token::RBracket, "]")?;
                Ok(SyntaxNode::inner("type_union", children))
            }
            _ => Err(self.unexpected("type")),
        }
    }

    fn check_sym(&self, sym: &str) -> bool {
        matches!(self.peek(), Token::Sym(s) if s == sym)
    }

    /// Consume one `>` of a closing angle bracket. Nested generics lex as
    /// a single `>>` symbol, so this may split the current token.
    fn consume_close_angle(&mut self) -> Result<(), ParseError> {
        match self.peek().clone() {
            Token::Sym(s) if s == ">" => {
                self.advance();
                Ok(())
            }
            Token::Sym(s) if s.starts_with('>') && s.chars().all(|c| c == '>') => {
                self.tokens[self.pos].token = Token::Sym(s[1..].to_string());
                Ok(())
            }
            _ => Err(self.unexpected(">")),
        }
    }
}

/// Convenience entry point: lex and parse a whole module.
pub fn parse(source: &str) -> Result<SyntaxNode, ParseError> {
    let tokens = crate::lexer::Lexer::new(source).tokenize()?;
    Parser::new(tokens).parse_source_file()
}
