//! Recursive-descent parser for the module subset.

use crate::ast::{
    BinaryOp, ExportEntry, Expr, ImportBinding, ImportDecl, ModuleBody, Stmt, StmtKind,
};
use crate::lexer::{Scanner, Token, TokenKind};

/// A parse failure, positioned by byte offset into the source.
#[derive(Debug, Clone)]
pub struct ParseError {
    /// Human-readable description.
    pub message: String,
    /// Byte offset the error is anchored to.
    pub offset: usize,
}

impl ParseError {
    fn new(message: impl Into<String>, offset: usize) -> Self {
        Self {
            message: message.into(),
            offset,
        }
    }
}

/// Parses module source text into a [`ModuleBody`].
pub fn parse_module(source: &str) -> Result<ModuleBody, ParseError> {
    let tokens = Scanner::new(source).scan_all();
    let mut parser = Parser { tokens, pos: 0 };
    parser.parse_module_body()
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn at(&self, kind: &TokenKind) -> bool {
        &self.peek().kind == kind
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.at(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind, what: &str) -> Result<Token, ParseError> {
        if self.at(kind) {
            Ok(self.advance())
        } else {
            Err(self.unexpected(what))
        }
    }

    fn unexpected(&self, what: &str) -> ParseError {
        let token = self.peek();
        ParseError::new(
            format!("expected {}, found {}", what, describe(&token.kind)),
            token.span.start,
        )
    }

    fn expect_identifier(&mut self, what: &str) -> Result<String, ParseError> {
        match &self.peek().kind {
            TokenKind::Identifier(name) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            _ => Err(self.unexpected(what)),
        }
    }

    fn expect_string(&mut self, what: &str) -> Result<String, ParseError> {
        match &self.peek().kind {
            TokenKind::String(value) => {
                let value = value.clone();
                self.advance();
                Ok(value)
            }
            _ => Err(self.unexpected(what)),
        }
    }

    /// Eats the statement terminator: a semicolon, or nothing at EOF.
    fn expect_terminator(&mut self) -> Result<(), ParseError> {
        if self.eat(&TokenKind::Semicolon) || self.at(&TokenKind::Eof) {
            Ok(())
        } else {
            Err(self.unexpected("';'"))
        }
    }

    fn parse_module_body(&mut self) -> Result<ModuleBody, ParseError> {
        let mut statements = Vec::new();
        while !self.at(&TokenKind::Eof) {
            statements.push(self.parse_statement()?);
        }
        Ok(ModuleBody { statements })
    }

    fn parse_statement(&mut self) -> Result<Stmt, ParseError> {
        let span = self.peek().span;
        let kind = match self.peek().kind {
            TokenKind::Import => self.parse_import()?,
            TokenKind::Export => self.parse_export()?,
            TokenKind::Const => self.parse_const()?,
            TokenKind::Throw => {
                self.advance();
                let expr = self.parse_expression()?;
                self.expect_terminator()?;
                StmtKind::Throw(expr)
            }
            _ => {
                let expr = self.parse_expression()?;
                self.expect_terminator()?;
                StmtKind::Expr(expr)
            }
        };
        Ok(Stmt { kind, span })
    }

    /// Parses an `import` statement. `import(…)` and `import.meta` at
    /// statement position are handled by the expression grammar instead.
    fn parse_import(&mut self) -> Result<StmtKind, ParseError> {
        // Distinguish declarations from import-expressions before committing
        if let Some(next) = self.tokens.get(self.pos + 1) {
            if matches!(next.kind, TokenKind::LeftParen | TokenKind::Dot) {
                let expr = self.parse_expression()?;
                self.expect_terminator()?;
                return Ok(StmtKind::Expr(expr));
            }
        }
        self.advance();

        // Side-effect only: import 'spec';
        if let TokenKind::String(specifier) = &self.peek().kind {
            let specifier = specifier.clone();
            self.advance();
            self.expect_terminator()?;
            return Ok(StmtKind::Import(ImportDecl {
                specifier,
                bindings: Vec::new(),
            }));
        }

        let mut bindings = Vec::new();

        match &self.peek().kind {
            // import * as ns from 'spec';
            TokenKind::Star => {
                self.advance();
                self.expect_contextual("as")?;
                let local = self.expect_identifier("namespace binding name")?;
                bindings.push(ImportBinding::Namespace { local });
            }
            // import { a, b as c } from 'spec';
            TokenKind::LeftBrace => {
                self.parse_named_imports(&mut bindings)?;
            }
            // import d from 'spec';  /  import d, { a } from 'spec';
            TokenKind::Identifier(_) => {
                let local = self.expect_identifier("import binding name")?;
                bindings.push(ImportBinding::Default { local });
                if self.eat(&TokenKind::Comma) {
                    self.parse_named_imports(&mut bindings)?;
                }
            }
            _ => return Err(self.unexpected("import bindings")),
        }

        self.expect_contextual("from")?;
        let specifier = self.expect_string("module specifier string")?;
        self.expect_terminator()?;
        Ok(StmtKind::Import(ImportDecl {
            specifier,
            bindings,
        }))
    }

    fn parse_named_imports(
        &mut self,
        bindings: &mut Vec<ImportBinding>,
    ) -> Result<(), ParseError> {
        self.expect(&TokenKind::LeftBrace, "'{'")?;
        while !self.at(&TokenKind::RightBrace) {
            let imported = self.expect_identifier("import name")?;
            let local = if self.at_contextual("as") {
                self.advance();
                self.expect_identifier("import alias")?
            } else {
                imported.clone()
            };
            bindings.push(ImportBinding::Named { imported, local });
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::RightBrace, "'}'")?;
        Ok(())
    }

    fn parse_export(&mut self) -> Result<StmtKind, ParseError> {
        self.advance();
        match self.peek().kind {
            TokenKind::Const => {
                let StmtKind::Const { name, init } = self.parse_const()? else {
                    unreachable!()
                };
                Ok(StmtKind::ExportConst { name, init })
            }
            TokenKind::Default => {
                self.advance();
                let init = self.parse_expression()?;
                self.expect_terminator()?;
                Ok(StmtKind::ExportDefault(init))
            }
            TokenKind::LeftBrace => {
                self.advance();
                let mut entries = Vec::new();
                while !self.at(&TokenKind::RightBrace) {
                    let local = self.expect_identifier("export name")?;
                    let exported = if self.at_contextual("as") {
                        self.advance();
                        self.expect_identifier("export alias")?
                    } else {
                        local.clone()
                    };
                    entries.push(ExportEntry { local, exported });
                    if !self.eat(&TokenKind::Comma) {
                        break;
                    }
                }
                self.expect(&TokenKind::RightBrace, "'}'")?;
                self.expect_terminator()?;
                Ok(StmtKind::ExportList(entries))
            }
            _ => Err(self.unexpected("'const', 'default' or '{' after 'export'")),
        }
    }

    fn parse_const(&mut self) -> Result<StmtKind, ParseError> {
        self.expect(&TokenKind::Const, "'const'")?;
        let name = self.expect_identifier("binding name")?;
        self.expect(&TokenKind::Equal, "'='")?;
        let init = self.parse_expression()?;
        self.expect_terminator()?;
        Ok(StmtKind::Const { name, init })
    }

    fn at_contextual(&self, word: &str) -> bool {
        matches!(&self.peek().kind, TokenKind::Identifier(name) if name == word)
    }

    fn expect_contextual(&mut self, word: &str) -> Result<(), ParseError> {
        if self.at_contextual(word) {
            self.advance();
            Ok(())
        } else {
            Err(self.unexpected(&format!("'{}'", word)))
        }
    }

    fn parse_expression(&mut self) -> Result<Expr, ParseError> {
        self.parse_additive()
    }

    fn parse_additive(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => return Ok(lhs),
            };
            self.advance();
            let rhs = self.parse_multiplicative()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                _ => return Ok(lhs),
            };
            self.advance();
            let rhs = self.parse_unary()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        if self.eat(&TokenKind::Minus) {
            let operand = self.parse_unary()?;
            return Ok(Expr::Neg(Box::new(operand)));
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.parse_primary()?;
        while self.eat(&TokenKind::Dot) {
            let property = match &self.peek().kind {
                TokenKind::Identifier(name) => name.clone(),
                // Property positions allow keyword names, e.g. `ns.default`
                TokenKind::Default => "default".to_string(),
                _ => return Err(self.unexpected("property name")),
            };
            self.advance();
            expr = Expr::Member {
                object: Box::new(expr),
                property,
            };
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        let span = self.peek().span;
        match self.peek().kind.clone() {
            TokenKind::Number(n) => {
                self.advance();
                Ok(Expr::Number(n))
            }
            TokenKind::String(s) => {
                self.advance();
                Ok(Expr::Str(s))
            }
            TokenKind::True => {
                self.advance();
                Ok(Expr::Bool(true))
            }
            TokenKind::False => {
                self.advance();
                Ok(Expr::Bool(false))
            }
            TokenKind::Null => {
                self.advance();
                Ok(Expr::Null)
            }
            TokenKind::Identifier(name) => {
                self.advance();
                Ok(Expr::Ident(name))
            }
            TokenKind::LeftParen => {
                self.advance();
                let expr = self.parse_expression()?;
                self.expect(&TokenKind::RightParen, "')'")?;
                Ok(expr)
            }
            TokenKind::New => {
                self.advance();
                let callee = self.expect_identifier("constructor name")?;
                if callee != "Error" {
                    return Err(ParseError::new(
                        format!("unsupported constructor '{}'", callee),
                        span.start,
                    ));
                }
                self.expect(&TokenKind::LeftParen, "'('")?;
                let message = if self.at(&TokenKind::RightParen) {
                    Expr::Str(String::new())
                } else {
                    self.parse_expression()?
                };
                self.expect(&TokenKind::RightParen, "')'")?;
                Ok(Expr::NewError {
                    message: Box::new(message),
                    span,
                })
            }
            TokenKind::Import => {
                self.advance();
                if self.eat(&TokenKind::Dot) {
                    self.expect_contextual("meta")?;
                    Ok(Expr::ImportMeta)
                } else {
                    self.expect(&TokenKind::LeftParen, "'('")?;
                    let specifier = self.parse_expression()?;
                    self.expect(&TokenKind::RightParen, "')'")?;
                    Ok(Expr::DynamicImport(Box::new(specifier)))
                }
            }
            _ => Err(self.unexpected("an expression")),
        }
    }
}

fn describe(kind: &TokenKind) -> String {
    match kind {
        TokenKind::Number(n) => format!("number {}", n),
        TokenKind::String(_) => "string literal".to_string(),
        TokenKind::Identifier(name) => format!("'{}'", name),
        TokenKind::Eof => "end of input".to_string(),
        TokenKind::Invalid(ch) => format!("invalid character '{}'", ch),
        other => format!("'{}'", punct(other)),
    }
}

fn punct(kind: &TokenKind) -> &'static str {
    match kind {
        TokenKind::Import => "import",
        TokenKind::Export => "export",
        TokenKind::Const => "const",
        TokenKind::Default => "default",
        TokenKind::Throw => "throw",
        TokenKind::New => "new",
        TokenKind::True => "true",
        TokenKind::False => "false",
        TokenKind::Null => "null",
        TokenKind::LeftBrace => "{",
        TokenKind::RightBrace => "}",
        TokenKind::LeftParen => "(",
        TokenKind::RightParen => ")",
        TokenKind::Semicolon => ";",
        TokenKind::Comma => ",",
        TokenKind::Dot => ".",
        TokenKind::Star => "*",
        TokenKind::Plus => "+",
        TokenKind::Minus => "-",
        TokenKind::Slash => "/",
        TokenKind::Equal => "=",
        _ => "?",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_imports() {
        let body = parse_module(
            "import foo from 'foo';\n\
             import { bar, baz as qux } from 'bar';\n\
             import * as all from 'all';\n\
             import 'side-effect';\n",
        )
        .unwrap();

        let imports: Vec<_> = body.imports().collect();
        assert_eq!(imports.len(), 4);
        assert_eq!(imports[0].specifier, "foo");
        assert_eq!(imports[1].specifier, "bar");
        assert_eq!(imports[2].specifier, "all");
        assert_eq!(imports[3].specifier, "side-effect");
        assert!(imports[3].bindings.is_empty());

        assert!(matches!(
            &imports[1].bindings[1],
            ImportBinding::Named { imported, local }
                if imported == "baz" && local == "qux"
        ));
    }

    #[test]
    fn test_parse_exports() {
        let body = parse_module(
            "export default 1 + 2;\n\
             export const x = 3;\n\
             const hidden = 4;\n\
             export { hidden as revealed };\n",
        )
        .unwrap();
        assert_eq!(body.statements.len(), 4);
        assert!(matches!(&body.statements[0].kind, StmtKind::ExportDefault(_)));
        assert!(
            matches!(&body.statements[1].kind, StmtKind::ExportConst { name, .. } if name == "x")
        );
        assert!(matches!(&body.statements[3].kind, StmtKind::ExportList(entries)
            if entries[0].local == "hidden" && entries[0].exported == "revealed"));
    }

    #[test]
    fn test_parse_expression_precedence() {
        let body = parse_module("1 + 2 * 3;").unwrap();
        let StmtKind::Expr(Expr::Binary { op, rhs, .. }) = &body.statements[0].kind else {
            panic!("expected binary expression");
        };
        assert_eq!(*op, BinaryOp::Add);
        assert!(matches!(**rhs, Expr::Binary { op: BinaryOp::Mul, .. }));
    }

    #[test]
    fn test_parse_dynamic_import_and_meta() {
        let body = parse_module("import('dep');\nimport.meta.url;").unwrap();
        assert!(matches!(
            &body.statements[0].kind,
            StmtKind::Expr(Expr::DynamicImport(_))
        ));
        assert!(matches!(
            &body.statements[1].kind,
            StmtKind::Expr(Expr::Member { object, .. }) if matches!(**object, Expr::ImportMeta)
        ));
    }

    #[test]
    fn test_parse_error_position() {
        let err = parse_module("const = 1;").unwrap_err();
        assert_eq!(err.offset, 6);
        assert!(err.message.contains("binding name"));
    }

    #[test]
    fn test_throw_new_error() {
        let body = parse_module("throw new Error(\"oops\");").unwrap();
        let StmtKind::Throw(Expr::NewError { span, .. }) = &body.statements[0].kind else {
            panic!("expected throw new Error");
        };
        assert_eq!(span.start, 6);
    }
}
