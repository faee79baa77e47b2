//! The scanner that produces tokens from module source text.

use unicode_xid::UnicodeXID;

/// A span in the source code, representing a range of bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    /// Start byte offset (inclusive)
    pub start: usize,
    /// End byte offset (exclusive)
    pub end: usize,
}

impl Span {
    /// Creates a new span.
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }
}

/// Computes the 1-based line and column of a byte offset.
pub fn line_col(source: &str, offset: usize) -> (usize, usize) {
    let mut line = 1;
    let mut col = 1;
    for (i, ch) in source.char_indices() {
        if i >= offset {
            break;
        }
        if ch == '\n' {
            line += 1;
            col = 1;
        } else {
            col += 1;
        }
    }
    (line, col)
}

/// A token produced by the lexer.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    /// The kind of token
    pub kind: TokenKind,
    /// The span in the source code
    pub span: Span,
}

impl Token {
    fn new(kind: TokenKind, span: Span) -> Self {
        Self { kind, span }
    }
}

/// The kinds of tokens in the module subset.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// Numeric literal
    Number(f64),
    /// String literal (quotes stripped, escapes applied)
    String(String),
    /// Identifier (including contextual keywords like `from` and `as`)
    Identifier(String),

    // Keywords
    /// `import`
    Import,
    /// `export`
    Export,
    /// `const`
    Const,
    /// `default`
    Default,
    /// `throw`
    Throw,
    /// `new`
    New,
    /// `true`
    True,
    /// `false`
    False,
    /// `null`
    Null,

    // Punctuation
    /// `{`
    LeftBrace,
    /// `}`
    RightBrace,
    /// `(`
    LeftParen,
    /// `)`
    RightParen,
    /// `;`
    Semicolon,
    /// `,`
    Comma,
    /// `.`
    Dot,
    /// `*`
    Star,
    /// `+`
    Plus,
    /// `-`
    Minus,
    /// `/`
    Slash,
    /// `=`
    Equal,

    /// End of input
    Eof,
    /// A character the scanner does not understand
    Invalid(char),
}

/// A scanner that tokenizes module source code.
pub struct Scanner<'a> {
    source: &'a str,
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
    current_pos: usize,
}

impl<'a> Scanner<'a> {
    /// Creates a new scanner for the given source code.
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            chars: source.char_indices().peekable(),
            current_pos: 0,
        }
    }

    /// Tokenizes the whole input, ending with an `Eof` token.
    pub fn scan_all(mut self) -> Vec<Token> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token();
            let done = token.kind == TokenKind::Eof;
            tokens.push(token);
            if done {
                return tokens;
            }
        }
    }

    /// Returns the next token from the source.
    pub fn next_token(&mut self) -> Token {
        self.skip_whitespace_and_comments();

        let start = self.current_pos;

        let Some((_pos, ch)) = self.advance() else {
            return Token::new(TokenKind::Eof, Span::new(start, start));
        };

        let kind = match ch {
            '{' => TokenKind::LeftBrace,
            '}' => TokenKind::RightBrace,
            '(' => TokenKind::LeftParen,
            ')' => TokenKind::RightParen,
            ';' => TokenKind::Semicolon,
            ',' => TokenKind::Comma,
            '.' => TokenKind::Dot,
            '*' => TokenKind::Star,
            '+' => TokenKind::Plus,
            '-' => TokenKind::Minus,
            '/' => TokenKind::Slash,
            '=' => TokenKind::Equal,

            '"' | '\'' => self.scan_string(ch),

            '0'..='9' => self.scan_number(start),

            _ if is_id_start(ch) => self.scan_identifier(start),

            _ => TokenKind::Invalid(ch),
        };

        Token::new(kind, Span::new(start, self.current_pos))
    }

    fn advance(&mut self) -> Option<(usize, char)> {
        let result = self.chars.next();
        if let Some((pos, ch)) = result {
            self.current_pos = pos + ch.len_utf8();
        }
        result
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().map(|&(_, ch)| ch)
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            match self.peek() {
                Some(ch) if ch.is_whitespace() => {
                    self.advance();
                }
                Some('/') => {
                    // Only consume if it starts a comment
                    let mut lookahead = self.chars.clone();
                    lookahead.next();
                    match lookahead.peek().map(|&(_, ch)| ch) {
                        Some('/') => {
                            while let Some(ch) = self.peek() {
                                if ch == '\n' {
                                    break;
                                }
                                self.advance();
                            }
                        }
                        Some('*') => {
                            self.advance();
                            self.advance();
                            let mut prev = '\0';
                            while let Some((_, ch)) = self.advance() {
                                if prev == '*' && ch == '/' {
                                    break;
                                }
                                prev = ch;
                            }
                        }
                        _ => return,
                    }
                }
                _ => return,
            }
        }
    }

    fn scan_string(&mut self, quote: char) -> TokenKind {
        let mut value = String::new();
        loop {
            match self.advance() {
                Some((_, ch)) if ch == quote => return TokenKind::String(value),
                Some((_, '\\')) => match self.advance() {
                    Some((_, 'n')) => value.push('\n'),
                    Some((_, 't')) => value.push('\t'),
                    Some((_, 'r')) => value.push('\r'),
                    Some((_, '0')) => value.push('\0'),
                    Some((_, ch)) => value.push(ch),
                    None => return TokenKind::Invalid(quote),
                },
                Some((_, '\n')) | None => return TokenKind::Invalid(quote),
                Some((_, ch)) => value.push(ch),
            }
        }
    }

    fn scan_number(&mut self, start: usize) -> TokenKind {
        while matches!(self.peek(), Some('0'..='9')) {
            self.advance();
        }
        if self.peek() == Some('.') {
            self.advance();
            while matches!(self.peek(), Some('0'..='9')) {
                self.advance();
            }
        }
        if matches!(self.peek(), Some('e' | 'E')) {
            self.advance();
            if matches!(self.peek(), Some('+' | '-')) {
                self.advance();
            }
            while matches!(self.peek(), Some('0'..='9')) {
                self.advance();
            }
        }
        let text = &self.source[start..self.current_pos];
        match text.parse() {
            Ok(n) => TokenKind::Number(n),
            Err(_) => TokenKind::Invalid(text.chars().next().unwrap_or('0')),
        }
    }

    fn scan_identifier(&mut self, start: usize) -> TokenKind {
        while matches!(self.peek(), Some(ch) if is_id_continue(ch)) {
            self.advance();
        }
        let text = &self.source[start..self.current_pos];
        match text {
            "import" => TokenKind::Import,
            "export" => TokenKind::Export,
            "const" => TokenKind::Const,
            "default" => TokenKind::Default,
            "throw" => TokenKind::Throw,
            "new" => TokenKind::New,
            "true" => TokenKind::True,
            "false" => TokenKind::False,
            "null" => TokenKind::Null,
            _ => TokenKind::Identifier(text.to_string()),
        }
    }
}

fn is_id_start(ch: char) -> bool {
    ch == '$' || ch == '_' || ch.is_xid_start()
}

fn is_id_continue(ch: char) -> bool {
    ch == '$' || ch.is_xid_continue()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        Scanner::new(source)
            .scan_all()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_scan_import_statement() {
        assert_eq!(
            kinds("import { x } from 'dep';"),
            vec![
                TokenKind::Import,
                TokenKind::LeftBrace,
                TokenKind::Identifier("x".to_string()),
                TokenKind::RightBrace,
                TokenKind::Identifier("from".to_string()),
                TokenKind::String("dep".to_string()),
                TokenKind::Semicolon,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_scan_numbers() {
        assert_eq!(
            kinds("1 2.5 3e2"),
            vec![
                TokenKind::Number(1.0),
                TokenKind::Number(2.5),
                TokenKind::Number(300.0),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_scan_string_escapes() {
        assert_eq!(
            kinds(r#""a\nb""#),
            vec![TokenKind::String("a\nb".to_string()), TokenKind::Eof]
        );
    }

    #[test]
    fn test_comments_are_skipped() {
        assert_eq!(
            kinds("// line\n1 /* block */ + 2"),
            vec![
                TokenKind::Number(1.0),
                TokenKind::Plus,
                TokenKind::Number(2.0),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_unterminated_string_is_invalid() {
        assert!(matches!(kinds("'oops")[0], TokenKind::Invalid(_)));
    }

    #[test]
    fn test_line_col() {
        let source = "const a = 1;\nthrow new Error('x');";
        assert_eq!(line_col(source, 0), (1, 1));
        assert_eq!(line_col(source, 13), (2, 1));
        assert_eq!(line_col(source, 19), (2, 7));
    }
}
