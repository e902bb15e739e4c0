//! Lexer: turns source text into tokens with line/column spans.

use super::ParseError;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Span {
    pub line: u32,
    pub column: u32,
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    /// `int32_t`
    TypeInt32,
    Identifier(String),
    /// Magnitude of a decimal constant; its sign is applied by the parser
    Constant(u32),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
    Assign,
    Semicolon,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::TypeInt32 => write!(f, "int32_t"),
            TokenKind::Identifier(name) => write!(f, "{}", name),
            TokenKind::Constant(value) => write!(f, "{}", value),
            TokenKind::Plus => write!(f, "'+'"),
            TokenKind::Minus => write!(f, "'-'"),
            TokenKind::Star => write!(f, "'*'"),
            TokenKind::Slash => write!(f, "'/'"),
            TokenKind::LParen => write!(f, "'('"),
            TokenKind::RParen => write!(f, "')'"),
            TokenKind::Assign => write!(f, "'='"),
            TokenKind::Semicolon => write!(f, "';'"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
    /// Local slot of an identifier, filled in by name resolution
    pub slot: Option<u32>,
}

impl Token {
    pub fn new(kind: TokenKind, span: Span) -> Self {
        Self {
            kind,
            span,
            slot: None,
        }
    }
}

#[derive(Debug)]
pub struct ParserState<'a> {
    input: &'a str,
    bytes: &'a [u8],
    position: usize,
    line: u32,
    column: u32,
}

impl<'a> ParserState<'a> {
    pub fn new(input: &'a str) -> Self {
        ParserState {
            input,
            bytes: input.as_bytes(),
            position: 0,
            line: 1,
            column: 1,
        }
    }

    pub fn current_char(&self) -> Option<char> {
        self.input[self.position..].chars().next()
    }

    pub fn advance(&mut self) {
        if let Some(c) = self.current_char() {
            self.position += c.len_utf8();
            if c == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
    }

    pub fn is_eof(&self) -> bool {
        self.position >= self.input.len()
    }

    fn span(&self) -> Span {
        Span {
            line: self.line,
            column: self.column,
        }
    }

    pub fn skip_whitespace(&mut self) {
        while !self.is_eof() && self.bytes[self.position].is_ascii_whitespace() {
            self.advance();
        }
    }

    fn take_while(&mut self, pred: impl Fn(u8) -> bool) -> &'a str {
        let start = self.position;
        while !self.is_eof() && pred(self.bytes[self.position]) {
            self.advance();
        }
        &self.input[start..self.position]
    }

    /// Next token, `None` at end of input
    pub fn next_token(&mut self) -> Result<Option<Token>, ParseError> {
        self.skip_whitespace();
        let span = self.span();
        let Some(c) = self.current_char() else {
            return Ok(None);
        };

        let kind = match c {
            '+' => TokenKind::Plus,
            '-' => TokenKind::Minus,
            '*' => TokenKind::Star,
            '/' => TokenKind::Slash,
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '=' => TokenKind::Assign,
            ';' => TokenKind::Semicolon,
            c if c.is_ascii_digit() => {
                let digits = self.take_while(|b| b.is_ascii_digit());
                let value = digits.parse::<u32>().map_err(|_| ParseError::ConstantOverflow {
                    text: digits.to_string(),
                    span,
                })?;
                return Ok(Some(Token::new(TokenKind::Constant(value), span)));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let word = self.take_while(|b| b.is_ascii_alphanumeric() || b == b'_');
                let kind = if word == "int32_t" {
                    TokenKind::TypeInt32
                } else {
                    TokenKind::Identifier(word.to_string())
                };
                return Ok(Some(Token::new(kind, span)));
            }
            other => return Err(ParseError::UnexpectedChar { ch: other, span }),
        };

        self.advance();
        Ok(Some(Token::new(kind, span)))
    }
}

/// Split `source` into tokens
pub fn tokenize(source: &str) -> Result<Vec<Token>, ParseError> {
    let mut state = ParserState::new(source);
    let mut tokens = Vec::new();
    while let Some(token) = state.next_token()? {
        tokens.push(token);
    }
    tracing::debug!(count = tokens.len(), "tokenized source");
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source)
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_declaration_tokens() {
        assert_eq!(
            kinds("int32_t value1 = (1 + 2) * 3;\n"),
            vec![
                TokenKind::TypeInt32,
                TokenKind::Identifier("value1".to_string()),
                TokenKind::Assign,
                TokenKind::LParen,
                TokenKind::Constant(1),
                TokenKind::Plus,
                TokenKind::Constant(2),
                TokenKind::RParen,
                TokenKind::Star,
                TokenKind::Constant(3),
                TokenKind::Semicolon,
            ]
        );
    }

    #[test]
    fn test_spans_track_lines() {
        let tokens = tokenize("a = 1;\n  b = 2;").unwrap();
        assert_eq!(tokens[0].span, Span { line: 1, column: 1 });
        assert_eq!(tokens[4].span, Span { line: 2, column: 3 });
    }

    #[test]
    fn test_identifier_with_type_prefix() {
        assert_eq!(
            kinds("int32_tx"),
            vec![TokenKind::Identifier("int32_tx".to_string())]
        );
    }

    #[test]
    fn test_lexical_errors() {
        assert!(matches!(
            tokenize("a = 1 % 2;"),
            Err(ParseError::UnexpectedChar { ch: '%', .. })
        ));
        assert!(matches!(
            tokenize("a = 4294967296;"),
            Err(ParseError::ConstantOverflow { .. })
        ));
        // the range of a signed constant is checked by the parser
        assert_eq!(kinds("2147483648"), vec![TokenKind::Constant(2147483648)]);
    }
}
