//! Lexer for the pipeline language
//!
//! Turns a source string into a token stream terminated by [`TokenKind::Eof`].
//! Whitespace separates tokens, `#` comments run to end of line, and every
//! token records the 1-based line/column of its first character.

use super::token::{Token, TokenKind};
use thiserror::Error;

/// Lexical error with source position.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LexError {
    #[error("line {line}, column {column}: unterminated string")]
    UnterminatedString { line: u32, column: u32 },

    #[error("line {line}, column {column}: malformed number '{text}'")]
    MalformedNumber {
        text: String,
        line: u32,
        column: u32,
    },

    #[error("line {line}, column {column}: unexpected character '{ch}'")]
    UnexpectedChar { ch: char, line: u32, column: u32 },
}

pub struct Lexer {
    chars: Vec<char>,
    position: usize,
    line: u32,
    column: u32,
}

impl Lexer {
    pub fn new(source: &str) -> Self {
        Self {
            chars: source.chars().collect(),
            position: 0,
            line: 1,
            column: 1,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.position).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.position + offset).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.position += 1;
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(ch)
    }

    fn skip_whitespace_and_comments(&mut self) {
        while let Some(ch) = self.peek() {
            if ch.is_whitespace() {
                self.advance();
            } else if ch == '#' {
                while let Some(c) = self.peek() {
                    if c == '\n' {
                        break;
                    }
                    self.advance();
                }
            } else {
                break;
            }
        }
    }

    fn read_number(&mut self) -> Result<Token, LexError> {
        let (line, column) = (self.line, self.column);
        let mut text = String::new();
        let mut dots = 0usize;

        while let Some(ch) = self.peek() {
            if ch.is_ascii_digit() {
                text.push(ch);
                self.advance();
            } else if ch == '.' && self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) {
                dots += 1;
                text.push(ch);
                self.advance();
            } else {
                break;
            }
        }

        if dots > 1 {
            return Err(LexError::MalformedNumber { text, line, column });
        }

        let kind = if dots == 1 {
            match text.parse::<f64>() {
                Ok(v) => TokenKind::Float(v),
                Err(_) => return Err(LexError::MalformedNumber { text, line, column }),
            }
        } else {
            match text.parse::<i64>() {
                Ok(v) => TokenKind::Int(v),
                Err(_) => return Err(LexError::MalformedNumber { text, line, column }),
            }
        };
        Ok(Token::new(kind, line, column))
    }

    fn read_string(&mut self) -> Result<Token, LexError> {
        let (line, column) = (self.line, self.column);
        let quote = self.advance().unwrap_or('"');
        let mut value = String::new();

        loop {
            match self.peek() {
                None => return Err(LexError::UnterminatedString { line, column }),
                Some(ch) if ch == quote => {
                    self.advance();
                    return Ok(Token::new(TokenKind::Str(value), line, column));
                }
                Some('\\') => {
                    self.advance();
                    match self.advance() {
                        None => return Err(LexError::UnterminatedString { line, column }),
                        Some('n') => value.push('\n'),
                        Some('t') => value.push('\t'),
                        Some('\\') => value.push('\\'),
                        // Any other escaped character passes through verbatim
                        Some(other) => value.push(other),
                    }
                }
                Some(ch) => {
                    value.push(ch);
                    self.advance();
                }
            }
        }
    }

    fn read_identifier(&mut self) -> Token {
        let (line, column) = (self.line, self.column);
        let mut name = String::new();

        while let Some(ch) = self.peek() {
            if ch.is_ascii_alphanumeric() || ch == '_' {
                name.push(ch);
                self.advance();
            } else if ch == '-' {
                // A '-' continues the identifier only when what follows
                // continues it too, so `a->b` lexes as `a`, `->`, `b`
                // while `test-pattern` stays one name.
                match self.peek_at(1) {
                    Some(next) if next.is_ascii_alphanumeric() || next == '_' || next == '-' => {
                        name.push(ch);
                        self.advance();
                    }
                    _ => break,
                }
            } else {
                break;
            }
        }

        let kind = match name.as_str() {
            "pipeline" => TokenKind::Pipeline,
            "with" => TokenKind::With,
            _ => TokenKind::Ident(name),
        };
        Token::new(kind, line, column)
    }

    fn read_operator(&mut self) -> Result<Token, LexError> {
        let (line, column) = (self.line, self.column);
        let ch = self.peek().unwrap_or('\0');
        let next = self.peek_at(1);

        // Two-character operators are recognized before their first
        // character could lex as anything else.
        let two = match (ch, next) {
            ('-', Some('>')) => Some(TokenKind::Arrow),
            ('~', Some('>')) => Some(TokenKind::AsyncArrow),
            // Deprecated aliases from the source language
            ('=', Some('>')) => Some(TokenKind::Arrow),
            ('+', Some('>')) => Some(TokenKind::Arrow),
            ('&', Some('>')) => Some(TokenKind::Pipe),
            _ => None,
        };
        if let Some(kind) = two {
            self.advance();
            self.advance();
            return Ok(Token::new(kind, line, column));
        }

        let kind = match ch {
            '|' => TokenKind::Pipe,
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '[' => TokenKind::LBracket,
            ']' => TokenKind::RBracket,
            ',' => TokenKind::Comma,
            ':' => TokenKind::Colon,
            '@' => TokenKind::At,
            '=' => TokenKind::Equals,
            other => {
                return Err(LexError::UnexpectedChar {
                    ch: other,
                    line,
                    column,
                });
            }
        };
        self.advance();
        Ok(Token::new(kind, line, column))
    }

    /// Consume the whole source and return the token list, ending with Eof.
    pub fn tokenize(mut self) -> Result<Vec<Token>, LexError> {
        let mut tokens = Vec::new();

        loop {
            self.skip_whitespace_and_comments();
            let Some(ch) = self.peek() else { break };

            if ch.is_ascii_digit() {
                tokens.push(self.read_number()?);
            } else if ch == '"' || ch == '\'' {
                tokens.push(self.read_string()?);
            } else if ch.is_ascii_alphabetic() || ch == '_' {
                tokens.push(self.read_identifier());
            } else {
                tokens.push(self.read_operator()?);
            }
        }

        tokens.push(Token::new(TokenKind::Eof, self.line, self.column));
        Ok(tokens)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        Lexer::new(source)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_simple_pipeline() {
        assert_eq!(
            kinds("webcam -> blur -> display"),
            vec![
                TokenKind::Ident("webcam".into()),
                TokenKind::Arrow,
                TokenKind::Ident("blur".into()),
                TokenKind::Arrow,
                TokenKind::Ident("display".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_operators() {
        assert_eq!(
            kinds("a ~> b | c"),
            vec![
                TokenKind::Ident("a".into()),
                TokenKind::AsyncArrow,
                TokenKind::Ident("b".into()),
                TokenKind::Pipe,
                TokenKind::Ident("c".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_deprecated_operator_aliases() {
        assert_eq!(kinds("a => b")[1], TokenKind::Arrow);
        assert_eq!(kinds("a +> b")[1], TokenKind::Arrow);
        assert_eq!(kinds("a &> b")[1], TokenKind::Pipe);
    }

    #[test]
    fn test_identifier_with_dash() {
        assert_eq!(
            kinds("test-pattern->x"),
            vec![
                TokenKind::Ident("test-pattern".into()),
                TokenKind::Arrow,
                TokenKind::Ident("x".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_keywords() {
        assert_eq!(
            kinds("pipeline p = blur with (radius: 3)"),
            vec![
                TokenKind::Pipeline,
                TokenKind::Ident("p".into()),
                TokenKind::Equals,
                TokenKind::Ident("blur".into()),
                TokenKind::With,
                TokenKind::LParen,
                TokenKind::Ident("radius".into()),
                TokenKind::Colon,
                TokenKind::Int(3),
                TokenKind::RParen,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_numbers() {
        assert_eq!(kinds("42")[0], TokenKind::Int(42));
        assert_eq!(kinds("2.5")[0], TokenKind::Float(2.5));
        // Duration form: the suffix is a separate identifier token
        assert_eq!(
            kinds("3s"),
            vec![
                TokenKind::Int(3),
                TokenKind::Ident("s".into()),
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_malformed_number() {
        let err = Lexer::new("1.2.3").tokenize().unwrap_err();
        assert!(matches!(err, LexError::MalformedNumber { .. }));
    }

    #[test]
    fn test_strings_and_escapes() {
        assert_eq!(kinds("\"hi\\nthere\"")[0], TokenKind::Str("hi\nthere".into()));
        assert_eq!(kinds("'single'")[0], TokenKind::Str("single".into()));
        assert_eq!(kinds("\"a\\\"b\"")[0], TokenKind::Str("a\"b".into()));
    }

    #[test]
    fn test_unterminated_string() {
        let err = Lexer::new("\"oops").tokenize().unwrap_err();
        assert!(matches!(err, LexError::UnterminatedString { line: 1, column: 1 }));
    }

    #[test]
    fn test_unexpected_character() {
        let err = Lexer::new("a { b").tokenize().unwrap_err();
        assert!(matches!(err, LexError::UnexpectedChar { ch: '{', .. }));
    }

    #[test]
    fn test_comments_and_positions() {
        let tokens = Lexer::new("# header\nsrc -> sink").tokenize().unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Ident("src".into()));
        assert_eq!((tokens[0].line, tokens[0].column), (2, 1));
        assert_eq!(tokens[1].kind, TokenKind::Arrow);
        assert_eq!((tokens[1].line, tokens[1].column), (2, 5));
    }

    #[test]
    fn test_rgb_triple() {
        assert_eq!(
            kinds("[255, 0, 0]"),
            vec![
                TokenKind::LBracket,
                TokenKind::Int(255),
                TokenKind::Comma,
                TokenKind::Int(0),
                TokenKind::Comma,
                TokenKind::Int(0),
                TokenKind::RBracket,
                TokenKind::Eof,
            ]
        );
    }
}
