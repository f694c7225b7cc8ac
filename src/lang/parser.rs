//! Recursive-descent parser for the pipeline language
//!
//! Grammar, lowest precedence first:
//!
//! ```text
//! Program   := (Definition | Expression)*
//! Definition:= "pipeline" Name "=" Expression
//! Expression:= Parallel
//! Parallel  := Sequence ( "|" Sequence )*
//! Sequence  := Timed ( ("->" | "~>") Timed )*
//! Timed     := Primary ( "@" Number "s" )?
//! Primary   := "(" Expression ")"
//!            | Name ( "with" "(" ParamList? ")" )?
//! ```

use super::ast::{Definition, Expr, LinkKind, Params, Program, Value};
use super::token::{Token, TokenKind};
use thiserror::Error;

/// Syntax error with source position and what was expected there.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("line {line}, column {column}: expected {expected}, found {found}")]
pub struct ParseError {
    pub line: u32,
    pub column: u32,
    pub expected: String,
    pub found: String,
}

pub struct Parser {
    tokens: Vec<Token>,
    position: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            position: 0,
        }
    }

    fn current(&self) -> &Token {
        // The token stream always ends with Eof, so the last token is a
        // safe fallback.
        self.tokens
            .get(self.position)
            .unwrap_or_else(|| self.tokens.last().unwrap())
    }

    fn advance(&mut self) -> Token {
        let token = self.current().clone();
        if self.position < self.tokens.len() - 1 {
            self.position += 1;
        }
        token
    }

    fn error(&self, expected: impl Into<String>) -> ParseError {
        let token = self.current();
        ParseError {
            line: token.line,
            column: token.column,
            expected: expected.into(),
            found: token.kind.to_string(),
        }
    }

    fn expect(&mut self, kind: &TokenKind, expected: &str) -> Result<Token, ParseError> {
        if &self.current().kind == kind {
            Ok(self.advance())
        } else {
            Err(self.error(expected))
        }
    }

    /// Parse the whole program. Later definitions shadow earlier ones; the
    /// executable tail is the last non-definition expression.
    pub fn parse(mut self) -> Result<Program, ParseError> {
        let mut program = Program::default();

        while self.current().kind != TokenKind::Eof {
            if self.current().kind == TokenKind::Pipeline {
                program.definitions.push(self.parse_definition()?);
            } else {
                program.body = Some(self.parse_expression()?);
            }
        }

        Ok(program)
    }

    fn parse_definition(&mut self) -> Result<Definition, ParseError> {
        self.advance(); // 'pipeline'

        let name = match self.current().kind.clone() {
            TokenKind::Ident(name) => {
                self.advance();
                name
            }
            _ => return Err(self.error("pipeline name")),
        };

        self.expect(&TokenKind::Equals, "'=' after pipeline name")?;
        let body = self.parse_expression()?;
        Ok(Definition { name, body })
    }

    fn parse_expression(&mut self) -> Result<Expr, ParseError> {
        self.parse_parallel()
    }

    fn parse_parallel(&mut self) -> Result<Expr, ParseError> {
        let first = self.parse_sequence()?;

        if self.current().kind != TokenKind::Pipe {
            return Ok(first);
        }

        let mut branches = vec![first];
        while self.current().kind == TokenKind::Pipe {
            self.advance();
            branches.push(self.parse_sequence()?);
        }
        Ok(Expr::Par { branches })
    }

    fn parse_sequence(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_timed()?;

        loop {
            let link = match self.current().kind {
                TokenKind::Arrow => LinkKind::Sync,
                TokenKind::AsyncArrow => LinkKind::Async,
                _ => break,
            };
            self.advance();
            let right = self.parse_timed()?;
            left = Expr::Seq {
                left: Box::new(left),
                right: Box::new(right),
                link,
            };
        }
        Ok(left)
    }

    fn parse_timed(&mut self) -> Result<Expr, ParseError> {
        let primary = self.parse_primary()?;

        if self.current().kind != TokenKind::At {
            return Ok(primary);
        }
        self.advance(); // '@'

        let seconds = match self.current().kind {
            TokenKind::Int(v) if v > 0 => v as f64,
            TokenKind::Float(v) if v > 0.0 => v,
            _ => return Err(self.error("positive duration after '@'")),
        };
        self.advance();

        match &self.current().kind {
            TokenKind::Ident(suffix) if suffix == "s" => {
                self.advance();
            }
            _ => return Err(self.error("'s' after duration")),
        }

        Ok(Expr::Timed {
            inner: Box::new(primary),
            seconds,
        })
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        match self.current().kind.clone() {
            TokenKind::LParen => {
                self.advance();
                let inner = self.parse_expression()?;
                self.expect(&TokenKind::RParen, "')'")?;
                Ok(Expr::Group {
                    inner: Box::new(inner),
                })
            }
            TokenKind::Ident(name) => {
                self.advance();
                let params = if self.current().kind == TokenKind::With {
                    self.advance();
                    self.expect(&TokenKind::LParen, "'(' after 'with'")?;
                    let params = self.parse_param_list()?;
                    self.expect(&TokenKind::RParen, "')'")?;
                    params
                } else {
                    Params::new()
                };
                Ok(Expr::Call { name, params })
            }
            _ => Err(self.error("function name or '('")),
        }
    }

    fn parse_param_list(&mut self) -> Result<Params, ParseError> {
        let mut params = Params::new();
        let mut positional = 0usize;

        while self.current().kind != TokenKind::RParen {
            // `name: value` when a colon follows an identifier, otherwise a
            // positional value bound as arg0, arg1, ...
            let key = match self.current().kind.clone() {
                TokenKind::Ident(name)
                    if self
                        .tokens
                        .get(self.position + 1)
                        .is_some_and(|t| t.kind == TokenKind::Colon) =>
                {
                    self.advance(); // name
                    self.advance(); // ':'
                    name
                }
                _ => {
                    let key = format!("arg{}", positional);
                    positional += 1;
                    key
                }
            };

            let value = self.parse_value()?;
            params.insert(key, value);

            match self.current().kind {
                TokenKind::Comma => {
                    self.advance();
                }
                TokenKind::RParen => break,
                _ => return Err(self.error("',' or ')'")),
            }
        }

        Ok(params)
    }

    fn parse_value(&mut self) -> Result<Value, ParseError> {
        match self.current().kind.clone() {
            TokenKind::Int(v) => {
                self.advance();
                Ok(Value::Int(v))
            }
            TokenKind::Float(v) => {
                self.advance();
                Ok(Value::Float(v))
            }
            TokenKind::Str(s) => {
                self.advance();
                Ok(Value::Str(s))
            }
            TokenKind::Ident(name) => {
                self.advance();
                match name.as_str() {
                    "true" => Ok(Value::Bool(true)),
                    "false" => Ok(Value::Bool(false)),
                    _ => Ok(Value::Symbol(name)),
                }
            }
            TokenKind::LBracket => {
                self.advance();
                let mut items = Vec::new();
                loop {
                    let item = match self.current().kind {
                        TokenKind::Int(v) => v as f64,
                        TokenKind::Float(v) => v,
                        _ => return Err(self.error("number in array")),
                    };
                    self.advance();
                    items.push(item);
                    match self.current().kind {
                        TokenKind::Comma => {
                            self.advance();
                        }
                        TokenKind::RBracket => break,
                        _ => return Err(self.error("',' or ']'")),
                    }
                }
                self.advance(); // ']'
                Ok(Value::Array(items))
            }
            _ => Err(self.error("parameter value")),
        }
    }
}
