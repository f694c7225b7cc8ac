//! Language front end: lexer, syntax tree, recursive-descent parser

pub mod ast;
pub mod lexer;
pub mod parser;
pub mod token;

pub use ast::{Definition, Expr, LinkKind, Params, Program, Value};
pub use lexer::{LexError, Lexer};
pub use parser::{ParseError, Parser};
pub use token::{Token, TokenKind};

/// Lex and parse a source string in one step.
pub fn parse_source(source: &str) -> Result<Program, crate::PipelineError> {
    let tokens = Lexer::new(source).tokenize()?;
    let program = Parser::new(tokens).parse()?;
    Ok(program)
}
