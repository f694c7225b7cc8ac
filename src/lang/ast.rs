//! Syntax tree for the pipeline language
//!
//! A program is a list of named pipeline definitions plus an optional
//! executable expression. Expressions form a small tagged union; grouping
//! is kept as an explicit variant so the pretty-printer can round-trip
//! exactly what was written.

use std::collections::BTreeMap;
use std::fmt;

/// A literal parameter value inside a `with (...)` clause.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    /// Numeric array, e.g. an `[r, g, b]` color triple
    Array(Vec<f64>),
    /// Bare identifier, forwarded verbatim to the transform
    Symbol(String),
}

impl Value {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            Value::Float(v) if v.fract() == 0.0 => Some(*v as i64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) | Value::Symbol(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[f64]> {
        match self {
            Value::Array(v) => Some(v),
            _ => None,
        }
    }
}

/// Writes a float in a form that re-lexes as a number.
fn write_number(f: &mut fmt::Formatter<'_>, v: f64) -> fmt::Result {
    if v.fract() == 0.0 {
        write!(f, "{}", v as i64)
    } else {
        write!(f, "{}", v)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{:?}", v),
            Value::Str(s) => {
                write!(f, "\"")?;
                for ch in s.chars() {
                    match ch {
                        '\n' => write!(f, "\\n")?,
                        '\t' => write!(f, "\\t")?,
                        '\\' => write!(f, "\\\\")?,
                        '"' => write!(f, "\\\"")?,
                        other => write!(f, "{}", other)?,
                    }
                }
                write!(f, "\"")
            }
            Value::Bool(b) => write!(f, "{}", b),
            Value::Array(items) => {
                write!(f, "[")?;
                for (i, v) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write_number(f, *v)?;
                }
                write!(f, "]")
            }
            Value::Symbol(s) => write!(f, "{}", s),
        }
    }
}

/// Keyword parameters bound at a call site. Ordered so printing is
/// deterministic.
pub type Params = BTreeMap<String, Value>;

/// Which sequential operator connected two stages. Both compose the same
/// way; the link only selects the downstream edge capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
    /// `->`
    Sync,
    /// `~>`
    Async,
}

/// A pipeline expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Reference to a registered function or a previously defined pipeline
    Call { name: String, params: Params },
    /// Sequential composition: output of `left` feeds input of `right`
    Seq {
        left: Box<Expr>,
        right: Box<Expr>,
        link: LinkKind,
    },
    /// Parallel fan-out with implicit merge at the next sequential stage
    Par { branches: Vec<Expr> },
    /// Bound to a wall-clock duration in seconds
    Timed { inner: Box<Expr>, seconds: f64 },
    /// Parenthesized sub-expression
    Group { inner: Box<Expr> },
}

/// Binding of a name to a pipeline expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Definition {
    pub name: String,
    pub body: Expr,
}

/// A whole source file: definitions plus the executable tail.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program {
    pub definitions: Vec<Definition>,
    pub body: Option<Expr>,
}

// Precedence levels for parenthesis-free printing. Mirrors the grammar:
// `|` binds loosest, then the sequential arrows, then `@`.
const PREC_PAR: u8 = 0;
const PREC_SEQ: u8 = 1;
const PREC_TIMED: u8 = 2;

impl Expr {
    fn precedence(&self) -> u8 {
        match self {
            Expr::Par { .. } => PREC_PAR,
            Expr::Seq { .. } => PREC_SEQ,
            Expr::Timed { .. } => PREC_TIMED,
            Expr::Call { .. } | Expr::Group { .. } => u8::MAX,
        }
    }

    fn fmt_prec(&self, f: &mut fmt::Formatter<'_>, min: u8) -> fmt::Result {
        let parens = self.precedence() < min;
        if parens {
            write!(f, "(")?;
        }
        match self {
            Expr::Call { name, params } => {
                write!(f, "{}", name)?;
                if !params.is_empty() {
                    write!(f, " with (")?;
                    for (i, (key, value)) in params.iter().enumerate() {
                        if i > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "{}: {}", key, value)?;
                    }
                    write!(f, ")")?;
                }
            }
            Expr::Seq { left, right, link } => {
                left.fmt_prec(f, PREC_SEQ)?;
                match link {
                    LinkKind::Sync => write!(f, " -> ")?,
                    LinkKind::Async => write!(f, " ~> ")?,
                }
                // Right side at one level up keeps the printed tree
                // left-associated, matching the parser.
                right.fmt_prec(f, PREC_SEQ + 1)?;
            }
            Expr::Par { branches } => {
                for (i, branch) in branches.iter().enumerate() {
                    if i > 0 {
                        write!(f, " | ")?;
                    }
                    branch.fmt_prec(f, PREC_SEQ)?;
                }
            }
            Expr::Timed { inner, seconds } => {
                inner.fmt_prec(f, PREC_TIMED + 1)?;
                write!(f, " @ ")?;
                write_number(f, *seconds)?;
                write!(f, "s")?;
            }
            Expr::Group { inner } => {
                write!(f, "(")?;
                inner.fmt_prec(f, PREC_PAR)?;
                write!(f, ")")?;
            }
        }
        if parens {
            write!(f, ")")?;
        }
        Ok(())
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_prec(f, 0)
    }
}

impl fmt::Display for Definition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pipeline {} = {}", self.name, self.body)
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for def in &self.definitions {
            writeln!(f, "{}", def)?;
        }
        if let Some(body) = &self.body {
            writeln!(f, "{}", body)?;
        }
        Ok(())
    }
}
