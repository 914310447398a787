//! Target expression tree
//!
//! A target is a pure tree of function calls over series selectors and
//! literals. Nodes own their children and never point back to a parent.

use std::fmt;

/// One node of a parsed target
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Glob-like path pattern resolved by the storage layer
    Selector(SeriesSelector),
    /// Number, string or boolean argument
    Literal(Literal),
    /// `name(arg, ...)`
    Call(FunctionCall),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SeriesSelector {
    pub pattern: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    /// The source spelling is kept so names render the way they were written
    Number { value: f64, text: String },
    String { value: String, quote: char },
    Boolean(bool),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionCall {
    pub name: String,
    pub args: Vec<Expr>,
}

/// Static kind of an argument, checked before any evaluation happens
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    Series,
    Number,
    String,
    Boolean,
}

impl fmt::Display for ArgKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Series => write!(f, "series"),
            Self::Number => write!(f, "number"),
            Self::String => write!(f, "string"),
            Self::Boolean => write!(f, "boolean"),
        }
    }
}

impl Expr {
    pub fn kind(&self) -> ArgKind {
        match self {
            Self::Selector(_) | Self::Call(_) => ArgKind::Series,
            Self::Literal(Literal::Number { .. }) => ArgKind::Number,
            Self::Literal(Literal::String { .. }) => ArgKind::String,
            Self::Literal(Literal::Boolean(_)) => ArgKind::Boolean,
        }
    }

    pub fn selector(pattern: impl Into<String>) -> Self {
        Self::Selector(SeriesSelector {
            pattern: pattern.into(),
        })
    }

    pub fn number(value: f64) -> Self {
        Self::Literal(Literal::Number {
            value,
            text: value.to_string(),
        })
    }

    pub fn string(value: impl Into<String>) -> Self {
        Self::Literal(Literal::String {
            value: value.into(),
            quote: '"',
        })
    }

    pub fn call(name: impl Into<String>, args: Vec<Expr>) -> Self {
        Self::Call(FunctionCall {
            name: name.into(),
            args,
        })
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Literal(Literal::Number { value, .. }) => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Literal(Literal::String { value, .. }) => Some(value),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Literal(Literal::Boolean(b)) => Some(*b),
            _ => None,
        }
    }
}

impl FunctionCall {
    /// Canonical text of the call, used to name the series it produces.
    pub fn text(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Selector(selector) => write!(f, "{}", selector.pattern),
            Self::Literal(literal) => write!(f, "{literal}"),
            Self::Call(call) => write!(f, "{call}"),
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number { text, .. } => write!(f, "{text}"),
            Self::String { value, quote } => {
                write!(f, "{quote}")?;
                for c in value.chars() {
                    if c == *quote || c == '\\' {
                        write!(f, "\\")?;
                    }
                    write!(f, "{c}")?;
                }
                write!(f, "{quote}")
            }
            Self::Boolean(b) => write!(f, "{b}"),
        }
    }
}

impl fmt::Display for FunctionCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{arg}")?;
        }
        write!(f, ")")
    }
}
