//! Graphite target language support
//!
//! A render request carries one or more *targets*: nested function calls
//! over metric path selectors. This module parses targets, checks them
//! against the function registry and evaluates them to time series.
//!
//! # Architecture
//!
//! ```text
//! target string → Lexer → Parser → AST (Expr) → Evaluator ⇄ FunctionRegistry
//!                                                   ↓
//!                                              MetricStore
//! ```
//!
//! # Modules
//!
//! - [`lexer`] - splits a target into words, strings and punctuation
//! - [`parser`] - builds the [`ast::Expr`] tree
//! - [`functions`] - the [`functions::SeriesFunction`] contract and the registry
//! - [`evaluator`] - recursive evaluation with cooperative cancellation
//! - [`context`] - request-scoped settings shared by every target
//! - [`error`] - error types for parsing and evaluation
//!
//! # Example
//!
//! ```ignore
//! use querier::query::graphite::{parser, Evaluator, EvaluationContext};
//!
//! let expr = parser::parse("averageSeries(servers.*.cpu.user)")?;
//! evaluator.validate(&expr)?;
//! let series = evaluator.eval(&expr, &context).await?;
//! ```
//!
//! # Supported syntax
//!
//! - Selectors: `a.b.c`, `a.*.c`, `a.web?.{cpu,mem}`, `a.[ab]x`
//! - Literals: numbers (`2`, `-0.5`, `1e3`), strings (`'x'`, `"x"`), `true`/`false`
//! - Calls: `name(arg, ...)` nested to any depth

pub mod ast;
pub mod context;
pub mod error;
pub mod evaluator;
pub mod functions;
pub mod lexer;
pub mod parser;

#[cfg(test)]
pub(crate) mod testing;

pub use ast::{Expr, FunctionCall};
pub use context::{EvaluationContext, ValueFormatter};
pub use error::{GraphiteError, GraphiteResult};
pub use evaluator::Evaluator;
pub use functions::{FunctionRegistry, SeriesFunction, Signature};
pub use parser::{parse, parse_with_max_depth};
