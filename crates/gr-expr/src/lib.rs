//! Numeric expression language for derived columns.
//!
//! Expressions such as `(T / 10000) - 10` or `P * p_range / (0.85 * 65536)`
//! are parsed once into an [`Expr`] tree and evaluated element-wise over
//! column series, broadcasting scalar operands.

pub mod ast;
mod eval;
mod parser;

pub use ast::{BinOp, Expr, UnaryFn};
pub use eval::{Bindings, Operand};
pub use parser::parse_expr;
