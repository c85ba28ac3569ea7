use std::collections::HashMap;

use anyhow::{Result, anyhow, bail};

use crate::ast::{BinOp, Expr};

/// A value flowing through expression evaluation: a single number or an
/// element-wise series. Scalars broadcast against series.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Scalar(f64),
    Series(Vec<f64>),
}

/// Variable name to operand.
pub type Bindings = HashMap<String, Operand>;

impl Operand {
    /// Number of elements; a scalar has none of its own.
    pub fn len(&self) -> Option<usize> {
        match self {
            Operand::Scalar(_) => None,
            Operand::Series(v) => Some(v.len()),
        }
    }

    /// Expand to a series of `len` elements. A series of a different length
    /// is an error.
    pub fn into_series(self, len: usize) -> Result<Vec<f64>> {
        match self {
            Operand::Scalar(v) => Ok(vec![v; len]),
            Operand::Series(v) if v.len() == len => Ok(v),
            Operand::Series(v) => bail!("series of length {} where {} expected", v.len(), len),
        }
    }

    fn map(self, f: impl Fn(f64) -> f64) -> Operand {
        match self {
            Operand::Scalar(v) => Operand::Scalar(f(v)),
            Operand::Series(mut v) => {
                v.iter_mut().for_each(|x| *x = f(*x));
                Operand::Series(v)
            }
        }
    }

    fn zip(self, other: Operand, op: BinOp) -> Result<Operand> {
        Ok(match (self, other) {
            (Operand::Scalar(l), Operand::Scalar(r)) => Operand::Scalar(op.apply(l, r)),
            (Operand::Scalar(l), Operand::Series(mut r)) => {
                r.iter_mut().for_each(|x| *x = op.apply(l, *x));
                Operand::Series(r)
            }
            (Operand::Series(mut l), Operand::Scalar(r)) => {
                l.iter_mut().for_each(|x| *x = op.apply(*x, r));
                Operand::Series(l)
            }
            (Operand::Series(mut l), Operand::Series(r)) => {
                if l.len() != r.len() {
                    bail!(
                        "operand length mismatch for '{}': {} vs {}",
                        op.symbol(),
                        l.len(),
                        r.len()
                    );
                }
                l.iter_mut()
                    .zip(r)
                    .for_each(|(x, y)| *x = op.apply(*x, y));
                Operand::Series(l)
            }
        })
    }
}

impl Expr {
    /// Evaluate against the given bindings. Every variable must be bound.
    pub fn eval(&self, bindings: &Bindings) -> Result<Operand> {
        match self {
            Expr::Number(n) => Ok(Operand::Scalar(*n)),
            Expr::Var(name) => bindings
                .get(name)
                .cloned()
                .ok_or_else(|| anyhow!("unbound variable '{name}'")),
            Expr::Neg(inner) => Ok(inner.eval(bindings)?.map(|v| -v)),
            Expr::Call(func, arg) => {
                let func = *func;
                Ok(arg.eval(bindings)?.map(|v| func.apply(v)))
            }
            Expr::BinOp { op, left, right } => {
                let l = left.eval(bindings)?;
                let r = right.eval(bindings)?;
                l.zip(r, *op)
            }
        }
    }
}
