use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use anyhow::{Result, anyhow, bail};
use gr_expr::{Bindings, Expr, Operand};

/// A named callable: receives its arguments by name, returns a scalar or a
/// series.
pub type Callable = Arc<dyn Fn(&Bindings) -> Result<Operand> + Send + Sync>;

pub const BUILTIN_OWNER: &str = "builtin";

// ---------------------------------------------------------------------------
// ParameterFunction
// ---------------------------------------------------------------------------

/// How a derived column is computed.
#[derive(Debug, Clone)]
pub enum ParameterFunction {
    /// Arithmetic expression over the argument names, e.g. `(T / 10000) - 10`.
    NumericExpression { id: String, expr: Expr },
    /// A callable registered in a [`FunctionRegistry`] under `(owner, name)`.
    NamedCallable {
        id: String,
        owner: String,
        name: String,
    },
}

impl ParameterFunction {
    pub fn id(&self) -> &str {
        match self {
            Self::NumericExpression { id, .. } | Self::NamedCallable { id, .. } => id,
        }
    }

    pub fn evaluate(&self, args: &Bindings, registry: &FunctionRegistry) -> Result<Operand> {
        match self {
            Self::NumericExpression { expr, .. } => expr.eval(args),
            Self::NamedCallable { owner, name, .. } => {
                let f = registry
                    .get(owner, name)
                    .ok_or_else(|| anyhow!("no callable registered as {owner}.{name}"))?;
                f(args)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// FunctionRegistry
// ---------------------------------------------------------------------------

/// Named callables keyed by `(owner, name)`.
#[derive(Clone, Default)]
pub struct FunctionRegistry {
    callables: HashMap<(String, String), Callable>,
}

impl fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<String> = self
            .callables
            .keys()
            .map(|(o, n)| format!("{o}.{n}"))
            .collect();
        keys.sort();
        f.debug_struct("FunctionRegistry")
            .field("callables", &keys)
            .finish()
    }
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with the `builtin` owner.
    pub fn with_builtins() -> Self {
        let mut reg = Self::new();
        reg.register(BUILTIN_OWNER, "identity", Arc::new(builtin_identity));
        reg.register(BUILTIN_OWNER, "polyval", Arc::new(builtin_polyval));
        reg.register(BUILTIN_OWNER, "linear_interp", Arc::new(builtin_linear_interp));
        reg
    }

    pub fn register(&mut self, owner: impl Into<String>, name: impl Into<String>, f: Callable) {
        self.callables.insert((owner.into(), name.into()), f);
    }

    pub fn get(&self, owner: &str, name: &str) -> Option<&Callable> {
        self.callables.get(&(owner.to_string(), name.to_string()))
    }

    pub fn contains(&self, owner: &str, name: &str) -> bool {
        self.get(owner, name).is_some()
    }
}

// ---------------------------------------------------------------------------
// builtin owner
// ---------------------------------------------------------------------------

fn arg<'a>(args: &'a Bindings, name: &str) -> Result<&'a Operand> {
    args.get(name)
        .ok_or_else(|| anyhow!("missing argument '{name}'"))
}

/// `identity(x)`
fn builtin_identity(args: &Bindings) -> Result<Operand> {
    Ok(arg(args, "x")?.clone())
}

/// `polyval(x, c0, c1, ..., cN)` = `c0 + c1*x + ... + cN*x^N`.
fn builtin_polyval(args: &Bindings) -> Result<Operand> {
    let x = arg(args, "x")?;
    let mut coeffs: Vec<(usize, f64)> = Vec::new();
    for (name, value) in args {
        let Some(idx) = name.strip_prefix('c').and_then(|n| n.parse::<usize>().ok()) else {
            continue;
        };
        let Operand::Scalar(c) = value else {
            bail!("polyval coefficient '{name}' must be a scalar");
        };
        coeffs.push((idx, *c));
    }
    if coeffs.is_empty() {
        bail!("polyval requires at least one coefficient c0..cN");
    }
    coeffs.sort_by_key(|(i, _)| *i);
    let degree = coeffs.last().map(|(i, _)| *i).unwrap_or(0);
    let mut dense = vec![0.0; degree + 1];
    for (i, c) in coeffs {
        dense[i] = c;
    }
    let horner = |v: f64| dense.iter().rev().fold(0.0, |acc, c| acc * v + c);
    Ok(match x {
        Operand::Scalar(v) => Operand::Scalar(horner(*v)),
        Operand::Series(vs) => Operand::Series(vs.iter().map(|v| horner(*v)).collect()),
    })
}

/// `linear_interp(t, t0, t1, v0, v1)`: value at `t` on the line through
/// `(t0, v0)` and `(t1, v1)`. Used for secondary calibration between pre-
/// and post-deployment coefficients.
fn builtin_linear_interp(args: &Bindings) -> Result<Operand> {
    let t = arg(args, "t")?;
    let len = [t, arg(args, "t0")?, arg(args, "t1")?, arg(args, "v0")?, arg(args, "v1")?]
        .iter()
        .filter_map(|o| o.len())
        .max();
    let Some(len) = len else {
        let s = |n: &str| match arg(args, n) {
            Ok(Operand::Scalar(v)) => Ok(*v),
            _ => Err(anyhow!("argument '{n}' must be a scalar")),
        };
        return Ok(Operand::Scalar(interp(s("t")?, s("t0")?, s("t1")?, s("v0")?, s("v1")?)));
    };
    let series = |n: &str| arg(args, n).and_then(|o| o.clone().into_series(len));
    let (t, t0, t1, v0, v1) = (
        series("t")?,
        series("t0")?,
        series("t1")?,
        series("v0")?,
        series("v1")?,
    );
    Ok(Operand::Series(
        (0..len)
            .map(|i| interp(t[i], t0[i], t1[i], v0[i], v1[i]))
            .collect(),
    ))
}

fn interp(t: f64, t0: f64, t1: f64, v0: f64, v1: f64) -> f64 {
    if t1 == t0 {
        return v0;
    }
    v0 + (t - t0) * (v1 - v0) / (t1 - t0)
}
