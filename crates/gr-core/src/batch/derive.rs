use anyhow::{anyhow, bail};
use gr_expr::{Bindings, Operand};

use super::RecordBatch;
use crate::schema::{ArgumentSource, Derivation, ParameterKind, ParameterSpec};
use crate::value::Value;

impl RecordBatch {
    /// Data for `name` from any schema column: stored data, a broadcast
    /// lookup coefficient, or a freshly evaluated derivation. `stack` holds
    /// the derivations currently being evaluated.
    pub(super) fn resolve_column(&mut self, name: &str, stack: &mut Vec<String>) -> Option<Vec<Value>> {
        if let Some(values) = self.columns.get(name) {
            return Some(values.clone());
        }
        if let Some(v) = self.lookup_scalars.get(name) {
            return Some(vec![v.clone(); self.len()]);
        }
        let spec = self.schema.parameter(name)?.clone();
        if spec.kind != ParameterKind::Function || self.failed.contains(name) {
            return None;
        }
        self.evaluate_derived(&spec, stack)
    }

    fn evaluate_derived(&mut self, spec: &ParameterSpec, stack: &mut Vec<String>) -> Option<Vec<Value>> {
        let derivation = spec.derivation.as_ref()?;
        if stack.iter().any(|s| s == &spec.name) {
            log::warn!("derived column {:?} depends on itself; left absent", spec.name);
            return None;
        }

        stack.push(spec.name.clone());
        let result = self.compute(spec, derivation, stack);
        stack.pop();

        match result {
            Ok(values) => {
                self.columns.insert(spec.name.clone(), values.clone());
                self.derived.insert(spec.name.clone());
                Some(values)
            }
            Err(e) => {
                log::warn!(
                    "derived column {:?} ({}) left absent: {e:#}",
                    spec.name,
                    derivation.function.id()
                );
                self.failed.insert(spec.name.clone());
                None
            }
        }
    }

    /// Bind every argument, call the function, then re-apply fill values at
    /// positions where any column argument was missing.
    fn compute(
        &mut self,
        spec: &ParameterSpec,
        derivation: &Derivation,
        stack: &mut Vec<String>,
    ) -> anyhow::Result<Vec<Value>> {
        let rows = self.len();
        let mut bindings = Bindings::new();
        let mut missing = vec![false; rows];

        for (arg, source) in &derivation.arguments {
            let operand = match source {
                ArgumentSource::Literal(v) => Operand::Scalar(
                    v.as_f64()
                        .ok_or_else(|| anyhow!("literal argument '{arg}' = {v} is not numeric"))?,
                ),
                ArgumentSource::Column(col) => {
                    self.column_operand(arg, col, rows, &mut missing, stack)?
                }
            };
            bindings.insert(arg.clone(), operand);
        }

        let out = derivation
            .function
            .evaluate(&bindings, &self.ctx.functions)?
            .into_series(rows)?;

        let mut values = Vec::with_capacity(rows);
        for (x, is_missing) in out.into_iter().zip(missing) {
            if is_missing || !x.is_finite() {
                values.push(spec.fill_value.clone());
            } else {
                values.push(spec.encoding.coerce(&Value::Float(x)).map_err(|e| anyhow!("{e}"))?);
            }
        }
        Ok(values)
    }

    fn column_operand(
        &mut self,
        arg: &str,
        column: &str,
        rows: usize,
        missing: &mut [bool],
        stack: &mut Vec<String>,
    ) -> anyhow::Result<Operand> {
        let dep = self
            .schema
            .parameter(column)
            .cloned()
            .ok_or_else(|| anyhow!("argument '{arg}' names unknown column {column:?}"))?;

        if dep.kind == ParameterKind::Lookup {
            if let Some(v) = self.lookup_scalars.get(column) {
                return numeric(v, arg).map(Operand::Scalar);
            }
            // A caller-supplied single coefficient broadcasts like a fetched one.
            if let Some([v]) = self.columns.get(column).map(Vec::as_slice)
                && rows != 1
            {
                if dep.is_fill(v) {
                    bail!("lookup argument '{arg}' ({column:?}) holds only its fill value");
                }
                return numeric(v, arg).map(Operand::Scalar);
            }
        }

        let values = self
            .resolve_column(column, stack)
            .ok_or_else(|| anyhow!("argument '{arg}' ({column:?}) is absent"))?;
        if values.len() != rows {
            bail!(
                "argument '{arg}' ({column:?}) has {} rows, batch has {rows}",
                values.len()
            );
        }
        let mut series = Vec::with_capacity(rows);
        for (i, v) in values.iter().enumerate() {
            if dep.is_fill(v) {
                missing[i] = true;
                series.push(0.0);
            } else {
                series.push(numeric(v, arg)?);
            }
        }
        Ok(Operand::Series(series))
    }
}

fn numeric(v: &Value, arg: &str) -> anyhow::Result<f64> {
    v.as_f64()
        .ok_or_else(|| anyhow!("argument '{arg}' value {v} is not numeric"))
}
