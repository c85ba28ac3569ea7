mod doc;
mod registry;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use orion_error::StructError;
use serde::{Deserialize, Serialize};

use crate::error::{CoreReason, CoreResult};
use crate::function::ParameterFunction;
use crate::value::{Value, ValueEncoding};

pub use doc::{SchemaDocument, parse_schema_document};
pub use registry::{MemorySchemaRegistry, SchemaRegistry};

// ---------------------------------------------------------------------------
// ParameterSpec
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterKind {
    /// Stored per timestep.
    Quantity,
    /// Stored per timestep, values change rarely.
    #[serde(alias = "constant")]
    Sparse,
    /// Computed from other columns.
    Function,
    /// Coefficient held in an external lookup store.
    Lookup,
}

impl ParameterKind {
    /// Whether the column store holds data for this kind.
    pub fn is_stored(self) -> bool {
        matches!(self, Self::Quantity | Self::Sparse)
    }
}

/// Where a function argument comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgumentSource {
    Column(String),
    Literal(Value),
}

#[derive(Debug, Clone)]
pub struct Derivation {
    pub function: Arc<ParameterFunction>,
    /// Argument name as seen by the function -> source.
    pub arguments: BTreeMap<String, ArgumentSource>,
}

impl Derivation {
    pub fn column_dependencies(&self) -> impl Iterator<Item = &str> {
        self.arguments.values().filter_map(|src| match src {
            ArgumentSource::Column(c) => Some(c.as_str()),
            ArgumentSource::Literal(_) => None,
        })
    }
}

/// External store binding of a lookup column. A column without a
/// `document_key` must be supplied by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupBinding {
    pub document_key: Option<String>,
    /// Name of the value inside the document.
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct ParameterSpec {
    pub name: String,
    pub kind: ParameterKind,
    pub encoding: ValueEncoding,
    pub fill_value: Value,
    pub units: Option<String>,
    pub derivation: Option<Derivation>,
    pub lookup: Option<LookupBinding>,
}

impl ParameterSpec {
    pub fn is_fill(&self, value: &Value) -> bool {
        *value == self.fill_value
    }
}

// ---------------------------------------------------------------------------
// SchemaDefinition
// ---------------------------------------------------------------------------

/// Ordered set of parameters with a temporal column, optionally restricted
/// to a subset of "available" fields.
#[derive(Debug, Clone)]
pub struct SchemaDefinition {
    id: String,
    temporal: String,
    params: Arc<[ParameterSpec]>,
    index: Arc<HashMap<String, usize>>,
    available: Option<Vec<String>>,
}

impl SchemaDefinition {
    /// Build and validate a full schema. Rejects a missing temporal column,
    /// duplicate names, dangling argument references and cyclic
    /// derivations.
    pub fn new(
        id: impl Into<String>,
        temporal: impl Into<String>,
        params: Vec<ParameterSpec>,
    ) -> CoreResult<Self> {
        let id = id.into();
        let temporal = temporal.into();

        let mut index = HashMap::with_capacity(params.len());
        for (i, p) in params.iter().enumerate() {
            if index.insert(p.name.clone(), i).is_some() {
                return config_err(format!("schema {id:?}: duplicate parameter {:?}", p.name));
            }
        }
        if !index.contains_key(&temporal) {
            return config_err(format!(
                "schema {id:?}: temporal column {temporal:?} is not a parameter"
            ));
        }

        for p in &params {
            match (&p.kind, &p.derivation) {
                (ParameterKind::Function, None) => {
                    return config_err(format!(
                        "schema {id:?}: function parameter {:?} has no derivation",
                        p.name
                    ));
                }
                (ParameterKind::Function, Some(d)) => {
                    for dep in d.column_dependencies() {
                        if !index.contains_key(dep) {
                            return config_err(format!(
                                "schema {id:?}: parameter {:?} references unknown column {dep:?}",
                                p.name
                            ));
                        }
                    }
                }
                (_, Some(_)) => {
                    return config_err(format!(
                        "schema {id:?}: only function parameters may carry a derivation ({:?})",
                        p.name
                    ));
                }
                (_, None) => {}
            }
        }

        check_acyclic(&id, &params, &index)?;

        Ok(Self {
            id,
            temporal,
            params: params.into(),
            index: Arc::new(index),
            available: None,
        })
    }

    /// A view of this schema exposing only `fields`, registered under
    /// `view_id`. The temporal column need not be listed.
    pub fn restrict(&self, view_id: impl Into<String>, fields: &[String]) -> CoreResult<Self> {
        let view_id = view_id.into();
        for f in fields {
            if !self.index.contains_key(f) {
                return config_err(format!(
                    "view {view_id:?}: field {f:?} is not in schema {:?}",
                    self.id
                ));
            }
        }
        // Keep schema order regardless of listing order.
        let available = self
            .params
            .iter()
            .map(|p| p.name.clone())
            .filter(|n| fields.contains(n))
            .collect();
        Ok(Self {
            id: view_id,
            temporal: self.temporal.clone(),
            params: Arc::clone(&self.params),
            index: Arc::clone(&self.index),
            available: Some(available),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn temporal(&self) -> &str {
        &self.temporal
    }

    /// Parameter by name from the full schema, ignoring any restriction.
    pub fn parameter(&self, name: &str) -> Option<&ParameterSpec> {
        self.index.get(name).map(|&i| &self.params[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn is_restricted(&self) -> bool {
        self.available.is_some()
    }

    pub fn available_fields(&self) -> Option<&[String]> {
        self.available.as_deref()
    }

    /// Whether `name` may be read or written through this definition.
    pub fn is_available(&self, name: &str) -> bool {
        match &self.available {
            Some(fields) => fields.iter().any(|f| f == name),
            None => self.index.contains_key(name),
        }
    }

    /// Visible parameters in schema order.
    pub fn parameters(&self) -> impl Iterator<Item = &ParameterSpec> {
        self.params.iter().filter(|p| self.is_available(&p.name))
    }

    /// Visible column names in schema order.
    pub fn column_names(&self) -> Vec<String> {
        self.parameters().map(|p| p.name.clone()).collect()
    }

    /// Every parameter, restriction ignored.
    pub fn all_parameters(&self) -> &[ParameterSpec] {
        &self.params
    }
}

fn config_err<T>(detail: String) -> CoreResult<T> {
    StructError::from(CoreReason::Configuration)
        .with_detail(detail)
        .err()
}

/// Depth-first search over function-to-function argument edges.
fn check_acyclic(
    schema_id: &str,
    params: &[ParameterSpec],
    index: &HashMap<String, usize>,
) -> CoreResult<()> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Unvisited,
        InProgress,
        Done,
    }

    fn visit(
        i: usize,
        params: &[ParameterSpec],
        index: &HashMap<String, usize>,
        marks: &mut [Mark],
        path: &mut Vec<String>,
    ) -> Result<(), Vec<String>> {
        match marks[i] {
            Mark::Done => return Ok(()),
            Mark::InProgress => {
                path.push(params[i].name.clone());
                return Err(path.clone());
            }
            Mark::Unvisited => {}
        }
        marks[i] = Mark::InProgress;
        path.push(params[i].name.clone());
        if let Some(d) = &params[i].derivation {
            for dep in d.column_dependencies() {
                if let Some(&j) = index.get(dep) {
                    visit(j, params, index, marks, path)?;
                }
            }
        }
        path.pop();
        marks[i] = Mark::Done;
        Ok(())
    }

    let mut marks = vec![Mark::Unvisited; params.len()];
    for i in 0..params.len() {
        let mut path = Vec::new();
        if let Err(cycle) = visit(i, params, index, &mut marks, &mut path) {
            return config_err(format!(
                "schema {schema_id:?}: cyclic derivation {}",
                cycle.join(" -> ")
            ));
        }
    }
    Ok(())
}
